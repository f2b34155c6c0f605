// src/api.rs
use actix_web::http::header;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::FocusError;
use crate::participant::Participant;
use crate::reporter::Reporter;
use crate::runner;
use crate::session::SessionSettings;
use crate::AppState;

// 1. Request Formats
#[derive(Deserialize)]
pub struct CreateSessionRequest {
    #[serde(flatten)]
    pub settings: SessionSettings,
    /// Omit to start from the default household roster.
    pub participants: Option<Vec<Participant>>,
}

/// The participant id comes from the path; any id in the body is ignored.
#[derive(Deserialize)]
pub struct ParticipantUpdateRequest {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub system_prompt: String,
}

#[derive(Deserialize)]
pub struct SubTopicRequest {
    pub content: String,
}

// 2. Response Formats
#[derive(Serialize)]
pub struct SessionCreatedResponse {
    pub session_id: String,
}

#[derive(Serialize)]
pub struct RunResponse {
    pub session_id: String,
    pub status: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/sessions")
            .route("", web::post().to(create_session))
            .route("/{id}", web::get().to(get_session))
            .route("/{id}", web::delete().to(delete_session))
            .route("/{id}/settings", web::put().to(update_settings))
            .route("/{id}/participants", web::post().to(add_participant))
            .route("/{id}/participants/{pid}", web::put().to(update_participant))
            .route("/{id}/participants/{pid}", web::delete().to(remove_participant))
            .route("/{id}/sub_topics", web::post().to(add_sub_topic))
            .route("/{id}/sub_topics/{sid}", web::delete().to(remove_sub_topic))
            .route("/{id}/run", web::post().to(start_run))
            .route("/{id}/stop", web::post().to(stop_run))
            .route("/{id}/export.csv", web::get().to(export_csv))
            .route("/{id}/export.html", web::get().to(export_html)),
    );
}

// POST /api/sessions
pub async fn create_session(
    data: web::Data<AppState>,
    req: web::Json<CreateSessionRequest>,
) -> Result<HttpResponse, FocusError> {
    let req = req.into_inner();
    let session_id = data
        .sessions
        .create(req.settings, req.participants, &data.config.moderator_label);
    info!(session = %session_id, open_sessions = data.sessions.len(), "session created");
    Ok(HttpResponse::Created().json(SessionCreatedResponse { session_id }))
}

// GET /api/sessions/{id}
pub async fn get_session(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, FocusError> {
    let snapshot = data.sessions.snapshot(&path.into_inner())?;
    Ok(HttpResponse::Ok().json(snapshot))
}

// DELETE /api/sessions/{id}
pub async fn delete_session(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, FocusError> {
    let session_id = path.into_inner();
    data.sessions.remove(&session_id)?;
    info!(session = %session_id, open_sessions = data.sessions.len(), "session deleted");
    Ok(HttpResponse::NoContent().finish())
}

// PUT /api/sessions/{id}/settings
pub async fn update_settings(
    data: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<SessionSettings>,
) -> Result<HttpResponse, FocusError> {
    let id = path.into_inner();
    data.sessions
        .with_session(&id, |s| s.update_settings(req.into_inner()))?;
    Ok(HttpResponse::Ok().json(data.sessions.snapshot(&id)?))
}

// POST /api/sessions/{id}/participants
pub async fn add_participant(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, FocusError> {
    let participant = data
        .sessions
        .with_session(&path.into_inner(), |s| s.add_participant())?;
    Ok(HttpResponse::Created().json(participant))
}

// PUT /api/sessions/{id}/participants/{pid}
pub async fn update_participant(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    req: web::Json<ParticipantUpdateRequest>,
) -> Result<HttpResponse, FocusError> {
    let (id, pid) = path.into_inner();
    let req = req.into_inner();
    let participant = Participant {
        id: pid,
        name: req.name,
        role: req.role,
        tags: req.tags,
        system_prompt: req.system_prompt,
    };
    let saved = participant.clone();
    data.sessions
        .with_session(&id, |s| s.update_participant(participant))??;
    Ok(HttpResponse::Ok().json(saved))
}

// DELETE /api/sessions/{id}/participants/{pid}
pub async fn remove_participant(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, FocusError> {
    let (id, pid) = path.into_inner();
    data.sessions.with_session(&id, |s| s.remove_participant(&pid))?;
    Ok(HttpResponse::NoContent().finish())
}

// POST /api/sessions/{id}/sub_topics
pub async fn add_sub_topic(
    data: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<SubTopicRequest>,
) -> Result<HttpResponse, FocusError> {
    let sub_topic = data
        .sessions
        .with_session(&path.into_inner(), |s| s.add_sub_topic(&req.content))?;
    Ok(HttpResponse::Created().json(sub_topic))
}

// DELETE /api/sessions/{id}/sub_topics/{sid}
pub async fn remove_sub_topic(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, FocusError> {
    let (id, sid) = path.into_inner();
    data.sessions.with_session(&id, |s| s.remove_sub_topic(&sid))?;
    Ok(HttpResponse::NoContent().finish())
}

// POST /api/sessions/{id}/run
pub async fn start_run(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, FocusError> {
    let session_id = path.into_inner();
    // The pump runs detached; progress is read back through GET.
    let _pump = runner::start_run(&data.sessions, data.generator.clone(), &session_id)?;
    Ok(HttpResponse::Accepted().json(RunResponse {
        session_id,
        status: "streaming".to_string(),
    }))
}

// POST /api/sessions/{id}/stop
pub async fn stop_run(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, FocusError> {
    let stopped = runner::stop_run(&data.sessions, &path.into_inner())?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "stopped": stopped })))
}

// GET /api/sessions/{id}/export.csv
pub async fn export_csv(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, FocusError> {
    let snapshot = data.sessions.snapshot(&path.into_inner())?;
    let body = Reporter::export_csv(&snapshot.messages)?;
    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"chat-{}.csv\"", Utc::now().timestamp_millis()),
        ))
        .body(body))
}

// GET /api/sessions/{id}/export.html
pub async fn export_html(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, FocusError> {
    let snapshot = data.sessions.snapshot(&path.into_inner())?;
    let body = Reporter::export_html(&snapshot, Utc::now())?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body))
}
