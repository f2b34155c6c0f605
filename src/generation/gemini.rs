// src/generation/gemini.rs
// Gemini REST client: model discovery plus `streamGenerateContent` over SSE.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::decode::{SseEventDecoder, Utf8ChunkDecoder};
use super::{ChunkStream, GenerationRequest, TranscriptGenerator};
use crate::config::AppConfig;
use crate::error::FocusError;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const FALLBACK_MODEL: &str = "gemini-1.5-flash";
const PREFERRED_FAMILY: &str = "flash";
// Slightly cool so the moderator keeps the round cadence.
const TEMPERATURE: f64 = 0.7;

// --- Wire types ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelInfo {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f64,
}

impl GenerateContentRequest {
    fn new(request: &GenerationRequest) -> Self {
        Self {
            system_instruction: Content::text(None, &request.system_prompt),
            contents: vec![Content::text(Some("user"), &request.user_prompt)],
            generation_config: GenerationConfig { temperature: TEMPERATURE },
        }
    }
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part { text: Some(text.to_string()) }],
        }
    }
}

// --- Client ---

#[derive(Clone)]
pub struct GeminiGenerator {
    client: Client,
    api_key: Option<String>,
    model: Option<String>,
    base_url: String,
}

impl GeminiGenerator {
    pub fn new(api_key: Option<String>, model: Option<String>, timeout: Duration) -> Result<Self, FocusError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            model,
            base_url: BASE_URL.to_string(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, FocusError> {
        Self::new(config.api_key.clone(), config.model.clone(), config.request_timeout)
    }

    fn api_key(&self) -> Result<&str, FocusError> {
        self.api_key.as_deref().ok_or(FocusError::MissingApiKey)
    }

    /// Configured model, else the first discovered "flash" model, else the fallback.
    async fn resolve_model(&self) -> String {
        if let Some(model) = &self.model {
            return model.clone();
        }
        match self.discover_model().await {
            Ok(Some(model)) => {
                info!(model = %model, "discovered generation model");
                model
            }
            Ok(None) => {
                warn!(fallback = FALLBACK_MODEL, "no flash model listed, using fallback");
                FALLBACK_MODEL.to_string()
            }
            Err(err) => {
                warn!(error = %err, fallback = FALLBACK_MODEL, "model discovery failed");
                FALLBACK_MODEL.to_string()
            }
        }
    }

    async fn discover_model(&self) -> Result<Option<String>, FocusError> {
        let url = format!("{}/models?key={}", self.base_url, self.api_key()?);
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FocusError::Upstream {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let list: ModelList = response
            .json()
            .await
            .map_err(|e| FocusError::Payload(e.to_string()))?;
        Ok(pick_model(&list))
    }
}

fn pick_model(list: &ModelList) -> Option<String> {
    list.models
        .iter()
        .filter(|m| m.supported_generation_methods.iter().any(|g| g == "generateContent"))
        .map(|m| m.name.trim_start_matches("models/").to_string())
        .find(|name| name.contains(PREFERRED_FAMILY))
}

#[async_trait]
impl TranscriptGenerator for GeminiGenerator {
    fn ensure_ready(&self) -> Result<(), FocusError> {
        self.api_key().map(|_| ())
    }

    async fn start_generation(&self, request: GenerationRequest) -> Result<ChunkStream, FocusError> {
        let api_key = self.api_key()?;
        let model = self.resolve_model().await;
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, model, api_key
        );
        let body = GenerateContentRequest::new(&request);

        info!(model = %model, "opening generation stream");
        let response = self.client.post(url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FocusError::Upstream { status: status.as_u16(), body });
        }

        Ok(sse_text_stream(response.bytes_stream()))
    }
}

// --- SSE -> text chunks ---

struct SseState<S> {
    bytes: std::pin::Pin<Box<S>>,
    utf8: Utf8ChunkDecoder,
    sse: SseEventDecoder,
    ready: VecDeque<Result<String, FocusError>>,
    done: bool,
}

impl<S> SseState<S> {
    fn queue(&mut self, payload: String) {
        match candidate_text(&payload) {
            Ok(text) if text.is_empty() => {}
            other => self.ready.push_back(other),
        }
    }
}

/// Turns a raw SSE byte stream into candidate text chunks. The first error
/// ends the stream.
pub fn sse_text_stream<S, B, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<FocusError> + Send + 'static,
{
    let state = SseState {
        bytes: Box::pin(bytes),
        utf8: Utf8ChunkDecoder::new(),
        sse: SseEventDecoder::new(),
        ready: VecDeque::new(),
        done: false,
    };

    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.ready.pop_front() {
                if item.is_err() {
                    st.ready.clear();
                    st.done = true;
                }
                return Some((item, st));
            }
            if st.done {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    let text = st.utf8.decode(chunk.as_ref());
                    for payload in st.sse.push(&text) {
                        st.queue(payload);
                    }
                }
                Some(Err(err)) => {
                    st.done = true;
                    st.ready.push_back(Err(err.into()));
                }
                None => {
                    st.done = true;
                    let tail = st.utf8.finish();
                    let mut payloads = st.sse.push(&tail);
                    payloads.extend(st.sse.finish());
                    for payload in payloads {
                        st.queue(payload);
                    }
                    debug!("generation stream drained");
                }
            }
        }
    }))
}

fn candidate_text(payload: &str) -> Result<String, FocusError> {
    let response: GenerateContentResponse =
        serde_json::from_str(payload).map_err(|e| FocusError::Payload(e.to_string()))?;
    if let Some(err) = response.error {
        return Err(FocusError::Payload(err.message));
    }
    Ok(response
        .candidates
        .into_iter()
        .next()
        .map(|c| {
            c.content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<String>()
        })
        .unwrap_or_default())
}
