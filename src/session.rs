// src/session.rs
// One focus group: settings, the live roster and the transcript of its
// current (or last) run. Sessions are kept in memory, keyed by UUID.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::FocusError;
use crate::participant::{default_roster, Participant, SubTopic};
use crate::transcript::{Message, RunState, TranscriptReconciler};

pub const DEFAULT_ROUNDS: u32 = 3;

fn default_rounds() -> u32 {
    DEFAULT_ROUNDS
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub topic: String,
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    #[serde(default)]
    pub sub_topics: Vec<SubTopic>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            topic: String::new(),
            rounds: DEFAULT_ROUNDS,
            sub_topics: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub settings: SessionSettings,
    pub roster: Vec<Participant>,
    pub transcript: TranscriptReconciler,
    pub created_at: DateTime<Utc>,
    /// Cancels the in-flight run task, if any.
    pub cancel: Option<CancellationToken>,
}

/// Read-only view handed to presentation and export.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub settings: SessionSettings,
    pub participants: Vec<Participant>,
    pub created_at: DateTime<Utc>,
    pub state: RunState,
    pub messages: Vec<Message>,
    pub current_round: u32,
    pub total_rounds: u32,
    pub is_complete: bool,
    pub error: Option<String>,
}

impl Session {
    pub fn new(settings: SessionSettings, roster: Vec<Participant>, moderator_label: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            settings,
            roster,
            transcript: TranscriptReconciler::new(moderator_label),
            created_at: Utc::now(),
            cancel: None,
        }
    }

    pub fn add_participant(&mut self) -> Participant {
        let participant = Participant::placeholder();
        self.roster.push(participant.clone());
        participant
    }

    pub fn update_participant(&mut self, updated: Participant) -> Result<(), FocusError> {
        let slot = self
            .roster
            .iter_mut()
            .find(|p| p.id == updated.id)
            .ok_or_else(|| FocusError::participant_not_found(&updated.id))?;
        *slot = updated;
        Ok(())
    }

    /// Unknown ids are ignored.
    pub fn remove_participant(&mut self, id: &str) -> bool {
        let before = self.roster.len();
        self.roster.retain(|p| p.id != id);
        self.roster.len() != before
    }

    pub fn update_settings(&mut self, settings: SessionSettings) {
        self.settings = settings;
    }

    pub fn add_sub_topic(&mut self, content: &str) -> SubTopic {
        let sub_topic = SubTopic::new(content);
        self.settings.sub_topics.push(sub_topic.clone());
        sub_topic
    }

    pub fn remove_sub_topic(&mut self, id: &str) -> bool {
        let before = self.settings.sub_topics.len();
        self.settings.sub_topics.retain(|s| s.id != id);
        self.settings.sub_topics.len() != before
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            settings: self.settings.clone(),
            participants: self.roster.clone(),
            created_at: self.created_at,
            state: self.transcript.state(),
            messages: self.transcript.messages().to_vec(),
            current_round: self.transcript.current_round(),
            total_rounds: self.settings.rounds,
            is_complete: self.transcript.is_complete(),
            error: self.transcript.error().map(str::to_string),
        }
    }
}

/// Shared, thread-safe session map. Lives as long as the process; sessions
/// leave it only through `remove`.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<DashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &self,
        settings: SessionSettings,
        roster: Option<Vec<Participant>>,
        moderator_label: &str,
    ) -> String {
        let session = Session::new(settings, roster.unwrap_or_else(default_roster), moderator_label);
        let id = session.id.clone();
        self.inner.insert(id.clone(), session);
        id
    }

    /// Runs `f` under the entry lock. Never hold this across an await.
    pub fn with_session<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Session) -> T,
    ) -> Result<T, FocusError> {
        let mut entry = self
            .inner
            .get_mut(id)
            .ok_or_else(|| FocusError::session_not_found(id))?;
        Ok(f(entry.value_mut()))
    }

    pub fn snapshot(&self, id: &str) -> Result<SessionSnapshot, FocusError> {
        self.inner
            .get(id)
            .map(|s| s.snapshot())
            .ok_or_else(|| FocusError::session_not_found(id))
    }

    /// Drops the session and cancels its run, if one is in flight.
    pub fn remove(&self, id: &str) -> Result<(), FocusError> {
        let (_, session) = self
            .inner
            .remove(id)
            .ok_or_else(|| FocusError::session_not_found(id))?;
        if let Some(cancel) = session.cancel {
            cancel.cancel();
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}
