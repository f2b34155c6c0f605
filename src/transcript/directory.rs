// src/transcript/directory.rs
// Speaker resolution: bracketed label -> roster identity.

use serde::{Deserialize, Serialize};

use crate::participant::Participant;

/// Who a matched utterance belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "participant_id", rename_all = "snake_case")]
pub enum Speaker {
    Participant(String),
    Moderator,
    Unresolved,
}

impl Speaker {
    pub fn participant_id(&self) -> Option<&str> {
        match self {
            Speaker::Participant(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_moderator(&self) -> bool {
        matches!(self, Speaker::Moderator)
    }
}

/// Holds only the reserved moderator label. The roster is passed on every
/// call and never cached, so edits show up on the next lookup.
#[derive(Clone, Debug)]
pub struct SpeakerDirectory {
    moderator_label: String,
}

impl SpeakerDirectory {
    pub fn new(moderator_label: &str) -> Self {
        Self {
            moderator_label: moderator_label.trim().to_string(),
        }
    }

    pub fn moderator_label(&self) -> &str {
        &self.moderator_label
    }

    pub fn resolve(&self, label: &str, roster: &[Participant]) -> Speaker {
        let label = label.trim();
        if label == self.moderator_label {
            return Speaker::Moderator;
        }

        // Names win over roles; within each pass, roster order wins.
        roster
            .iter()
            .find(|p| p.name.trim() == label)
            .or_else(|| roster.iter().find(|p| p.role.trim() == label))
            .map(|p| Speaker::Participant(p.id.clone()))
            .unwrap_or(Speaker::Unresolved)
    }
}
