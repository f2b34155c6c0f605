// src/participant.rs
// Roster entries and sub-topics for one focus group session.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    /// Assigned at creation, never reused.
    pub id: String,
    pub name: String,
    /// Secondary label. Resolves speakers just like `name` does.
    pub role: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub system_prompt: String,
}

impl Participant {
    pub fn new(name: &str, role: &str, tags: &[&str], system_prompt: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            role: role.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            system_prompt: system_prompt.to_string(),
        }
    }

    /// The blank entry the operator gets when pressing "add".
    pub fn placeholder() -> Self {
        Self::new("新角色", "路人", &[], "")
    }

    pub fn has_tag_containing(&self, needle: &str) -> bool {
        self.tags.iter().any(|t| t.contains(needle))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubTopic {
    pub id: String,
    pub content: String,
}

impl SubTopic {
    pub fn new(content: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
        }
    }
}

// Seed roster for new sessions: a three-generation household.
pub fn default_roster() -> Vec<Participant> {
    vec![
        Participant::new(
            "爸爸",
            "父親",
            &["男", "40歲", "上班族"],
            "務實、重視預算，說話直接。",
        ),
        Participant::new(
            "媽媽",
            "母親",
            &["女", "38歲", "家庭主婦"],
            "細心、關注孩子健康與家庭開銷。",
        ),
        Participant::new(
            "小明",
            "兒子",
            &["男", "6歲", "小學生"],
            "好奇心強，用簡單的句子表達喜好。",
        ),
        Participant::new(
            "阿嬤",
            "祖母",
            &["女", "65歲", "退休"],
            "傳統、節儉，喜歡分享過去的經驗。",
        ),
    ]
}
