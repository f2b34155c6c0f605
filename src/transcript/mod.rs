// src/transcript/mod.rs
// THE TRANSCRIPT ENGINE
// Raw model text in, attributable (speaker, utterance, round) records out.

pub mod directory;
pub mod lines;
pub mod matcher;
pub mod reconciler;
pub mod rounds;

pub use directory::Speaker;
pub use reconciler::{Message, RunState, TranscriptReconciler};
