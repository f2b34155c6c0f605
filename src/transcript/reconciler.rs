// src/transcript/reconciler.rs
// TRANSCRIPT RECONCILER
// Owns the raw buffer of one run and rebuilds the message list from it on
// every chunk. A full re-parse keeps the output consistent with the buffer
// no matter where chunk boundaries fall.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::directory::{Speaker, SpeakerDirectory};
use super::lines::{extract_all_lines, extract_lines};
use super::matcher::{BracketMatcher, LineMatcher};
use super::rounds::RoundTracker;
use crate::error::FocusError;
use crate::participant::Participant;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// `msg-N`, N being the zero-based position among matched lines.
    pub id: String,
    pub speaker_label: String,
    pub speaker: Speaker,
    pub content: String,
    pub round: u32,
    /// Time of the parse pass that produced this entry. Informational only.
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedTranscript {
    pub messages: Vec<Message>,
    pub current_round: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Streaming,
    Complete,
    Errored,
    Stopped,
}

/// Pure re-parse of a buffer snapshot against a roster snapshot.
/// `flush` treats a trailing unterminated line as complete.
pub fn parse_transcript(
    buffer: &str,
    roster: &[Participant],
    directory: &SpeakerDirectory,
    matcher: &dyn LineMatcher,
    parsed_at: DateTime<Utc>,
    flush: bool,
) -> ParsedTranscript {
    let lines = if flush { extract_all_lines(buffer) } else { extract_lines(buffer) };
    let tracker = RoundTracker::new(roster.len());

    let messages: Vec<Message> = lines
        .into_iter()
        .filter_map(|line| matcher.match_line(line))
        .enumerate()
        .map(|(index, utterance)| Message {
            id: format!("msg-{}", index),
            speaker: directory.resolve(&utterance.speaker_label, roster),
            speaker_label: utterance.speaker_label,
            content: utterance.content,
            round: tracker.round_for(index + 1),
            created_at: parsed_at,
        })
        .collect();

    let current_round = tracker.current_round(messages.len());
    ParsedTranscript { messages, current_round }
}

pub struct TranscriptReconciler {
    directory: SpeakerDirectory,
    matcher: Arc<dyn LineMatcher>,
    state: RunState,
    buffer: String,
    messages: Vec<Message>,
    current_round: u32,
    chunks: usize,
    error: Option<String>,
}

impl fmt::Debug for TranscriptReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscriptReconciler")
            .field("state", &self.state)
            .field("buffer_len", &self.buffer.len())
            .field("messages", &self.messages.len())
            .field("current_round", &self.current_round)
            .finish()
    }
}

impl TranscriptReconciler {
    pub fn new(moderator_label: &str) -> Self {
        Self::with_matcher(moderator_label, Arc::new(BracketMatcher))
    }

    pub fn with_matcher(moderator_label: &str, matcher: Arc<dyn LineMatcher>) -> Self {
        Self {
            directory: SpeakerDirectory::new(moderator_label),
            matcher,
            state: RunState::Idle,
            buffer: String::new(),
            messages: Vec::new(),
            current_round: 0,
            chunks: 0,
            error: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn is_complete(&self) -> bool {
        self.state == RunState::Complete
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn directory(&self) -> &SpeakerDirectory {
        &self.directory
    }

    /// Idle or terminal -> Streaming. Wipes everything from the previous run.
    pub fn begin(&mut self, roster: &[Participant]) -> Result<(), FocusError> {
        if self.state == RunState::Streaming {
            return Err(FocusError::RunInProgress);
        }
        if roster.is_empty() {
            return Err(FocusError::EmptyRoster);
        }

        self.state = RunState::Streaming;
        self.buffer.clear();
        self.messages.clear();
        self.current_round = RoundTracker::new(roster.len()).current_round(0);
        self.chunks = 0;
        self.error = None;
        Ok(())
    }

    /// Appends one chunk and rebuilds the message list. Chunks arriving
    /// outside `Streaming` are dropped; returns whether it was applied.
    pub fn apply_chunk(&mut self, chunk: &str, roster: &[Participant]) -> bool {
        if self.state != RunState::Streaming {
            debug!(state = ?self.state, "dropping chunk outside an active run");
            return false;
        }
        self.buffer.push_str(chunk);
        self.chunks += 1;
        self.refresh(roster, false);
        true
    }

    /// End of stream. The trailing line is flushed, then the list is final.
    pub fn finish(&mut self, roster: &[Participant]) {
        if self.state != RunState::Streaming {
            return;
        }
        self.refresh(roster, true);
        self.state = RunState::Complete;
    }

    /// Transport failure. Messages parsed so far are kept.
    pub fn fail(&mut self, reason: &str) {
        if self.state != RunState::Streaming {
            return;
        }
        self.error = Some(reason.to_string());
        self.state = RunState::Errored;
    }

    /// Safe in any state. Returns true only when it actually ended a run.
    pub fn stop(&mut self) -> bool {
        if self.state != RunState::Streaming {
            return false;
        }
        self.state = RunState::Stopped;
        true
    }

    fn refresh(&mut self, roster: &[Participant], flush: bool) {
        let parsed = parse_transcript(
            &self.buffer,
            roster,
            &self.directory,
            self.matcher.as_ref(),
            Utc::now(),
            flush,
        );
        debug!(
            chunks = self.chunks,
            bytes = self.buffer.len(),
            messages = parsed.messages.len(),
            round = parsed.current_round,
            "transcript re-parsed"
        );
        self.messages = parsed.messages;
        self.current_round = parsed.current_round;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::matcher::Utterance;
    use chrono::TimeZone;

    fn roster(names: &[&str]) -> Vec<Participant> {
        names
            .iter()
            .map(|n| Participant {
                id: format!("id-{}", n),
                name: n.to_string(),
                role: format!("role-{}", n),
                tags: Vec::new(),
                system_prompt: String::new(),
            })
            .collect()
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn parse(buffer: &str, roster: &[Participant]) -> ParsedTranscript {
        parse_transcript(
            buffer,
            roster,
            &SpeakerDirectory::new("主持人"),
            &BracketMatcher,
            fixed_time(),
            false,
        )
    }

    fn summary(messages: &[Message]) -> Vec<(String, String, u32)> {
        messages
            .iter()
            .map(|m| (m.speaker_label.clone(), m.content.clone(), m.round))
            .collect()
    }

    #[test]
    fn streamed_scenario_across_two_chunks() {
        let roster = roster(&["A", "B", "C"]);
        let mut rec = TranscriptReconciler::new("主持人");
        rec.begin(&roster).unwrap();

        assert!(rec.apply_chunk("[主持人]: 開始\n[A]: 我覺得", &roster));
        assert_eq!(summary(rec.messages()), vec![("主持人".into(), "開始".into(), 1)]);
        assert_eq!(rec.messages()[0].speaker, Speaker::Moderator);

        assert!(rec.apply_chunk("不錯\n[B]: 我也同意\n[主持人]: 總結\n", &roster));
        // Three speakers per round: the third message still closes round 1.
        assert_eq!(
            summary(rec.messages()),
            vec![
                ("主持人".into(), "開始".into(), 1),
                ("A".into(), "我覺得不錯".into(), 1),
                ("B".into(), "我也同意".into(), 1),
                ("主持人".into(), "總結".into(), 2),
            ]
        );
        assert_eq!(rec.messages()[1].speaker, Speaker::Participant("id-A".into()));
        assert_eq!(rec.current_round(), 2);

        let ids: Vec<&str> = rec.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["msg-0", "msg-1", "msg-2", "msg-3"]);
    }

    #[test]
    fn reparse_is_deterministic() {
        let roster = roster(&["A", "B"]);
        let buffer = "[A]: one\nnoise\n[B]: two\n[路人甲]: 嗨\n[A]: par";
        assert_eq!(parse(buffer, &roster), parse(buffer, &roster));
    }

    #[test]
    fn extending_the_tail_line_changes_nothing() {
        let roster = roster(&["A", "B"]);
        let short = "[A]: one\n[B]: tw";
        let long = "[A]: one\n[B]: two and more words";
        assert_eq!(parse(short, &roster), parse(long, &roster));
    }

    #[test]
    fn narration_is_inert() {
        let roster = roster(&["A", "B"]);
        let parsed = parse("這是一段旁白文字\n[A]: hi\n這是一段旁白文字\n[B]: yo\n", &roster);
        assert_eq!(parsed.messages.len(), 2);
        assert_eq!(parsed.messages[1].round, 1);
        assert_eq!(parsed.current_round, 2);

        let only_noise = parse("這是一段旁白文字\n", &roster);
        assert!(only_noise.messages.is_empty());
        assert_eq!(only_noise.current_round, 1);
    }

    #[test]
    fn unknown_label_is_kept_verbatim() {
        let parsed = parse("[路人甲]: 嗨\n", &roster(&["A"]));
        assert_eq!(parsed.messages[0].speaker, Speaker::Unresolved);
        assert_eq!(parsed.messages[0].speaker_label, "路人甲");
        assert_eq!(parsed.messages[0].content, "嗨");
    }

    #[test]
    fn roster_edit_reshuffles_rounds_on_next_pass() {
        let mut people = roster(&["A", "B"]);
        let mut rec = TranscriptReconciler::new("主持人");
        rec.begin(&people).unwrap();
        rec.apply_chunk("[A]: 1\n[B]: 2\n[A]: 3\n", &people);
        assert_eq!(rec.messages()[2].round, 2);

        people.push(roster(&["C"]).remove(0));
        rec.apply_chunk("[C]: 4\n", &people);
        let rounds: Vec<u32> = rec.messages().iter().map(|m| m.round).collect();
        assert_eq!(rounds, vec![1, 1, 1, 2]);
        assert_eq!(rec.messages()[3].speaker, Speaker::Participant("id-C".into()));
    }

    #[test]
    fn begin_rejects_empty_roster_and_double_start() {
        let mut rec = TranscriptReconciler::new("主持人");
        assert_eq!(rec.begin(&[]), Err(FocusError::EmptyRoster));
        assert_eq!(rec.state(), RunState::Idle);
        assert_eq!(rec.current_round(), 0);

        let people = roster(&["A"]);
        rec.begin(&people).unwrap();
        assert_eq!(rec.current_round(), 1);
        assert_eq!(rec.begin(&people), Err(FocusError::RunInProgress));
    }

    #[test]
    fn finish_flushes_the_last_line_then_freezes() {
        let people = roster(&["A"]);
        let mut rec = TranscriptReconciler::new("主持人");
        rec.begin(&people).unwrap();
        rec.apply_chunk("[A]: first\n[主持人]: 謝謝大家", &people);
        assert_eq!(rec.messages().len(), 1);

        rec.finish(&people);
        assert!(rec.is_complete());
        assert_eq!(rec.messages().len(), 2);
        assert_eq!(rec.messages()[1].content, "謝謝大家");

        assert!(!rec.apply_chunk("[A]: late\n", &people));
        assert_eq!(rec.messages().len(), 2);
    }

    #[test]
    fn failure_keeps_partial_transcript() {
        let people = roster(&["A"]);
        let mut rec = TranscriptReconciler::new("主持人");
        rec.begin(&people).unwrap();
        rec.apply_chunk("[A]: kept\n[A]: cut", &people);
        rec.fail("connection reset");

        assert_eq!(rec.state(), RunState::Errored);
        assert_eq!(rec.error(), Some("connection reset"));
        assert_eq!(summary(rec.messages()), vec![("A".into(), "kept".into(), 1)]);
        assert!(!rec.is_complete());
    }

    #[test]
    fn stop_is_idempotent_and_blocks_further_chunks() {
        let people = roster(&["A"]);
        let mut rec = TranscriptReconciler::new("主持人");
        assert!(!rec.stop());

        rec.begin(&people).unwrap();
        rec.apply_chunk("[A]: before\n", &people);
        assert!(rec.stop());
        assert!(!rec.stop());
        assert_eq!(rec.state(), RunState::Stopped);

        assert!(!rec.apply_chunk("[A]: after\n", &people));
        rec.finish(&people);
        assert_eq!(rec.state(), RunState::Stopped);
        assert_eq!(rec.messages().len(), 1);
    }

    #[test]
    fn restart_resets_the_buffer() {
        let people = roster(&["A"]);
        let mut rec = TranscriptReconciler::new("主持人");
        rec.begin(&people).unwrap();
        rec.apply_chunk("[A]: old\n", &people);
        rec.finish(&people);

        rec.begin(&people).unwrap();
        assert!(rec.buffer.is_empty());
        assert!(rec.messages().is_empty());
        assert_eq!(rec.error(), None);
    }

    #[test]
    fn reparse_matches_live_state() {
        let people = roster(&["A", "B"]);
        let mut rec = TranscriptReconciler::new("主持人");
        rec.begin(&people).unwrap();
        rec.apply_chunk("[A]: x\n[B]: y\n[A]: z\n", &people);

        let parsed = parse_transcript(
            &rec.buffer,
            &people,
            &rec.directory,
            rec.matcher.as_ref(),
            fixed_time(),
            false,
        );
        assert_eq!(summary(&parsed.messages), summary(rec.messages()));
        assert_eq!(parsed.current_round, rec.current_round());
    }

    struct ColonMatcher;

    impl LineMatcher for ColonMatcher {
        fn match_line(&self, line: &str) -> Option<Utterance> {
            let (label, body) = line.split_once(':')?;
            Some(Utterance {
                speaker_label: label.trim().to_string(),
                content: body.trim().to_string(),
            })
        }
    }

    #[test]
    fn matcher_can_be_swapped() {
        let people = roster(&["A"]);
        let mut rec = TranscriptReconciler::with_matcher("主持人", Arc::new(ColonMatcher));
        rec.begin(&people).unwrap();
        rec.apply_chunk("A: plain protocol\n", &people);
        assert_eq!(rec.messages()[0].speaker, Speaker::Participant("id-A".into()));
    }
}
