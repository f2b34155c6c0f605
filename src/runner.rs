// src/runner.rs
// RUN DRIVER
// Starts a run, pumps generated chunks into the session's reconciler one at
// a time, and tears the run down on completion, failure or stop.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::FocusError;
use crate::generation::{GenerationRequest, TranscriptGenerator};
use crate::prompt::{build_system_prompt, build_user_prompt};
use crate::reporter::Reporter;
use crate::session::{Session, SessionStore};

/// Validates the session, moves it to `Streaming` and spawns the stream pump.
pub fn start_run(
    sessions: &SessionStore,
    generator: Arc<dyn TranscriptGenerator>,
    session_id: &str,
) -> Result<JoinHandle<()>, FocusError> {
    let (request, cancel) = sessions.with_session(session_id, |session| {
        prepare_run(session, generator.as_ref())
    })??;

    info!(session = %session_id, "run started");
    let sessions = sessions.clone();
    let session_id = session_id.to_string();
    Ok(tokio::spawn(async move {
        pump(sessions, generator, session_id, request, cancel).await;
    }))
}

fn prepare_run(
    session: &mut Session,
    generator: &dyn TranscriptGenerator,
) -> Result<(GenerationRequest, CancellationToken), FocusError> {
    if session.settings.topic.trim().is_empty() {
        return Err(FocusError::EmptyTopic);
    }
    generator.ensure_ready()?;
    // Rejects an empty roster and a run that is still streaming.
    session.transcript.begin(&session.roster)?;

    let request = GenerationRequest {
        system_prompt: build_system_prompt(
            &session.settings.topic,
            &session.roster,
            &session.settings.sub_topics,
            session.settings.rounds,
            session.transcript.directory().moderator_label(),
        ),
        user_prompt: build_user_prompt(&session.settings.topic),
    };
    let cancel = CancellationToken::new();
    session.cancel = Some(cancel.clone());
    Ok((request, cancel))
}

/// Idempotent. Returns true only when a streaming run was actually ended.
pub fn stop_run(sessions: &SessionStore, session_id: &str) -> Result<bool, FocusError> {
    sessions.with_session(session_id, |session| {
        if let Some(cancel) = session.cancel.take() {
            cancel.cancel();
        }
        let stopped = session.transcript.stop();
        if stopped {
            info!(session = %session.id, messages = session.transcript.messages().len(), "run stopped");
        }
        stopped
    })
}

/// Applies `f` only while this run's token is live; the check and the
/// mutation share one entry lock, so a stopped run can never write.
fn with_live_session<T>(
    sessions: &SessionStore,
    session_id: &str,
    cancel: &CancellationToken,
    f: impl FnOnce(&mut Session) -> T,
) -> Option<T> {
    sessions
        .with_session(session_id, |session| {
            if cancel.is_cancelled() {
                None
            } else {
                Some(f(session))
            }
        })
        .ok()
        .flatten()
}

async fn pump(
    sessions: SessionStore,
    generator: Arc<dyn TranscriptGenerator>,
    session_id: String,
    request: GenerationRequest,
    cancel: CancellationToken,
) {
    let opened = tokio::select! {
        _ = cancel.cancelled() => return,
        opened = generator.start_generation(request) => opened,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(err) => {
            warn!(session = %session_id, error = %err, "generation request failed");
            with_live_session(&sessions, &session_id, &cancel, |s| s.transcript.fail(&err.to_string()));
            return;
        }
    };

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                let applied = with_live_session(&sessions, &session_id, &cancel, |s| {
                    s.transcript.apply_chunk(&chunk, &s.roster)
                });
                if applied != Some(true) {
                    break;
                }
            }
            Some(Err(err)) => {
                warn!(session = %session_id, error = %err, "stream failed, keeping partial transcript");
                with_live_session(&sessions, &session_id, &cancel, |s| s.transcript.fail(&err.to_string()));
                break;
            }
            None => {
                with_live_session(&sessions, &session_id, &cancel, |s| {
                    s.transcript.finish(&s.roster);
                    info!(
                        session = %s.id,
                        messages = s.transcript.messages().len(),
                        round = s.transcript.current_round(),
                        "run complete"
                    );
                    Reporter::log_summary(s.transcript.messages());
                });
                break;
            }
        }
    }
    // Dropping the stream here releases the underlying response body.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::ChunkStream;
    use crate::participant::Participant;
    use crate::session::SessionSettings;
    use crate::transcript::{RunState, Speaker};
    use async_trait::async_trait;
    use futures_util::stream;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Replays a fixed list of chunks, optionally ending with a failure.
    struct ScriptedGenerator {
        chunks: Vec<Result<String, FocusError>>,
    }

    #[async_trait]
    impl TranscriptGenerator for ScriptedGenerator {
        async fn start_generation(&self, _request: GenerationRequest) -> Result<ChunkStream, FocusError> {
            Ok(Box::pin(stream::iter(self.chunks.clone())))
        }
    }

    /// Hands out a channel-backed stream so tests control chunk timing.
    struct ChannelGenerator {
        receiver: Mutex<Option<mpsc::UnboundedReceiver<Result<String, FocusError>>>>,
    }

    #[async_trait]
    impl TranscriptGenerator for ChannelGenerator {
        async fn start_generation(&self, _request: GenerationRequest) -> Result<ChunkStream, FocusError> {
            let rx = self
                .receiver
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| FocusError::Transport("already consumed".into()))?;
            Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })))
        }
    }

    struct RefusingGenerator;

    #[async_trait]
    impl TranscriptGenerator for RefusingGenerator {
        fn ensure_ready(&self) -> Result<(), FocusError> {
            Err(FocusError::MissingApiKey)
        }

        async fn start_generation(&self, _request: GenerationRequest) -> Result<ChunkStream, FocusError> {
            Err(FocusError::MissingApiKey)
        }
    }

    fn abc() -> Vec<Participant> {
        ["A", "B", "C"]
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

    fn session(store: &SessionStore, topic: &str, roster: Vec<Participant>) -> String {
        let settings = SessionSettings {
            topic: topic.into(),
            ..SessionSettings::default()
        };
        store.create(settings, Some(roster), "主持人")
    }

    fn scripted(chunks: &[&str]) -> Arc<dyn TranscriptGenerator> {
        Arc::new(ScriptedGenerator {
            chunks: chunks.iter().map(|c| Ok(c.to_string())).collect(),
        })
    }

    #[tokio::test]
    async fn streams_to_completion() {
        let store = SessionStore::new();
        let id = session(&store, "早餐", abc());
        let generator = scripted(&[
            "[主持人]: 開始\n[A]: 我覺得",
            "不錯\n[B]: 我也同意\n[主持人]: 總結\n",
        ]);

        start_run(&store, generator, &id).unwrap().await.unwrap();

        let snap = store.snapshot(&id).unwrap();
        assert_eq!(snap.state, RunState::Complete);
        assert!(snap.is_complete);
        assert_eq!(snap.messages.len(), 4);
        assert_eq!(snap.current_round, 2);
        assert_eq!(snap.messages[1].content, "我覺得不錯");
        assert_eq!(snap.messages[1].speaker, Speaker::Participant("id-A".into()));
    }

    #[tokio::test]
    async fn failure_keeps_partial_messages() {
        let store = SessionStore::new();
        let id = session(&store, "早餐", abc());
        let generator: Arc<dyn TranscriptGenerator> = Arc::new(ScriptedGenerator {
            chunks: vec![
                Ok("[A]: 第一句\n".into()),
                Err(FocusError::Transport("connection reset".into())),
            ],
        });

        start_run(&store, generator, &id).unwrap().await.unwrap();

        let snap = store.snapshot(&id).unwrap();
        assert_eq!(snap.state, RunState::Errored);
        assert!(!snap.is_complete);
        assert_eq!(snap.messages.len(), 1);
        assert!(snap.error.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn rejects_invalid_starts_before_any_request() {
        let store = SessionStore::new();

        let no_topic = session(&store, "  ", abc());
        assert_eq!(
            start_run(&store, scripted(&[]), &no_topic).unwrap_err(),
            FocusError::EmptyTopic
        );

        let nobody = session(&store, "t", Vec::new());
        assert_eq!(
            start_run(&store, scripted(&[]), &nobody).unwrap_err(),
            FocusError::EmptyRoster
        );

        let no_key = session(&store, "t", abc());
        assert_eq!(
            start_run(&store, Arc::new(RefusingGenerator), &no_key).unwrap_err(),
            FocusError::MissingApiKey
        );
        assert_eq!(store.snapshot(&no_key).unwrap().state, RunState::Idle);

        assert!(matches!(
            start_run(&store, scripted(&[]), "missing"),
            Err(FocusError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn stop_halts_the_run_and_second_start_is_rejected_while_live() {
        let store = SessionStore::new();
        let id = session(&store, "早餐", abc());
        let (tx, rx) = mpsc::unbounded_channel();
        let generator: Arc<dyn TranscriptGenerator> = Arc::new(ChannelGenerator {
            receiver: Mutex::new(Some(rx)),
        });

        let handle = start_run(&store, generator.clone(), &id).unwrap();
        assert_eq!(
            start_run(&store, generator, &id).unwrap_err(),
            FocusError::RunInProgress
        );

        tx.send(Ok("[A]: 一\n".to_string())).unwrap();
        // Wait until the first chunk has landed.
        for _ in 0..100 {
            if !store.snapshot(&id).unwrap().messages.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(store.snapshot(&id).unwrap().messages.len(), 1);

        assert!(stop_run(&store, &id).unwrap());
        assert!(!stop_run(&store, &id).unwrap());
        handle.await.unwrap();

        // The pump is gone; later chunks have nowhere to land.
        let _ = tx.send(Ok("[B]: 二\n".to_string()));
        let snap = store.snapshot(&id).unwrap();
        assert_eq!(snap.state, RunState::Stopped);
        assert_eq!(snap.messages.len(), 1);
    }

    #[tokio::test]
    async fn roster_edits_apply_to_the_next_chunk() {
        let store = SessionStore::new();
        let id = session(&store, "早餐", abc());
        let (tx, rx) = mpsc::unbounded_channel();
        let generator: Arc<dyn TranscriptGenerator> = Arc::new(ChannelGenerator {
            receiver: Mutex::new(Some(rx)),
        });
        let handle = start_run(&store, generator, &id).unwrap();

        store
            .with_session(&id, |s| {
                s.roster[0].name = "阿姨".into();
            })
            .unwrap();
        tx.send(Ok("[阿姨]: 你好\n".to_string())).unwrap();
        drop(tx);
        handle.await.unwrap();

        let snap = store.snapshot(&id).unwrap();
        assert_eq!(snap.state, RunState::Complete);
        assert_eq!(snap.messages[0].speaker, Speaker::Participant("id-A".into()));
    }

    #[tokio::test]
    async fn stop_on_idle_session_is_a_no_op() {
        let store = SessionStore::new();
        let id = session(&store, "早餐", abc());
        assert!(!stop_run(&store, &id).unwrap());
        assert_eq!(store.snapshot(&id).unwrap().state, RunState::Idle);
    }
}
