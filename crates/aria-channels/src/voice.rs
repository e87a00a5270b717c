use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tracing::{info, warn};

use crate::buffer::OrderedBuffer;
use crate::error::ChannelError;
use crate::push::{PushChannel, PushEvent};

/// One synthesized voice fragment on disk.
#[derive(Debug, Clone)]
pub struct SynthesizedFragment {
    pub file_path: String,
}

/// Speech-synthesis collaborator. One call per sentence-like fragment;
/// calls for one reply may run concurrently and complete out of order.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: u32,
    ) -> Result<SynthesizedFragment, ChannelError>;
}

/// Splits a reply into fragments, synthesizes them concurrently, and pushes
/// `voice_file_ready` events strictly in fragment order. `is_last` is set
/// only on the highest index.
pub struct VoiceDispatcher {
    synth: Arc<dyn SpeechSynthesizer>,
    push: Arc<dyn PushChannel>,
    voice_id: u32,
}

impl VoiceDispatcher {
    pub fn new(
        synth: Arc<dyn SpeechSynthesizer>,
        push: Arc<dyn PushChannel>,
        voice_id: u32,
    ) -> Self {
        Self {
            synth,
            push,
            voice_id,
        }
    }

    /// Synthesize and deliver all fragments of `text` for one session.
    /// Resolves once every fragment has been pushed (or skipped on error).
    pub async fn dispatch(&self, text: &str, target_session_id: &str) -> Result<(), ChannelError> {
        let fragments = split_fragments(text);
        if fragments.is_empty() {
            return Ok(());
        }
        let total = fragments.len();
        info!(
            session = %target_session_id,
            fragments = total,
            "dispatching speech synthesis"
        );

        let buffer = OrderedBuffer::new();
        let mut tasks: FuturesUnordered<_> = fragments
            .into_iter()
            .enumerate()
            .map(|(index, fragment)| {
                let synth = Arc::clone(&self.synth);
                let voice_id = self.voice_id;
                async move { (index, synth.synthesize(&fragment, voice_id).await) }
            })
            .collect();

        while let Some((index, result)) = tasks.next().await {
            let fragment = match result {
                Ok(fragment) => fragment,
                Err(e) => {
                    // A failed fragment must not wedge the cursor; deliver a
                    // placeholder so later fragments still flow.
                    warn!(index, error = %e, "fragment synthesis failed");
                    SynthesizedFragment {
                        file_path: String::new(),
                    }
                }
            };

            for (ready_index, ready) in buffer.push(index, fragment) {
                if ready.file_path.is_empty() {
                    continue;
                }
                let filename = ready
                    .file_path
                    .rsplit('/')
                    .next()
                    .unwrap_or(&ready.file_path)
                    .to_string();
                self.push
                    .push(&PushEvent::VoiceFileReady {
                        filename,
                        index: ready_index,
                        is_last: ready_index == total - 1,
                        target_session_id: target_session_id.to_string(),
                    })
                    .await?;
            }
        }
        Ok(())
    }

    /// Fire-and-forget variant for callers that must not block on synthesis.
    pub fn dispatch_detached(self: &Arc<Self>, text: String, target_session_id: String) {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = dispatcher.dispatch(&text, &target_session_id).await {
                warn!(session = %target_session_id, error = %e, "speech dispatch failed");
            }
        });
    }
}

/// Sentence-like splits on terminal punctuation and newlines. Keeps the
/// delimiter with its sentence; drops whitespace-only fragments.
fn split_fragments(text: &str) -> Vec<String> {
    const DELIMITERS: [char; 7] = ['。', '！', '？', '.', '!', '?', '\n'];

    let mut fragments = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if DELIMITERS.contains(&ch) {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                fragments.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        fragments.push(trimmed.to_string());
    }
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::{sleep, Duration};

    /// Records pushed events for assertions.
    struct RecordingPush {
        events: Mutex<Vec<PushEvent>>,
    }

    #[async_trait]
    impl PushChannel for RecordingPush {
        fn name(&self) -> &str {
            "recording"
        }

        async fn push(&self, event: &PushEvent) -> Result<(), ChannelError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    /// Completes fragments in reverse index order: higher index = faster.
    struct ReversedSynth;

    #[async_trait]
    impl SpeechSynthesizer for ReversedSynth {
        async fn synthesize(
            &self,
            text: &str,
            _voice_id: u32,
        ) -> Result<SynthesizedFragment, ChannelError> {
            let delay = match text {
                t if t.contains("first") => 30,
                t if t.contains("second") => 20,
                _ => 5,
            };
            sleep(Duration::from_millis(delay)).await;
            Ok(SynthesizedFragment {
                file_path: format!("/tmp/voice/{}.wav", text.split_whitespace().next().unwrap()),
            })
        }
    }

    #[test]
    fn splitting_keeps_delimiters_and_drops_blanks() {
        let fragments = split_fragments("Hello there! How are you? \nFine.");
        assert_eq!(
            fragments,
            vec!["Hello there!", "How are you?", "Fine."]
        );
        assert!(split_fragments("   ").is_empty());
    }

    #[tokio::test]
    async fn fragments_are_delivered_in_order_with_is_last_on_max_index() {
        let push = Arc::new(RecordingPush {
            events: Mutex::new(Vec::new()),
        });
        let dispatcher = VoiceDispatcher::new(Arc::new(ReversedSynth), push.clone(), 10);

        dispatcher
            .dispatch("first sentence. second sentence. third sentence.", "s-1")
            .await
            .expect("dispatch");

        let events = push.events.lock().unwrap();
        let observed: Vec<(usize, bool)> = events
            .iter()
            .map(|e| match e {
                PushEvent::VoiceFileReady { index, is_last, .. } => (*index, *is_last),
                other => panic!("unexpected event: {other:?}"),
            })
            .collect();
        assert_eq!(observed, vec![(0, false), (1, false), (2, true)]);
    }

    #[tokio::test]
    async fn empty_reply_pushes_nothing() {
        let push = Arc::new(RecordingPush {
            events: Mutex::new(Vec::new()),
        });
        let dispatcher = VoiceDispatcher::new(Arc::new(ReversedSynth), push.clone(), 10);
        dispatcher.dispatch("", "s-1").await.expect("dispatch");
        assert!(push.events.lock().unwrap().is_empty());
    }
}
