//! The core's outward-facing glue: the push-channel adapter interface, the
//! speech-synthesis collaborator interface, and the ordered delivery buffer
//! that turns out-of-order synthesis completions into in-order
//! `voice_file_ready` notifications.

pub mod buffer;
pub mod error;
pub mod push;
pub mod voice;

pub use buffer::OrderedBuffer;
pub use error::{ChannelError, Result};
pub use push::{PushChannel, PushEvent};
pub use voice::{SpeechSynthesizer, SynthesizedFragment, VoiceDispatcher};
