//! Palma Audio crate - Fixed-window recording, WAV archive, speech output.
//!
//! Provides the recorder and speech-output collaborator seams used by the
//! voice-capture coordinator, a WAV archive for captured commands, and mock
//! implementations for running without audio hardware.

pub mod archive;
pub mod error;
pub mod recorder;
pub mod speech;

pub use archive::AudioArchive;
pub use error::AudioError;
pub use recorder::{downmix, resample, AudioClip, AudioRecorder, MockRecorder};
#[cfg(feature = "microphone")]
pub use recorder::CpalRecorder;
pub use speech::{MockSpeech, SilentSpeech, SpeechOutput, SystemSpeech};
