//! Palma Interaction crate - The interaction orchestrator.
//!
//! Sequences activation, voice capture, command dispatch and the spoken
//! reply through a strict state machine:
//! Idle -> Active -> Waiting -> Recording -> Processing -> Active.
//! At most one capture-and-dispatch cycle runs at a time.

pub mod capture;
pub mod engine;
pub mod state;

pub use capture::{
    CaptureError, CaptureProgress, CaptureSettings, Captured, ModelStatus, VoiceCaptureCoordinator,
    LISTENING_PROMPT,
};
pub use engine::{EngineSnapshot, InteractionEngine};
pub use state::{transition, Effect, StateMachine, Transition, Trigger};
