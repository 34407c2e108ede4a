//! Palma Action crate - Local voice commands.
//!
//! Routes transcribed text through a priority-ordered keyword table to a
//! fixed set of command handlers, each one external effect on the operating
//! environment. Every handler run is audited. Text that matches no keyword
//! is reported as unrecognized so the caller can fall through to the
//! conversational assistant.

pub mod audit;
pub mod commands;
pub mod dispatcher;
pub mod environment;
pub mod error;

pub use audit::CommandLog;
pub use commands::{CommandHandler, CommandRule, CommandTable};
pub use dispatcher::{CommandDispatcher, DispatchOutcome};
pub use environment::{
    Application, Effect, OperatingEnvironment, RecordingEnvironment, SystemEnvironment,
    VolumeChange,
};
pub use error::ActionError;
