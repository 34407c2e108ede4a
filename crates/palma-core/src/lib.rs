pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::PalmaConfig;
pub use error::{PalmaError, Result};
pub use events::{EventBus, PalmaEvent};
pub use types::*;
