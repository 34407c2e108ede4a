//! Palma Gesture crate - Hand pose classification and edge-triggered actions.
//!
//! Turns per-frame hand geometry into a discrete `GestureLabel`, and a stream
//! of labels into the `InteractionAction`s consumed by the interaction state
//! machine. Also defines the hand-tracking collaborator seam and a replay
//! tracker that feeds recorded observations through it.

pub mod classifier;
pub mod debounce;
pub mod tracker;

pub use classifier::{classify, classify_fingers, finger_state};
pub use debounce::GestureDebouncer;
pub use tracker::{Frame, HandTracker, ReplayTracker};
