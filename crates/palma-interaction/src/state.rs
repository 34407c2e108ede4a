//! Interaction state machine.
//!
//! The transition table is a pure function of `(state, trigger)`. Effects are
//! returned to the caller, which performs them; nothing here touches a
//! collaborator.
//!
//! - Idle -> Active (ACTIVATE)
//! - any -> Idle (DEACTIVATE)
//! - Active -> Waiting (RECORD, when a capture may start)
//! - Waiting -> Recording (countdown complete)
//! - Recording -> Processing (transcript ready)
//! - Recording -> Active (CANCEL, or transcription failed)
//! - Waiting -> Active (capture failed before the microphone opened)
//! - Processing -> Active (reply ready)

use std::fmt;

use palma_core::{InteractionAction, InteractionState};
use tracing::debug;

/// Anything that can move the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// A debounced gesture action.
    Action(InteractionAction),
    /// The pre-recording countdown reached zero.
    CountdownComplete,
    /// Capture produced a usable transcript.
    CaptureComplete,
    /// Capture or transcription produced nothing usable.
    CaptureFailed,
    /// The reply for the captured text is ready.
    DispatchComplete,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Action(action) => write!(f, "{:?}", action),
            Trigger::CountdownComplete => write!(f, "CountdownComplete"),
            Trigger::CaptureComplete => write!(f, "CaptureComplete"),
            Trigger::CaptureFailed => write!(f, "CaptureFailed"),
            Trigger::DispatchComplete => write!(f, "DispatchComplete"),
        }
    }
}

/// Side effect the caller must perform after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    /// Speak the activation notice.
    Activate,
    /// Clear transcript and response, discard any running cycle, speak the
    /// deactivation notice.
    Deactivate,
    /// Start a capture-and-dispatch cycle.
    BeginCycle,
    /// Send the transcript to the command dispatcher.
    BeginDispatch,
    /// Drop the running cycle's eventual result.
    DiscardCycle,
    /// The cycle ended without a reply.
    AbandonCycle,
    /// Show and speak the reply; the cycle is over.
    DeliverReply,
}

/// One applied transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: InteractionState,
    pub to: InteractionState,
    pub effect: Option<Effect>,
}

/// The transition table.
///
/// `can_record` gates RECORD: the voice model must be ready and no cycle may
/// be in flight. Returns `None` for every pair the table does not list.
pub fn transition(state: InteractionState, trigger: Trigger, can_record: bool) -> Option<Transition> {
    use InteractionAction as A;
    use InteractionState as S;

    let (to, effect) = match (state, trigger) {
        (_, Trigger::Action(A::Deactivate)) => (S::Idle, Some(Effect::Deactivate)),
        (S::Idle, Trigger::Action(A::Activate)) => (S::Active, Some(Effect::Activate)),
        (S::Active, Trigger::Action(A::Record)) if can_record => {
            (S::Waiting, Some(Effect::BeginCycle))
        }
        (S::Waiting, Trigger::CountdownComplete) => (S::Recording, None),
        (S::Recording, Trigger::Action(A::Cancel)) => (S::Active, Some(Effect::DiscardCycle)),
        (S::Recording, Trigger::CaptureComplete) => (S::Processing, Some(Effect::BeginDispatch)),
        (S::Waiting | S::Recording, Trigger::CaptureFailed) => {
            (S::Active, Some(Effect::AbandonCycle))
        }
        (S::Processing, Trigger::DispatchComplete) => (S::Active, Some(Effect::DeliverReply)),
        _ => return None,
    };
    Some(Transition {
        from: state,
        to,
        effect,
    })
}

/// Holds the current state. Owned by the single event consumer, so every
/// mutation goes through `apply`.
#[derive(Debug, Default)]
pub struct StateMachine {
    state: InteractionState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> InteractionState {
        self.state
    }

    /// Apply `trigger`, returning the transition if the table allows it.
    pub fn apply(&mut self, trigger: Trigger, can_record: bool) -> Option<Transition> {
        let step = transition(self.state, trigger, can_record);
        match step {
            Some(t) => {
                debug!(from = %t.from, to = %t.to, trigger = %trigger, "Interaction state");
                self.state = t.to;
            }
            None => debug!(state = %self.state, trigger = %trigger, "Ignored trigger"),
        }
        step
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use InteractionAction as A;
    use InteractionState as S;

    const ALL_STATES: [S; 5] = [S::Idle, S::Active, S::Waiting, S::Recording, S::Processing];

    fn to(state: S, trigger: Trigger, can_record: bool) -> Option<S> {
        transition(state, trigger, can_record).map(|t| t.to)
    }

    #[test]
    fn test_happy_path() {
        let mut sm = StateMachine::new();
        assert_eq!(sm.current(), S::Idle);

        let steps = [
            (Trigger::Action(A::Activate), S::Active, Some(Effect::Activate)),
            (Trigger::Action(A::Record), S::Waiting, Some(Effect::BeginCycle)),
            (Trigger::CountdownComplete, S::Recording, None),
            (Trigger::CaptureComplete, S::Processing, Some(Effect::BeginDispatch)),
            (Trigger::DispatchComplete, S::Active, Some(Effect::DeliverReply)),
        ];
        for (trigger, expected, effect) in steps {
            let t = sm.apply(trigger, true).unwrap();
            assert_eq!(t.to, expected);
            assert_eq!(t.effect, effect);
            assert_eq!(sm.current(), expected);
        }
    }

    #[test]
    fn test_deactivate_from_every_state() {
        for state in ALL_STATES {
            let t = transition(state, Trigger::Action(A::Deactivate), false).unwrap();
            assert_eq!(t.to, S::Idle);
            assert_eq!(t.effect, Some(Effect::Deactivate));
        }
    }

    #[test]
    fn test_record_requires_permission() {
        assert_eq!(to(S::Active, Trigger::Action(A::Record), false), None);
        assert_eq!(to(S::Active, Trigger::Action(A::Record), true), Some(S::Waiting));
    }

    #[test]
    fn test_record_only_from_active() {
        for state in [S::Idle, S::Waiting, S::Recording, S::Processing] {
            assert_eq!(to(state, Trigger::Action(A::Record), true), None, "{}", state);
        }
    }

    #[test]
    fn test_cancel_only_while_recording() {
        let t = transition(S::Recording, Trigger::Action(A::Cancel), false).unwrap();
        assert_eq!(t.to, S::Active);
        assert_eq!(t.effect, Some(Effect::DiscardCycle));

        for state in [S::Idle, S::Active, S::Waiting, S::Processing] {
            assert_eq!(to(state, Trigger::Action(A::Cancel), true), None, "{}", state);
        }
    }

    #[test]
    fn test_failed_capture_returns_to_active() {
        for state in [S::Waiting, S::Recording] {
            let t = transition(state, Trigger::CaptureFailed, false).unwrap();
            assert_eq!(t.to, S::Active, "{}", state);
            assert_eq!(t.effect, Some(Effect::AbandonCycle));
        }
        for state in [S::Idle, S::Active, S::Processing] {
            assert_eq!(to(state, Trigger::CaptureFailed, true), None, "{}", state);
        }
    }

    #[test]
    fn test_activate_only_from_idle() {
        for state in [S::Active, S::Waiting, S::Recording, S::Processing] {
            assert_eq!(to(state, Trigger::Action(A::Activate), true), None, "{}", state);
        }
    }

    #[test]
    fn test_none_action_is_always_ignored() {
        for state in ALL_STATES {
            assert_eq!(to(state, Trigger::Action(A::None), true), None);
        }
    }

    #[test]
    fn test_worker_triggers_out_of_place_are_ignored() {
        // Results that arrive after the state moved on must not apply.
        assert_eq!(to(S::Idle, Trigger::CountdownComplete, true), None);
        assert_eq!(to(S::Active, Trigger::CaptureComplete, true), None);
        assert_eq!(to(S::Active, Trigger::DispatchComplete, true), None);
        assert_eq!(to(S::Idle, Trigger::CaptureFailed, true), None);
    }

    #[test]
    fn test_no_path_reaches_recording_twice_without_active() {
        // From Recording or Processing no single trigger enters Waiting.
        for state in [S::Recording, S::Processing] {
            for trigger in [
                Trigger::Action(A::Record),
                Trigger::Action(A::Activate),
                Trigger::CountdownComplete,
            ] {
                assert_ne!(to(state, trigger, true), Some(S::Waiting));
            }
        }
    }

    #[test]
    fn test_ignored_trigger_keeps_state() {
        let mut sm = StateMachine::new();
        assert!(sm.apply(Trigger::Action(A::Record), true).is_none());
        assert_eq!(sm.current(), S::Idle);
    }
}
