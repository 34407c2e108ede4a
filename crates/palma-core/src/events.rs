use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::{GestureLabel, InteractionState};

/// Capacity of the UI broadcast channel. Slow subscribers lag and skip.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Domain events emitted by the interaction orchestrator.
///
/// Consumed by the UI collaborator (status renderer) and by the log.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum PalmaEvent {
    /// The held gesture changed.
    GestureChanged {
        gesture: GestureLabel,
        timestamp: DateTime<Utc>,
    },

    /// The interaction state machine moved.
    StateChanged {
        from: InteractionState,
        to: InteractionState,
        timestamp: DateTime<Utc>,
    },

    /// A capture-and-dispatch cycle was accepted.
    CycleStarted {
        cycle_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// One tick of the pre-recording countdown (3, 2, 1).
    CountdownTick {
        cycle_id: Uuid,
        remaining: u8,
        timestamp: DateTime<Utc>,
    },

    /// Speech was captured and transcribed. `text` is `None` on failure.
    TranscriptReady {
        cycle_id: Uuid,
        text: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A reply (command result or AI answer) is ready to be shown and spoken.
    ReplyReady {
        cycle_id: Uuid,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// A cycle result arrived after CANCEL/DEACTIVATE and was dropped.
    CycleDiscarded {
        cycle_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// The voice model finished loading (or failed to).
    VoiceModelStatus {
        ready: bool,
        timestamp: DateTime<Utc>,
    },
}

impl PalmaEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            PalmaEvent::GestureChanged { timestamp, .. }
            | PalmaEvent::StateChanged { timestamp, .. }
            | PalmaEvent::CycleStarted { timestamp, .. }
            | PalmaEvent::CountdownTick { timestamp, .. }
            | PalmaEvent::TranscriptReady { timestamp, .. }
            | PalmaEvent::ReplyReady { timestamp, .. }
            | PalmaEvent::CycleDiscarded { timestamp, .. }
            | PalmaEvent::VoiceModelStatus { timestamp, .. } => *timestamp,
        }
    }

    /// Returns a short event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            PalmaEvent::GestureChanged { .. } => "gesture_changed",
            PalmaEvent::StateChanged { .. } => "state_changed",
            PalmaEvent::CycleStarted { .. } => "cycle_started",
            PalmaEvent::CountdownTick { .. } => "countdown_tick",
            PalmaEvent::TranscriptReady { .. } => "transcript_ready",
            PalmaEvent::ReplyReady { .. } => "reply_ready",
            PalmaEvent::CycleDiscarded { .. } => "cycle_discarded",
            PalmaEvent::VoiceModelStatus { .. } => "voice_model_status",
        }
    }
}

/// Fan-out channel for `PalmaEvent`s.
///
/// Publishing never blocks and never fails: with no subscribers the event
/// is simply dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PalmaEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: PalmaEvent) {
        tracing::trace!(event = event.event_name(), "Publishing event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PalmaEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_timestamp_and_name() {
        let ts = Utc::now();
        let event = PalmaEvent::StateChanged {
            from: InteractionState::Idle,
            to: InteractionState::Active,
            timestamp: ts,
        };
        assert_eq!(event.timestamp(), ts);
        assert_eq!(event.event_name(), "state_changed");
    }

    #[test]
    fn test_event_serialization() {
        let event = PalmaEvent::CountdownTick {
            cycle_id: Uuid::new_v4(),
            remaining: 2,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("CountdownTick"));
        assert!(json.contains("\"remaining\":2"));
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish(PalmaEvent::VoiceModelStatus {
            ready: true,
            timestamp: Utc::now(),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();
        for remaining in [3u8, 2, 1] {
            bus.publish(PalmaEvent::CountdownTick {
                cycle_id: id,
                remaining,
                timestamp: Utc::now(),
            });
        }
        for expected in [3u8, 2, 1] {
            match rx.recv().await.unwrap() {
                PalmaEvent::CountdownTick { remaining, .. } => assert_eq!(remaining, expected),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }
}
