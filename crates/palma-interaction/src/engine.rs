//! The interaction engine: owns every coordinator and the state machine.
//!
//! The primary loop feeds hand observations (or actions) in and calls `pump`
//! once per tick. Workers never touch engine state; they report back through
//! a single-consumer queue, and `pump` applies their events in order. A
//! capture-and-dispatch cycle holds the in-flight flag from the accepted
//! RECORD until its terminal event, including when it was discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use palma_action::{CommandDispatcher, DispatchOutcome};
use palma_audio::SpeechOutput;
use palma_chat::{ConversationProxy, APOLOGY_REPLY};
use palma_core::{
    EventBus, GestureLabel, HandObservation, InteractionAction, InteractionState, PalmaEvent,
};
use palma_gesture::{classify, GestureDebouncer};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capture::{CaptureError, CaptureProgress, Captured, ModelStatus, VoiceCaptureCoordinator};
use crate::state::{Effect, StateMachine, Transition, Trigger};

pub const ACTIVATION_NOTICE: &str = "Assistente ativado";
pub const DEACTIVATION_NOTICE: &str = "Assistente desativado";
/// Shown as the transcript when capture produced nothing usable.
pub const TRANSCRIPTION_FAILED: &str = "Erro na transcrição";

/// Reported by workers to the engine.
#[derive(Debug)]
enum WorkerEvent {
    Tick { cycle_id: Uuid, remaining: u8 },
    CountdownComplete { cycle_id: Uuid },
    CaptureFinished {
        cycle_id: Uuid,
        result: Result<Captured, CaptureError>,
    },
    DispatchFinished { cycle_id: Uuid, reply: String },
}

impl WorkerEvent {
    fn cycle_id(&self) -> Uuid {
        match self {
            WorkerEvent::Tick { cycle_id, .. }
            | WorkerEvent::CountdownComplete { cycle_id }
            | WorkerEvent::CaptureFinished { cycle_id, .. }
            | WorkerEvent::DispatchFinished { cycle_id, .. } => *cycle_id,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Cycle {
    id: Uuid,
    discarded: bool,
}

/// What the status surface shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub state: InteractionState,
    pub state_label: &'static str,
    pub hint: Option<&'static str>,
    pub gesture: GestureLabel,
    pub gesture_description: &'static str,
    pub countdown: Option<u8>,
    pub transcript: String,
    pub response: String,
    pub voice_model: ModelStatus,
    pub assistant_available: bool,
    pub cycle_in_flight: bool,
}

pub struct InteractionEngine {
    machine: StateMachine,
    debouncer: GestureDebouncer,
    gesture: GestureLabel,

    speech: Arc<dyn SpeechOutput>,
    dispatcher: Arc<CommandDispatcher>,
    proxy: Arc<ConversationProxy>,
    capture: Arc<VoiceCaptureCoordinator>,
    events: EventBus,

    tx: mpsc::UnboundedSender<WorkerEvent>,
    rx: mpsc::UnboundedReceiver<WorkerEvent>,
    in_flight: AtomicBool,
    cycle: Option<Cycle>,

    countdown: Option<u8>,
    transcript: String,
    response: String,
}

impl InteractionEngine {
    pub fn new(
        speech: Arc<dyn SpeechOutput>,
        dispatcher: Arc<CommandDispatcher>,
        proxy: Arc<ConversationProxy>,
        capture: Arc<VoiceCaptureCoordinator>,
        events: EventBus,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            machine: StateMachine::new(),
            debouncer: GestureDebouncer::new(),
            gesture: GestureLabel::None,
            speech,
            dispatcher,
            proxy,
            capture,
            events,
            tx,
            rx,
            in_flight: AtomicBool::new(false),
            cycle: None,
            countdown: None,
            transcript: String::new(),
            response: String::new(),
        }
    }

    pub fn state(&self) -> InteractionState {
        self.machine.current()
    }

    /// True from an accepted RECORD until that cycle's terminal event.
    pub fn cycle_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let state = self.machine.current();
        EngineSnapshot {
            state,
            state_label: state.label(),
            hint: state.hint(),
            gesture: self.gesture,
            gesture_description: self.gesture.description(),
            countdown: self.countdown,
            transcript: self.transcript.clone(),
            response: self.response.clone(),
            voice_model: self.capture.model_status(),
            assistant_available: self.proxy.is_available(),
            cycle_in_flight: self.cycle_in_flight(),
        }
    }

    /// Classify one frame's hand, debounce, and act on the result.
    pub fn observe(&mut self, hand: Option<&HandObservation>) -> InteractionAction {
        let label = classify(hand);
        if label != self.gesture {
            self.gesture = label;
            self.events.publish(PalmaEvent::GestureChanged {
                gesture: label,
                timestamp: Utc::now(),
            });
        }
        let action = self.debouncer.update(label);
        if action != InteractionAction::None {
            self.handle_action(action);
        }
        action
    }

    /// Apply a gesture action. Must be called inside a tokio runtime.
    pub fn handle_action(&mut self, action: InteractionAction) -> Option<Transition> {
        let can_record = action == InteractionAction::Record && self.try_claim_cycle();
        let step = self.machine.apply(Trigger::Action(action), can_record);
        if step.is_none() && can_record {
            self.in_flight.store(false, Ordering::SeqCst);
        }
        let step = step?;
        self.after_transition(step);
        Some(step)
    }

    /// Take the in-flight flag if a new cycle may start now.
    fn try_claim_cycle(&self) -> bool {
        if self.machine.current() != InteractionState::Active {
            return false;
        }
        if !self.capture.is_ready() {
            debug!("RECORD ignored: voice model not ready");
            return false;
        }
        let claimed = self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if !claimed {
            debug!("RECORD ignored: a cycle is already in flight");
        }
        claimed
    }

    /// Apply every queued worker event. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.on_worker_event(event);
            applied += 1;
        }
        applied
    }

    /// Apply worker events until no cycle is in flight.
    pub async fn settle(&mut self) {
        self.pump();
        while self.cycle_in_flight() {
            match self.rx.recv().await {
                Some(event) => self.on_worker_event(event),
                None => break,
            }
        }
    }

    fn apply(&mut self, trigger: Trigger) -> Option<Transition> {
        let step = self.machine.apply(trigger, false)?;
        self.after_transition(step);
        Some(step)
    }

    fn after_transition(&mut self, step: Transition) {
        self.events.publish(PalmaEvent::StateChanged {
            from: step.from,
            to: step.to,
            timestamp: Utc::now(),
        });
        match step.effect {
            Some(Effect::Activate) => {
                info!("Assistant activated");
                self.speech.speak(ACTIVATION_NOTICE);
            }
            Some(Effect::Deactivate) => {
                info!("Assistant deactivated");
                self.discard_cycle();
                self.transcript.clear();
                self.response.clear();
                self.speech.speak(DEACTIVATION_NOTICE);
            }
            Some(Effect::BeginCycle) => self.begin_cycle(),
            Some(Effect::DiscardCycle) => {
                info!("Recording cancelled");
                self.discard_cycle();
            }
            // Driven from worker events.
            Some(Effect::BeginDispatch | Effect::AbandonCycle | Effect::DeliverReply) | None => {}
        }
    }

    fn discard_cycle(&mut self) {
        self.countdown = None;
        if let Some(cycle) = self.cycle.as_mut() {
            if !cycle.discarded {
                debug!(cycle = %cycle.id, "Cycle marked for discard");
                cycle.discarded = true;
            }
        }
    }

    fn finish_cycle(&mut self) {
        self.countdown = None;
        if let Some(cycle) = self.cycle.take() {
            if cycle.discarded {
                info!(cycle = %cycle.id, "Discarded cycle result");
                self.events.publish(PalmaEvent::CycleDiscarded {
                    cycle_id: cycle.id,
                    timestamp: Utc::now(),
                });
            } else {
                debug!(cycle = %cycle.id, "Cycle complete");
            }
        }
        self.in_flight.store(false, Ordering::SeqCst);
    }

    // =========================================================================
    // Workers
    // =========================================================================

    fn begin_cycle(&mut self) {
        let cycle_id = Uuid::new_v4();
        self.cycle = Some(Cycle {
            id: cycle_id,
            discarded: false,
        });
        info!(cycle = %cycle_id, "Capture cycle started");
        self.events.publish(PalmaEvent::CycleStarted {
            cycle_id,
            timestamp: Utc::now(),
        });

        let capture = Arc::clone(&self.capture);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let progress_tx = tx.clone();
            let progress = move |p: CaptureProgress| {
                let event = match p {
                    CaptureProgress::Tick(remaining) => WorkerEvent::Tick {
                        cycle_id,
                        remaining,
                    },
                    CaptureProgress::Recording => WorkerEvent::CountdownComplete { cycle_id },
                };
                let _ = progress_tx.send(event);
            };
            let worker = tokio::spawn(async move { capture.capture(cycle_id, progress).await });
            let result = worker
                .await
                .unwrap_or_else(|e| Err(CaptureError::Aborted(e.to_string())));
            let _ = tx.send(WorkerEvent::CaptureFinished { cycle_id, result });
        });
    }

    fn begin_dispatch(&self, cycle_id: Uuid, text: String) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let proxy = Arc::clone(&self.proxy);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let worker = tokio::spawn(route(dispatcher, proxy, text));
            let reply = worker.await.unwrap_or_else(|e| {
                warn!(cycle = %cycle_id, error = %e, "Dispatch worker failed");
                APOLOGY_REPLY.to_string()
            });
            let _ = tx.send(WorkerEvent::DispatchFinished { cycle_id, reply });
        });
    }

    fn on_worker_event(&mut self, event: WorkerEvent) {
        let cycle_id = event.cycle_id();
        let Some(cycle) = self.cycle.filter(|c| c.id == cycle_id) else {
            debug!(cycle = %cycle_id, "Ignoring event from a finished cycle");
            return;
        };

        match event {
            WorkerEvent::Tick { remaining, .. } => {
                if !cycle.discarded {
                    self.countdown = Some(remaining);
                    self.events.publish(PalmaEvent::CountdownTick {
                        cycle_id,
                        remaining,
                        timestamp: Utc::now(),
                    });
                }
            }
            WorkerEvent::CountdownComplete { .. } => {
                if !cycle.discarded {
                    self.countdown = None;
                    self.apply(Trigger::CountdownComplete);
                }
            }
            WorkerEvent::CaptureFinished { result, .. } => {
                if cycle.discarded {
                    self.finish_cycle();
                    return;
                }
                self.on_capture_finished(cycle_id, result);
            }
            WorkerEvent::DispatchFinished { reply, .. } => {
                if cycle.discarded {
                    self.finish_cycle();
                    return;
                }
                if self.apply(Trigger::DispatchComplete).is_some() {
                    info!(cycle = %cycle_id, "Reply ready");
                    self.response = reply.clone();
                    self.speech.speak(&reply);
                    self.events.publish(PalmaEvent::ReplyReady {
                        cycle_id,
                        text: reply,
                        timestamp: Utc::now(),
                    });
                }
                self.finish_cycle();
            }
        }
    }

    fn on_capture_finished(&mut self, cycle_id: Uuid, result: Result<Captured, CaptureError>) {
        match result {
            Ok(captured) => {
                self.transcript = captured.text.clone();
                self.events.publish(PalmaEvent::TranscriptReady {
                    cycle_id,
                    text: Some(captured.text.clone()),
                    timestamp: Utc::now(),
                });
                match self.apply(Trigger::CaptureComplete) {
                    Some(step) if step.effect == Some(Effect::BeginDispatch) => {
                        self.begin_dispatch(cycle_id, captured.text);
                    }
                    _ => self.finish_cycle(),
                }
            }
            Err(e) => {
                match &e {
                    CaptureError::EmptyTranscript => debug!(cycle = %cycle_id, "Nothing was heard"),
                    other => warn!(cycle = %cycle_id, error = %other, "Capture failed"),
                }
                self.transcript = TRANSCRIPTION_FAILED.to_string();
                self.events.publish(PalmaEvent::TranscriptReady {
                    cycle_id,
                    text: None,
                    timestamp: Utc::now(),
                });
                self.apply(Trigger::CaptureFailed);
                self.finish_cycle();
            }
        }
    }
}

/// Local command first; unrecognized text goes to the assistant.
async fn route(
    dispatcher: Arc<CommandDispatcher>,
    proxy: Arc<ConversationProxy>,
    text: String,
) -> String {
    let outcome = {
        let text = text.clone();
        tokio::task::spawn_blocking(move || dispatcher.dispatch(&text)).await
    };
    match outcome {
        Ok(DispatchOutcome::Unrecognized) => {
            debug!("No command matched; asking the assistant");
            proxy.chat(&text).await
        }
        Ok(outcome) => outcome.reply().unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "Command worker panicked");
            APOLOGY_REPLY.to_string()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureSettings;
    use palma_action::RecordingEnvironment;
    use palma_audio::{MockRecorder, MockSpeech};
    use palma_chat::MockBackend;
    use palma_whisper::MockTranscriptionService;

    fn engine(text: &str) -> (InteractionEngine, Arc<MockSpeech>) {
        let speech = Arc::new(MockSpeech::default());
        let dispatcher = Arc::new(CommandDispatcher::with_defaults(
            Arc::new(RecordingEnvironment::new()),
            std::env::temp_dir(),
        ));
        let proxy = Arc::new(ConversationProxy::new(
            Arc::new(MockBackend::replying("Brasília.")),
            "seja breve",
        ));
        let capture = Arc::new(VoiceCaptureCoordinator::new(
            speech.clone(),
            Arc::new(MockRecorder::default()),
            CaptureSettings::default(),
        ));
        capture.install_transcriber(Arc::new(MockTranscriptionService::with_text(text)));
        let engine = InteractionEngine::new(speech.clone(), dispatcher, proxy, capture, EventBus::new());
        (engine, speech)
    }

    #[tokio::test]
    async fn test_activate_speaks_notice() {
        let (mut engine, speech) = engine("oi");
        let step = engine.handle_action(InteractionAction::Activate).unwrap();
        assert_eq!(step.to, InteractionState::Active);
        assert_eq!(speech.spoken(), vec![ACTIVATION_NOTICE]);
        assert!(engine.handle_action(InteractionAction::Activate).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cycle_publishes_events_in_order() {
        let (mut engine, _speech) = engine("que horas são");
        let mut rx = engine.events().subscribe();
        engine.handle_action(InteractionAction::Activate);
        engine.handle_action(InteractionAction::Record);
        assert_eq!(engine.state(), InteractionState::Waiting);
        engine.settle().await;
        assert_eq!(engine.state(), InteractionState::Active);

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.event_name());
        }
        let ticks = names.iter().filter(|n| **n == "countdown_tick").count();
        assert_eq!(ticks, 3);
        let started = names.iter().position(|n| *n == "cycle_started").unwrap();
        let transcript = names.iter().position(|n| *n == "transcript_ready").unwrap();
        let reply = names.iter().position(|n| *n == "reply_ready").unwrap();
        assert!(started < transcript && transcript < reply);

        let snap = engine.snapshot();
        assert_eq!(snap.transcript, "que horas são");
        assert!(snap.response.starts_with("São "));
        assert!(!snap.cycle_in_flight);
        assert_eq!(snap.countdown, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_visible_while_waiting() {
        let (mut engine, _speech) = engine("oi");
        engine.handle_action(InteractionAction::Activate);
        engine.handle_action(InteractionAction::Record);

        // Grace interval (1 s) then the first tick.
        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        engine.pump();
        assert_eq!(engine.snapshot().countdown, Some(3));
        assert_eq!(engine.state(), InteractionState::Waiting);

        tokio::time::sleep(std::time::Duration::from_millis(3000)).await;
        engine.pump();
        assert_eq!(engine.state(), InteractionState::Recording);
        assert_eq!(engine.snapshot().countdown, None);
        engine.settle().await;
    }

    #[tokio::test]
    async fn test_observe_debounces_gestures() {
        use palma_core::{HandSide, Landmark, LANDMARK_COUNT};

        fn open_hand() -> HandObservation {
            // Right hand: thumb tip right of its joint, fingertips above joints.
            let mut points = vec![Landmark::new(0.5, 0.5, 0.0); LANDMARK_COUNT];
            points[3] = Landmark::new(0.40, 0.5, 0.0);
            points[4] = Landmark::new(0.45, 0.5, 0.0);
            for tip in [8, 12, 16, 20] {
                points[tip - 2] = Landmark::new(0.5, 0.4, 0.0);
                points[tip] = Landmark::new(0.5, 0.2, 0.0);
            }
            HandObservation::new(HandSide::Right, points)
        }

        let (mut engine, speech) = engine("oi");
        let hand = open_hand();
        assert_eq!(engine.observe(Some(&hand)), InteractionAction::Activate);
        assert_eq!(engine.observe(Some(&hand)), InteractionAction::None);
        assert_eq!(engine.state(), InteractionState::Active);
        assert_eq!(engine.snapshot().gesture, GestureLabel::OpenHand);

        // Losing the hand does not deactivate.
        assert_eq!(engine.observe(None), InteractionAction::None);
        assert_eq!(engine.state(), InteractionState::Active);
        assert_eq!(speech.spoken(), vec![ACTIVATION_NOTICE]);
    }

    #[tokio::test]
    async fn test_snapshot_hints() {
        let (mut engine, _speech) = engine("oi");
        let snap = engine.snapshot();
        assert_eq!(snap.state_label, "INATIVO");
        assert_eq!(snap.hint, Some("Mostre a mao aberta para ativar"));
        assert_eq!(snap.voice_model, ModelStatus::Ready);
        assert!(snap.assistant_available);

        engine.handle_action(InteractionAction::Activate);
        assert_eq!(
            engine.snapshot().hint,
            Some("Mostre 1 dedo para gravar comando")
        );
    }

    #[tokio::test]
    async fn test_record_without_model_is_noop() {
        let speech = Arc::new(MockSpeech::default());
        let capture = Arc::new(VoiceCaptureCoordinator::new(
            speech.clone(),
            Arc::new(MockRecorder::default()),
            CaptureSettings::default(),
        ));
        let mut engine = InteractionEngine::new(
            speech,
            Arc::new(CommandDispatcher::with_defaults(
                Arc::new(RecordingEnvironment::new()),
                std::env::temp_dir(),
            )),
            Arc::new(ConversationProxy::unavailable()),
            capture,
            EventBus::new(),
        );
        engine.handle_action(InteractionAction::Activate);
        assert!(engine.handle_action(InteractionAction::Record).is_none());
        assert_eq!(engine.state(), InteractionState::Active);
        assert!(!engine.cycle_in_flight());
        assert_eq!(engine.snapshot().voice_model, ModelStatus::Loading);
    }
}
