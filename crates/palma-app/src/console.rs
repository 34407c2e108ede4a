//! Terminal status view.
//!
//! Subscribes to the event bus and prints one line per event a user would
//! notice: state changes, countdown, transcript, reply and model status.

use palma_core::{GestureLabel, PalmaEvent};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

/// Status line for `event`, or `None` for events the view does not show.
pub fn describe(event: &PalmaEvent) -> Option<String> {
    match event {
        PalmaEvent::StateChanged { to, .. } => Some(match to.hint() {
            Some(hint) => format!("[{}] {}", to.label(), hint),
            None => format!("[{}]", to.label()),
        }),
        PalmaEvent::GestureChanged { gesture, .. } if *gesture != GestureLabel::None => {
            Some(format!("Gesto: {} ({})", gesture.description(), gesture))
        }
        PalmaEvent::CountdownTick { remaining, .. } => Some(format!("{}...", remaining)),
        PalmaEvent::TranscriptReady { text: Some(text), .. } => Some(format!("Você: {}", text)),
        PalmaEvent::TranscriptReady { text: None, .. } => Some("Erro na transcrição".to_string()),
        PalmaEvent::ReplyReady { text, .. } => Some(format!("Assistente: {}", text)),
        PalmaEvent::VoiceModelStatus { ready, .. } => Some(format!(
            "Whisper: {}",
            if *ready { "OK" } else { "OFF" }
        )),
        _ => None,
    }
}

/// Print status lines until the bus closes.
pub async fn render(mut rx: broadcast::Receiver<PalmaEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Some(line) = describe(&event) {
                    println!("{}", line);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Status view fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
