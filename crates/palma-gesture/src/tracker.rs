//! Hand-tracking collaborator seam.
//!
//! The landmark detector itself lives outside this workspace. Anything that
//! can produce zero or one `HandObservation` per frame implements
//! `HandTracker`; the primary loop polls it once per tick.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use palma_core::config::TrackingConfig;
use palma_core::{HandObservation, HandSide, Landmark, PalmaError, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// One polled frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A single hand was detected.
    Hand(HandObservation),
    /// No hand (or nothing above the confidence thresholds).
    Empty,
    /// The source has no more frames.
    EndOfStream,
}

impl Frame {
    pub fn observation(&self) -> Option<&HandObservation> {
        match self {
            Frame::Hand(obs) => Some(obs),
            _ => None,
        }
    }
}

/// Produces at most one hand observation per frame (single-hand mode).
///
/// Implementations are owned by the primary loop and must return promptly.
pub trait HandTracker: Send {
    fn next_frame(&mut self) -> Result<Frame>;
}

/// One line of a replay recording: `null` or a hand with optional score.
#[derive(Debug, Deserialize)]
struct RecordedHand {
    side: HandSide,
    landmarks: Vec<Landmark>,
    #[serde(default)]
    score: Option<f32>,
}

/// Replays JSON-lines recordings of detector output.
///
/// Each line is `null` or `{"side": "Left", "landmarks": [[x,y,z], ...],
/// "score": 0.93}`. Sides are recorded as the detector reported them; with
/// `mirrored` set the side is swapped to undo the selfie-view flip.
pub struct ReplayTracker {
    lines: Box<dyn BufRead + Send>,
    mirrored: bool,
    min_confidence: f32,
    frames_read: u64,
}

impl ReplayTracker {
    pub fn new(reader: impl BufRead + Send + 'static, config: &TrackingConfig) -> Self {
        if config.max_num_hands != 1 {
            warn!(
                max_num_hands = config.max_num_hands,
                "Only single-hand tracking is supported; extra hands are ignored"
            );
        }
        Self {
            lines: Box::new(reader),
            mirrored: config.mirrored,
            min_confidence: config.min_detection_confidence,
            frames_read: 0,
        }
    }

    pub fn open(path: &Path, config: &TrackingConfig) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            PalmaError::Gesture(format!("cannot open replay {}: {}", path.display(), e))
        })?;
        info!(path = %path.display(), "Replaying recorded hand observations");
        Ok(Self::new(BufReader::new(file), config))
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    fn parse_line(&self, line: &str) -> Frame {
        let recorded: Option<RecordedHand> = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                debug!(frame = self.frames_read, error = %e, "Skipping malformed replay frame");
                return Frame::Empty;
            }
        };

        let Some(hand) = recorded else {
            return Frame::Empty;
        };
        if hand.score.is_some_and(|s| s < self.min_confidence) {
            return Frame::Empty;
        }

        let side = if self.mirrored {
            hand.side.mirrored()
        } else {
            hand.side
        };
        Frame::Hand(HandObservation::new(side, hand.landmarks))
    }
}

impl HandTracker for ReplayTracker {
    fn next_frame(&mut self) -> Result<Frame> {
        let mut line = String::new();
        let read = self.lines.read_line(&mut line)?;
        if read == 0 {
            return Ok(Frame::EndOfStream);
        }
        self.frames_read += 1;

        let line = line.trim();
        if line.is_empty() {
            return Ok(Frame::Empty);
        }
        Ok(self.parse_line(line))
    }
}
