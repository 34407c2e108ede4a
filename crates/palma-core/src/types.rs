use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Hand geometry
// =============================================================================

/// Number of tracked points on one hand skeleton.
pub const LANDMARK_COUNT: usize = 21;

/// Which hand an observation belongs to, already corrected for mirrored capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandSide {
    Left,
    Right,
}

impl HandSide {
    /// The opposite side. Trackers that see a flipped image report the
    /// wrong hand and use this to correct it.
    pub fn mirrored(self) -> Self {
        match self {
            HandSide::Left => HandSide::Right,
            HandSide::Right => HandSide::Left,
        }
    }
}

/// One tracked point, in a top-left-origin frame (smaller `y` is higher).
///
/// Serialized as a compact `[x, y, z]` triple.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<[f32; 3]> for Landmark {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Landmark> for [f32; 3] {
    fn from(l: Landmark) -> Self {
        [l.x, l.y, l.z]
    }
}

/// A single detected hand for one frame. Ephemeral, never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandObservation {
    pub side: HandSide,
    pub landmarks: Vec<Landmark>,
}

impl HandObservation {
    pub fn new(side: HandSide, landmarks: Vec<Landmark>) -> Self {
        Self { side, landmarks }
    }

    /// Whether the observation carries the full 21-point skeleton.
    pub fn is_complete(&self) -> bool {
        self.landmarks.len() == LANDMARK_COUNT
    }
}

/// Raised/lowered status of each finger, derived per observation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FingerState {
    pub thumb: bool,
    pub index: bool,
    pub middle: bool,
    pub ring: bool,
    pub pinky: bool,
}

impl FingerState {
    /// Build from `[thumb, index, middle, ring, pinky]`.
    pub fn from_array([thumb, index, middle, ring, pinky]: [bool; 5]) -> Self {
        Self {
            thumb,
            index,
            middle,
            ring,
            pinky,
        }
    }

    pub fn as_array(&self) -> [bool; 5] {
        [self.thumb, self.index, self.middle, self.ring, self.pinky]
    }

    pub fn raised_count(&self) -> usize {
        self.as_array().iter().filter(|&&up| up).count()
    }
}

// =============================================================================
// Gestures and actions
// =============================================================================

/// Discrete classification of a hand pose for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GestureLabel {
    /// No hand in the frame.
    #[default]
    None,
    Fist,
    OpenHand,
    OneFinger,
    ThumbsUp,
    Peace,
    CallMe,
    Three,
    Four,
    Unknown,
}

impl GestureLabel {
    /// The assistant action bound to this gesture. Only four gestures
    /// are bound; the rest map to `InteractionAction::None`.
    pub fn action(&self) -> InteractionAction {
        match self {
            GestureLabel::OpenHand => InteractionAction::Activate,
            GestureLabel::OneFinger => InteractionAction::Record,
            GestureLabel::Fist => InteractionAction::Deactivate,
            GestureLabel::Peace => InteractionAction::Cancel,
            _ => InteractionAction::None,
        }
    }

    /// Portuguese text shown in the status bar.
    pub fn description(&self) -> &'static str {
        match self {
            GestureLabel::None => "Nenhuma mão detectada",
            GestureLabel::Fist => "Punho fechado",
            GestureLabel::OpenHand => "Mão aberta",
            GestureLabel::OneFinger => "Um dedo (indicador)",
            GestureLabel::ThumbsUp => "Polegar para cima",
            GestureLabel::Peace => "Sinal de paz (V)",
            GestureLabel::CallMe => "Me liga (polegar + mínimo)",
            GestureLabel::Three => "Três dedos",
            GestureLabel::Four => "Quatro dedos",
            GestureLabel::Unknown => "Gesto não reconhecido",
        }
    }
}

impl fmt::Display for GestureLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GestureLabel::None => "NONE",
            GestureLabel::Fist => "FIST",
            GestureLabel::OpenHand => "OPEN_HAND",
            GestureLabel::OneFinger => "ONE_FINGER",
            GestureLabel::ThumbsUp => "THUMBS_UP",
            GestureLabel::Peace => "PEACE",
            GestureLabel::CallMe => "CALL_ME",
            GestureLabel::Three => "THREE",
            GestureLabel::Four => "FOUR",
            GestureLabel::Unknown => "UNKNOWN",
        };
        write!(f, "{}", name)
    }
}

/// Edge-triggered request fed to the interaction state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionAction {
    Activate,
    Record,
    Deactivate,
    Cancel,
    #[default]
    None,
}

impl fmt::Display for InteractionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionAction::Activate => write!(f, "ACTIVATE"),
            InteractionAction::Record => write!(f, "RECORD"),
            InteractionAction::Deactivate => write!(f, "DEACTIVATE"),
            InteractionAction::Cancel => write!(f, "CANCEL"),
            InteractionAction::None => write!(f, "NONE"),
        }
    }
}

// =============================================================================
// Interaction state
// =============================================================================

/// Operational state of the assistant. Exactly one holds at a time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionState {
    #[default]
    Idle,
    Active,
    /// Prompt spoken, countdown running, microphone not yet open.
    Waiting,
    Recording,
    Processing,
}

impl InteractionState {
    /// Portuguese status-bar label.
    pub fn label(&self) -> &'static str {
        match self {
            InteractionState::Idle => "INATIVO",
            InteractionState::Active => "ATIVO",
            InteractionState::Waiting => "AGUARDANDO...",
            InteractionState::Recording => "GRAVANDO AGORA!",
            InteractionState::Processing => "PROCESSANDO...",
        }
    }

    /// Instruction line shown under the status bar, if any.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            InteractionState::Idle => Some("Mostre a mao aberta para ativar"),
            InteractionState::Active => Some("Mostre 1 dedo para gravar comando"),
            _ => None,
        }
    }
}

impl fmt::Display for InteractionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionState::Idle => write!(f, "IDLE"),
            InteractionState::Active => write!(f, "ACTIVE"),
            InteractionState::Waiting => write!(f, "WAITING"),
            InteractionState::Recording => write!(f, "RECORDING"),
            InteractionState::Processing => write!(f, "PROCESSING"),
        }
    }
}

// =============================================================================
// Conversation
// =============================================================================

/// Author of a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message in a conversation history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    #[serde(rename = "content")]
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

// =============================================================================
// Command audit
// =============================================================================

/// Result of running a matched command handler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandOutcome {
    Success { message: String },
    Failure { error: String },
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Success { .. })
    }
}

/// One entry of the append-only command audit log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub raw_text: String,
    pub keyword: String,
    pub outcome: CommandOutcome,
}

impl CommandRecord {
    pub fn new(raw_text: &str, keyword: &str, outcome: CommandOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            raw_text: raw_text.to_string(),
            keyword: keyword.to_string(),
            outcome,
        }
    }
}
