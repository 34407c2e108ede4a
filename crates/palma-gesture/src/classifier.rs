//! Pure hand-pose classifier.
//!
//! Landmark indices follow the 21-point hand skeleton: 0 is the wrist,
//! then four points per finger from base to tip (thumb 1-4, index 5-8,
//! middle 9-12, ring 13-16, pinky 17-20).

use palma_core::{FingerState, GestureLabel, HandObservation, HandSide, Landmark};

const THUMB_TIP: usize = 4;
const THUMB_IP: usize = 3;

/// Tips of index, middle, ring and pinky. Each finger's proximal joint
/// sits two indices below its tip.
const FINGER_TIPS: [usize; 4] = [8, 12, 16, 20];

/// Derive the raised/lowered status of every finger.
///
/// Returns `None` for malformed observations (wrong point count or
/// non-finite coordinates).
pub fn finger_state(obs: &HandObservation) -> Option<FingerState> {
    if !obs.is_complete() || !obs.landmarks.iter().all(is_finite) {
        return None;
    }
    let lm = &obs.landmarks;

    // Thumb moves sideways, so compare x; which way is "out" depends on the hand.
    let thumb = match obs.side {
        HandSide::Right => lm[THUMB_TIP].x > lm[THUMB_IP].x,
        HandSide::Left => lm[THUMB_TIP].x < lm[THUMB_IP].x,
    };

    let [index, middle, ring, pinky] = FINGER_TIPS.map(|tip| lm[tip].y < lm[tip - 2].y);

    Some(FingerState {
        thumb,
        index,
        middle,
        ring,
        pinky,
    })
}

/// Map a finger state onto a gesture label using the first-match table.
pub fn classify_fingers(fingers: &FingerState) -> GestureLabel {
    let FingerState {
        thumb,
        index,
        middle,
        ring,
        pinky,
    } = *fingers;

    match fingers.raised_count() {
        0 => GestureLabel::Fist,
        5 => GestureLabel::OpenHand,
        1 if index => GestureLabel::OneFinger,
        1 if thumb => GestureLabel::ThumbsUp,
        2 if index && middle => GestureLabel::Peace,
        2 if thumb && pinky => GestureLabel::CallMe,
        3 if index && middle && ring => GestureLabel::Three,
        4 if !thumb => GestureLabel::Four,
        _ => GestureLabel::Unknown,
    }
}

/// Classify one frame. An absent or malformed observation yields `None`.
pub fn classify(obs: Option<&HandObservation>) -> GestureLabel {
    obs.and_then(finger_state)
        .map(|fingers| classify_fingers(&fingers))
        .unwrap_or(GestureLabel::None)
}

fn is_finite(l: &Landmark) -> bool {
    l.x.is_finite() && l.y.is_finite() && l.z.is_finite()
}
