use palma_core::{GestureLabel, InteractionAction};
use tracing::debug;

/// Turns a per-frame gesture stream into edge-triggered actions.
///
/// A gesture held across many frames fires its action once, on the frame
/// where it first appears. Losing the hand resets the held label to
/// `GestureLabel::None` without firing anything.
#[derive(Debug, Default)]
pub struct GestureDebouncer {
    last: GestureLabel,
}

impl GestureDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one frame's label; returns the action to fire, if any.
    pub fn update(&mut self, label: GestureLabel) -> InteractionAction {
        if label == self.last {
            return InteractionAction::None;
        }
        debug!(from = %self.last, to = %label, "Gesture changed");
        self.last = label;
        label.action()
    }

    /// The label seen on the previous frame.
    pub fn current(&self) -> GestureLabel {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = GestureLabel::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(labels: &[GestureLabel]) -> Vec<InteractionAction> {
        let mut debouncer = GestureDebouncer::new();
        labels
            .iter()
            .map(|&l| debouncer.update(l))
            .filter(|a| *a != InteractionAction::None)
            .collect()
    }

    #[test]
    fn test_sustained_gesture_fires_once() {
        for n in [1usize, 2, 30, 300] {
            let labels = vec![GestureLabel::OpenHand; n];
            assert_eq!(run(&labels), vec![InteractionAction::Activate], "run of {}", n);
        }
    }

    #[test]
    fn test_each_maximal_run_fires_exactly_once() {
        use GestureLabel::*;
        let labels = [
            OpenHand, OpenHand, OneFinger, OneFinger, OneFinger, Peace, Fist, Fist, OpenHand,
        ];
        assert_eq!(
            run(&labels),
            vec![
                InteractionAction::Activate,
                InteractionAction::Record,
                InteractionAction::Cancel,
                InteractionAction::Deactivate,
                InteractionAction::Activate,
            ]
        );
    }

    #[test]
    fn test_losing_hand_rearms_without_deactivate() {
        use GestureLabel::*;
        let labels = [OneFinger, OneFinger, None, None, OneFinger];
        assert_eq!(
            run(&labels),
            vec![InteractionAction::Record, InteractionAction::Record]
        );
    }

    #[test]
    fn test_unbound_gestures_update_held_label_silently() {
        let mut debouncer = GestureDebouncer::new();
        assert_eq!(debouncer.update(GestureLabel::ThumbsUp), InteractionAction::None);
        assert_eq!(debouncer.current(), GestureLabel::ThumbsUp);
        assert_eq!(debouncer.update(GestureLabel::OpenHand), InteractionAction::Activate);

        debouncer.reset();
        assert_eq!(debouncer.current(), GestureLabel::None);
        assert_eq!(debouncer.update(GestureLabel::OpenHand), InteractionAction::Activate);
    }
}
