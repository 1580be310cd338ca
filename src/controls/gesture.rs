//! Click-versus-drag classification of a single pointer press.

use glam::Vec2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    /// Released within the threshold of where it was pressed.
    Click(Vec2),
    Drag,
}

/// Tells a click from a drag between one press and its release.
///
/// Movement is measured per axis from the press position; once either axis
/// exceeds `threshold` pixels the gesture is a drag for the rest of the press.
#[derive(Debug, Clone, Copy)]
pub struct PointerGesture {
    threshold: f32,
    start: Option<Vec2>,
    moved: bool,
}

impl PointerGesture {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.max(0.0),
            start: None,
            moved: false,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn press(&mut self, at: Vec2) {
        self.start = Some(at);
        self.moved = false;
    }

    pub fn motion(&mut self, at: Vec2) {
        let Some(start) = self.start else {
            return;
        };
        let delta = (at - start).abs();
        if delta.x > self.threshold || delta.y > self.threshold {
            self.moved = true;
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.start.is_some()
    }

    /// `None` when there was no matching press.
    pub fn release(&mut self, at: Vec2) -> Option<Gesture> {
        self.motion(at);
        self.start.take()?;
        Some(if self.moved {
            Gesture::Drag
        } else {
            Gesture::Click(at)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_wobble_is_still_a_click() {
        let mut gesture = PointerGesture::new(5.0);
        gesture.press(Vec2::new(100.0, 100.0));
        gesture.motion(Vec2::new(104.0, 97.0));
        assert_eq!(
            gesture.release(Vec2::new(103.0, 101.0)),
            Some(Gesture::Click(Vec2::new(103.0, 101.0)))
        );
    }

    #[test]
    fn any_axis_past_threshold_makes_a_drag() {
        let mut gesture = PointerGesture::new(5.0);
        gesture.press(Vec2::ZERO);
        gesture.motion(Vec2::new(0.0, 6.0));
        // Returning to the start does not undo the drag.
        gesture.motion(Vec2::ZERO);
        assert_eq!(gesture.release(Vec2::ZERO), Some(Gesture::Drag));
    }

    #[test]
    fn diagonal_under_threshold_per_axis_is_a_click() {
        let mut gesture = PointerGesture::new(5.0);
        gesture.press(Vec2::ZERO);
        // Euclidean distance is ~6.4 but each axis stays within 5.
        assert!(matches!(
            gesture.release(Vec2::new(4.5, 4.5)),
            Some(Gesture::Click(_))
        ));
    }

    #[test]
    fn release_without_press_is_ignored() {
        let mut gesture = PointerGesture::new(5.0);
        assert_eq!(gesture.release(Vec2::ZERO), None);
        gesture.press(Vec2::ZERO);
        assert!(gesture.is_pressed());
        gesture.release(Vec2::ZERO);
        assert!(!gesture.is_pressed());
    }
}
