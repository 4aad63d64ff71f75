use std::fmt;
use std::time::Duration;

use crate::action::ActionRef;

/// An action being animated from `t = 0` to `t = 1` over a fixed duration.
///
/// The clock is advanced explicitly with [`Transition::advance`], so the
/// caller decides what a frame is. Progress is linear in time; the `t`
/// handed to the action is eased with a cubic in-out curve.
pub struct Transition {
    action: ActionRef,
    annotation: Option<String>,
    duration: Duration,
    elapsed: Duration,
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("action", &self.action.name())
            .field("annotation", &self.annotation)
            .field("duration", &self.duration)
            .field("elapsed", &self.elapsed)
            .finish()
    }
}

impl Transition {
    #[must_use]
    pub const fn new(action: ActionRef, annotation: Option<String>, duration: Duration) -> Self {
        Self {
            action,
            annotation,
            duration,
            elapsed: Duration::ZERO,
        }
    }

    #[must_use]
    pub const fn action(&self) -> &ActionRef {
        &self.action
    }

    #[must_use]
    pub fn annotation(&self) -> Option<&str> {
        self.annotation.as_deref()
    }

    /// Current position in `[0, 1]`. A zero duration is complete at once.
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (self.elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    /// Eased position in `[0, 1]`.
    #[must_use]
    pub fn eased(&self) -> f64 {
        ease_cubic_in_out(self.progress())
    }

    /// Move the clock forward by `dt` and return the new eased `t`.
    pub fn advance(&mut self, dt: Duration) -> f64 {
        self.elapsed = self.elapsed.saturating_add(dt).min(self.duration);
        self.eased()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.progress() >= 1.0
    }

    /// Consume the transition, yielding what is needed to finish it.
    #[must_use]
    pub fn finish(self) -> (ActionRef, Option<String>) {
        (self.action, self.annotation)
    }
}

fn ease_cubic_in_out(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0) * 2.0;
    if t <= 1.0 {
        t * t * t / 2.0
    } else {
        let t = t - 2.0;
        t.mul_add(t * t, 2.0) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::noop;

    #[test]
    fn progress_is_linear_and_clamped() {
        let mut t = Transition::new(noop(), Some("move".into()), Duration::from_millis(100));
        assert!((t.progress() - 0.0).abs() < f64::EPSILON);
        let eased = t.advance(Duration::from_millis(25));
        assert!((t.progress() - 0.25).abs() < 1e-9);
        assert!((eased - 0.0625).abs() < 1e-9);
        assert!(!t.is_complete());
        assert!((t.advance(Duration::from_secs(5)) - 1.0).abs() < f64::EPSILON);
        assert!(t.is_complete());
        assert_eq!(t.annotation(), Some("move"));
    }

    #[test]
    fn easing_is_symmetric_around_the_midpoint() {
        assert!((ease_cubic_in_out(0.5) - 0.5).abs() < 1e-12);
        assert!((ease_cubic_in_out(0.25) + ease_cubic_in_out(0.75) - 1.0).abs() < 1e-12);
        assert!((ease_cubic_in_out(1.0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_duration_is_immediately_complete() {
        let t = Transition::new(noop(), None, Duration::ZERO);
        assert!(t.is_complete());
    }
}
