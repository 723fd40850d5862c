/// Linear parameter fades
///
/// A fade interpolates from its start value to its end value over a wall-clock
/// duration and may carry an action to run once it completes.
use std::time::Duration;

use super::handle::Callback;

/// What happens to the handle when a fade finishes
#[derive(Clone)]
pub(crate) enum FadeAction {
    Stop,
    Pause,
    Notify(Callback),
}

impl std::fmt::Debug for FadeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FadeAction::Stop => write!(f, "Stop"),
            FadeAction::Pause => write!(f, "Pause"),
            FadeAction::Notify(_) => write!(f, "Notify"),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Fade {
    from: f32,
    to: f32,
    duration: Duration,
    started_at: Duration,
    action: Option<FadeAction>,
}

impl Fade {
    pub(crate) fn new(from: f32, to: f32, duration: Duration, started_at: Duration) -> Self {
        Self {
            from,
            to,
            duration,
            started_at,
            action: None,
        }
    }

    pub(crate) fn then(mut self, action: Option<FadeAction>) -> Self {
        self.action = action;
        self
    }

    /// Completion fraction in `0.0..=1.0`
    pub(crate) fn progress(&self, now: Duration) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_sub(self.started_at);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    pub(crate) fn value_at(&self, now: Duration) -> f32 {
        let t = self.progress(now);
        if t >= 1.0 {
            return self.to;
        }
        self.from + (self.to - self.from) * t
    }

    pub(crate) fn is_complete(&self, now: Duration) -> bool {
        self.progress(now) >= 1.0
    }

    #[cfg(test)]
    pub(crate) fn end_value(&self) -> f32 {
        self.to
    }

    pub(crate) fn into_action(self) -> Option<FadeAction> {
        self.action
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_fade_interpolates_linearly() {
        let fade = Fade::new(1.0, 0.0, ms(1000), ms(500));

        assert_eq!(fade.value_at(ms(500)), 1.0);
        assert!((fade.value_at(ms(750)) - 0.75).abs() < 1e-6);
        assert!((fade.value_at(ms(1000)) - 0.5).abs() < 1e-6);
        assert_eq!(fade.value_at(ms(1500)), 0.0);
    }

    #[test]
    fn test_progress_is_clamped() {
        let fade = Fade::new(0.0, 1.0, ms(100), ms(1000));

        assert_eq!(fade.progress(ms(0)), 0.0);
        assert_eq!(fade.progress(ms(5000)), 1.0);
        assert!(!fade.is_complete(ms(1099)));
        assert!(fade.is_complete(ms(1100)));
    }

    #[test]
    fn test_fade_is_monotonic() {
        let fade = Fade::new(0.2, 0.9, ms(1000), ms(0));
        let mut last = fade.value_at(ms(0));
        for step in 1..=20 {
            let value = fade.value_at(ms(step * 50));
            assert!(value >= last);
            last = value;
        }
        assert_eq!(last, fade.end_value());
    }

    #[test]
    fn test_action_is_carried() {
        let fade = Fade::new(1.0, 0.0, ms(10), ms(0)).then(Some(FadeAction::Stop));
        assert!(matches!(fade.into_action(), Some(FadeAction::Stop)));
    }
}
