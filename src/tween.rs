/// An `f64` transition stepped by frame timestamps (opacity fades, animated zoom edges).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tween {
    pub from: f64,
    pub to: f64,
    pub start_ms: u64,
    pub duration_ms: u64,
    pub easing: Easing,
}

impl Tween {
    /// A zero duration is treated as one millisecond so the first frame lands on `to`.
    pub fn new(from: f64, to: f64, start_ms: u64, duration_ms: u64, easing: Easing) -> Self {
        Self {
            from,
            to,
            start_ms,
            duration_ms: duration_ms.max(1),
            easing,
        }
    }

    pub fn end_ms(&self) -> u64 {
        self.start_ms.saturating_add(self.duration_ms)
    }

    pub fn is_done(&self, now_ms: u64) -> bool {
        now_ms >= self.end_ms()
    }

    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.end_ms().saturating_sub(now_ms)
    }

    /// Eased progress in `[0, 1]`.
    pub fn progress(&self, now_ms: u64) -> f64 {
        let elapsed = now_ms.saturating_sub(self.start_ms).min(self.duration_ms);
        self.easing
            .apply(elapsed as f64 / self.duration_ms as f64)
    }

    /// Value at `now_ms`. Exactly `to` once done.
    pub fn sample(&self, now_ms: u64) -> f64 {
        if self.is_done(now_ms) {
            return self.to;
        }
        self.from + (self.to - self.from) * self.progress(now_ms)
    }

    /// Redirects an in-flight transition, continuing from its current value.
    pub fn retarget(&mut self, now_ms: u64, to: f64, duration_ms: u64) {
        *self = Self::new(self.sample(now_ms), to, now_ms, duration_ms, self.easing);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Easing {
    Linear,
    /// Decelerates into the target.
    #[default]
    EaseOutCubic,
    EaseInOutCubic,
}

impl Easing {
    /// Maps linear progress `t ∈ [0, 1]` onto eased progress.
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::EaseOutCubic => 1.0 - (1.0 - t).powi(3),
            Self::EaseInOutCubic if t < 0.5 => 4.0 * t.powi(3),
            Self::EaseInOutCubic => 1.0 - (2.0 - 2.0 * t).powi(3) / 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lands_exactly_on_target() {
        let tw = Tween::new(0.2, 0.8, 100, 50, Easing::EaseInOutCubic);
        assert_eq!(tw.sample(100), 0.2);
        assert_eq!(tw.sample(150), 0.8);
        assert_eq!(tw.sample(10_000), 0.8);
        assert_eq!(tw.remaining_ms(120), 30);
        assert!(!tw.is_done(149));
        assert!(tw.is_done(150));
    }

    #[test]
    fn zero_duration_finishes_on_the_next_tick() {
        let tw = Tween::new(1.0, 0.0, 10, 0, Easing::Linear);
        assert!(!tw.is_done(10));
        assert_eq!(tw.sample(11), 0.0);
    }

    #[test]
    fn ease_out_is_ahead_of_linear() {
        let t = 0.25;
        assert!(Easing::EaseOutCubic.apply(t) > Easing::Linear.apply(t));
        assert!(Easing::EaseInOutCubic.apply(t) < Easing::Linear.apply(t));
        assert!((Easing::EaseInOutCubic.apply(0.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn retarget_continues_from_the_current_value() {
        let mut tw = Tween::new(0.0, 1.0, 0, 100, Easing::Linear);
        tw.retarget(50, 0.0, 100);
        assert!((tw.from - 0.5).abs() < 1e-12);
        assert_eq!((tw.to, tw.start_ms, tw.end_ms()), (0.0, 50, 150));
    }
}
