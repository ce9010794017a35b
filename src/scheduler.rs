use alloc::sync::Arc;
use core::time::Duration;
use std::time::Instant;

use crate::registry::{InvalidationRegistry, Phase};

/// A callback fired when the scheduler wants the host to run a frame.
///
/// It fires at most once per pending frame; the host answers by calling
/// [`crate::Stage::run_frame`] from its next display frame.
pub type FrameRequestCallback = Arc<dyn Fn() + Send + Sync>;

/// Time source for the chunked parser's budget.
#[derive(Clone)]
pub enum Clock {
    /// Monotonic wall clock measured from the given origin.
    System(Instant),
    /// A host-provided time source (useful for deterministic tests and replays).
    Provider(Arc<dyn Fn() -> Duration + Send + Sync>),
}

impl Clock {
    pub fn system() -> Self {
        Self::System(Instant::now())
    }

    pub fn provider(f: impl Fn() -> Duration + Send + Sync + 'static) -> Self {
        Self::Provider(Arc::new(f))
    }

    pub(crate) fn now(&self) -> Duration {
        match self {
            Self::System(origin) => origin.elapsed(),
            Self::Provider(f) => f(),
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

impl core::fmt::Debug for Clock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::System(origin) => f.debug_tuple("System").field(origin).finish(),
            Self::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

/// Configuration for [`Scheduler`].
#[derive(Clone, Default)]
pub struct SchedulerOptions {
    pub on_frame_request: Option<FrameRequestCallback>,
    pub clock: Clock,
}

impl SchedulerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_on_frame_request(
        mut self,
        on_frame_request: Option<impl Fn() + Send + Sync + 'static>,
    ) -> Self {
        self.on_frame_request = on_frame_request.map(|f| Arc::new(f) as _);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

impl core::fmt::Debug for SchedulerOptions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SchedulerOptions")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

/// Coalesces invalidations into frame requests and owns the invalidation registry.
///
/// A scheduler lives as long as its [`crate::Stage`]. Stages never share schedulers, so tests
/// can run any number of isolated stages side by side.
#[derive(Clone, Debug)]
pub struct Scheduler {
    options: SchedulerOptions,
    registry: InvalidationRegistry,
    frame_pending: bool,
    frame: u64,
    requests: u64,
}

impl Scheduler {
    pub fn new(options: SchedulerOptions) -> Self {
        Self {
            options,
            registry: InvalidationRegistry::new(),
            frame_pending: false,
            frame: 0,
            requests: 0,
        }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    pub fn set_on_frame_request(&mut self, f: Option<impl Fn() + Send + Sync + 'static>) {
        self.options.on_frame_request = f.map(|f| Arc::new(f) as _);
    }

    pub fn set_clock(&mut self, clock: Clock) {
        self.options.clock = clock;
    }

    pub fn registry(&self) -> &InvalidationRegistry {
        &self.registry
    }

    pub(crate) fn registry_mut(&mut self) -> &mut InvalidationRegistry {
        &mut self.registry
    }

    /// Requests a frame. Returns `true` if this call scheduled it (no frame was pending).
    pub fn request_frame(&mut self) -> bool {
        if self.frame_pending {
            return false;
        }
        self.frame_pending = true;
        self.requests = self.requests.saturating_add(1);
        ctrace!(frame = self.frame, "request_frame");
        if let Some(cb) = &self.options.on_frame_request {
            cb();
        }
        true
    }

    pub fn is_frame_pending(&self) -> bool {
        self.frame_pending
    }

    /// Number of frame requests that reached the host.
    pub fn frames_requested(&self) -> u64 {
        self.requests
    }

    /// Number of frames run so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn now(&self) -> Duration {
        self.options.clock.now()
    }

    pub(crate) fn begin_frame(&mut self) -> u64 {
        self.frame_pending = false;
        self.frame = self.frame.saturating_add(1);
        self.frame
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerOptions::default())
    }
}

/// Summary of one [`crate::Stage::run_frame`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub frame: u64,
    validated: [usize; Phase::COUNT],
    /// A chunked parse ran out of budget and will resume next frame.
    pub yielded: bool,
    /// Animations advanced during the frame.
    pub animated: usize,
    /// Work is still queued (a frame has been requested).
    pub pending: bool,
}

impl FrameReport {
    pub(crate) fn new(frame: u64) -> Self {
        Self {
            frame,
            ..Self::default()
        }
    }

    pub(crate) fn record(&mut self, phase: Phase) {
        self.validated[phase.slot()] += 1;
    }

    /// Number of validations performed for `phase`.
    pub fn validated(&self, phase: Phase) -> usize {
        self.validated[phase.slot()]
    }

    pub fn total_validated(&self) -> usize {
        self.validated.iter().sum()
    }

    /// `true` when the frame did nothing at all.
    pub fn is_idle(&self) -> bool {
        self.total_validated() == 0 && self.animated == 0 && !self.yielded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn request_frame_coalesces_until_the_frame_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut s = Scheduler::new(SchedulerOptions::new().with_on_frame_request(Some(
            move || {
                seen.fetch_add(1, Ordering::SeqCst);
            },
        )));

        assert!(s.request_frame());
        assert!(!s.request_frame());
        assert!(!s.request_frame());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(s.begin_frame(), 1);
        assert!(!s.is_frame_pending());
        assert!(s.request_frame());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(s.frames_requested(), 2);
    }

    #[test]
    fn provider_clock_is_used_for_now() {
        let s = Scheduler::new(
            SchedulerOptions::new().with_clock(Clock::provider(|| Duration::from_millis(42))),
        );
        assert_eq!(s.now(), Duration::from_millis(42));
    }
}
