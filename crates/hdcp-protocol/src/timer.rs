//! Timing and retry monitor.
//!
//! Each engine owns a single countdown resource with two mutually exclusive
//! usage modes: a one-shot reply deadline armed when an outbound message
//! expects an answer, and a periodic status poll used while idle or
//! authenticated. Expiry is detected on the next `poll()` tick, never
//! asynchronously.
//!
//! Time comes from an injected [`MonotonicClock`], so deadline behavior is
//! testable without real hardware and wraparound of a hardware counter never
//! leaks into the protocol layer.

use core::time::Duration;

/// Monotonic time since some fixed origin (engine construction, typically).
pub trait MonotonicClock {
    fn now(&self) -> Duration;
}

/// Wall-clock-backed monotonic time.
#[derive(Debug)]
pub struct SystemClock {
    start: std::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Hand-driven clock for deterministic tests. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: std::rc::Rc<std::cell::Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, delta: Duration) {
        self.now.set(self.now.get() + delta);
    }

    pub fn set(&self, now: Duration) {
        self.now.set(now);
    }
}

impl MonotonicClock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

// ---------------------------------------------------------------------------
// Pure expiry decisions
// ---------------------------------------------------------------------------

/// Whether a one-shot deadline has expired.
pub fn is_deadline_expired_at(now: Duration, expires_at: Duration) -> bool {
    now >= expires_at
}

/// Whether a periodic poll is due.
pub fn is_poll_due_at(now: Duration, next_at: Duration) -> bool {
    now >= next_at
}

// ---------------------------------------------------------------------------
// TimingMonitor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerMode {
    Disarmed,
    Deadline { expires_at: Duration },
    StatusPoll { interval: Duration, next_at: Duration },
}

/// What the monitor reports on a poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerFiring {
    Idle,
    /// The armed reply deadline passed; the monitor has disarmed itself.
    DeadlineExpired,
    /// The status-poll interval elapsed; the monitor re-armed for the next.
    PollDue,
}

/// The single countdown resource. Mode switches are explicit: arming one
/// mode replaces the other.
#[derive(Debug)]
pub struct TimingMonitor {
    mode: TimerMode,
}

impl TimingMonitor {
    pub fn new() -> Self {
        Self {
            mode: TimerMode::Disarmed,
        }
    }

    pub fn disarm(&mut self) {
        self.mode = TimerMode::Disarmed;
    }

    /// Arm a one-shot reply deadline `budget` from `now`.
    pub fn arm_deadline(&mut self, now: Duration, budget: Duration) {
        self.mode = TimerMode::Deadline {
            expires_at: now + budget,
        };
    }

    /// Arm the periodic status poll; first firing one `interval` from `now`.
    pub fn arm_status_poll(&mut self, now: Duration, interval: Duration) {
        self.mode = TimerMode::StatusPoll {
            interval,
            next_at: now + interval,
        };
    }

    pub fn is_deadline_armed(&self) -> bool {
        matches!(self.mode, TimerMode::Deadline { .. })
    }

    pub fn is_disarmed(&self) -> bool {
        self.mode == TimerMode::Disarmed
    }

    /// Check the countdown against `now`. A fired deadline disarms; a fired
    /// poll re-arms for the next interval.
    pub fn check(&mut self, now: Duration) -> TimerFiring {
        match self.mode {
            TimerMode::Disarmed => TimerFiring::Idle,
            TimerMode::Deadline { expires_at } => {
                if is_deadline_expired_at(now, expires_at) {
                    self.mode = TimerMode::Disarmed;
                    TimerFiring::DeadlineExpired
                } else {
                    TimerFiring::Idle
                }
            }
            TimerMode::StatusPoll { interval, next_at } => {
                if is_poll_due_at(now, next_at) {
                    self.mode = TimerMode::StatusPoll {
                        interval,
                        next_at: next_at + interval,
                    };
                    TimerFiring::PollDue
                } else {
                    TimerFiring::Idle
                }
            }
        }
    }
}

impl Default for TimingMonitor {
    fn default() -> Self {
        Self::new()
    }
}
