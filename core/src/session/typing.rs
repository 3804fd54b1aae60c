/// Local typing signal: single-shot quiet timer + debouncer
use std::time::Duration;
use tokio::time::Instant;

/// Single-shot timer that can be armed, re-armed and cancelled.
///
/// It holds only a deadline; the owner awaits `sleep_until(deadline)`.
#[derive(Debug, Clone)]
pub struct QuietTimer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl QuietTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// Arm (or re-arm) to fire one interval after `now`
    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.interval);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if now >= deadline)
    }
}

/// Outbound typing state for the local user
///
/// `typing` goes out on the first keystroke after a quiet period,
/// `stop typing` once the quiet interval has elapsed since the last one.
#[derive(Debug, Clone)]
pub struct TypingDebouncer {
    timer: QuietTimer,
    signaling: bool,
}

impl TypingDebouncer {
    pub fn new(quiet_interval: Duration) -> Self {
        Self {
            timer: QuietTimer::new(quiet_interval),
            signaling: false,
        }
    }

    /// Whether the peer currently sees us typing
    pub fn is_signaling(&self) -> bool {
        self.signaling
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Record a keystroke; returns true when `typing` must be emitted
    pub fn keystroke(&mut self, now: Instant) -> bool {
        self.timer.arm(now);
        if self.signaling {
            return false;
        }
        self.signaling = true;
        true
    }

    /// Timer fired; returns true when `stop typing` must be emitted
    pub fn poll_expired(&mut self, now: Instant) -> bool {
        if !self.timer.is_expired(now) {
            return false;
        }
        self.timer.cancel();
        std::mem::replace(&mut self.signaling, false)
    }

    /// Drop the signal immediately (message sent, room switched).
    /// Returns whether a signal was outstanding.
    pub fn force_stop(&mut self) -> bool {
        self.timer.cancel();
        std::mem::replace(&mut self.signaling, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: Duration = Duration::from_millis(3000);

    #[test]
    fn test_single_typing_for_burst() {
        let mut debouncer = TypingDebouncer::new(QUIET);
        let start = Instant::now();

        let mut emitted = 0;
        for i in 0..20u64 {
            if debouncer.keystroke(start + Duration::from_millis(i * 2900)) {
                emitted += 1;
            }
            // Timer never reaches its deadline between keystrokes
            assert!(!debouncer.poll_expired(start + Duration::from_millis(i * 2900 + 2899)));
        }
        assert_eq!(emitted, 1);
        assert!(debouncer.is_signaling());
    }

    #[test]
    fn test_stop_after_quiet_interval() {
        let mut debouncer = TypingDebouncer::new(QUIET);
        let start = Instant::now();

        assert!(debouncer.keystroke(start));
        assert!(!debouncer.keystroke(start + Duration::from_millis(1000)));

        // Deadline measured from the last keystroke
        assert!(!debouncer.poll_expired(start + Duration::from_millis(3500)));
        assert!(debouncer.poll_expired(start + Duration::from_millis(4000)));
        assert!(!debouncer.is_signaling());
        assert!(debouncer.deadline().is_none());

        // Next keystroke signals again
        assert!(debouncer.keystroke(start + Duration::from_millis(5000)));
    }

    #[test]
    fn test_force_stop_cancels_timer() {
        let mut debouncer = TypingDebouncer::new(QUIET);
        let start = Instant::now();

        debouncer.keystroke(start);
        assert!(debouncer.force_stop());
        assert!(!debouncer.force_stop());
        assert!(!debouncer.poll_expired(start + QUIET));
    }

    #[test]
    fn test_timer_rearm() {
        let mut timer = QuietTimer::new(QUIET);
        let start = Instant::now();
        assert_eq!(timer.deadline(), None);

        timer.arm(start);
        timer.arm(start + Duration::from_millis(1000));
        assert_eq!(timer.deadline(), Some(start + Duration::from_millis(4000)));
        assert!(!timer.is_expired(start + QUIET));

        timer.cancel();
        assert!(!timer.is_expired(start + Duration::from_secs(60)));
    }
}
