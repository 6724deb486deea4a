use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct CancelState {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Shared cancellation signal with an optional deadline.
///
/// Clones observe the same flag. Sleeps taken through [`CancelToken::sleep`]
/// return early as soon as the token is cancelled or the deadline passes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
    deadline: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Cancelled,
    DeadlineExceeded,
}

impl Interrupt {
    pub fn label(self) -> &'static str {
        match self {
            Interrupt::Cancelled => "cancelled",
            Interrupt::DeadlineExceeded => "deadline exceeded",
        }
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            state: Arc::default(),
            deadline: Some(deadline),
        }
    }

    /// A timeout too large to represent as an `Instant` means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::with_deadline(deadline),
            None => Self::new(),
        }
    }

    pub fn cancel(&self) {
        let mut flag = match self.state.cancelled.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *flag = true;
        self.state.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        match self.state.cancelled.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// `Err` when the caller must stop before doing more work.
    pub fn check(&self) -> Result<(), Interrupt> {
        if self.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(Interrupt::DeadlineExceeded);
        }
        Ok(())
    }

    /// Block for `duration`, waking early on cancellation or deadline.
    ///
    /// A duration past the range of `Instant` sleeps until the token is
    /// cancelled or its deadline passes.
    pub fn sleep(&self, duration: Duration) -> Result<(), Interrupt> {
        self.check()?;
        if duration.is_zero() {
            return Ok(());
        }

        let wake_at = Instant::now().checked_add(duration);
        let target = match (wake_at, self.deadline) {
            (Some(wake_at), Some(deadline)) => Some(wake_at.min(deadline)),
            (wake_at, deadline) => wake_at.or(deadline),
        };

        let mut flag = match self.state.cancelled.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        loop {
            if *flag {
                return Err(Interrupt::Cancelled);
            }
            let now = Instant::now();
            if let Some(deadline) = self.deadline
                && now >= deadline
            {
                return Err(Interrupt::DeadlineExceeded);
            }
            if let Some(wake_at) = wake_at
                && now >= wake_at
            {
                return Ok(());
            }
            flag = match target {
                Some(target) => {
                    let remaining = target.saturating_duration_since(now);
                    match self.state.wake.wait_timeout(flag, remaining) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
                None => match self.state.wake.wait(flag) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                },
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CancelToken, Interrupt};
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn fresh_token_allows_work() {
        let token = CancelToken::new();
        assert!(token.check().is_ok());
        assert!(token.sleep(Duration::from_millis(1)).is_ok());
    }

    #[test]
    fn cancel_is_visible_through_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert_eq!(token.check(), Err(Interrupt::Cancelled));
    }

    #[test]
    fn cancel_wakes_a_long_sleep() {
        let token = CancelToken::new();
        let remote = token.clone();
        let started = Instant::now();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });
        let got = token.sleep(Duration::from_secs(30));
        handle.join().expect("join canceller");
        assert_eq!(got, Err(Interrupt::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn unrepresentable_timeout_means_no_deadline() {
        let token = CancelToken::with_timeout(Duration::MAX);
        assert!(token.check().is_ok());
        assert!(token.sleep(Duration::from_millis(1)).is_ok());
    }

    #[test]
    fn unbounded_sleep_still_wakes_on_cancel() {
        let token = CancelToken::new();
        let remote = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });
        let got = token.sleep(Duration::MAX);
        handle.join().expect("join canceller");
        assert_eq!(got, Err(Interrupt::Cancelled));
    }

    #[test]
    fn unbounded_sleep_stops_at_deadline() {
        let token = CancelToken::with_timeout(Duration::from_millis(10));
        assert_eq!(token.sleep(Duration::MAX), Err(Interrupt::DeadlineExceeded));
    }

    #[test]
    fn deadline_cuts_sleep_short() {
        let token = CancelToken::with_timeout(Duration::from_millis(10));
        let got = token.sleep(Duration::from_secs(30));
        assert_eq!(got, Err(Interrupt::DeadlineExceeded));
        assert_eq!(token.check(), Err(Interrupt::DeadlineExceeded));
    }
}
