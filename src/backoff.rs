//! Bounded exponential backoff.
//!
//! The delay table is fixed; once [`MAX_ATTEMPTS`] retries have been scheduled
//! no further delay is handed out and the caller reports a terminal failure.

use std::time::Duration;

pub const RETRY_DELAYS_MS: [u64; 5] = [1000, 2000, 4000, 8000, 16000];
pub const MAX_ATTEMPTS: u32 = RETRY_DELAYS_MS.len() as u32;

pub fn delay_for(attempt: u32) -> Option<Duration> {
    RETRY_DELAYS_MS
        .get(attempt as usize)
        .map(|ms| Duration::from_millis(*ms))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= MAX_ATTEMPTS
    }

    /// Delay before the next retry, counting it as scheduled.
    pub fn record_failure(&mut self) -> Option<Duration> {
        let delay = delay_for(self.attempts)?;
        self.attempts += 1;
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_follow_the_fixed_table() {
        let delays: Vec<u64> = (0..MAX_ATTEMPTS)
            .map(|attempt| delay_for(attempt).unwrap().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
        assert_eq!(delay_for(5), None);
        assert_eq!(delay_for(u32::MAX), None);
    }

    #[test]
    fn retry_state_stops_at_ceiling_and_resets() {
        let mut state = RetryState::new();
        for expected in RETRY_DELAYS_MS {
            assert_eq!(state.record_failure(), Some(Duration::from_millis(expected)));
        }
        assert!(state.is_exhausted());
        assert_eq!(state.record_failure(), None);
        assert_eq!(state.attempts(), MAX_ATTEMPTS);

        state.reset();
        assert_eq!(state.attempts(), 0);
        assert_eq!(state.record_failure(), Some(Duration::from_secs(1)));
    }
}
