//! Injected time and randomness for the record transformer.
//!
//! Synthesized subscriber ids embed a timestamp and a random suffix; both
//! come from these traits so a run can be made fully deterministic.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Source of "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Source of suffixes for synthesized subscriber ids.
pub trait SuffixSource: Send {
    fn next_suffix(&mut self) -> String;
}

/// Length of generated random suffixes.
const SUFFIX_LEN: usize = 9;

/// Random alphanumeric suffixes taken from a v4 UUID.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSuffix;

impl SuffixSource for RandomSuffix {
    fn next_suffix(&mut self) -> String {
        Uuid::new_v4().simple().to_string()[..SUFFIX_LEN].to_string()
    }
}

/// Zero-padded counter: `000000001`, `000000002`, ...
#[derive(Debug, Clone, Default)]
pub struct SequentialSuffix {
    next: u64,
}

impl SuffixSource for SequentialSuffix {
    fn next_suffix(&mut self) -> String {
        self.next += 1;
        format!("{:0width$}", self.next, width = SUFFIX_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_suffix_shape() {
        let s = RandomSuffix.next_suffix();
        assert_eq!(s.len(), SUFFIX_LEN);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_sequential_suffix() {
        let mut ids = SequentialSuffix::default();
        assert_eq!(ids.next_suffix(), "000000001");
        assert_eq!(ids.next_suffix(), "000000002");
    }
}
