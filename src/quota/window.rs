//! Sliding Window Evaluation
//!
//! Pure window arithmetic shared by every quota store. A store hands in the
//! records it holds for one identity and gets back the same decision no matter
//! which backend produced them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

const MILLIS_PER_MINUTE: i64 = 60_000;

/// Outcome of a read-only availability check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Another consumption fits in the window
    Allowed {
        /// Consumptions still available, including the next one
        remaining: u32,
    },
    /// The window is full
    Denied {
        /// Minutes until the oldest active record ages out (always >= 1)
        wait_minutes: u64,
    },
}

impl Decision {
    /// Whether the decision permits a consumption
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    /// Wait time, present only when denied
    pub fn wait_minutes(&self) -> Option<u64> {
        match self {
            Decision::Allowed { .. } => None,
            Decision::Denied { wait_minutes } => Some(*wait_minutes),
        }
    }
}

/// Outcome of a consuming request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConsumeOutcome {
    /// A record was appended at `now`
    Consumed {
        /// Consumptions left after this one
        remaining: u32,
    },
    /// Nothing was recorded
    Rejected {
        /// Minutes until the oldest active record ages out (always >= 1)
        wait_minutes: u64,
    },
}

impl ConsumeOutcome {
    /// Whether the consumption was recorded
    pub fn is_consumed(&self) -> bool {
        matches!(self, ConsumeOutcome::Consumed { .. })
    }

    /// Wait time, present only when rejected
    pub fn wait_minutes(&self) -> Option<u64> {
        match self {
            ConsumeOutcome::Consumed { .. } => None,
            ConsumeOutcome::Rejected { wait_minutes } => Some(*wait_minutes),
        }
    }
}

/// Fixed-size trailing window
///
/// A record at instant `t` is active at `now` when `now - window <= t <= now`.
/// Records stamped after `now` (clock stepped backwards) are not counted, but
/// are kept until they age out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    max_events: u32,
    window_ms: i64,
}

impl WindowPolicy {
    /// Create a policy allowing `max_events` per `window`
    pub fn new(max_events: u32, window: Duration) -> Self {
        Self {
            max_events,
            window_ms: i64::try_from(window.as_millis()).unwrap_or(i64::MAX),
        }
    }

    /// Maximum consumptions per window
    pub fn max_events(&self) -> u32 {
        self.max_events
    }

    /// Window length
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms as u64)
    }

    /// Earliest timestamp (in ms) still inside the window at `now`
    pub fn cutoff_millis(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis().saturating_sub(self.window_ms)
    }

    /// Earliest instant still inside the window at `now`
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.cutoff_millis(now))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Whether a record at `at` still counts at `now`
    pub fn is_active(&self, at: &DateTime<Utc>, now: DateTime<Utc>) -> bool {
        !self.is_expired(at, now) && *at <= now
    }

    /// Whether a record at `at` has aged out of the window at `now`
    pub fn is_expired(&self, at: &DateTime<Utc>, now: DateTime<Utc>) -> bool {
        at.timestamp_millis() < self.cutoff_millis(now)
    }

    /// Decide whether one more consumption fits at `now`
    ///
    /// `records` may contain aged-out entries; they are ignored.
    pub fn evaluate(&self, records: &[DateTime<Utc>], now: DateTime<Utc>) -> Decision {
        let mut count: u32 = 0;
        let mut oldest: Option<&DateTime<Utc>> = None;

        for at in records.iter().filter(|at| self.is_active(at, now)) {
            count = count.saturating_add(1);
            if oldest.map_or(true, |current| at < current) {
                oldest = Some(at);
            }
        }

        if count < self.max_events {
            return Decision::Allowed {
                remaining: self.max_events - count,
            };
        }

        let wait_minutes = match oldest {
            Some(oldest) => self.wait_minutes(oldest, now),
            // Only reachable with max_events == 0
            None => (self.window_ms / MILLIS_PER_MINUTE).max(1) as u64,
        };
        Decision::Denied { wait_minutes }
    }

    /// Minutes until a record at `oldest` leaves the window, rounded up, never below 1
    pub fn wait_minutes(&self, oldest: &DateTime<Utc>, now: DateTime<Utc>) -> u64 {
        let expires_at = oldest.timestamp_millis().saturating_add(self.window_ms);
        let remaining_ms = expires_at.saturating_sub(now.timestamp_millis());
        if remaining_ms <= 0 {
            return 1;
        }
        let minutes = remaining_ms / MILLIS_PER_MINUTE
            + i64::from(remaining_ms % MILLIS_PER_MINUTE != 0);
        minutes.max(1) as u64
    }

    /// Drop aged-out records from the front of an ordered sequence
    ///
    /// Returns the number of records removed.
    pub fn prune(&self, records: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        while let Some(front) = records.front() {
            if !self.is_expired(front, now) {
                break;
            }
            records.pop_front();
            removed += 1;
        }
        removed
    }

    /// Prune, evaluate, and append `now` when it fits
    ///
    /// The caller must hold exclusive access to `records` for the duration.
    pub fn admit(&self, records: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) -> ConsumeOutcome {
        self.prune(records, now);

        match self.evaluate(records.make_contiguous(), now) {
            Decision::Allowed { remaining } => {
                insert_ordered(records, now);
                ConsumeOutcome::Consumed {
                    remaining: remaining - 1,
                }
            }
            Decision::Denied { wait_minutes } => ConsumeOutcome::Rejected { wait_minutes },
        }
    }
}

/// Insert keeping oldest-first order, even when `at` is earlier than the tail
fn insert_ordered(records: &mut VecDeque<DateTime<Utc>>, at: DateTime<Utc>) {
    let position = records.partition_point(|existing| *existing <= at);
    records.insert(position, at);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn minute(m: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + chrono::Duration::minutes(m)
    }

    fn policy(max_events: u32, window_minutes: u64) -> WindowPolicy {
        WindowPolicy::new(max_events, Duration::from_secs(window_minutes * 60))
    }

    #[test]
    fn test_empty_records_allowed() {
        let p = policy(20, 24 * 60);
        assert_eq!(p.evaluate(&[], minute(0)), Decision::Allowed { remaining: 20 });
    }

    #[test]
    fn test_full_window_denied() {
        let p = policy(2, 60);
        let records = vec![minute(0), minute(10)];
        let decision = p.evaluate(&records, minute(20));
        assert_eq!(decision, Decision::Denied { wait_minutes: 40 });
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let p = policy(1, 60);
        // Exactly one window old: still active, wait clamps to 1
        assert_eq!(
            p.evaluate(&[minute(0)], minute(60)),
            Decision::Denied { wait_minutes: 1 }
        );
        // One millisecond later it has aged out
        let later = minute(60) + chrono::Duration::milliseconds(1);
        assert!(p.evaluate(&[minute(0)], later).is_allowed());
    }

    #[test]
    fn test_wait_rounds_up_partial_minutes() {
        let p = policy(1, 60);
        let now = minute(30) + chrono::Duration::seconds(1);
        assert_eq!(
            p.evaluate(&[minute(0)], now),
            Decision::Denied { wait_minutes: 30 }
        );
    }

    #[test]
    fn test_sliding_window_walkthrough() {
        let p = policy(2, 60);
        let mut records = VecDeque::new();

        assert!(p.admit(&mut records, minute(0)).is_consumed());
        assert!(p.admit(&mut records, minute(10)).is_consumed());

        // t=0 ages out, leaving {10}; 61 becomes the second active record
        assert_eq!(
            p.admit(&mut records, minute(61)),
            ConsumeOutcome::Consumed { remaining: 0 }
        );
        assert_eq!(records, VecDeque::from(vec![minute(10), minute(61)]));

        // {10, 61} is full; 10 expires at 70
        assert_eq!(
            p.admit(&mut records, minute(69)),
            ConsumeOutcome::Rejected { wait_minutes: 1 }
        );
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_prune_is_prefix_trim() {
        let p = policy(5, 60);
        let mut records = VecDeque::from(vec![minute(0), minute(5), minute(50), minute(90)]);
        let removed = p.prune(&mut records, minute(100));
        assert_eq!(removed, 2);
        assert_eq!(records, VecDeque::from(vec![minute(50), minute(90)]));
    }

    #[test]
    fn test_skewed_clock_keeps_order() {
        let p = policy(5, 60);
        let mut records = VecDeque::new();
        p.admit(&mut records, minute(30));
        p.admit(&mut records, minute(20)); // clock stepped backwards
        p.admit(&mut records, minute(25));
        assert_eq!(
            records,
            VecDeque::from(vec![minute(20), minute(25), minute(30)])
        );
    }

    #[test]
    fn test_future_records_are_not_counted() {
        let p = policy(1, 60);
        // Record stamped 10 minutes ahead of the evaluating clock
        assert_eq!(
            p.evaluate(&[minute(30)], minute(20)),
            Decision::Allowed { remaining: 1 }
        );
        // Once the clock catches up it counts
        assert_eq!(
            p.evaluate(&[minute(30)], minute(40)),
            Decision::Denied { wait_minutes: 50 }
        );
    }

    #[test]
    fn test_prune_keeps_future_records() {
        let p = policy(5, 60);
        let mut records = VecDeque::from(vec![minute(0), minute(150)]);
        assert_eq!(p.prune(&mut records, minute(100)), 1);
        assert_eq!(records, VecDeque::from(vec![minute(150)]));
    }

    #[test]
    fn test_admit_after_clock_steps_back() {
        let p = policy(1, 60);
        let mut records = VecDeque::new();
        assert!(p.admit(&mut records, minute(30)).is_consumed());
        // The t=30 record lies in the future of t=20 and does not count
        assert_eq!(
            p.admit(&mut records, minute(20)),
            ConsumeOutcome::Consumed { remaining: 0 }
        );
        assert_eq!(records, VecDeque::from(vec![minute(20), minute(30)]));
    }

    #[test]
    fn test_zero_max_events_always_denied() {
        let p = policy(0, 60);
        assert_eq!(p.evaluate(&[], minute(0)), Decision::Denied { wait_minutes: 60 });
    }

    #[test]
    fn test_decision_serialization() {
        let json = serde_json::to_string(&Decision::Denied { wait_minutes: 3 }).unwrap();
        assert_eq!(json, r#"{"decision":"denied","wait_minutes":3}"#);
    }

    proptest! {
        #[test]
        fn prop_wait_is_at_least_one(
            offsets in proptest::collection::vec(-120i64..120, 1..30),
            max_events in 1u32..5,
            now_offset in -120i64..240,
        ) {
            let p = policy(max_events, 60);
            let mut records: Vec<_> = offsets.iter().map(|m| minute(*m)).collect();
            records.sort();
            if let Decision::Denied { wait_minutes } = p.evaluate(&records, minute(now_offset)) {
                prop_assert!(wait_minutes >= 1);
            }
        }

        #[test]
        fn prop_evaluate_is_pure(
            offsets in proptest::collection::vec(0i64..120, 0..30),
            now_offset in 0i64..240,
        ) {
            let p = policy(3, 60);
            let records: Vec<_> = offsets.iter().map(|m| minute(*m)).collect();
            let first = p.evaluate(&records, minute(now_offset));
            for _ in 0..3 {
                prop_assert_eq!(p.evaluate(&records, minute(now_offset)), first);
            }
        }

        #[test]
        fn prop_admit_never_exceeds_max(
            steps in proptest::collection::vec(0i64..30, 1..60),
            max_events in 1u32..6,
        ) {
            let p = policy(max_events, 60);
            let mut records = VecDeque::new();
            let mut now = 0;
            for step in steps {
                now += step;
                p.admit(&mut records, minute(now));
                let active = records.iter().filter(|at| p.is_active(at, minute(now))).count();
                prop_assert!(active <= max_events as usize);
            }
        }
    }
}
