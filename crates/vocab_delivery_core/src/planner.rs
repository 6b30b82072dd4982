//! crates/vocab_delivery_core/src/planner.rs
//!
//! The Delivery-Time Planner: computes the ordered wall-clock times at which
//! a subscriber's daily words are sent. Pure and deterministic; persistence
//! of the resulting schedule is the caller's responsibility.

use chrono::{NaiveTime, Timelike};

use crate::domain::{
    DeliveryMode, Subscriber, ValidationError, MAX_WORDS_PER_DAY, MIN_WORDS_PER_DAY,
};

/// Default auto-mode slots used for word counts of three or fewer.
const DEFAULT_AUTO_HOURS: [u32; 3] = [9, 12, 19];

const SECS_PER_HOUR: i64 = 3600;

/// Computes the ordered delivery times for one subscriber.
///
/// Auto mode with up to three words uses the fixed default set truncated to
/// count; larger counts interpolate evenly across the subscriber's window,
/// rounding each slot to the nearest whole hour. Rounding over a narrow
/// window can collapse adjacent slots onto the same hour; that behavior is
/// kept as-is and is not deduplicated.
///
/// Custom mode returns the subscriber's own times, truncated to the word
/// count, topped up when the subscriber picked fewer: first from the auto
/// plan, then from unused whole hours, so the result always holds exactly
/// `words_per_day` distinct times. Duplicate custom times are rejected
/// outright.
pub fn plan_delivery_times(subscriber: &Subscriber) -> Result<Vec<NaiveTime>, ValidationError> {
    let count = subscriber.words_per_day;
    if !(MIN_WORDS_PER_DAY..=MAX_WORDS_PER_DAY).contains(&count) {
        return Err(ValidationError::WordCountOutOfRange(count));
    }

    match subscriber.mode {
        DeliveryMode::Auto => Ok(auto_times(
            count as usize,
            subscriber.auto_window_start,
            subscriber.auto_window_end,
        )),
        DeliveryMode::Custom => custom_times(subscriber, count as usize),
    }
}

fn auto_times(count: usize, window_start: NaiveTime, window_end: NaiveTime) -> Vec<NaiveTime> {
    if count <= DEFAULT_AUTO_HOURS.len() {
        return DEFAULT_AUTO_HOURS[..count]
            .iter()
            .map(|&h| NaiveTime::from_hms_opt(h, 0, 0).expect("hour in range"))
            .collect();
    }

    let start = window_start.num_seconds_from_midnight() as i64;
    let end = window_end.num_seconds_from_midnight() as i64;
    let span = end - start;
    let steps = (count - 1) as i64;

    (0..count as i64)
        .map(|i| {
            let raw = start + span * i / steps;
            // Nearest whole hour, capped at 23:00 so a late window end
            // never rounds past midnight.
            let hour = ((raw + SECS_PER_HOUR / 2) / SECS_PER_HOUR).clamp(0, 23) as u32;
            NaiveTime::from_hms_opt(hour, 0, 0).expect("hour in range")
        })
        .collect()
}

fn custom_times(subscriber: &Subscriber, count: usize) -> Result<Vec<NaiveTime>, ValidationError> {
    for (i, time) in subscriber.custom_times.iter().enumerate() {
        if subscriber.custom_times[..i].contains(time) {
            return Err(ValidationError::DuplicateCustomTimes(*time));
        }
    }

    let mut times: Vec<NaiveTime> = subscriber.custom_times.iter().copied().take(count).collect();

    // A subscriber who picked fewer times than words still gets the full
    // daily count: top up from the auto plan, skipping chosen times.
    if times.len() < count {
        let auto = auto_times(
            count,
            subscriber.auto_window_start,
            subscriber.auto_window_end,
        );
        for slot in auto {
            if times.len() == count {
                break;
            }
            if !times.contains(&slot) {
                times.push(slot);
            }
        }
    }

    // The auto plan can collapse onto hours the subscriber already chose.
    // Fill any remaining slots with unused whole hours, walking forward
    // from the window start; count is at most 5, so 24 hours always suffice.
    let start_hour = subscriber.auto_window_start.hour();
    for offset in 0..24 {
        if times.len() == count {
            break;
        }
        let hour = (start_hour + offset) % 24;
        let slot = NaiveTime::from_hms_opt(hour, 0, 0).expect("hour in range");
        if !times.contains(&slot) {
            times.push(slot);
        }
    }

    Ok(times)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::subscriber_fixture;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn auto_three_words_uses_defaults() {
        let mut sub = subscriber_fixture();
        sub.words_per_day = 3;
        let times = plan_delivery_times(&sub).unwrap();
        assert_eq!(times, vec![t(9, 0), t(12, 0), t(19, 0)]);
    }

    #[test]
    fn auto_defaults_truncate_for_smaller_counts() {
        let mut sub = subscriber_fixture();
        sub.words_per_day = 1;
        assert_eq!(plan_delivery_times(&sub).unwrap(), vec![t(9, 0)]);
        sub.words_per_day = 2;
        assert_eq!(plan_delivery_times(&sub).unwrap(), vec![t(9, 0), t(12, 0)]);
    }

    #[test]
    fn auto_five_words_interpolates_across_window() {
        let mut sub = subscriber_fixture();
        sub.words_per_day = 5;
        sub.auto_window_start = t(9, 0);
        sub.auto_window_end = t(19, 0);
        // 10-hour window, 4 steps of 2.5h, rounded to the nearest hour.
        let times = plan_delivery_times(&sub).unwrap();
        assert_eq!(times, vec![t(9, 0), t(12, 0), t(14, 0), t(17, 0), t(19, 0)]);
    }

    #[test]
    fn auto_interpolation_is_deterministic() {
        let mut sub = subscriber_fixture();
        sub.words_per_day = 4;
        sub.auto_window_start = t(8, 0);
        sub.auto_window_end = t(20, 0);
        let first = plan_delivery_times(&sub).unwrap();
        let second = plan_delivery_times(&sub).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn narrow_window_may_collapse_rounded_slots() {
        // Documented inherited behavior: rounding can produce duplicates.
        let mut sub = subscriber_fixture();
        sub.words_per_day = 5;
        sub.auto_window_start = t(9, 0);
        sub.auto_window_end = t(11, 0);
        let times = plan_delivery_times(&sub).unwrap();
        assert_eq!(times.len(), 5);
        assert!(times.windows(2).any(|w| w[0] == w[1]));
    }

    #[test]
    fn custom_mode_returns_chosen_times() {
        let mut sub = subscriber_fixture();
        sub.mode = DeliveryMode::Custom;
        sub.words_per_day = 3;
        sub.custom_times = vec![t(7, 30), t(13, 15), t(21, 45)];
        let times = plan_delivery_times(&sub).unwrap();
        assert_eq!(times, vec![t(7, 30), t(13, 15), t(21, 45)]);
    }

    #[test]
    fn custom_mode_rejects_duplicates() {
        let mut sub = subscriber_fixture();
        sub.mode = DeliveryMode::Custom;
        sub.words_per_day = 3;
        sub.custom_times = vec![t(9, 0), t(9, 0), t(18, 0)];
        assert_eq!(
            plan_delivery_times(&sub),
            Err(ValidationError::DuplicateCustomTimes(t(9, 0)))
        );
    }

    #[test]
    fn custom_mode_truncates_excess_times() {
        let mut sub = subscriber_fixture();
        sub.mode = DeliveryMode::Custom;
        sub.words_per_day = 2;
        sub.custom_times = vec![t(8, 0), t(12, 0), t(18, 0)];
        assert_eq!(plan_delivery_times(&sub).unwrap(), vec![t(8, 0), t(12, 0)]);
    }

    #[test]
    fn custom_mode_tops_up_missing_times_from_auto_plan() {
        let mut sub = subscriber_fixture();
        sub.mode = DeliveryMode::Custom;
        sub.words_per_day = 3;
        sub.custom_times = vec![t(12, 0)];
        let times = plan_delivery_times(&sub).unwrap();
        assert_eq!(times.len(), 3);
        assert_eq!(times[0], t(12, 0));
        // No silent duplicates introduced by the top-up.
        for (i, time) in times.iter().enumerate() {
            assert!(!times[..i].contains(time));
        }
    }

    #[test]
    fn custom_top_up_fills_even_when_auto_slots_all_collide() {
        // A narrow window makes every rounded auto slot land on an hour the
        // subscriber already chose; the plan still comes back full.
        let mut sub = subscriber_fixture();
        sub.mode = DeliveryMode::Custom;
        sub.words_per_day = 5;
        sub.auto_window_start = t(9, 0);
        sub.auto_window_end = t(11, 0);
        sub.custom_times = vec![t(9, 0), t(10, 0), t(11, 0)];
        let times = plan_delivery_times(&sub).unwrap();
        assert_eq!(times.len(), 5);
        for (i, time) in times.iter().enumerate() {
            assert!(!times[..i].contains(time));
        }
        assert_eq!(&times[..3], &[t(9, 0), t(10, 0), t(11, 0)]);
    }

    #[test]
    fn out_of_range_word_count_is_rejected() {
        let mut sub = subscriber_fixture();
        sub.words_per_day = 0;
        assert_eq!(
            plan_delivery_times(&sub),
            Err(ValidationError::WordCountOutOfRange(0))
        );
    }
}
