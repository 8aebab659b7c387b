//! Calendar-day cutoff computation

use chrono::{DateTime, Days, Utc};

use crate::config::ValidationError;

/// Start of the UTC day `window_days` calendar days before `now`'s day.
///
/// Anything strictly earlier than the returned instant is expired.
pub fn cutoff_for(now: DateTime<Utc>, window_days: u32) -> Result<DateTime<Utc>, ValidationError> {
    if window_days < 1 {
        return Err(ValidationError::InvalidRetentionWindow(window_days));
    }

    let midnight = now
        .date_naive()
        .checked_sub_days(Days::new(u64::from(window_days)))
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .ok_or(ValidationError::InvalidRetentionWindow(window_days))?;

    Ok(midnight.and_utc())
}

/// Whether a record stamped `at` falls before `cutoff`
pub fn is_expired(at: DateTime<Utc>, cutoff: DateTime<Utc>) -> bool {
    at < cutoff
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_seven_day_window() {
        let cutoff = cutoff_for(day(2024, 3, 10), 7).unwrap();
        assert_eq!(cutoff, day(2024, 3, 3));

        assert!(is_expired(day(2024, 3, 1), cutoff));
        assert!(is_expired(day(2024, 3, 2), cutoff));
        assert!(!is_expired(day(2024, 3, 3), cutoff));
        assert!(!is_expired(day(2024, 3, 4), cutoff));
        assert!(!is_expired(day(2024, 3, 5), cutoff));
    }

    #[test]
    fn test_time_of_day_is_ignored() {
        let morning = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 1).unwrap();
        let evening = Utc.with_ymd_and_hms(2024, 3, 10, 23, 59, 59).unwrap();

        assert_eq!(cutoff_for(morning, 7).unwrap(), cutoff_for(evening, 7).unwrap());
    }

    #[test]
    fn test_window_crosses_month_and_leap_day() {
        assert_eq!(cutoff_for(day(2024, 3, 1), 1).unwrap(), day(2024, 2, 29));
        assert_eq!(cutoff_for(day(2024, 1, 3), 7).unwrap(), day(2023, 12, 27));
    }

    #[test]
    fn test_zero_window_is_config_error() {
        assert!(matches!(
            cutoff_for(day(2024, 3, 10), 0),
            Err(ValidationError::InvalidRetentionWindow(0))
        ));
    }

    #[test]
    fn test_boundary_property_over_many_windows() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 13, 45, 0).unwrap();
        for window in 1..=400u32 {
            let cutoff = cutoff_for(now, window).unwrap();
            let just_before = cutoff - chrono::Duration::milliseconds(1);

            assert!(is_expired(just_before, cutoff), "window {}", window);
            assert!(!is_expired(cutoff, cutoff), "window {}", window);
            assert_eq!(
                (now.date_naive() - cutoff.date_naive()).num_days(),
                i64::from(window)
            );
        }
    }
}
