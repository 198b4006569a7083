//! Daily streak rules, evaluated at local calendar-day granularity.

use chrono::NaiveDate;

/// What a first-time pass on `today` did to the streak.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreakChange {
    /// Already counted today.
    Unchanged,
    /// Last completion was yesterday.
    Extended,
    /// Gap of two or more days, or no prior completion.
    Started,
}

/// Returns the new streak value and how it changed. The caller stores
/// `today` as the new last completion date.
pub fn next_streak(current: u32, last: Option<NaiveDate>, today: NaiveDate) -> (u32, StreakChange) {
    match last {
        Some(day) if day == today => (current, StreakChange::Unchanged),
        Some(day) if today.pred_opt() == Some(day) => (current.saturating_add(1), StreakChange::Extended),
        _ => (1, StreakChange::Started),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn yesterday_extends() {
        assert_eq!(next_streak(4, Some(day(9)), day(10)), (5, StreakChange::Extended));
    }

    #[test]
    fn gap_restarts_at_one() {
        assert_eq!(next_streak(4, Some(day(7)), day(10)), (1, StreakChange::Started));
    }

    #[test]
    fn first_ever_pass_is_one_not_zero() {
        assert_eq!(next_streak(0, None, day(10)), (1, StreakChange::Started));
    }

    #[test]
    fn same_day_is_unchanged() {
        assert_eq!(next_streak(3, Some(day(10)), day(10)), (3, StreakChange::Unchanged));
    }

    #[test]
    fn month_boundary_counts_as_consecutive() {
        let last = NaiveDate::from_ymd_opt(2026, 2, 28).unwrap();
        assert_eq!(next_streak(2, Some(last), day(1)).0, 3);
    }
}
