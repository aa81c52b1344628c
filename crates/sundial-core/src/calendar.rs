//! Calendar math helpers.
//!
//! Pure functions of a [`NaiveDate`]. No timezone conversion happens here;
//! the caller supplies a date already in the evaluation timezone. These back
//! the `days` condition operator and the day-selection predicates.

use chrono::{Datelike, Days, NaiveDate, Weekday};

/// Fixed English month name table, 1-based. Matching is exact.
pub const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Fixed English weekday name table, indexed Sunday(0)..Saturday(6).
pub const WEEKDAY_NAMES: [&str; 7] = [
    "sunday",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
];

/// Which occurrence of a day pattern within a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrdinalRank {
    First,
    Second,
    Third,
    Fourth,
    Fifth,
    Last,
}

impl OrdinalRank {
    /// Zero-based offset for the forward ranks. `Last` has no offset.
    fn forward_offset(self) -> Option<u64> {
        match self {
            OrdinalRank::First => Some(0),
            OrdinalRank::Second => Some(1),
            OrdinalRank::Third => Some(2),
            OrdinalRank::Fourth => Some(3),
            OrdinalRank::Fifth => Some(4),
            OrdinalRank::Last => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrdinalRank::First => "first",
            OrdinalRank::Second => "second",
            OrdinalRank::Third => "third",
            OrdinalRank::Fourth => "fourth",
            OrdinalRank::Fifth => "fifth",
            OrdinalRank::Last => "last",
        }
    }
}

/// The day pattern an [`OrdinalRank`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayUnit {
    /// A named weekday ("first monday", "last friday").
    Weekday(Weekday),
    /// A plain calendar day ("third day of the month").
    Day,
    /// A weekday that is not Saturday or Sunday, with month-boundary snapping.
    Workday,
    /// A Saturday or Sunday, with month-boundary snapping.
    Weekend,
}

impl DayUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            DayUnit::Weekday(weekday) => WEEKDAY_NAMES[weekday.num_days_from_sunday() as usize],
            DayUnit::Day => "day",
            DayUnit::Workday => "workday",
            DayUnit::Weekend => "weekend",
        }
    }
}

/// Month constraint for specific-day matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthFilter {
    Any,
    /// 1-based month number.
    In(u32),
}

/// Parse a month name from the fixed table into a 1-based number.
pub fn month_from_name(name: &str) -> Option<u32> {
    MONTH_NAMES
        .iter()
        .position(|&m| m == name)
        .map(|i| i as u32 + 1)
}

/// Parse a weekday name from the fixed table.
pub fn weekday_from_name(name: &str) -> Option<Weekday> {
    let index = WEEKDAY_NAMES.iter().position(|&d| d == name)?;
    // Table index 0 is Sunday.
    Some(match index {
        0 => Weekday::Sun,
        1 => Weekday::Mon,
        2 => Weekday::Tue,
        3 => Weekday::Wed,
        4 => Weekday::Thu,
        5 => Weekday::Fri,
        _ => Weekday::Sat,
    })
}

fn is_weekend(weekday: Weekday) -> bool {
    matches!(weekday, Weekday::Sat | Weekday::Sun)
}

/// Last calendar day of the month containing `1st of (year, month)`.
pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// Select the `rank`-th `unit` day within `base`'s month.
///
/// Forward ranks anchor at the first of the month: named weekdays advance to
/// the first occurrence and then add `7 * (rank - 1)` days (a fifth
/// occurrence may land in the following month and simply never match);
/// `day` is the rank-th calendar day; `workday` is the first of the month
/// pushed forward off Saturday/Sunday; `weekend` is the first day of the
/// month if it already falls on a weekend, otherwise the first Saturday.
///
/// `last` anchors at the last day of the month with the symmetric rules:
/// walk back to the last matching weekday, step back one day if the month
/// ends on Saturday (two if Sunday) for `workday`, and walk back to the
/// preceding weekend day for `weekend`.
pub fn ordinal_day(base: NaiveDate, rank: OrdinalRank, unit: DayUnit) -> Option<NaiveDate> {
    match rank.forward_offset() {
        Some(offset) => {
            let first = NaiveDate::from_ymd_opt(base.year(), base.month(), 1)?;
            match unit {
                DayUnit::Day => first.checked_add_days(Days::new(offset)),
                DayUnit::Workday => match first.weekday() {
                    Weekday::Sat => first.checked_add_days(Days::new(2)),
                    Weekday::Sun => first.checked_add_days(Days::new(1)),
                    _ => Some(first),
                },
                DayUnit::Weekend => {
                    if is_weekend(first.weekday()) {
                        Some(first)
                    } else {
                        let ahead = (Weekday::Sat.num_days_from_sunday() + 7
                            - first.weekday().num_days_from_sunday())
                            % 7;
                        first.checked_add_days(Days::new(u64::from(ahead)))
                    }
                }
                DayUnit::Weekday(target) => {
                    let ahead = (target.num_days_from_sunday() + 7
                        - first.weekday().num_days_from_sunday())
                        % 7;
                    first.checked_add_days(Days::new(u64::from(ahead) + 7 * offset))
                }
            }
        }
        None => {
            let last = last_day_of_month(base.year(), base.month())?;
            match unit {
                DayUnit::Day => Some(last),
                DayUnit::Workday => match last.weekday() {
                    Weekday::Sat => last.checked_sub_days(Days::new(1)),
                    Weekday::Sun => last.checked_sub_days(Days::new(2)),
                    _ => Some(last),
                },
                DayUnit::Weekend => {
                    let mut day = last;
                    while !is_weekend(day.weekday()) {
                        day = day.checked_sub_days(Days::new(1))?;
                    }
                    Some(day)
                }
                DayUnit::Weekday(target) => {
                    let back = (last.weekday().num_days_from_sunday() + 7
                        - target.num_days_from_sunday())
                        % 7;
                    last.checked_sub_days(Days::new(u64::from(back)))
                }
            }
        }
    }
}

/// Day-of-month modulo 2 equals 0.
pub fn is_even_day(date: NaiveDate) -> bool {
    date.day() % 2 == 0
}

/// Day-of-month equals `day`, with an optional exact month constraint.
pub fn is_specific_day(date: NaiveDate, day: u32, month: MonthFilter) -> bool {
    if date.day() != day {
        return false;
    }
    match month {
        MonthFilter::Any => true,
        MonthFilter::In(m) => date.month() == m,
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // ── ordinal_day: forward ranks ──────────────────────────────────────

    #[test]
    fn test_first_monday_of_january_2021() {
        // January 2021 starts on a Friday; first Monday is the 4th.
        let result = ordinal_day(date(2021, 1, 15), OrdinalRank::First, DayUnit::Weekday(Weekday::Mon));
        assert_eq!(result, Some(date(2021, 1, 4)));
    }

    #[test]
    fn test_third_tuesday_of_march_2026() {
        let result = ordinal_day(date(2026, 3, 1), OrdinalRank::Third, DayUnit::Weekday(Weekday::Tue));
        assert_eq!(result, Some(date(2026, 3, 17)));
    }

    #[test]
    fn test_fifth_friday_spills_into_next_month() {
        // February 2021 has four Fridays; the "fifth" lands in March and
        // therefore never matches a February base day.
        let result = ordinal_day(date(2021, 2, 10), OrdinalRank::Fifth, DayUnit::Weekday(Weekday::Fri));
        assert_eq!(result, Some(date(2021, 3, 5)));
    }

    #[test]
    fn test_third_day_of_month() {
        let result = ordinal_day(date(2021, 6, 20), OrdinalRank::Third, DayUnit::Day);
        assert_eq!(result, Some(date(2021, 6, 3)));
    }

    #[test]
    fn test_first_workday_month_starts_on_friday() {
        // 2021-01-01 is a Friday, already a workday.
        let result = ordinal_day(date(2021, 1, 20), OrdinalRank::First, DayUnit::Workday);
        assert_eq!(result, Some(date(2021, 1, 1)));
    }

    #[test]
    fn test_first_workday_month_starts_on_sunday() {
        // 2020-11-01 is a Sunday; first workday is Monday the 2nd.
        let result = ordinal_day(date(2020, 11, 11), OrdinalRank::First, DayUnit::Workday);
        assert_eq!(result, Some(date(2020, 11, 2)));
    }

    #[test]
    fn test_first_workday_month_starts_on_saturday() {
        // 2022-01-01 is a Saturday; first workday is Monday the 3rd.
        let result = ordinal_day(date(2022, 1, 5), OrdinalRank::First, DayUnit::Workday);
        assert_eq!(result, Some(date(2022, 1, 3)));
    }

    #[test]
    fn test_first_weekend_month_starts_midweek() {
        // 2021-06-01 is a Tuesday; first weekend day is Saturday the 5th.
        let result = ordinal_day(date(2021, 6, 15), OrdinalRank::First, DayUnit::Weekend);
        assert_eq!(result, Some(date(2021, 6, 5)));
    }

    #[test]
    fn test_first_weekend_month_starts_on_sunday() {
        // 2020-11-01 is a Sunday, itself a weekend day.
        let result = ordinal_day(date(2020, 11, 3), OrdinalRank::First, DayUnit::Weekend);
        assert_eq!(result, Some(date(2020, 11, 1)));
    }

    // ── ordinal_day: last ───────────────────────────────────────────────

    #[test]
    fn test_last_sunday_of_january_2021() {
        let result = ordinal_day(date(2021, 1, 8), OrdinalRank::Last, DayUnit::Weekday(Weekday::Sun));
        assert_eq!(result, Some(date(2021, 1, 31)));
    }

    #[test]
    fn test_last_day_of_february_leap_year() {
        let result = ordinal_day(date(2020, 2, 1), OrdinalRank::Last, DayUnit::Day);
        assert_eq!(result, Some(date(2020, 2, 29)));
    }

    #[test]
    fn test_last_workday_month_ends_on_sunday() {
        // 2021-01-31 is a Sunday; last workday is Friday the 29th.
        let result = ordinal_day(date(2021, 1, 1), OrdinalRank::Last, DayUnit::Workday);
        assert_eq!(result, Some(date(2021, 1, 29)));
    }

    #[test]
    fn test_last_workday_month_ends_on_saturday() {
        // 2021-07-31 is a Saturday; last workday is Friday the 30th.
        let result = ordinal_day(date(2021, 7, 10), OrdinalRank::Last, DayUnit::Workday);
        assert_eq!(result, Some(date(2021, 7, 30)));
    }

    #[test]
    fn test_last_weekend_month_ends_midweek() {
        // 2021-06-30 is a Wednesday; walk back to Sunday the 27th.
        let result = ordinal_day(date(2021, 6, 2), OrdinalRank::Last, DayUnit::Weekend);
        assert_eq!(result, Some(date(2021, 6, 27)));
    }

    #[test]
    fn test_last_weekend_month_ends_on_saturday() {
        let result = ordinal_day(date(2021, 7, 1), OrdinalRank::Last, DayUnit::Weekend);
        assert_eq!(result, Some(date(2021, 7, 31)));
    }

    // ── is_even_day / is_specific_day ───────────────────────────────────

    #[test]
    fn test_even_day() {
        assert!(is_even_day(date(2021, 1, 8)));
        assert!(!is_even_day(date(2021, 1, 31)));
    }

    #[test]
    fn test_specific_day_any_month() {
        assert!(is_specific_day(date(2021, 1, 8), 8, MonthFilter::Any));
        assert!(!is_specific_day(date(2021, 1, 8), 9, MonthFilter::Any));
    }

    #[test]
    fn test_specific_day_month_match() {
        assert!(is_specific_day(date(2021, 1, 8), 8, MonthFilter::In(1)));
        assert!(!is_specific_day(date(2021, 1, 8), 8, MonthFilter::In(2)));
    }

    // ── name tables ─────────────────────────────────────────────────────

    #[test]
    fn test_month_from_name() {
        assert_eq!(month_from_name("january"), Some(1));
        assert_eq!(month_from_name("december"), Some(12));
        // Matching is exact: capitalized names are not in the table.
        assert_eq!(month_from_name("January"), None);
    }

    #[test]
    fn test_weekday_from_name() {
        assert_eq!(weekday_from_name("sunday"), Some(Weekday::Sun));
        assert_eq!(weekday_from_name("saturday"), Some(Weekday::Sat));
        assert_eq!(weekday_from_name("caturday"), None);
    }
}
