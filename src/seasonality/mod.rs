//! The seasonality engine: per-year day-of-year alignment and
//! month/ISO-week heatmap aggregation, sharing one Feb 29 policy:
//! Feb 29 is folded into the same bucket as Feb 28, and every later ordinal
//! in a leap year shifts down by one day so year-over-year indices line up.

pub mod heatmap;
pub mod years;

use chrono::{DateTime, Datelike, NaiveDate, Utc};

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// 1-based day-of-year index with the Feb 29 fold applied, so the same
/// index always names the same calendar position across leap and
/// non-leap years.
pub fn day_of_year_index(t: DateTime<Utc>) -> u32 {
    let date = t.date_naive();
    let ordinal = date.ordinal();
    if is_leap_year(date.year()) && ordinal >= 60 {
        ordinal - 1
    } else {
        ordinal
    }
}

/// A synthetic, non-leap reference date for day-of-year index `index`
/// (1-based), used as the x-axis for overlaying multiple years on one
/// chart.
pub fn reference_date(index: u32) -> DateTime<Utc> {
    let base = NaiveDate::from_ymd_opt(2001, 1, 1).expect("valid date");
    let date = base + chrono::Duration::days(i64::from(index) - 1);
    date.and_hms_opt(0, 0, 0).expect("valid time").and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn feb_29_shares_feb_28_index() {
        let feb28 = Utc.with_ymd_and_hms(2024, 2, 28, 0, 0, 0).unwrap();
        let feb29 = Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap();
        assert_eq!(day_of_year_index(feb28), day_of_year_index(feb29));
    }

    #[test]
    fn indices_align_across_leap_and_non_leap_years() {
        let dec31_leap = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();
        let dec31_non_leap = Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap();
        assert_eq!(day_of_year_index(dec31_leap), day_of_year_index(dec31_non_leap));
    }
}
