//! Calendar arithmetic for due dates and validity windows.

use chrono::{Datelike, Local, Months, NaiveDate};

/// The current local calendar day.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// `start` shifted by `months` calendar months.
///
/// The day of month is preserved; when the target month is shorter the
/// date clamps to its last day (31 Jan + 1 month = 28/29 Feb). Offsets are
/// always taken from `start`, so a schedule starting on the 31st returns
/// to the 31st in long months.
pub fn add_months(start: NaiveDate, months: u32) -> NaiveDate {
    start
        .checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

/// Actual calendar days from `from` to `to`; negative when `to` precedes `from`.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// The full calendar-year window starting at `start`: `[start, start + 1 year − 1 day]`.
pub fn year_window(start: NaiveDate) -> (NaiveDate, NaiveDate) {
    let end = add_months(start, 12)
        .pred_opt()
        .unwrap_or(start);
    (start, end)
}

/// The calendar half-year (Jan–Jun or Jul–Dec) containing `date`.
pub fn half_year_window(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let year = date.year();
    if date.month() <= 6 {
        (ymd(year, 1, 1), ymd(year, 6, 30))
    } else {
        (ymd(year, 7, 1), ymd(year, 12, 31))
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}
