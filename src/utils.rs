use chrono::{Datelike, NaiveDate};

/// Truncates a date to the first day of its month.
pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Number of months since year 0, so that consecutive months differ by one.
pub fn month_ordinal(date: NaiveDate) -> i32 {
    date.year() * 12 + date.month0() as i32
}

pub fn from_month_ordinal(ordinal: i32) -> Option<NaiveDate> {
    let year = ordinal.div_euclid(12);
    let month = ordinal.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// First day of the month `months` away from `date` (negative values go back).
pub fn add_months(date: NaiveDate, months: i32) -> Option<NaiveDate> {
    from_month_ordinal(month_ordinal(date) + months)
}

pub fn months_between(start: NaiveDate, end: NaiveDate) -> i32 {
    let year_diff = end.year() - start.year();
    let month_diff = end.month() as i32 - start.month() as i32;
    year_diff * 12 + month_diff
}

/// Every first-of-month date from `start`'s month through `end`'s month inclusive.
pub fn months_in_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    (month_ordinal(start)..=month_ordinal(end))
        .filter_map(from_month_ordinal)
        .collect()
}
