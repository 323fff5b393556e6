//! Date and time fields of `DATE`, `NEWGROUPS` and `NEWNEWS`
//! ([RFC 3977 §7.1](https://datatracker.ietf.org/doc/html/rfc3977#section-7.1),
//! [§7.3](https://datatracker.ietf.org/doc/html/rfc3977#section-7.3)).

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::NntpError;

/// Parse a `YYYYMMDD`/`YYMMDD` date and an `HHMMSS` time.
///
/// With `time` absent the last six characters of `date` are taken as the
/// time, which is the shape of a `DATE` reply. Two-digit years below 70 are
/// read as 20xx, the rest as 19xx.
pub fn parse_datetime(date: &str, time: Option<&str>) -> Result<NaiveDateTime, NntpError> {
    let invalid = || NntpError::Data(format!("invalid date/time: {date} {}", time.unwrap_or("")));

    if !date.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let (date, time) = match time {
        Some(time) => (date, time),
        None => {
            let split = date.len().checked_sub(6).ok_or_else(invalid)?;
            date.split_at(split)
        }
    };
    if time.len() != 6 || !time.bytes().all(|b| b.is_ascii_digit()) || date.len() < 5 {
        return Err(invalid());
    }

    let field = |s: &str| s.parse::<u32>().map_err(|_| invalid());
    let (year, month_day) = date.split_at(date.len() - 4);
    let mut year = year.parse::<i32>().map_err(|_| invalid())?;
    if year < 70 {
        year += 2000;
    } else if year < 100 {
        year += 1900;
    }
    let month = field(&month_day[..2])?;
    let day = field(&month_day[2..])?;
    let hour = field(&time[..2])?;
    let minute = field(&time[2..4])?;
    let second = field(&time[4..])?;

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .ok_or_else(invalid)
}

/// Format a timestamp as the `(date, time)` argument pair of `NEWGROUPS`
/// and `NEWNEWS`. `legacy` selects the two-digit year form that servers
/// older than version 2 expect.
pub fn unparse_datetime(dt: &NaiveDateTime, legacy: bool) -> (String, String) {
    let date = if legacy {
        format!("{:02}{:02}{:02}", dt.year().rem_euclid(100), dt.month(), dt.day())
    } else {
        format!("{:04}{:02}{:02}", dt.year(), dt.month(), dt.day())
    };
    let time = format!("{:02}{:02}{:02}", dt.hour(), dt.minute(), dt.second());
    (date, time)
}

/// A bare date stands for midnight at the start of that day.
pub fn at_midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}
