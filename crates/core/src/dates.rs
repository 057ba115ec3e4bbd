//! Natural-language date and time resolution.
//!
//! Everything here is a pure function of the input text and a caller-supplied
//! `now`. Unrecognized input yields `None`; callers leave the due date unset.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Relative due-date window used by list filters and bulk criteria.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFilter {
    Today,
    ThisWeek,
    ThisMonth,
    Overdue,
}

impl DateFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::ThisWeek => "this_week",
            Self::ThisMonth => "this_month",
            Self::Overdue => "overdue",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace(' ', "_");
        match normalized.as_str() {
            "today" => Some(Self::Today),
            "this_week" | "week" => Some(Self::ThisWeek),
            "this_month" | "month" => Some(Self::ThisMonth),
            "overdue" | "late" => Some(Self::Overdue),
            _ => None,
        }
    }

    /// Half-open `[start, end)` window relative to `now`. Weeks start on Monday.
    pub fn range(&self, now: DateTime<Utc>) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let today = now.date_naive();
        match self {
            Self::Today => (Some(midnight(today)), Some(midnight(today + Duration::days(1)))),
            Self::ThisWeek => {
                let start =
                    today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
                (Some(midnight(start)), Some(midnight(start + Duration::days(7))))
            }
            Self::ThisMonth => {
                let start = today.with_day(1).unwrap_or(today);
                let end = start.checked_add_months(Months::new(1)).unwrap_or(start);
                (Some(midnight(start)), Some(midnight(end)))
            }
            Self::Overdue => (None, Some(now)),
        }
    }
}

/// Resolves a due date plus optional time into a UTC timestamp.
///
/// A time embedded in the date text ("tomorrow at 2pm") is honored when no
/// separate time is given. Without a resolvable date the result is `None`.
pub fn resolve_due(
    date_text: Option<&str>,
    time_text: Option<&str>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let date_text = date_text.map(str::trim).filter(|text| !text.is_empty())?;
    let explicit_time = time_text.and_then(resolve_time);

    if let Some(date) = resolve_date(date_text, now) {
        return Some(combine(date, explicit_time));
    }

    let (date_part, embedded_time) = split_embedded_time(date_text)?;
    let date = resolve_date(&date_part, now)?;
    Some(combine(date, explicit_time.or(Some(embedded_time))))
}

pub fn combine(date: NaiveDate, time: Option<NaiveTime>) -> DateTime<Utc> {
    let time = time.unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&date.and_time(time))
}

pub fn resolve_date(text: &str, now: DateTime<Utc>) -> Option<NaiveDate> {
    let normalized = normalize(text);
    let text = strip_prefixes(&normalized, &["due on ", "due by ", "due ", "on ", "by "]);
    let today = now.date_naive();

    match text {
        "today" | "tonight" => return Some(today),
        "tomorrow" => return Some(today + Duration::days(1)),
        "yesterday" => return Some(today - Duration::days(1)),
        "next week" => return Some(today + Duration::days(7)),
        "next month" => return Some(today + Duration::days(30)),
        "this week" | "this month" => return Some(today),
        _ => {}
    }

    if let Some(date) = relative_offset(text, today) {
        return Some(date);
    }
    if let Some(date) = weekday(text, today) {
        return Some(date);
    }
    for format in ["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }
    day_and_month(text, today)
}

/// Parses "2pm", "2:30 pm", "14:00", "at 9am", "noon" and "midnight".
pub fn resolve_time(text: &str) -> Option<NaiveTime> {
    parse_time(text, false)
}

fn parse_time(text: &str, require_marker: bool) -> Option<NaiveTime> {
    let normalized = normalize(text);
    let text = strip_prefixes(&normalized, &["at "]);
    match text {
        "noon" | "midday" => return NaiveTime::from_hms_opt(12, 0, 0),
        "midnight" => return NaiveTime::from_hms_opt(0, 0, 0),
        _ => {}
    }

    let (clock, meridiem) = split_meridiem(text);
    let (hour, minute) = match clock.split_once(':') {
        Some((hour, minute)) => (hour, Some(minute)),
        None => (clock, None),
    };
    if require_marker && meridiem.is_none() && minute.is_none() {
        return None;
    }
    if hour.is_empty() || hour.len() > 2 || !hour.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut hour: u32 = hour.parse().ok()?;
    let minute: u32 = match minute {
        Some(minute) if minute.len() == 2 && minute.bytes().all(|b| b.is_ascii_digit()) => {
            minute.parse().ok()?
        }
        Some(_) => return None,
        None => 0,
    };

    match meridiem {
        Some(Meridiem::Am) => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            if hour == 12 {
                hour = 0;
            }
        }
        Some(Meridiem::Pm) => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            if hour != 12 {
                hour += 12;
            }
        }
        None => {}
    }

    NaiveTime::from_hms_opt(hour, minute, 0)
}

#[derive(Clone, Copy)]
enum Meridiem {
    Am,
    Pm,
}

fn split_meridiem(text: &str) -> (&str, Option<Meridiem>) {
    for (suffix, meridiem) in
        [("a.m.", Meridiem::Am), ("p.m.", Meridiem::Pm), ("am", Meridiem::Am), ("pm", Meridiem::Pm)]
    {
        if let Some(clock) = text.strip_suffix(suffix) {
            return (clock.trim_end(), Some(meridiem));
        }
    }
    (text, None)
}

/// Splits "friday at 3pm" or "tomorrow 9:30am" into date text and time.
fn split_embedded_time(text: &str) -> Option<(String, NaiveTime)> {
    let normalized = normalize(text);
    if let Some((date, time)) = normalized.rsplit_once(" at ") {
        let time = parse_time(time, false)?;
        return Some((date.trim().to_owned(), time));
    }

    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    for tail in [2usize, 1] {
        if tokens.len() <= tail {
            continue;
        }
        let (date, time) = tokens.split_at(tokens.len() - tail);
        if let Some(time) = parse_time(&time.join(" "), true) {
            return Some((date.join(" "), time));
        }
    }
    None
}

fn relative_offset(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let rest = text.strip_prefix("in ")?;
    let (amount, unit) = rest.split_once(' ')?;
    let amount: i64 = amount.parse().ok()?;
    let days = match unit.trim() {
        "day" | "days" => amount,
        "week" | "weeks" => amount.checked_mul(7)?,
        _ => return None,
    };
    today.checked_add_signed(Duration::try_days(days)?)
}

/// Next occurrence of the named weekday, never today.
fn weekday(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let name = strip_prefixes(text, &["next ", "this ", "coming "]);
    let target = parse_weekday(name)?;
    let current = today.weekday().num_days_from_monday() as i64;
    let mut ahead = target.num_days_from_monday() as i64 - current;
    if ahead <= 0 {
        ahead += 7;
    }
    Some(today + Duration::days(ahead))
}

fn parse_weekday(name: &str) -> Option<Weekday> {
    match name {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" | "tues" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" | "thur" | "thurs" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

fn parse_month(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
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
    let name = name.trim_end_matches('.');
    if name.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|month| month.starts_with(name))
        .and_then(|index| u32::try_from(index + 1).ok())
}

fn parse_day(token: &str) -> Option<u32> {
    let digits = ["st", "nd", "rd", "th"]
        .iter()
        .find_map(|suffix| token.strip_suffix(suffix))
        .unwrap_or(token);
    if digits.is_empty() || digits.len() > 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|day| (1..=31).contains(day))
}

/// "29th jan", "jan 29", "january 29, 2027", "29 january 2027". A date
/// without a year that has already passed rolls over to next year.
fn day_and_month(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let cleaned = text.replace(',', " ");
    let tokens: Vec<&str> =
        cleaned.split_whitespace().filter(|token| *token != "of" && *token != "the").collect();
    let (day, month, year) = match tokens.as_slice() {
        [first, second] => day_month_pair(first, second)
            .map(|(day, month)| (day, month, None))?,
        [first, second, year] => {
            let (day, month) = day_month_pair(first, second)?;
            let year: i32 = year.parse().ok().filter(|_| year.len() == 4)?;
            (day, month, Some(year))
        }
        _ => return None,
    };

    match year {
        Some(year) => NaiveDate::from_ymd_opt(year, month, day),
        None => {
            let this_year = NaiveDate::from_ymd_opt(today.year(), month, day);
            match this_year {
                Some(date) if date >= today => Some(date),
                _ => NaiveDate::from_ymd_opt(today.year() + 1, month, day),
            }
        }
    }
}

fn day_month_pair(first: &str, second: &str) -> Option<(u32, u32)> {
    if let (Some(day), Some(month)) = (parse_day(first), parse_month(second)) {
        return Some((day, month));
    }
    match (parse_month(first), parse_day(second)) {
        (Some(month), Some(day)) => Some((day, month)),
        _ => None,
    }
}

fn normalize(text: &str) -> String {
    text.trim().trim_end_matches(['.', '!', '?']).trim().to_lowercase()
}

fn strip_prefixes<'a>(text: &'a str, prefixes: &[&str]) -> &'a str {
    prefixes
        .iter()
        .find_map(|prefix| text.strip_prefix(prefix))
        .map(str::trim)
        .unwrap_or(text)
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    combine(date, None)
}
