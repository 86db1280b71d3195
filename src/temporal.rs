//! Calendar values at day, ISO week, month and year granularity.
//!
//! Values are created through a [`TemporalCache`], which interns them by
//! their canonical string: two equal values share one allocation, so they can
//! be used as map keys without any normalisation. The cache is an explicit
//! object; tests build their own and the query layer passes one down.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use serde::{Serialize, Serializer};

use crate::domain::{Granularity, LapisFilter};
use crate::error::DashboardError;
use crate::sync::lock;

#[derive(Debug)]
struct DayInner {
    date: NaiveDate,
    text: String,
}

#[derive(Debug)]
struct WeekInner {
    iso_year: i32,
    iso_week: u32,
    monday: NaiveDate,
    text: String,
}

#[derive(Debug)]
struct MonthInner {
    year: i32,
    month: u32,
    first: NaiveDate,
    last: NaiveDate,
    text: String,
}

#[derive(Debug)]
struct YearInner {
    year: i32,
    first: NaiveDate,
    last: NaiveDate,
    text: String,
}

#[derive(Debug, Clone)]
pub struct YearMonthDay(Arc<DayInner>);

#[derive(Debug, Clone)]
pub struct YearWeek(Arc<WeekInner>);

#[derive(Debug, Clone)]
pub struct YearMonth(Arc<MonthInner>);

#[derive(Debug, Clone)]
pub struct Year(Arc<YearInner>);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Temporal {
    Day(YearMonthDay),
    Week(YearWeek),
    Month(YearMonth),
    Year(Year),
}

macro_rules! interned_identity {
    ($($ty:ident),*) => {
        $(
            impl $ty {
                pub fn text(&self) -> &str {
                    &self.0.text
                }

                /// True when both handles point at the same interned value.
                pub fn same_instance(&self, other: &Self) -> bool {
                    Arc::ptr_eq(&self.0, &other.0)
                }
            }

            impl PartialEq for $ty {
                fn eq(&self, other: &Self) -> bool {
                    Arc::ptr_eq(&self.0, &other.0) || self.0.text == other.0.text
                }
            }

            impl Eq for $ty {}

            impl Hash for $ty {
                fn hash<H: Hasher>(&self, state: &mut H) {
                    self.0.text.hash(state);
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0.text)
                }
            }

            impl Serialize for $ty {
                fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                    serializer.serialize_str(&self.0.text)
                }
            }
        )*
    };
}

interned_identity!(YearMonthDay, YearWeek, YearMonth, Year);

impl YearMonthDay {
    pub fn date(&self) -> NaiveDate {
        self.0.date
    }

    pub fn year_number(&self) -> i32 {
        self.0.date.year()
    }

    pub fn month_number(&self) -> u32 {
        self.0.date.month()
    }

    pub fn day_number(&self) -> u32 {
        self.0.date.day()
    }

    pub fn week(&self, cache: &TemporalCache) -> YearWeek {
        cache.week_of(self.0.date)
    }

    pub fn month(&self, cache: &TemporalCache) -> YearMonth {
        cache.month_of(self.0.date)
    }

    pub fn year(&self, cache: &TemporalCache) -> Year {
        cache.year_of(self.0.date)
    }

    pub fn add_days(&self, cache: &TemporalCache, days: i64) -> Result<YearMonthDay, DashboardError> {
        let date = shift_days(self.0.date, days)?;
        Ok(cache.day_of(date))
    }

    pub fn difference(&self, other: &YearMonthDay) -> i64 {
        (self.0.date - other.0.date).num_days()
    }
}

impl YearWeek {
    pub fn iso_year_number(&self) -> i32 {
        self.0.iso_year
    }

    pub fn iso_week_number(&self) -> u32 {
        self.0.iso_week
    }

    pub fn first_day(&self, cache: &TemporalCache) -> YearMonthDay {
        cache.day_of(self.0.monday)
    }

    pub fn last_day(&self, cache: &TemporalCache) -> YearMonthDay {
        cache.day_of(self.last_date())
    }

    fn last_date(&self) -> NaiveDate {
        self.0
            .monday
            .checked_add_days(Days::new(6))
            .unwrap_or(self.0.monday)
    }

    pub fn add_weeks(&self, cache: &TemporalCache, weeks: i64) -> Result<YearWeek, DashboardError> {
        let date = shift_days(self.0.monday, weeks.saturating_mul(7))?;
        Ok(cache.week_of(date))
    }

    pub fn difference(&self, other: &YearWeek) -> i64 {
        (self.0.monday - other.0.monday).num_days() / 7
    }
}

impl YearMonth {
    pub fn year_number(&self) -> i32 {
        self.0.year
    }

    pub fn month_number(&self) -> u32 {
        self.0.month
    }

    pub fn first_day(&self, cache: &TemporalCache) -> YearMonthDay {
        cache.day_of(self.0.first)
    }

    pub fn last_day(&self, cache: &TemporalCache) -> YearMonthDay {
        cache.day_of(self.0.last)
    }

    pub fn year(&self, cache: &TemporalCache) -> Year {
        cache.year_of(self.0.first)
    }

    pub fn add_months(&self, cache: &TemporalCache, months: i64) -> Result<YearMonth, DashboardError> {
        let amount = u32::try_from(months.unsigned_abs())
            .map_err(|_| DashboardError::InvalidTemporal(format!("{} + {months} months", self)))?;
        let shifted = if months >= 0 {
            self.0.first.checked_add_months(Months::new(amount))
        } else {
            self.0.first.checked_sub_months(Months::new(amount))
        };
        let date = shifted
            .ok_or_else(|| DashboardError::InvalidTemporal(format!("{} + {months} months", self)))?;
        Ok(cache.month_of(date))
    }

    pub fn difference(&self, other: &YearMonth) -> i64 {
        let own = i64::from(self.0.year) * 12 + i64::from(self.0.month);
        let theirs = i64::from(other.0.year) * 12 + i64::from(other.0.month);
        own - theirs
    }
}

impl Year {
    pub fn year_number(&self) -> i32 {
        self.0.year
    }

    pub fn first_day(&self, cache: &TemporalCache) -> YearMonthDay {
        cache.day_of(self.0.first)
    }

    pub fn last_day(&self, cache: &TemporalCache) -> YearMonthDay {
        cache.day_of(self.0.last)
    }

    pub fn first_month(&self, cache: &TemporalCache) -> YearMonth {
        cache.month_of(self.0.first)
    }

    pub fn add_years(&self, cache: &TemporalCache, years: i64) -> Result<Year, DashboardError> {
        let year = i32::try_from(i64::from(self.0.year) + years)
            .map_err(|_| DashboardError::InvalidTemporal(format!("{} + {years} years", self)))?;
        cache.year_number(year)
    }

    pub fn difference(&self, other: &Year) -> i64 {
        i64::from(self.0.year) - i64::from(other.0.year)
    }
}

impl Temporal {
    pub fn granularity(&self) -> Granularity {
        match self {
            Temporal::Day(_) => Granularity::Day,
            Temporal::Week(_) => Granularity::Week,
            Temporal::Month(_) => Granularity::Month,
            Temporal::Year(_) => Granularity::Year,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Temporal::Day(value) => value.text(),
            Temporal::Week(value) => value.text(),
            Temporal::Month(value) => value.text(),
            Temporal::Year(value) => value.text(),
        }
    }

    pub fn first_date(&self) -> NaiveDate {
        match self {
            Temporal::Day(value) => value.0.date,
            Temporal::Week(value) => value.0.monday,
            Temporal::Month(value) => value.0.first,
            Temporal::Year(value) => value.0.first,
        }
    }

    pub fn last_date(&self) -> NaiveDate {
        match self {
            Temporal::Day(value) => value.0.date,
            Temporal::Week(value) => value.last_date(),
            Temporal::Month(value) => value.0.last,
            Temporal::Year(value) => value.0.last,
        }
    }

    pub fn first_day(&self, cache: &TemporalCache) -> YearMonthDay {
        cache.day_of(self.first_date())
    }

    pub fn last_day(&self, cache: &TemporalCache) -> YearMonthDay {
        cache.day_of(self.last_date())
    }

    pub fn add(&self, cache: &TemporalCache, amount: i64) -> Result<Temporal, DashboardError> {
        Ok(match self {
            Temporal::Day(value) => Temporal::Day(value.add_days(cache, amount)?),
            Temporal::Week(value) => Temporal::Week(value.add_weeks(cache, amount)?),
            Temporal::Month(value) => Temporal::Month(value.add_months(cache, amount)?),
            Temporal::Year(value) => Temporal::Year(value.add_years(cache, amount)?),
        })
    }

    /// Signed number of units from `other` to `self`.
    pub fn difference(&self, other: &Temporal) -> Result<i64, DashboardError> {
        match (self, other) {
            (Temporal::Day(a), Temporal::Day(b)) => Ok(a.difference(b)),
            (Temporal::Week(a), Temporal::Week(b)) => Ok(a.difference(b)),
            (Temporal::Month(a), Temporal::Month(b)) => Ok(a.difference(b)),
            (Temporal::Year(a), Temporal::Year(b)) => Ok(a.difference(b)),
            _ => Err(DashboardError::GranularityMismatch {
                left: self.text().to_string(),
                right: other.text().to_string(),
            }),
        }
    }
}

impl Ord for Temporal {
    fn cmp(&self, other: &Self) -> Ordering {
        self.first_date()
            .cmp(&other.first_date())
            .then_with(|| self.last_date().cmp(&other.last_date()))
            .then_with(|| self.text().cmp(other.text()))
    }
}

impl PartialOrd for Temporal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Temporal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text())
    }
}

impl Serialize for Temporal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.text())
    }
}

/// Orders by calendar position; missing values sort last.
pub fn compare_temporal(left: Option<&Temporal>, right: Option<&Temporal>) -> Ordering {
    match (left, right) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Every value from `start` to `end` inclusive, produced by repeated
/// `add(1)`. Empty when `end` precedes `start`.
pub fn generate_range(
    cache: &TemporalCache,
    start: &Temporal,
    end: &Temporal,
) -> Result<Vec<Temporal>, DashboardError> {
    let steps = end.difference(start)?;
    if steps < 0 {
        return Ok(Vec::new());
    }
    let mut range = Vec::with_capacity(steps as usize + 1);
    let mut current = start.clone();
    range.push(current.clone());
    for _ in 0..steps {
        current = current.add(cache, 1)?;
        range.push(current.clone());
    }
    Ok(range)
}

pub fn min_max<'a, I>(values: I) -> Option<(Temporal, Temporal)>
where
    I: IntoIterator<Item = &'a Temporal>,
{
    values.into_iter().fold(None, |acc, value| match acc {
        None => Some((value.clone(), value.clone())),
        Some((min, max)) => {
            let min = if value < &min { value.clone() } else { min };
            let max = if value > &max { value.clone() } else { max };
            Some((min, max))
        }
    })
}

/// `{field}From` / `{field}To` restricting a filter to one temporal unit.
pub fn date_range_filter(field: &str, temporal: &Temporal) -> LapisFilter {
    LapisFilter::new()
        .with(format!("{field}From"), temporal.first_date().format("%Y-%m-%d").to_string())
        .with(format!("{field}To"), temporal.last_date().format("%Y-%m-%d").to_string())
}

#[derive(Debug, Default)]
pub struct TemporalCache {
    days: Mutex<HashMap<String, YearMonthDay>>,
    weeks: Mutex<HashMap<String, YearWeek>>,
    months: Mutex<HashMap<String, YearMonth>>,
    years: Mutex<HashMap<String, Year>>,
}

impl TemporalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `YYYY-MM-DD`.
    pub fn day(&self, text: &str) -> Result<YearMonthDay, DashboardError> {
        if let Some(hit) = lock(&self.days).get(text) {
            return Ok(hit.clone());
        }
        let date = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
            .map_err(|_| DashboardError::InvalidTemporal(text.to_string()))?;
        Ok(self.day_of(date))
    }

    /// Parses `YYYY-Www` (ISO week).
    pub fn week(&self, text: &str) -> Result<YearWeek, DashboardError> {
        if let Some(hit) = lock(&self.weeks).get(text) {
            return Ok(hit.clone());
        }
        let invalid = || DashboardError::InvalidTemporal(text.to_string());
        let (year, week) = text.trim().split_once("-W").ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let week = week.parse::<u32>().map_err(|_| invalid())?;
        self.week_number(year, week)
    }

    /// Parses `YYYY-MM`.
    pub fn month(&self, text: &str) -> Result<YearMonth, DashboardError> {
        if let Some(hit) = lock(&self.months).get(text) {
            return Ok(hit.clone());
        }
        let invalid = || DashboardError::InvalidTemporal(text.to_string());
        let (year, month) = text.trim().split_once('-').ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        self.month_number(year, month)
    }

    /// Parses `YYYY`.
    pub fn year(&self, text: &str) -> Result<Year, DashboardError> {
        if let Some(hit) = lock(&self.years).get(text) {
            return Ok(hit.clone());
        }
        let year = text
            .trim()
            .parse::<i32>()
            .map_err(|_| DashboardError::InvalidTemporal(text.to_string()))?;
        self.year_number(year)
    }

    pub fn week_number(&self, iso_year: i32, iso_week: u32) -> Result<YearWeek, DashboardError> {
        let monday = NaiveDate::from_isoywd_opt(iso_year, iso_week, Weekday::Mon).ok_or_else(|| {
            DashboardError::InvalidTemporal(format!("{iso_year}-W{iso_week:02}"))
        })?;
        Ok(self.week_of(monday))
    }

    pub fn month_number(&self, year: i32, month: u32) -> Result<YearMonth, DashboardError> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| DashboardError::InvalidTemporal(format!("{year:04}-{month:02}")))?;
        Ok(self.month_of(first))
    }

    pub fn year_number(&self, year: i32) -> Result<Year, DashboardError> {
        let first = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| DashboardError::InvalidTemporal(year.to_string()))?;
        Ok(self.year_of(first))
    }

    pub fn parse(&self, text: &str, granularity: Granularity) -> Result<Temporal, DashboardError> {
        Ok(match granularity {
            Granularity::Day => Temporal::Day(self.day(text)?),
            Granularity::Week => Temporal::Week(self.week(text)?),
            Granularity::Month => Temporal::Month(self.month(text)?),
            Granularity::Year => Temporal::Year(self.year(text)?),
        })
    }

    /// Projects a `YYYY-MM-DD` day onto the unit of `granularity` containing it.
    pub fn from_date_string(
        &self,
        date: &str,
        granularity: Granularity,
    ) -> Result<Temporal, DashboardError> {
        let day = self.day(date)?;
        Ok(self.project(&day, granularity))
    }

    pub fn project(&self, day: &YearMonthDay, granularity: Granularity) -> Temporal {
        match granularity {
            Granularity::Day => Temporal::Day(day.clone()),
            Granularity::Week => Temporal::Week(day.week(self)),
            Granularity::Month => Temporal::Month(day.month(self)),
            Granularity::Year => Temporal::Year(day.year(self)),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.days).len()
            + lock(&self.weeks).len()
            + lock(&self.months).len()
            + lock(&self.years).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn day_of(&self, date: NaiveDate) -> YearMonthDay {
        let text = date.format("%Y-%m-%d").to_string();
        lock(&self.days)
            .entry(text.clone())
            .or_insert_with(|| YearMonthDay(Arc::new(DayInner { date, text })))
            .clone()
    }

    fn week_of(&self, date: NaiveDate) -> YearWeek {
        let iso = date.iso_week();
        let text = format!("{:04}-W{:02}", iso.year(), iso.week());
        lock(&self.weeks)
            .entry(text.clone())
            .or_insert_with(|| {
                let monday = NaiveDate::from_isoywd_opt(iso.year(), iso.week(), Weekday::Mon)
                    .unwrap_or(date);
                YearWeek(Arc::new(WeekInner {
                    iso_year: iso.year(),
                    iso_week: iso.week(),
                    monday,
                    text,
                }))
            })
            .clone()
    }

    fn month_of(&self, date: NaiveDate) -> YearMonth {
        let text = format!("{:04}-{:02}", date.year(), date.month());
        lock(&self.months)
            .entry(text.clone())
            .or_insert_with(|| {
                let first = date.with_day(1).unwrap_or(date);
                let last = first
                    .checked_add_months(Months::new(1))
                    .and_then(|next| next.pred_opt())
                    .unwrap_or(first);
                YearMonth(Arc::new(MonthInner {
                    year: date.year(),
                    month: date.month(),
                    first,
                    last,
                    text,
                }))
            })
            .clone()
    }

    fn year_of(&self, date: NaiveDate) -> Year {
        let text = format!("{:04}", date.year());
        lock(&self.years)
            .entry(text.clone())
            .or_insert_with(|| {
                let first = date.with_ordinal(1).unwrap_or(date);
                let last = NaiveDate::from_ymd_opt(date.year(), 12, 31).unwrap_or(date);
                Year(Arc::new(YearInner {
                    year: date.year(),
                    first,
                    last,
                    text,
                }))
            })
            .clone()
    }
}

fn shift_days(date: NaiveDate, days: i64) -> Result<NaiveDate, DashboardError> {
    let shifted = if days >= 0 {
        date.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    };
    shifted.ok_or_else(|| DashboardError::InvalidTemporal(format!("{date} + {days} days")))
}
