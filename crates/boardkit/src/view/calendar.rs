//! Calendar projection: records placed on the day of their due date.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::Serialize;
use std::collections::BTreeMap;

use boardkit_core::Record;

use crate::config::CalendarConfig;

/// Visible date range of the calendar grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CalendarWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Any day in the month being displayed
    pub reference: NaiveDate,
    pub today: NaiveDate,
}

impl CalendarWindow {
    /// Whole weeks (Monday to Sunday) covering the month of `reference`.
    pub fn month(reference: NaiveDate, today: NaiveDate) -> Self {
        let first = reference.with_day(1).unwrap_or(reference);
        let last = first
            .checked_add_months(chrono::Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(first);
        let start = first - Days::new(u64::from(first.weekday().num_days_from_monday()));
        let end = last + Days::new(u64::from(6 - last.weekday().num_days_from_monday()));
        Self {
            start,
            end,
            reference,
            today,
        }
    }

    /// The Monday-to-Sunday week containing `reference`.
    pub fn week(reference: NaiveDate, today: NaiveDate) -> Self {
        let start = reference - Days::new(u64::from(reference.weekday().num_days_from_monday()));
        Self {
            start,
            end: start + Days::new(6),
            reference,
            today,
        }
    }

    fn flags(&self, date: NaiveDate) -> DayFlags {
        DayFlags {
            is_today: date == self.today,
            is_weekend: matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
            is_within_current_month: date.month() == self.reference.month()
                && date.year() == self.reference.year(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayFlags {
    pub is_today: bool,
    pub is_weekend: bool,
    pub is_within_current_month: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarHeader {
    pub date: NaiveDate,
    pub title: String,
    #[serde(flatten)]
    pub flags: DayFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarItem {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarCell {
    pub date: NaiveDate,
    pub items: Vec<CalendarItem>,
    #[serde(flatten)]
    pub flags: DayFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarView {
    pub window: CalendarWindow,
    pub headers: Vec<CalendarHeader>,
    pub cells: Vec<CalendarCell>,
    /// Records without a usable date
    pub unscheduled: usize,
}

pub fn project_calendar<R: Record>(
    records: &[&R],
    config: &CalendarConfig,
    window: CalendarWindow,
) -> CalendarView {
    let mut by_day: BTreeMap<NaiveDate, Vec<CalendarItem>> = BTreeMap::new();
    let mut unscheduled = 0;
    for record in records {
        let Some(date) = record
            .field(&config.date_field)
            .and_then(|v| v.as_datetime())
            .map(|dt| dt.date_naive())
        else {
            unscheduled += 1;
            continue;
        };
        by_day.entry(date).or_default().push(CalendarItem {
            id: record.id().to_string(),
            title: record
                .field(&config.title_field)
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
        });
    }

    let headers = window
        .start
        .iter_days()
        .take(config.visible_days as usize)
        .map(|date| CalendarHeader {
            date,
            title: date.format("%A").to_string(),
            flags: window.flags(date),
        })
        .collect();

    let cells = window
        .start
        .iter_days()
        .take_while(|date| *date <= window.end)
        .map(|date| CalendarCell {
            date,
            items: by_day.remove(&date).unwrap_or_default(),
            flags: window.flags(date),
        })
        .collect();

    CalendarView {
        window,
        headers,
        cells,
        unscheduled,
    }
}
