//! Sales analytics model.
//!
//! Period windows are computed from a caller-supplied "today" so the same
//! rules can be tested without a clock. Stores that can aggregate natively
//! (SQL) only borrow the windows; the folding functions below are used by
//! stores that hold records in memory.

use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate};
use serde::Serialize;

use inventrack_core::{Money, StoreId};

use crate::sale::SaleRecord;

/// Length of the trailing revenue trend, in days before "today".
pub const TREND_DAYS: u64 = 30;

/// Start of the `overall` period (1970-01-01).
pub fn epoch_floor() -> NaiveDate {
    NaiveDate::default()
}

/// Reporting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
    Overall,
}

impl Period {
    pub const ALL: [Period; 4] = [Period::Daily, Period::Weekly, Period::Monthly, Period::Overall];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
            Period::Overall => "overall",
        }
    }

    /// First day of the period containing `today`. Weeks start on Monday.
    pub fn start(&self, today: NaiveDate) -> NaiveDate {
        match self {
            Period::Daily => today,
            Period::Weekly => {
                today - Days::new(u64::from(today.weekday().num_days_from_monday()))
            }
            Period::Monthly => today - Days::new(u64::from(today.day0())),
            Period::Overall => epoch_floor(),
        }
    }

    pub fn window(&self, today: NaiveDate) -> DateWindow {
        DateWindow {
            from: self.start(today),
            to: today,
        }
    }
}

/// Inclusive calendar-day range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

/// Window of the revenue trend: `[today - 30 days, today]`.
pub fn trend_window(today: NaiveDate) -> DateWindow {
    DateWindow {
        from: today - Days::new(TREND_DAYS),
        to: today,
    }
}

/// Aggregates for one period. An empty period is all zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KpiTotals {
    pub sales_count: u64,
    pub units_sold: i64,
    pub revenue: Money,
}

impl KpiTotals {
    fn add(&mut self, record: &SaleRecord) {
        self.sales_count += 1;
        self.units_sold = self.units_sold.saturating_add(record.units_sold);
        self.revenue = self.revenue + record.revenue();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodKpis {
    pub daily: KpiTotals,
    pub weekly: KpiTotals,
    pub monthly: KpiTotals,
    pub overall: KpiTotals,
}

impl PeriodKpis {
    pub fn get(&self, period: Period) -> &KpiTotals {
        match period {
            Period::Daily => &self.daily,
            Period::Weekly => &self.weekly,
            Period::Monthly => &self.monthly,
            Period::Overall => &self.overall,
        }
    }

    pub fn set(&mut self, period: Period, totals: KpiTotals) {
        match period {
            Period::Daily => self.daily = totals,
            Period::Weekly => self.weekly = totals,
            Period::Monthly => self.monthly = totals,
            Period::Overall => self.overall = totals,
        }
    }
}

/// Revenue of one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub revenue: Money,
}

/// Dashboard report for one shop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesAnalytics {
    pub store_id: StoreId,
    pub today: NaiveDate,
    pub kpis: PeriodKpis,
    /// Sparse (days without sales are absent), ascending by date.
    pub trend: Vec<TrendPoint>,
}

/// Fold a shop's records falling inside `window`.
pub fn summarize<'a, I>(records: I, store_id: &StoreId, window: DateWindow) -> KpiTotals
where
    I: IntoIterator<Item = &'a SaleRecord>,
{
    records
        .into_iter()
        .filter(|r| &r.store_id == store_id && window.contains(r.date))
        .fold(KpiTotals::default(), |mut acc, r| {
            acc.add(r);
            acc
        })
}

/// Revenue per day for a shop's records inside `window`.
pub fn daily_revenue<'a, I>(records: I, store_id: &StoreId, window: DateWindow) -> Vec<TrendPoint>
where
    I: IntoIterator<Item = &'a SaleRecord>,
{
    let mut by_day: BTreeMap<NaiveDate, Money> = BTreeMap::new();
    for r in records
        .into_iter()
        .filter(|r| &r.store_id == store_id && window.contains(r.date))
    {
        let slot = by_day.entry(r.date).or_insert(Money::ZERO);
        *slot = *slot + r.revenue();
    }
    by_day
        .into_iter()
        .map(|(date, revenue)| TrendPoint { date, revenue })
        .collect()
}
