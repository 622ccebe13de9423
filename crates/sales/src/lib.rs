//! Sales domain module.
//!
//! Bill processing rules (stock deduction and sale records) and the sales
//! analytics model (period windows, KPI folding, revenue trend). Pure domain
//! logic (no IO, no HTTP, no storage).

pub mod analytics;
pub mod sale;

pub use analytics::{
    daily_revenue, epoch_floor, summarize, trend_window, DateWindow, KpiTotals, Period, PeriodKpis,
    SalesAnalytics, TrendPoint, TREND_DAYS,
};
pub use sale::{record_line, ProcessSale, SaleLine, SaleReceipt, SaleRecord};
