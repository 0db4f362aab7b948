use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily observation for a symbol.
///
/// `close` is `None` when the provider reported a missing or NaN value,
/// which happens at the tail of a series while the provider is still
/// settling the latest session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: Option<f64>,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: Option<f64>) -> Self {
        Self { date, close }
    }

    /// A valid observation is present, finite, and positive.
    pub fn valid_close(&self) -> Option<f64> {
        self.close.filter(|c| c.is_finite() && *c > 0.0)
    }
}

/// Ordered-by-date close series for one symbol. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    symbol: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series from provider points. Points are sorted by date and
    /// de-duplicated (last write wins) so dates are strictly increasing.
    pub fn new(symbol: impl Into<String>, mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|p| p.date);
        points.dedup_by(|b, a| {
            if a.date == b.date {
                *a = *b;
                true
            } else {
                false
            }
        });
        Self {
            symbol: symbol.into(),
            points,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// True when the newest observation carries no usable close. An empty
    /// series counts as missing.
    pub fn latest_close_missing(&self) -> bool {
        self.points
            .last()
            .map_or(true, |p| p.valid_close().is_none())
    }

    /// Valid closes in date order, skipping missing/NaN observations.
    pub fn valid_closes(&self) -> Vec<f64> {
        self.points.iter().filter_map(|p| p.valid_close()).collect()
    }

    /// The most recent valid close, if any observation in the series has one.
    pub fn latest_valid_close(&self) -> Option<f64> {
        self.points.iter().rev().find_map(|p| p.valid_close())
    }
}

/// Per-ticker derived metrics for one run. Built once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickerSnapshot {
    pub symbol: String,
    pub daily_change_pct: f64,
    pub weekly_change_pct: f64,
    pub current_price: f64,
}

/// Everything one invocation derived from the fetched data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    pub run_date: NaiveDate,
    pub is_market_closed: bool,
    pub snapshots: Vec<TickerSnapshot>,
    pub fx_rate: f64,
}

/// Structured result of one invocation. Downstream-stage failures are
/// absorbed into logs and never surface through this report; only
/// acquisition-stage errors fail the run itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub notification_sent: bool,
    pub ticker_count: usize,
    pub message: String,
}

impl RunReport {
    pub fn market_closed() -> Self {
        Self {
            notification_sent: false,
            ticker_count: 0,
            message: "Market is closed today".to_string(),
        }
    }

    pub fn skipped(ticker_count: usize) -> Self {
        Self {
            notification_sent: false,
            ticker_count,
            message: "No notification required".to_string(),
        }
    }

    pub fn completed(notification_sent: bool, ticker_count: usize) -> Self {
        Self {
            notification_sent,
            ticker_count,
            message: "Market snapshot completed successfully".to_string(),
        }
    }
}
