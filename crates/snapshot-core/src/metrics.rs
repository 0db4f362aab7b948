//! Derived metrics over a price series: day-over-day and week-over-week
//! percentage change, plus the market-closed decision.
//!
//! Short or gappy series degrade to 0.0 changes by policy rather than
//! erroring, so a run can still notify after data-quality retries are
//! exhausted.

use chrono::{Days, NaiveDate};

use crate::types::{PriceSeries, TickerSnapshot};

/// How many valid observations back the weekly comparison reaches
/// (5 trading days).
const WEEKLY_LOOKBACK: usize = 5;

/// Round to 2 decimal places, half away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn change_pct(latest: f64, base: f64) -> f64 {
    round2(((latest - base) / base) * 100.0)
}

/// Percentage change between the two most recent valid observations.
/// Fewer than 2 valid observations yields 0.0.
pub fn daily_change(series: &PriceSeries) -> f64 {
    let closes = series.valid_closes();
    match closes.as_slice() {
        [.., previous, latest] => change_pct(*latest, *previous),
        _ => 0.0,
    }
}

/// Percentage change between the most recent valid observation and the
/// 5th-most-recent one, or the oldest valid observation when the series
/// holds fewer than 5 valid points. Fewer than 2 valid observations
/// yields 0.0.
pub fn weekly_change(series: &PriceSeries) -> f64 {
    let closes = series.valid_closes();
    if closes.len() < 2 {
        return 0.0;
    }
    let latest = closes[closes.len() - 1];
    let base = if closes.len() >= WEEKLY_LOOKBACK {
        closes[closes.len() - WEEKLY_LOOKBACK]
    } else {
        closes[0]
    };
    change_pct(latest, base)
}

/// The market is considered closed when the series' newest date is not
/// yesterday relative to `today`. An empty series counts as closed
/// (conservative no-op).
pub fn is_market_closed(series: &PriceSeries, today: NaiveDate) -> bool {
    match series.latest_date() {
        Some(latest) => Some(latest) != today.checked_sub_days(Days::new(1)),
        None => true,
    }
}

/// Assemble the per-ticker snapshot. The current price is the most recent
/// valid close, 0.0 when the series holds none.
pub fn build_snapshot(symbol: &str, series: &PriceSeries) -> TickerSnapshot {
    TickerSnapshot {
        symbol: symbol.to_string(),
        daily_change_pct: daily_change(series),
        weekly_change_pct: weekly_change(series),
        current_price: round2(series.latest_valid_close().unwrap_or(0.0)),
    }
}
