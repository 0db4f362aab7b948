//! Message formatting for the push notification. Pure and deterministic:
//! identical inputs always produce byte-identical output, which the
//! dispatcher relies on when deriving idempotency keys.

use chrono::NaiveDate;

use crate::types::TickerSnapshot;

/// Render the multi-section snapshot message: a dated header, one block
/// per ticker, and a trailing FX line. Surrounding whitespace is trimmed.
pub fn format_snapshot_message(
    run_date: NaiveDate,
    snapshots: &[TickerSnapshot],
    fx_rate: f64,
) -> String {
    let mut message = format!("ETF Price Tracker {}\n\n", run_date.format("%Y-%m-%d"));
    for snapshot in snapshots {
        message.push_str(&format!("[{}]\n", snapshot.symbol));
        message.push_str(&format!("Price: ${:.2}\n", snapshot.current_price));
        message.push_str(&format!("Daily: {}%\n", snapshot.daily_change_pct));
        message.push_str(&format!("Weekly: {}%\n\n", snapshot.weekly_change_pct));
    }
    message.push_str("[FX]\n");
    message.push_str(&format!("USD/JPY: {:.2}\n", fx_rate));
    message.trim().to_string()
}
