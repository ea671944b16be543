//! `UsageRecorder`: append-only usage logging plus the daily/weekly/monthly
//! bucket upserts, grounded directly on the inherited usage-logging
//! table/bucketing code — same shape, with `user_id`/`action` added so
//! `count_today` is a single indexed query.

use chrono::Datelike;
use rusqlite::{params, Connection};

use crate::db::open_conn;
use crate::error::GatewayResult;

pub struct UsageEvent<'a> {
    pub user_id: &'a str,
    pub action: &'a str,
    pub provider: Option<&'a str>,
    pub model: Option<&'a str>,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub price_usd: f64,
}

fn bucket_day(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}
fn bucket_week(ts: &chrono::DateTime<chrono::Utc>) -> String {
    let iso = ts.iso_week();
    format!("{}-W{:02}", iso.year(), iso.week())
}
fn bucket_month(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m").to_string()
}

fn upsert_bucket(conn: &Connection, table: &str, bucket: &str, user_id: &str, tokens: i64, price: f64) {
    let sql = format!(
        "insert into {table} (bucket, user_id, requests, tokens, price_usd) values (?1, ?2, 1, ?3, ?4) \
         on conflict(bucket, user_id) do update set requests = requests + 1, tokens = tokens + excluded.tokens, price_usd = price_usd + excluded.price_usd"
    );
    let _ = conn.execute(&sql, params![bucket, user_id, tokens, price]);
}

/// Record one usage event. Never awaited on the hot path — callers invoke
/// this via `tokio::spawn` after the response future resolves.
pub fn record(event: &UsageEvent) {
    let conn = open_conn();
    let now = chrono::Utc::now();
    let total_tokens = event.prompt_tokens + event.completion_tokens;

    let result = conn.execute(
        "insert into usage_logs (timestamp, user_id, action, provider, model, prompt_tokens, completion_tokens, total_tokens, price_usd)
         values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![now.timestamp(), event.user_id, event.action, event.provider, event.model, event.prompt_tokens, event.completion_tokens, total_tokens, event.price_usd],
    );
    if let Err(e) = result {
        crate::logger::error("usage", &format!("failed to record usage for user={}: {e}", event.user_id));
        return;
    }

    upsert_bucket(&conn, "usage_daily", &bucket_day(&now), event.user_id, total_tokens, event.price_usd);
    upsert_bucket(&conn, "usage_weekly", &bucket_week(&now), event.user_id, total_tokens, event.price_usd);
    upsert_bucket(&conn, "usage_monthly", &bucket_month(&now), event.user_id, total_tokens, event.price_usd);
}

/// `PolicyEngine`'s admission check against `plan.dailyLimit`. `smart_mode`
/// rows are never counted here — only `ai_request` gates the daily budget.
pub fn count_today(user_id: &str, action: &str) -> GatewayResult<u32> {
    let conn = open_conn();
    let count: i64 = conn.query_row(
        "select count(*) from usage_logs where user_id = ?1 and action = ?2 and date(timestamp, 'unixepoch') = date('now')",
        params![user_id, action],
        |r| r.get(0),
    )?;
    Ok(count as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_keys_have_expected_shapes() {
        let ts = chrono::Utc::now();
        assert_eq!(bucket_day(&ts).len(), 10);
        assert!(bucket_week(&ts).contains('W'));
        assert_eq!(bucket_month(&ts).len(), 7);
    }
}
