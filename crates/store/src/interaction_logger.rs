//! Per-turn observability logging: one row per assistant turn, carrying
//! routing metadata, latency/token counts, and the style metrics computed
//! by `mnemo_text::style`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::params;

use mnemo_text::calculate_style_metrics;
use sa_domain::error::Result;
use sa_domain::model::InteractionLog;

use crate::connection::ConnectionManager;

pub struct InteractionLogger {
    conn: Arc<ConnectionManager>,
}

impl InteractionLogger {
    pub fn new(conn: Arc<ConnectionManager>) -> Self {
        Self { conn }
    }

    /// Record one interaction log row. The style metrics are derived from
    /// `response_text` when present; absent response text logs zeroed
    /// metrics rather than skipping the row.
    pub fn log_interaction(
        &self,
        conversation_id: &str,
        turn_id: u64,
        effective_model: &str,
        tier: &str,
        router_reason: &str,
        routing_features: &std::collections::HashMap<String, String>,
        manual_override: bool,
        latency_ms: u64,
        ttft_ms: Option<u64>,
        tokens_in: u64,
        tokens_out: u64,
        tool_calls: &[String],
        refusal_detected: bool,
        response_text: Option<&str>,
    ) -> Result<()> {
        let style = response_text
            .map(calculate_style_metrics)
            .unwrap_or(mnemo_text::StyleMetrics { hedge_ratio: 0.0, avg_sentence_len: 0.0 });

        self.conn.with_connection(|conn| {
            conn.execute(
                "INSERT INTO interaction_logs (
                    ts, conversation_id, turn_id, effective_model, tier, router_reason,
                    routing_features_json, manual_override, latency_ms, ttft_ms,
                    tokens_in, tokens_out, tool_calls_json, refusal_detected,
                    response_chars, hedge_ratio, avg_sentence_len
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    Utc::now().to_rfc3339(),
                    conversation_id,
                    turn_id as i64,
                    effective_model,
                    tier,
                    router_reason,
                    serde_json::to_string(routing_features).unwrap_or_else(|_| "{}".into()),
                    manual_override as i64,
                    latency_ms as i64,
                    ttft_ms.map(|v| v as i64),
                    tokens_in as i64,
                    tokens_out as i64,
                    serde_json::to_string(tool_calls).unwrap_or_else(|_| "[]".into()),
                    refusal_detected as i64,
                    response_text.map(|r| r.chars().count() as i64),
                    style.hedge_ratio,
                    style.avg_sentence_len,
                ],
            )?;
            Ok(())
        })
    }

    pub fn recent_logs(&self, limit: usize) -> Result<Vec<InteractionLog>> {
        self.conn.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT ts, conversation_id, turn_id, effective_model, tier, router_reason,
                        routing_features_json, manual_override, latency_ms, ttft_ms,
                        tokens_in, tokens_out, tool_calls_json, refusal_detected,
                        response_chars, hedge_ratio, avg_sentence_len
                 FROM interaction_logs ORDER BY ts DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], row_to_log)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }
}

fn row_to_log(row: &rusqlite::Row<'_>) -> rusqlite::Result<InteractionLog> {
    let ts: String = row.get(0)?;
    let routing_features_json: String = row.get(6)?;
    let manual_override: i64 = row.get(7)?;
    let tool_calls_json: String = row.get(12)?;
    let refusal_detected: i64 = row.get(13)?;
    let ttft_ms: Option<i64> = row.get(9)?;
    let response_chars: Option<i64> = row.get(14)?;

    Ok(InteractionLog {
        ts: DateTime::parse_from_rfc3339(&ts)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        conversation_id: row.get(1)?,
        turn_id: {
            let v: i64 = row.get(2)?;
            v as u64
        },
        effective_model: row.get(3)?,
        tier: row.get(4)?,
        router_reason: row.get(5)?,
        routing_features: serde_json::from_str(&routing_features_json).unwrap_or_default(),
        manual_override: manual_override != 0,
        latency_ms: {
            let v: i64 = row.get(8)?;
            v as u64
        },
        ttft_ms: ttft_ms.map(|v| v as u64),
        tokens_in: {
            let v: i64 = row.get(10)?;
            v as u64
        },
        tokens_out: {
            let v: i64 = row.get(11)?;
            v as u64
        },
        tool_calls: serde_json::from_str(&tool_calls_json).unwrap_or_default(),
        refusal_detected: refusal_detected != 0,
        response_chars: response_chars.unwrap_or(0) as u64,
        hedge_ratio: row.get(15)?,
        avg_sentence_len: row.get(16)?,
    })
}
