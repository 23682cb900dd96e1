use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{AgentReport, NewAgentReport, OrderId, ReportEdit},
    traits::OrderFlowError,
};

pub async fn fetch_report_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<AgentReport>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM agent_reports WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await
}

pub async fn fetch_edits(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Vec<ReportEdit>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM report_edits WHERE order_id = $1 ORDER BY id")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await
}

/// Creates the report on first filing, or updates it on a later one. A price change on an
/// existing report appends a row to the append-only edit trail in the same transaction.
pub async fn upsert_report(
    order_id: &OrderId,
    agent_id: i64,
    report: NewAgentReport,
    conn: &mut SqliteConnection,
) -> Result<AgentReport, OrderFlowError> {
    let images = serde_json::to_string(&report.additional_images)
        .map_err(|e| OrderFlowError::ValidationError(format!("unencodable image urls: {e}")))?;
    let existing = fetch_report_for_order(order_id, &mut *conn).await?;
    match existing {
        None => {
            let row = sqlx::query_as(
                r#"
                    INSERT INTO agent_reports
                        (order_id, agent_id, user_amount, payment_link, additional_images, additional_description,
                         quantity)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    RETURNING *;
                "#,
            )
            .bind(order_id.as_str())
            .bind(agent_id)
            .bind(report.user_amount)
            .bind(report.payment_link)
            .bind(images)
            .bind(report.additional_description)
            .bind(report.quantity)
            .fetch_one(conn)
            .await?;
            debug!("📝️ Report filed for order {order_id}");
            Ok(row)
        },
        Some(current) => {
            if current.user_amount != report.user_amount {
                sqlx::query(
                    "INSERT INTO report_edits (order_id, previous_amount, new_amount, reason) VALUES ($1, $2, $3, $4)",
                )
                .bind(order_id.as_str())
                .bind(current.user_amount)
                .bind(report.user_amount)
                .bind(report.edit_reason)
                .execute(&mut *conn)
                .await?;
                debug!(
                    "📝️ Report price for order {order_id} edited: {} -> {}",
                    current.user_amount, report.user_amount
                );
            }
            let row = sqlx::query_as(
                r#"
                    UPDATE agent_reports
                    SET user_amount = $1, payment_link = $2, additional_images = $3, additional_description = $4,
                        quantity = $5, updated_at = CURRENT_TIMESTAMP
                    WHERE order_id = $6
                    RETURNING *;
                "#,
            )
            .bind(report.user_amount)
            .bind(report.payment_link)
            .bind(images)
            .bind(report.additional_description)
            .bind(report.quantity)
            .bind(order_id.as_str())
            .fetch_one(conn)
            .await?;
            Ok(row)
        },
    }
}
