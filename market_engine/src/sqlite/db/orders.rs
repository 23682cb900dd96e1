use chrono::{DateTime, Duration, Utc};
use log::debug;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderStatusType},
    mke_api::order_objects::OrderQueryFilter,
    traits::{ArchiveSide, OrderFlowError},
};

pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, OrderFlowError> {
    if fetch_order_by_order_id(&order.order_id, &mut *conn).await?.is_some() {
        return Err(OrderFlowError::OrderAlreadyExists(order.order_id));
    }
    let images = serde_json::to_string(&order.image_urls)
        .map_err(|e| OrderFlowError::ValidationError(format!("unencodable image urls: {e}")))?;
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (order_id, user_id, product_name, description, image_urls)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(order.order_id)
    .bind(order.user_id)
    .bind(order.product_name)
    .bind(order.description)
    .bind(images)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await
}

/// The claim race is decided here: the update only fires while `agent_id` is unset, so exactly
/// one concurrent claimant wins.
pub async fn claim_order(order_id: &OrderId, agent_id: i64, conn: &mut SqliteConnection) -> Result<Order, OrderFlowError> {
    let claimed: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders
            SET agent_id = $1, status = 'UnderAgentReview', updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $2 AND agent_id IS NULL AND status = 'Published'
            RETURNING *;
        "#,
    )
    .bind(agent_id)
    .bind(order_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    match claimed {
        Some(order) => Ok(order),
        None => match fetch_order_by_order_id(order_id, conn).await? {
            Some(o) if o.agent_id.is_some() => Err(OrderFlowError::AlreadyClaimed(order_id.clone())),
            Some(o) => Err(OrderFlowError::InvalidTransition(format!("order {order_id} is {}, not Published", o.status))),
            None => Err(OrderFlowError::OrderNotFound(order_id.clone())),
        },
    }
}

/// Conditional status move: fires only while the order is still in `expected`.
pub async fn update_status(
    order_id: &OrderId,
    expected: OrderStatusType,
    new_status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderFlowError> {
    let updated: Option<Order> = sqlx::query_as(
        "UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $2 AND status = $3 \
         RETURNING *",
    )
    .bind(new_status)
    .bind(order_id.as_str())
    .bind(expected)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(order) => {
            debug!("📝️ Order {order_id} moved {expected} -> {new_status}");
            Ok(order)
        },
        None => match fetch_order_by_order_id(order_id, conn).await? {
            Some(o) => {
                Err(OrderFlowError::InvalidTransition(format!("order {order_id} is {}, expected {expected}", o.status)))
            },
            None => Err(OrderFlowError::OrderNotFound(order_id.clone())),
        },
    }
}

pub async fn set_user_payment_flag(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Order, OrderFlowError> {
    let order: Option<Order> = sqlx::query_as(
        "UPDATE orders SET user_payment_confirmed = 1, updated_at = CURRENT_TIMESTAMP \
         WHERE order_id = $1 AND status = 'AwaitingUserPayment' RETURNING *",
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    order.ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))
}

/// Payment verification: `AwaitingUserPayment → Completed` with the verified flag set.
pub async fn complete_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Order, OrderFlowError> {
    let completed: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders
            SET status = 'Completed', user_payment_verified = 1, updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $1 AND status = 'AwaitingUserPayment'
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    match completed {
        Some(order) => Ok(order),
        None => match fetch_order_by_order_id(order_id, conn).await? {
            Some(o) => Err(OrderFlowError::InvalidTransition(format!(
                "order {order_id} is {}, expected AwaitingUserPayment",
                o.status
            ))),
            None => Err(OrderFlowError::OrderNotFound(order_id.clone())),
        },
    }
}

/// The settle-once guard: flips `agent_payment_paid` only if it is still unset on a completed
/// order.
pub async fn mark_agent_paid(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Order, OrderFlowError> {
    let settled: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders
            SET agent_payment_paid = 1, updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $1 AND status = 'Completed' AND agent_payment_paid = 0
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    settled.ok_or_else(|| OrderFlowError::InvalidTransition(format!("order {order_id} cannot be settled twice")))
}

pub async fn cancel_order(
    order_id: &OrderId,
    reason: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderFlowError> {
    let cancelled: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders
            SET status = 'Cancelled', cancel_reason = $1, updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $2 AND status != 'Cancelled'
            RETURNING *;
        "#,
    )
    .bind(reason)
    .bind(order_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    match cancelled {
        Some(order) => Ok(order),
        None => match fetch_order_by_order_id(order_id, conn).await? {
            Some(_) => Err(OrderFlowError::InvalidTransition(format!("order {order_id} is already cancelled"))),
            None => Err(OrderFlowError::OrderNotFound(order_id.clone())),
        },
    }
}

pub async fn set_track_code(
    order_id: &OrderId,
    track_code: &str,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderFlowError> {
    let order: Option<Order> =
        sqlx::query_as("UPDATE orders SET track_code = $1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $2 RETURNING *")
            .bind(track_code)
            .bind(order_id.as_str())
            .fetch_optional(conn)
            .await?;
    order.ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))
}

pub async fn archive_order(
    order_id: &OrderId,
    side: ArchiveSide,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderFlowError> {
    let column = match side {
        ArchiveSide::User => "archived_by_user",
        ArchiveSide::Agent => "archived_by_agent",
    };
    let q = format!("UPDATE orders SET {column} = 1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $1 RETURNING *");
    let order: Option<Order> = sqlx::query_as(&q).bind(order_id.as_str()).fetch_optional(conn).await?;
    order.ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))
}

/// Returns claimed-but-unreported orders older than `window` to the published feed.
pub async fn release_stale_claims(window: Duration, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let cutoff = Utc::now() - window;
    sqlx::query_as(
        r#"
            UPDATE orders
            SET agent_id = NULL, status = 'Published', updated_at = CURRENT_TIMESTAMP
            WHERE status = 'UnderAgentReview'
              AND order_id NOT IN (SELECT order_id FROM agent_reports)
              AND datetime(updated_at) < datetime($1)
            RETURNING *;
        "#,
    )
    .bind(cutoff)
    .fetch_all(conn)
    .await
}

pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    push_filter(&mut builder, &query);
    builder.push(" ORDER BY created_at DESC, id DESC");
    builder.build_query_as().fetch_all(conn).await
}

/// Shared WHERE-clause builder for the `orders` and `bundle_orders` tables, which expose the same
/// filterable columns.
pub(crate) fn push_filter<'a>(builder: &mut QueryBuilder<'a, sqlx::Sqlite>, query: &'a OrderQueryFilter) {
    let needs_where = !query.is_empty() || !query.include_archived;
    if needs_where {
        builder.push("WHERE ");
    }
    let mut clause = builder.separated(" AND ");
    if let Some(order_id) = &query.order_id {
        clause.push("order_id = ");
        clause.push_bind_unseparated(order_id.as_str());
    }
    if let Some(user_id) = query.user_id {
        clause.push("user_id = ");
        clause.push_bind_unseparated(user_id);
        if !query.include_archived {
            clause.push("archived_by_user = 0");
        }
    }
    if let Some(agent_id) = query.agent_id {
        clause.push("agent_id = ");
        clause.push_bind_unseparated(agent_id);
        if !query.include_archived {
            clause.push("archived_by_agent = 0");
        }
    }
    if query.unclaimed_only {
        clause.push("agent_id IS NULL");
    }
    if !query.statuses.is_empty() {
        clause.push("status IN (");
        let mut first = true;
        for status in &query.statuses {
            if !first {
                clause.push_unseparated(", ");
            }
            clause.push_bind_unseparated(*status);
            first = false;
        }
        clause.push_unseparated(")");
    }
    if let Some(after) = query.created_after {
        clause.push("datetime(created_at) >= datetime(");
        clause.push_bind_unseparated(after);
        clause.push_unseparated(")");
    }
    if let Some(before) = query.created_before {
        clause.push("datetime(created_at) <= datetime(");
        clause.push_bind_unseparated(before);
        clause.push_unseparated(")");
    }
    if query.user_id.is_none() && query.agent_id.is_none() && !query.include_archived {
        clause.push("archived_by_user = 0 AND archived_by_agent = 0");
    }
}

/// Orders plus bundle orders the user created at or after `since`. The daily quota spans both
/// order types.
pub async fn count_created_since(
    user_id: i64,
    since: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
            SELECT
                (SELECT COUNT(*) FROM orders WHERE user_id = $1 AND datetime(created_at) >= datetime($2)) +
                (SELECT COUNT(*) FROM bundle_orders WHERE user_id = $1 AND datetime(created_at) >= datetime($2));
        "#,
    )
    .bind(user_id)
    .bind(since)
    .fetch_one(conn)
    .await
}

pub async fn count_active_for_user(user_id: i64, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
            SELECT
                (SELECT COUNT(*) FROM orders
                 WHERE user_id = $1 AND status IN ('Published', 'UnderAgentReview', 'AwaitingUserPayment')) +
                (SELECT COUNT(*) FROM bundle_orders
                 WHERE user_id = $1 AND status IN ('Published', 'UnderAgentReview', 'AwaitingUserPayment'));
        "#,
    )
    .bind(user_id)
    .fetch_one(conn)
    .await
}
