use log::debug;
use sqlx::{types::Json, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{
        BundleItem,
        BundleOrder,
        BundleReport,
        ItemReport,
        NewBundleOrder,
        OrderId,
        OrderStatusType,
        ReportMode,
        UserProfile,
    },
    mke_api::{bundle_objects::FullBundleOrder, order_objects::OrderQueryFilter},
    sqlite::db::orders::push_filter,
    traits::{ArchiveSide, OrderFlowError},
};

pub async fn insert_bundle(
    bundle: NewBundleOrder,
    snapshot: &UserProfile,
    conn: &mut SqliteConnection,
) -> Result<FullBundleOrder, OrderFlowError> {
    if fetch_bundle_row(&bundle.order_id, &mut *conn).await?.is_some() {
        return Err(OrderFlowError::OrderAlreadyExists(bundle.order_id));
    }
    let parent: BundleOrder = sqlx::query_as(
        r#"
            INSERT INTO bundle_orders (order_id, user_id, snapshot_name, snapshot_phone, snapshot_cargo, report_mode)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(&bundle.order_id)
    .bind(bundle.user_id)
    .bind(&snapshot.name)
    .bind(&snapshot.phone)
    .bind(&snapshot.cargo_name)
    .bind(bundle.report_mode)
    .fetch_one(&mut *conn)
    .await?;
    let mut items = Vec::with_capacity(bundle.items.len());
    for item in bundle.items {
        let images = serde_json::to_string(&item.image_urls)
            .map_err(|e| OrderFlowError::ValidationError(format!("unencodable image urls: {e}")))?;
        let row: BundleItem = sqlx::query_as(
            r#"
                INSERT INTO bundle_items (bundle_id, product_name, description, image_urls)
                VALUES ($1, $2, $3, $4)
                RETURNING *;
            "#,
        )
        .bind(parent.id)
        .bind(item.product_name)
        .bind(item.description)
        .bind(images)
        .fetch_one(&mut *conn)
        .await?;
        items.push(row);
    }
    debug!("📝️ Bundle {} inserted with {} item(s)", parent.order_id, items.len());
    Ok(FullBundleOrder::new(parent, items))
}

pub async fn fetch_bundle_row(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<BundleOrder>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM bundle_orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await
}

pub async fn fetch_items(bundle_id: i64, conn: &mut SqliteConnection) -> Result<Vec<BundleItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM bundle_items WHERE bundle_id = $1 ORDER BY id").bind(bundle_id).fetch_all(conn).await
}

pub async fn fetch_full_bundle(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<FullBundleOrder>, sqlx::Error> {
    let Some(parent) = fetch_bundle_row(order_id, &mut *conn).await? else {
        return Ok(None);
    };
    let items = fetch_items(parent.id, conn).await?;
    Ok(Some(FullBundleOrder::new(parent, items)))
}

async fn require_full_bundle(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<FullBundleOrder, OrderFlowError> {
    fetch_full_bundle(order_id, conn).await?.ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))
}

/// Same conditional-update claim race resolution as for single orders.
pub async fn claim_bundle(
    order_id: &OrderId,
    agent_id: i64,
    conn: &mut SqliteConnection,
) -> Result<BundleOrder, OrderFlowError> {
    let claimed: Option<BundleOrder> = sqlx::query_as(
        r#"
            UPDATE bundle_orders
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
        Some(bundle) => {
            set_items_status(bundle.id, OrderStatusType::UnderAgentReview, conn).await?;
            Ok(bundle)
        },
        None => match fetch_bundle_row(order_id, conn).await? {
            Some(b) if b.agent_id.is_some() => Err(OrderFlowError::AlreadyClaimed(order_id.clone())),
            Some(b) => {
                Err(OrderFlowError::InvalidTransition(format!("bundle {order_id} is {}, not Published", b.status)))
            },
            None => Err(OrderFlowError::OrderNotFound(order_id.clone())),
        },
    }
}

pub async fn update_bundle_status(
    order_id: &OrderId,
    expected: OrderStatusType,
    new_status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<BundleOrder, OrderFlowError> {
    let updated: Option<BundleOrder> = sqlx::query_as(
        "UPDATE bundle_orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $2 AND status = $3 \
         RETURNING *",
    )
    .bind(new_status)
    .bind(order_id.as_str())
    .bind(expected)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(bundle) => Ok(bundle),
        None => match fetch_bundle_row(order_id, conn).await? {
            Some(b) => Err(OrderFlowError::InvalidTransition(format!(
                "bundle {order_id} is {}, expected {expected}",
                b.status
            ))),
            None => Err(OrderFlowError::OrderNotFound(order_id.clone())),
        },
    }
}

async fn set_items_status(
    bundle_id: i64,
    status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE bundle_items SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE bundle_id = $2")
        .bind(status)
        .bind(bundle_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Switches the pricing mode and wipes both modes' report data, so the old mode's price can never
/// leak into the new one.
pub async fn set_report_mode(
    order_id: &OrderId,
    mode: ReportMode,
    conn: &mut SqliteConnection,
) -> Result<FullBundleOrder, OrderFlowError> {
    let updated: Option<BundleOrder> = sqlx::query_as(
        "UPDATE bundle_orders SET report_mode = $1, bundle_report = NULL, updated_at = CURRENT_TIMESTAMP \
         WHERE order_id = $2 RETURNING *",
    )
    .bind(mode)
    .bind(order_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    let Some(parent) = updated else {
        return Err(OrderFlowError::OrderNotFound(order_id.clone()));
    };
    sqlx::query("UPDATE bundle_items SET report = NULL, updated_at = CURRENT_TIMESTAMP WHERE bundle_id = $1")
        .bind(parent.id)
        .execute(&mut *conn)
        .await?;
    let items = fetch_items(parent.id, conn).await?;
    Ok(FullBundleOrder::new(parent, items))
}

/// Stores the aggregate quote and escalates the parent and every item to `AwaitingUserPayment`.
pub async fn file_bundle_report(
    order_id: &OrderId,
    report: BundleReport,
    conn: &mut SqliteConnection,
) -> Result<FullBundleOrder, OrderFlowError> {
    let updated: Option<BundleOrder> = sqlx::query_as(
        r#"
            UPDATE bundle_orders
            SET bundle_report = $1, status = 'AwaitingUserPayment', updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $2 AND status IN ('UnderAgentReview', 'AwaitingUserPayment')
            RETURNING *;
        "#,
    )
    .bind(Json(report))
    .bind(order_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    let Some(parent) = updated else {
        return Err(OrderFlowError::InvalidTransition(format!("bundle {order_id} cannot accept a report now")));
    };
    set_items_status(parent.id, OrderStatusType::AwaitingUserPayment, &mut *conn).await?;
    let items = fetch_items(parent.id, conn).await?;
    Ok(FullBundleOrder::new(parent, items))
}

/// Stores one item's quote and re-evaluates convergence inside the caller's transaction: the
/// parent escalates once no unreported item remains.
pub async fn file_item_report(
    order_id: &OrderId,
    item_id: i64,
    report: ItemReport,
    conn: &mut SqliteConnection,
) -> Result<FullBundleOrder, OrderFlowError> {
    let parent = require_full_bundle(order_id, &mut *conn).await?.bundle;
    let updated = sqlx::query(
        "UPDATE bundle_items SET report = $1, status = 'AwaitingUserPayment', updated_at = CURRENT_TIMESTAMP \
         WHERE id = $2 AND bundle_id = $3",
    )
    .bind(Json(report))
    .bind(item_id)
    .bind(parent.id)
    .execute(&mut *conn)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(OrderFlowError::ItemNotFound(item_id));
    }
    converge(parent, conn).await
}

/// Deletes an item and re-checks convergence. The ledger burn entry is the caller's concern.
pub async fn remove_item(
    order_id: &OrderId,
    item_id: i64,
    conn: &mut SqliteConnection,
) -> Result<(BundleItem, FullBundleOrder), OrderFlowError> {
    let parent = require_full_bundle(order_id, &mut *conn).await?.bundle;
    let removed: Option<BundleItem> =
        sqlx::query_as("DELETE FROM bundle_items WHERE id = $1 AND bundle_id = $2 RETURNING *")
            .bind(item_id)
            .bind(parent.id)
            .fetch_optional(&mut *conn)
            .await?;
    let Some(removed) = removed else {
        return Err(OrderFlowError::ItemNotFound(item_id));
    };
    let full = converge(parent, conn).await?;
    Ok((removed, full))
}

/// If every remaining item carries a report (in `per_item` mode), lift the parent to
/// `AwaitingUserPayment`. Runs inside the transaction that mutated the items.
async fn converge(parent: BundleOrder, conn: &mut SqliteConnection) -> Result<FullBundleOrder, OrderFlowError> {
    let items = fetch_items(parent.id, &mut *conn).await?;
    let full = FullBundleOrder::new(parent, items);
    let should_escalate = full.bundle.report_mode == ReportMode::PerItem &&
        full.bundle.status == OrderStatusType::UnderAgentReview &&
        full.all_items_reported();
    if !should_escalate {
        return Ok(full);
    }
    let parent = update_bundle_status(
        &full.bundle.order_id,
        OrderStatusType::UnderAgentReview,
        OrderStatusType::AwaitingUserPayment,
        conn,
    )
    .await?;
    debug!("📝️ Bundle {} converged; all items are priced", parent.order_id);
    Ok(FullBundleOrder::new(parent, full.items))
}

pub async fn set_user_payment_flag(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<BundleOrder, OrderFlowError> {
    let bundle: Option<BundleOrder> = sqlx::query_as(
        "UPDATE bundle_orders SET user_payment_confirmed = 1, updated_at = CURRENT_TIMESTAMP \
         WHERE order_id = $1 AND status = 'AwaitingUserPayment' RETURNING *",
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    bundle.ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))
}

/// Payment verification: the parent and every non-cancelled item move to `Completed`.
pub async fn complete_bundle(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<BundleOrder, OrderFlowError> {
    let completed: Option<BundleOrder> = sqlx::query_as(
        r#"
            UPDATE bundle_orders
            SET status = 'Completed', user_payment_verified = 1, updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $1 AND status = 'AwaitingUserPayment'
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    match completed {
        Some(bundle) => {
            sqlx::query(
                "UPDATE bundle_items SET status = 'Completed', updated_at = CURRENT_TIMESTAMP \
                 WHERE bundle_id = $1 AND status != 'Cancelled'",
            )
            .bind(bundle.id)
            .execute(conn)
            .await?;
            Ok(bundle)
        },
        None => match fetch_bundle_row(order_id, conn).await? {
            Some(b) => Err(OrderFlowError::InvalidTransition(format!(
                "bundle {order_id} is {}, expected AwaitingUserPayment",
                b.status
            ))),
            None => Err(OrderFlowError::OrderNotFound(order_id.clone())),
        },
    }
}

/// Settle-once guard for bundles.
pub async fn mark_agent_paid(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<BundleOrder, OrderFlowError> {
    let settled: Option<BundleOrder> = sqlx::query_as(
        r#"
            UPDATE bundle_orders
            SET agent_payment_paid = 1, updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $1 AND status = 'Completed' AND agent_payment_paid = 0
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    settled.ok_or_else(|| OrderFlowError::InvalidTransition(format!("bundle {order_id} cannot be settled twice")))
}

pub async fn cancel_bundle(
    order_id: &OrderId,
    reason: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<FullBundleOrder, OrderFlowError> {
    let cancelled: Option<BundleOrder> = sqlx::query_as(
        r#"
            UPDATE bundle_orders
            SET status = 'Cancelled', cancel_reason = $1, updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $2 AND status != 'Cancelled'
            RETURNING *;
        "#,
    )
    .bind(reason)
    .bind(order_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    let Some(parent) = cancelled else {
        return match fetch_bundle_row(order_id, conn).await? {
            Some(_) => Err(OrderFlowError::InvalidTransition(format!("bundle {order_id} is already cancelled"))),
            None => Err(OrderFlowError::OrderNotFound(order_id.clone())),
        };
    };
    set_items_status(parent.id, OrderStatusType::Cancelled, &mut *conn).await?;
    let items = fetch_items(parent.id, conn).await?;
    Ok(FullBundleOrder::new(parent, items))
}

pub async fn set_track_code(
    order_id: &OrderId,
    track_code: &str,
    conn: &mut SqliteConnection,
) -> Result<BundleOrder, OrderFlowError> {
    let bundle: Option<BundleOrder> = sqlx::query_as(
        "UPDATE bundle_orders SET track_code = $1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $2 RETURNING *",
    )
    .bind(track_code)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    bundle.ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))
}

pub async fn archive_bundle(
    order_id: &OrderId,
    side: ArchiveSide,
    conn: &mut SqliteConnection,
) -> Result<BundleOrder, OrderFlowError> {
    let column = match side {
        ArchiveSide::User => "archived_by_user",
        ArchiveSide::Agent => "archived_by_agent",
    };
    let q =
        format!("UPDATE bundle_orders SET {column} = 1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $1 RETURNING *");
    let bundle: Option<BundleOrder> = sqlx::query_as(&q).bind(order_id.as_str()).fetch_optional(conn).await?;
    bundle.ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))
}

pub async fn search_bundles(
    query: OrderQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<BundleOrder>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM bundle_orders ");
    push_filter(&mut builder, &query);
    builder.push(" ORDER BY created_at DESC, id DESC");
    builder.build_query_as().fetch_all(conn).await
}
