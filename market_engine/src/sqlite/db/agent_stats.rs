use sqlx::SqliteConnection;

use crate::{
    db_types::{AgentReview, Role, UserProfile},
    mke_api::agent_stats_api::blended_success_rate,
    traits::{AgentCounts, AgentStatsError},
};

/// Completed/cancelled totals for the agent, spanning both order tables.
pub async fn fetch_agent_counts(agent_id: i64, conn: &mut SqliteConnection) -> Result<AgentCounts, sqlx::Error> {
    let (completed, cancelled): (i64, i64) = sqlx::query_as(
        r#"
            SELECT
                (SELECT COUNT(*) FROM orders WHERE agent_id = $1 AND status = 'Completed') +
                (SELECT COUNT(*) FROM bundle_orders WHERE agent_id = $1 AND status = 'Completed'),
                (SELECT COUNT(*) FROM orders WHERE agent_id = $1 AND status = 'Cancelled') +
                (SELECT COUNT(*) FROM bundle_orders WHERE agent_id = $1 AND status = 'Cancelled');
        "#,
    )
    .bind(agent_id)
    .fetch_one(conn)
    .await?;
    Ok(AgentCounts { completed, cancelled })
}

pub async fn avg_rating(agent_id: i64, conn: &mut SqliteConnection) -> Result<Option<f64>, sqlx::Error> {
    sqlx::query_scalar("SELECT AVG(rating) FROM agent_reviews WHERE agent_id = $1")
        .bind(agent_id)
        .fetch_one(conn)
        .await
}

pub async fn update_agent_stats(
    agent_id: i64,
    success_rate: i64,
    total_transactions: i64,
    avg_rating: f64,
    conn: &mut SqliteConnection,
) -> Result<(), AgentStatsError> {
    let result = sqlx::query(
        r#"
            UPDATE users
            SET success_rate = $1, total_transactions = $2, avg_rating = $3, updated_at = CURRENT_TIMESTAMP
            WHERE id = $4 AND role = 'Agent';
        "#,
    )
    .bind(success_rate)
    .bind(total_transactions)
    .bind(avg_rating)
    .bind(agent_id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AgentStatsError::AgentNotFound(agent_id));
    }
    Ok(())
}

/// Refreshes the rollup from full history. Settlement runs this inside its own transaction so the
/// paid order and the refreshed standing land together.
pub async fn recompute_rollup(agent_id: i64, conn: &mut SqliteConnection) -> Result<(), AgentStatsError> {
    let counts = fetch_agent_counts(agent_id, &mut *conn).await?;
    let rating = avg_rating(agent_id, &mut *conn).await?;
    let rate = blended_success_rate(counts, rating);
    update_agent_stats(agent_id, rate, counts.completed, rating.unwrap_or(0.0), conn).await
}

pub async fn insert_review(
    agent_id: i64,
    reviewer_id: i64,
    rating: i64,
    conn: &mut SqliteConnection,
) -> Result<AgentReview, AgentStatsError> {
    let agent: Option<Role> = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
        .bind(agent_id)
        .fetch_optional(&mut *conn)
        .await?;
    if agent != Some(Role::Agent) {
        return Err(AgentStatsError::AgentNotFound(agent_id));
    }
    let review = sqlx::query_as(
        "INSERT INTO agent_reviews (agent_id, reviewer_id, rating) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(agent_id)
    .bind(reviewer_id)
    .bind(rating)
    .fetch_one(conn)
    .await?;
    Ok(review)
}

pub async fn delete_review(review_id: i64, conn: &mut SqliteConnection) -> Result<AgentReview, AgentStatsError> {
    let review: Option<AgentReview> = sqlx::query_as("DELETE FROM agent_reviews WHERE id = $1 RETURNING *")
        .bind(review_id)
        .fetch_optional(conn)
        .await?;
    review.ok_or(AgentStatsError::ReviewNotFound(review_id))
}

pub async fn set_agent_rank(
    agent_id: i64,
    rank: Option<i64>,
    conn: &mut SqliteConnection,
) -> Result<(), AgentStatsError> {
    let result =
        sqlx::query("UPDATE users SET rank = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND role = 'Agent'")
            .bind(rank)
            .bind(agent_id)
            .execute(conn)
            .await?;
    if result.rows_affected() == 0 {
        return Err(AgentStatsError::AgentNotFound(agent_id));
    }
    Ok(())
}

pub async fn top_agents(limit: i64, conn: &mut SqliteConnection) -> Result<Vec<UserProfile>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE role = 'Agent' AND rank IS NOT NULL ORDER BY rank, id LIMIT $1")
        .bind(limit)
        .fetch_all(conn)
        .await
}
