use thiserror::Error;

use crate::{
    db_types::{AgentReview, UserProfile},
    traits::AgentCounts,
};

/// Inputs and outputs of the agent performance rollup. The blend itself is pure logic in
/// [`crate::mke_api::agent_stats_api`]; the backend supplies the counts and persists the result.
#[allow(async_fn_in_trait)]
pub trait AgentStatsManagement: Clone {
    /// Completed/cancelled totals for the agent across both single and bundle orders.
    async fn fetch_agent_counts(&self, agent_id: i64) -> Result<AgentCounts, AgentStatsError>;

    /// Mean review rating for the agent, if any reviews exist.
    async fn avg_rating_for_agent(&self, agent_id: i64) -> Result<Option<f64>, AgentStatsError>;

    /// Persists a recomputed rollup onto the agent's profile row.
    async fn update_agent_stats(
        &self,
        agent_id: i64,
        success_rate: i64,
        total_transactions: i64,
        avg_rating: f64,
    ) -> Result<(), AgentStatsError>;

    async fn insert_review(&self, agent_id: i64, reviewer_id: i64, rating: i64)
        -> Result<AgentReview, AgentStatsError>;

    /// Deletes a review, returning it so the caller can recompute the affected agent.
    async fn delete_review(&self, review_id: i64) -> Result<AgentReview, AgentStatsError>;

    /// Sets or clears the admin-assigned rank.
    async fn set_agent_rank(&self, agent_id: i64, rank: Option<i64>) -> Result<(), AgentStatsError>;

    /// Ranked agents, ascending by rank, limited to `limit`.
    async fn top_agents(&self, limit: i64) -> Result<Vec<UserProfile>, AgentStatsError>;
}

#[derive(Debug, Clone, Error)]
pub enum AgentStatsError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The requested agent {0} does not exist")]
    AgentNotFound(i64),
    #[error("Ratings must be between 1 and 5, got {0}")]
    InvalidRating(i64),
    #[error("The requested review {0} does not exist")]
    ReviewNotFound(i64),
    #[error("You are not allowed to perform this action: {0}")]
    Forbidden(String),
}

impl From<sqlx::Error> for AgentStatsError {
    fn from(e: sqlx::Error) -> Self {
        AgentStatsError::DatabaseError(e.to_string())
    }
}
