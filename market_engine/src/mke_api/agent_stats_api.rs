//! The agent performance rollup.
//!
//! An agent's public success rate blends two signals: the share of their closed orders that
//! completed successfully, and their mean review rating scaled to the same 0..=100 range. The
//! blend takes whichever is higher, so a handful of early cancellations cannot bury an agent the
//! reviewers like. The rollup is recomputed from history on every settlement and review change
//! rather than adjusted incrementally, so it can never drift.

use log::*;

use crate::{
    db_types::{AgentReview, Role, UserProfile},
    traits::{AgentCounts, AgentStatsError, AgentStatsManagement, UserManagement},
};

/// The order-history half of the blend: completed / (completed + cancelled), as a percentage
/// rounded to the nearest point. An agent with no closed orders scores zero.
pub fn raw_success_rate(counts: AgentCounts) -> i64 {
    let total = counts.total();
    if total == 0 {
        return 0;
    }
    (counts.completed * 100 + total / 2) / total
}

/// The blended rate: the larger of the history score and the review score (`avg_rating * 20`,
/// rounded, so five stars maps to 100).
pub fn blended_success_rate(counts: AgentCounts, avg_rating: Option<f64>) -> i64 {
    let raw = raw_success_rate(counts);
    let rating_score = avg_rating.map(|r| (r * 20.0).round() as i64).unwrap_or(0);
    raw.max(rating_score.clamp(0, 100))
}

#[derive(Clone)]
pub struct AgentStatsApi<B> {
    db: B,
}

impl<B> AgentStatsApi<B>
where B: AgentStatsManagement + UserManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Recomputes and persists the agent's rollup from their full history.
    pub async fn recompute(&self, agent_id: i64) -> Result<UserProfile, AgentStatsError> {
        let counts = self.db.fetch_agent_counts(agent_id).await?;
        let avg_rating = self.db.avg_rating_for_agent(agent_id).await?;
        let success_rate = blended_success_rate(counts, avg_rating);
        self.db
            .update_agent_stats(agent_id, success_rate, counts.completed, avg_rating.unwrap_or(0.0))
            .await?;
        debug!(
            "📊️ Recomputed stats for agent {agent_id}: success_rate={success_rate}, transactions={}",
            counts.completed
        );
        let user = self
            .db
            .fetch_user(agent_id)
            .await
            .map_err(|e| AgentStatsError::DatabaseError(e.to_string()))?
            .ok_or(AgentStatsError::AgentNotFound(agent_id))?;
        Ok(user)
    }

    /// Records a 1..=5 star review and folds it into the agent's rollup.
    pub async fn add_review(
        &self,
        agent_id: i64,
        reviewer_id: i64,
        rating: i64,
    ) -> Result<AgentReview, AgentStatsError> {
        if !(1..=5).contains(&rating) {
            return Err(AgentStatsError::InvalidRating(rating));
        }
        let review = self.db.insert_review(agent_id, reviewer_id, rating).await?;
        self.recompute(agent_id).await?;
        info!("📊️ User {reviewer_id} rated agent {agent_id}: {rating} stars");
        Ok(review)
    }

    /// Removes a review (admin moderation) and recomputes the affected agent.
    pub async fn remove_review(&self, role: Role, review_id: i64) -> Result<AgentReview, AgentStatsError> {
        if role != Role::Admin {
            return Err(AgentStatsError::Forbidden("only admins may remove reviews".to_string()));
        }
        let review = self.db.delete_review(review_id).await?;
        self.recompute(review.agent_id).await?;
        Ok(review)
    }

    /// Sets or clears the admin-assigned top-list position.
    pub async fn set_rank(&self, role: Role, agent_id: i64, rank: Option<i64>) -> Result<(), AgentStatsError> {
        if role != Role::Admin {
            return Err(AgentStatsError::Forbidden("only admins may assign ranks".to_string()));
        }
        self.db.set_agent_rank(agent_id, rank).await
    }

    /// The public agent leaderboard, best rank first.
    pub async fn top_agents(&self, limit: i64) -> Result<Vec<UserProfile>, AgentStatsError> {
        self.db.top_agents(limit).await
    }
}
