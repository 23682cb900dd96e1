mod support;

use market_engine::{
    db_types::{NewAgentReport, NewOrder, OrderId, OrderStatusType, Role},
    traits::{AgentStatsError, UserManagement},
    AgentStatsApi,
    OrderFlowApi,
};
use mkt_common::FxAmount;
use support::{new_test_db, seed_user};

fn oid(s: &str) -> OrderId {
    OrderId::from(s.to_string())
}

#[tokio::test]
async fn reviews_fold_into_the_success_rate() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let agent = seed_user(&db, Role::Agent, "Bekir", "+90002").await;
    let stats = AgentStatsApi::new(db.clone());

    // No history, no reviews.
    let profile = stats.recompute(agent.id).await.unwrap();
    assert_eq!(profile.success_rate, 0);
    assert_eq!(profile.total_transactions, 0);

    // A 4.5 average maps to 90 on the 0..=100 scale.
    stats.add_review(agent.id, user.id, 4).await.unwrap();
    let review = stats.add_review(agent.id, user.id, 5).await.unwrap();
    let profile = db.fetch_user(agent.id).await.unwrap().unwrap();
    assert_eq!(profile.success_rate, 90);
    assert!((profile.avg_rating - 4.5).abs() < f64::EPSILON);

    // Moderation: the removal recomputes the rollup.
    let err = stats.remove_review(Role::Agent, review.id).await.unwrap_err();
    assert!(matches!(err, AgentStatsError::Forbidden(_)));
    stats.remove_review(Role::Admin, review.id).await.unwrap();
    let profile = db.fetch_user(agent.id).await.unwrap().unwrap();
    assert_eq!(profile.success_rate, 80);

    let err = stats.add_review(agent.id, user.id, 6).await.unwrap_err();
    assert!(matches!(err, AgentStatsError::InvalidRating(6)));
    let err = stats.add_review(user.id, agent.id, 3).await.unwrap_err();
    assert!(matches!(err, AgentStatsError::AgentNotFound(_)));
}

#[tokio::test]
async fn order_history_drives_the_raw_rate() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let agent = seed_user(&db, Role::Agent, "Bekir", "+90002").await;
    let orders = OrderFlowApi::new(db.clone());
    let stats = AgentStatsApi::new(db.clone());

    // One completed, one cancelled: 50%.
    let won = orders.create_order(NewOrder::new(oid("ord-won"), user.id, "Tablet")).await.unwrap().order_id;
    orders.claim_order(agent.id, Role::Agent, &won).await.unwrap();
    orders.submit_report(agent.id, Role::Agent, &won, NewAgentReport::new(FxAmount::from(10))).await.unwrap();
    orders.advance_order(Role::Admin, &won, OrderStatusType::Completed).await.unwrap();

    let lost = orders.create_order(NewOrder::new(oid("ord-lost"), user.id, "Charger")).await.unwrap().order_id;
    orders.claim_order(agent.id, Role::Agent, &lost).await.unwrap();
    orders.cancel_order(agent.id, Role::Agent, &lost, Some("cannot source this item")).await.unwrap();

    let profile = stats.recompute(agent.id).await.unwrap();
    assert_eq!(profile.success_rate, 50);
    // The public transaction count only advertises completed deals.
    assert_eq!(profile.total_transactions, 1);
}

#[tokio::test]
async fn the_leaderboard_is_admin_curated() {
    let db = new_test_db().await;
    let first = seed_user(&db, Role::Agent, "Bekir", "+90002").await;
    let second = seed_user(&db, Role::Agent, "Cem", "+90003").await;
    let unranked = seed_user(&db, Role::Agent, "Derya", "+90004").await;
    let stats = AgentStatsApi::new(db.clone());

    let err = stats.set_rank(Role::Agent, first.id, Some(1)).await.unwrap_err();
    assert!(matches!(err, AgentStatsError::Forbidden(_)));

    stats.set_rank(Role::Admin, second.id, Some(2)).await.unwrap();
    stats.set_rank(Role::Admin, first.id, Some(1)).await.unwrap();

    let top = stats.top_agents(10).await.unwrap();
    let ids: Vec<i64> = top.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![first.id, second.id]);
    assert!(!ids.contains(&unranked.id));

    // Clearing the rank drops the agent off the board.
    stats.set_rank(Role::Admin, first.id, None).await.unwrap();
    let top = stats.top_agents(10).await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].id, second.id);
}
