mod support;

use chrono::Duration;
use market_engine::{
    db_types::{NewAgentReport, NewOrder, OrderId, OrderStatusType, Role},
    mke_api::settings_objects::MarketSettingsUpdate,
    traits::{ArchiveSide, OrderFlowError, OrderManagement, UserManagement},
    LedgerApi,
    OrderFlowApi,
    SettingsApi,
    SqliteDatabase,
};
use mkt_common::{FxAmount, Points};
use support::{new_test_db, seed_user};

fn oid(s: &str) -> OrderId {
    OrderId::from(s.to_string())
}

async fn published_order(db: &SqliteDatabase, user_id: i64, id: &str) -> OrderId {
    let api = OrderFlowApi::new(db.clone());
    let order = api.create_order(NewOrder::new(oid(id), user_id, "Wireless headphones")).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Published);
    order.order_id
}

#[tokio::test]
async fn full_lifecycle_with_settlement() {
    let db = new_test_db().await;
    seed_user(&db, Role::Admin, "Root", "+90000").await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let agent = seed_user(&db, Role::Agent, "Bekir", "+90002").await;
    let api = OrderFlowApi::new(db.clone());
    let ledger = LedgerApi::new(db.clone());
    SettingsApi::new(db.clone())
        .update(Role::Admin, MarketSettingsUpdate::default().with_exchange_rate(500))
        .await
        .unwrap();

    let id = published_order(&db, user.id, "ord-2001").await;
    assert_eq!(ledger.balance(user.id).await.unwrap(), 4);

    let order = api.claim_order(agent.id, Role::Agent, &id).await.unwrap();
    assert_eq!(order.status, OrderStatusType::UnderAgentReview);
    assert_eq!(order.agent_id, Some(agent.id));

    let order = api.submit_report(agent.id, Role::Agent, &id, NewAgentReport::new(FxAmount::from(100))).await.unwrap();
    assert_eq!(order.status, OrderStatusType::AwaitingUserPayment);

    let order = api.confirm_payment(user.id, &id).await.unwrap();
    assert!(order.user_payment_confirmed);
    assert!(!order.user_payment_verified);

    let order = api.advance_order(Role::Admin, &id, OrderStatusType::Completed).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Completed);
    assert!(order.user_payment_verified);

    // Commission: 100 fx * rate 500 * 5% = 2500 points. One card comes back to the creator.
    let order = api.settle_order(Role::Admin, &id).await.unwrap();
    assert!(order.agent_payment_paid);
    let agent_profile = db.fetch_user(agent.id).await.unwrap().unwrap();
    assert_eq!(agent_profile.agent_points, Points::from(2500));
    assert_eq!(ledger.balance(user.id).await.unwrap(), 5);

    // Settling twice would double the payout and the refund; it must fail.
    let err = api.settle_order(Role::Admin, &id).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InvalidTransition(_)));
    assert_eq!(ledger.balance(user.id).await.unwrap(), 5);
}

#[tokio::test]
async fn concurrent_claims_have_exactly_one_winner() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let a1 = seed_user(&db, Role::Agent, "Agent1", "+90011").await;
    let a2 = seed_user(&db, Role::Agent, "Agent2", "+90012").await;
    let a3 = seed_user(&db, Role::Agent, "Agent3", "+90013").await;
    let a4 = seed_user(&db, Role::Agent, "Agent4", "+90014").await;
    let api = OrderFlowApi::new(db.clone());
    let id = published_order(&db, user.id, "ord-race").await;

    let (r1, r2, r3, r4) = tokio::join!(
        api.claim_order(a1.id, Role::Agent, &id),
        api.claim_order(a2.id, Role::Agent, &id),
        api.claim_order(a3.id, Role::Agent, &id),
        api.claim_order(a4.id, Role::Agent, &id),
    );
    let results = [r1, r2, r3, r4];
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one claim must win");
    for r in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(r, Err(OrderFlowError::AlreadyClaimed(_))));
    }
    let order = db.fetch_order_by_order_id(&id).await.unwrap().unwrap();
    assert!(order.agent_id.is_some());
    assert_eq!(order.status, OrderStatusType::UnderAgentReview);
}

#[tokio::test]
async fn only_agents_may_claim() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let other = seed_user(&db, Role::User, "Berna", "+90003").await;
    let api = OrderFlowApi::new(db.clone());
    let id = published_order(&db, user.id, "ord-gate").await;

    let err = api.claim_order(other.id, Role::User, &id).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Forbidden(_)));
}

#[tokio::test]
async fn payment_request_requires_a_filed_report() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let agent = seed_user(&db, Role::Agent, "Bekir", "+90002").await;
    let api = OrderFlowApi::new(db.clone());
    let id = published_order(&db, user.id, "ord-3001").await;
    api.claim_order(agent.id, Role::Agent, &id).await.unwrap();

    // No report yet: neither the agent nor an admin can demand payment.
    let err = api.advance_order(Role::Agent, &id, OrderStatusType::AwaitingUserPayment).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InvalidTransition(_)));
    let err = api.advance_order(Role::Admin, &id, OrderStatusType::AwaitingUserPayment).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InvalidTransition(_)));

    api.submit_report(agent.id, Role::Agent, &id, NewAgentReport::new(FxAmount::from(50))).await.unwrap();
    let order = db.fetch_order_by_order_id(&id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::AwaitingUserPayment);
}

#[tokio::test]
async fn report_edits_leave_a_trail_until_payment_is_verified() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let agent = seed_user(&db, Role::Agent, "Bekir", "+90002").await;
    let api = OrderFlowApi::new(db.clone());
    let id = published_order(&db, user.id, "ord-3002").await;
    api.claim_order(agent.id, Role::Agent, &id).await.unwrap();
    api.submit_report(agent.id, Role::Agent, &id, NewAgentReport::new(FxAmount::from(50))).await.unwrap();

    let mut edit = NewAgentReport::new(FxAmount::from(65));
    edit.edit_reason = Some("supplier raised the price".to_string());
    api.submit_report(agent.id, Role::Agent, &id, edit).await.unwrap();

    let report = db.fetch_report_for_order(&id).await.unwrap().unwrap();
    assert_eq!(report.user_amount, FxAmount::from(65));
    let edits = db.fetch_report_edits(&id).await.unwrap();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].previous_amount, FxAmount::from(50));
    assert_eq!(edits[0].new_amount, FxAmount::from(65));
    assert_eq!(edits[0].reason.as_deref(), Some("supplier raised the price"));

    // Once the admin verifies the payment the price is frozen.
    api.advance_order(Role::Admin, &id, OrderStatusType::Completed).await.unwrap();
    let err = api.submit_report(agent.id, Role::Agent, &id, NewAgentReport::new(FxAmount::from(70))).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InvalidTransition(_)));
}

#[tokio::test]
async fn agent_cancellation_needs_a_real_reason() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let agent = seed_user(&db, Role::Agent, "Bekir", "+90002").await;
    let api = OrderFlowApi::new(db.clone());
    let id = published_order(&db, user.id, "ord-4001").await;
    api.claim_order(agent.id, Role::Agent, &id).await.unwrap();

    let err = api.cancel_order(agent.id, Role::Agent, &id, None).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::ValidationError(_)));
    let err = api.cancel_order(agent.id, Role::Agent, &id, Some("4chr")).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::ValidationError(_)));
    let err = api.cancel_order(agent.id, Role::Agent, &id, Some("  no  ")).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::ValidationError(_)));

    let order = api.cancel_order(agent.id, Role::Agent, &id, Some("cannot source this item")).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Cancelled);
    assert_eq!(order.cancel_reason.as_deref(), Some("cannot source this item"));
}

#[tokio::test]
async fn agent_cannot_cancel_after_filing_a_report() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let agent = seed_user(&db, Role::Agent, "Bekir", "+90002").await;
    let api = OrderFlowApi::new(db.clone());
    let id = published_order(&db, user.id, "ord-4002").await;
    api.claim_order(agent.id, Role::Agent, &id).await.unwrap();
    api.submit_report(agent.id, Role::Agent, &id, NewAgentReport::new(FxAmount::from(30))).await.unwrap();

    let err = api.cancel_order(agent.id, Role::Agent, &id, Some("changed my mind")).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Forbidden(_) | OrderFlowError::InvalidTransition(_)));
}

#[tokio::test]
async fn user_cancellation_window() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let agent = seed_user(&db, Role::Agent, "Bekir", "+90002").await;
    let api = OrderFlowApi::new(db.clone());
    let ledger = LedgerApi::new(db.clone());

    // While published: allowed, and the spent card is not refunded.
    let id = published_order(&db, user.id, "ord-5001").await;
    let order = api.cancel_order(user.id, Role::User, &id, None).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Cancelled);
    assert_eq!(ledger.balance(user.id).await.unwrap(), 4);

    // Under review: the agent is working, the user must wait.
    let id = published_order(&db, user.id, "ord-5002").await;
    api.claim_order(agent.id, Role::Agent, &id).await.unwrap();
    let err = api.cancel_order(user.id, Role::User, &id, None).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Forbidden(_) | OrderFlowError::InvalidTransition(_)));

    // Awaiting payment, unverified: allowed again (the user saw the price and declined).
    api.submit_report(agent.id, Role::Agent, &id, NewAgentReport::new(FxAmount::from(10))).await.unwrap();
    let order = api.cancel_order(user.id, Role::User, &id, None).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Cancelled);

    // Completed orders are out of reach for users; admins can still step in.
    let id = published_order(&db, user.id, "ord-5003").await;
    api.claim_order(agent.id, Role::Agent, &id).await.unwrap();
    api.submit_report(agent.id, Role::Agent, &id, NewAgentReport::new(FxAmount::from(10))).await.unwrap();
    api.advance_order(Role::Admin, &id, OrderStatusType::Completed).await.unwrap();
    let err = api.cancel_order(user.id, Role::User, &id, None).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Forbidden(_) | OrderFlowError::InvalidTransition(_)));
    let order = api.cancel_order(0, Role::Admin, &id, Some("fraud arbitration")).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Cancelled);
}

#[tokio::test]
async fn stale_claims_return_to_the_published_feed() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let agent = seed_user(&db, Role::Agent, "Bekir", "+90002").await;
    let api = OrderFlowApi::new(db.clone());

    let stale = published_order(&db, user.id, "ord-stale").await;
    let active = published_order(&db, user.id, "ord-active").await;
    api.claim_order(agent.id, Role::Agent, &stale).await.unwrap();
    api.claim_order(agent.id, Role::Agent, &active).await.unwrap();
    api.submit_report(agent.id, Role::Agent, &active, NewAgentReport::new(FxAmount::from(10))).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    let released = api.release_stale_claims(Duration::seconds(1)).await.unwrap();
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].order_id, stale);

    let order = db.fetch_order_by_order_id(&stale).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Published);
    assert!(order.agent_id.is_none());
    // The reported order keeps its claim even though it is just as old.
    let order = db.fetch_order_by_order_id(&active).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::AwaitingUserPayment);
    assert_eq!(order.agent_id, Some(agent.id));
}

#[tokio::test]
async fn order_limits_cap_daily_and_active_orders() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let api = OrderFlowApi::new(db.clone());
    let settings = SettingsApi::new(db.clone());
    settings
        .update(
            Role::Admin,
            MarketSettingsUpdate::default().with_max_orders_per_day(2).with_max_active_orders(2),
        )
        .await
        .unwrap();

    published_order(&db, user.id, "ord-l1").await;
    published_order(&db, user.id, "ord-l2").await;
    let err = api.create_order(NewOrder::new(oid("ord-l3"), user.id, "One too many")).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::LimitExceeded(_)));

    // Switching the limits off lifts the quota.
    settings.update(Role::Admin, MarketSettingsUpdate::default().with_order_limit_enabled(false)).await.unwrap();
    api.create_order(NewOrder::new(oid("ord-l3"), user.id, "Now it fits")).await.unwrap();
}

#[tokio::test]
async fn track_code_and_archiving_are_ownership_gated() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let agent = seed_user(&db, Role::Agent, "Bekir", "+90002").await;
    let rival = seed_user(&db, Role::Agent, "Cem", "+90003").await;
    let api = OrderFlowApi::new(db.clone());
    let id = published_order(&db, user.id, "ord-6001").await;
    api.claim_order(agent.id, Role::Agent, &id).await.unwrap();

    let err = api.set_track_code(rival.id, Role::Agent, &id, "TRK-1").await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Forbidden(_)));
    let err = api.set_track_code(agent.id, Role::Agent, &id, "   ").await.unwrap_err();
    assert!(matches!(err, OrderFlowError::ValidationError(_)));
    let order = api.set_track_code(agent.id, Role::Agent, &id, " TRK-1 ").await.unwrap();
    assert_eq!(order.track_code.as_deref(), Some("TRK-1"));

    let err = api.archive_order(rival.id, Role::Agent, &id, ArchiveSide::User).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Forbidden(_)));
    let order = api.archive_order(user.id, Role::User, &id, ArchiveSide::User).await.unwrap();
    assert!(order.archived_by_user);
    assert!(!order.archived_by_agent);
    // Archiving hides, it does not cancel.
    assert_eq!(order.status, OrderStatusType::UnderAgentReview);
}
