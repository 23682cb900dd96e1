mod support;

use market_engine::{
    db_types::{
        BundleReport,
        CardTransactionType,
        ItemReport,
        NewBundleItem,
        NewBundleOrder,
        OrderId,
        OrderStatusType,
        ReportMode,
        Role,
    },
    mke_api::{bundle_objects::FullBundleOrder, settings_objects::MarketSettingsUpdate},
    traits::{OrderFlowError, UserManagement},
    BundleFlowApi,
    LedgerApi,
    SettingsApi,
    SqliteDatabase,
};
use mkt_common::{FxAmount, Points};
use support::{new_test_db, seed_user};

fn oid(s: &str) -> OrderId {
    OrderId::from(s.to_string())
}

fn item_report(amount: i64) -> ItemReport {
    ItemReport {
        user_amount: FxAmount::from(amount),
        payment_link: None,
        additional_images: Vec::new(),
        additional_description: None,
        quantity: None,
    }
}

async fn three_item_bundle(db: &SqliteDatabase, user_id: i64, id: &str) -> FullBundleOrder {
    let api = BundleFlowApi::new(db.clone());
    let bundle = NewBundleOrder::new(
        oid(id),
        user_id,
        vec![NewBundleItem::new("Sneakers"), NewBundleItem::new("Backpack"), NewBundleItem::new("Sunglasses")],
    );
    api.create_bundle(bundle).await.unwrap()
}

#[tokio::test]
async fn bundle_creation_spends_one_card_per_item_and_snapshots_the_profile() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let ledger = LedgerApi::new(db.clone());

    let full = three_item_bundle(&db, user.id, "bnd-1001").await;
    assert_eq!(full.item_count(), 3);
    assert_eq!(full.bundle.status, OrderStatusType::Published);
    assert_eq!(full.bundle.report_mode, ReportMode::PerItem);
    assert_eq!(full.bundle.snapshot_name, "Aynur");
    assert_eq!(full.bundle.snapshot_phone, "+90001");
    assert_eq!(ledger.balance(user.id).await.unwrap(), 2);

    let api = BundleFlowApi::new(db.clone());
    let empty = NewBundleOrder::new(oid("bnd-empty"), user.id, vec![]);
    let err = api.create_bundle(empty).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::ValidationError(_)));
}

#[tokio::test]
async fn per_item_reports_converge_on_the_last_filing() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let agent = seed_user(&db, Role::Agent, "Bekir", "+90002").await;
    let api = BundleFlowApi::new(db.clone());
    let full = three_item_bundle(&db, user.id, "bnd-2001").await;
    let id = full.bundle.order_id.clone();
    let items: Vec<i64> = full.items.iter().map(|i| i.id).collect();

    api.claim_bundle(agent.id, Role::Agent, &id).await.unwrap();

    let full = api.file_item_report(agent.id, Role::Agent, &id, items[0], item_report(40)).await.unwrap();
    assert_eq!(full.bundle.status, OrderStatusType::UnderAgentReview);
    let full = api.file_item_report(agent.id, Role::Agent, &id, items[1], item_report(25)).await.unwrap();
    assert_eq!(full.bundle.status, OrderStatusType::UnderAgentReview);
    assert_eq!(full.items_awaiting_report().count(), 1);

    // The last report tips the whole bundle over to payment.
    let full = api.file_item_report(agent.id, Role::Agent, &id, items[2], item_report(35)).await.unwrap();
    assert_eq!(full.bundle.status, OrderStatusType::AwaitingUserPayment);
    assert!(full.all_items_reported());

    // Items unknown to the bundle are rejected.
    let err = api.file_item_report(agent.id, Role::Agent, &id, 9999, item_report(10)).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::ItemNotFound(9999)));
}

#[tokio::test]
async fn removing_an_item_burns_the_card() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let agent = seed_user(&db, Role::Agent, "Bekir", "+90002").await;
    let api = BundleFlowApi::new(db.clone());
    let ledger = LedgerApi::new(db.clone());
    let full = three_item_bundle(&db, user.id, "bnd-3001").await;
    let id = full.bundle.order_id.clone();
    let items: Vec<i64> = full.items.iter().map(|i| i.id).collect();

    api.claim_bundle(agent.id, Role::Agent, &id).await.unwrap();

    // Removal is only open once the quotes are in.
    let err = api.remove_item(user.id, Role::User, &id, items[0]).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InvalidTransition(_)));

    for (item, amount) in items.iter().zip([40, 25, 35]) {
        api.file_item_report(agent.id, Role::Agent, &id, *item, item_report(amount)).await.unwrap();
    }

    let before = ledger.balance(user.id).await.unwrap();
    let full = api.remove_item(user.id, Role::User, &id, items[1]).await.unwrap();
    assert_eq!(full.item_count(), 2);
    // Burned, not refunded: the balance is untouched, but the audit trail records the removal.
    assert_eq!(ledger.balance(user.id).await.unwrap(), before);
    let burns: Vec<_> = ledger
        .history(user.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|tx| tx.tx_type == CardTransactionType::BundleItemRemoval)
        .collect();
    assert_eq!(burns.len(), 1);
    assert_eq!(burns[0].order_id.as_ref(), Some(&id));

    // Only the creator (or an admin) may prune the bundle.
    let err = api.remove_item(agent.id, Role::Agent, &id, items[0]).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Forbidden(_)));
}

#[tokio::test]
async fn bundle_settlement_refunds_one_card_per_remaining_item() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let agent = seed_user(&db, Role::Agent, "Bekir", "+90002").await;
    let api = BundleFlowApi::new(db.clone());
    let ledger = LedgerApi::new(db.clone());
    SettingsApi::new(db.clone())
        .update(Role::Admin, MarketSettingsUpdate::default().with_exchange_rate(500))
        .await
        .unwrap();

    let full = three_item_bundle(&db, user.id, "bnd-4001").await;
    let id = full.bundle.order_id.clone();
    let items: Vec<i64> = full.items.iter().map(|i| i.id).collect();
    api.claim_bundle(agent.id, Role::Agent, &id).await.unwrap();
    for (item, amount) in items.iter().zip([40, 25, 35]) {
        api.file_item_report(agent.id, Role::Agent, &id, *item, item_report(amount)).await.unwrap();
    }
    api.remove_item(user.id, Role::User, &id, items[1]).await.unwrap();
    api.confirm_payment(user.id, &id).await.unwrap();
    api.advance_bundle(Role::Admin, &id, OrderStatusType::Completed).await.unwrap();

    let bundle = api.settle_bundle(Role::Admin, &id).await.unwrap();
    assert!(bundle.agent_payment_paid);
    // Commission on the remaining items only: (40 + 35) * 500 * 5% = 1875 points.
    let agent_profile = db.fetch_user(agent.id).await.unwrap().unwrap();
    assert_eq!(agent_profile.agent_points, Points::from(1875));
    // Two items remain, so two of the three spent cards come back: 5 - 3 + 2 = 4.
    assert_eq!(ledger.balance(user.id).await.unwrap(), 4);

    let err = api.settle_bundle(Role::Admin, &id).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InvalidTransition(_)));
    assert_eq!(ledger.balance(user.id).await.unwrap(), 4);
}

#[tokio::test]
async fn single_mode_prices_the_whole_bundle_at_once() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let agent = seed_user(&db, Role::Agent, "Bekir", "+90002").await;
    let api = BundleFlowApi::new(db.clone());
    let full = three_item_bundle(&db, user.id, "bnd-5001").await;
    let id = full.bundle.order_id.clone();
    api.claim_bundle(agent.id, Role::Agent, &id).await.unwrap();

    let full = api.set_report_mode(agent.id, Role::Agent, &id, ReportMode::Single).await.unwrap();
    assert_eq!(full.bundle.report_mode, ReportMode::Single);

    let report = BundleReport {
        total_user_amount: FxAmount::from(120),
        payment_link: None,
        additional_images: Vec::new(),
        additional_description: None,
    };
    let full = api.file_bundle_report(agent.id, Role::Agent, &id, report).await.unwrap();
    assert_eq!(full.bundle.status, OrderStatusType::AwaitingUserPayment);
    assert!(full.items.iter().all(|i| i.status == OrderStatusType::AwaitingUserPayment));
    assert!(full.all_items_reported());
}

#[tokio::test]
async fn switching_report_mode_clears_the_other_modes_data() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let agent = seed_user(&db, Role::Agent, "Bekir", "+90002").await;
    let api = BundleFlowApi::new(db.clone());
    let full = three_item_bundle(&db, user.id, "bnd-6001").await;
    let id = full.bundle.order_id.clone();
    let items: Vec<i64> = full.items.iter().map(|i| i.id).collect();
    api.claim_bundle(agent.id, Role::Agent, &id).await.unwrap();

    api.file_item_report(agent.id, Role::Agent, &id, items[0], item_report(40)).await.unwrap();

    // Filing an aggregate report in per_item mode is a mode mismatch.
    let report = BundleReport {
        total_user_amount: FxAmount::from(120),
        payment_link: None,
        additional_images: Vec::new(),
        additional_description: None,
    };
    let err = api.file_bundle_report(agent.id, Role::Agent, &id, report).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InvalidTransition(_)));

    let full = api.set_report_mode(agent.id, Role::Agent, &id, ReportMode::Single).await.unwrap();
    assert!(full.items.iter().all(|i| i.report.is_none()), "item reports must be wiped on a mode switch");
    assert!(full.bundle.bundle_report.is_none());

    // Only the assigned agent may switch, and only while the bundle is under review.
    let rival = seed_user(&db, Role::Agent, "Cem", "+90003").await;
    let err = api.set_report_mode(rival.id, Role::Agent, &id, ReportMode::PerItem).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Forbidden(_)));
}

#[tokio::test]
async fn cancelling_a_bundle_cancels_every_item() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let api = BundleFlowApi::new(db.clone());
    let ledger = LedgerApi::new(db.clone());
    let full = three_item_bundle(&db, user.id, "bnd-7001").await;
    let id = full.bundle.order_id.clone();

    let full = api.cancel_bundle(user.id, Role::User, &id, None).await.unwrap();
    assert_eq!(full.bundle.status, OrderStatusType::Cancelled);
    assert!(full.items.iter().all(|i| i.status == OrderStatusType::Cancelled));
    // The three spent cards stay spent.
    assert_eq!(ledger.balance(user.id).await.unwrap(), 2);
}
