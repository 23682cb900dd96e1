mod support;

use market_engine::{
    db_types::{CardTransactionType, NewOrder, OrderId, Role},
    mke_api::ledger_api::INITIAL_CARD_GRANT,
    traits::LedgerError,
    LedgerApi,
    OrderFlowApi,
};
use support::{new_test_db, seed_user};

#[tokio::test]
async fn starter_grant_is_handed_out_exactly_once() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let ledger = LedgerApi::new(db.clone());
    assert_eq!(ledger.balance(user.id).await.unwrap(), INITIAL_CARD_GRANT);

    // A second grant is a no-op.
    let tx = ledger.grant_initial(&user).await.unwrap();
    assert!(tx.is_none());
    assert_eq!(ledger.balance(user.id).await.unwrap(), INITIAL_CARD_GRANT);

    // Staff never receive the grant.
    let agent = seed_user(&db, Role::Agent, "Bekir", "+90002").await;
    assert!(ledger.grant_initial(&agent).await.unwrap().is_none());
    assert_eq!(ledger.balance(agent.id).await.unwrap(), 0);
}

#[tokio::test]
async fn publishing_an_order_spends_one_card() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let ledger = LedgerApi::new(db.clone());
    let orders = OrderFlowApi::new(db.clone());

    let order = NewOrder::new(OrderId::from("ord-1001".to_string()), user.id, "Mechanical keyboard");
    orders.create_order(order).await.unwrap();

    assert_eq!(ledger.balance(user.id).await.unwrap(), INITIAL_CARD_GRANT - 1);
    let history = ledger.history(user.id).await.unwrap();
    let deductions: Vec<_> =
        history.iter().filter(|tx| tx.tx_type == CardTransactionType::OrderDeduction).collect();
    assert_eq!(deductions.len(), 1);
    assert_eq!(deductions[0].amount, 1);
    assert_eq!(deductions[0].order_id.as_ref().map(|o| o.as_str()), Some("ord-1001"));
}

#[tokio::test]
async fn staff_creators_spend_no_cards() {
    let db = new_test_db().await;
    let agent = seed_user(&db, Role::Agent, "Bekir", "+90002").await;
    let ledger = LedgerApi::new(db.clone());
    let orders = OrderFlowApi::new(db.clone());

    let order = NewOrder::new(OrderId::from("ord-staff".to_string()), agent.id, "Test listing");
    orders.create_order(order).await.unwrap();

    assert_eq!(ledger.balance(agent.id).await.unwrap(), 0);
    assert!(ledger.history(agent.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn transfers_resolve_the_recipient_by_phone() {
    let db = new_test_db().await;
    let alice = seed_user(&db, Role::User, "Alice", "+90010").await;
    let bob = seed_user(&db, Role::User, "Bob", "+90011").await;
    let ledger = LedgerApi::new(db.clone());

    let tx = ledger.transfer(alice.id, Role::User, "+90011", 2).await.unwrap();
    assert_eq!(tx.tx_type, CardTransactionType::UserTransfer);
    assert_eq!(ledger.balance(alice.id).await.unwrap(), 3);
    assert_eq!(ledger.balance(bob.id).await.unwrap(), 7);

    let err = ledger.transfer(alice.id, Role::User, "+90010", 1).await.unwrap_err();
    assert!(matches!(err, LedgerError::SelfTransferForbidden));

    let err = ledger.transfer(alice.id, Role::User, "+99999", 1).await.unwrap_err();
    assert!(matches!(err, LedgerError::RecipientNotFound(_)));

    let err = ledger.transfer(alice.id, Role::User, "+90011", 100).await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientCredit { needed: 100, balance: 3 }));

    let err = ledger.transfer(alice.id, Role::User, "+90011", 0).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(0)));
}

#[tokio::test]
async fn admins_are_an_unlimited_gift_source() {
    let db = new_test_db().await;
    let admin = seed_user(&db, Role::Admin, "Root", "+90000").await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let ledger = LedgerApi::new(db.clone());

    // Admins hold no cards, yet the gift goes through.
    let tx = ledger.transfer(admin.id, Role::Admin, "+90001", 10).await.unwrap();
    assert_eq!(tx.tx_type, CardTransactionType::AdminGift);
    assert_eq!(ledger.balance(user.id).await.unwrap(), INITIAL_CARD_GRANT + 10);
}

#[tokio::test]
async fn bulk_grant_tops_up_every_end_user() {
    let db = new_test_db().await;
    let admin = seed_user(&db, Role::Admin, "Root", "+90000").await;
    let alice = seed_user(&db, Role::User, "Alice", "+90010").await;
    let bob = seed_user(&db, Role::User, "Bob", "+90011").await;
    let agent = seed_user(&db, Role::Agent, "Bekir", "+90002").await;
    let ledger = LedgerApi::new(db.clone());

    let err = ledger.bulk_grant(alice.id, Role::User, 3).await.unwrap_err();
    assert!(matches!(err, LedgerError::Forbidden(_)));

    let n = ledger.bulk_grant(admin.id, Role::Admin, 3).await.unwrap();
    assert_eq!(n, 2);
    assert_eq!(ledger.balance(alice.id).await.unwrap(), INITIAL_CARD_GRANT + 3);
    assert_eq!(ledger.balance(bob.id).await.unwrap(), INITIAL_CARD_GRANT + 3);
    // Staff are not end users and are skipped.
    assert_eq!(ledger.balance(agent.id).await.unwrap(), 0);
    let gifts = ledger
        .history(alice.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|tx| tx.tx_type == CardTransactionType::AdminGift)
        .count();
    assert_eq!(gifts, 1);
}
