mod support;

use std::sync::Mutex;

use market_engine::{
    db_types::{
        NewAgentReport,
        NewNotification,
        NewOrder,
        NewUserProfile,
        NotificationType,
        OrderId,
        OrderStatusType,
        Role,
        UserProfile,
    },
    events::EventHandlers,
    mke_api::settings_objects::MarketSettingsUpdate,
    traits::{Mailer, MailerError, NotificationManagement, UserManagement},
    LedgerApi,
    NotificationApi,
    OrderFlowApi,
    SettingsApi,
    SqliteDatabase,
};
use mkt_common::FxAmount;
use support::{new_test_db, seed_user};

/// Records deliveries instead of sending them; addresses containing "fail" bounce.
#[derive(Default)]
struct TestMailer {
    sent: Mutex<Vec<String>>,
}

impl Mailer for TestMailer {
    async fn send(&self, to: &str, _subject: &str, _body: &str) -> Result<(), MailerError> {
        if to.contains("fail") {
            return Err(MailerError("mailbox unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(to.to_string());
        Ok(())
    }
}

async fn seed_mail_user(db: &SqliteDatabase, name: &str, phone: &str, email: &str) -> UserProfile {
    let profile = NewUserProfile::new(Role::User, name, phone).with_email(email);
    let user = db.create_user(profile).await.unwrap();
    LedgerApi::new(db.clone()).grant_initial(&user).await.unwrap();
    user
}

fn note_for(user_id: i64) -> NewNotification {
    NewNotification::new(user_id, NotificationType::PaymentRequested, "Payment required", "Please pay for your order.")
}

#[tokio::test]
async fn notify_writes_the_record_and_enqueues_an_email_copy() {
    let db = new_test_db().await;
    let user = seed_mail_user(&db, "Aynur", "+90001", "aynur@example.com").await;
    let api = NotificationApi::new(db.clone());

    let record = api.notify(note_for(user.id)).await.unwrap();
    assert!(!record.is_read);

    let inbox = api.for_user(user.id, true).await.unwrap();
    assert_eq!(inbox.len(), 1);
    let pending = db.fetch_pending_emails(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].email, "aynur@example.com");

    // Reading clears it from the unread view.
    api.mark_read(record.id, user.id).await.unwrap();
    assert!(api.for_user(user.id, true).await.unwrap().is_empty());
    assert_eq!(api.for_user(user.id, false).await.unwrap().len(), 1);
}

#[tokio::test]
async fn users_without_an_address_or_opted_out_get_no_email() {
    let db = new_test_db().await;
    let plain = seed_user(&db, Role::User, "Berna", "+90002").await;
    let opted_out = seed_mail_user(&db, "Cem", "+90003", "cem@example.com").await;
    db.set_email_opt_out(opted_out.id, true).await.unwrap();
    let api = NotificationApi::new(db.clone());

    api.notify(note_for(plain.id)).await.unwrap();
    api.notify(note_for(opted_out.id)).await.unwrap();

    // Both notifications landed in-app, but nothing reached the outbox.
    assert_eq!(api.for_user(plain.id, true).await.unwrap().len(), 1);
    assert_eq!(api.for_user(opted_out.id, true).await.unwrap().len(), 1);
    assert!(db.fetch_pending_emails(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn the_daily_email_cap_limits_the_outbox() {
    let db = new_test_db().await;
    let user = seed_mail_user(&db, "Aynur", "+90001", "aynur@example.com").await;
    SettingsApi::new(db.clone())
        .update(Role::Admin, MarketSettingsUpdate::default().with_email_daily_cap(1))
        .await
        .unwrap();
    let api = NotificationApi::new(db.clone());

    api.notify(note_for(user.id)).await.unwrap();
    api.notify(note_for(user.id)).await.unwrap();

    assert_eq!(api.for_user(user.id, true).await.unwrap().len(), 2);
    assert_eq!(db.fetch_pending_emails(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn the_outbox_dispatcher_records_every_outcome() {
    let db = new_test_db().await;
    let good = seed_mail_user(&db, "Aynur", "+90001", "aynur@example.com").await;
    let bad = seed_mail_user(&db, "Berna", "+90002", "fail@example.com").await;
    let api = NotificationApi::new(db.clone());
    api.notify(note_for(good.id)).await.unwrap();
    api.notify(note_for(bad.id)).await.unwrap();

    let mailer = TestMailer::default();
    let report = api.dispatch_outbox(&mailer, 10).await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(mailer.sent.lock().unwrap().as_slice(), ["aynur@example.com"]);

    // Everything has been attempted; the pending queue is drained.
    assert!(db.fetch_pending_emails(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn a_claim_notifies_the_owner_and_withdraws_the_order_from_rivals() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let winner = seed_user(&db, Role::Agent, "Bekir", "+90002").await;
    let rival = seed_user(&db, Role::Agent, "Cem", "+90003").await;

    let notifications = NotificationApi::new(db.clone());
    let handlers = EventHandlers::new(10, notifications.hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let api = OrderFlowApi::with_producers(db.clone(), producers);
    let order = api.create_order(NewOrder::new(OrderId::from("ord-evt".to_string()), user.id, "Camera")).await.unwrap();
    api.claim_order(winner.id, Role::Agent, &order.order_id).await.unwrap();

    // The fan-out runs on the handler task; give it a moment.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let owner_inbox = notifications.for_user(user.id, true).await.unwrap();
    assert!(owner_inbox.iter().any(|n| n.notification_type == NotificationType::OrderClaimed));
    let rival_inbox = notifications.for_user(rival.id, true).await.unwrap();
    assert!(rival_inbox.iter().any(|n| n.notification_type == NotificationType::OrderWithdrawn));
    // The winner is not told the order was withdrawn.
    let winner_inbox = notifications.for_user(winner.id, true).await.unwrap();
    assert!(winner_inbox.iter().all(|n| n.notification_type != NotificationType::OrderWithdrawn));
}

#[tokio::test]
async fn settlement_notifies_both_sides_of_the_payout() {
    let db = new_test_db().await;
    let user = seed_user(&db, Role::User, "Aynur", "+90001").await;
    let agent = seed_user(&db, Role::Agent, "Bekir", "+90002").await;

    let notifications = NotificationApi::new(db.clone());
    let handlers = EventHandlers::new(10, notifications.hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let api = OrderFlowApi::with_producers(db.clone(), producers);
    let id = OrderId::from("ord-pay".to_string());
    api.create_order(NewOrder::new(id.clone(), user.id, "Monitor")).await.unwrap();
    api.claim_order(agent.id, Role::Agent, &id).await.unwrap();
    api.submit_report(agent.id, Role::Agent, &id, NewAgentReport::new(FxAmount::from(80))).await.unwrap();
    api.confirm_payment(user.id, &id).await.unwrap();
    api.advance_order(Role::Admin, &id, OrderStatusType::Completed).await.unwrap();
    api.settle_order(Role::Admin, &id).await.unwrap();

    // The fan-out runs on the handler tasks; give it a moment.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let agent_inbox = notifications.for_user(agent.id, true).await.unwrap();
    assert!(agent_inbox.iter().any(|n| n.notification_type == NotificationType::SettlementPaid));
    let user_inbox = notifications.for_user(user.id, true).await.unwrap();
    assert!(user_inbox.iter().any(|n| n.notification_type == NotificationType::PaymentVerified));
    assert!(user_inbox.iter().any(|n| n.notification_type == NotificationType::CardsReceived));
}
