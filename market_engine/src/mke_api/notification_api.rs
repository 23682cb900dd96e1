//! Notification fan-out and the e-mail outbox.
//!
//! [`NotificationApi::notify`] always writes the in-app notification record. The e-mail half is
//! best-effort and opt-in: a copy is enqueued on the outbox only if the recipient has an address,
//! has not opted out, and the platform-wide daily cap has headroom. Nothing is ever sent inline;
//! [`NotificationApi::dispatch_outbox`] drains the queue against a [`Mailer`] so delivery
//! failures are recorded and retryable.

use chrono::Utc;
use log::*;

#[cfg(feature = "sqlite")]
use crate::{
    db_types::{NotificationType, Role},
    events::{ClaimEvent, EventHooks, SettlementEvent, StatusChangedEvent},
    sqlite::SqliteDatabase,
};
use crate::{
    db_types::{NewNotification, Notification, OutboxStatus},
    mke_api::order_limits::local_midnight,
    traits::{
        Mailer,
        NotificationError,
        NotificationManagement,
        OutboxRunReport,
        SettingsManagement,
        UserManagement,
    },
};

#[derive(Clone)]
pub struct NotificationApi<B> {
    db: B,
}

impl<B> NotificationApi<B>
where B: NotificationManagement + UserManagement + SettingsManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Records the notification and, when the recipient is eligible, enqueues an e-mail copy.
    pub async fn notify(&self, notification: NewNotification) -> Result<Notification, NotificationError> {
        let user = self
            .db
            .fetch_user(notification.user_id)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?
            .ok_or(NotificationError::UserNotFound(notification.user_id))?;
        let record = self.db.insert_notification(notification).await?;
        if let Some(email) = user.email.as_deref() {
            if user.email_opt_out {
                trace!("📨️ User {} has opted out of e-mail; notification stays in-app only", user.id);
            } else if self.email_cap_reached().await? {
                warn!("📨️ Daily e-mail cap reached; skipping e-mail for notification {}", record.id);
            } else {
                self.db.enqueue_email(user.id, email, &record.title, &record.message).await?;
                trace!("📨️ Enqueued e-mail copy of notification {} for {}", record.id, email);
            }
        }
        Ok(record)
    }

    async fn email_cap_reached(&self) -> Result<bool, NotificationError> {
        let cap = self
            .db
            .fetch_settings()
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?
            .email_daily_cap;
        let sent_today = self.db.emails_enqueued_since(local_midnight(Utc::now())).await?;
        Ok(sent_today >= cap)
    }

    /// Drains up to `limit` pending outbox e-mails through `mailer`, recording each outcome.
    pub async fn dispatch_outbox<M: Mailer>(&self, mailer: &M, limit: i64) -> Result<OutboxRunReport, NotificationError> {
        let pending = self.db.fetch_pending_emails(limit).await?;
        let mut report = OutboxRunReport::default();
        for email in pending {
            match mailer.send(&email.email, &email.subject, &email.body).await {
                Ok(()) => {
                    self.db.mark_email_result(email.id, OutboxStatus::Sent).await?;
                    report.sent += 1;
                },
                Err(e) => {
                    warn!("📨️ Delivery of outbox e-mail {} failed: {e}", email.id);
                    self.db.mark_email_result(email.id, OutboxStatus::Failed).await?;
                    report.failed += 1;
                },
            }
        }
        if report.total() > 0 {
            info!("📨️ Outbox run complete. {} sent, {} failed", report.sent, report.failed);
        }
        Ok(report)
    }

    pub async fn mark_read(&self, id: i64, user_id: i64) -> Result<Notification, NotificationError> {
        self.db.mark_notification_read(id, user_id).await
    }

    pub async fn for_user(&self, user_id: i64, unread_only: bool) -> Result<Vec<Notification>, NotificationError> {
        self.db.notifications_for_user(user_id, unread_only).await
    }
}

#[cfg(feature = "sqlite")]
impl NotificationApi<SqliteDatabase> {
    /// Standard event wiring: turns the engine's lifecycle events into notifications.
    ///
    /// Claims notify the order's owner and withdraw the order from every other agent's feed.
    /// Status changes notify the affected parties, and settlements notify both sides of the
    /// payout. Wired against the concrete backend so every handler future is `Send` and can run
    /// on the spawned handler tasks.
    pub fn hooks(&self) -> EventHooks {
        let mut hooks = EventHooks::default();
        let api = self.clone();
        hooks.on_claim(move |ev: ClaimEvent| {
            let api = api.clone();
            Box::pin(async move {
                let note = NewNotification::new(
                    ev.user_id,
                    NotificationType::OrderClaimed,
                    "An agent accepted your order",
                    format!("Order {} is now being researched by an agent.", ev.order_id),
                )
                .for_order(ev.order_id.clone());
                if let Err(e) = api.notify(note).await {
                    warn!("📨️ Could not notify user {} of claim: {e}", ev.user_id);
                }
                // Withdraw the order from the agents that lost the race.
                match api.db.fetch_agents().await {
                    Ok(agents) => {
                        for agent in agents.iter().filter(|a| a.id != ev.agent_id && a.role == Role::Agent) {
                            let note = NewNotification::new(
                                agent.id,
                                NotificationType::OrderWithdrawn,
                                "Order no longer available",
                                format!("Order {} has been claimed by another agent.", ev.order_id),
                            )
                            .for_order(ev.order_id.clone());
                            if let Err(e) = api.notify(note).await {
                                warn!("📨️ Could not notify agent {} of withdrawal: {e}", agent.id);
                            }
                        }
                    },
                    Err(e) => warn!("📨️ Could not fetch agents for claim fan-out: {e}"),
                }
            })
        });
        let api = self.clone();
        hooks.on_status_changed(move |ev: StatusChangedEvent| {
            let api = api.clone();
            Box::pin(async move {
                use crate::db_types::OrderStatusType::*;
                let notes = match ev.new_status {
                    AwaitingUserPayment => {
                        let mut notes = vec![NewNotification::new(
                            ev.user_id,
                            NotificationType::ReportFiled,
                            "Price report ready",
                            format!("Your agent has priced order {}. Please review the report.", ev.order_id),
                        )];
                        let pay_to = match api.db.fetch_settings().await {
                            Ok(s) => match (s.account_number, s.bank) {
                                (Some(number), Some(bank)) => format!("Pay into {bank} account {number}."),
                                _ => "Payment details will be provided by the platform.".to_string(),
                            },
                            Err(e) => {
                                warn!("📨️ Could not fetch settings for payment instructions: {e}");
                                "Payment details will be provided by the platform.".to_string()
                            },
                        };
                        notes.push(NewNotification::new(
                            ev.user_id,
                            NotificationType::PaymentRequested,
                            "Payment required",
                            format!("Order {} is awaiting your payment. {pay_to}", ev.order_id),
                        ));
                        notes
                    },
                    Completed => vec![NewNotification::new(
                        ev.user_id,
                        NotificationType::PaymentVerified,
                        "Payment verified",
                        format!("Your payment for order {} has been verified.", ev.order_id),
                    )],
                    Cancelled => {
                        let mut notes = vec![NewNotification::new(
                            ev.user_id,
                            NotificationType::OrderCancelled,
                            "Order cancelled",
                            format!("Order {} has been cancelled.", ev.order_id),
                        )];
                        if let Some(agent_id) = ev.agent_id {
                            notes.push(NewNotification::new(
                                agent_id,
                                NotificationType::OrderCancelled,
                                "Order cancelled",
                                format!("Order {} has been cancelled.", ev.order_id),
                            ));
                        }
                        notes
                    },
                    _ => vec![],
                };
                for note in notes {
                    let note = note.for_order(ev.order_id.clone());
                    let user_id = note.user_id;
                    if let Err(e) = api.notify(note).await {
                        warn!("📨️ Could not notify user {user_id} of status change: {e}");
                    }
                }
            })
        });
        let api = self.clone();
        hooks.on_settlement(move |ev: SettlementEvent| {
            let api = api.clone();
            Box::pin(async move {
                let agent_note = NewNotification::new(
                    ev.agent_id,
                    NotificationType::SettlementPaid,
                    "Settlement released",
                    format!("You earned {} for order {}.", ev.commission, ev.order_id),
                )
                .for_order(ev.order_id.clone());
                if let Err(e) = api.notify(agent_note).await {
                    warn!("📨️ Could not notify agent {} of settlement: {e}", ev.agent_id);
                }
                if ev.refunded_cards > 0 {
                    let user_note = NewNotification::new(
                        ev.user_id,
                        NotificationType::CardsReceived,
                        "Research cards refunded",
                        format!("{} research card(s) returned for completed order {}.", ev.refunded_cards, ev.order_id),
                    )
                    .for_order(ev.order_id.clone());
                    if let Err(e) = api.notify(user_note).await {
                        warn!("📨️ Could not notify user {} of refund: {e}", ev.user_id);
                    }
                }
            })
        });
        hooks
    }
}
