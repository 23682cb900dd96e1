//! The role-gated status transition table shared by single and bundle orders.
//!
//! These functions are pure so the whole table can be tested without a database. The flow APIs
//! consult them before touching storage; the storage layer re-checks only the *state*
//! preconditions (via conditional updates) to stay race-safe.

use crate::{
    db_types::{OrderStatusType, Role},
    traits::OrderFlowError,
};

use OrderStatusType::*;

/// Whether `role` may move an order from `current` to `next`, cancellation excluded.
///
/// Agents advance `Published → UnderAgentReview` (the claim) and `UnderAgentReview →
/// AwaitingUserPayment` (gated on a filed report, which the caller checks). Admins may do both,
/// plus the payment verification `AwaitingUserPayment → Completed`. Users drive no forward
/// transitions at all; their payment confirmation is a flag, not a status change.
pub fn can_advance(role: Role, current: OrderStatusType, next: OrderStatusType) -> bool {
    match (role, current, next) {
        (Role::Agent | Role::Admin, Published, UnderAgentReview) => true,
        (Role::Agent | Role::Admin, UnderAgentReview, AwaitingUserPayment) => true,
        (Role::Admin, AwaitingUserPayment, Completed) => true,
        _ => false,
    }
}

/// Everything the cancellation rules need to know about the order being cancelled.
#[derive(Debug, Clone, Copy)]
pub struct CancelContext {
    pub status: OrderStatusType,
    pub user_payment_verified: bool,
    /// A report exists (an `AgentReport` row for single orders; any filed report for bundles).
    pub report_filed: bool,
    /// The caller is the order's creator.
    pub is_owner: bool,
    /// The caller is the order's assigned agent.
    pub is_assigned_agent: bool,
}

/// Role-gated cancellation check.
///
/// Users may cancel their own order from `Published` or `AwaitingUserPayment` while the payment is
/// still unverified. Agents may cancel only an order assigned to them, only from
/// `UnderAgentReview` before any report is filed, and must give a reason of at least five
/// characters. Admins may cancel anything not already cancelled.
pub fn check_cancellation(role: Role, ctx: CancelContext, reason: Option<&str>) -> Result<(), OrderFlowError> {
    if ctx.status == Cancelled {
        return Err(OrderFlowError::InvalidTransition("the order is already cancelled".to_string()));
    }
    match role {
        Role::Admin => Ok(()),
        Role::User => {
            if !ctx.is_owner {
                return Err(OrderFlowError::Forbidden("only the order's creator may cancel it".to_string()));
            }
            if ctx.user_payment_verified {
                return Err(OrderFlowError::InvalidTransition(
                    "the payment has been verified; cancellation is no longer possible".to_string(),
                ));
            }
            match ctx.status {
                Published | AwaitingUserPayment => Ok(()),
                s => Err(OrderFlowError::InvalidTransition(format!("users cannot cancel an order in state {s}"))),
            }
        },
        Role::Agent => {
            if !ctx.is_assigned_agent {
                return Err(OrderFlowError::Forbidden("only the assigned agent may cancel this order".to_string()));
            }
            if ctx.status != UnderAgentReview {
                return Err(OrderFlowError::InvalidTransition(format!(
                    "agents cannot cancel an order in state {}",
                    ctx.status
                )));
            }
            if ctx.report_filed {
                return Err(OrderFlowError::InvalidTransition(
                    "a report has been filed; agents can no longer cancel".to_string(),
                ));
            }
            match reason {
                Some(r) if r.trim().len() >= 5 => Ok(()),
                _ => Err(OrderFlowError::ValidationError(
                    "agent cancellations require a reason of at least 5 characters".to_string(),
                )),
            }
        },
    }
}
