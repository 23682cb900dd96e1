use serde::{Deserialize, Serialize};

use crate::db_types::{BundleItem, BundleOrder, OrderStatusType, ReportMode};

/// The bundle aggregate: the parent row together with its items, always loaded and returned as a
/// unit. Item mutations go through the parent's API so convergence can be re-evaluated in the same
/// transaction that changed the item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullBundleOrder {
    pub bundle: BundleOrder,
    pub items: Vec<BundleItem>,
}

impl FullBundleOrder {
    pub fn new(bundle: BundleOrder, items: Vec<BundleItem>) -> Self {
        Self { bundle, items }
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn find_item(&self, item_id: i64) -> Option<&BundleItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// Convergence check for [`ReportMode::PerItem`]: true once every item carries a report. In
    /// `single` mode the aggregate report on the parent is what matters, so per-item state is
    /// irrelevant.
    pub fn all_items_reported(&self) -> bool {
        match self.bundle.report_mode {
            ReportMode::Single => self.bundle.bundle_report.is_some(),
            ReportMode::PerItem => !self.items.is_empty() && self.items.iter().all(|i| i.report.is_some()),
        }
    }

    pub fn items_awaiting_report(&self) -> impl Iterator<Item = &BundleItem> {
        self.items.iter().filter(|i| i.report.is_none())
    }

    pub fn status(&self) -> OrderStatusType {
        self.bundle.status
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use mkt_common::FxAmount;
    use sqlx::types::Json;

    use super::*;
    use crate::db_types::{ItemReport, OrderId};

    fn bundle(mode: ReportMode) -> BundleOrder {
        let now = Utc::now();
        BundleOrder {
            id: 1,
            order_id: OrderId::from("B-1001".to_string()),
            user_id: 1,
            agent_id: Some(2),
            snapshot_name: "Alice".to_string(),
            snapshot_phone: "555-0100".to_string(),
            snapshot_cargo: None,
            status: OrderStatusType::UnderAgentReview,
            report_mode: mode,
            bundle_report: None,
            user_payment_confirmed: false,
            user_payment_verified: false,
            agent_payment_paid: false,
            track_code: None,
            cancel_reason: None,
            archived_by_user: false,
            archived_by_agent: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn item(id: i64, report: Option<ItemReport>) -> BundleItem {
        let now = Utc::now();
        BundleItem {
            id,
            bundle_id: 1,
            product_name: format!("item {id}"),
            description: None,
            image_urls: Json(vec![]),
            status: OrderStatusType::UnderAgentReview,
            report: report.map(Json),
            created_at: now,
            updated_at: now,
        }
    }

    fn report() -> ItemReport {
        ItemReport {
            user_amount: FxAmount::from(100),
            payment_link: None,
            additional_images: vec![],
            additional_description: None,
            quantity: None,
        }
    }

    #[test]
    fn per_item_convergence_requires_every_item() {
        let full = FullBundleOrder::new(bundle(ReportMode::PerItem), vec![
            item(1, Some(report())),
            item(2, None),
            item(3, Some(report())),
        ]);
        assert!(!full.all_items_reported());
        assert_eq!(full.items_awaiting_report().count(), 1);

        let full = FullBundleOrder::new(bundle(ReportMode::PerItem), vec![
            item(1, Some(report())),
            item(2, Some(report())),
            item(3, Some(report())),
        ]);
        assert!(full.all_items_reported());
    }

    #[test]
    fn single_mode_ignores_item_reports() {
        let mut b = bundle(ReportMode::Single);
        let full = FullBundleOrder::new(b.clone(), vec![item(1, None), item(2, None)]);
        assert!(!full.all_items_reported());
        b.bundle_report = Some(Json(crate::db_types::BundleReport {
            total_user_amount: FxAmount::from(300),
            payment_link: None,
            additional_images: vec![],
            additional_description: None,
        }));
        let full = FullBundleOrder::new(b, vec![item(1, None), item(2, None)]);
        assert!(full.all_items_reported());
    }

    #[test]
    fn empty_per_item_bundle_never_converges() {
        let full = FullBundleOrder::new(bundle(ReportMode::PerItem), vec![]);
        assert!(!full.all_items_reported());
    }
}
