#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use galley_core::{Caller, RestaurantId, StaffRole, UserId};
use galley_infra::ProcurementSettings;
use galley_inventory::IngredientId;
use galley_procurement::{
    Clock, Delivery, FixedClock, InMemoryProcurement, NewIngredient, NewPurchaseItem,
    NewPurchaseOrder, NewSupplier, Notification, Notifier, OrderSupplier,
};
use galley_purchasing::{
    DeliveryCondition, LineReceipt, PurchaseOrder, PurchaseOrderId, SupplierResponse,
};
use galley_suppliers::{PaymentTerms, SupplierId, SupplierOffering};

pub const LINK_SECRET: &str = "test-link-secret";

pub fn test_settings() -> ProcurementSettings {
    let mut settings = ProcurementSettings::default();
    settings.supplier_link.secret = LINK_SECRET.to_string();
    settings
}

pub fn start_of_march() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Keeps every notification for inspection.
#[derive(Debug, Default)]
pub struct CapturingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl CapturingNotifier {
    pub fn topics(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.topic.clone())
            .collect()
    }

    pub fn last(&self, topic: &str) -> Option<Notification> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|n| n.topic == topic)
            .cloned()
    }
}

impl Notifier for CapturingNotifier {
    fn notify(&self, notification: Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

/// Notifier whose transport is always down.
#[derive(Debug, Default)]
pub struct UnreachableNotifier;

impl Notifier for UnreachableNotifier {
    fn notify(&self, notification: Notification) -> anyhow::Result<()> {
        anyhow::bail!("mail relay unreachable for {}", notification.topic)
    }
}

pub struct TestApp {
    pub service: InMemoryProcurement,
    pub clock: Arc<FixedClock>,
    pub notifier: Arc<CapturingNotifier>,
    pub manager: Caller,
    pub staff: Caller,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: ProcurementSettings) -> Self {
        galley_observability::init_with_default("warn");

        let clock = Arc::new(FixedClock::new(start_of_march()));
        let notifier = Arc::new(CapturingNotifier::default());
        let service =
            InMemoryProcurement::in_memory(settings, notifier.clone(), clock.clone()).unwrap();
        let restaurant_id = RestaurantId::new();

        Self {
            service,
            clock,
            notifier,
            manager: Caller::new(UserId::new(), restaurant_id, StaffRole::Manager),
            staff: Caller::new(UserId::new(), restaurant_id, StaffRole::Staff),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn ingredient(&self, name: &str, base_unit: &str) -> IngredientId {
        self.service
            .create_ingredient(
                &self.manager,
                NewIngredient {
                    name: name.to_string(),
                    base_unit: base_unit.to_string(),
                    reorder_level: None,
                },
            )
            .unwrap()
            .id_typed()
    }

    pub fn supplier(&self, name: &str) -> SupplierId {
        self.service
            .register_supplier(
                &self.manager,
                NewSupplier {
                    name: name.to_string(),
                    contact: None,
                    payment_terms: Some(PaymentTerms::Net30),
                },
            )
            .unwrap()
            .id_typed()
    }

    pub fn offer(
        &self,
        supplier_id: SupplierId,
        ingredient_id: IngredientId,
        package_contents_quantity: Decimal,
        package_price: Decimal,
    ) {
        self.service
            .upsert_offering(
                &self.manager,
                supplier_id,
                SupplierOffering {
                    ingredient_id,
                    package_unit: "case".to_string(),
                    package_contents_quantity,
                    package_price,
                    lead_time_days: 2,
                    minimum_order_quantity: dec!(1),
                    maximum_order_quantity: None,
                    active: true,
                },
            )
            .unwrap();
    }

    pub fn draft_order(
        &self,
        supplier_id: SupplierId,
        items: &[(IngredientId, Decimal)],
        tax_rate: Decimal,
    ) -> PurchaseOrder {
        self.service
            .create_purchase_order(
                &self.staff,
                NewPurchaseOrder {
                    supplier: OrderSupplier::Linked { supplier_id },
                    order_date: None,
                    expected_delivery_date: None,
                    items: items
                        .iter()
                        .map(|&(ingredient_id, quantity)| NewPurchaseItem {
                            ingredient_id,
                            quantity,
                            unit_price: None,
                            package_contents_quantity: None,
                        })
                        .collect(),
                    tax_rate,
                    discount_amount: Decimal::ZERO,
                    notes: None,
                },
            )
            .unwrap()
    }

    /// Draft, submit, approve and have the supplier confirm.
    pub fn confirmed_order(
        &self,
        supplier_id: SupplierId,
        items: &[(IngredientId, Decimal)],
        tax_rate: Decimal,
    ) -> PurchaseOrder {
        let order_id = self.draft_order(supplier_id, items, tax_rate).id_typed();
        self.service.submit_for_approval(&self.staff, order_id).unwrap();
        let sent = self.service.approve_and_send(&self.manager, order_id).unwrap();
        self.service
            .supplier_respond(
                self.manager.restaurant_id,
                order_id,
                &sent.links.confirm_token,
                SupplierResponse::Confirm,
            )
            .unwrap()
            .order
    }

    pub fn stock(&self, ingredient_id: IngredientId) -> Decimal {
        self.service
            .get_ingredient(&self.manager, ingredient_id)
            .unwrap()
            .current_stock()
    }

    pub fn order(&self, order_id: PurchaseOrderId) -> PurchaseOrder {
        self.service.get_purchase_order(&self.manager, order_id).unwrap()
    }
}

pub fn receipt(line_no: u32, quantity: Decimal) -> LineReceipt {
    LineReceipt {
        line_no,
        quantity,
        quality_rating: None,
        discrepancy_reason: None,
    }
}

pub fn delivery(items: Vec<LineReceipt>) -> Delivery {
    Delivery {
        items,
        delivery_date: None,
        condition: DeliveryCondition::Good,
        close_partial: false,
    }
}
