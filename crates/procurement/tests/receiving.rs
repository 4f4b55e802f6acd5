mod common;

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use galley_billing::{BillStatus, SupplierBill};
use galley_core::{Aggregate, AggregateId, RestaurantId};
use galley_infra::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, StreamAppend};
use galley_procurement::{
    EnvelopeBus, FixedClock, ManualDelivery, ManualItem, NewIngredient, NewSupplier, Procurement,
    ProcurementError, ingredient_id_for_name,
};
use galley_purchasing::{DeliveryCondition, PurchaseOrderStatus, SupplierRef};
use galley_suppliers::{PaymentTerms, SupplierOffering};

use common::{CapturingNotifier, TestApp, delivery, receipt, start_of_march, test_settings};

#[test]
fn receipts_average_cost_across_orders() {
    let app = TestApp::new();
    let flour = app.ingredient("Flour", "kg");
    let mill = app.supplier("Mill & Co");

    app.offer(mill, flour, dec!(5), dec!(10));
    let first = app.confirmed_order(mill, &[(flour, dec!(10))], Decimal::ZERO);
    let outcome = app
        .service
        .receive(&app.staff, first.id_typed(), delivery(vec![receipt(1, dec!(10))]))
        .unwrap();
    assert_eq!(outcome.inventory_updates[0].stock_after, dec!(50));
    assert_eq!(outcome.inventory_updates[0].cost_after, dec!(2));

    app.offer(mill, flour, dec!(5), dec!(20));
    let second = app.confirmed_order(mill, &[(flour, dec!(5))], Decimal::ZERO);
    let outcome = app
        .service
        .receive(&app.staff, second.id_typed(), delivery(vec![receipt(1, dec!(5))]))
        .unwrap();

    let update = &outcome.inventory_updates[0];
    assert_eq!(update.base_quantity_added, dec!(25));
    assert_eq!(update.packages_added, dec!(5));
    assert_eq!(update.stock_after, dec!(75));
    assert_eq!(update.cost_after.round_dp(2), dec!(2.67));

    let ingredient = app.service.get_ingredient(&app.manager, flour).unwrap();
    assert_eq!(ingredient.packages(), dec!(15));
}

#[test]
fn partial_receipts_close_the_order_and_bill_it_once() {
    let app = TestApp::new();
    let flour = app.ingredient("Flour", "kg");
    let sugar = app.ingredient("Sugar", "kg");
    let mill = app.supplier("Mill & Co");
    app.offer(mill, flour, dec!(1), dec!(3));
    app.offer(mill, sugar, dec!(1), dec!(4));
    let order_id = app
        .confirmed_order(mill, &[(flour, dec!(10)), (sugar, dec!(5))], Decimal::ZERO)
        .id_typed();

    let first = app
        .service
        .receive(
            &app.staff,
            order_id,
            delivery(vec![receipt(1, dec!(10)), receipt(2, dec!(3))]),
        )
        .unwrap();
    assert_eq!(first.order.status(), PurchaseOrderStatus::PartiallyDelivered);
    assert!(first.bill.is_none());
    assert_eq!(app.stock(flour), dec!(10));
    assert_eq!(app.stock(sugar), dec!(3));

    let second = app
        .service
        .receive(&app.staff, order_id, delivery(vec![receipt(2, dec!(2))]))
        .unwrap();
    assert_eq!(second.order.status(), PurchaseOrderStatus::Delivered);
    assert!(second.warnings.is_empty());
    let bill = second.bill.unwrap();
    assert_eq!(bill.total_amount(), dec!(50));
    assert_eq!(bill.purchase_order_id(), Some(order_id));
    assert_eq!(bill.payment_terms(), PaymentTerms::Net30);
    assert_eq!(app.stock(sugar), dec!(5));

    assert_eq!(app.service.list_bills(&app.manager, None).unwrap().len(), 1);
    let err = app
        .service
        .generate_bill(&app.manager, order_id, &Default::default())
        .unwrap_err();
    assert!(matches!(err, ProcurementError::Conflict(_)));

    let err = app
        .service
        .receive(&app.staff, order_id, delivery(vec![receipt(1, dec!(1))]))
        .unwrap_err();
    assert!(matches!(err, ProcurementError::Conflict(_)));
}

#[test]
fn closing_short_bills_what_arrived() {
    let app = TestApp::new();
    let oil = app.ingredient("Olive oil", "l");
    let grove = app.supplier("Grove");
    app.offer(grove, oil, dec!(1), dec!(10));
    let order_id = app
        .confirmed_order(grove, &[(oil, dec!(10))], dec!(0.10))
        .id_typed();

    let mut short = delivery(vec![receipt(1, dec!(6))]);
    short.close_partial = true;
    let outcome = app.service.receive(&app.staff, order_id, short).unwrap();

    assert_eq!(outcome.order.status(), PurchaseOrderStatus::Delivered);
    assert!(outcome.order.receiving_closed());
    let bill = outcome.bill.unwrap();
    assert_eq!(bill.amounts().subtotal, dec!(60));
    assert_eq!(bill.amounts().tax_amount, dec!(6));
    assert_eq!(bill.total_amount(), dec!(66));
}

#[test]
fn only_confirmed_orders_can_be_received() {
    let app = TestApp::new();
    let flour = app.ingredient("Flour", "kg");
    let mill = app.supplier("Mill & Co");
    app.offer(mill, flour, dec!(1), dec!(3));

    let draft = app.draft_order(mill, &[(flour, dec!(1))], Decimal::ZERO).id_typed();
    let pending = app.draft_order(mill, &[(flour, dec!(1))], Decimal::ZERO).id_typed();
    app.service.submit_for_approval(&app.staff, pending).unwrap();
    let sent = app.draft_order(mill, &[(flour, dec!(1))], Decimal::ZERO).id_typed();
    app.service.submit_for_approval(&app.staff, sent).unwrap();
    app.service.approve_and_send(&app.manager, sent).unwrap();
    let cancelled = app.draft_order(mill, &[(flour, dec!(1))], Decimal::ZERO).id_typed();
    app.service
        .cancel_purchase_order(&app.manager, cancelled, "duplicate")
        .unwrap();

    for order_id in [draft, pending, sent, cancelled] {
        let err = app
            .service
            .receive(&app.staff, order_id, delivery(vec![receipt(1, dec!(1))]))
            .unwrap_err();
        assert!(matches!(err, ProcurementError::Conflict(_)), "{err:?}");
    }
    assert_eq!(app.stock(flour), Decimal::ZERO);
}

#[test]
fn over_delivery_follows_policy() {
    let app = TestApp::new();
    let flour = app.ingredient("Flour", "kg");
    let mill = app.supplier("Mill & Co");
    app.offer(mill, flour, dec!(1), dec!(3));
    let order_id = app
        .confirmed_order(mill, &[(flour, dec!(4))], Decimal::ZERO)
        .id_typed();

    let err = app
        .service
        .receive(&app.staff, order_id, delivery(vec![receipt(1, dec!(5))]))
        .unwrap_err();
    assert!(matches!(err, ProcurementError::Validation(_)));
    assert_eq!(app.stock(flour), Decimal::ZERO);
    assert_eq!(app.order(order_id).status(), PurchaseOrderStatus::Confirmed);

    let mut settings = test_settings();
    settings.allow_over_delivery = true;
    let lenient = TestApp::with_settings(settings);
    let flour = lenient.ingredient("Flour", "kg");
    let mill = lenient.supplier("Mill & Co");
    lenient.offer(mill, flour, dec!(1), dec!(3));
    let order_id = lenient
        .confirmed_order(mill, &[(flour, dec!(4))], Decimal::ZERO)
        .id_typed();
    let outcome = lenient
        .service
        .receive(&lenient.staff, order_id, delivery(vec![receipt(1, dec!(5))]))
        .unwrap();
    assert_eq!(outcome.order.status(), PurchaseOrderStatus::Delivered);
    assert_eq!(lenient.stock(flour), dec!(5));
}

#[test]
fn manual_delivery_creates_each_new_ingredient_once() {
    let app = TestApp::new();
    let sugar = app.ingredient("Sugar", "kg");

    let item = |name: &str, packages: Decimal, price: Decimal| ManualItem {
        ingredient_name: name.to_string(),
        base_unit: "kg".to_string(),
        packages,
        package_contents_quantity: dec!(2),
        package_price: price,
    };
    let outcome = app
        .service
        .manual_receive(
            &app.staff,
            ManualDelivery {
                supplier_name: "Saturday market".to_string(),
                supplier_contact: None,
                items: vec![
                    item("Lemons", dec!(3), dec!(4)),
                    item(" lemons ", dec!(1), dec!(4)),
                    item("sugar", dec!(2), dec!(5)),
                ],
                tax_rate: Decimal::ZERO,
                discount_amount: Decimal::ZERO,
                delivery_date: None,
                condition: DeliveryCondition::Fair,
                notes: None,
            },
        )
        .unwrap();

    let lemons = ingredient_id_for_name(app.manager.restaurant_id, "LEMONS");
    assert_eq!(app.stock(lemons), dec!(8));
    assert_eq!(app.stock(sugar), dec!(4));
    assert_eq!(app.service.list_ingredients(&app.manager).len(), 2);

    assert_eq!(outcome.order.status(), PurchaseOrderStatus::Delivered);
    assert!(matches!(
        outcome.order.supplier(),
        Some(SupplierRef::External { name, .. }) if name == "Saturday market"
    ));
    assert_eq!(outcome.inventory_updates.len(), 3);

    let bill = outcome.bill.unwrap();
    assert_eq!(bill.total_amount(), dec!(26));
    assert_eq!(bill.supplier_id(), None);
    assert_eq!(bill.payment_terms(), PaymentTerms::Net30);
}

#[test]
fn manual_delivery_rejects_incomplete_items() {
    let app = TestApp::new();
    let err = app
        .service
        .manual_receive(
            &app.staff,
            ManualDelivery {
                supplier_name: "Saturday market".to_string(),
                supplier_contact: None,
                items: vec![ManualItem {
                    ingredient_name: "Lemons".to_string(),
                    base_unit: "kg".to_string(),
                    packages: dec!(1),
                    package_contents_quantity: Decimal::ZERO,
                    package_price: dec!(4),
                }],
                tax_rate: Decimal::ZERO,
                discount_amount: Decimal::ZERO,
                delivery_date: None,
                condition: DeliveryCondition::Good,
                notes: None,
            },
        )
        .unwrap_err();

    assert!(matches!(err, ProcurementError::Validation(_)));
    assert!(app.service.list_ingredients(&app.manager).is_empty());
}

/// In-memory store whose bill ledger is offline.
#[derive(Debug, Default)]
struct BillLedgerOffline {
    inner: InMemoryEventStore,
}

impl EventStore for BillLedgerOffline {
    fn commit(&self, appends: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        if appends
            .iter()
            .any(|a| a.aggregate_type == SupplierBill::AGGREGATE_TYPE)
        {
            return Err(EventStoreError::Unavailable("bill ledger offline".to_string()));
        }
        self.inner.commit(appends)
    }

    fn load_stream(
        &self,
        restaurant_id: RestaurantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.inner.load_stream(restaurant_id, aggregate_id)
    }

    fn list_streams(
        &self,
        restaurant_id: RestaurantId,
        aggregate_type: &str,
    ) -> Result<Vec<AggregateId>, EventStoreError> {
        self.inner.list_streams(restaurant_id, aggregate_type)
    }
}

#[test]
fn failed_billing_keeps_the_delivery_and_warns() {
    let notifier = Arc::new(CapturingNotifier::default());
    let service = Procurement::new(
        Arc::new(BillLedgerOffline::default()),
        Arc::new(EnvelopeBus::new()),
        test_settings(),
        notifier.clone(),
        Arc::new(FixedClock::new(start_of_march())),
    )
    .unwrap();
    let manager = galley_core::Caller::new(
        galley_core::UserId::new(),
        RestaurantId::new(),
        galley_core::StaffRole::Manager,
    );

    let flour = service
        .create_ingredient(
            &manager,
            NewIngredient {
                name: "Flour".to_string(),
                base_unit: "kg".to_string(),
                reorder_level: None,
            },
        )
        .unwrap()
        .id_typed();
    let mill = service
        .register_supplier(
            &manager,
            NewSupplier {
                name: "Mill & Co".to_string(),
                contact: None,
                payment_terms: None,
            },
        )
        .unwrap()
        .id_typed();
    service
        .upsert_offering(
            &manager,
            mill,
            SupplierOffering {
                ingredient_id: flour,
                package_unit: "sack".to_string(),
                package_contents_quantity: dec!(25),
                package_price: dec!(30),
                lead_time_days: 1,
                minimum_order_quantity: dec!(1),
                maximum_order_quantity: None,
                active: true,
            },
        )
        .unwrap();
    let order_id = service
        .create_purchase_order(
            &manager,
            galley_procurement::NewPurchaseOrder {
                supplier: galley_procurement::OrderSupplier::Linked { supplier_id: mill },
                order_date: None,
                expected_delivery_date: None,
                items: vec![galley_procurement::NewPurchaseItem {
                    ingredient_id: flour,
                    quantity: dec!(2),
                    unit_price: None,
                    package_contents_quantity: None,
                }],
                tax_rate: Decimal::ZERO,
                discount_amount: Decimal::ZERO,
                notes: None,
            },
        )
        .unwrap()
        .id_typed();
    service.submit_for_approval(&manager, order_id).unwrap();
    let sent = service.approve_and_send(&manager, order_id).unwrap();
    service
        .supplier_respond(
            manager.restaurant_id,
            order_id,
            &sent.links.confirm_token,
            galley_purchasing::SupplierResponse::Confirm,
        )
        .unwrap();

    let outcome = service
        .receive(&manager, order_id, delivery(vec![receipt(1, dec!(2))]))
        .unwrap();

    assert_eq!(outcome.order.status(), PurchaseOrderStatus::Delivered);
    assert!(outcome.bill.is_none());
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].code, "bill_generation_failed");
    assert!(notifier.last("bill.generation_failed").is_some());

    let flour_now = service.get_ingredient(&manager, flour).unwrap();
    assert_eq!(flour_now.current_stock(), dec!(50));
    assert!(service.list_bills(&manager, Some(BillStatus::Pending)).unwrap().is_empty());
}

fn market_delivery(package_price: Decimal) -> ManualDelivery {
    ManualDelivery {
        supplier_name: "Saturday market".to_string(),
        supplier_contact: None,
        items: vec![ManualItem {
            ingredient_name: "Herbs".to_string(),
            base_unit: "bunch".to_string(),
            packages: dec!(3),
            package_contents_quantity: dec!(1),
            package_price,
        }],
        tax_rate: Decimal::ZERO,
        discount_amount: Decimal::ZERO,
        delivery_date: None,
        condition: DeliveryCondition::Good,
        notes: None,
    }
}

#[test]
fn manual_delivery_with_an_unrepresentable_total_is_rejected() {
    let app = TestApp::new();
    let err = app
        .service
        .manual_receive(&app.staff, market_delivery(Decimal::MAX / dec!(2)))
        .unwrap_err();

    assert_eq!(err, ProcurementError::validation("amount out of range"));
    assert!(app.service.list_ingredients(&app.manager).is_empty());
    assert!(app.service.list_purchase_orders(&app.manager, None).unwrap().is_empty());
}

#[test]
fn free_delivery_is_billed_at_zero_and_left_pending() {
    let app = TestApp::new();
    let outcome = app
        .service
        .manual_receive(&app.staff, market_delivery(Decimal::ZERO))
        .unwrap();

    let herbs = ingredient_id_for_name(app.manager.restaurant_id, "herbs");
    assert_eq!(app.stock(herbs), dec!(3));

    let bill = outcome.bill.unwrap();
    assert_eq!(bill.total_amount(), Decimal::ZERO);
    assert_eq!(bill.outstanding_amount(), Decimal::ZERO);
    assert_eq!(bill.status(), BillStatus::Pending);
}
