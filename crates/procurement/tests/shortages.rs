mod common;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use galley_core::AggregateId;
use galley_inventory::{DishId, IngredientId, Recipe, RecipeLine, Shortage};
use galley_procurement::{ProcurementError, StockReceipt};
use galley_purchasing::PurchaseOrderStatus;
use galley_suppliers::{SupplierOffering, SupplierStatus};

use common::TestApp;

fn short(ingredient_id: IngredientId, shortage: Decimal) -> Shortage {
    Shortage {
        ingredient_id,
        required: shortage,
        available: Decimal::ZERO,
        shortage,
    }
}

#[test]
fn availability_reports_each_short_ingredient() {
    let app = TestApp::new();
    let dough = app.ingredient("Dough", "g");
    let cheese = app.ingredient("Mozzarella", "g");
    for (id, quantity) in [(dough, dec!(600)), (cheese, dec!(1000))] {
        app.service
            .receive_stock(
                &app.manager,
                id,
                StockReceipt {
                    quantity,
                    packages: Decimal::ZERO,
                    unit_cost: dec!(0.01),
                },
            )
            .unwrap();
    }
    let dish_id = DishId::new(AggregateId::new());
    app.service
        .register_recipe(
            &app.manager,
            Recipe::new(
                dish_id,
                "Margherita",
                vec![
                    RecipeLine {
                        ingredient_id: dough,
                        quantity_per_serving: dec!(250),
                    },
                    RecipeLine {
                        ingredient_id: cheese,
                        quantity_per_serving: dec!(100),
                    },
                ],
            )
            .unwrap(),
        )
        .unwrap();

    let two = app.service.check_stock_availability(&app.staff, dish_id, 2).unwrap();
    assert!(two.available);
    assert!(two.shortages.is_empty());

    let three = app.service.check_stock_availability(&app.staff, dish_id, 3).unwrap();
    assert!(!three.available);
    assert_eq!(
        three.shortages,
        vec![Shortage {
            ingredient_id: dough,
            required: dec!(750),
            available: dec!(600),
            shortage: dec!(150),
        }]
    );
    // A check never moves stock.
    assert_eq!(app.stock(dough), dec!(600));

    let err = app
        .service
        .check_stock_availability(&app.staff, DishId::new(AggregateId::new()), 1)
        .unwrap_err();
    assert!(matches!(err, ProcurementError::NotFound(_)));
}

#[test]
fn shortages_become_one_draft_per_cheapest_supplier() {
    let app = TestApp::new();
    let flour = app.ingredient("Flour", "kg");
    let tomatoes = app.ingredient("Tomatoes", "kg");
    let yeast = app.ingredient("Yeast", "g");
    let basil = app.ingredient("Basil", "g");
    let truffle = app.ingredient("Truffle", "g");
    let oil = app.ingredient("Olive oil", "l");

    let mill = app.supplier("Mill & Co");
    app.offer(mill, flour, dec!(25), dec!(30));
    app.offer(mill, tomatoes, dec!(10), dec!(20));
    app.offer(mill, yeast, dec!(500), dec!(4));

    let market = app.supplier("Morning market");
    app.offer(market, tomatoes, dec!(5), dec!(9));
    app.service
        .upsert_offering(
            &app.manager,
            market,
            SupplierOffering {
                ingredient_id: oil,
                package_unit: "tin".to_string(),
                package_contents_quantity: dec!(1),
                package_price: dec!(15),
                lead_time_days: 1,
                minimum_order_quantity: dec!(1),
                maximum_order_quantity: Some(dec!(2)),
                active: true,
            },
        )
        .unwrap();

    let closed = app.supplier("Closed deli");
    app.offer(closed, truffle, dec!(50), dec!(90));
    app.service
        .set_supplier_status(&app.manager, closed, SupplierStatus::Inactive, None)
        .unwrap();

    let outcome = app
        .service
        .create_purchase_orders_from_shortages(
            &app.manager,
            &[
                short(flour, dec!(30)),
                short(tomatoes, dec!(12)),
                short(basil, dec!(40)),
                short(truffle, dec!(20)),
                short(yeast, Decimal::ZERO),
                short(oil, dec!(5)),
                short(yeast, dec!(100)),
            ],
        )
        .unwrap();

    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.orders.len(), 2);

    let from_mill = &outcome.orders[0];
    assert_eq!(from_mill.supplier_id(), Some(mill));
    assert_eq!(from_mill.status(), PurchaseOrderStatus::Draft);
    assert_eq!(from_mill.notes(), Some("Auto-generated from stock shortages"));
    let mill_lines: Vec<(IngredientId, Decimal)> = from_mill
        .lines()
        .iter()
        .map(|l| (l.ingredient_id, l.ordered_quantity))
        .collect();
    assert_eq!(mill_lines, vec![(flour, dec!(2)), (yeast, dec!(1))]);
    assert_eq!(from_mill.totals().subtotal, dec!(64));
    assert_eq!(from_mill.totals().tax_amount, dec!(6.40));
    assert_eq!(from_mill.totals().total_amount, dec!(70.40));

    let from_market = &outcome.orders[1];
    assert_eq!(from_market.supplier_id(), Some(market));
    assert_eq!(from_market.lines().len(), 1);
    assert_eq!(from_market.lines()[0].ingredient_id, tomatoes);
    assert_eq!(from_market.lines()[0].ordered_quantity, dec!(3));
    assert_eq!(from_market.lines()[0].unit_price, dec!(9));

    let skipped: Vec<(IngredientId, &str)> = outcome
        .skipped
        .iter()
        .map(|s| (s.ingredient_id, s.reason.as_str()))
        .collect();
    assert_eq!(skipped.len(), 4);
    assert_eq!(skipped[0], (basil, "no active supplier offering"));
    assert_eq!(skipped[1], (truffle, "no active supplier offering"));
    assert_eq!(skipped[2], (yeast, "shortage is not positive"));
    assert_eq!(skipped[3].0, oil);
    assert!(skipped[3].1.contains("exceeds the maximum"));
}

#[test]
fn no_orders_when_nothing_can_be_sourced() {
    let app = TestApp::new();
    let saffron = app.ingredient("Saffron", "g");

    let outcome = app
        .service
        .create_purchase_orders_from_shortages(&app.manager, &[short(saffron, dec!(2))])
        .unwrap();
    assert!(outcome.orders.is_empty());
    assert_eq!(outcome.skipped.len(), 1);
    assert!(app.service.list_purchase_orders(&app.manager, None).unwrap().is_empty());
}
