mod common;

use rust_decimal_macros::dec;

use galley_core::AggregateId;
use galley_inventory::{DeductionReason, DishId, IngredientId, Recipe, RecipeLine};
use galley_procurement::{NewIngredient, ProcurementError, StockReceipt};

use common::{TestApp, test_settings};

fn opening_stock(app: &TestApp, ingredient_id: IngredientId, quantity: rust_decimal::Decimal) {
    app.service
        .receive_stock(
            &app.manager,
            ingredient_id,
            StockReceipt {
                quantity,
                packages: dec!(0),
                unit_cost: dec!(1.50),
            },
        )
        .unwrap();
}

#[test]
fn ingredient_names_are_unique_ignoring_case_and_padding() {
    let app = TestApp::new();
    app.ingredient("Tomatoes", "kg");

    let err = app
        .service
        .create_ingredient(
            &app.manager,
            NewIngredient {
                name: "  tomatoes ".to_string(),
                base_unit: "kg".to_string(),
                reorder_level: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, ProcurementError::Conflict(msg) if msg.contains("already exists")));

    let found = app.service.find_ingredient(&app.manager, "TOMATOES").unwrap();
    assert_eq!(found.name, "Tomatoes");
}

#[test]
fn manual_receipts_follow_the_moving_average() {
    let app = TestApp::new();
    let flour = app.ingredient("Flour", "kg");

    app.service
        .receive_stock(
            &app.manager,
            flour,
            StockReceipt {
                quantity: dec!(50),
                packages: dec!(10),
                unit_cost: dec!(2),
            },
        )
        .unwrap();
    let update = app
        .service
        .receive_stock(
            &app.manager,
            flour,
            StockReceipt {
                quantity: dec!(25),
                packages: dec!(5),
                unit_cost: dec!(4),
            },
        )
        .unwrap();

    assert_eq!(update.stock_before, dec!(50));
    assert_eq!(update.stock_after, dec!(75));
    assert_eq!(update.cost_before, dec!(2));
    assert_eq!(update.cost_after.round_dp(2), dec!(2.67));

    let summary = app.service.find_ingredient(&app.manager, "flour").unwrap();
    assert_eq!(summary.current_stock, dec!(75));
    assert_eq!(summary.packages, dec!(15));
}

#[test]
fn deduction_beyond_stock_is_rejected_and_changes_nothing() {
    let app = TestApp::new();
    let milk = app.ingredient("Milk", "l");
    opening_stock(&app, milk, dec!(4));

    let err = app
        .service
        .deduct_stock(&app.staff, milk, dec!(5), DeductionReason::Adjustment, None)
        .unwrap_err();
    assert_eq!(
        err,
        ProcurementError::InsufficientStock {
            requested: dec!(5),
            available: dec!(4),
        }
    );
    assert_eq!(app.stock(milk), dec!(4));
}

#[test]
fn negative_stock_is_allowed_when_configured() {
    let mut settings = test_settings();
    settings.allow_negative_stock = true;
    let app = TestApp::with_settings(settings);
    let milk = app.ingredient("Milk", "l");
    opening_stock(&app, milk, dec!(1));

    let deduction = app
        .service
        .deduct_stock(&app.staff, milk, dec!(3), DeductionReason::Sale, None)
        .unwrap();
    assert!(deduction.went_negative);
    assert_eq!(deduction.stock_after, dec!(-2));
}

#[test]
fn waste_requires_a_loss_reason() {
    let app = TestApp::new();
    let basil = app.ingredient("Basil", "g");
    opening_stock(&app, basil, dec!(200));

    let err = app
        .service
        .log_waste(&app.staff, basil, dec!(20), DeductionReason::Sale, None)
        .unwrap_err();
    assert!(matches!(err, ProcurementError::Validation(_)));

    let deduction = app
        .service
        .log_waste(
            &app.staff,
            basil,
            dec!(20),
            DeductionReason::Spoilage,
            Some("wilted".to_string()),
        )
        .unwrap();
    assert_eq!(deduction.stock_after, dec!(180));
}

#[test]
fn sale_consumes_every_ingredient_or_none() {
    let app = TestApp::new();
    let dough = app.ingredient("Dough", "g");
    let cheese = app.ingredient("Mozzarella", "g");
    opening_stock(&app, dough, dec!(1000));
    opening_stock(&app, cheese, dec!(150));

    let dish_id = DishId::new(AggregateId::new());
    let recipe = Recipe::new(
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
    .unwrap();
    app.service.register_recipe(&app.manager, recipe).unwrap();

    let deductions = app.service.consume_for_sale(&app.staff, dish_id, 1).unwrap();
    assert_eq!(deductions.len(), 2);
    assert_eq!(app.stock(dough), dec!(750));
    assert_eq!(app.stock(cheese), dec!(50));

    let err = app.service.consume_for_sale(&app.staff, dish_id, 2).unwrap_err();
    assert!(matches!(err, ProcurementError::InsufficientStock { .. }));
    assert_eq!(app.stock(dough), dec!(750));
    assert_eq!(app.stock(cheese), dec!(50));

    let err = app.service.consume_for_sale(&app.staff, dish_id, 0).unwrap_err();
    assert!(matches!(err, ProcurementError::Validation(_)));
}

#[test]
fn recipes_must_reference_known_ingredients() {
    let app = TestApp::new();
    let recipe = Recipe::new(
        DishId::new(AggregateId::new()),
        "Ghost soup",
        vec![RecipeLine {
            ingredient_id: IngredientId::new(AggregateId::new()),
            quantity_per_serving: dec!(1),
        }],
    )
    .unwrap();

    let err = app.service.register_recipe(&app.manager, recipe).unwrap_err();
    assert!(matches!(err, ProcurementError::NotFound(_)));
}

#[test]
fn low_stock_listing_follows_reorder_levels() {
    let app = TestApp::new();
    let eggs = app.ingredient("Eggs", "pc");
    let rice = app.ingredient("Rice", "kg");
    opening_stock(&app, eggs, dec!(12));
    opening_stock(&app, rice, dec!(40));
    app.service
        .set_reorder_level(&app.manager, eggs, Some(dec!(24)))
        .unwrap();
    app.service
        .set_reorder_level(&app.manager, rice, Some(dec!(10)))
        .unwrap();

    let low: Vec<String> = app
        .service
        .low_stock_ingredients(&app.manager)
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(low, vec!["Eggs".to_string()]);
}

#[test]
fn directory_rebuild_matches_the_event_streams() {
    let app = TestApp::new();
    let oil = app.ingredient("Olive oil", "l");
    opening_stock(&app, oil, dec!(6));

    app.service
        .rebuild_read_models(app.manager.restaurant_id)
        .unwrap();

    let listed = app.service.list_ingredients(&app.manager);
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].current_stock, dec!(6));
}

#[test]
fn restaurants_do_not_see_each_others_stock() {
    let app = TestApp::new();
    let salt = app.ingredient("Salt", "kg");
    let other = galley_core::Caller::new(
        galley_core::UserId::new(),
        galley_core::RestaurantId::new(),
        galley_core::StaffRole::Owner,
    );

    assert!(app.service.list_ingredients(&other).is_empty());
    let err = app.service.get_ingredient(&other, salt).unwrap_err();
    assert!(matches!(err, ProcurementError::NotFound(_)));
}

#[test]
fn unrepresentable_receipt_is_rejected_and_stock_is_untouched() {
    let app = TestApp::new();
    let rice = app.ingredient("Rice", "kg");
    opening_stock(&app, rice, dec!(10));

    let err = app
        .service
        .receive_stock(
            &app.manager,
            rice,
            StockReceipt {
                quantity: rust_decimal::Decimal::MAX / dec!(2),
                packages: dec!(1),
                unit_cost: dec!(5),
            },
        )
        .unwrap_err();

    assert_eq!(err, ProcurementError::validation("amount out of range"));
    assert_eq!(app.stock(rice), dec!(10));
    assert_eq!(
        app.service.get_ingredient(&app.manager, rice).unwrap().cost_per_unit(),
        dec!(1.50)
    );
}
