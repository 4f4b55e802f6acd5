//! Inventory domain module (event-sourced).
//!
//! The [`Ingredient`] aggregate is the stock ledger: the only place where an
//! ingredient's quantity, package count and weighted-average unit cost change.
//! [`Recipe`] describes what a dish consumes and drives availability checks.

pub mod ingredient;
pub mod recipe;

pub use ingredient::{
    CreateIngredient, DeductStock, DeductionReason, Ingredient, IngredientCommand,
    IngredientCreated, IngredientEvent, IngredientId, ReceiveStock, ReorderLevelSet,
    SetReorderLevel, StockDeducted, StockReceived, StockSource, name_key,
    weighted_average_cost,
};
pub use recipe::{DishId, Recipe, RecipeLine, Requirement, Shortage};
