//! Stock ledger operations: ingredients, manual stock movements, recipes and sales.
//!
//! Every path that changes an ingredient's stock holds that ingredient's row
//! lock from load to commit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use galley_core::{AggregateId, Caller, RestaurantId};
use galley_events::{EventBus, EventEnvelope};
use galley_infra::projections::IngredientSummary;
use galley_infra::read_model::RestaurantStore;
use galley_infra::{EventStore, Tracked, Transaction};
use galley_inventory::{
    CreateIngredient, DeductStock, DeductionReason, DishId, Ingredient, IngredientCommand,
    IngredientId, ReceiveStock, Recipe, SetReorderLevel, StockSource, name_key,
};

use crate::error::ProcurementError;
use crate::service::{Procurement, make_ingredient};

/// Ingredient id for a name, unique per restaurant up to case and surrounding whitespace.
pub fn ingredient_id_for_name(restaurant_id: RestaurantId, name: &str) -> IngredientId {
    IngredientId::new(AggregateId::for_key(
        restaurant_id,
        &format!("ingredient:{}", name_key(name)),
    ))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIngredient {
    pub name: String,
    pub base_unit: String,
    #[serde(default)]
    pub reorder_level: Option<Decimal>,
}

/// A stock receipt outside purchasing (opening balance, correction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReceipt {
    /// Base-unit quantity.
    pub quantity: Decimal,
    #[serde(default)]
    pub packages: Decimal,
    pub unit_cost: Decimal,
}

/// Effect of one receipt on one ingredient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryUpdate {
    pub ingredient_id: IngredientId,
    pub name: String,
    pub base_quantity_added: Decimal,
    pub packages_added: Decimal,
    pub stock_before: Decimal,
    pub stock_after: Decimal,
    pub cost_before: Decimal,
    pub cost_after: Decimal,
    pub low_stock: bool,
}

/// Effect of one deduction on one ingredient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockDeduction {
    pub ingredient_id: IngredientId,
    pub name: String,
    pub quantity: Decimal,
    pub reason: DeductionReason,
    pub stock_before: Decimal,
    pub stock_after: Decimal,
    pub went_negative: bool,
    pub low_stock: bool,
}

pub(crate) struct Receipt {
    pub quantity: Decimal,
    pub packages: Decimal,
    pub unit_cost: Decimal,
    pub source: StockSource,
}

/// Stage a receipt against an already loaded ingredient.
pub(crate) fn stage_receipt<S, B>(
    tx: &mut Transaction<'_, S, B>,
    ingredient: &mut Tracked<Ingredient>,
    receipt: Receipt,
    occurred_at: DateTime<Utc>,
) -> Result<InventoryUpdate, ProcurementError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let stock_before = ingredient.current_stock();
    let cost_before = ingredient.cost_per_unit();
    let command = IngredientCommand::ReceiveStock(ReceiveStock {
        restaurant_id: tx.restaurant_id(),
        ingredient_id: ingredient.id_typed(),
        quantity: receipt.quantity,
        packages: receipt.packages,
        unit_cost: receipt.unit_cost,
        source: receipt.source,
        occurred_at,
    });
    tx.execute(ingredient, &command)?;

    Ok(InventoryUpdate {
        ingredient_id: ingredient.id_typed(),
        name: ingredient.name().to_string(),
        base_quantity_added: receipt.quantity,
        packages_added: receipt.packages,
        stock_before,
        stock_after: ingredient.current_stock(),
        cost_before,
        cost_after: ingredient.cost_per_unit(),
        low_stock: ingredient.is_low_stock(),
    })
}

fn stage_deduction<S, B>(
    tx: &mut Transaction<'_, S, B>,
    ingredient: &mut Tracked<Ingredient>,
    command: DeductStock,
) -> Result<StockDeduction, ProcurementError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let stock_before = ingredient.current_stock();
    let (quantity, reason) = (command.quantity, command.reason);
    tx.execute(ingredient, &IngredientCommand::DeductStock(command))?;

    Ok(StockDeduction {
        ingredient_id: ingredient.id_typed(),
        name: ingredient.name().to_string(),
        quantity,
        reason,
        stock_before,
        stock_after: ingredient.current_stock(),
        went_negative: ingredient.current_stock() < Decimal::ZERO,
        low_stock: ingredient.is_low_stock(),
    })
}

impl<S, B> Procurement<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn create_ingredient(
        &self,
        caller: &Caller,
        new: NewIngredient,
    ) -> Result<Ingredient, ProcurementError> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(ProcurementError::validation("ingredient name cannot be empty"));
        }

        let restaurant_id = caller.restaurant_id;
        let ingredient_id = ingredient_id_for_name(restaurant_id, &name);
        let _guard = self.lock(restaurant_id, [ingredient_id.0])?;

        let command = IngredientCommand::CreateIngredient(CreateIngredient {
            restaurant_id,
            ingredient_id,
            name: name.clone(),
            base_unit: new.base_unit,
            reorder_level: new.reorder_level,
            occurred_at: self.clock.now(),
        });
        let ingredient = self
            .run(restaurant_id, ingredient_id.0, &command, make_ingredient)
            .map_err(|err| match err {
                ProcurementError::Conflict(_) => {
                    ProcurementError::conflict(format!("ingredient '{name}' already exists"))
                }
                other => other,
            })?;

        tracing::info!(%restaurant_id, %ingredient_id, name = %name, "ingredient created");
        Ok(ingredient)
    }

    pub fn set_reorder_level(
        &self,
        caller: &Caller,
        ingredient_id: IngredientId,
        reorder_level: Option<Decimal>,
    ) -> Result<Ingredient, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        let _guard = self.lock(restaurant_id, [ingredient_id.0])?;
        let command = IngredientCommand::SetReorderLevel(SetReorderLevel {
            restaurant_id,
            ingredient_id,
            reorder_level,
            occurred_at: self.clock.now(),
        });
        self.run(restaurant_id, ingredient_id.0, &command, make_ingredient)
    }

    /// Receive stock that did not come through a purchase order.
    pub fn receive_stock(
        &self,
        caller: &Caller,
        ingredient_id: IngredientId,
        receipt: StockReceipt,
    ) -> Result<InventoryUpdate, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        let _guard = self.lock(restaurant_id, [ingredient_id.0])?;

        let mut tx = self.dispatcher.begin(restaurant_id);
        let mut ingredient = tx.load(ingredient_id.0, make_ingredient)?;
        let update = stage_receipt(
            &mut tx,
            &mut ingredient,
            Receipt {
                quantity: receipt.quantity,
                packages: receipt.packages,
                unit_cost: receipt.unit_cost,
                source: StockSource::Manual,
            },
            self.clock.now(),
        )?;
        self.commit(tx)?;

        tracing::info!(
            %restaurant_id,
            %ingredient_id,
            quantity = %update.base_quantity_added,
            stock_after = %update.stock_after,
            "stock received"
        );
        Ok(update)
    }

    pub fn deduct_stock(
        &self,
        caller: &Caller,
        ingredient_id: IngredientId,
        quantity: Decimal,
        reason: DeductionReason,
        note: Option<String>,
    ) -> Result<StockDeduction, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        let _guard = self.lock(restaurant_id, [ingredient_id.0])?;

        let mut tx = self.dispatcher.begin(restaurant_id);
        let mut ingredient = tx.load(ingredient_id.0, make_ingredient)?;
        let deduction = stage_deduction(
            &mut tx,
            &mut ingredient,
            DeductStock {
                restaurant_id,
                ingredient_id,
                quantity,
                reason,
                note,
                allow_negative: self.settings.allow_negative_stock,
                occurred_at: self.clock.now(),
            },
        )?;
        self.commit(tx)?;

        if deduction.went_negative {
            tracing::warn!(%restaurant_id, %ingredient_id, stock_after = %deduction.stock_after, "stock went negative");
        }
        Ok(deduction)
    }

    /// Deduct stock lost to waste, damage or spoilage.
    pub fn log_waste(
        &self,
        caller: &Caller,
        ingredient_id: IngredientId,
        quantity: Decimal,
        reason: DeductionReason,
        note: Option<String>,
    ) -> Result<StockDeduction, ProcurementError> {
        if !reason.is_loss() {
            return Err(ProcurementError::validation(
                "waste must be logged as waste, damage or spoilage",
            ));
        }
        let deduction = self.deduct_stock(caller, ingredient_id, quantity, reason, note)?;
        tracing::info!(
            restaurant_id = %caller.restaurant_id,
            %ingredient_id,
            quantity = %quantity,
            reason = ?reason,
            "waste logged"
        );
        Ok(deduction)
    }

    /// Register (or replace) the recipe of a dish. Every ingredient must exist.
    pub fn register_recipe(&self, caller: &Caller, recipe: Recipe) -> Result<(), ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        for line in recipe.lines() {
            let ingredient = self
                .dispatcher
                .load(restaurant_id, line.ingredient_id.0, make_ingredient)?;
            if !ingredient.is_created() {
                return Err(ProcurementError::not_found(format!(
                    "ingredient {}",
                    line.ingredient_id
                )));
            }
        }

        tracing::debug!(%restaurant_id, dish_id = %recipe.dish_id(), "recipe registered");
        self.recipes.upsert(restaurant_id, recipe.dish_id(), recipe);
        Ok(())
    }

    pub fn recipe(&self, caller: &Caller, dish_id: DishId) -> Result<Recipe, ProcurementError> {
        self.recipes
            .get(caller.restaurant_id, &dish_id)
            .ok_or_else(|| ProcurementError::not_found(format!("dish {dish_id}")))
    }

    /// Deduct every recipe ingredient for `servings`, all or nothing.
    pub fn consume_for_sale(
        &self,
        caller: &Caller,
        dish_id: DishId,
        servings: u32,
    ) -> Result<Vec<StockDeduction>, ProcurementError> {
        if servings == 0 {
            return Err(ProcurementError::validation("servings must be positive"));
        }
        let restaurant_id = caller.restaurant_id;
        let recipe = self.recipe(caller, dish_id)?;
        let requirements = recipe.requirements(servings)?;

        let _guard = self.lock(restaurant_id, requirements.iter().map(|r| r.ingredient_id.0))?;
        let now = self.clock.now();
        let mut tx = self.dispatcher.begin(restaurant_id);
        let mut deductions = Vec::with_capacity(requirements.len());

        for requirement in &requirements {
            let mut ingredient = tx.load(requirement.ingredient_id.0, make_ingredient)?;
            let deduction = stage_deduction(
                &mut tx,
                &mut ingredient,
                DeductStock {
                    restaurant_id,
                    ingredient_id: requirement.ingredient_id,
                    quantity: requirement.required,
                    reason: DeductionReason::Sale,
                    note: Some(format!("{} × {servings}", recipe.dish_name())),
                    allow_negative: self.settings.allow_negative_stock,
                    occurred_at: now,
                },
            )?;
            deductions.push(deduction);
        }
        self.commit(tx)?;

        tracing::info!(
            %restaurant_id,
            %dish_id,
            servings,
            ingredients = deductions.len(),
            "sale consumed stock"
        );
        Ok(deductions)
    }

    pub fn get_ingredient(
        &self,
        caller: &Caller,
        ingredient_id: IngredientId,
    ) -> Result<Ingredient, ProcurementError> {
        let ingredient = self
            .dispatcher
            .load(caller.restaurant_id, ingredient_id.0, make_ingredient)?
            .into_inner();
        if !ingredient.is_created() {
            return Err(ProcurementError::not_found(format!("ingredient {ingredient_id}")));
        }
        Ok(ingredient)
    }

    /// Ingredients ordered by name.
    pub fn list_ingredients(&self, caller: &Caller) -> Vec<IngredientSummary> {
        self.directory.list(caller.restaurant_id)
    }

    pub fn find_ingredient(&self, caller: &Caller, name: &str) -> Option<IngredientSummary> {
        self.directory.find_by_name(caller.restaurant_id, name)
    }

    /// Ingredients at or below their reorder level.
    pub fn low_stock_ingredients(&self, caller: &Caller) -> Vec<IngredientSummary> {
        self.directory.low_stock(caller.restaurant_id)
    }
}
