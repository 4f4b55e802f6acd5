use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use galley_core::money::in_range;
use galley_core::{Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, RestaurantId};
use galley_events::Event;

/// Ingredient identifier (restaurant-scoped via `restaurant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IngredientId(pub AggregateId);

impl IngredientId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for IngredientId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Lookup key for ingredient names: trimmed and lowercased.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Blend the cost of an incoming batch into the current moving average.
///
/// When there is no positive stock on hand the batch cost replaces the average.
/// The result keeps full decimal precision.
pub fn weighted_average_cost(
    current_stock: Decimal,
    current_cost: Decimal,
    batch_quantity: Decimal,
    batch_unit_cost: Decimal,
) -> DomainResult<Decimal> {
    if current_stock <= Decimal::ZERO {
        return Ok(batch_unit_cost);
    }
    let new_stock = in_range(current_stock.checked_add(batch_quantity))?;
    let held_value = in_range(current_cost.checked_mul(current_stock))?;
    let batch_value = in_range(batch_unit_cost.checked_mul(batch_quantity))?;
    in_range(
        held_value
            .checked_add(batch_value)
            .and_then(|value| value.checked_div(new_stock)),
    )
}

/// Where received stock came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "order_id")]
pub enum StockSource {
    PurchaseOrder(AggregateId),
    Manual,
}

/// Why stock left the shelf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeductionReason {
    Sale,
    Waste,
    Damage,
    Spoilage,
    Adjustment,
}

impl DeductionReason {
    /// Reasons accepted by waste logging.
    pub fn is_loss(self) -> bool {
        matches!(
            self,
            DeductionReason::Waste | DeductionReason::Damage | DeductionReason::Spoilage
        )
    }
}

/// Aggregate root: Ingredient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ingredient {
    id: IngredientId,
    restaurant_id: Option<RestaurantId>,
    name: String,
    base_unit: String,
    current_stock: Decimal,
    packages: Decimal,
    cost_per_unit: Decimal,
    reorder_level: Option<Decimal>,
    version: u64,
    created: bool,
}

impl Ingredient {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: IngredientId) -> Self {
        Self {
            id,
            restaurant_id: None,
            name: String::new(),
            base_unit: String::new(),
            current_stock: Decimal::ZERO,
            packages: Decimal::ZERO,
            cost_per_unit: Decimal::ZERO,
            reorder_level: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> IngredientId {
        self.id
    }

    pub fn restaurant_id(&self) -> Option<RestaurantId> {
        self.restaurant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_unit(&self) -> &str {
        &self.base_unit
    }

    pub fn current_stock(&self) -> Decimal {
        self.current_stock
    }

    pub fn packages(&self) -> Decimal {
        self.packages
    }

    pub fn cost_per_unit(&self) -> Decimal {
        self.cost_per_unit
    }

    pub fn reorder_level(&self) -> Option<Decimal> {
        self.reorder_level
    }

    /// Stock is at or below the configured reorder level.
    pub fn is_low_stock(&self) -> bool {
        self.reorder_level
            .is_some_and(|level| self.current_stock <= level)
    }

    /// Value of stock on hand at the moving-average cost.
    pub fn stock_value(&self) -> DomainResult<Decimal> {
        in_range(self.current_stock.checked_mul(self.cost_per_unit))
    }
}

impl AggregateRoot for Ingredient {
    type Id = IngredientId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateIngredient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateIngredient {
    pub restaurant_id: RestaurantId,
    pub ingredient_id: IngredientId,
    pub name: String,
    pub base_unit: String,
    pub reorder_level: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveStock.
///
/// `quantity` is in base units; `unit_cost` is the base-unit cost of this batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveStock {
    pub restaurant_id: RestaurantId,
    pub ingredient_id: IngredientId,
    pub quantity: Decimal,
    pub packages: Decimal,
    pub unit_cost: Decimal,
    pub source: StockSource,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeductStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductStock {
    pub restaurant_id: RestaurantId,
    pub ingredient_id: IngredientId,
    pub quantity: Decimal,
    pub reason: DeductionReason,
    pub note: Option<String>,
    /// Policy switch: let the balance go below zero instead of failing.
    pub allow_negative: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetReorderLevel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetReorderLevel {
    pub restaurant_id: RestaurantId,
    pub ingredient_id: IngredientId,
    pub reorder_level: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngredientCommand {
    CreateIngredient(CreateIngredient),
    ReceiveStock(ReceiveStock),
    DeductStock(DeductStock),
    SetReorderLevel(SetReorderLevel),
}

/// Event: IngredientCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientCreated {
    pub restaurant_id: RestaurantId,
    pub ingredient_id: IngredientId,
    pub name: String,
    pub base_unit: String,
    pub reorder_level: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReceived.
///
/// Carries the resulting balance and moving-average cost so replays never
/// recompute the blend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReceived {
    pub restaurant_id: RestaurantId,
    pub ingredient_id: IngredientId,
    pub quantity: Decimal,
    pub packages: Decimal,
    pub unit_cost: Decimal,
    pub source: StockSource,
    pub stock_after: Decimal,
    pub packages_after: Decimal,
    pub cost_per_unit_after: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockDeducted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDeducted {
    pub restaurant_id: RestaurantId,
    pub ingredient_id: IngredientId,
    pub quantity: Decimal,
    pub reason: DeductionReason,
    pub note: Option<String>,
    pub stock_after: Decimal,
    pub went_negative: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReorderLevelSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderLevelSet {
    pub restaurant_id: RestaurantId,
    pub ingredient_id: IngredientId,
    pub reorder_level: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngredientEvent {
    IngredientCreated(IngredientCreated),
    StockReceived(StockReceived),
    StockDeducted(StockDeducted),
    ReorderLevelSet(ReorderLevelSet),
}

impl Event for IngredientEvent {
    fn event_type(&self) -> &'static str {
        match self {
            IngredientEvent::IngredientCreated(_) => "inventory.ingredient.created",
            IngredientEvent::StockReceived(_) => "inventory.ingredient.stock_received",
            IngredientEvent::StockDeducted(_) => "inventory.ingredient.stock_deducted",
            IngredientEvent::ReorderLevelSet(_) => "inventory.ingredient.reorder_level_set",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            IngredientEvent::IngredientCreated(e) => e.occurred_at,
            IngredientEvent::StockReceived(e) => e.occurred_at,
            IngredientEvent::StockDeducted(e) => e.occurred_at,
            IngredientEvent::ReorderLevelSet(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Ingredient {
    const AGGREGATE_TYPE: &'static str = "inventory.ingredient";

    type Command = IngredientCommand;
    type Event = IngredientEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            IngredientEvent::IngredientCreated(e) => {
                self.id = e.ingredient_id;
                self.restaurant_id = Some(e.restaurant_id);
                self.name = e.name.clone();
                self.base_unit = e.base_unit.clone();
                self.reorder_level = e.reorder_level;
                self.current_stock = Decimal::ZERO;
                self.packages = Decimal::ZERO;
                self.cost_per_unit = Decimal::ZERO;
                self.created = true;
            }
            IngredientEvent::StockReceived(e) => {
                self.current_stock = e.stock_after;
                self.packages = e.packages_after;
                self.cost_per_unit = e.cost_per_unit_after;
            }
            IngredientEvent::StockDeducted(e) => {
                self.current_stock = e.stock_after;
            }
            IngredientEvent::ReorderLevelSet(e) => {
                self.reorder_level = e.reorder_level;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            IngredientCommand::CreateIngredient(cmd) => self.handle_create(cmd),
            IngredientCommand::ReceiveStock(cmd) => self.handle_receive(cmd),
            IngredientCommand::DeductStock(cmd) => self.handle_deduct(cmd),
            IngredientCommand::SetReorderLevel(cmd) => self.handle_set_reorder_level(cmd),
        }
    }
}

impl Ingredient {
    fn ensure_tenant(&self, restaurant_id: RestaurantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.restaurant_id != Some(restaurant_id) {
            return Err(DomainError::invariant("restaurant mismatch"));
        }
        Ok(())
    }

    fn ensure_ingredient_id(&self, ingredient_id: IngredientId) -> Result<(), DomainError> {
        if self.id != ingredient_id {
            return Err(DomainError::invariant("ingredient_id mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(
        &self,
        restaurant_id: RestaurantId,
        ingredient_id: IngredientId,
    ) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("ingredient {ingredient_id}")));
        }
        self.ensure_tenant(restaurant_id)?;
        self.ensure_ingredient_id(ingredient_id)
    }

    fn handle_create(&self, cmd: &CreateIngredient) -> Result<Vec<IngredientEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("ingredient already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.base_unit.trim().is_empty() {
            return Err(DomainError::validation("base unit cannot be empty"));
        }
        if cmd.reorder_level.is_some_and(|l| l < Decimal::ZERO) {
            return Err(DomainError::validation("reorder level cannot be negative"));
        }

        Ok(vec![IngredientEvent::IngredientCreated(IngredientCreated {
            restaurant_id: cmd.restaurant_id,
            ingredient_id: cmd.ingredient_id,
            name: cmd.name.trim().to_string(),
            base_unit: cmd.base_unit.trim().to_string(),
            reorder_level: cmd.reorder_level,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &ReceiveStock) -> Result<Vec<IngredientEvent>, DomainError> {
        self.ensure_existing(cmd.restaurant_id, cmd.ingredient_id)?;

        if cmd.quantity <= Decimal::ZERO {
            return Err(DomainError::validation("received quantity must be positive"));
        }
        if cmd.packages < Decimal::ZERO {
            return Err(DomainError::validation("package count cannot be negative"));
        }
        if cmd.unit_cost < Decimal::ZERO {
            return Err(DomainError::validation("unit cost cannot be negative"));
        }

        let stock_after = in_range(self.current_stock.checked_add(cmd.quantity))?;
        let packages_after = in_range(self.packages.checked_add(cmd.packages))?;
        let cost_per_unit_after = weighted_average_cost(
            self.current_stock,
            self.cost_per_unit,
            cmd.quantity,
            cmd.unit_cost,
        )?;

        Ok(vec![IngredientEvent::StockReceived(StockReceived {
            restaurant_id: cmd.restaurant_id,
            ingredient_id: cmd.ingredient_id,
            quantity: cmd.quantity,
            packages: cmd.packages,
            unit_cost: cmd.unit_cost,
            source: cmd.source,
            stock_after,
            packages_after,
            cost_per_unit_after,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deduct(&self, cmd: &DeductStock) -> Result<Vec<IngredientEvent>, DomainError> {
        self.ensure_existing(cmd.restaurant_id, cmd.ingredient_id)?;

        if cmd.quantity <= Decimal::ZERO {
            return Err(DomainError::validation("deducted quantity must be positive"));
        }

        let stock_after = in_range(self.current_stock.checked_sub(cmd.quantity))?;
        let went_negative = stock_after < Decimal::ZERO;
        if went_negative && !cmd.allow_negative {
            return Err(DomainError::InsufficientStock {
                requested: cmd.quantity,
                available: self.current_stock,
            });
        }

        Ok(vec![IngredientEvent::StockDeducted(StockDeducted {
            restaurant_id: cmd.restaurant_id,
            ingredient_id: cmd.ingredient_id,
            quantity: cmd.quantity,
            reason: cmd.reason,
            note: cmd.note.clone(),
            stock_after,
            went_negative,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_reorder_level(
        &self,
        cmd: &SetReorderLevel,
    ) -> Result<Vec<IngredientEvent>, DomainError> {
        self.ensure_existing(cmd.restaurant_id, cmd.ingredient_id)?;

        if cmd.reorder_level.is_some_and(|l| l < Decimal::ZERO) {
            return Err(DomainError::validation("reorder level cannot be negative"));
        }
        if cmd.reorder_level == self.reorder_level {
            return Ok(vec![]);
        }

        Ok(vec![IngredientEvent::ReorderLevelSet(ReorderLevelSet {
            restaurant_id: cmd.restaurant_id,
            ingredient_id: cmd.ingredient_id,
            reorder_level: cmd.reorder_level,
            occurred_at: cmd.occurred_at,
        })])
    }
}
