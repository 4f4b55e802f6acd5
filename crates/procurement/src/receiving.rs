//! Receiving deliveries into stock.
//!
//! The order update, every ingredient receipt and any ingredient created on the
//! way commit in one transaction under row locks on all of them. Billing runs
//! afterwards in its own transaction.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use galley_billing::SupplierBill;
use galley_core::{AggregateId, Caller};
use galley_events::{EventBus, EventEnvelope};
use galley_infra::{EventStore, Tracked, Transaction};
use galley_inventory::{CreateIngredient, Ingredient, IngredientCommand, IngredientId, StockSource};
use galley_purchasing::{
    DeliveryCondition, LineReceipt, NewOrderLine, PurchaseOrder, PurchaseOrderCommand,
    PurchaseOrderEvent, PurchaseOrderId, PurchaseOrderStatus, ReceiveItems, RecordManualDelivery,
};

use crate::error::{ProcurementError, Warning};
use crate::service::{Procurement, make_ingredient, make_order};
use crate::stock::{InventoryUpdate, Receipt, ingredient_id_for_name, stage_receipt};

/// A delivery against a supplier-linked order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub items: Vec<LineReceipt>,
    /// Defaults to today.
    #[serde(default)]
    pub delivery_date: Option<NaiveDate>,
    pub condition: DeliveryCondition,
    /// Mark the order delivered even though some lines are short.
    #[serde(default)]
    pub close_partial: bool,
}

/// One line of a delivery that arrived without a purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualItem {
    /// Matched case-insensitively; unknown names become new ingredients.
    pub ingredient_name: String,
    /// Used only when the ingredient is created here.
    pub base_unit: String,
    pub packages: Decimal,
    pub package_contents_quantity: Decimal,
    pub package_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualDelivery {
    pub supplier_name: String,
    #[serde(default)]
    pub supplier_contact: Option<String>,
    pub items: Vec<ManualItem>,
    #[serde(default)]
    pub tax_rate: Decimal,
    #[serde(default)]
    pub discount_amount: Decimal,
    #[serde(default)]
    pub delivery_date: Option<NaiveDate>,
    pub condition: DeliveryCondition,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveOutcome {
    pub order: PurchaseOrder,
    pub inventory_updates: Vec<InventoryUpdate>,
    /// Present once the order is delivered and billing succeeded.
    pub bill: Option<SupplierBill>,
    pub warnings: Vec<Warning>,
}

/// Loaded ingredients of one transaction, one entry per stream.
struct Shelf {
    ingredients: Vec<Tracked<Ingredient>>,
}

impl Shelf {
    fn new() -> Self {
        Self {
            ingredients: Vec::new(),
        }
    }

    fn get_or_load<S, B>(
        &mut self,
        tx: &Transaction<'_, S, B>,
        ingredient_id: IngredientId,
    ) -> Result<&mut Tracked<Ingredient>, ProcurementError>
    where
        S: EventStore,
        B: EventBus<EventEnvelope<JsonValue>>,
    {
        let idx = match self
            .ingredients
            .iter()
            .position(|t| t.aggregate_id() == ingredient_id.0)
        {
            Some(idx) => idx,
            None => {
                self.ingredients.push(tx.load(ingredient_id.0, make_ingredient)?);
                self.ingredients.len() - 1
            }
        };
        Ok(&mut self.ingredients[idx])
    }
}

fn validate_manual(delivery: &ManualDelivery) -> Result<(), ProcurementError> {
    if delivery.supplier_name.trim().is_empty() {
        return Err(ProcurementError::validation("supplier name cannot be empty"));
    }
    if delivery.items.is_empty() {
        return Err(ProcurementError::validation("delivery needs at least one item"));
    }
    for item in &delivery.items {
        if item.ingredient_name.trim().is_empty() {
            return Err(ProcurementError::validation("ingredient name cannot be empty"));
        }
        if item.base_unit.trim().is_empty() {
            return Err(ProcurementError::validation(format!(
                "base unit is required for '{}'",
                item.ingredient_name.trim()
            )));
        }
        if item.packages <= Decimal::ZERO {
            return Err(ProcurementError::validation("package count must be positive"));
        }
        if item.package_contents_quantity <= Decimal::ZERO {
            return Err(ProcurementError::validation(
                "package contents quantity must be positive",
            ));
        }
        if item.package_price < Decimal::ZERO {
            return Err(ProcurementError::validation("package price cannot be negative"));
        }
    }
    Ok(())
}

impl<S, B> Procurement<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Receive (part of) a confirmed order into stock.
    pub fn receive(
        &self,
        caller: &Caller,
        order_id: PurchaseOrderId,
        delivery: Delivery,
    ) -> Result<ReceiveOutcome, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        let current = self.get_purchase_order(caller, order_id)?;
        let guard = self.lock(
            restaurant_id,
            current
                .lines()
                .iter()
                .map(|line| line.ingredient_id.0)
                .chain([order_id.0]),
        )?;

        let now = self.clock.now();
        let mut tx = self.dispatcher.begin(restaurant_id);
        let mut order = tx.load(order_id.0, make_order)?;
        let decided = tx.execute(
            &mut order,
            &PurchaseOrderCommand::ReceiveItems(ReceiveItems {
                restaurant_id,
                order_id,
                receipts: delivery.items,
                received_by: caller.user_id,
                delivery_date: delivery.delivery_date.unwrap_or_else(|| self.clock.today()),
                condition: delivery.condition,
                close_partial: delivery.close_partial,
                allow_over_delivery: self.settings.allow_over_delivery,
                occurred_at: now,
            }),
        )?;

        let mut shelf = Shelf::new();
        let mut inventory_updates = Vec::new();
        for event in decided {
            let PurchaseOrderEvent::ItemsReceived(received) = event else {
                continue;
            };
            for line in received.lines {
                let ingredient = shelf.get_or_load(&tx, line.ingredient_id)?;
                let update = stage_receipt(
                    &mut tx,
                    ingredient,
                    Receipt {
                        quantity: line.base_quantity()?,
                        packages: line.quantity,
                        unit_cost: line.unit_cost()?,
                        source: StockSource::PurchaseOrder(order_id.0),
                    },
                    now,
                )?;
                inventory_updates.push(update);
            }
        }
        self.commit(tx)?;
        drop(guard);

        let order = order.into_inner();
        tracing::info!(
            %restaurant_id,
            %order_id,
            status = %order.status(),
            ingredients = inventory_updates.len(),
            "delivery received"
        );

        let mut warnings = Vec::new();
        let bill = if order.status() == PurchaseOrderStatus::Delivered {
            self.bill_after_delivery(caller, order_id, &mut warnings)
        } else {
            None
        };

        Ok(ReceiveOutcome {
            order,
            inventory_updates,
            bill,
            warnings,
        })
    }

    /// Record a delivery that arrived without a purchase order.
    ///
    /// Creates a delivered order for an external supplier and any ingredient
    /// whose name is not known yet.
    pub fn manual_receive(
        &self,
        caller: &Caller,
        delivery: ManualDelivery,
    ) -> Result<ReceiveOutcome, ProcurementError> {
        validate_manual(&delivery)?;

        let restaurant_id = caller.restaurant_id;
        let order_id = PurchaseOrderId::new(AggregateId::new());
        let ingredient_ids: Vec<IngredientId> = delivery
            .items
            .iter()
            .map(|item| ingredient_id_for_name(restaurant_id, &item.ingredient_name))
            .collect();
        let guard = self.lock(
            restaurant_id,
            ingredient_ids.iter().map(|id| id.0).chain([order_id.0]),
        )?;

        let now = self.clock.now();
        let mut tx = self.dispatcher.begin(restaurant_id);
        let mut shelf = Shelf::new();
        let mut created = Vec::new();

        for (item, &ingredient_id) in delivery.items.iter().zip(&ingredient_ids) {
            let ingredient = shelf.get_or_load(&tx, ingredient_id)?;
            if ingredient.is_created() {
                continue;
            }
            let name = item.ingredient_name.trim().to_string();
            tx.execute(
                ingredient,
                &IngredientCommand::CreateIngredient(CreateIngredient {
                    restaurant_id,
                    ingredient_id,
                    name: name.clone(),
                    base_unit: item.base_unit.trim().to_string(),
                    reorder_level: None,
                    occurred_at: now,
                }),
            )?;
            created.push(name);
        }

        let lines = delivery
            .items
            .iter()
            .zip(&ingredient_ids)
            .map(|(item, &ingredient_id)| NewOrderLine {
                ingredient_id,
                ordered_quantity: item.packages,
                unit_price: item.package_price,
                package_contents_quantity: item.package_contents_quantity,
            })
            .collect();
        let mut order = tx.load(order_id.0, make_order)?;
        tx.execute(
            &mut order,
            &PurchaseOrderCommand::RecordManualDelivery(RecordManualDelivery {
                restaurant_id,
                order_id,
                supplier_name: delivery.supplier_name,
                supplier_contact: delivery.supplier_contact,
                lines,
                tax_rate: delivery.tax_rate,
                discount_amount: delivery.discount_amount,
                delivery_date: delivery.delivery_date.unwrap_or_else(|| self.clock.today()),
                condition: delivery.condition,
                received_by: caller.user_id,
                notes: delivery.notes,
                occurred_at: now,
            }),
        )?;

        let mut inventory_updates = Vec::with_capacity(order.lines().len());
        for line in order.lines() {
            let ingredient = shelf.get_or_load(&tx, line.ingredient_id)?;
            let update = stage_receipt(
                &mut tx,
                ingredient,
                Receipt {
                    quantity: line.base_quantity()?,
                    packages: line.ordered_quantity,
                    unit_cost: line.unit_cost()?,
                    source: StockSource::PurchaseOrder(order_id.0),
                },
                now,
            )?;
            inventory_updates.push(update);
        }
        self.commit(tx)?;
        drop(guard);

        let order = order.into_inner();
        tracing::info!(
            %restaurant_id,
            %order_id,
            supplier = %order.supplier().map(|s| s.name()).unwrap_or_default(),
            new_ingredients = ?created,
            ingredients = inventory_updates.len(),
            "manual delivery received"
        );

        let mut warnings = Vec::new();
        let bill = self.bill_after_delivery(caller, order_id, &mut warnings);
        Ok(ReceiveOutcome {
            order,
            inventory_updates,
            bill,
            warnings,
        })
    }
}
