//! Stock availability checks and purchase orders drafted from shortages.

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value as JsonValue;

use galley_core::Caller;
use galley_events::{EventBus, EventEnvelope};
use galley_infra::EventStore;
use galley_inventory::{DishId, IngredientId, Shortage};
use galley_purchasing::PurchaseOrder;
use galley_suppliers::{Supplier, SupplierId, SupplierOffering};

use crate::error::ProcurementError;
use crate::lifecycle::{NewPurchaseItem, NewPurchaseOrder, OrderSupplier};
use crate::service::Procurement;

const SHORTAGE_ORDER_NOTE: &str = "Auto-generated from stock shortages";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub dish_id: DishId,
    pub servings: u32,
    /// True when no ingredient is short.
    pub available: bool,
    pub shortages: Vec<Shortage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedShortage {
    pub ingredient_id: IngredientId,
    pub shortage: Decimal,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortageFailure {
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    pub ingredient_ids: Vec<IngredientId>,
    pub error: ProcurementError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortageOrders {
    /// Draft orders, one per supplier, in the order suppliers were first chosen.
    pub orders: Vec<PurchaseOrder>,
    pub skipped: Vec<SkippedShortage>,
    pub failures: Vec<ShortageFailure>,
}

/// Items destined for one supplier.
struct SupplierBasket<'a> {
    supplier: &'a Supplier,
    items: Vec<NewPurchaseItem>,
}

/// Cheapest active offering across transacting suppliers; the first one wins ties.
fn cheapest_offering(
    suppliers: &[Supplier],
    ingredient_id: IngredientId,
) -> Option<(&Supplier, &SupplierOffering)> {
    let mut best: Option<(&Supplier, &SupplierOffering)> = None;
    for supplier in suppliers {
        let Some(offering) = supplier.active_offering(ingredient_id) else {
            continue;
        };
        if best.is_none_or(|(_, current)| offering.package_price < current.package_price) {
            best = Some((supplier, offering));
        }
    }
    best
}

impl<S, B> Procurement<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Compare a dish's requirements for `servings` against current stock.
    pub fn check_stock_availability(
        &self,
        caller: &Caller,
        dish_id: DishId,
        servings: u32,
    ) -> Result<Availability, ProcurementError> {
        let recipe = self.recipe(caller, dish_id)?;
        let mut shortages = Vec::new();
        for requirement in recipe.requirements(servings)? {
            let ingredient = self.get_ingredient(caller, requirement.ingredient_id)?;
            shortages.extend(Shortage::between(
                requirement.ingredient_id,
                requirement.required,
                ingredient.current_stock(),
            ));
        }

        Ok(Availability {
            dish_id,
            servings,
            available: shortages.is_empty(),
            shortages,
        })
    }

    /// Draft one purchase order per supplier covering the given shortages.
    ///
    /// Orders are created independently; a failing supplier does not undo the others.
    pub fn create_purchase_orders_from_shortages(
        &self,
        caller: &Caller,
        shortages: &[Shortage],
    ) -> Result<ShortageOrders, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        let suppliers: Vec<Supplier> = self
            .list_suppliers(caller)?
            .into_iter()
            .filter(Supplier::can_transact)
            .collect();

        let mut baskets: Vec<SupplierBasket<'_>> = Vec::new();
        let mut skipped = Vec::new();

        for shortage in shortages {
            let skip = |reason: String| SkippedShortage {
                ingredient_id: shortage.ingredient_id,
                shortage: shortage.shortage,
                reason,
            };
            if shortage.shortage <= Decimal::ZERO {
                skipped.push(skip("shortage is not positive".to_string()));
                continue;
            }
            let Some((supplier, offering)) = cheapest_offering(&suppliers, shortage.ingredient_id)
            else {
                skipped.push(skip("no active supplier offering".to_string()));
                continue;
            };

            let packages = match offering.packages_to_cover(shortage.shortage) {
                Ok(packages) => packages,
                Err(err) => {
                    skipped.push(skip(err.to_string()));
                    continue;
                }
            };
            if let Err(err) = offering.check_order_quantity(packages) {
                skipped.push(skip(err.to_string()));
                continue;
            }

            let item = NewPurchaseItem {
                ingredient_id: shortage.ingredient_id,
                quantity: packages,
                unit_price: Some(offering.package_price),
                package_contents_quantity: Some(offering.package_contents_quantity),
            };
            match baskets
                .iter_mut()
                .find(|b| b.supplier.id_typed() == supplier.id_typed())
            {
                Some(basket) => basket.items.push(item),
                None => baskets.push(SupplierBasket {
                    supplier,
                    items: vec![item],
                }),
            }
        }

        let mut orders = Vec::with_capacity(baskets.len());
        let mut failures = Vec::new();
        for basket in baskets {
            let supplier_id = basket.supplier.id_typed();
            let ingredient_ids: Vec<IngredientId> =
                basket.items.iter().map(|i| i.ingredient_id).collect();
            let new = NewPurchaseOrder {
                supplier: OrderSupplier::Linked { supplier_id },
                order_date: None,
                expected_delivery_date: None,
                items: basket.items,
                tax_rate: self.settings.shortage_tax_rate,
                discount_amount: Decimal::ZERO,
                notes: Some(SHORTAGE_ORDER_NOTE.to_string()),
            };
            match self.create_purchase_order(caller, new) {
                Ok(order) => orders.push(order),
                Err(error) => {
                    tracing::warn!(
                        %restaurant_id,
                        %supplier_id,
                        error = %error,
                        "shortage purchase order failed"
                    );
                    failures.push(ShortageFailure {
                        supplier_id,
                        supplier_name: basket.supplier.name().to_string(),
                        ingredient_ids,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            %restaurant_id,
            orders = orders.len(),
            skipped = skipped.len(),
            failures = failures.len(),
            "shortage purchase orders drafted"
        );
        Ok(ShortageOrders {
            orders,
            skipped,
            failures,
        })
    }
}
