//! Purchase order lifecycle: drafting, approval, supplier response, cancellation.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use galley_core::{AggregateId, Caller, RestaurantId};
use galley_events::{EventBus, EventEnvelope};
use galley_infra::EventStore;
use galley_inventory::IngredientId;
use galley_purchasing::{
    ApproveAndSend, CancelPurchaseOrder, CreatePurchaseOrder, DeletePurchaseOrder, NewOrderLine,
    PurchaseOrder, PurchaseOrderCommand, PurchaseOrderId, PurchaseOrderStatus,
    RecordSupplierResponse, SubmitForApproval, SupplierLinks, SupplierRef, SupplierResponse,
    UpdatePurchaseOrder,
};
use galley_suppliers::{Supplier, SupplierId};

use crate::error::{ProcurementError, Warning};
use crate::notify::{
    PURCHASE_ORDER_SENT, PURCHASE_ORDER_SUBMITTED, PURCHASE_ORDER_SUPPLIER_RESPONDED,
};
use crate::service::{Procurement, make_ingredient, make_order, make_supplier};

/// Who a new order is placed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OrderSupplier {
    Linked { supplier_id: SupplierId },
    External {
        name: String,
        #[serde(default)]
        contact: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchaseItem {
    pub ingredient_id: IngredientId,
    /// Packages ordered.
    pub quantity: Decimal,
    /// Price per package. Linked orders default to the offering's price.
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    /// Required for external orders; linked orders take it from the offering.
    #[serde(default)]
    pub package_contents_quantity: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchaseOrder {
    pub supplier: OrderSupplier,
    /// Defaults to today.
    #[serde(default)]
    pub order_date: Option<NaiveDate>,
    #[serde(default)]
    pub expected_delivery_date: Option<NaiveDate>,
    pub items: Vec<NewPurchaseItem>,
    #[serde(default)]
    pub tax_rate: Decimal,
    #[serde(default)]
    pub discount_amount: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Partial update of a draft or pending order; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderChanges {
    pub expected_delivery_date: Option<NaiveDate>,
    pub items: Option<Vec<NewPurchaseItem>>,
    pub tax_rate: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTransition {
    pub order: PurchaseOrder,
    pub warnings: Vec<Warning>,
}

/// Result of approving an order: the signed links handed to the supplier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentOrder {
    pub order: PurchaseOrder,
    pub links: SupplierLinks,
    pub warnings: Vec<Warning>,
}

fn resolve_linked_line(
    supplier: &Supplier,
    item: &NewPurchaseItem,
) -> Result<NewOrderLine, ProcurementError> {
    let offering = supplier.active_offering(item.ingredient_id).ok_or_else(|| {
        ProcurementError::validation(format!(
            "supplier '{}' does not offer ingredient {}",
            supplier.name(),
            item.ingredient_id
        ))
    })?;
    offering
        .check_order_quantity(item.quantity)
        .map_err(|err| ProcurementError::validation(err.to_string()))?;

    Ok(NewOrderLine {
        ingredient_id: item.ingredient_id,
        ordered_quantity: item.quantity,
        unit_price: item.unit_price.unwrap_or(offering.package_price),
        package_contents_quantity: offering.package_contents_quantity,
    })
}

fn resolve_external_line(item: &NewPurchaseItem) -> Result<NewOrderLine, ProcurementError> {
    let unit_price = item.unit_price.ok_or_else(|| {
        ProcurementError::validation(format!(
            "unit price is required for ingredient {} on an external order",
            item.ingredient_id
        ))
    })?;
    let package_contents_quantity = item.package_contents_quantity.ok_or_else(|| {
        ProcurementError::validation(format!(
            "package contents are required for ingredient {} on an external order",
            item.ingredient_id
        ))
    })?;

    Ok(NewOrderLine {
        ingredient_id: item.ingredient_id,
        ordered_quantity: item.quantity,
        unit_price,
        package_contents_quantity,
    })
}

fn order_summary(order: &PurchaseOrder) -> JsonValue {
    json!({
        "order_id": order.id_typed().to_string(),
        "supplier_name": order.supplier().map(SupplierRef::name),
        "status": order.status().as_str(),
        "total_amount": order.totals().total_amount.to_string(),
    })
}

impl<S, B> Procurement<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Linked suppliers must exist and be active.
    fn resolve_supplier(
        &self,
        restaurant_id: RestaurantId,
        supplier_id: SupplierId,
    ) -> Result<Supplier, ProcurementError> {
        let supplier = self
            .dispatcher
            .load(restaurant_id, supplier_id.0, make_supplier)?
            .into_inner();
        if !supplier.is_created() {
            return Err(ProcurementError::not_found(format!("supplier {supplier_id}")));
        }
        if !supplier.can_transact() {
            return Err(ProcurementError::validation(format!(
                "supplier '{}' is inactive",
                supplier.name()
            )));
        }
        Ok(supplier)
    }

    /// Turn requested items into order lines, checking ingredients and the catalogue.
    fn resolve_lines(
        &self,
        restaurant_id: RestaurantId,
        supplier: Option<&Supplier>,
        items: &[NewPurchaseItem],
    ) -> Result<Vec<NewOrderLine>, ProcurementError> {
        if items.is_empty() {
            return Err(ProcurementError::validation(
                "purchase order needs at least one item",
            ));
        }

        items
            .iter()
            .map(|item| -> Result<NewOrderLine, ProcurementError> {
                if item.quantity <= Decimal::ZERO {
                    return Err(ProcurementError::validation("ordered quantity must be positive"));
                }
                if item.unit_price.is_some_and(|p| p < Decimal::ZERO) {
                    return Err(ProcurementError::validation("unit price cannot be negative"));
                }
                let ingredient = self
                    .dispatcher
                    .load(restaurant_id, item.ingredient_id.0, make_ingredient)?;
                if !ingredient.is_created() {
                    return Err(ProcurementError::not_found(format!(
                        "ingredient {}",
                        item.ingredient_id
                    )));
                }

                match supplier {
                    Some(supplier) => resolve_linked_line(supplier, item),
                    None => resolve_external_line(item),
                }
            })
            .collect()
    }

    pub fn create_purchase_order(
        &self,
        caller: &Caller,
        new: NewPurchaseOrder,
    ) -> Result<PurchaseOrder, ProcurementError> {
        let restaurant_id = caller.restaurant_id;

        let (supplier_ref, supplier) = match new.supplier {
            OrderSupplier::Linked { supplier_id } => {
                let supplier = self.resolve_supplier(restaurant_id, supplier_id)?;
                let supplier_ref = SupplierRef::Linked {
                    supplier_id,
                    name: supplier.name().to_string(),
                };
                (supplier_ref, Some(supplier))
            }
            OrderSupplier::External { name, contact } => (
                SupplierRef::External {
                    name: name.trim().to_string(),
                    contact,
                },
                None,
            ),
        };
        let lines = self.resolve_lines(restaurant_id, supplier.as_ref(), &new.items)?;

        let order_id = PurchaseOrderId::new(AggregateId::new());
        let command = PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
            restaurant_id,
            order_id,
            supplier: supplier_ref,
            order_date: new.order_date.unwrap_or_else(|| self.clock.today()),
            expected_delivery_date: new.expected_delivery_date,
            lines,
            tax_rate: new.tax_rate,
            discount_amount: new.discount_amount,
            notes: new.notes,
            created_by: caller.user_id,
            occurred_at: self.clock.now(),
        });
        let order = self.run(restaurant_id, order_id.0, &command, make_order)?;

        tracing::info!(
            %restaurant_id,
            %order_id,
            lines = order.lines().len(),
            total = %order.totals().total_amount,
            "purchase order drafted"
        );
        Ok(order)
    }

    pub fn update_purchase_order(
        &self,
        caller: &Caller,
        order_id: PurchaseOrderId,
        changes: PurchaseOrderChanges,
    ) -> Result<PurchaseOrder, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        let _guard = self.lock(restaurant_id, [order_id.0])?;

        let lines = match &changes.items {
            Some(items) => {
                let current = self.get_purchase_order(caller, order_id)?;
                let supplier = match current.supplier_id() {
                    Some(supplier_id) => Some(self.resolve_supplier(restaurant_id, supplier_id)?),
                    None => None,
                };
                Some(self.resolve_lines(restaurant_id, supplier.as_ref(), items)?)
            }
            None => None,
        };

        let command = PurchaseOrderCommand::UpdatePurchaseOrder(UpdatePurchaseOrder {
            restaurant_id,
            order_id,
            expected_delivery_date: changes.expected_delivery_date,
            lines,
            tax_rate: changes.tax_rate,
            discount_amount: changes.discount_amount,
            notes: changes.notes,
            occurred_at: self.clock.now(),
        });
        self.run(restaurant_id, order_id.0, &command, make_order)
    }

    /// `draft → pending`; managers are notified.
    pub fn submit_for_approval(
        &self,
        caller: &Caller,
        order_id: PurchaseOrderId,
    ) -> Result<OrderTransition, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        let order = {
            let _guard = self.lock(restaurant_id, [order_id.0])?;
            let command = PurchaseOrderCommand::SubmitForApproval(SubmitForApproval {
                restaurant_id,
                order_id,
                submitted_by: caller.user_id,
                occurred_at: self.clock.now(),
            });
            self.run(restaurant_id, order_id.0, &command, make_order)?
        };
        tracing::info!(%restaurant_id, %order_id, "purchase order submitted for approval");

        let mut payload = order_summary(&order);
        payload["submitted_by"] = json!(caller.user_id.to_string());
        let warnings = self
            .notify(restaurant_id, PURCHASE_ORDER_SUBMITTED, payload)
            .into_iter()
            .collect();
        Ok(OrderTransition { order, warnings })
    }

    /// `pending → sent`. Owners and managers only; the supplier gets signed links.
    pub fn approve_and_send(
        &self,
        caller: &Caller,
        order_id: PurchaseOrderId,
    ) -> Result<SentOrder, ProcurementError> {
        if !caller.role.can_approve_purchases() {
            return Err(ProcurementError::forbidden(
                "only owners and managers can approve purchase orders",
            ));
        }

        let restaurant_id = caller.restaurant_id;
        let now = self.clock.now();
        let links = self.signer.issue(restaurant_id, order_id, now)?;
        let order = {
            let _guard = self.lock(restaurant_id, [order_id.0])?;
            let command = PurchaseOrderCommand::ApproveAndSend(ApproveAndSend {
                restaurant_id,
                order_id,
                approved_by: caller.user_id,
                occurred_at: now,
            });
            self.run(restaurant_id, order_id.0, &command, make_order)?
        };
        tracing::info!(%restaurant_id, %order_id, approved_by = %caller.user_id, "purchase order sent to supplier");

        let mut payload = order_summary(&order);
        payload["supplier_id"] = json!(order.supplier_id().map(|id| id.to_string()));
        payload["confirm_token"] = json!(links.confirm_token);
        payload["reject_token"] = json!(links.reject_token);
        payload["expires_at"] = json!(links.expires_at);
        payload["lines"] = json!(order
            .lines()
            .iter()
            .map(|line| json!({
                "line_no": line.line_no,
                "ingredient_id": line.ingredient_id.to_string(),
                "quantity": line.ordered_quantity.to_string(),
                "unit_price": line.unit_price.to_string(),
            }))
            .collect::<Vec<_>>());
        let warnings = self
            .notify(restaurant_id, PURCHASE_ORDER_SENT, payload)
            .into_iter()
            .collect();
        Ok(SentOrder {
            order,
            links,
            warnings,
        })
    }

    /// Supplier confirm/reject through a signed link. No caller: the token is the credential.
    pub fn supplier_respond(
        &self,
        restaurant_id: RestaurantId,
        order_id: PurchaseOrderId,
        token: &str,
        action: SupplierResponse,
    ) -> Result<OrderTransition, ProcurementError> {
        let now = self.clock.now();
        if let Err(err) = self.signer.verify(restaurant_id, order_id, action, token, now) {
            tracing::warn!(%restaurant_id, %order_id, action = %action, error = %err, "supplier link rejected");
            return Err(err.into());
        }

        let order = {
            let _guard = self.lock(restaurant_id, [order_id.0])?;
            let command = PurchaseOrderCommand::RecordSupplierResponse(RecordSupplierResponse {
                restaurant_id,
                order_id,
                response: action,
                occurred_at: now,
            });
            self.run(restaurant_id, order_id.0, &command, make_order)?
        };
        tracing::info!(%restaurant_id, %order_id, action = %action, status = %order.status(), "supplier responded");

        let mut payload = order_summary(&order);
        payload["response"] = json!(action.as_str());
        let warnings = self
            .notify(restaurant_id, PURCHASE_ORDER_SUPPLIER_RESPONDED, payload)
            .into_iter()
            .collect();
        Ok(OrderTransition { order, warnings })
    }

    pub fn cancel_purchase_order(
        &self,
        caller: &Caller,
        order_id: PurchaseOrderId,
        reason: &str,
    ) -> Result<PurchaseOrder, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        let _guard = self.lock(restaurant_id, [order_id.0])?;
        let command = PurchaseOrderCommand::CancelPurchaseOrder(CancelPurchaseOrder {
            restaurant_id,
            order_id,
            reason: reason.to_string(),
            cancelled_by: caller.user_id,
            occurred_at: self.clock.now(),
        });
        let order = self.run(restaurant_id, order_id.0, &command, make_order)?;

        tracing::info!(%restaurant_id, %order_id, "purchase order cancelled");
        Ok(order)
    }

    /// Tombstone a draft or pending order; it is `NotFound` afterwards.
    pub fn delete_purchase_order(
        &self,
        caller: &Caller,
        order_id: PurchaseOrderId,
    ) -> Result<(), ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        let _guard = self.lock(restaurant_id, [order_id.0])?;
        let command = PurchaseOrderCommand::DeletePurchaseOrder(DeletePurchaseOrder {
            restaurant_id,
            order_id,
            deleted_by: caller.user_id,
            occurred_at: self.clock.now(),
        });
        self.run(restaurant_id, order_id.0, &command, make_order)?;

        tracing::info!(%restaurant_id, %order_id, "purchase order deleted");
        Ok(())
    }

    pub fn get_purchase_order(
        &self,
        caller: &Caller,
        order_id: PurchaseOrderId,
    ) -> Result<PurchaseOrder, ProcurementError> {
        let order = self
            .dispatcher
            .load(caller.restaurant_id, order_id.0, make_order)?
            .into_inner();
        if !order.exists() {
            return Err(ProcurementError::not_found(format!("purchase order {order_id}")));
        }
        Ok(order)
    }

    /// Orders in creation order, optionally filtered by status. Deleted orders are omitted.
    pub fn list_purchase_orders(
        &self,
        caller: &Caller,
        status: Option<PurchaseOrderStatus>,
    ) -> Result<Vec<PurchaseOrder>, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        let mut orders = Vec::new();
        for id in self.dispatcher.list::<PurchaseOrder>(restaurant_id)? {
            let order = self.dispatcher.load(restaurant_id, id, make_order)?.into_inner();
            if order.exists() && status.is_none_or(|s| order.status() == s) {
                orders.push(order);
            }
        }
        Ok(orders)
    }
}
