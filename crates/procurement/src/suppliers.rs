//! Supplier directory and catalogue maintenance.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use galley_core::{AggregateId, Caller};
use galley_events::{EventBus, EventEnvelope};
use galley_infra::EventStore;
use galley_inventory::IngredientId;
use galley_suppliers::{
    ContactInfo, PaymentTerms, RegisterSupplier, SetSupplierStatus, Supplier, SupplierCommand,
    SupplierId, SupplierOffering, SupplierStatus, UpdateSupplierDetails, UpsertOffering,
    WithdrawOffering,
};

use crate::error::ProcurementError;
use crate::service::{Procurement, make_supplier};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSupplier {
    pub name: String,
    #[serde(default)]
    pub contact: Option<ContactInfo>,
    #[serde(default)]
    pub payment_terms: Option<PaymentTerms>,
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierChanges {
    pub name: Option<String>,
    pub contact: Option<ContactInfo>,
    pub payment_terms: Option<PaymentTerms>,
}

impl<S, B> Procurement<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn register_supplier(
        &self,
        caller: &Caller,
        new: NewSupplier,
    ) -> Result<Supplier, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        let supplier_id = SupplierId::new(AggregateId::new());
        let command = SupplierCommand::RegisterSupplier(RegisterSupplier {
            restaurant_id,
            supplier_id,
            name: new.name,
            contact: new.contact,
            payment_terms: new.payment_terms,
            occurred_at: self.clock.now(),
        });
        let supplier = self.run(restaurant_id, supplier_id.0, &command, make_supplier)?;

        tracing::info!(%restaurant_id, %supplier_id, name = %supplier.name(), "supplier registered");
        Ok(supplier)
    }

    pub fn update_supplier(
        &self,
        caller: &Caller,
        supplier_id: SupplierId,
        changes: SupplierChanges,
    ) -> Result<Supplier, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        let _guard = self.lock(restaurant_id, [supplier_id.0])?;
        let command = SupplierCommand::UpdateSupplierDetails(UpdateSupplierDetails {
            restaurant_id,
            supplier_id,
            name: changes.name,
            contact: changes.contact,
            payment_terms: changes.payment_terms,
            occurred_at: self.clock.now(),
        });
        self.run(restaurant_id, supplier_id.0, &command, make_supplier)
    }

    /// Activate or deactivate. Inactive suppliers take no new orders.
    pub fn set_supplier_status(
        &self,
        caller: &Caller,
        supplier_id: SupplierId,
        status: SupplierStatus,
        reason: Option<String>,
    ) -> Result<Supplier, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        let _guard = self.lock(restaurant_id, [supplier_id.0])?;
        let command = SupplierCommand::SetSupplierStatus(SetSupplierStatus {
            restaurant_id,
            supplier_id,
            status,
            reason,
            occurred_at: self.clock.now(),
        });
        let supplier = self.run(restaurant_id, supplier_id.0, &command, make_supplier)?;

        tracing::info!(%restaurant_id, %supplier_id, status = ?status, "supplier status changed");
        Ok(supplier)
    }

    /// Add or replace the supplier's offering for an existing ingredient.
    pub fn upsert_offering(
        &self,
        caller: &Caller,
        supplier_id: SupplierId,
        offering: SupplierOffering,
    ) -> Result<Supplier, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        self.get_ingredient(caller, offering.ingredient_id)?;

        let _guard = self.lock(restaurant_id, [supplier_id.0])?;
        let command = SupplierCommand::UpsertOffering(UpsertOffering {
            restaurant_id,
            supplier_id,
            offering,
            occurred_at: self.clock.now(),
        });
        self.run(restaurant_id, supplier_id.0, &command, make_supplier)
    }

    pub fn withdraw_offering(
        &self,
        caller: &Caller,
        supplier_id: SupplierId,
        ingredient_id: IngredientId,
    ) -> Result<Supplier, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        let _guard = self.lock(restaurant_id, [supplier_id.0])?;
        let command = SupplierCommand::WithdrawOffering(WithdrawOffering {
            restaurant_id,
            supplier_id,
            ingredient_id,
            occurred_at: self.clock.now(),
        });
        self.run(restaurant_id, supplier_id.0, &command, make_supplier)
    }

    pub fn get_supplier(
        &self,
        caller: &Caller,
        supplier_id: SupplierId,
    ) -> Result<Supplier, ProcurementError> {
        let supplier = self
            .dispatcher
            .load(caller.restaurant_id, supplier_id.0, make_supplier)?
            .into_inner();
        if !supplier.is_created() {
            return Err(ProcurementError::not_found(format!("supplier {supplier_id}")));
        }
        Ok(supplier)
    }

    /// Suppliers in registration order.
    pub fn list_suppliers(&self, caller: &Caller) -> Result<Vec<Supplier>, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        self.dispatcher
            .list::<Supplier>(restaurant_id)?
            .into_iter()
            .map(|id| -> Result<Supplier, ProcurementError> {
                Ok(self
                    .dispatcher
                    .load(restaurant_id, id, make_supplier)?
                    .into_inner())
            })
            .collect()
    }
}
