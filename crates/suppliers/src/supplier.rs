use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use galley_core::{Aggregate, AggregateId, AggregateRoot, DomainError, RestaurantId};
use galley_events::Event;
use galley_inventory::IngredientId;

use crate::offering::SupplierOffering;
use crate::terms::PaymentTerms;

/// Supplier identifier (restaurant-scoped via `restaurant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplierId(pub AggregateId);

impl SupplierId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SupplierId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupplierStatus {
    Active,
    Inactive,
}

/// Contact information for a supplier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Aggregate root: Supplier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Supplier {
    id: SupplierId,
    restaurant_id: Option<RestaurantId>,
    name: String,
    contact: ContactInfo,
    payment_terms: PaymentTerms,
    status: SupplierStatus,
    offerings: Vec<SupplierOffering>,
    version: u64,
    created: bool,
}

impl Supplier {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SupplierId) -> Self {
        Self {
            id,
            restaurant_id: None,
            name: String::new(),
            contact: ContactInfo::default(),
            payment_terms: PaymentTerms::default(),
            status: SupplierStatus::Active,
            offerings: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SupplierId {
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

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn payment_terms(&self) -> PaymentTerms {
        self.payment_terms
    }

    pub fn status(&self) -> SupplierStatus {
        self.status
    }

    /// Inactive suppliers cannot receive new orders.
    pub fn can_transact(&self) -> bool {
        self.created && self.status == SupplierStatus::Active
    }

    pub fn offerings(&self) -> &[SupplierOffering] {
        &self.offerings
    }

    /// The active offering for an ingredient, if any.
    pub fn active_offering(&self, ingredient_id: IngredientId) -> Option<&SupplierOffering> {
        self.offerings
            .iter()
            .find(|o| o.ingredient_id == ingredient_id && o.active)
    }
}

impl AggregateRoot for Supplier {
    type Id = SupplierId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterSupplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSupplier {
    pub restaurant_id: RestaurantId,
    pub supplier_id: SupplierId,
    pub name: String,
    pub contact: Option<ContactInfo>,
    /// Defaults to NET_30 when not given.
    pub payment_terms: Option<PaymentTerms>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateSupplierDetails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSupplierDetails {
    pub restaurant_id: RestaurantId,
    pub supplier_id: SupplierId,
    /// Optional new name (if None, keep existing).
    pub name: Option<String>,
    /// Optional new contact info (if None, keep existing).
    pub contact: Option<ContactInfo>,
    pub payment_terms: Option<PaymentTerms>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetSupplierStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetSupplierStatus {
    pub restaurant_id: RestaurantId,
    pub supplier_id: SupplierId,
    pub status: SupplierStatus,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpsertOffering.
///
/// Replaces the offering for the same ingredient, or adds a new one. The stored
/// offering is always active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOffering {
    pub restaurant_id: RestaurantId,
    pub supplier_id: SupplierId,
    pub offering: SupplierOffering,
    pub occurred_at: DateTime<Utc>,
}

/// Command: WithdrawOffering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawOffering {
    pub restaurant_id: RestaurantId,
    pub supplier_id: SupplierId,
    pub ingredient_id: IngredientId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupplierCommand {
    RegisterSupplier(RegisterSupplier),
    UpdateSupplierDetails(UpdateSupplierDetails),
    SetSupplierStatus(SetSupplierStatus),
    UpsertOffering(UpsertOffering),
    WithdrawOffering(WithdrawOffering),
}

/// Event: SupplierRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierRegistered {
    pub restaurant_id: RestaurantId,
    pub supplier_id: SupplierId,
    pub name: String,
    pub contact: ContactInfo,
    pub payment_terms: PaymentTerms,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SupplierDetailsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierDetailsUpdated {
    pub restaurant_id: RestaurantId,
    pub supplier_id: SupplierId,
    pub name: String,
    pub contact: ContactInfo,
    pub payment_terms: PaymentTerms,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SupplierStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierStatusChanged {
    pub restaurant_id: RestaurantId,
    pub supplier_id: SupplierId,
    pub status: SupplierStatus,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OfferingUpserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferingUpserted {
    pub restaurant_id: RestaurantId,
    pub supplier_id: SupplierId,
    pub offering: SupplierOffering,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OfferingWithdrawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferingWithdrawn {
    pub restaurant_id: RestaurantId,
    pub supplier_id: SupplierId,
    pub ingredient_id: IngredientId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupplierEvent {
    SupplierRegistered(SupplierRegistered),
    SupplierDetailsUpdated(SupplierDetailsUpdated),
    SupplierStatusChanged(SupplierStatusChanged),
    OfferingUpserted(OfferingUpserted),
    OfferingWithdrawn(OfferingWithdrawn),
}

impl Event for SupplierEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SupplierEvent::SupplierRegistered(_) => "suppliers.supplier.registered",
            SupplierEvent::SupplierDetailsUpdated(_) => "suppliers.supplier.details_updated",
            SupplierEvent::SupplierStatusChanged(_) => "suppliers.supplier.status_changed",
            SupplierEvent::OfferingUpserted(_) => "suppliers.supplier.offering_upserted",
            SupplierEvent::OfferingWithdrawn(_) => "suppliers.supplier.offering_withdrawn",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SupplierEvent::SupplierRegistered(e) => e.occurred_at,
            SupplierEvent::SupplierDetailsUpdated(e) => e.occurred_at,
            SupplierEvent::SupplierStatusChanged(e) => e.occurred_at,
            SupplierEvent::OfferingUpserted(e) => e.occurred_at,
            SupplierEvent::OfferingWithdrawn(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Supplier {
    const AGGREGATE_TYPE: &'static str = "suppliers.supplier";

    type Command = SupplierCommand;
    type Event = SupplierEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SupplierEvent::SupplierRegistered(e) => {
                self.id = e.supplier_id;
                self.restaurant_id = Some(e.restaurant_id);
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.payment_terms = e.payment_terms;
                self.status = SupplierStatus::Active;
                self.offerings.clear();
                self.created = true;
            }
            SupplierEvent::SupplierDetailsUpdated(e) => {
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.payment_terms = e.payment_terms;
            }
            SupplierEvent::SupplierStatusChanged(e) => {
                self.status = e.status;
            }
            SupplierEvent::OfferingUpserted(e) => {
                match self
                    .offerings
                    .iter_mut()
                    .find(|o| o.ingredient_id == e.offering.ingredient_id)
                {
                    Some(existing) => *existing = e.offering.clone(),
                    None => self.offerings.push(e.offering.clone()),
                }
            }
            SupplierEvent::OfferingWithdrawn(e) => {
                if let Some(existing) = self
                    .offerings
                    .iter_mut()
                    .find(|o| o.ingredient_id == e.ingredient_id)
                {
                    existing.active = false;
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SupplierCommand::RegisterSupplier(cmd) => self.handle_register(cmd),
            SupplierCommand::UpdateSupplierDetails(cmd) => self.handle_update(cmd),
            SupplierCommand::SetSupplierStatus(cmd) => self.handle_set_status(cmd),
            SupplierCommand::UpsertOffering(cmd) => self.handle_upsert_offering(cmd),
            SupplierCommand::WithdrawOffering(cmd) => self.handle_withdraw_offering(cmd),
        }
    }
}

impl Supplier {
    fn ensure_tenant(&self, restaurant_id: RestaurantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.restaurant_id != Some(restaurant_id) {
            return Err(DomainError::invariant("restaurant mismatch"));
        }
        Ok(())
    }

    fn ensure_supplier_id(&self, supplier_id: SupplierId) -> Result<(), DomainError> {
        if self.id != supplier_id {
            return Err(DomainError::invariant("supplier_id mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(
        &self,
        restaurant_id: RestaurantId,
        supplier_id: SupplierId,
    ) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("supplier {supplier_id}")));
        }
        self.ensure_tenant(restaurant_id)?;
        self.ensure_supplier_id(supplier_id)
    }

    fn handle_register(&self, cmd: &RegisterSupplier) -> Result<Vec<SupplierEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("supplier already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![SupplierEvent::SupplierRegistered(SupplierRegistered {
            restaurant_id: cmd.restaurant_id,
            supplier_id: cmd.supplier_id,
            name: cmd.name.trim().to_string(),
            contact: cmd.contact.clone().unwrap_or_default(),
            payment_terms: cmd.payment_terms.unwrap_or_default(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(
        &self,
        cmd: &UpdateSupplierDetails,
    ) -> Result<Vec<SupplierEvent>, DomainError> {
        self.ensure_existing(cmd.restaurant_id, cmd.supplier_id)?;

        let name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![SupplierEvent::SupplierDetailsUpdated(
            SupplierDetailsUpdated {
                restaurant_id: cmd.restaurant_id,
                supplier_id: cmd.supplier_id,
                name: name.trim().to_string(),
                contact: cmd.contact.clone().unwrap_or_else(|| self.contact.clone()),
                payment_terms: cmd.payment_terms.unwrap_or(self.payment_terms),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_set_status(
        &self,
        cmd: &SetSupplierStatus,
    ) -> Result<Vec<SupplierEvent>, DomainError> {
        self.ensure_existing(cmd.restaurant_id, cmd.supplier_id)?;

        if self.status == cmd.status {
            return Ok(vec![]);
        }

        Ok(vec![SupplierEvent::SupplierStatusChanged(
            SupplierStatusChanged {
                restaurant_id: cmd.restaurant_id,
                supplier_id: cmd.supplier_id,
                status: cmd.status,
                reason: cmd.reason.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_upsert_offering(
        &self,
        cmd: &UpsertOffering,
    ) -> Result<Vec<SupplierEvent>, DomainError> {
        self.ensure_existing(cmd.restaurant_id, cmd.supplier_id)?;
        cmd.offering.validate()?;

        let mut offering = cmd.offering.clone();
        offering.package_unit = offering.package_unit.trim().to_string();
        offering.active = true;

        Ok(vec![SupplierEvent::OfferingUpserted(OfferingUpserted {
            restaurant_id: cmd.restaurant_id,
            supplier_id: cmd.supplier_id,
            offering,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_withdraw_offering(
        &self,
        cmd: &WithdrawOffering,
    ) -> Result<Vec<SupplierEvent>, DomainError> {
        self.ensure_existing(cmd.restaurant_id, cmd.supplier_id)?;

        if self.active_offering(cmd.ingredient_id).is_none() {
            return Err(DomainError::not_found(format!(
                "active offering for ingredient {}",
                cmd.ingredient_id
            )));
        }

        Ok(vec![SupplierEvent::OfferingWithdrawn(OfferingWithdrawn {
            restaurant_id: cmd.restaurant_id,
            supplier_id: cmd.supplier_id,
            ingredient_id: cmd.ingredient_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galley_events::execute;
    use rust_decimal_macros::dec;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn registered(restaurant_id: RestaurantId) -> Supplier {
        let supplier_id = SupplierId::new(AggregateId::new());
        let mut supplier = Supplier::empty(supplier_id);
        execute(
            &mut supplier,
            &SupplierCommand::RegisterSupplier(RegisterSupplier {
                restaurant_id,
                supplier_id,
                name: "Green Farms".to_string(),
                contact: None,
                payment_terms: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        supplier
    }

    fn offering(ingredient_id: IngredientId, price: rust_decimal::Decimal) -> SupplierOffering {
        SupplierOffering {
            ingredient_id,
            package_unit: " box ".to_string(),
            package_contents_quantity: dec!(5),
            package_price: price,
            lead_time_days: 1,
            minimum_order_quantity: dec!(1),
            maximum_order_quantity: None,
            active: false,
        }
    }

    #[test]
    fn register_defaults_to_net_30_and_active() {
        let supplier = registered(RestaurantId::new());
        assert_eq!(supplier.payment_terms(), PaymentTerms::Net30);
        assert!(supplier.can_transact());
    }

    #[test]
    fn upsert_replaces_offering_for_same_ingredient() {
        let restaurant_id = RestaurantId::new();
        let mut supplier = registered(restaurant_id);
        let ingredient_id = IngredientId::new(AggregateId::new());

        for price in [dec!(10), dec!(12)] {
            let supplier_id = supplier.id_typed();
            execute(
                &mut supplier,
                &SupplierCommand::UpsertOffering(UpsertOffering {
                    restaurant_id,
                    supplier_id,
                    offering: offering(ingredient_id, price),
                    occurred_at: test_time(),
                }),
            )
            .unwrap();
        }

        assert_eq!(supplier.offerings().len(), 1);
        let active = supplier.active_offering(ingredient_id).unwrap();
        assert_eq!(active.package_price, dec!(12));
        assert_eq!(active.package_unit, "box");
    }

    #[test]
    fn withdrawn_offering_is_kept_but_inactive() {
        let restaurant_id = RestaurantId::new();
        let mut supplier = registered(restaurant_id);
        let ingredient_id = IngredientId::new(AggregateId::new());
        let supplier_id = supplier.id_typed();
        execute(
            &mut supplier,
            &SupplierCommand::UpsertOffering(UpsertOffering {
                restaurant_id,
                supplier_id,
                offering: offering(ingredient_id, dec!(10)),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let withdraw = SupplierCommand::WithdrawOffering(WithdrawOffering {
            restaurant_id,
            supplier_id: supplier.id_typed(),
            ingredient_id,
            occurred_at: test_time(),
        });
        execute(&mut supplier, &withdraw).unwrap();

        assert!(supplier.active_offering(ingredient_id).is_none());
        assert_eq!(supplier.offerings().len(), 1);
        assert!(matches!(
            supplier.handle(&withdraw).unwrap_err(),
            DomainError::NotFound(_)
        ));
    }

    #[test]
    fn status_change_to_same_status_is_a_no_op() {
        let restaurant_id = RestaurantId::new();
        let mut supplier = registered(restaurant_id);
        let supplier_id = supplier.id_typed();
        let cmd = |status| {
            SupplierCommand::SetSupplierStatus(SetSupplierStatus {
                restaurant_id,
                supplier_id,
                status,
                reason: None,
                occurred_at: test_time(),
            })
        };

        assert!(supplier.handle(&cmd(SupplierStatus::Active)).unwrap().is_empty());
        let deactivate = cmd(SupplierStatus::Inactive);
        execute(&mut supplier, &deactivate).unwrap();
        assert!(!supplier.can_transact());
    }
}
