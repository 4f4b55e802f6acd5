//! Service wiring and the load/lock/commit plumbing shared by every operation.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use galley_billing::{PaymentId, SupplierBill, SupplierBillId, SupplierPayment};
use galley_core::{Aggregate, AggregateId, DomainError, RestaurantId};
use galley_events::{Event, EventBus, EventEnvelope, InMemoryEventBus};
use galley_infra::projections::{IngredientDirectory, IngredientSummary};
use galley_infra::read_model::InMemoryRestaurantStore;
use galley_infra::{
    CommandDispatcher, EventStore, InMemoryEventStore, LockKey, ProcurementSettings,
    RowLockGuard, RowLocks, StoredEvent, Transaction,
};
use galley_inventory::{DishId, Ingredient, IngredientId, Recipe};
use galley_purchasing::{PurchaseOrder, PurchaseOrderId, SupplierLinkSigner};
use galley_suppliers::{Supplier, SupplierId};

use crate::clock::Clock;
use crate::error::{ProcurementError, Warning};
use crate::notify::{Notification, Notifier};

pub type IngredientDirectoryStore = InMemoryRestaurantStore<IngredientId, IngredientSummary>;

/// Event bus carrying committed envelopes.
pub type EnvelopeBus = InMemoryEventBus<EventEnvelope<JsonValue>>;

/// Fully in-memory service, used by tests and local tooling.
pub type InMemoryProcurement = Procurement<Arc<InMemoryEventStore>, Arc<EnvelopeBus>>;

/// Procurement-to-payment service for every restaurant sharing one store.
///
/// - `S`: event store (source of truth)
/// - `B`: bus receiving committed envelopes for external consumers
///
/// Every operation takes an explicit caller or restaurant id; nothing here is
/// scoped to a session.
pub struct Procurement<S, B> {
    pub(crate) dispatcher: CommandDispatcher<S, B>,
    pub(crate) locks: RowLocks,
    pub(crate) directory: IngredientDirectory<IngredientDirectoryStore>,
    pub(crate) recipes: InMemoryRestaurantStore<DishId, Recipe>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) signer: SupplierLinkSigner,
    pub(crate) settings: ProcurementSettings,
    pub(crate) clock: Arc<dyn Clock>,
}

impl<S, B> core::fmt::Debug for Procurement<S, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Procurement")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl InMemoryProcurement {
    pub fn in_memory(
        settings: ProcurementSettings,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ProcurementError> {
        Self::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(EnvelopeBus::new()),
            settings,
            notifier,
            clock,
        )
    }
}

impl<S, B> Procurement<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        store: S,
        bus: B,
        settings: ProcurementSettings,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ProcurementError> {
        if settings.supplier_link.secret.trim().is_empty() {
            return Err(ProcurementError::validation(
                "supplier_link.secret must be configured",
            ));
        }
        if settings.supplier_link.ttl_hours <= 0 {
            return Err(ProcurementError::validation(
                "supplier_link.ttl_hours must be positive",
            ));
        }
        if settings.shortage_tax_rate.is_sign_negative() {
            return Err(ProcurementError::validation(
                "shortage_tax_rate cannot be negative",
            ));
        }

        let signer = SupplierLinkSigner::new(
            settings.supplier_link.secret.as_bytes(),
            Duration::hours(settings.supplier_link.ttl_hours),
        );

        Ok(Self {
            dispatcher: CommandDispatcher::new(store, bus),
            locks: RowLocks::new(StdDuration::from_millis(settings.lock_timeout_ms)),
            directory: IngredientDirectory::new(IngredientDirectoryStore::new()),
            recipes: InMemoryRestaurantStore::new(),
            notifier,
            signer,
            settings,
            clock,
        })
    }

    pub fn settings(&self) -> &ProcurementSettings {
        &self.settings
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Replay the restaurant's ingredient streams into the directory.
    ///
    /// Needed after starting against a store that already holds events.
    pub fn rebuild_read_models(&self, restaurant_id: RestaurantId) -> Result<(), ProcurementError> {
        let mut envelopes = Vec::new();
        for id in self.dispatcher.list::<Ingredient>(restaurant_id)? {
            let stream = self
                .dispatcher
                .store()
                .load_stream(restaurant_id, id)
                .map_err(|err| ProcurementError::Storage(err.to_string()))?;
            envelopes.extend(stream.iter().map(StoredEvent::to_envelope));
        }

        self.directory
            .rebuild_from_scratch(envelopes)
            .map_err(|err| ProcurementError::Storage(err.to_string()))?;
        tracing::info!(%restaurant_id, "ingredient directory rebuilt");
        Ok(())
    }

    /// Exclusive row locks on every id, all or none.
    pub(crate) fn lock(
        &self,
        restaurant_id: RestaurantId,
        ids: impl IntoIterator<Item = AggregateId>,
    ) -> Result<RowLockGuard<'_>, ProcurementError> {
        Ok(self
            .locks
            .acquire(ids.into_iter().map(|id| LockKey::new(restaurant_id, id)))?)
    }

    /// Commit, then feed the committed events to the read models.
    pub(crate) fn commit(&self, tx: Transaction<'_, S, B>) -> Result<Vec<StoredEvent>, ProcurementError> {
        let committed = tx.commit()?;
        for stored in &committed {
            if let Err(err) = self.directory.apply_envelope(&stored.to_envelope()) {
                tracing::warn!(
                    event_id = %stored.event_id,
                    event_type = %stored.event_type,
                    error = %err,
                    "ingredient directory update failed"
                );
            }
        }
        Ok(committed)
    }

    /// Execute one command against one aggregate and commit it.
    pub(crate) fn run<A>(
        &self,
        restaurant_id: RestaurantId,
        aggregate_id: AggregateId,
        command: &A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, ProcurementError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        let mut tx = self.dispatcher.begin(restaurant_id);
        let mut tracked = tx.load(aggregate_id, make_aggregate)?;
        tx.execute(&mut tracked, command)?;
        self.commit(tx)?;
        Ok(tracked.into_inner())
    }

    /// Send a notification; a failure becomes a warning.
    pub(crate) fn notify(
        &self,
        restaurant_id: RestaurantId,
        topic: &str,
        payload: JsonValue,
    ) -> Option<Warning> {
        match self
            .notifier
            .notify(Notification::new(restaurant_id, topic, payload))
        {
            Ok(()) => None,
            Err(err) => {
                tracing::warn!(%restaurant_id, topic, error = %err, "notification failed");
                Some(Warning::new(
                    "notification_failed",
                    format!("{topic} notification was not delivered: {err}"),
                ))
            }
        }
    }
}

pub(crate) fn make_ingredient(id: AggregateId) -> Ingredient {
    Ingredient::empty(IngredientId::new(id))
}

pub(crate) fn make_supplier(id: AggregateId) -> Supplier {
    Supplier::empty(SupplierId::new(id))
}

pub(crate) fn make_order(id: AggregateId) -> PurchaseOrder {
    PurchaseOrder::empty(PurchaseOrderId::new(id))
}

pub(crate) fn make_bill(id: AggregateId) -> SupplierBill {
    SupplierBill::empty(SupplierBillId::new(id))
}

pub(crate) fn make_payment(id: AggregateId) -> SupplierPayment {
    SupplierPayment::empty(PaymentId::new(id))
}
