use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use galley_core::money::{apply_rate, checked_sum, in_range, round_money};
use galley_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, RestaurantId, UserId,
};
use galley_events::Event;
use galley_inventory::IngredientId;
use galley_suppliers::SupplierId;

/// Purchase order identifier (restaurant-scoped via `restaurant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderId(pub AggregateId);

impl PurchaseOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Purchase order status lifecycle.
///
/// `draft → pending → sent → confirmed → {partially_delivered ⇄ delivered}`, with
/// `cancelled` reachable from `draft`, `pending` and `sent` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Draft,
    Pending,
    Sent,
    Confirmed,
    PartiallyDelivered,
    Delivered,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PurchaseOrderStatus::Draft => "draft",
            PurchaseOrderStatus::Pending => "pending",
            PurchaseOrderStatus::Sent => "sent",
            PurchaseOrderStatus::Confirmed => "confirmed",
            PurchaseOrderStatus::PartiallyDelivered => "partially_delivered",
            PurchaseOrderStatus::Delivered => "delivered",
            PurchaseOrderStatus::Cancelled => "cancelled",
        }
    }

    /// Lines, dates and totals may still change.
    pub fn is_editable(self) -> bool {
        matches!(self, PurchaseOrderStatus::Draft | PurchaseOrderStatus::Pending)
    }

    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Draft | PurchaseOrderStatus::Pending | PurchaseOrderStatus::Sent
        )
    }

    pub fn is_receivable(self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Confirmed
                | PurchaseOrderStatus::PartiallyDelivered
                | PurchaseOrderStatus::Delivered
        )
    }
}

impl core::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who the order is placed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SupplierRef {
    /// A registered supplier; `name` is snapshotted at order time.
    Linked { supplier_id: SupplierId, name: String },
    /// Free-text supplier used by manual receiving.
    External {
        name: String,
        contact: Option<String>,
    },
}

impl SupplierRef {
    pub fn name(&self) -> &str {
        match self {
            SupplierRef::Linked { name, .. } | SupplierRef::External { name, .. } => name,
        }
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        match self {
            SupplierRef::Linked { supplier_id, .. } => Some(*supplier_id),
            SupplierRef::External { .. } => None,
        }
    }
}

/// Supplier's answer delivered through a signed link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupplierResponse {
    Confirm,
    Reject,
}

impl SupplierResponse {
    pub fn as_str(self) -> &'static str {
        match self {
            SupplierResponse::Confirm => "confirm",
            SupplierResponse::Reject => "reject",
        }
    }
}

impl core::fmt::Display for SupplierResponse {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryCondition {
    Good,
    Fair,
    Damaged,
}

/// Line as submitted on create/update. Quantities are in packages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub ingredient_id: IngredientId,
    pub ordered_quantity: Decimal,
    /// Price per package.
    pub unit_price: Decimal,
    /// Base units per package, snapshotted from the supplier offering.
    pub package_contents_quantity: Decimal,
}

/// Purchase order line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub ingredient_id: IngredientId,
    pub ordered_quantity: Decimal,
    /// Cumulative; never decreases.
    pub received_quantity: Decimal,
    pub unit_price: Decimal,
    pub package_contents_quantity: Decimal,
    pub quality_rating: Option<u8>,
    pub discrepancy_reason: Option<String>,
}

impl OrderLine {
    pub fn line_total(&self) -> DomainResult<Decimal> {
        in_range(self.ordered_quantity.checked_mul(self.unit_price))
    }

    pub fn received_total(&self) -> DomainResult<Decimal> {
        in_range(self.received_quantity.checked_mul(self.unit_price))
    }

    /// Base units in the ordered packages.
    pub fn base_quantity(&self) -> DomainResult<Decimal> {
        in_range(self.ordered_quantity.checked_mul(self.package_contents_quantity))
    }

    pub fn is_fully_received(&self) -> bool {
        self.received_quantity >= self.ordered_quantity
    }

    /// Packages still expected from the supplier.
    pub fn outstanding_quantity(&self) -> Decimal {
        (self.ordered_quantity - self.received_quantity).max(Decimal::ZERO)
    }

    /// Base-unit cost implied by the package price.
    pub fn unit_cost(&self) -> DomainResult<Decimal> {
        in_range(self.unit_price.checked_div(self.package_contents_quantity))
    }

    pub fn has_discrepancy(&self) -> bool {
        self.discrepancy_reason.is_some()
    }
}

/// Order money figures (2 dp).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
}

impl OrderTotals {
    pub fn zero() -> Self {
        Self {
            subtotal: Decimal::ZERO,
            tax_rate: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            total_amount: Decimal::ZERO,
        }
    }

    /// `subtotal = Σ ordered × price`, `tax = round2(subtotal × rate)`,
    /// `total = subtotal + tax − discount`.
    pub fn compute(
        lines: &[OrderLine],
        tax_rate: Decimal,
        discount_amount: Decimal,
    ) -> Result<Self, DomainError> {
        if tax_rate < Decimal::ZERO || tax_rate > Decimal::ONE {
            return Err(DomainError::validation("tax rate must be between 0 and 1"));
        }

        let subtotal = round_money(checked_sum(lines.iter().map(OrderLine::line_total))?);
        let tax_amount = apply_rate(subtotal, tax_rate)?;
        let gross = in_range(subtotal.checked_add(tax_amount))?;
        let discount_amount = round_money(discount_amount);
        if discount_amount < Decimal::ZERO || discount_amount > gross {
            return Err(DomainError::validation(
                "discount must be between zero and subtotal plus tax",
            ));
        }

        Ok(Self {
            subtotal,
            tax_rate,
            tax_amount,
            discount_amount,
            total_amount: gross - discount_amount,
        })
    }
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    restaurant_id: Option<RestaurantId>,
    supplier: Option<SupplierRef>,
    status: PurchaseOrderStatus,
    order_date: Option<NaiveDate>,
    expected_delivery_date: Option<NaiveDate>,
    actual_delivery_date: Option<NaiveDate>,
    lines: Vec<OrderLine>,
    totals: OrderTotals,
    notes: Option<String>,
    created_by: Option<UserId>,
    approved_by: Option<UserId>,
    received_by: Option<UserId>,
    delivery_condition: Option<DeliveryCondition>,
    supplier_response: Option<SupplierResponse>,
    supplier_responded_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    receiving_closed: bool,
    deleted: bool,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            restaurant_id: None,
            supplier: None,
            status: PurchaseOrderStatus::Draft,
            order_date: None,
            expected_delivery_date: None,
            actual_delivery_date: None,
            lines: Vec::new(),
            totals: OrderTotals::zero(),
            notes: None,
            created_by: None,
            approved_by: None,
            received_by: None,
            delivery_condition: None,
            supplier_response: None,
            supplier_responded_at: None,
            cancellation_reason: None,
            receiving_closed: false,
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn restaurant_id(&self) -> Option<RestaurantId> {
        self.restaurant_id
    }

    /// Created and not tombstoned.
    pub fn exists(&self) -> bool {
        self.created && !self.deleted
    }

    pub fn supplier(&self) -> Option<&SupplierRef> {
        self.supplier.as_ref()
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier.as_ref().and_then(SupplierRef::supplier_id)
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    pub fn order_date(&self) -> Option<NaiveDate> {
        self.order_date
    }

    pub fn expected_delivery_date(&self) -> Option<NaiveDate> {
        self.expected_delivery_date
    }

    pub fn actual_delivery_date(&self) -> Option<NaiveDate> {
        self.actual_delivery_date
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&OrderLine> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    pub fn totals(&self) -> &OrderTotals {
        &self.totals
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn received_by(&self) -> Option<UserId> {
        self.received_by
    }

    pub fn delivery_condition(&self) -> Option<DeliveryCondition> {
        self.delivery_condition
    }

    pub fn supplier_response(&self) -> Option<SupplierResponse> {
        self.supplier_response
    }

    pub fn supplier_responded_at(&self) -> Option<DateTime<Utc>> {
        self.supplier_responded_at
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    /// Receiving was closed while some lines were still short.
    pub fn receiving_closed(&self) -> bool {
        self.receiving_closed
    }

    pub fn is_fully_received(&self) -> bool {
        self.lines.iter().all(OrderLine::is_fully_received)
    }

    /// `Σ received × unit_price`, rounded to cents.
    pub fn received_subtotal(&self) -> DomainResult<Decimal> {
        checked_sum(self.lines.iter().map(OrderLine::received_total)).map(round_money)
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub restaurant_id: RestaurantId,
    pub order_id: PurchaseOrderId,
    pub supplier: SupplierRef,
    pub order_date: NaiveDate,
    pub expected_delivery_date: Option<NaiveDate>,
    pub lines: Vec<NewOrderLine>,
    pub tax_rate: Decimal,
    pub discount_amount: Decimal,
    pub notes: Option<String>,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdatePurchaseOrder (only allowed in Draft/Pending).
///
/// `None` fields keep their current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePurchaseOrder {
    pub restaurant_id: RestaurantId,
    pub order_id: PurchaseOrderId,
    pub expected_delivery_date: Option<NaiveDate>,
    pub lines: Option<Vec<NewOrderLine>>,
    pub tax_rate: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SubmitForApproval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitForApproval {
    pub restaurant_id: RestaurantId,
    pub order_id: PurchaseOrderId,
    pub submitted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveAndSend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveAndSend {
    pub restaurant_id: RestaurantId,
    pub order_id: PurchaseOrderId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordSupplierResponse (signature already verified).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSupplierResponse {
    pub restaurant_id: RestaurantId,
    pub order_id: PurchaseOrderId,
    pub response: SupplierResponse,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelPurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelPurchaseOrder {
    pub restaurant_id: RestaurantId,
    pub order_id: PurchaseOrderId,
    pub reason: String,
    pub cancelled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeletePurchaseOrder (tombstone).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePurchaseOrder {
    pub restaurant_id: RestaurantId,
    pub order_id: PurchaseOrderId,
    pub deleted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Newly delivered packages for one order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineReceipt {
    pub line_no: u32,
    pub quantity: Decimal,
    /// 1 (poor) to 5 (excellent).
    pub quality_rating: Option<u8>,
    pub discrepancy_reason: Option<String>,
}

/// Command: ReceiveItems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveItems {
    pub restaurant_id: RestaurantId,
    pub order_id: PurchaseOrderId,
    pub receipts: Vec<LineReceipt>,
    pub received_by: UserId,
    pub delivery_date: NaiveDate,
    pub condition: DeliveryCondition,
    /// Mark the order delivered even if some lines are short.
    pub close_partial: bool,
    pub allow_over_delivery: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordManualDelivery.
///
/// Creates an order that is already delivered in full, for goods bought outside
/// the ordering workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordManualDelivery {
    pub restaurant_id: RestaurantId,
    pub order_id: PurchaseOrderId,
    pub supplier_name: String,
    pub supplier_contact: Option<String>,
    pub lines: Vec<NewOrderLine>,
    pub tax_rate: Decimal,
    pub discount_amount: Decimal,
    pub delivery_date: NaiveDate,
    pub condition: DeliveryCondition,
    pub received_by: UserId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    CreatePurchaseOrder(CreatePurchaseOrder),
    UpdatePurchaseOrder(UpdatePurchaseOrder),
    SubmitForApproval(SubmitForApproval),
    ApproveAndSend(ApproveAndSend),
    RecordSupplierResponse(RecordSupplierResponse),
    CancelPurchaseOrder(CancelPurchaseOrder),
    DeletePurchaseOrder(DeletePurchaseOrder),
    ReceiveItems(ReceiveItems),
    RecordManualDelivery(RecordManualDelivery),
}

/// Event: PurchaseOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub restaurant_id: RestaurantId,
    pub order_id: PurchaseOrderId,
    pub supplier: SupplierRef,
    pub order_date: NaiveDate,
    pub expected_delivery_date: Option<NaiveDate>,
    pub lines: Vec<OrderLine>,
    pub totals: OrderTotals,
    pub notes: Option<String>,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderUpdated {
    pub restaurant_id: RestaurantId,
    pub order_id: PurchaseOrderId,
    pub expected_delivery_date: Option<NaiveDate>,
    pub lines: Vec<OrderLine>,
    pub totals: OrderTotals,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderSubmitted {
    pub restaurant_id: RestaurantId,
    pub order_id: PurchaseOrderId,
    pub submitted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderApproved (the order is now `sent`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderApproved {
    pub restaurant_id: RestaurantId,
    pub order_id: PurchaseOrderId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SupplierResponded.
///
/// A repeated response with the same action is recorded again with the new
/// timestamp and leaves `status_after` unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierResponded {
    pub restaurant_id: RestaurantId,
    pub order_id: PurchaseOrderId,
    pub response: SupplierResponse,
    pub status_after: PurchaseOrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCancelled {
    pub restaurant_id: RestaurantId,
    pub order_id: PurchaseOrderId,
    pub reason: String,
    pub cancelled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderDeleted {
    pub restaurant_id: RestaurantId,
    pub order_id: PurchaseOrderId,
    pub deleted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// One line of an applied delivery.
///
/// Carries everything the stock ledger needs to book the receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedLine {
    pub line_no: u32,
    pub ingredient_id: IngredientId,
    /// Packages delivered now.
    pub quantity: Decimal,
    /// Cumulative packages delivered after this receipt.
    pub received_after: Decimal,
    pub unit_price: Decimal,
    pub package_contents_quantity: Decimal,
    pub quality_rating: Option<u8>,
    pub discrepancy_reason: Option<String>,
}

impl ReceivedLine {
    /// Base units added to stock.
    pub fn base_quantity(&self) -> DomainResult<Decimal> {
        in_range(self.quantity.checked_mul(self.package_contents_quantity))
    }

    /// Base-unit cost of this batch.
    pub fn unit_cost(&self) -> DomainResult<Decimal> {
        in_range(self.unit_price.checked_div(self.package_contents_quantity))
    }
}

/// Event: ItemsReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsReceived {
    pub restaurant_id: RestaurantId,
    pub order_id: PurchaseOrderId,
    pub lines: Vec<ReceivedLine>,
    pub received_by: UserId,
    pub delivery_date: NaiveDate,
    pub condition: DeliveryCondition,
    pub status_after: PurchaseOrderStatus,
    pub receiving_closed: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ManualDeliveryRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualDeliveryRecorded {
    pub restaurant_id: RestaurantId,
    pub order_id: PurchaseOrderId,
    pub supplier: SupplierRef,
    pub lines: Vec<OrderLine>,
    pub totals: OrderTotals,
    pub delivery_date: NaiveDate,
    pub condition: DeliveryCondition,
    pub received_by: UserId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    PurchaseOrderCreated(PurchaseOrderCreated),
    PurchaseOrderUpdated(PurchaseOrderUpdated),
    PurchaseOrderSubmitted(PurchaseOrderSubmitted),
    PurchaseOrderApproved(PurchaseOrderApproved),
    SupplierResponded(SupplierResponded),
    PurchaseOrderCancelled(PurchaseOrderCancelled),
    PurchaseOrderDeleted(PurchaseOrderDeleted),
    ItemsReceived(ItemsReceived),
    ManualDeliveryRecorded(ManualDeliveryRecorded),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => "purchasing.order.created",
            PurchaseOrderEvent::PurchaseOrderUpdated(_) => "purchasing.order.updated",
            PurchaseOrderEvent::PurchaseOrderSubmitted(_) => "purchasing.order.submitted",
            PurchaseOrderEvent::PurchaseOrderApproved(_) => "purchasing.order.approved",
            PurchaseOrderEvent::SupplierResponded(_) => "purchasing.order.supplier_responded",
            PurchaseOrderEvent::PurchaseOrderCancelled(_) => "purchasing.order.cancelled",
            PurchaseOrderEvent::PurchaseOrderDeleted(_) => "purchasing.order.deleted",
            PurchaseOrderEvent::ItemsReceived(_) => "purchasing.order.items_received",
            PurchaseOrderEvent::ManualDeliveryRecorded(_) => {
                "purchasing.order.manual_delivery_recorded"
            }
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderUpdated(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderSubmitted(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderApproved(e) => e.occurred_at,
            PurchaseOrderEvent::SupplierResponded(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderCancelled(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderDeleted(e) => e.occurred_at,
            PurchaseOrderEvent::ItemsReceived(e) => e.occurred_at,
            PurchaseOrderEvent::ManualDeliveryRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    const AGGREGATE_TYPE: &'static str = "purchasing.order";

    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => {
                self.id = e.order_id;
                self.restaurant_id = Some(e.restaurant_id);
                self.supplier = Some(e.supplier.clone());
                self.status = PurchaseOrderStatus::Draft;
                self.order_date = Some(e.order_date);
                self.expected_delivery_date = e.expected_delivery_date;
                self.lines = e.lines.clone();
                self.totals = e.totals.clone();
                self.notes = e.notes.clone();
                self.created_by = Some(e.created_by);
                self.created = true;
            }
            PurchaseOrderEvent::PurchaseOrderUpdated(e) => {
                self.expected_delivery_date = e.expected_delivery_date;
                self.lines = e.lines.clone();
                self.totals = e.totals.clone();
                self.notes = e.notes.clone();
            }
            PurchaseOrderEvent::PurchaseOrderSubmitted(_) => {
                self.status = PurchaseOrderStatus::Pending;
            }
            PurchaseOrderEvent::PurchaseOrderApproved(e) => {
                self.approved_by = Some(e.approved_by);
                self.status = PurchaseOrderStatus::Sent;
            }
            PurchaseOrderEvent::SupplierResponded(e) => {
                self.supplier_response = Some(e.response);
                self.supplier_responded_at = Some(e.occurred_at);
                self.status = e.status_after;
                if e.status_after == PurchaseOrderStatus::Cancelled
                    && self.cancellation_reason.is_none()
                {
                    self.cancellation_reason = Some("rejected by supplier".to_string());
                }
            }
            PurchaseOrderEvent::PurchaseOrderCancelled(e) => {
                self.cancellation_reason = Some(e.reason.clone());
                self.status = PurchaseOrderStatus::Cancelled;
            }
            PurchaseOrderEvent::PurchaseOrderDeleted(_) => {
                self.deleted = true;
            }
            PurchaseOrderEvent::ItemsReceived(e) => {
                for received in &e.lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == received.line_no)
                    {
                        line.received_quantity = received.received_after;
                        if received.quality_rating.is_some() {
                            line.quality_rating = received.quality_rating;
                        }
                        if received.discrepancy_reason.is_some() {
                            line.discrepancy_reason = received.discrepancy_reason.clone();
                        }
                    }
                }
                self.received_by = Some(e.received_by);
                self.actual_delivery_date = Some(e.delivery_date);
                self.delivery_condition = Some(e.condition);
                self.receiving_closed = e.receiving_closed;
                self.status = e.status_after;
            }
            PurchaseOrderEvent::ManualDeliveryRecorded(e) => {
                self.id = e.order_id;
                self.restaurant_id = Some(e.restaurant_id);
                self.supplier = Some(e.supplier.clone());
                self.order_date = Some(e.delivery_date);
                self.actual_delivery_date = Some(e.delivery_date);
                self.lines = e.lines.clone();
                self.totals = e.totals.clone();
                self.notes = e.notes.clone();
                self.created_by = Some(e.received_by);
                self.received_by = Some(e.received_by);
                self.delivery_condition = Some(e.condition);
                self.status = PurchaseOrderStatus::Delivered;
                self.created = true;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::CreatePurchaseOrder(cmd) => self.handle_create(cmd),
            PurchaseOrderCommand::UpdatePurchaseOrder(cmd) => self.handle_update(cmd),
            PurchaseOrderCommand::SubmitForApproval(cmd) => self.handle_submit(cmd),
            PurchaseOrderCommand::ApproveAndSend(cmd) => self.handle_approve(cmd),
            PurchaseOrderCommand::RecordSupplierResponse(cmd) => self.handle_supplier_response(cmd),
            PurchaseOrderCommand::CancelPurchaseOrder(cmd) => self.handle_cancel(cmd),
            PurchaseOrderCommand::DeletePurchaseOrder(cmd) => self.handle_delete(cmd),
            PurchaseOrderCommand::ReceiveItems(cmd) => self.handle_receive(cmd),
            PurchaseOrderCommand::RecordManualDelivery(cmd) => self.handle_manual_delivery(cmd),
        }
    }
}

/// Number and validate submitted lines.
fn build_lines(lines: &[NewOrderLine]) -> Result<Vec<OrderLine>, DomainError> {
    if lines.is_empty() {
        return Err(DomainError::validation(
            "purchase order needs at least one item",
        ));
    }

    lines
        .iter()
        .enumerate()
        .map(|(idx, l)| {
            if l.ordered_quantity <= Decimal::ZERO {
                return Err(DomainError::validation("ordered quantity must be positive"));
            }
            if l.unit_price < Decimal::ZERO {
                return Err(DomainError::validation("unit price cannot be negative"));
            }
            if l.package_contents_quantity <= Decimal::ZERO {
                return Err(DomainError::validation(
                    "package contents quantity must be positive",
                ));
            }
            let line = OrderLine {
                line_no: idx as u32 + 1,
                ingredient_id: l.ingredient_id,
                ordered_quantity: l.ordered_quantity,
                received_quantity: Decimal::ZERO,
                unit_price: l.unit_price,
                package_contents_quantity: l.package_contents_quantity,
                quality_rating: None,
                discrepancy_reason: None,
            };
            line.base_quantity()?;
            line.unit_cost()?;
            Ok(line)
        })
        .collect()
}

fn validate_supplier(supplier: &SupplierRef) -> Result<(), DomainError> {
    if supplier.name().trim().is_empty() {
        return Err(DomainError::validation("supplier name cannot be empty"));
    }
    Ok(())
}

impl PurchaseOrder {
    fn ensure_tenant(&self, restaurant_id: RestaurantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.restaurant_id != Some(restaurant_id) {
            return Err(DomainError::invariant("restaurant mismatch"));
        }
        Ok(())
    }

    fn ensure_order_id(&self, order_id: PurchaseOrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(
        &self,
        restaurant_id: RestaurantId,
        order_id: PurchaseOrderId,
    ) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found(format!("purchase order {order_id}")));
        }
        self.ensure_tenant(restaurant_id)?;
        self.ensure_order_id(order_id)
    }

    fn ensure_status(
        &self,
        allowed: bool,
        action: &str,
    ) -> Result<(), DomainError> {
        if !allowed {
            return Err(DomainError::conflict(format!(
                "cannot {action} a purchase order in status {}",
                self.status
            )));
        }
        Ok(())
    }

    fn handle_create(
        &self,
        cmd: &CreatePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase order already exists"));
        }
        validate_supplier(&cmd.supplier)?;

        let lines = build_lines(&cmd.lines)?;
        let totals = OrderTotals::compute(&lines, cmd.tax_rate, cmd.discount_amount)?;

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCreated(
            PurchaseOrderCreated {
                restaurant_id: cmd.restaurant_id,
                order_id: cmd.order_id,
                supplier: cmd.supplier.clone(),
                order_date: cmd.order_date,
                expected_delivery_date: cmd.expected_delivery_date,
                lines,
                totals,
                notes: cmd.notes.clone(),
                created_by: cmd.created_by,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_update(
        &self,
        cmd: &UpdatePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_existing(cmd.restaurant_id, cmd.order_id)?;
        self.ensure_status(self.status.is_editable(), "update")?;

        let lines = match &cmd.lines {
            Some(new_lines) => build_lines(new_lines)?,
            None => self.lines.clone(),
        };
        let totals = OrderTotals::compute(
            &lines,
            cmd.tax_rate.unwrap_or(self.totals.tax_rate),
            cmd.discount_amount.unwrap_or(self.totals.discount_amount),
        )?;

        Ok(vec![PurchaseOrderEvent::PurchaseOrderUpdated(
            PurchaseOrderUpdated {
                restaurant_id: cmd.restaurant_id,
                order_id: cmd.order_id,
                expected_delivery_date: cmd
                    .expected_delivery_date
                    .or(self.expected_delivery_date),
                lines,
                totals,
                notes: cmd.notes.clone().or_else(|| self.notes.clone()),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_submit(
        &self,
        cmd: &SubmitForApproval,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_existing(cmd.restaurant_id, cmd.order_id)?;
        self.ensure_status(
            self.status == PurchaseOrderStatus::Draft,
            "submit for approval",
        )?;

        Ok(vec![PurchaseOrderEvent::PurchaseOrderSubmitted(
            PurchaseOrderSubmitted {
                restaurant_id: cmd.restaurant_id,
                order_id: cmd.order_id,
                submitted_by: cmd.submitted_by,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_approve(
        &self,
        cmd: &ApproveAndSend,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_existing(cmd.restaurant_id, cmd.order_id)?;
        self.ensure_status(self.status == PurchaseOrderStatus::Pending, "approve")?;

        if self.supplier_id().is_none() {
            return Err(DomainError::validation(
                "only orders placed with a registered supplier can be sent",
            ));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderApproved(
            PurchaseOrderApproved {
                restaurant_id: cmd.restaurant_id,
                order_id: cmd.order_id,
                approved_by: cmd.approved_by,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_supplier_response(
        &self,
        cmd: &RecordSupplierResponse,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_existing(cmd.restaurant_id, cmd.order_id)?;

        let status_after = match self.supplier_response {
            Some(previous) if previous == cmd.response => self.status,
            Some(previous) => {
                return Err(DomainError::conflict(format!(
                    "supplier already responded with {previous}"
                )));
            }
            None => {
                self.ensure_status(
                    self.status == PurchaseOrderStatus::Sent,
                    "record a supplier response for",
                )?;
                match cmd.response {
                    SupplierResponse::Confirm => PurchaseOrderStatus::Confirmed,
                    SupplierResponse::Reject => PurchaseOrderStatus::Cancelled,
                }
            }
        };

        Ok(vec![PurchaseOrderEvent::SupplierResponded(SupplierResponded {
            restaurant_id: cmd.restaurant_id,
            order_id: cmd.order_id,
            response: cmd.response,
            status_after,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(
        &self,
        cmd: &CancelPurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_existing(cmd.restaurant_id, cmd.order_id)?;
        self.ensure_status(self.status.is_cancellable(), "cancel")?;

        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("cancellation reason is required"));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCancelled(
            PurchaseOrderCancelled {
                restaurant_id: cmd.restaurant_id,
                order_id: cmd.order_id,
                reason: cmd.reason.trim().to_string(),
                cancelled_by: cmd.cancelled_by,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_delete(
        &self,
        cmd: &DeletePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_existing(cmd.restaurant_id, cmd.order_id)?;
        self.ensure_status(self.status.is_editable(), "delete")?;

        Ok(vec![PurchaseOrderEvent::PurchaseOrderDeleted(
            PurchaseOrderDeleted {
                restaurant_id: cmd.restaurant_id,
                order_id: cmd.order_id,
                deleted_by: cmd.deleted_by,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_receive(&self, cmd: &ReceiveItems) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_existing(cmd.restaurant_id, cmd.order_id)?;
        self.ensure_status(self.status.is_receivable(), "receive")?;

        if self.status == PurchaseOrderStatus::Delivered && self.received_by.is_some() {
            return Err(DomainError::conflict(
                "purchase order has already been received",
            ));
        }

        let mut received: Vec<ReceivedLine> = Vec::new();
        let mut seen: Vec<u32> = Vec::with_capacity(cmd.receipts.len());

        for receipt in &cmd.receipts {
            if receipt.quantity < Decimal::ZERO {
                return Err(DomainError::validation(
                    "received quantity cannot be negative",
                ));
            }
            if seen.contains(&receipt.line_no) {
                return Err(DomainError::validation(format!(
                    "line {} appears more than once",
                    receipt.line_no
                )));
            }
            seen.push(receipt.line_no);

            let line = self.line(receipt.line_no).ok_or_else(|| {
                DomainError::validation(format!("unknown line {}", receipt.line_no))
            })?;
            if receipt.quality_rating.is_some_and(|r| !(1..=5).contains(&r)) {
                return Err(DomainError::validation(
                    "quality rating must be between 1 and 5",
                ));
            }

            if receipt.quantity.is_zero() {
                continue;
            }

            let received_after = in_range(line.received_quantity.checked_add(receipt.quantity))?;
            in_range(received_after.checked_mul(line.unit_price))?;
            if received_after > line.ordered_quantity && !cmd.allow_over_delivery {
                return Err(DomainError::validation(format!(
                    "line {} would receive {received_after} of {} ordered",
                    line.line_no, line.ordered_quantity
                )));
            }

            let received_line = ReceivedLine {
                line_no: line.line_no,
                ingredient_id: line.ingredient_id,
                quantity: receipt.quantity,
                received_after,
                unit_price: line.unit_price,
                package_contents_quantity: line.package_contents_quantity,
                quality_rating: receipt.quality_rating,
                discrepancy_reason: receipt.discrepancy_reason.clone(),
            };
            received_line.base_quantity()?;
            received.push(received_line);
        }

        if received.is_empty() {
            return Err(DomainError::validation(
                "receipt has no positive quantities",
            ));
        }

        let fully_received = self.lines.iter().all(|line| {
            let after = received
                .iter()
                .find(|r| r.line_no == line.line_no)
                .map_or(line.received_quantity, |r| r.received_after);
            after >= line.ordered_quantity
        });
        let status_after = if fully_received || cmd.close_partial {
            PurchaseOrderStatus::Delivered
        } else {
            PurchaseOrderStatus::PartiallyDelivered
        };

        Ok(vec![PurchaseOrderEvent::ItemsReceived(ItemsReceived {
            restaurant_id: cmd.restaurant_id,
            order_id: cmd.order_id,
            lines: received,
            received_by: cmd.received_by,
            delivery_date: cmd.delivery_date,
            condition: cmd.condition,
            status_after,
            receiving_closed: !fully_received && cmd.close_partial,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_manual_delivery(
        &self,
        cmd: &RecordManualDelivery,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase order already exists"));
        }

        let supplier = SupplierRef::External {
            name: cmd.supplier_name.trim().to_string(),
            contact: cmd.supplier_contact.clone(),
        };
        validate_supplier(&supplier)?;

        let mut lines = build_lines(&cmd.lines)?;
        for line in &mut lines {
            line.received_quantity = line.ordered_quantity;
        }
        let totals = OrderTotals::compute(&lines, cmd.tax_rate, cmd.discount_amount)?;

        Ok(vec![PurchaseOrderEvent::ManualDeliveryRecorded(
            ManualDeliveryRecorded {
                restaurant_id: cmd.restaurant_id,
                order_id: cmd.order_id,
                supplier,
                lines,
                totals,
                delivery_date: cmd.delivery_date,
                condition: cmd.condition,
                received_by: cmd.received_by,
                notes: cmd.notes.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}
