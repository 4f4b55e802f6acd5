use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use galley_core::money::is_whole_cents;
use galley_core::{Aggregate, AggregateId, AggregateRoot, DomainError, RestaurantId, UserId};
use galley_events::Event;

use crate::bill::SupplierBillId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub AggregateId);

impl PaymentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PaymentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Check,
    Gcash,
    Paypal,
    Paymongo,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Completed,
    Cancelled,
}

/// Aggregate root: SupplierPayment.
///
/// Amount and bill never change after recording; a wrong payment is cancelled
/// and recorded again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplierPayment {
    id: PaymentId,
    restaurant_id: Option<RestaurantId>,
    bill_id: Option<SupplierBillId>,
    payment_date: Option<NaiveDate>,
    amount: Decimal,
    method: PaymentMethod,
    reference: Option<String>,
    notes: Option<String>,
    status: PaymentStatus,
    recorded_by: Option<UserId>,
    cancellation_reason: Option<String>,
    version: u64,
    created: bool,
}

impl SupplierPayment {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PaymentId) -> Self {
        Self {
            id,
            restaurant_id: None,
            bill_id: None,
            payment_date: None,
            amount: Decimal::ZERO,
            method: PaymentMethod::Cash,
            reference: None,
            notes: None,
            status: PaymentStatus::Completed,
            recorded_by: None,
            cancellation_reason: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PaymentId {
        self.id
    }

    pub fn restaurant_id(&self) -> Option<RestaurantId> {
        self.restaurant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn bill_id(&self) -> Option<SupplierBillId> {
        self.bill_id
    }

    pub fn payment_date(&self) -> Option<NaiveDate> {
        self.payment_date
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn recorded_by(&self) -> Option<UserId> {
        self.recorded_by
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }
}

impl AggregateRoot for SupplierPayment {
    type Id = PaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub restaurant_id: RestaurantId,
    pub payment_id: PaymentId,
    pub bill_id: SupplierBillId,
    pub payment_date: NaiveDate,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelPayment {
    pub restaurant_id: RestaurantId,
    pub payment_id: PaymentId,
    pub reason: Option<String>,
    pub cancelled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AmendPayment (descriptive fields only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmendPayment {
    pub restaurant_id: RestaurantId,
    pub payment_id: PaymentId,
    pub method: Option<PaymentMethod>,
    pub reference: Option<String>,
    pub payment_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub amended_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupplierPaymentCommand {
    RecordPayment(RecordPayment),
    CancelPayment(CancelPayment),
    AmendPayment(AmendPayment),
}

/// Event: PaymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub restaurant_id: RestaurantId,
    pub payment_id: PaymentId,
    pub bill_id: SupplierBillId,
    pub payment_date: NaiveDate,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCancelled {
    pub restaurant_id: RestaurantId,
    pub payment_id: PaymentId,
    pub bill_id: SupplierBillId,
    pub amount: Decimal,
    pub reason: Option<String>,
    pub cancelled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentAmended. Only the changed fields are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAmended {
    pub restaurant_id: RestaurantId,
    pub payment_id: PaymentId,
    pub method: Option<PaymentMethod>,
    pub reference: Option<String>,
    pub payment_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub amended_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupplierPaymentEvent {
    PaymentRecorded(PaymentRecorded),
    PaymentCancelled(PaymentCancelled),
    PaymentAmended(PaymentAmended),
}

impl Event for SupplierPaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SupplierPaymentEvent::PaymentRecorded(_) => "billing.payment.recorded",
            SupplierPaymentEvent::PaymentCancelled(_) => "billing.payment.cancelled",
            SupplierPaymentEvent::PaymentAmended(_) => "billing.payment.amended",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SupplierPaymentEvent::PaymentRecorded(e) => e.occurred_at,
            SupplierPaymentEvent::PaymentCancelled(e) => e.occurred_at,
            SupplierPaymentEvent::PaymentAmended(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SupplierPayment {
    const AGGREGATE_TYPE: &'static str = "billing.payment";

    type Command = SupplierPaymentCommand;
    type Event = SupplierPaymentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SupplierPaymentEvent::PaymentRecorded(e) => {
                self.id = e.payment_id;
                self.restaurant_id = Some(e.restaurant_id);
                self.bill_id = Some(e.bill_id);
                self.payment_date = Some(e.payment_date);
                self.amount = e.amount;
                self.method = e.method;
                self.reference = e.reference.clone();
                self.notes = e.notes.clone();
                self.recorded_by = Some(e.recorded_by);
                self.status = PaymentStatus::Completed;
                self.created = true;
            }
            SupplierPaymentEvent::PaymentCancelled(e) => {
                self.status = PaymentStatus::Cancelled;
                self.cancellation_reason = e.reason.clone();
            }
            SupplierPaymentEvent::PaymentAmended(e) => {
                if let Some(method) = e.method {
                    self.method = method;
                }
                if let Some(reference) = &e.reference {
                    self.reference = Some(reference.clone());
                }
                if let Some(date) = e.payment_date {
                    self.payment_date = Some(date);
                }
                if let Some(notes) = &e.notes {
                    self.notes = Some(notes.clone());
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SupplierPaymentCommand::RecordPayment(cmd) => self.handle_record(cmd),
            SupplierPaymentCommand::CancelPayment(cmd) => self.handle_cancel(cmd),
            SupplierPaymentCommand::AmendPayment(cmd) => self.handle_amend(cmd),
        }
    }
}

impl SupplierPayment {
    fn ensure_existing(
        &self,
        restaurant_id: RestaurantId,
        payment_id: PaymentId,
    ) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("supplier payment {payment_id}")));
        }
        if self.restaurant_id != Some(restaurant_id) {
            return Err(DomainError::invariant("restaurant mismatch"));
        }
        if self.id != payment_id {
            return Err(DomainError::invariant("payment_id mismatch"));
        }
        Ok(())
    }

    fn handle_record(&self, cmd: &RecordPayment) -> Result<Vec<SupplierPaymentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("payment already recorded"));
        }
        if cmd.amount <= Decimal::ZERO {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        if !is_whole_cents(cmd.amount) {
            return Err(DomainError::validation(
                "payment amount must be in whole cents",
            ));
        }

        Ok(vec![SupplierPaymentEvent::PaymentRecorded(PaymentRecorded {
            restaurant_id: cmd.restaurant_id,
            payment_id: cmd.payment_id,
            bill_id: cmd.bill_id,
            payment_date: cmd.payment_date,
            amount: cmd.amount,
            method: cmd.method,
            reference: trimmed(&cmd.reference),
            notes: trimmed(&cmd.notes),
            recorded_by: cmd.recorded_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelPayment) -> Result<Vec<SupplierPaymentEvent>, DomainError> {
        self.ensure_existing(cmd.restaurant_id, cmd.payment_id)?;
        if self.status == PaymentStatus::Cancelled {
            return Err(DomainError::conflict("payment is already cancelled"));
        }
        let bill_id = self
            .bill_id
            .ok_or_else(|| DomainError::invariant("payment has no bill"))?;

        Ok(vec![SupplierPaymentEvent::PaymentCancelled(PaymentCancelled {
            restaurant_id: cmd.restaurant_id,
            payment_id: cmd.payment_id,
            bill_id,
            amount: self.amount,
            reason: trimmed(&cmd.reason),
            cancelled_by: cmd.cancelled_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_amend(&self, cmd: &AmendPayment) -> Result<Vec<SupplierPaymentEvent>, DomainError> {
        self.ensure_existing(cmd.restaurant_id, cmd.payment_id)?;
        if self.status != PaymentStatus::Completed {
            return Err(DomainError::conflict("only completed payments can be amended"));
        }

        let method = cmd.method.filter(|m| *m != self.method);
        let reference = trimmed(&cmd.reference).filter(|r| self.reference.as_deref() != Some(r.as_str()));
        let payment_date = cmd.payment_date.filter(|d| self.payment_date != Some(*d));
        let notes = trimmed(&cmd.notes).filter(|n| self.notes.as_deref() != Some(n.as_str()));

        if method.is_none() && reference.is_none() && payment_date.is_none() && notes.is_none() {
            return Ok(vec![]);
        }

        Ok(vec![SupplierPaymentEvent::PaymentAmended(PaymentAmended {
            restaurant_id: cmd.restaurant_id,
            payment_id: cmd.payment_id,
            method,
            reference,
            payment_date,
            notes,
            amended_by: cmd.amended_by,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
