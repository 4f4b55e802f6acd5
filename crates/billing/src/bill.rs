use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use galley_core::money::{in_range, is_whole_cents};
use galley_core::{Aggregate, AggregateId, AggregateRoot, DomainError, RestaurantId, UserId};
use galley_events::Event;
use galley_purchasing::PurchaseOrderId;
use galley_suppliers::{PaymentTerms, SupplierId};

use crate::payment::PaymentId;

/// Supplier bill identifier (restaurant-scoped via `restaurant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplierBillId(pub AggregateId);

impl SupplierBillId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    /// The one bill a purchase order can have.
    ///
    /// Deriving the id from the order makes a second bill for the same order
    /// collide on stream creation.
    pub fn for_order(order_id: PurchaseOrderId) -> Self {
        Self(AggregateId::derive(&order_id.0, "supplier-bill"))
    }
}

impl core::fmt::Display for SupplierBillId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// `BILL-YYYYMMDD-XXXXXXXX`, the suffix taken from the bill id.
pub fn bill_number(bill_date: NaiveDate, bill_id: SupplierBillId) -> String {
    let simple = bill_id.0.as_uuid().simple().to_string().to_uppercase();
    format!("BILL-{}-{}", bill_date.format("%Y%m%d"), &simple[..8])
}

/// Supplier bill status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Pending,
    PartiallyPaid,
    Paid,
    Overdue,
    Cancelled,
}

/// Status implied by the paid amount alone (overdue is layered on separately).
pub fn derive_status(total_amount: Decimal, paid_amount: Decimal) -> BillStatus {
    let outstanding = total_amount - paid_amount;
    if outstanding <= Decimal::ZERO {
        BillStatus::Paid
    } else if paid_amount > Decimal::ZERO {
        BillStatus::PartiallyPaid
    } else {
        BillStatus::Pending
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillAmounts {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
}

impl BillAmounts {
    fn validate(&self) -> Result<(), DomainError> {
        if self.subtotal < Decimal::ZERO
            || self.tax_amount < Decimal::ZERO
            || self.discount_amount < Decimal::ZERO
        {
            return Err(DomainError::validation("bill amounts cannot be negative"));
        }
        let expected = in_range(
            self.subtotal
                .checked_add(self.tax_amount)
                .and_then(|gross| gross.checked_sub(self.discount_amount)),
        )?;
        if self.total_amount != expected {
            return Err(DomainError::invariant(
                "bill total must equal subtotal + tax - discount",
            ));
        }
        if self.total_amount < Decimal::ZERO {
            return Err(DomainError::validation("bill total cannot be negative"));
        }
        Ok(())
    }
}

/// A payment currently counted towards the bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPayment {
    pub payment_id: PaymentId,
    pub amount: Decimal,
}

/// Aggregate root: SupplierBill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplierBill {
    id: SupplierBillId,
    restaurant_id: Option<RestaurantId>,
    purchase_order_id: Option<PurchaseOrderId>,
    supplier_id: Option<SupplierId>,
    supplier_name: String,
    bill_number: String,
    bill_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    payment_terms: PaymentTerms,
    amounts: BillAmounts,
    paid_amount: Decimal,
    status: BillStatus,
    payments: Vec<AppliedPayment>,
    cancellation_reason: Option<String>,
    version: u64,
    created: bool,
}

impl SupplierBill {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SupplierBillId) -> Self {
        Self {
            id,
            restaurant_id: None,
            purchase_order_id: None,
            supplier_id: None,
            supplier_name: String::new(),
            bill_number: String::new(),
            bill_date: None,
            due_date: None,
            payment_terms: PaymentTerms::default(),
            amounts: BillAmounts {
                subtotal: Decimal::ZERO,
                tax_amount: Decimal::ZERO,
                discount_amount: Decimal::ZERO,
                total_amount: Decimal::ZERO,
            },
            paid_amount: Decimal::ZERO,
            status: BillStatus::Pending,
            payments: Vec::new(),
            cancellation_reason: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SupplierBillId {
        self.id
    }

    pub fn restaurant_id(&self) -> Option<RestaurantId> {
        self.restaurant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn purchase_order_id(&self) -> Option<PurchaseOrderId> {
        self.purchase_order_id
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn supplier_name(&self) -> &str {
        &self.supplier_name
    }

    pub fn bill_number(&self) -> &str {
        &self.bill_number
    }

    pub fn bill_date(&self) -> Option<NaiveDate> {
        self.bill_date
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn payment_terms(&self) -> PaymentTerms {
        self.payment_terms
    }

    pub fn amounts(&self) -> &BillAmounts {
        &self.amounts
    }

    pub fn total_amount(&self) -> Decimal {
        self.amounts.total_amount
    }

    pub fn paid_amount(&self) -> Decimal {
        self.paid_amount
    }

    pub fn outstanding_amount(&self) -> Decimal {
        self.amounts.total_amount - self.paid_amount
    }

    pub fn status(&self) -> BillStatus {
        self.status
    }

    pub fn payments(&self) -> &[AppliedPayment] {
        &self.payments
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    /// Past due with money still owed, and not already flagged.
    pub fn is_due_for_overdue(&self, today: NaiveDate) -> bool {
        self.created
            && self.due_date.is_some_and(|due| due < today)
            && self.outstanding_amount() > Decimal::ZERO
            && matches!(self.status, BillStatus::Pending | BillStatus::PartiallyPaid)
    }
}

impl AggregateRoot for SupplierBill {
    type Id = SupplierBillId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: IssueBill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueBill {
    pub restaurant_id: RestaurantId,
    pub bill_id: SupplierBillId,
    pub purchase_order_id: Option<PurchaseOrderId>,
    pub supplier_id: Option<SupplierId>,
    pub supplier_name: String,
    pub bill_date: NaiveDate,
    pub payment_terms: PaymentTerms,
    pub amounts: BillAmounts,
    pub issued_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApplyPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyPayment {
    pub restaurant_id: RestaurantId,
    pub bill_id: SupplierBillId,
    pub payment_id: PaymentId,
    pub amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReversePayment (compensates a cancelled payment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversePayment {
    pub restaurant_id: RestaurantId,
    pub bill_id: SupplierBillId,
    pub payment_id: PaymentId,
    /// Used to decide whether the reopened balance is already overdue.
    pub today: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkOverdue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkOverdue {
    pub restaurant_id: RestaurantId,
    pub bill_id: SupplierBillId,
    pub today: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelBill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelBill {
    pub restaurant_id: RestaurantId,
    pub bill_id: SupplierBillId,
    pub reason: String,
    pub cancelled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupplierBillCommand {
    IssueBill(IssueBill),
    ApplyPayment(ApplyPayment),
    ReversePayment(ReversePayment),
    MarkOverdue(MarkOverdue),
    CancelBill(CancelBill),
}

/// Event: BillIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillIssued {
    pub restaurant_id: RestaurantId,
    pub bill_id: SupplierBillId,
    pub purchase_order_id: Option<PurchaseOrderId>,
    pub supplier_id: Option<SupplierId>,
    pub supplier_name: String,
    pub bill_number: String,
    pub bill_date: NaiveDate,
    pub due_date: NaiveDate,
    pub payment_terms: PaymentTerms,
    pub amounts: BillAmounts,
    pub issued_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentApplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentApplied {
    pub restaurant_id: RestaurantId,
    pub bill_id: SupplierBillId,
    pub payment_id: PaymentId,
    pub amount: Decimal,
    pub paid_after: Decimal,
    pub status_after: BillStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentReversed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReversed {
    pub restaurant_id: RestaurantId,
    pub bill_id: SupplierBillId,
    pub payment_id: PaymentId,
    pub amount: Decimal,
    pub paid_after: Decimal,
    pub status_after: BillStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BillMarkedOverdue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillMarkedOverdue {
    pub restaurant_id: RestaurantId,
    pub bill_id: SupplierBillId,
    pub as_of: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BillCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillCancelled {
    pub restaurant_id: RestaurantId,
    pub bill_id: SupplierBillId,
    pub reason: String,
    pub cancelled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupplierBillEvent {
    BillIssued(BillIssued),
    PaymentApplied(PaymentApplied),
    PaymentReversed(PaymentReversed),
    BillMarkedOverdue(BillMarkedOverdue),
    BillCancelled(BillCancelled),
}

impl Event for SupplierBillEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SupplierBillEvent::BillIssued(_) => "billing.bill.issued",
            SupplierBillEvent::PaymentApplied(_) => "billing.bill.payment_applied",
            SupplierBillEvent::PaymentReversed(_) => "billing.bill.payment_reversed",
            SupplierBillEvent::BillMarkedOverdue(_) => "billing.bill.marked_overdue",
            SupplierBillEvent::BillCancelled(_) => "billing.bill.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SupplierBillEvent::BillIssued(e) => e.occurred_at,
            SupplierBillEvent::PaymentApplied(e) => e.occurred_at,
            SupplierBillEvent::PaymentReversed(e) => e.occurred_at,
            SupplierBillEvent::BillMarkedOverdue(e) => e.occurred_at,
            SupplierBillEvent::BillCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SupplierBill {
    const AGGREGATE_TYPE: &'static str = "billing.bill";

    type Command = SupplierBillCommand;
    type Event = SupplierBillEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SupplierBillEvent::BillIssued(e) => {
                self.id = e.bill_id;
                self.restaurant_id = Some(e.restaurant_id);
                self.purchase_order_id = e.purchase_order_id;
                self.supplier_id = e.supplier_id;
                self.supplier_name = e.supplier_name.clone();
                self.bill_number = e.bill_number.clone();
                self.bill_date = Some(e.bill_date);
                self.due_date = Some(e.due_date);
                self.payment_terms = e.payment_terms;
                self.amounts = e.amounts.clone();
                self.paid_amount = Decimal::ZERO;
                self.status = BillStatus::Pending;
                self.payments.clear();
                self.created = true;
            }
            SupplierBillEvent::PaymentApplied(e) => {
                self.payments.push(AppliedPayment {
                    payment_id: e.payment_id,
                    amount: e.amount,
                });
                self.paid_amount = e.paid_after;
                self.status = e.status_after;
            }
            SupplierBillEvent::PaymentReversed(e) => {
                self.payments.retain(|p| p.payment_id != e.payment_id);
                self.paid_amount = e.paid_after;
                self.status = e.status_after;
            }
            SupplierBillEvent::BillMarkedOverdue(_) => {
                self.status = BillStatus::Overdue;
            }
            SupplierBillEvent::BillCancelled(e) => {
                self.cancellation_reason = Some(e.reason.clone());
                self.status = BillStatus::Cancelled;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SupplierBillCommand::IssueBill(cmd) => self.handle_issue(cmd),
            SupplierBillCommand::ApplyPayment(cmd) => self.handle_apply_payment(cmd),
            SupplierBillCommand::ReversePayment(cmd) => self.handle_reverse_payment(cmd),
            SupplierBillCommand::MarkOverdue(cmd) => self.handle_mark_overdue(cmd),
            SupplierBillCommand::CancelBill(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl SupplierBill {
    fn ensure_tenant(&self, restaurant_id: RestaurantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.restaurant_id != Some(restaurant_id) {
            return Err(DomainError::invariant("restaurant mismatch"));
        }
        Ok(())
    }

    fn ensure_bill_id(&self, bill_id: SupplierBillId) -> Result<(), DomainError> {
        if self.id != bill_id {
            return Err(DomainError::invariant("bill_id mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(
        &self,
        restaurant_id: RestaurantId,
        bill_id: SupplierBillId,
    ) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("supplier bill {bill_id}")));
        }
        self.ensure_tenant(restaurant_id)?;
        self.ensure_bill_id(bill_id)
    }

    fn handle_issue(&self, cmd: &IssueBill) -> Result<Vec<SupplierBillEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict(match cmd.purchase_order_id {
                Some(order_id) => format!("a bill already exists for purchase order {order_id}"),
                None => "supplier bill already exists".to_string(),
            }));
        }
        if cmd.supplier_name.trim().is_empty() {
            return Err(DomainError::validation("supplier name cannot be empty"));
        }
        cmd.amounts.validate()?;

        Ok(vec![SupplierBillEvent::BillIssued(BillIssued {
            restaurant_id: cmd.restaurant_id,
            bill_id: cmd.bill_id,
            purchase_order_id: cmd.purchase_order_id,
            supplier_id: cmd.supplier_id,
            supplier_name: cmd.supplier_name.trim().to_string(),
            bill_number: bill_number(cmd.bill_date, cmd.bill_id),
            bill_date: cmd.bill_date,
            due_date: cmd.payment_terms.due_date(cmd.bill_date),
            payment_terms: cmd.payment_terms,
            amounts: cmd.amounts.clone(),
            issued_by: cmd.issued_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_apply_payment(
        &self,
        cmd: &ApplyPayment,
    ) -> Result<Vec<SupplierBillEvent>, DomainError> {
        self.ensure_existing(cmd.restaurant_id, cmd.bill_id)?;

        if self.status == BillStatus::Cancelled {
            return Err(DomainError::validation(
                "cannot record a payment against a cancelled bill",
            ));
        }
        if cmd.amount <= Decimal::ZERO {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        if !is_whole_cents(cmd.amount) {
            return Err(DomainError::validation(
                "payment amount must be in whole cents",
            ));
        }
        if cmd.amount > self.outstanding_amount() {
            return Err(DomainError::validation(format!(
                "payment of {} exceeds outstanding balance of {}",
                cmd.amount,
                self.outstanding_amount()
            )));
        }
        if self.payments.iter().any(|p| p.payment_id == cmd.payment_id) {
            return Err(DomainError::conflict("payment already applied to this bill"));
        }

        let paid_after = self.paid_amount + cmd.amount;
        Ok(vec![SupplierBillEvent::PaymentApplied(PaymentApplied {
            restaurant_id: cmd.restaurant_id,
            bill_id: cmd.bill_id,
            payment_id: cmd.payment_id,
            amount: cmd.amount,
            paid_after,
            status_after: derive_status(self.amounts.total_amount, paid_after),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reverse_payment(
        &self,
        cmd: &ReversePayment,
    ) -> Result<Vec<SupplierBillEvent>, DomainError> {
        self.ensure_existing(cmd.restaurant_id, cmd.bill_id)?;

        let applied = self
            .payments
            .iter()
            .find(|p| p.payment_id == cmd.payment_id)
            .ok_or_else(|| DomainError::conflict("payment is not applied to this bill"))?;

        let paid_after = self.paid_amount - applied.amount;
        let mut status_after = derive_status(self.amounts.total_amount, paid_after);
        let past_due = self.due_date.is_some_and(|due| due < cmd.today);
        if status_after != BillStatus::Paid && past_due {
            status_after = BillStatus::Overdue;
        }

        Ok(vec![SupplierBillEvent::PaymentReversed(PaymentReversed {
            restaurant_id: cmd.restaurant_id,
            bill_id: cmd.bill_id,
            payment_id: cmd.payment_id,
            amount: applied.amount,
            paid_after,
            status_after,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_overdue(
        &self,
        cmd: &MarkOverdue,
    ) -> Result<Vec<SupplierBillEvent>, DomainError> {
        self.ensure_existing(cmd.restaurant_id, cmd.bill_id)?;

        if !self.is_due_for_overdue(cmd.today) {
            return Ok(vec![]);
        }

        Ok(vec![SupplierBillEvent::BillMarkedOverdue(BillMarkedOverdue {
            restaurant_id: cmd.restaurant_id,
            bill_id: cmd.bill_id,
            as_of: cmd.today,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelBill) -> Result<Vec<SupplierBillEvent>, DomainError> {
        self.ensure_existing(cmd.restaurant_id, cmd.bill_id)?;

        if self.status == BillStatus::Cancelled {
            return Err(DomainError::conflict("bill is already cancelled"));
        }
        if self.paid_amount > Decimal::ZERO {
            return Err(DomainError::conflict(
                "cannot cancel a bill with payments; cancel the payments first",
            ));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("cancellation reason is required"));
        }

        Ok(vec![SupplierBillEvent::BillCancelled(BillCancelled {
            restaurant_id: cmd.restaurant_id,
            bill_id: cmd.bill_id,
            reason: cmd.reason.trim().to_string(),
            cancelled_by: cmd.cancelled_by,
            occurred_at: cmd.occurred_at,
        })])
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use galley_events::execute;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn payment_id() -> PaymentId {
        PaymentId::new(AggregateId::new())
    }

    struct Fixture {
        restaurant_id: RestaurantId,
        bill_id: SupplierBillId,
        bill: SupplierBill,
    }

    impl Fixture {
        fn issued(total: Decimal) -> Self {
            let restaurant_id = RestaurantId::new();
            let order_id = PurchaseOrderId::new(AggregateId::new());
            let bill_id = SupplierBillId::for_order(order_id);
            let mut bill = SupplierBill::empty(bill_id);
            execute(
                &mut bill,
                &SupplierBillCommand::IssueBill(IssueBill {
                    restaurant_id,
                    bill_id,
                    purchase_order_id: Some(order_id),
                    supplier_id: None,
                    supplier_name: "Green Farms".to_string(),
                    bill_date: date(2024, 1, 1),
                    payment_terms: PaymentTerms::Net30,
                    amounts: BillAmounts {
                        subtotal: total,
                        tax_amount: Decimal::ZERO,
                        discount_amount: Decimal::ZERO,
                        total_amount: total,
                    },
                    issued_by: UserId::new(),
                    occurred_at: test_time(),
                }),
            )
            .unwrap();
            Self {
                restaurant_id,
                bill_id,
                bill,
            }
        }

        fn apply(&self, payment_id: PaymentId, amount: Decimal) -> SupplierBillCommand {
            SupplierBillCommand::ApplyPayment(ApplyPayment {
                restaurant_id: self.restaurant_id,
                bill_id: self.bill_id,
                payment_id,
                amount,
                occurred_at: test_time(),
            })
        }

        fn reverse(&self, payment_id: PaymentId, today: NaiveDate) -> SupplierBillCommand {
            SupplierBillCommand::ReversePayment(ReversePayment {
                restaurant_id: self.restaurant_id,
                bill_id: self.bill_id,
                payment_id,
                today,
                occurred_at: test_time(),
            })
        }

        fn mark_overdue(&self, today: NaiveDate) -> SupplierBillCommand {
            SupplierBillCommand::MarkOverdue(MarkOverdue {
                restaurant_id: self.restaurant_id,
                bill_id: self.bill_id,
                today,
                occurred_at: test_time(),
            })
        }

        fn cancel(&self) -> SupplierBillCommand {
            SupplierBillCommand::CancelBill(CancelBill {
                restaurant_id: self.restaurant_id,
                bill_id: self.bill_id,
                reason: "duplicate".to_string(),
                cancelled_by: UserId::new(),
                occurred_at: test_time(),
            })
        }

        fn run(&mut self, cmd: SupplierBillCommand) -> Result<Vec<SupplierBillEvent>, DomainError> {
            execute(&mut self.bill, &cmd)
        }
    }

    #[test]
    fn issue_sets_due_date_number_and_pending_status() {
        let fx = Fixture::issued(dec!(1000));
        assert_eq!(fx.bill.due_date(), Some(date(2024, 1, 31)));
        assert_eq!(fx.bill.status(), BillStatus::Pending);
        assert_eq!(fx.bill.outstanding_amount(), dec!(1000));
        assert!(fx.bill.bill_number().starts_with("BILL-20240101-"));
        assert_eq!(fx.bill.bill_number().len(), "BILL-20240101-".len() + 8);
    }

    #[test]
    fn zero_total_bill_starts_pending_and_never_goes_overdue() {
        let mut fx = Fixture::issued(Decimal::ZERO);
        assert_eq!(fx.bill.status(), BillStatus::Pending);
        assert_eq!(fx.bill.outstanding_amount(), Decimal::ZERO);

        let err = fx.run(fx.apply(payment_id(), dec!(0.01))).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(fx.run(fx.mark_overdue(date(2024, 6, 1))).unwrap().is_empty());
        assert_eq!(fx.bill.status(), BillStatus::Pending);
    }

    #[test]
    fn fractional_cent_payments_are_rejected() {
        let mut fx = Fixture::issued(dec!(10));

        let err = fx.run(fx.apply(payment_id(), dec!(0.001))).unwrap_err();
        assert_eq!(
            err,
            DomainError::validation("payment amount must be in whole cents")
        );
        assert_eq!(fx.bill.outstanding_amount(), dec!(10));
        assert_eq!(fx.bill.status(), BillStatus::Pending);

        fx.run(fx.apply(payment_id(), dec!(2.500))).unwrap();
        assert_eq!(fx.bill.outstanding_amount(), dec!(7.5));
    }

    #[test]
    fn second_issue_for_same_order_conflicts() {
        let fx = Fixture::issued(dec!(10));
        let err = fx
            .bill
            .handle(&SupplierBillCommand::IssueBill(IssueBill {
                restaurant_id: fx.restaurant_id,
                bill_id: fx.bill_id,
                purchase_order_id: fx.bill.purchase_order_id(),
                supplier_id: None,
                supplier_name: "Green Farms".to_string(),
                bill_date: date(2024, 1, 1),
                payment_terms: PaymentTerms::Cod,
                amounts: fx.bill.amounts().clone(),
                issued_by: UserId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn inconsistent_amounts_are_rejected() {
        let bill_id = SupplierBillId::new(AggregateId::new());
        let err = SupplierBill::empty(bill_id)
            .handle(&SupplierBillCommand::IssueBill(IssueBill {
                restaurant_id: RestaurantId::new(),
                bill_id,
                purchase_order_id: None,
                supplier_id: None,
                supplier_name: "Green Farms".to_string(),
                bill_date: date(2024, 1, 1),
                payment_terms: PaymentTerms::Net7,
                amounts: BillAmounts {
                    subtotal: dec!(100),
                    tax_amount: dec!(10),
                    discount_amount: dec!(0),
                    total_amount: dec!(100),
                },
                issued_by: UserId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn payments_move_bill_to_partially_paid_then_paid() {
        let mut fx = Fixture::issued(dec!(1000));

        fx.run(fx.apply(payment_id(), dec!(400))).unwrap();
        assert_eq!(fx.bill.status(), BillStatus::PartiallyPaid);
        assert_eq!(fx.bill.outstanding_amount(), dec!(600));

        fx.run(fx.apply(payment_id(), dec!(600))).unwrap();
        assert_eq!(fx.bill.status(), BillStatus::Paid);
        assert_eq!(fx.bill.outstanding_amount(), Decimal::ZERO);

        let before = fx.bill.clone();
        let err = fx.run(fx.apply(payment_id(), dec!(1))).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(fx.bill, before);
    }

    #[test]
    fn same_payment_cannot_be_applied_twice() {
        let mut fx = Fixture::issued(dec!(100));
        let id = payment_id();
        fx.run(fx.apply(id, dec!(10))).unwrap();
        let err = fx.run(fx.apply(id, dec!(10))).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn reversal_reopens_balance_and_respects_due_date() {
        let mut fx = Fixture::issued(dec!(1000));
        let first = payment_id();
        let second = payment_id();
        fx.run(fx.apply(first, dec!(400))).unwrap();
        fx.run(fx.apply(second, dec!(600))).unwrap();

        let mut before_due = fx.bill.clone();
        execute(&mut before_due, &fx.reverse(second, date(2024, 1, 15))).unwrap();
        assert_eq!(before_due.paid_amount(), dec!(400));
        assert_eq!(before_due.outstanding_amount(), dec!(600));
        assert_eq!(before_due.status(), BillStatus::PartiallyPaid);

        fx.run(fx.reverse(second, date(2024, 2, 15))).unwrap();
        assert_eq!(fx.bill.status(), BillStatus::Overdue);
        assert_eq!(fx.bill.payments().len(), 1);

        let err = fx.run(fx.reverse(second, date(2024, 2, 15))).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn overdue_only_for_unpaid_bills_past_due() {
        let mut fx = Fixture::issued(dec!(50));

        assert!(fx.run(fx.mark_overdue(date(2024, 1, 31))).unwrap().is_empty());
        fx.run(fx.mark_overdue(date(2024, 2, 1))).unwrap();
        assert_eq!(fx.bill.status(), BillStatus::Overdue);
        assert!(fx.run(fx.mark_overdue(date(2024, 2, 2))).unwrap().is_empty());

        // Paying it off clears overdue.
        fx.run(fx.apply(payment_id(), dec!(50))).unwrap();
        assert_eq!(fx.bill.status(), BillStatus::Paid);
        assert!(fx.run(fx.mark_overdue(date(2024, 3, 1))).unwrap().is_empty());
    }

    #[test]
    fn cancelled_bill_rejects_payments_and_paid_bill_cannot_be_cancelled() {
        let mut fx = Fixture::issued(dec!(50));

        let mut paid = fx.bill.clone();
        execute(&mut paid, &fx.apply(payment_id(), dec!(10))).unwrap();
        assert!(matches!(paid.handle(&fx.cancel()).unwrap_err(), DomainError::Conflict(_)));

        fx.run(fx.cancel()).unwrap();
        assert_eq!(fx.bill.status(), BillStatus::Cancelled);
        assert_eq!(fx.bill.cancellation_reason(), Some("duplicate"));
        let err = fx.run(fx.apply(payment_id(), dec!(1))).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(matches!(fx.run(fx.cancel()).unwrap_err(), DomainError::Conflict(_)));
    }

    #[test]
    fn derive_status_follows_paid_amount() {
        assert_eq!(derive_status(dec!(10), dec!(0)), BillStatus::Pending);
        assert_eq!(derive_status(dec!(10), dec!(3)), BillStatus::PartiallyPaid);
        assert_eq!(derive_status(dec!(10), dec!(10)), BillStatus::Paid);
        assert_eq!(derive_status(dec!(0), dec!(0)), BillStatus::Paid);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: outstanding = total - paid, never negative, and paid is the
        /// sum of applied payments across any mix of payments and reversals.
        #[test]
        fn outstanding_tracks_total_minus_paid(
            total_cents in 1i64..10_000_000i64,
            ops in prop::collection::vec((any::<bool>(), 1i64..5_000_000i64), 1..30)
        ) {
            let mut fx = Fixture::issued(Decimal::new(total_cents, 2));
            let mut applied: Vec<PaymentId> = Vec::new();

            for (pay, cents) in ops {
                if pay || applied.is_empty() {
                    let id = payment_id();
                    if fx.run(fx.apply(id, Decimal::new(cents, 2))).is_ok() {
                        applied.push(id);
                    }
                } else {
                    let id = applied.remove(cents as usize % applied.len());
                    prop_assert!(fx.run(fx.reverse(id, date(2024, 1, 2))).is_ok());
                }

                prop_assert_eq!(
                    fx.bill.outstanding_amount(),
                    fx.bill.total_amount() - fx.bill.paid_amount()
                );
                prop_assert!(fx.bill.outstanding_amount() >= Decimal::ZERO);
                let sum: Decimal = fx.bill.payments().iter().map(|p| p.amount).sum();
                prop_assert_eq!(sum, fx.bill.paid_amount());
            }
        }
    }
}
