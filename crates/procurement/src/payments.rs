//! Payment ledger: payments against bills, reversals and the overdue sweep.
//!
//! A payment and the bill it settles always commit together.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use galley_billing::{
    AmendPayment, ApplyPayment, BillStatus, CancelBill, CancelPayment, MarkOverdue, PaymentId,
    PaymentMethod, RecordPayment, ReversePayment, SupplierBill, SupplierBillCommand,
    SupplierBillId, SupplierPayment, SupplierPaymentCommand,
};
use galley_core::{AggregateId, Caller, RestaurantId};
use galley_events::{EventBus, EventEnvelope};
use galley_infra::EventStore;

use crate::error::ProcurementError;
use crate::service::{Procurement, make_bill, make_payment};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayment {
    pub amount: Decimal,
    pub method: PaymentMethod,
    /// Defaults to today.
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Non-amount corrections; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentChanges {
    pub method: Option<PaymentMethod>,
    pub reference: Option<String>,
    pub payment_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// A payment together with the bill state it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub payment: SupplierPayment,
    pub bill: SupplierBill,
}

impl<S, B> Procurement<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn record_payment(
        &self,
        caller: &Caller,
        bill_id: SupplierBillId,
        new: NewPayment,
    ) -> Result<PaymentOutcome, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        let payment_id = PaymentId::new(AggregateId::new());
        let _guard = self.lock(restaurant_id, [bill_id.0])?;

        let now = self.clock.now();
        let mut tx = self.dispatcher.begin(restaurant_id);
        let mut bill = tx.load(bill_id.0, make_bill)?;
        if !bill.is_created() {
            return Err(ProcurementError::not_found(format!("supplier bill {bill_id}")));
        }
        let mut payment = tx.load(payment_id.0, make_payment)?;

        tx.execute(
            &mut bill,
            &SupplierBillCommand::ApplyPayment(ApplyPayment {
                restaurant_id,
                bill_id,
                payment_id,
                amount: new.amount,
                occurred_at: now,
            }),
        )?;
        tx.execute(
            &mut payment,
            &SupplierPaymentCommand::RecordPayment(RecordPayment {
                restaurant_id,
                payment_id,
                bill_id,
                payment_date: new.payment_date.unwrap_or_else(|| self.clock.today()),
                amount: new.amount,
                method: new.method,
                reference: new.reference,
                notes: new.notes,
                recorded_by: caller.user_id,
                occurred_at: now,
            }),
        )?;
        self.commit(tx)?;

        tracing::info!(
            %restaurant_id,
            %bill_id,
            %payment_id,
            amount = %new.amount,
            outstanding = %bill.outstanding_amount(),
            status = ?bill.status(),
            "payment recorded"
        );
        Ok(PaymentOutcome {
            payment: payment.into_inner(),
            bill: bill.into_inner(),
        })
    }

    /// Cancel a payment and give its amount back to the bill.
    pub fn cancel_payment(
        &self,
        caller: &Caller,
        payment_id: PaymentId,
        reason: Option<String>,
    ) -> Result<PaymentOutcome, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        let bill_id = self
            .get_payment(caller, payment_id)?
            .bill_id()
            .ok_or_else(|| ProcurementError::not_found(format!("bill of payment {payment_id}")))?;
        let _guard = self.lock(restaurant_id, [bill_id.0, payment_id.0])?;

        let now = self.clock.now();
        let mut tx = self.dispatcher.begin(restaurant_id);
        let mut payment = tx.load(payment_id.0, make_payment)?;
        let mut bill = tx.load(bill_id.0, make_bill)?;

        tx.execute(
            &mut payment,
            &SupplierPaymentCommand::CancelPayment(CancelPayment {
                restaurant_id,
                payment_id,
                reason,
                cancelled_by: caller.user_id,
                occurred_at: now,
            }),
        )?;
        tx.execute(
            &mut bill,
            &SupplierBillCommand::ReversePayment(ReversePayment {
                restaurant_id,
                bill_id,
                payment_id,
                today: self.clock.today(),
                occurred_at: now,
            }),
        )?;
        self.commit(tx)?;

        tracing::info!(
            %restaurant_id,
            %bill_id,
            %payment_id,
            amount = %payment.amount(),
            outstanding = %bill.outstanding_amount(),
            status = ?bill.status(),
            "payment cancelled"
        );
        Ok(PaymentOutcome {
            payment: payment.into_inner(),
            bill: bill.into_inner(),
        })
    }

    pub fn amend_payment(
        &self,
        caller: &Caller,
        payment_id: PaymentId,
        changes: PaymentChanges,
    ) -> Result<SupplierPayment, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        let _guard = self.lock(restaurant_id, [payment_id.0])?;
        let command = SupplierPaymentCommand::AmendPayment(AmendPayment {
            restaurant_id,
            payment_id,
            method: changes.method,
            reference: changes.reference,
            payment_date: changes.payment_date,
            notes: changes.notes,
            amended_by: caller.user_id,
            occurred_at: self.clock.now(),
        });
        self.run(restaurant_id, payment_id.0, &command, make_payment)
    }

    /// Cancel a bill that has no payments applied.
    pub fn cancel_bill(
        &self,
        caller: &Caller,
        bill_id: SupplierBillId,
        reason: &str,
    ) -> Result<SupplierBill, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        let _guard = self.lock(restaurant_id, [bill_id.0])?;
        let command = SupplierBillCommand::CancelBill(CancelBill {
            restaurant_id,
            bill_id,
            reason: reason.to_string(),
            cancelled_by: caller.user_id,
            occurred_at: self.clock.now(),
        });
        let bill = self.run(restaurant_id, bill_id.0, &command, make_bill)?;

        tracing::info!(%restaurant_id, %bill_id, "supplier bill cancelled");
        Ok(bill)
    }

    /// Flag every past-due bill with money owed. Returns the bills that flipped.
    ///
    /// Bills commit one by one; a failing bill is logged and skipped.
    pub fn mark_overdue(&self, caller: &Caller) -> Result<Vec<SupplierBillId>, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        let today = self.clock.today();
        let mut flipped = Vec::new();

        for id in self.dispatcher.list::<SupplierBill>(restaurant_id)? {
            let bill_id = SupplierBillId::new(id);
            match self.mark_bill_overdue(restaurant_id, bill_id, today) {
                Ok(true) => flipped.push(bill_id),
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(%restaurant_id, %bill_id, error = %err, "overdue check failed");
                }
            }
        }

        tracing::info!(%restaurant_id, %today, flipped = flipped.len(), "overdue sweep finished");
        Ok(flipped)
    }

    fn mark_bill_overdue(
        &self,
        restaurant_id: RestaurantId,
        bill_id: SupplierBillId,
        today: NaiveDate,
    ) -> Result<bool, ProcurementError> {
        let candidate = self.dispatcher.load(restaurant_id, bill_id.0, make_bill)?;
        if !candidate.is_due_for_overdue(today) {
            return Ok(false);
        }

        let _guard = self.lock(restaurant_id, [bill_id.0])?;
        let command = SupplierBillCommand::MarkOverdue(MarkOverdue {
            restaurant_id,
            bill_id,
            today,
            occurred_at: self.clock.now(),
        });
        let bill = self.run(restaurant_id, bill_id.0, &command, make_bill)?;
        Ok(bill.status() == BillStatus::Overdue)
    }

    pub fn get_payment(
        &self,
        caller: &Caller,
        payment_id: PaymentId,
    ) -> Result<SupplierPayment, ProcurementError> {
        let payment = self
            .dispatcher
            .load(caller.restaurant_id, payment_id.0, make_payment)?
            .into_inner();
        if !payment.is_created() {
            return Err(ProcurementError::not_found(format!("payment {payment_id}")));
        }
        Ok(payment)
    }

    /// Every payment recorded against a bill, cancelled ones included.
    pub fn list_payments(
        &self,
        caller: &Caller,
        bill_id: SupplierBillId,
    ) -> Result<Vec<SupplierPayment>, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        let mut payments = Vec::new();
        for id in self.dispatcher.list::<SupplierPayment>(restaurant_id)? {
            let payment = self.dispatcher.load(restaurant_id, id, make_payment)?.into_inner();
            if payment.bill_id() == Some(bill_id) {
                payments.push(payment);
            }
        }
        Ok(payments)
    }
}
