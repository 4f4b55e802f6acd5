//! Bill generation from delivered purchase orders.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use galley_billing::{
    BillAmounts, BillStatus, IssueBill, SupplierBill, SupplierBillCommand, SupplierBillId,
};
use galley_core::{Caller, DomainResult};
use galley_core::money::{in_range, round_money};
use galley_events::{EventBus, EventEnvelope};
use galley_infra::EventStore;
use galley_purchasing::{PurchaseOrder, PurchaseOrderId, PurchaseOrderStatus};
use galley_suppliers::PaymentTerms;

use crate::error::{ProcurementError, Warning};
use crate::notify::BILL_GENERATION_FAILED;
use crate::service::{Procurement, make_bill, make_supplier};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillOptions {
    /// Defaults to today.
    #[serde(default)]
    pub bill_date: Option<NaiveDate>,
    /// Overrides the supplier's terms.
    #[serde(default)]
    pub payment_terms: Option<PaymentTerms>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkBillEntry {
    pub order_id: PurchaseOrderId,
    pub result: Result<SupplierBill, ProcurementError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkBillOutcome {
    pub success_count: usize,
    pub error_count: usize,
    pub results: Vec<BulkBillEntry>,
}

/// Bill amounts for what was actually received.
///
/// A fully received order bills its own totals. Otherwise tax and discount
/// are scaled by `received subtotal / ordered subtotal`.
pub fn billable_amounts(order: &PurchaseOrder) -> DomainResult<BillAmounts> {
    let totals = order.totals();
    let subtotal = order.received_subtotal()?;

    if subtotal == totals.subtotal {
        return Ok(BillAmounts {
            subtotal,
            tax_amount: totals.tax_amount,
            discount_amount: totals.discount_amount,
            total_amount: totals.total_amount,
        });
    }

    let (tax_amount, discount_amount) = if totals.subtotal.is_zero() {
        (Decimal::ZERO, Decimal::ZERO)
    } else {
        let ratio = in_range(subtotal.checked_div(totals.subtotal))?;
        (
            round_money(in_range(totals.tax_amount.checked_mul(ratio))?),
            round_money(in_range(totals.discount_amount.checked_mul(ratio))?),
        )
    };
    let total_amount = in_range(
        subtotal
            .checked_add(tax_amount)
            .and_then(|gross| gross.checked_sub(discount_amount)),
    )?;

    Ok(BillAmounts {
        subtotal,
        tax_amount,
        discount_amount,
        total_amount,
    })
}

impl<S, B> Procurement<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Issue the single bill of a delivered order.
    pub fn generate_bill(
        &self,
        caller: &Caller,
        order_id: PurchaseOrderId,
        options: &BillOptions,
    ) -> Result<SupplierBill, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        let bill_id = SupplierBillId::for_order(order_id);
        let _guard = self.lock(restaurant_id, [bill_id.0])?;

        let order = self.get_purchase_order(caller, order_id)?;
        if order.status() != PurchaseOrderStatus::Delivered {
            return Err(ProcurementError::validation(format!(
                "purchase order {order_id} is {}; only delivered orders can be billed",
                order.status()
            )));
        }

        let payment_terms = match (options.payment_terms, order.supplier_id()) {
            (Some(terms), _) => terms,
            (None, Some(supplier_id)) => {
                let supplier = self
                    .dispatcher
                    .load(restaurant_id, supplier_id.0, make_supplier)?;
                if supplier.is_created() {
                    supplier.payment_terms()
                } else {
                    self.settings.default_payment_terms
                }
            }
            (None, None) => self.settings.default_payment_terms,
        };

        let command = SupplierBillCommand::IssueBill(IssueBill {
            restaurant_id,
            bill_id,
            purchase_order_id: Some(order_id),
            supplier_id: order.supplier_id(),
            supplier_name: order
                .supplier()
                .map(|s| s.name().to_string())
                .unwrap_or_default(),
            bill_date: options.bill_date.unwrap_or_else(|| self.clock.today()),
            payment_terms,
            amounts: billable_amounts(&order)?,
            issued_by: caller.user_id,
            occurred_at: self.clock.now(),
        });
        let bill = self.run(restaurant_id, bill_id.0, &command, make_bill)?;

        tracing::info!(
            %restaurant_id,
            %order_id,
            %bill_id,
            bill_number = %bill.bill_number(),
            total = %bill.total_amount(),
            "supplier bill generated"
        );
        Ok(bill)
    }

    /// Bill every order independently; one failure does not stop the rest.
    pub fn bulk_generate_bills(
        &self,
        caller: &Caller,
        order_ids: &[PurchaseOrderId],
        options: &BillOptions,
    ) -> BulkBillOutcome {
        let results: Vec<BulkBillEntry> = order_ids
            .iter()
            .map(|&order_id| {
                let result = self.generate_bill(caller, order_id, options);
                if let Err(err) = &result {
                    tracing::warn!(
                        restaurant_id = %caller.restaurant_id,
                        %order_id,
                        error = %err,
                        "bulk bill generation skipped order"
                    );
                }
                BulkBillEntry { order_id, result }
            })
            .collect();

        let success_count = results.iter().filter(|e| e.result.is_ok()).count();
        BulkBillOutcome {
            success_count,
            error_count: results.len() - success_count,
            results,
        }
    }

    /// Billing after a delivery. Failure leaves the delivery committed and is reported.
    pub(crate) fn bill_after_delivery(
        &self,
        caller: &Caller,
        order_id: PurchaseOrderId,
        warnings: &mut Vec<Warning>,
    ) -> Option<SupplierBill> {
        match self.generate_bill(caller, order_id, &BillOptions::default()) {
            Ok(bill) => Some(bill),
            Err(err) => {
                tracing::warn!(
                    restaurant_id = %caller.restaurant_id,
                    %order_id,
                    error = %err,
                    "bill generation failed after delivery"
                );
                warnings.push(Warning::new(
                    "bill_generation_failed",
                    format!("delivery recorded but the bill was not generated: {err}"),
                ));
                let payload = json!({
                    "order_id": order_id.to_string(),
                    "error": err.to_string(),
                });
                warnings.extend(self.notify(caller.restaurant_id, BILL_GENERATION_FAILED, payload));
                None
            }
        }
    }

    pub fn get_bill(
        &self,
        caller: &Caller,
        bill_id: SupplierBillId,
    ) -> Result<SupplierBill, ProcurementError> {
        let bill = self
            .dispatcher
            .load(caller.restaurant_id, bill_id.0, make_bill)?
            .into_inner();
        if !bill.is_created() {
            return Err(ProcurementError::not_found(format!("supplier bill {bill_id}")));
        }
        Ok(bill)
    }

    pub fn get_bill_for_order(
        &self,
        caller: &Caller,
        order_id: PurchaseOrderId,
    ) -> Result<SupplierBill, ProcurementError> {
        self.get_bill(caller, SupplierBillId::for_order(order_id))
    }

    /// Bills in issue order, optionally filtered by status.
    pub fn list_bills(
        &self,
        caller: &Caller,
        status: Option<BillStatus>,
    ) -> Result<Vec<SupplierBill>, ProcurementError> {
        let restaurant_id = caller.restaurant_id;
        let mut bills = Vec::new();
        for id in self.dispatcher.list::<SupplierBill>(restaurant_id)? {
            let bill = self.dispatcher.load(restaurant_id, id, make_bill)?.into_inner();
            if bill.is_created() && status.is_none_or(|s| bill.status() == s) {
                bills.push(bill);
            }
        }
        Ok(bills)
    }
}
