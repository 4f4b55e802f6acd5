//! Billing domain module (supplier bills and payments, event-sourced).
//!
//! A [`SupplierBill`] tracks what is owed for one delivered purchase order; each
//! [`SupplierPayment`] is an immutable record of money paid against one bill.
//! The two are kept consistent by the application layer, which commits the
//! bill and payment streams together.

pub mod bill;
pub mod payment;

pub use bill::{
    AppliedPayment, ApplyPayment, BillAmounts, BillCancelled, BillIssued, BillMarkedOverdue, BillStatus,
    CancelBill, IssueBill, MarkOverdue, PaymentApplied, PaymentReversed, ReversePayment,
    SupplierBill, SupplierBillCommand, SupplierBillEvent, SupplierBillId, bill_number,
    derive_status,
};
pub use payment::{
    AmendPayment, CancelPayment, PaymentAmended, PaymentCancelled, PaymentId, PaymentMethod,
    PaymentRecorded, PaymentStatus, RecordPayment, SupplierPayment, SupplierPaymentCommand,
    SupplierPaymentEvent,
};
