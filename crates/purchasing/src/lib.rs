//! Purchasing domain module (purchase orders, event-sourced).
//!
//! This crate contains business rules for purchase orders, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage). Supplier
//! self-service responses are authenticated with [`SupplierLinkSigner`].

pub mod order;
pub mod supplier_link;

pub use order::{
    ApproveAndSend, CancelPurchaseOrder, CreatePurchaseOrder, DeletePurchaseOrder,
    DeliveryCondition, ItemsReceived, LineReceipt, ManualDeliveryRecorded, NewOrderLine,
    OrderLine, OrderTotals, PurchaseOrder, PurchaseOrderApproved, PurchaseOrderCancelled,
    PurchaseOrderCommand, PurchaseOrderCreated, PurchaseOrderDeleted, PurchaseOrderEvent,
    PurchaseOrderId, PurchaseOrderStatus, PurchaseOrderSubmitted, PurchaseOrderUpdated,
    ReceiveItems, ReceivedLine, RecordManualDelivery, RecordSupplierResponse, SubmitForApproval,
    SupplierRef, SupplierResponded, SupplierResponse, UpdatePurchaseOrder,
};
pub use supplier_link::{LinkError, SupplierLinkSigner, SupplierLinks};
