//! `galley-procurement` — restaurant procurement-to-payment service.
//!
//! Ties the domain aggregates (ingredients, suppliers, purchase orders, bills,
//! payments) to the event store, row locks and read models:
//!
//! - stock ledger: ingredients, manual movements, recipes, sales and waste
//! - purchase order lifecycle including signed supplier responses
//! - receiving against orders and manual deliveries
//! - bill generation, payments and the overdue sweep
//! - availability checks and orders drafted from shortages
//!
//! Every entry point takes an explicit [`galley_core::Caller`].

pub mod billing;
pub mod clock;
pub mod error;
pub mod lifecycle;
pub mod notify;
pub mod payments;
pub mod receiving;
pub mod service;
pub mod shortages;
pub mod stock;
pub mod suppliers;

pub use billing::{BillOptions, BulkBillEntry, BulkBillOutcome, billable_amounts};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ProcurementError, Warning};
pub use lifecycle::{
    NewPurchaseItem, NewPurchaseOrder, OrderSupplier, OrderTransition, PurchaseOrderChanges,
    SentOrder,
};
pub use notify::{BusNotifier, Notification, Notifier};
pub use payments::{NewPayment, PaymentChanges, PaymentOutcome};
pub use receiving::{Delivery, ManualDelivery, ManualItem, ReceiveOutcome};
pub use service::{EnvelopeBus, InMemoryProcurement, Procurement};
pub use shortages::{Availability, ShortageFailure, ShortageOrders, SkippedShortage};
pub use stock::{
    InventoryUpdate, NewIngredient, StockDeduction, StockReceipt, ingredient_id_for_name,
};
pub use suppliers::{NewSupplier, SupplierChanges};
