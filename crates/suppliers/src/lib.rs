//! Suppliers domain module (event-sourced).
//!
//! A [`Supplier`] owns its catalogue of [`SupplierOffering`]s (one per
//! ingredient) and the [`PaymentTerms`] its bills fall due under.

pub mod offering;
pub mod supplier;
pub mod terms;

pub use offering::SupplierOffering;
pub use supplier::{
    ContactInfo, OfferingUpserted, OfferingWithdrawn, RegisterSupplier, SetSupplierStatus,
    Supplier, SupplierCommand, SupplierDetailsUpdated, SupplierEvent, SupplierId,
    SupplierRegistered, SupplierStatus, SupplierStatusChanged, UpdateSupplierDetails,
    UpsertOffering, WithdrawOffering,
};
pub use terms::PaymentTerms;
