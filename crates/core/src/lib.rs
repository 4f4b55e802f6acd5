//! `galley-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the aggregate contract, the domain error model, caller identity
//! and money rounding rules shared by every procurement module.

pub mod aggregate;
pub mod caller;
pub mod error;
pub mod id;
pub mod money;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use caller::{Caller, StaffRole};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, RestaurantId, UserId};
