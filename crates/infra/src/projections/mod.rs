//! Projection implementations (read model builders).
//!
//! Projections consume published envelopes and build query-optimized read
//! models. They are rebuildable from the event stream, partitioned by
//! restaurant and idempotent under at-least-once delivery.

pub mod ingredient_directory;

pub use ingredient_directory::{IngredientDirectory, IngredientDirectoryError, IngredientSummary};
