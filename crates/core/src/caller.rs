//! Explicit caller identity.
//!
//! Every mutating operation receives the acting user and the restaurant they act
//! within as a value. There is no ambient "current user" anywhere in the domain.

use serde::{Deserialize, Serialize};

use crate::id::{RestaurantId, UserId};

/// Staff role inside a restaurant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaffRole {
    Owner,
    Manager,
    Staff,
}

impl StaffRole {
    /// Whether this role may approve purchase orders and send them to suppliers.
    pub fn can_approve_purchases(self) -> bool {
        matches!(self, StaffRole::Owner | StaffRole::Manager)
    }
}

/// The authenticated actor on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: UserId,
    pub restaurant_id: RestaurantId,
    pub role: StaffRole,
}

impl Caller {
    pub fn new(user_id: UserId, restaurant_id: RestaurantId, role: StaffRole) -> Self {
        Self {
            user_id,
            restaurant_id,
            role,
        }
    }
}
