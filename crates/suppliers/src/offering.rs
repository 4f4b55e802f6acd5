use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use galley_core::money::in_range;
use galley_core::{DomainError, DomainResult};
use galley_inventory::IngredientId;

/// What a supplier sells for one ingredient and in what packaging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierOffering {
    pub ingredient_id: IngredientId,
    /// e.g. "box", "sack", "crate".
    pub package_unit: String,
    /// Base units of the ingredient inside one package.
    pub package_contents_quantity: Decimal,
    pub package_price: Decimal,
    pub lead_time_days: u32,
    /// Smallest order, in packages.
    pub minimum_order_quantity: Decimal,
    /// Largest order, in packages (uncapped when `None`).
    pub maximum_order_quantity: Option<Decimal>,
    pub active: bool,
}

impl SupplierOffering {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.package_unit.trim().is_empty() {
            return Err(DomainError::validation("package unit cannot be empty"));
        }
        if self.package_contents_quantity <= Decimal::ZERO {
            return Err(DomainError::validation(
                "package contents quantity must be positive",
            ));
        }
        if self.package_price < Decimal::ZERO {
            return Err(DomainError::validation("package price cannot be negative"));
        }
        if self.minimum_order_quantity < Decimal::ZERO {
            return Err(DomainError::validation(
                "minimum order quantity cannot be negative",
            ));
        }
        if let Some(max) = self.maximum_order_quantity {
            if max <= Decimal::ZERO || max < self.minimum_order_quantity {
                return Err(DomainError::validation(
                    "maximum order quantity must be positive and not below the minimum",
                ));
            }
        }
        Ok(())
    }

    /// Base-unit cost when buying by the package.
    pub fn unit_cost(&self) -> DomainResult<Decimal> {
        in_range(self.package_price.checked_div(self.package_contents_quantity))
    }

    /// Base-unit quantity of `packages` packages.
    pub fn base_quantity(&self, packages: Decimal) -> DomainResult<Decimal> {
        in_range(packages.checked_mul(self.package_contents_quantity))
    }

    /// Whole packages needed to cover `shortage` base units, at least the minimum order.
    pub fn packages_to_cover(&self, shortage: Decimal) -> DomainResult<Decimal> {
        let packages = in_range(shortage.checked_div(self.package_contents_quantity))?.ceil();
        Ok(packages.max(self.minimum_order_quantity))
    }

    /// Check an order quantity (in packages) against the offering's bounds.
    pub fn check_order_quantity(&self, packages: Decimal) -> Result<(), DomainError> {
        if packages < self.minimum_order_quantity {
            return Err(DomainError::validation(format!(
                "ordered {packages} {} is below the minimum order of {}",
                self.package_unit, self.minimum_order_quantity
            )));
        }
        if let Some(max) = self.maximum_order_quantity {
            if packages > max {
                return Err(DomainError::validation(format!(
                    "ordered {packages} {} exceeds the maximum order of {max}",
                    self.package_unit
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galley_core::AggregateId;
    use rust_decimal_macros::dec;

    fn offering() -> SupplierOffering {
        SupplierOffering {
            ingredient_id: IngredientId::new(AggregateId::new()),
            package_unit: "sack".to_string(),
            package_contents_quantity: dec!(25),
            package_price: dec!(50),
            lead_time_days: 2,
            minimum_order_quantity: dec!(2),
            maximum_order_quantity: Some(dec!(40)),
            active: true,
        }
    }

    #[test]
    fn converts_packages_to_base_units() {
        let o = offering();
        assert_eq!(o.unit_cost(), Ok(dec!(2)));
        assert_eq!(o.base_quantity(dec!(3)), Ok(dec!(75)));
        assert!(o.base_quantity(Decimal::MAX).is_err());
    }

    #[test]
    fn packages_round_up_and_respect_minimum() {
        let o = offering();
        assert_eq!(o.packages_to_cover(dec!(10)), Ok(dec!(2)));
        assert_eq!(o.packages_to_cover(dec!(51)), Ok(dec!(3)));
        assert_eq!(o.packages_to_cover(dec!(75)), Ok(dec!(3)));
    }

    #[test]
    fn order_bounds_are_checked() {
        let o = offering();
        assert!(o.check_order_quantity(dec!(1)).is_err());
        assert!(o.check_order_quantity(dec!(41)).is_err());
        assert!(o.check_order_quantity(dec!(40)).is_ok());
    }

    #[test]
    fn max_below_min_is_invalid() {
        let mut o = offering();
        o.maximum_order_quantity = Some(dec!(1));
        assert!(matches!(o.validate(), Err(DomainError::Validation(_))));
    }
}
