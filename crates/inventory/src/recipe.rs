//! Dish recipes and stock requirements.
//!
//! Recipes are registered by the menu layer; inventory only needs to know how
//! much of each ingredient one serving consumes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use galley_core::money::in_range;
use galley_core::{AggregateId, DomainError, DomainResult};

use crate::ingredient::IngredientId;

/// Dish identifier (owned by the menu layer).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DishId(pub AggregateId);

impl DishId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DishId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Base-unit quantity of one ingredient per serving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeLine {
    pub ingredient_id: IngredientId,
    pub quantity_per_serving: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    dish_id: DishId,
    dish_name: String,
    lines: Vec<RecipeLine>,
}

/// Total base-unit quantity of an ingredient needed for some number of servings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub ingredient_id: IngredientId,
    pub required: Decimal,
}

/// Gap between what a dish needs and what is on the shelf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortage {
    pub ingredient_id: IngredientId,
    pub required: Decimal,
    pub available: Decimal,
    pub shortage: Decimal,
}

impl Shortage {
    /// `None` when the available stock covers the requirement.
    pub fn between(ingredient_id: IngredientId, required: Decimal, available: Decimal) -> Option<Self> {
        let shortage = required - available;
        (shortage > Decimal::ZERO).then_some(Self {
            ingredient_id,
            required,
            available,
            shortage,
        })
    }
}

impl Recipe {
    pub fn new(
        dish_id: DishId,
        dish_name: impl Into<String>,
        lines: Vec<RecipeLine>,
    ) -> Result<Self, DomainError> {
        let dish_name = dish_name.into();
        if dish_name.trim().is_empty() {
            return Err(DomainError::validation("dish name cannot be empty"));
        }
        if lines.is_empty() {
            return Err(DomainError::validation("recipe needs at least one ingredient"));
        }
        if lines.iter().any(|l| l.quantity_per_serving <= Decimal::ZERO) {
            return Err(DomainError::validation(
                "quantity per serving must be positive",
            ));
        }

        Ok(Self {
            dish_id,
            dish_name,
            lines,
        })
    }

    pub fn dish_id(&self) -> DishId {
        self.dish_id
    }

    pub fn dish_name(&self) -> &str {
        &self.dish_name
    }

    pub fn lines(&self) -> &[RecipeLine] {
        &self.lines
    }

    /// Requirements for `servings`, one entry per ingredient in first-seen order.
    ///
    /// Lines naming the same ingredient twice are summed.
    pub fn requirements(&self, servings: u32) -> DomainResult<Vec<Requirement>> {
        let servings = Decimal::from(servings);
        let mut out: Vec<Requirement> = Vec::with_capacity(self.lines.len());

        for line in &self.lines {
            let needed = in_range(line.quantity_per_serving.checked_mul(servings))?;
            match out.iter_mut().find(|r| r.ingredient_id == line.ingredient_id) {
                Some(existing) => {
                    existing.required = in_range(existing.required.checked_add(needed))?;
                }
                None => out.push(Requirement {
                    ingredient_id: line.ingredient_id,
                    required: needed,
                }),
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ingredient() -> IngredientId {
        IngredientId::new(AggregateId::new())
    }

    #[test]
    fn requirements_scale_and_merge_duplicate_lines() {
        let flour = ingredient();
        let egg = ingredient();
        let recipe = Recipe::new(
            DishId::new(AggregateId::new()),
            "Pancakes",
            vec![
                RecipeLine { ingredient_id: flour, quantity_per_serving: dec!(0.2) },
                RecipeLine { ingredient_id: egg, quantity_per_serving: dec!(1) },
                RecipeLine { ingredient_id: flour, quantity_per_serving: dec!(0.05) },
            ],
        )
        .unwrap();

        let reqs = recipe.requirements(4).unwrap();
        assert_eq!(
            reqs,
            vec![
                Requirement { ingredient_id: flour, required: dec!(1.00) },
                Requirement { ingredient_id: egg, required: dec!(4) },
            ]
        );
    }

    #[test]
    fn requirements_that_cannot_be_represented_are_rejected() {
        let recipe = Recipe::new(
            DishId::new(AggregateId::new()),
            "Banquet",
            vec![RecipeLine { ingredient_id: ingredient(), quantity_per_serving: Decimal::MAX }],
        )
        .unwrap();

        assert_eq!(recipe.requirements(1).unwrap()[0].required, Decimal::MAX);
        assert!(matches!(recipe.requirements(2), Err(DomainError::Validation(_))));
    }

    #[test]
    fn shortage_only_when_positive() {
        let id = ingredient();
        assert!(Shortage::between(id, dec!(5), dec!(5)).is_none());
        let s = Shortage::between(id, dec!(5), dec!(3.5)).unwrap();
        assert_eq!(s.shortage, dec!(1.5));
    }

    #[test]
    fn rejects_empty_and_non_positive_lines() {
        let dish = DishId::new(AggregateId::new());
        assert!(Recipe::new(dish, "Soup", vec![]).is_err());
        assert!(
            Recipe::new(
                dish,
                "Soup",
                vec![RecipeLine { ingredient_id: ingredient(), quantity_per_serving: dec!(0) }],
            )
            .is_err()
        );
    }
}
