//! Money and quantity rounding rules.
//!
//! Amounts (bill totals, payments, taxes) are kept at two decimal places with
//! midpoint-away-from-zero rounding. Weighted-average unit costs are *not* rounded
//! here; they keep full `Decimal` precision so that value is conserved across receipts.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{DomainError, DomainResult};

/// Number of decimal places stored for currency amounts.
pub const MONEY_SCALE: u32 = 2;

/// Round a currency amount to cents.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Payment-style amounts must already be whole cents.
pub fn is_whole_cents(amount: Decimal) -> bool {
    amount.normalize().scale() <= MONEY_SCALE
}

/// `amount × rate`, rounded to cents (e.g. tax at 10%).
pub fn apply_rate(amount: Decimal, rate: Decimal) -> DomainResult<Decimal> {
    in_range(amount.checked_mul(rate)).map(round_money)
}

/// Turn the `None` of a `checked_*` operation into a validation error.
pub fn in_range(value: Option<Decimal>) -> DomainResult<Decimal> {
    value.ok_or_else(|| DomainError::validation("amount out of range"))
}

/// Overflow-checked sum.
pub fn checked_sum(
    values: impl IntoIterator<Item = DomainResult<Decimal>>,
) -> DomainResult<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, value| in_range(acc.checked_add(value?)))
}
