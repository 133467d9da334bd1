//! Integer coin arithmetic.
//!
//! All balances and prices are whole coins stored as `i64`. Every
//! operation that can overflow goes through a checked helper here.

use crate::error::MoneyError;

/// Coins, the platform currency unit.
pub type Coins = i64;

/// Largest single transfer, deposit, or withdrawal.
pub const MAX_TRANSFER_AMOUNT: Coins = 10_000_000;

/// Basis-point denominator (100% = 10_000 bps).
pub const BPS_DENOMINATOR: i64 = 10_000;

/// Validate a single money movement amount.
pub fn validate_amount(amount: Coins) -> Result<Coins, MoneyError> {
    if amount <= 0 {
        return Err(MoneyError::NonPositive);
    }
    if amount > MAX_TRANSFER_AMOUNT {
        return Err(MoneyError::TooLarge(amount, MAX_TRANSFER_AMOUNT));
    }
    Ok(amount)
}

/// `price * quantity`, failing on overflow or non-positive inputs.
pub fn checked_total(price: Coins, quantity: i64) -> Result<Coins, MoneyError> {
    if price <= 0 || quantity <= 0 {
        return Err(MoneyError::NonPositive);
    }
    price.checked_mul(quantity).ok_or(MoneyError::Overflow)
}

/// Platform fee for `total` at `fee_bps`, rounded down.
pub fn platform_fee(total: Coins, fee_bps: u32) -> Result<Coins, MoneyError> {
    let bps = i64::from(fee_bps.min(BPS_DENOMINATOR as u32));
    let scaled = (total as i128) * (bps as i128) / (BPS_DENOMINATOR as i128);
    Coins::try_from(scaled).map_err(|_| MoneyError::Overflow)
}

/// How a gross amount is split between the recipient and the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub total: Coins,
    pub fee: Coins,
    pub net: Coins,
}

impl FeeSplit {
    pub fn compute(total: Coins, fee_bps: u32) -> Result<Self, MoneyError> {
        if total <= 0 {
            return Err(MoneyError::NonPositive);
        }
        let fee = platform_fee(total, fee_bps)?;
        Ok(Self {
            total,
            fee,
            net: total - fee,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_amount_bounds() {
        assert_eq!(validate_amount(1), Ok(1));
        assert_eq!(validate_amount(MAX_TRANSFER_AMOUNT), Ok(MAX_TRANSFER_AMOUNT));
        assert_eq!(validate_amount(0), Err(MoneyError::NonPositive));
        assert_eq!(validate_amount(-5), Err(MoneyError::NonPositive));
        assert!(matches!(
            validate_amount(MAX_TRANSFER_AMOUNT + 1),
            Err(MoneyError::TooLarge(_, _))
        ));
    }

    #[test]
    fn test_checked_total_overflow() {
        assert_eq!(checked_total(25, 4), Ok(100));
        assert_eq!(checked_total(i64::MAX, 2), Err(MoneyError::Overflow));
        assert_eq!(checked_total(10, 0), Err(MoneyError::NonPositive));
    }

    #[test]
    fn test_fee_split_rounds_down() {
        let split = FeeSplit::compute(99, 2000).unwrap();
        // 20% of 99 = 19.8 -> 19
        assert_eq!(split.fee, 19);
        assert_eq!(split.net, 80);
        assert_eq!(split.fee + split.net, split.total);
    }

    #[test]
    fn test_fee_split_caps_bps() {
        let split = FeeSplit::compute(100, 50_000).unwrap();
        assert_eq!(split.fee, 100);
        assert_eq!(split.net, 0);

        let free = FeeSplit::compute(100, 0).unwrap();
        assert_eq!(free.fee, 0);
        assert_eq!(free.net, 100);
    }
}
