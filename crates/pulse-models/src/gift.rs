//! Virtual gifts sent to creators.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::MoneyError;
use crate::money::{checked_total, Coins, FeeSplit};

/// Maximum quantity of one gift per send.
pub const MAX_GIFT_QUANTITY: i32 = 100;

/// Default platform fee on gifts (20%).
pub const DEFAULT_GIFT_FEE_BPS: u32 = 2000;

/// Catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Gift {
    pub id: Uuid,
    pub name: String,
    pub price: Coins,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
pub struct CreateGiftRequest {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[validate(range(min = 1, max = 1_000_000))]
    pub price: Coins,
    #[validate(url)]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
pub struct SendGiftRequest {
    pub gift_id: Uuid,
    pub recipient_id: Uuid,
    pub stream_id: Option<Uuid>,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, max = "MAX_GIFT_QUANTITY"))]
    pub quantity: i32,
    #[validate(length(max = 200))]
    pub message: Option<String>,
}

fn default_quantity() -> i32 {
    1
}

/// A completed gift send.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GiftSend {
    pub id: Uuid,
    pub gift_id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<Uuid>,
    pub quantity: i32,
    pub total_price: Coins,
    pub platform_fee: Coins,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl GiftSend {
    pub fn recipient_amount(&self) -> Coins {
        self.total_price - self.platform_fee
    }
}

/// Price a gift send: `price * quantity`, split with the platform.
pub fn price_gift(price: Coins, quantity: i32, fee_bps: u32) -> Result<FeeSplit, MoneyError> {
    let total = checked_total(price, i64::from(quantity))?;
    FeeSplit::compute(total, fee_bps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_gift() {
        let split = price_gift(50, 3, DEFAULT_GIFT_FEE_BPS).unwrap();
        assert_eq!(split.total, 150);
        assert_eq!(split.fee, 30);
        assert_eq!(split.net, 120);
    }

    #[test]
    fn test_price_gift_rejects_zero_quantity() {
        assert_eq!(price_gift(50, 0, 0), Err(MoneyError::NonPositive));
    }

    #[test]
    fn test_send_request_defaults_quantity() {
        let request: SendGiftRequest = serde_json::from_value(serde_json::json!({
            "gift_id": Uuid::new_v4(),
            "recipient_id": Uuid::new_v4(),
        }))
        .unwrap();
        assert_eq!(request.quantity, 1);
        assert!(request.validate().is_ok());
    }
}
