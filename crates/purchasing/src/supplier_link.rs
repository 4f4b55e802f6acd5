//! Signed, time-limited supplier response links.
//!
//! A token is `"{expires_unix}.{hex(hmac)}"` where the MAC is HMAC-SHA256 over
//! `restaurant_id|order_id|action|expires_unix`. The token alone authorises one
//! action on one order until it expires.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use galley_core::RestaurantId;

use crate::order::{PurchaseOrderId, SupplierResponse};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("malformed supplier link token")]
    Malformed,

    #[error("supplier link expired at {0}")]
    Expired(DateTime<Utc>),

    #[error("invalid supplier link signature")]
    InvalidSignature,

    #[error("invalid signing key")]
    InvalidKey,
}

/// Confirm/reject tokens handed to the supplier when an order is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierLinks {
    pub confirm_token: String,
    pub reject_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SupplierLinkSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl core::fmt::Debug for SupplierLinkSigner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SupplierLinkSigner")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl SupplierLinkSigner {
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn mac(
        &self,
        restaurant_id: RestaurantId,
        order_id: PurchaseOrderId,
        action: SupplierResponse,
        expires: i64,
    ) -> Result<HmacSha256, LinkError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| LinkError::InvalidKey)?;
        let payload = format!("{restaurant_id}|{order_id}|{}|{expires}", action.as_str());
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    pub fn sign(
        &self,
        restaurant_id: RestaurantId,
        order_id: PurchaseOrderId,
        action: SupplierResponse,
        expires_at: DateTime<Utc>,
    ) -> Result<String, LinkError> {
        let expires = expires_at.timestamp();
        let signature = self
            .mac(restaurant_id, order_id, action, expires)?
            .finalize()
            .into_bytes();
        Ok(format!("{expires}.{}", hex::encode(signature)))
    }

    /// Issue both response tokens, valid for the configured TTL from `now`.
    pub fn issue(
        &self,
        restaurant_id: RestaurantId,
        order_id: PurchaseOrderId,
        now: DateTime<Utc>,
    ) -> Result<SupplierLinks, LinkError> {
        let expires_at = now + self.ttl;
        Ok(SupplierLinks {
            confirm_token: self.sign(restaurant_id, order_id, SupplierResponse::Confirm, expires_at)?,
            reject_token: self.sign(restaurant_id, order_id, SupplierResponse::Reject, expires_at)?,
            expires_at,
        })
    }

    /// Check a token for this exact order and action (constant-time comparison).
    pub fn verify(
        &self,
        restaurant_id: RestaurantId,
        order_id: PurchaseOrderId,
        action: SupplierResponse,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<(), LinkError> {
        let (expires, signature) = token.split_once('.').ok_or(LinkError::Malformed)?;
        let expires: i64 = expires.parse().map_err(|_| LinkError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| LinkError::Malformed)?;

        self.mac(restaurant_id, order_id, action, expires)?
            .verify_slice(&signature)
            .map_err(|_| LinkError::InvalidSignature)?;

        let expires_at = DateTime::<Utc>::from_timestamp(expires, 0).ok_or(LinkError::Malformed)?;
        if now > expires_at {
            return Err(LinkError::Expired(expires_at));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use galley_core::AggregateId;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn signer() -> SupplierLinkSigner {
        SupplierLinkSigner::new("s3cret", Duration::hours(72))
    }

    #[test]
    fn issued_tokens_verify_for_their_action_only() {
        let restaurant_id = RestaurantId::new();
        let order_id = PurchaseOrderId::new(AggregateId::new());
        let links = signer().issue(restaurant_id, order_id, now()).unwrap();

        assert_eq!(links.expires_at, now() + Duration::hours(72));
        assert!(
            signer()
                .verify(restaurant_id, order_id, SupplierResponse::Confirm, &links.confirm_token, now())
                .is_ok()
        );
        assert_eq!(
            signer().verify(restaurant_id, order_id, SupplierResponse::Reject, &links.confirm_token, now()),
            Err(LinkError::InvalidSignature)
        );
    }

    #[test]
    fn tokens_are_bound_to_order_restaurant_and_secret() {
        let restaurant_id = RestaurantId::new();
        let order_id = PurchaseOrderId::new(AggregateId::new());
        let token = signer().sign(restaurant_id, order_id, SupplierResponse::Confirm, now()).unwrap();

        let other_order = PurchaseOrderId::new(AggregateId::new());
        assert!(
            signer()
                .verify(restaurant_id, other_order, SupplierResponse::Confirm, &token, now())
                .is_err()
        );
        assert!(
            signer()
                .verify(RestaurantId::new(), order_id, SupplierResponse::Confirm, &token, now())
                .is_err()
        );
        assert!(
            SupplierLinkSigner::new("other", Duration::hours(1))
                .verify(restaurant_id, order_id, SupplierResponse::Confirm, &token, now())
                .is_err()
        );
    }

    #[test]
    fn expired_and_malformed_tokens_are_rejected() {
        let restaurant_id = RestaurantId::new();
        let order_id = PurchaseOrderId::new(AggregateId::new());
        let links = signer().issue(restaurant_id, order_id, now()).unwrap();

        let later = now() + Duration::hours(73);
        assert!(matches!(
            signer().verify(restaurant_id, order_id, SupplierResponse::Confirm, &links.confirm_token, later),
            Err(LinkError::Expired(_))
        ));
        for bad in ["", "abc", "123.zz", "x.00"] {
            assert_eq!(
                signer().verify(restaurant_id, order_id, SupplierResponse::Confirm, bad, now()),
                Err(LinkError::Malformed)
            );
        }
    }

    #[test]
    fn tampered_expiry_breaks_signature() {
        let restaurant_id = RestaurantId::new();
        let order_id = PurchaseOrderId::new(AggregateId::new());
        let links = signer().issue(restaurant_id, order_id, now()).unwrap();
        let (_, sig) = links.confirm_token.split_once('.').unwrap();
        let forged = format!("{}.{sig}", (now() + Duration::days(365)).timestamp());

        assert_eq!(
            signer().verify(restaurant_id, order_id, SupplierResponse::Confirm, &forged, now()),
            Err(LinkError::InvalidSignature)
        );
    }
}
