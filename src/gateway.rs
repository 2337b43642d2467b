//! Payment gateway boundary.
//!
//! The core never assumes a synchronous success from the gateway: it either
//! re-queries via `verify` or accepts a pushed verdict, and treats the verdict
//! as data. Gateway I/O always happens outside the settlement transaction.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Result of initiating a payment with the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayInitiation {
    pub transaction_id: String,
    pub payment_url: String,
}

/// A gateway's verdict on a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayVerdict {
    Success,
    Failed,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Registers a payment with the gateway, returning the gateway-assigned
    /// transaction id and the URL the customer completes payment on.
    async fn initiate(&self, amount: Decimal) -> Result<GatewayInitiation, ServiceError>;

    /// Re-queries the gateway for the verdict on a transaction.
    async fn verify(&self, transaction_id: &str) -> Result<GatewayVerdict, ServiceError>;
}

/// Deterministic in-process gateway for development and tests. `verdict` is
/// `None` for a gateway that errors on verification, modelling an
/// unreachable provider.
#[derive(Debug, Clone)]
pub struct MockGateway {
    verdict: Option<GatewayVerdict>,
}

impl MockGateway {
    pub fn succeeding() -> Self {
        Self {
            verdict: Some(GatewayVerdict::Success),
        }
    }

    pub fn failing() -> Self {
        Self {
            verdict: Some(GatewayVerdict::Failed),
        }
    }

    pub fn erroring() -> Self {
        Self { verdict: None }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn initiate(&self, _amount: Decimal) -> Result<GatewayInitiation, ServiceError> {
        let transaction_id = format!("MOCK-{}", Uuid::new_v4());
        let payment_url = format!("https://gateway.example/pay/{transaction_id}");
        Ok(GatewayInitiation {
            transaction_id,
            payment_url,
        })
    }

    async fn verify(&self, _transaction_id: &str) -> Result<GatewayVerdict, ServiceError> {
        self.verdict
            .ok_or_else(|| ServiceError::GatewayError("Gateway unreachable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn mock_gateway_assigns_unique_transaction_ids() {
        let gateway = MockGateway::succeeding();
        let a = gateway.initiate(dec!(100)).await.unwrap();
        let b = gateway.initiate(dec!(100)).await.unwrap();
        assert_ne!(a.transaction_id, b.transaction_id);
        assert!(a.payment_url.contains(&a.transaction_id));
    }

    #[tokio::test]
    async fn mock_gateway_returns_configured_verdict() {
        assert_eq!(
            MockGateway::failing().verify("MOCK-x").await.unwrap(),
            GatewayVerdict::Failed
        );
        assert_eq!(
            MockGateway::succeeding().verify("MOCK-x").await.unwrap(),
            GatewayVerdict::Success
        );
    }
}
