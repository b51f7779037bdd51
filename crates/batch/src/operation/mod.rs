//! Per-item operations
//!
//! The engine does not know what processing an item means. Callers inject an
//! [`ItemOperation`] that receives the item payload and reports one of three
//! outcomes:
//! - `Ok(())` - the item succeeded
//! - `Err(ItemFault::Validation)` - permanent fault, never retried
//! - `Err(ItemFault::Transient)` - retryable fault (timeouts, connection resets)

use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// Item-level fault returned by an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ItemFault {
    /// Permanent fault (e.g., malformed input)
    #[error("validation fault: {0}")]
    Validation(String),

    /// Retryable fault (e.g., timeout)
    #[error("transient fault: {0}")]
    Transient(String),
}

impl ItemFault {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// The fault text without the classification prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(message) | Self::Transient(message) => message,
        }
    }
}

/// Unclassified errors are assumed transient
impl From<anyhow::Error> for ItemFault {
    fn from(err: anyhow::Error) -> Self {
        Self::Transient(err.to_string())
    }
}

/// Result of one operation invocation
pub type OperationResult = Result<(), ItemFault>;

/// Side-effecting operation applied to every item payload
///
/// Implementations are shared by every partition worker and must be
/// thread-safe.
///
/// # Example
///
/// ```ignore
/// use chunkwise_batch::prelude::*;
///
/// struct SendEmail { client: SmtpClient }
///
/// #[async_trait]
/// impl ItemOperation for SendEmail {
///     async fn operate(&self, payload: &serde_json::Value) -> OperationResult {
///         let to = payload["to"].as_str()
///             .ok_or_else(|| ItemFault::validation("missing recipient"))?;
///         self.client.send(to).await.map_err(|e| ItemFault::transient(e.to_string()))
///     }
/// }
/// ```
#[async_trait]
pub trait ItemOperation: Send + Sync + 'static {
    /// Apply the operation to one payload
    async fn operate(&self, payload: &serde_json::Value) -> OperationResult;
}

type BoxedOperation =
    Box<dyn Fn(serde_json::Value) -> BoxFuture<'static, OperationResult> + Send + Sync>;

/// Closure-backed [`ItemOperation`]
///
/// The closure receives an owned copy of the payload.
pub struct OperationFn {
    f: BoxedOperation,
}

impl OperationFn {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OperationResult> + Send + 'static,
    {
        Self {
            f: Box::new(move |payload| Box::pin(f(payload))),
        }
    }
}

#[async_trait]
impl ItemOperation for OperationFn {
    async fn operate(&self, payload: &serde_json::Value) -> OperationResult {
        (self.f)(payload.clone()).await
    }
}

/// Wrap an async closure as an [`ItemOperation`]
pub fn operation_fn<F, Fut>(f: F) -> OperationFn
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = OperationResult> + Send + 'static,
{
    OperationFn::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_classification() {
        assert!(ItemFault::transient("timeout").is_retryable());
        assert!(!ItemFault::validation("bad address").is_retryable());
    }

    #[test]
    fn test_fault_display_and_message() {
        let fault = ItemFault::validation("bad address");
        assert_eq!(fault.to_string(), "validation fault: bad address");
        assert_eq!(fault.message(), "bad address");
    }

    #[test]
    fn test_anyhow_errors_are_transient() {
        let fault: ItemFault = anyhow::anyhow!("connection reset").into();
        assert_eq!(fault, ItemFault::transient("connection reset"));
    }

    #[test]
    fn test_fault_serialization() {
        let json = serde_json::to_value(ItemFault::transient("timeout")).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "transient", "message": "timeout"}));
    }

    #[tokio::test]
    async fn test_operation_fn() {
        let op = operation_fn(|payload| async move {
            match payload["to"].as_str() {
                Some(to) if to.contains('@') => Ok(()),
                _ => Err(ItemFault::validation("invalid address")),
            }
        });

        assert!(op.operate(&serde_json::json!({"to": "a@example.com"})).await.is_ok());
        assert_eq!(
            op.operate(&serde_json::json!({"to": "nobody"})).await,
            Err(ItemFault::validation("invalid address"))
        );
    }
}
