//! Service dispatch — explicit handler registry in place of host-level
//! service registration.
//!
//! The registry is constructed at process start, shared behind `Arc`, and
//! dropped at process end. Callers invoke a service by its full dotted id
//! with an arbitrary JSON payload and await the reply through a oneshot
//! round-trip.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

/// Reply payload for a resolved service call.
pub type ServiceReply = Result<String, ServiceError>;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service not found: {0}")]
    NotFound(String),

    #[error("service call failed: {0}")]
    Failed(String),

    #[error("service dropped its reply")]
    Dropped,
}

// ── Handler trait ─────────────────────────────────────────────────────────────

/// A named service action invocable with a structured payload.
///
/// Implementations must be `Send + Sync` so the registry can be shared
/// behind `Arc`, and **must not block** the caller — either resolve
/// `reply_tx` synchronously or move it into a spawned task.
pub trait ServiceHandler: Send + Sync {
    /// Full dotted service id (e.g. `"openai_response.openai_input"`).
    ///
    /// Must be unique across all registered handlers.
    fn id(&self) -> &str;

    /// Handle an invocation, taking ownership of `reply_tx`.
    fn handle(&self, payload: Value, reply_tx: oneshot::Sender<ServiceReply>);
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Service id → handler map.
#[derive(Default)]
pub struct ServiceRegistry {
    handlers: HashMap<String, Box<dyn ServiceHandler>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    /// Register a handler under its id.
    ///
    /// # Panics
    ///
    /// Panics if two handlers share the same id — a programming error that
    /// must be caught before the process enters its run loop.
    pub fn register(&mut self, handler: Box<dyn ServiceHandler>) {
        let id = handler.id().to_string();
        if self.handlers.insert(id.clone(), handler).is_some() {
            panic!("duplicate service handler registered: {id:?}");
        }
    }

    /// Ids of all registered services, for startup logging.
    pub fn services(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Invoke `service` with `payload` and await the reply.
    pub async fn call(&self, service: &str, payload: Value) -> ServiceReply {
        let handler = self
            .handlers
            .get(service)
            .ok_or_else(|| ServiceError::NotFound(service.to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        debug!(%service, "dispatching service call");
        handler.handle(payload, reply_tx);

        reply_rx.await.map_err(|_| ServiceError::Dropped)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Echoes the payload's `text` field back, or fails when it is absent.
    struct EchoHandler;

    impl ServiceHandler for EchoHandler {
        fn id(&self) -> &str {
            "test.echo"
        }

        fn handle(&self, payload: Value, reply_tx: oneshot::Sender<ServiceReply>) {
            let reply = payload
                .get("text")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ServiceError::Failed("no text".into()));
            let _ = reply_tx.send(reply);
        }
    }

    /// Drops the reply sender without resolving it.
    struct SilentHandler;

    impl ServiceHandler for SilentHandler {
        fn id(&self) -> &str {
            "test.silent"
        }

        fn handle(&self, _payload: Value, _reply_tx: oneshot::Sender<ServiceReply>) {}
    }

    fn registry() -> ServiceRegistry {
        let mut r = ServiceRegistry::new();
        r.register(Box::new(EchoHandler));
        r.register(Box::new(SilentHandler));
        r
    }

    #[tokio::test]
    async fn call_round_trip() {
        let r = registry();
        let reply = r
            .call("test.echo", serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(reply, "hi");
    }

    #[tokio::test]
    async fn handler_error_propagates() {
        let r = registry();
        let err = r.call("test.echo", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ServiceError::Failed(_)));
    }

    #[tokio::test]
    async fn unknown_service_is_not_found() {
        let r = registry();
        let err = r.call("test.missing", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn dropped_reply_is_reported() {
        let r = registry();
        let err = r.call("test.silent", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ServiceError::Dropped));
    }

    #[test]
    #[should_panic(expected = "duplicate service handler")]
    fn duplicate_registration_panics() {
        let mut r = ServiceRegistry::new();
        r.register(Box::new(EchoHandler));
        r.register(Box::new(EchoHandler));
    }

    #[test]
    fn services_lists_registered_ids() {
        let r = registry();
        let mut ids = r.services();
        ids.sort();
        assert_eq!(ids, vec!["test.echo", "test.silent"]);
    }
}
