//! The always-present built-in service (§3 I5, §4.9 "Built-in service").
//!
//! `register_builtin` installs `{group:"", service:"built-in",
//! version:"1.0", public:true}` with `Hello` and `Metrics` into a
//! registry. The facade (§4.8) calls this once per instance so every
//! server exposes it regardless of what the embedder registers.

use crate::error::StatusError;
use crate::metrics::Metrics;
use crate::registry::{Callback, MethodDef, Registry, ReturnShape, ServiceDef};
use std::sync::Arc;

const SERVICE_NAME: &str = "built-in";
const SERVICE_VERSION: &str = "1.0";

/// Registers `Hello` and `Metrics` under the built-in service.
pub async fn register_builtin(registry: &Registry, metrics: Arc<Metrics>) {
    let hello_callback = Callback::new(
        vec![],
        false,
        ReturnShape::ValueAndError,
        Arc::new(|_ctx, _args| Box::pin(async { Ok(Some(serde_json::Value::String("olleh".into()))) })),
    );

    let metrics_for_closure = metrics.clone();
    let metrics_callback = Callback::new(
        vec![],
        false,
        ReturnShape::ValueAndError,
        Arc::new(move |_ctx, _args| {
            let metrics = metrics_for_closure.clone();
            Box::pin(async move {
                let snapshot = metrics.snapshot();
                let encoded = serde_json::to_string(&snapshot)
                    .map_err(|_| StatusError::parse_error())?;
                Ok(Some(serde_json::Value::String(encoded)))
            })
        }),
    );

    let _ = registry
        .register(ServiceDef {
            group: "".into(),
            name: SERVICE_NAME.into(),
            version: SERVICE_VERSION.into(),
            public: true,
            methods: vec![
                MethodDef {
                    name: "Hello".into(),
                    callback: hello_callback,
                },
                MethodDef {
                    name: "Metrics".into(),
                    callback: metrics_callback,
                },
            ],
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DispatchContext;

    #[tokio::test]
    async fn hello_returns_olleh() {
        let registry = Registry::new();
        register_builtin(&registry, Arc::new(Metrics::new())).await;

        let callback = registry
            .lookup("", SERVICE_NAME, SERVICE_VERSION, "Hello")
            .await
            .unwrap();
        let result = (callback.handler)(DispatchContext::new(None), vec![])
            .await
            .unwrap();
        assert_eq!(result, Some(serde_json::Value::String("olleh".into())));
    }

    #[tokio::test]
    async fn metrics_reports_json_encoded_snapshot() {
        let registry = Registry::new();
        let metrics = Arc::new(Metrics::new());
        metrics.record_request();
        metrics.record_outcome(true);
        register_builtin(&registry, metrics).await;

        let callback = registry
            .lookup("", SERVICE_NAME, SERVICE_VERSION, "Metrics")
            .await
            .unwrap();
        let result = (callback.handler)(DispatchContext::new(None), vec![])
            .await
            .unwrap()
            .unwrap();
        let serde_json::Value::String(encoded) = result else {
            panic!("expected a JSON-encoded string result");
        };
        let snapshot: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(snapshot["total_requests"], 1);
        assert_eq!(snapshot["successful_requests"], 1);
    }
}
