//! A minimal server wiring two services onto both transports, grounded on
//! `original_source/example_test.go`'s `network`/`storage` example. Run
//! with `cargo run --example basic_service` once this file is wired into
//! `Cargo.toml` as a `[[example]]` target.

use anserpc::{Callback, MethodDef, Options, ParamSpec, ReturnShape, ServiceDef};
use std::sync::Arc;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let options = Options::new()
        .rpc_endpoint("0.0.0.0", 56789)
        .ipc_endpoint("/var/run/anser.sock");
    let server = Arc::new(anserpc::Anser::new(options).await);

    server
        .register(network_service())
        .await
        .expect("network service registers");
    server
        .register(storage_service())
        .await
        .expect("storage service registers");

    server.run().await
}

/// `system/network@1.0`, public: `Ping`, `IP`, `Restart`.
fn network_service() -> ServiceDef {
    ServiceDef {
        group: "system".into(),
        name: "network".into(),
        version: "1.0".into(),
        public: true,
        methods: vec![
            MethodDef {
                name: "Ping".into(),
                callback: Callback::new(
                    vec![],
                    false,
                    ReturnShape::ErrorOnly,
                    Arc::new(|_ctx, _args| {
                        Box::pin(async {
                            Err(anserpc::StatusError::new(-1, "unknown host"))
                        })
                    }),
                ),
            },
            MethodDef {
                name: "IP".into(),
                callback: Callback::new(
                    vec![],
                    false,
                    ReturnShape::ValueAndError,
                    Arc::new(|_ctx, _args| {
                        Box::pin(async {
                            Ok(Some(serde_json::Value::String("10.0.0.2".into())))
                        })
                    }),
                ),
            },
            MethodDef {
                name: "Restart".into(),
                callback: Callback::new(
                    vec![],
                    false,
                    ReturnShape::None,
                    Arc::new(|_ctx, _args| Box::pin(async { Ok(None) })),
                ),
            },
        ],
    }
}

/// `system/storage@1.0`, not public (reachable only over IPC, §4.3 I2).
fn storage_service() -> ServiceDef {
    ServiceDef {
        group: "system".into(),
        name: "storage".into(),
        version: "1.0".into(),
        public: false,
        methods: vec![MethodDef {
            name: "Add".into(),
            callback: Callback::new(
                vec![ParamSpec::optional()],
                false,
                ReturnShape::ErrorOnly,
                Arc::new(|_ctx, _args| {
                    Box::pin(async {
                        Err(anserpc::StatusError::with_data(
                            -1,
                            "error message",
                            serde_json::json!({}),
                        ))
                    })
                }),
            ),
        }],
    }
}
