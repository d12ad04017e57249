//! The per-connection message pipeline (§4.4 "Dispatch Handler").
//!
//! [`Dispatcher`] turns a decoded [`Payload`] into a set of response
//! messages: validate → resolve → decode args → invoke, with panic
//! isolation and a per-message timeout wait barrier, then collects the
//! results in input order (§5 "Responses are collected in input order but
//! may be produced out of order"). [`Dispatcher::serve_connection`] drives
//! this over a whole [`MessageCodec`] until the peer disconnects, which is
//! what each transport's accept loop calls per connection.

use crate::codec::MessageCodec;
use crate::context::DispatchContext;
use crate::error::StatusError;
use crate::log::SharedLogger;
use crate::message::{encode_responses, JsonMessage, Payload};
use crate::metrics::Metrics;
use crate::registry::{Callback, Registry};
use futures::future::join_all;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;

/// Default per-message handler timeout (§4.4, §5).
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(3600);

pub struct Dispatcher {
    registry: Arc<Registry>,
    metrics: Arc<Metrics>,
    logger: SharedLogger,
    handler_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, metrics: Arc<Metrics>, logger: SharedLogger) -> Self {
        Self {
            registry,
            metrics,
            logger,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Reads and dispatches payloads off `codec` until the peer closes the
    /// connection or a fatal I/O error occurs, closing the codec on exit.
    /// This is the loop every transport (§4.5–§4.7) runs per connection.
    pub async fn serve_connection(&self, codec: Arc<dyn MessageCodec>, peer_addr: Option<String>) {
        loop {
            let payload = match codec.read_payload().await {
                Ok(Some(p)) => p,
                Ok(None) => break,
                Err(e) => {
                    self.logger.warn(&format!("connection read error: {e}"));
                    break;
                }
            };

            let is_batch = payload.is_batch();
            let ctx = DispatchContext::new(peer_addr.clone());
            let responses = self.dispatch_messages(payload.into_messages(), &ctx).await;
            let encoded = encode_responses(is_batch, responses);

            if let Err(e) = codec.write_value(encoded, None).await {
                self.logger.warn(&format!("connection write error: {e}"));
                break;
            }
        }
        codec.close().await;
    }

    /// Dispatches one payload's worth of messages concurrently, returning
    /// responses in the same order as `msgs` (§4.4 steps 1-4).
    pub async fn dispatch_messages(
        &self,
        msgs: Vec<JsonMessage>,
        ctx: &DispatchContext,
    ) -> Vec<JsonMessage> {
        let futures = msgs
            .into_iter()
            .map(|msg| self.dispatch_one(msg, ctx.clone()));
        join_all(futures).await
    }

    async fn dispatch_one(&self, msg: JsonMessage, ctx: DispatchContext) -> JsonMessage {
        let id = msg.id.clone();

        // The codec already produced a ready-made error response (e.g. a
        // JSON syntax error inside a batch element); pass it straight
        // through rather than re-validating a message with no service or
        // method to resolve.
        if let Some(err) = msg.error.clone() {
            return JsonMessage::failure(id, err);
        }

        self.metrics.record_request();

        let response = match self.resolve_and_invoke(&msg, ctx).await {
            Ok(value) => JsonMessage::success(id, value.unwrap_or(serde_json::Value::Null)),
            Err(err) => JsonMessage::failure(id, err),
        };

        self.metrics.record_outcome(response.error.is_none());
        response
    }

    async fn resolve_and_invoke(
        &self,
        msg: &JsonMessage,
        ctx: DispatchContext,
    ) -> Result<Option<serde_json::Value>, StatusError> {
        msg.validate()?;

        let callback = self
            .registry
            .lookup(&msg.group, &msg.service, &msg.service_version, &msg.method)
            .await
            .ok_or_else(StatusError::method_not_found)?;

        let params = msg.params_array()?;
        let args = build_args(&callback, params)?;

        self.invoke_with_guard(callback, ctx, args).await
    }

    /// Runs one callback under panic isolation and the handler timeout
    /// wait barrier (§4.4 "Panic isolation", §5 "Cancellation and
    /// timeout"). The spawned task is not aborted on timeout; the barrier
    /// only stops waiting on it.
    async fn invoke_with_guard(
        &self,
        callback: Arc<Callback>,
        ctx: DispatchContext,
        args: Vec<serde_json::Value>,
    ) -> Result<Option<serde_json::Value>, StatusError> {
        let handler = callback.handler.clone();
        let cancel_token = ctx.cancellation();
        let task = tokio::spawn(async move {
            std::panic::AssertUnwindSafe((handler)(ctx, args))
                .catch_unwind()
                .await
        });

        match tokio::time::timeout(self.handler_timeout, task).await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(panic_payload))) => {
                self.logger
                    .error(&format!("handler panicked: {}", panic_message(&panic_payload)));
                Err(StatusError::handler_panic())
            }
            Ok(Err(join_err)) => {
                self.logger
                    .error(&format!("handler task did not complete: {join_err}"));
                Err(StatusError::handler_panic())
            }
            Err(_elapsed) => {
                cancel_token.cancel();
                Err(StatusError::handler_timeout())
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Builds the positional argument vector for a callback invocation,
/// applying the arity and zero-value policy from §4.1/§4.4: too many
/// params is rejected outright; a missing or `null` value for a
/// non-optional parameter is rejected; a missing or `null` value for an
/// optional parameter is passed through as `null`.
fn build_args(
    callback: &Callback,
    params: Vec<serde_json::Value>,
) -> Result<Vec<serde_json::Value>, StatusError> {
    if params.len() > callback.params.len() {
        return Err(StatusError::too_many_params());
    }
    let mut args = Vec::with_capacity(callback.params.len());
    for (idx, spec) in callback.params.iter().enumerate() {
        let value = params.get(idx).cloned().unwrap_or(serde_json::Value::Null);
        if value.is_null() && !spec.optional {
            return Err(StatusError::missing_value_for_params());
        }
        args.push(value);
    }
    Ok(args)
}
