//! The service registry (§3 "Service registry", §4.3).
//!
//! Rust has no runtime reflection over arbitrary receiver types, so the
//! "walk the exported methods of a receiver" step the Go original performs
//! in `makeCallbacks` is replaced with explicit registration, per §9's
//! redesign note: callers hand the registry a decoder/invoker pair per
//! method instead of a receiver value. The registry still preserves every
//! invariant (I1–I5) and the fingerprint-ordered lookup semantics (§4.3),
//! including the empty-version "latest wins" clamp (§9 open question #2).

use crate::context::DispatchContext;
use crate::error::StatusError;
use crate::util::string::format_name;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A callback's declared output shape (§3 I3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnShape {
    /// 0 outputs.
    None,
    /// Exactly 1 output, the error.
    ErrorOnly,
    /// Exactly 2 outputs: value, then error.
    ValueAndError,
}

/// Whether a positional parameter is required. A missing or explicit-`null`
/// value for a required parameter is a protocol error (§4.1); an optional
/// parameter is filled with `Value::Null` ("the type's zero value" for a
/// pointer type, rendered in Rust as `Option::None`) when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub optional: bool,
}

impl ParamSpec {
    pub fn required() -> Self {
        Self { optional: false }
    }
    pub fn optional() -> Self {
        Self { optional: true }
    }
}

/// The callback body: decodes nothing itself (positional arity/zero-value
/// policy is enforced by the registry before this runs, per §4.1) and is
/// free to `serde_json::from_value` each element of `args` into whatever
/// concrete types the handler expects.
pub type HandlerFn = Arc<
    dyn Fn(DispatchContext, Vec<serde_json::Value>) -> BoxFuture<'static, Result<Option<serde_json::Value>, StatusError>>
        + Send
        + Sync,
>;

/// Precomputed metadata needed to invoke a method (GLOSSARY: "Callback").
pub struct Callback {
    pub params: Vec<ParamSpec>,
    pub has_ctx: bool,
    pub return_shape: ReturnShape,
    pub handler: HandlerFn,
}

impl Callback {
    pub fn new(
        params: Vec<ParamSpec>,
        has_ctx: bool,
        return_shape: ReturnShape,
        handler: HandlerFn,
    ) -> Self {
        Self {
            params,
            has_ctx,
            return_shape,
            handler,
        }
    }
}

/// A method definition as handed to the registry at registration time.
pub struct MethodDef {
    pub name: String,
    pub callback: Callback,
}

/// A service definition: a named, versioned bundle of methods (§3
/// "Service").
pub struct ServiceDef {
    pub group: String,
    pub name: String,
    pub version: String,
    pub public: bool,
    pub methods: Vec<MethodDef>,
}

struct Service {
    /// Case-folded (§4.3).
    name: String,
    version: String,
    public: bool,
    methods: HashMap<String, Arc<Callback>>,
}

impl Service {
    fn fingerprint(&self) -> String {
        format!("{}_{}", self.name, self.version)
    }

    fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }
}

#[derive(Default)]
struct Group {
    /// Sorted by fingerprint, byte-compared (I1, §4.3).
    services: Vec<Service>,
}

impl Group {
    /// Inserts `service`, replacing any existing entry with the same
    /// fingerprint (I1), maintaining sort order.
    fn insert(&mut self, service: Service) {
        let fp = service.fingerprint();
        match self.services.binary_search_by(|s| s.fingerprint().as_str().cmp(fp.as_str())) {
            Ok(idx) => self.services[idx] = service,
            Err(idx) => self.services.insert(idx, service),
        }
    }

    /// §4.3 lookup: binary-search for the first service whose fingerprint
    /// is `>=` the target, clamping to the last element if the search
    /// would run off the end. An empty version is handled separately: the
    /// lower bound only lands on the *least* version registered under
    /// `name` (same-name entries sort contiguously, ascending by version),
    /// so "latest wins" (§9) walks forward from there to the last entry
    /// still belonging to `name`.
    fn find(&self, name: &str, version: &str) -> Option<&Service> {
        if self.services.is_empty() {
            return None;
        }
        let target = format!("{}_{}", name, version);
        let start = self
            .services
            .partition_point(|s| s.fingerprint().as_str() < target.as_str());

        let candidate = if version.is_empty() {
            let mut idx = start;
            while idx < self.services.len() && self.services[idx].name == name {
                idx += 1;
            }
            if idx == start {
                return None;
            }
            &self.services[idx - 1]
        } else {
            &self.services[start.min(self.services.len() - 1)]
        };

        if candidate.name == name && candidate.public {
            Some(candidate)
        } else {
            None
        }
    }
}

/// The process-wide (or facade-owned) service registry.
pub struct Registry {
    groups: Mutex<HashMap<String, Group>>,
}

impl Registry {
    /// A fresh, empty registry. The facade registers the built-in service
    /// (I5) into it immediately after construction.
    pub fn new() -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Registers one service, replacing any existing `(group, name,
    /// version)` entry (I1). Mirrors `serviceRegistry.register`: failures
    /// are not fatal to the caller, they are reported through `on_error`
    /// and the service is simply not added.
    pub async fn register(&self, def: ServiceDef) -> Result<(), StatusError> {
        if def.name.is_empty() || def.version.is_empty() {
            return Err(StatusError::missing_service_name_or_version());
        }
        if def.methods.is_empty() {
            return Err(StatusError::method_not_found());
        }

        let mut methods = HashMap::new();
        for m in def.methods {
            match m.callback.return_shape {
                ReturnShape::None | ReturnShape::ErrorOnly | ReturnShape::ValueAndError => {}
            }
            methods.insert(m.name, Arc::new(m.callback));
        }

        let service = Service {
            name: format_name(&def.name),
            version: def.version,
            public: def.public,
            methods,
        };

        let mut groups = self.groups.lock().await;
        groups
            .entry(format_name(&def.group))
            .or_default()
            .insert(service);
        Ok(())
    }

    /// Resolves `(group, service, version)/method` to a callback, applying
    /// I2 (public + case-folded name match) and the clamp-to-last lookup
    /// rule (§4.3). Names are case-folded; `version` is compared verbatim.
    pub async fn lookup(
        &self,
        group: &str,
        service: &str,
        version: &str,
        method: &str,
    ) -> Option<Arc<Callback>> {
        let groups = self.groups.lock().await;
        let group = groups.get(&format_name(group))?;
        let service = group.find(&format_name(service), version)?;
        service.methods.get(method).cloned()
    }

    /// A deterministic, sorted, human-readable listing used by the facade
    /// for startup logs (§4.3 "Introspection").
    pub async fn modules(&self) -> String {
        let groups = self.groups.lock().await;
        let mut names: Vec<&String> = groups.keys().collect();
        names.sort();

        let mut out = String::new();
        for name in names {
            if name.is_empty() {
                out.push_str("[Group]\n");
            } else {
                out.push_str(&format!("[Group={name}]\n"));
            }
            let Some(group) = groups.get(name) else {
                continue;
            };
            for service in &group.services {
                out.push_str(&format!(
                    " service={} public={} methods={}\n",
                    service.fingerprint(),
                    service.public,
                    service.method_names().join(" ")
                ));
            }
        }
        out
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a positional argument out of a decoded `params` array, decoding
/// `null`/absent as `None`. Handler closures use this for parameters
/// registered with [`ParamSpec::optional`].
pub fn decode_optional<T: serde::de::DeserializeOwned>(
    args: &[serde_json::Value],
    idx: usize,
) -> Result<Option<T>, StatusError> {
    match args.get(idx) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|e| StatusError::invalid_params(e.to_string())),
    }
}

/// Reads a required positional argument, per the caller contract that the
/// registry has already rejected `null`/absent values for non-optional
/// parameters before the handler runs.
pub fn decode_required<T: serde::de::DeserializeOwned>(
    args: &[serde_json::Value],
    idx: usize,
) -> Result<T, StatusError> {
    let v = args
        .get(idx)
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    serde_json::from_value(v).map_err(|e| StatusError::invalid_params(e.to_string()))
}
