//! Local methods the server can invoke
//!
//! The Triggerware server pushes subscription matches, batch matches and
//! polled-query deltas by calling methods on the client. Each such method is
//! a [`MethodHandler`] stored in the client's [`MethodTable`] under its name
//! (`sub3`, `batch0`, `poll1`, ...).
//!
//! # Creating Handlers
//!
//! - [`from_fn`] wraps an async closure over raw `serde_json::Value` params
//! - [`from_typed_fn`] deserializes params into a type and serializes the result
//! - anything else can implement the trait directly
//!
//! ```rust
//! use triggerware_rpc::{from_fn, from_typed_fn};
//! use serde::Deserialize;
//!
//! let echo = from_fn(|params| async move { Ok(params.unwrap_or_default()) });
//!
//! #[derive(Deserialize)]
//! struct Delta { added: Vec<serde_json::Value> }
//!
//! let count = from_typed_fn(|delta: Delta| async move { Ok(delta.added.len()) });
//! ```

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;
use triggerware_core::{Error, Result};

/// Future returned by a method invocation
pub type MethodFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// A locally registered method
///
/// `params` is `None` when the inbound document had no `params` member.
/// The returned value becomes the `result` of the reply when the invocation
/// carried an id; for notifications it is discarded.
pub trait MethodHandler: Send + Sync {
    fn invoke(&self, params: Option<Value>) -> MethodFuture;
}

struct FnMethod<F> {
    func: F,
}

impl<F, Fut> MethodHandler for FnMethod<F>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn invoke(&self, params: Option<Value>) -> MethodFuture {
        Box::pin((self.func)(params))
    }
}

/// Handler over raw JSON params
pub fn from_fn<F, Fut>(func: F) -> Arc<dyn MethodHandler>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnMethod { func })
}

/// Handler with typed params and result
///
/// Params that do not deserialize into `P` fail with `Error::InvalidParams`;
/// missing params are deserialized from `null`.
pub fn from_typed_fn<P, R, F, Fut>(func: F) -> Arc<dyn MethodHandler>
where
    P: serde::de::DeserializeOwned + Send + 'static,
    R: serde::Serialize + Send + 'static,
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    let func = Arc::new(func);

    from_fn(move |params: Option<Value>| {
        let func = Arc::clone(&func);
        async move {
            let params: P = serde_json::from_value(params.unwrap_or(Value::Null))
                .map_err(|e| Error::invalid_params(e.to_string()))?;
            let result = func(params).await?;
            Ok(serde_json::to_value(result)?)
        }
    })
}

/// Name to handler mapping
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: Arc<Mutex<HashMap<String, Arc<dyn MethodHandler>>>>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; an existing registration under the same name is kept
    /// and the call fails with `Error::Internal`
    pub async fn add(&self, name: impl Into<String>, handler: Arc<dyn MethodHandler>) -> Result<()> {
        let name = name.into();
        let mut methods = self.methods.lock().await;
        if methods.contains_key(&name) {
            return Err(Error::internal(format!("Method already registered: {}", name)));
        }
        methods.insert(name, handler);
        Ok(())
    }

    /// Unregister a handler, reporting whether one existed
    pub async fn remove(&self, name: &str) -> bool {
        self.methods.lock().await.remove(name).is_some()
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn MethodHandler>> {
        self.methods.lock().await.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.methods.lock().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.methods.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
