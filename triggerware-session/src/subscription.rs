//! Subscriptions
//!
//! A subscription asks the server to push every new match of a query. Each
//! one gets a client-unique label (`sub<N>`). It is delivered either on its
//! own, through a local method named after its label, or as a member of a
//! [`BatchSubscription`](crate::BatchSubscription) whose single method
//! receives the matches of all members at once.
//!
//! The two delivery modes are mutually exclusive. [`SubscriptionState`]
//! holds the rules; every transition is checked before any request is sent,
//! so a refused transition changes nothing.

use crate::client::TriggerwareClient;
use crate::query::{Query, QuerySession, Restriction};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use triggerware_core::{Error, Result};
use triggerware_rpc::from_fn;

/// Delivery state of a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Not known to the server
    Unregistered,
    /// Delivered through its own method
    Active,
    /// Delivered through the named batch method
    Batched(String),
}

impl SubscriptionState {
    pub fn activate(&self) -> Result<SubscriptionState> {
        match self {
            SubscriptionState::Unregistered => Ok(SubscriptionState::Active),
            SubscriptionState::Active => {
                Err(Error::InvalidState("subscription is already active".into()))
            }
            SubscriptionState::Batched(batch) => Err(Error::InvalidState(format!(
                "subscription belongs to {}",
                batch
            ))),
        }
    }

    pub fn deactivate(&self) -> Result<SubscriptionState> {
        match self {
            SubscriptionState::Active => Ok(SubscriptionState::Unregistered),
            SubscriptionState::Unregistered => {
                Err(Error::InvalidState("subscription is not active".into()))
            }
            SubscriptionState::Batched(batch) => Err(Error::InvalidState(format!(
                "subscription belongs to {}",
                batch
            ))),
        }
    }

    pub fn add_to_batch(&self, batch: &str) -> Result<SubscriptionState> {
        match self {
            SubscriptionState::Unregistered => Ok(SubscriptionState::Batched(batch.to_string())),
            SubscriptionState::Active => Err(Error::InvalidState(
                "active subscription cannot join a batch".into(),
            )),
            SubscriptionState::Batched(current) => Err(Error::InvalidState(format!(
                "subscription already belongs to {}",
                current
            ))),
        }
    }

    pub fn remove_from_batch(&self, batch: &str) -> Result<SubscriptionState> {
        match self {
            SubscriptionState::Batched(current) if current == batch => {
                Ok(SubscriptionState::Unregistered)
            }
            _ => Err(Error::InvalidState(format!(
                "subscription is not a member of {}",
                batch
            ))),
        }
    }
}

/// Receives the matches of a subscription, one tuple at a time
#[async_trait]
pub trait SubscriptionHandler<T>: Send + Sync + 'static {
    async fn handle_notification(&self, tuple: T);
}

/// Forward matches into a channel
#[async_trait]
impl<T: Send + 'static> SubscriptionHandler<T> for mpsc::UnboundedSender<T> {
    async fn handle_notification(&self, tuple: T) {
        if self.send(tuple).is_err() {
            tracing::debug!("Subscription receiver dropped");
        }
    }
}

/// Type-erased delivery target shared with batches
#[async_trait]
pub(crate) trait Member: Send + Sync {
    async fn deliver(&self, tuple: Value) -> Result<()>;
}

pub(crate) struct SubscriptionInner<T> {
    pub(crate) client: TriggerwareClient,
    pub(crate) session: QuerySession,
    pub(crate) label: String,
    pub(crate) state: Mutex<SubscriptionState>,
    handler: Box<dyn SubscriptionHandler<T>>,
}

#[async_trait]
impl<T> Member for SubscriptionInner<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn deliver(&self, tuple: Value) -> Result<()> {
        let tuple: T =
            serde_json::from_value(tuple).map_err(|e| Error::invalid_params(e.to_string()))?;
        self.handler.handle_notification(tuple).await;
        Ok(())
    }
}

/// A standing query whose new matches are pushed to a handler
///
/// Cheap to clone; clones share the state.
pub struct Subscription<T = Value> {
    pub(crate) inner: Arc<SubscriptionInner<T>>,
}

impl<T> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Subscription<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Create and activate a subscription
    pub async fn new<H>(client: &TriggerwareClient, query: Query, handler: H) -> Result<Self>
    where
        H: SubscriptionHandler<T>,
    {
        let subscription = Self::inactive(client, query, handler);
        subscription.activate().await?;
        Ok(subscription)
    }

    /// Create without contacting the server, ready to activate or join a batch
    pub fn inactive<H>(client: &TriggerwareClient, query: Query, handler: H) -> Self
    where
        H: SubscriptionHandler<T>,
    {
        Self {
            inner: Arc::new(SubscriptionInner {
                client: client.clone(),
                session: QuerySession::new(query, Restriction::new()),
                label: client.next_subscription_label(),
                state: Mutex::new(SubscriptionState::Unregistered),
                handler: Box::new(handler),
            }),
        }
    }

    /// Register the label method, then `subscribe` with `combine: false`
    #[tracing::instrument(skip(self), fields(label = %self.inner.label))]
    pub async fn activate(&self) -> Result<()> {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        let next = state.activate()?;

        let member = Arc::clone(inner);
        inner
            .client
            .rpc()
            .add_method(
                inner.label.clone(),
                from_fn(move |params| {
                    let member = Arc::clone(&member);
                    async move {
                        member.deliver(params.unwrap_or(Value::Null)).await?;
                        Ok(Value::Null)
                    }
                }),
            )
            .await?;

        let params = inner.session.params_with([
            ("label", json!(inner.label)),
            ("method", json!(inner.label)),
            ("combine", json!(false)),
        ]);
        if let Err(e) = inner.client.rpc().call::<_, Value>("subscribe", params).await {
            inner.client.rpc().remove_method(&inner.label).await;
            return Err(e);
        }

        *state = next;
        tracing::debug!("Subscription active");
        Ok(())
    }

    /// `unsubscribe` and drop the label method
    #[tracing::instrument(skip(self), fields(label = %self.inner.label))]
    pub async fn deactivate(&self) -> Result<()> {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        let next = state.deactivate()?;

        let _: Value = inner
            .client
            .rpc()
            .call(
                "unsubscribe",
                json!({ "label": inner.label, "method": inner.label }),
            )
            .await?;
        inner.client.rpc().remove_method(&inner.label).await;

        *state = next;
        tracing::debug!("Subscription deactivated");
        Ok(())
    }
}

impl<T> Subscription<T> {
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn query(&self) -> &Query {
        self.inner.session.query()
    }

    pub async fn state(&self) -> SubscriptionState {
        self.inner.state.lock().await.clone()
    }

    pub fn client(&self) -> &TriggerwareClient {
        &self.inner.client
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("label", &self.inner.label)
            .finish_non_exhaustive()
    }
}
