//! Batch subscriptions
//!
//! A batch groups subscriptions of one client behind a single local method,
//! `batch<N>`. The server combines the matches of all members into one call:
//!
//! ```json
//! {"matches": [{"label": "sub0", "tuples": [[...], [...]]}, {"label": "sub2", "tuples": [[...]]}]}
//! ```
//!
//! Each tuple goes to the member with that label, in array order. Matches
//! for labels that are not members are ignored.

use crate::client::TriggerwareClient;
use crate::subscription::{Member, Subscription};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use triggerware_core::{Error, Result};
use triggerware_rpc::from_fn;

type MemberTable = Arc<Mutex<HashMap<String, Arc<dyn Member>>>>;

#[derive(Debug, Deserialize)]
struct CombinedMatches {
    #[serde(default)]
    matches: Vec<LabelMatches>,
}

#[derive(Debug, Deserialize)]
struct LabelMatches {
    label: String,
    #[serde(default)]
    tuples: Vec<Value>,
}

/// Subscriptions sharing one combined notification method
pub struct BatchSubscription {
    client: TriggerwareClient,
    name: String,
    members: MemberTable,
}

impl BatchSubscription {
    /// Register the batch method; the batch starts empty
    pub async fn new(client: &TriggerwareClient) -> Result<Self> {
        let name = client.next_batch_name();
        let members: MemberTable = Arc::new(Mutex::new(HashMap::new()));

        let table = Arc::clone(&members);
        client
            .rpc()
            .add_method(
                name.clone(),
                from_fn(move |params| {
                    let table = Arc::clone(&table);
                    async move { dispatch(&table, params).await }
                }),
            )
            .await?;

        tracing::debug!(batch = %name, "Batch registered");
        Ok(Self {
            client: client.clone(),
            name,
            members,
        })
    }

    /// Move an unregistered subscription into this batch
    #[tracing::instrument(skip(self, subscription), fields(batch = %self.name, label = %subscription.label()))]
    pub async fn add<T>(&self, subscription: &Subscription<T>) -> Result<()>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.ensure_same_client(subscription)?;

        let inner = &subscription.inner;
        let mut state = inner.state.lock().await;
        let next = state.add_to_batch(&self.name)?;

        let member: Arc<dyn Member> = Arc::clone(inner) as Arc<dyn Member>;
        self.members.lock().await.insert(inner.label.clone(), member);

        let params = inner.session.params_with([
            ("label", json!(inner.label)),
            ("method", json!(self.name)),
            ("combine", json!(true)),
        ]);
        if let Err(e) = self.client.rpc().call::<_, Value>("subscribe", params).await {
            self.members.lock().await.remove(&inner.label);
            return Err(e);
        }

        *state = next;
        tracing::debug!("Subscription joined batch");
        Ok(())
    }

    /// Take a member out of this batch, leaving it unregistered
    #[tracing::instrument(skip(self, subscription), fields(batch = %self.name, label = %subscription.label()))]
    pub async fn remove<T>(&self, subscription: &Subscription<T>) -> Result<()> {
        self.ensure_same_client(subscription)?;

        let inner = &subscription.inner;
        let mut state = inner.state.lock().await;
        let next = state.remove_from_batch(&self.name)?;

        let _: Value = self
            .client
            .rpc()
            .call(
                "unsubscribe",
                json!({ "label": inner.label, "method": self.name }),
            )
            .await?;
        self.members.lock().await.remove(&inner.label);

        *state = next;
        tracing::debug!("Subscription left batch");
        Ok(())
    }

    /// Unregister the batch method; members must be removed first
    pub async fn close(&self) -> Result<()> {
        if !self.members.lock().await.is_empty() {
            return Err(Error::InvalidState(format!("{} still has members", self.name)));
        }
        self.client.rpc().remove_method(&self.name).await;
        Ok(())
    }

    /// Name of the batch method (`batch<N>`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Member labels, sorted
    pub async fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.members.lock().await.keys().cloned().collect();
        labels.sort();
        labels
    }

    fn ensure_same_client<T>(&self, subscription: &Subscription<T>) -> Result<()> {
        if self.client.same_client(subscription.client()) {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "{} belongs to a different client than {}",
                subscription.label(),
                self.name
            )))
        }
    }
}

impl std::fmt::Debug for BatchSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSubscription")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

async fn dispatch(members: &Mutex<HashMap<String, Arc<dyn Member>>>, params: Option<Value>) -> Result<Value> {
    let combined: CombinedMatches = serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| Error::invalid_params(e.to_string()))?;

    for matched in combined.matches {
        let member = members.lock().await.get(&matched.label).cloned();
        let Some(member) = member else {
            tracing::debug!(label = %matched.label, "Ignoring matches for unknown label");
            continue;
        };

        for tuple in matched.tuples {
            if let Err(e) = member.deliver(tuple).await {
                tracing::warn!(label = %matched.label, error = %e, "Failed to deliver tuple");
            }
        }
    }
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Query;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_combined_matches_reach_members_in_order() {
        let client = TriggerwareClient::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        let subscription = Subscription::<Value>::inactive(&client, Query::fol("NEGATIVE-TWEET"), tx);

        let table: MemberTable = Arc::new(Mutex::new(HashMap::new()));
        table
            .lock()
            .await
            .insert("sub0".into(), Arc::clone(&subscription.inner) as Arc<dyn Member>);

        dispatch(
            &table,
            Some(json!({"matches": [
                {"label": "sub7", "tuples": [["ignored"]]},
                {"label": "sub0", "tuples": [["t1"], ["t2"]]}
            ]})),
        )
        .await
        .unwrap();

        assert_eq!(rx.recv().await.unwrap(), json!(["t1"]));
        assert_eq!(rx.recv().await.unwrap(), json!(["t2"]));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_labels_only_is_not_an_error() {
        let table: MemberTable = Arc::new(Mutex::new(HashMap::new()));
        let result = dispatch(&table, Some(json!({"matches": [{"label": "sub3", "tuples": [[1]]}]}))).await;
        assert_eq!(result.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_invalid_params() {
        let table: MemberTable = Arc::new(Mutex::new(HashMap::new()));
        let result = dispatch(&table, Some(json!({"matches": "sub0"}))).await;
        assert!(matches!(result, Err(Error::InvalidParams { .. })));
    }
}
