//! Queries and the parameters every query-like entity sends
//!
//! A [`Query`] is the text, its language and the namespace it resolves
//! names in. A [`Restriction`] optionally caps the rows per page and the
//! server-side time spent. Together they form the base parameters carried by
//! every request a view, prepared statement, polled query or subscription
//! makes:
//!
//! ```json
//! {"query": "...", "language": "sql", "namespace": "AP5", "limit": 100, "timelimit": 2.5}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Namespace used when a query does not name one
pub const DEFAULT_NAMESPACE: &str = "AP5";

/// Query language understood by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Tabular query language; prepared-statement inputs are type checked
    Sql,
    /// First-order logic queries, e.g. `((x) s.t. (inflation 1990 1995 x))`
    Fol,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Sql => "sql",
            Language::Fol => "fol",
        }
    }
}

/// Query text with its language and namespace
///
/// ```rust
/// use triggerware_session::{Language, Query};
///
/// let query = Query::fol("NEGATIVE-TWEET").with_namespace("TWEETS");
/// assert_eq!(query.language, Language::Fol);
/// assert_eq!(query.namespace, "TWEETS");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub text: String,
    pub language: Language,
    pub namespace: String,
}

impl Query {
    pub fn new(text: impl Into<String>, language: Language) -> Self {
        Self {
            text: text.into(),
            language,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    pub fn sql(text: impl Into<String>) -> Self {
        Self::new(text, Language::Sql)
    }

    pub fn fol(text: impl Into<String>) -> Self {
        Self::new(text, Language::Fol)
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

/// Optional caps on page size and server time
///
/// Time limits are forwarded to the server as-is; the client never enforces
/// them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Restriction {
    /// Maximum tuples per page
    pub row_limit: Option<u64>,
    /// Seconds the server may spend producing a page
    pub timeout: Option<f64>,
}

impl Restriction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_row_limit(mut self, rows: u64) -> Self {
        self.row_limit = Some(rows);
        self
    }

    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    /// Fill unset fields from `defaults`
    pub fn or(self, defaults: Restriction) -> Restriction {
        Restriction {
            row_limit: self.row_limit.or(defaults.row_limit),
            timeout: self.timeout.or(defaults.timeout),
        }
    }

    /// `limit`/`timelimit` members for a request, unset fields omitted
    pub(crate) fn write_into(&self, params: &mut Map<String, Value>) {
        if let Some(rows) = self.row_limit {
            params.insert("limit".into(), Value::from(rows));
        }
        if let Some(seconds) = self.timeout {
            params.insert("timelimit".into(), Value::from(seconds));
        }
    }
}

/// Base parameters and server handle shared by query-like entities
///
/// The base parameter map is built once and never changes; entities extend a
/// copy of it for each request.
#[derive(Debug, Clone)]
pub struct QuerySession {
    query: Query,
    restriction: Restriction,
    base: Map<String, Value>,
    handle: Option<u64>,
}

impl QuerySession {
    pub fn new(query: Query, restriction: Restriction) -> Self {
        let mut base = Map::new();
        base.insert("query".into(), Value::from(query.text.clone()));
        base.insert("language".into(), Value::from(query.language.as_str()));
        base.insert("namespace".into(), Value::from(query.namespace.clone()));
        restriction.write_into(&mut base);

        Self {
            query,
            restriction,
            base,
            handle: None,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn restriction(&self) -> Restriction {
        self.restriction
    }

    pub fn base_params(&self) -> &Map<String, Value> {
        &self.base
    }

    /// Base parameters extended with `extra`; later keys win
    pub fn params_with<I, K>(&self, extra: I) -> Value
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut params = self.base.clone();
        for (key, value) in extra {
            params.insert(key.into(), value);
        }
        Value::Object(params)
    }

    /// Server handle, once a registration call has returned one
    pub fn handle(&self) -> Option<u64> {
        self.handle
    }

    pub(crate) fn set_handle(&mut self, handle: u64) {
        self.handle = Some(handle);
    }
}
