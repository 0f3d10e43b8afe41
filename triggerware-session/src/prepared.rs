//! Prepared statements
//!
//! `prepare-query` registers a query with input parameters and returns its
//! input signature. Inputs are addressed by index when the statement uses
//! positional parameters and by name when it uses named ones (`:y1` in the
//! query text is reported as `?y1`). Mixing the two is a usage error.
//!
//! For SQL statements each bound value is checked against the declared type
//! of its input; JSON `null` binds SQL `NULL` and is accepted for every type.

use crate::client::TriggerwareClient;
use crate::query::{Language, Query, QuerySession, Restriction};
use crate::result_set::{ExecutionReply, ResultSet, SignatureColumn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::marker::PhantomData;
use triggerware_core::{Error, Result};

/// Where a parameter sits: by index or by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterPosition {
    Index(usize),
    Name(String),
}

impl From<usize> for ParameterPosition {
    fn from(index: usize) -> Self {
        ParameterPosition::Index(index)
    }
}

impl From<&str> for ParameterPosition {
    fn from(name: &str) -> Self {
        ParameterPosition::Name(name.to_string())
    }
}

impl From<String> for ParameterPosition {
    fn from(name: String) -> Self {
        ParameterPosition::Name(name)
    }
}

impl std::fmt::Display for ParameterPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterPosition::Index(i) => write!(f, "#{}", i),
            ParameterPosition::Name(name) => f.write_str(name),
        }
    }
}

/// Value class a declared input type accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    Numeric,
    Integer,
    Boolean,
    Text,
    /// Dates and times, passed as strings
    Temporal,
    /// Unrecognized declarations accept anything
    Any,
}

impl ParameterType {
    /// Classify a declared type such as `integer` or `varchar(20)`
    pub fn from_declared(declared: &str) -> Self {
        let base = declared
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match base.as_str() {
            "number" | "numeric" | "decimal" | "double" | "double precision" | "float"
            | "real" => ParameterType::Numeric,
            "integer" | "int" | "smallint" | "bigint" | "tinyint" => ParameterType::Integer,
            "boolean" | "bool" => ParameterType::Boolean,
            "string" | "text" | "varchar" | "char" | "character" | "character varying"
            | "casesensitive" | "caseinsensitive" => ParameterType::Text,
            "date" | "time" | "timestamp" | "datetime" | "interval" => ParameterType::Temporal,
            _ => ParameterType::Any,
        }
    }

    pub fn accepts(self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            ParameterType::Numeric => value.is_number(),
            ParameterType::Integer => value.is_i64() || value.is_u64(),
            ParameterType::Boolean => value.is_boolean(),
            ParameterType::Text | ParameterType::Temporal => value.is_string(),
            ParameterType::Any => true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrepareReply {
    handle: u64,
    #[serde(default)]
    input_signature: Vec<SignatureColumn>,
    #[serde(default)]
    uses_named_parameters: bool,
    #[serde(default)]
    signature: Option<Vec<SignatureColumn>>,
}

/// A query registered on the server with bindable inputs
pub struct PreparedStatement<T = Value> {
    client: TriggerwareClient,
    session: QuerySession,
    handle: u64,
    input_signature: Vec<SignatureColumn>,
    uses_named_parameters: bool,
    signature: Option<Vec<SignatureColumn>>,
    inputs: Vec<Value>,
    _tuple: PhantomData<fn() -> T>,
}

impl<T> PreparedStatement<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Register `query` with the server; every input starts unbound (`null`)
    #[tracing::instrument(skip(client, query), fields(language = %query.language.as_str()))]
    pub async fn new(client: &TriggerwareClient, query: Query) -> Result<Self> {
        let mut session = QuerySession::new(query, Restriction::new());
        let reply: PrepareReply = client
            .rpc()
            .call("prepare-query", Value::Object(session.base_params().clone()))
            .await?;

        session.set_handle(reply.handle);
        tracing::debug!(
            handle = reply.handle,
            inputs = reply.input_signature.len(),
            named = reply.uses_named_parameters,
            "Statement prepared"
        );

        Ok(Self {
            client: client.clone(),
            session,
            handle: reply.handle,
            inputs: vec![Value::Null; reply.input_signature.len()],
            input_signature: reply.input_signature,
            uses_named_parameters: reply.uses_named_parameters,
            signature: reply.signature,
            _tuple: PhantomData,
        })
    }

    /// Execute with the current bindings
    ///
    /// Unset fields of `restriction` fall back to the client's defaults.
    pub async fn execute(&self, restriction: Option<Restriction>) -> Result<ResultSet<T>> {
        let restriction = self.client.resolve(restriction);

        let mut params = Map::new();
        params.insert("handle".into(), json!(self.handle));
        params.insert("inputs".into(), Value::Array(self.inputs.clone()));
        restriction.write_into(&mut params);

        let reply: ExecutionReply<T> = self
            .client
            .rpc()
            .call("create-resultset", Value::Object(params))
            .await?;

        Ok(ResultSet::from_reply(self.client.clone(), reply, restriction))
    }

    /// Prepare the same query again, carrying over the bound values
    pub async fn clone_statement(&self) -> Result<Self> {
        let mut statement = Self::new(&self.client, self.session.query().clone()).await?;
        for (slot, value) in statement.inputs.iter_mut().zip(&self.inputs) {
            *slot = value.clone();
        }
        Ok(statement)
    }
}

impl<T> PreparedStatement<T> {
    /// Bind `value` to an input
    ///
    /// On error the existing bindings are left untouched.
    pub fn set_parameter(
        &mut self,
        position: impl Into<ParameterPosition>,
        value: impl Into<Value>,
    ) -> Result<()> {
        let position = position.into();
        let value = value.into();
        let index = self.resolve(&position)?;

        if self.session.query().language == Language::Sql {
            let input = &self.input_signature[index];
            if !ParameterType::from_declared(&input.type_name).accepts(&value) {
                return Err(Error::TypeMismatch {
                    parameter: input.attribute.clone(),
                    expected: input.type_name.clone(),
                    value,
                });
            }
        }

        self.inputs[index] = value;
        Ok(())
    }

    pub fn get_parameter(&self, position: impl Into<ParameterPosition>) -> Result<&Value> {
        let index = self.resolve(&position.into())?;
        Ok(&self.inputs[index])
    }

    /// Ordered input names
    pub fn input_names(&self) -> Vec<&str> {
        self.input_signature
            .iter()
            .map(|column| column.attribute.as_str())
            .collect()
    }

    /// Ordered declared input types
    pub fn input_types(&self) -> Vec<&str> {
        self.input_signature
            .iter()
            .map(|column| column.type_name.as_str())
            .collect()
    }

    pub fn uses_named_parameters(&self) -> bool {
        self.uses_named_parameters
    }

    /// Result column signature, when the server reported one
    pub fn signature(&self) -> Option<&[SignatureColumn]> {
        self.signature.as_deref()
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn query(&self) -> &Query {
        self.session.query()
    }

    fn resolve(&self, position: &ParameterPosition) -> Result<usize> {
        match (position, self.uses_named_parameters) {
            (ParameterPosition::Index(index), false) => {
                if *index < self.inputs.len() {
                    Ok(*index)
                } else {
                    Err(Error::ParameterOutOfRange(format!(
                        "index {} with {} inputs",
                        index,
                        self.inputs.len()
                    )))
                }
            }
            (ParameterPosition::Name(name), true) => self
                .input_signature
                .iter()
                .position(|column| &column.attribute == name)
                .ok_or_else(|| Error::ParameterOutOfRange(format!("no input named {}", name))),
            (ParameterPosition::Index(_), true) => Err(Error::WrongAddressingMode(
                "statement uses named parameters".into(),
            )),
            (ParameterPosition::Name(_), false) => Err(Error::WrongAddressingMode(
                "statement uses positional parameters".into(),
            )),
        }
    }
}

impl<T> std::fmt::Debug for PreparedStatement<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedStatement")
            .field("handle", &self.handle)
            .field("inputs", &self.inputs)
            .field("uses_named_parameters", &self.uses_named_parameters)
            .finish()
    }
}
