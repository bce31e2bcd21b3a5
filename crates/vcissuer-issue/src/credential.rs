use crate::error::{IssueError, IssueResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Base context every credential must declare first.
pub const W3C_CREDENTIALS_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";

pub const VERIFIABLE_CREDENTIAL_TYPE: &str = "VerifiableCredential";

// ---------------------------------------------------------------------------
// OneOrMany: a field that may be a single value or an array
// ---------------------------------------------------------------------------

/// Single value or array. Decoding tries the single form first, then the
/// array form; anything else is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(v) => v,
        }
    }
}

impl<T: DeserializeOwned> OneOrMany<T> {
    /// Decode `value` as one `T` or an array of `T`. `what` names the field
    /// in the error message.
    ///
    /// The JSON shape picks the variant, so an array is never coerced into
    /// a single struct.
    pub fn parse(value: &Value, what: &str) -> IssueResult<Vec<T>> {
        let decoded = match value {
            Value::Array(items) => items
                .iter()
                .map(|item| serde_json::from_value::<T>(item.clone()))
                .collect::<Result<Vec<T>, _>>(),
            single => serde_json::from_value::<T>(single.clone()).map(|one| vec![one]),
        };
        decoded.map_err(|e| {
            IssueError::InvalidInput(format!(
                "{} must be a single object or an array of objects: {}",
                what, e
            ))
        })
    }
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    OneOrMany::<T>::deserialize(deserializer).map(OneOrMany::into_vec)
}

// ---------------------------------------------------------------------------
// TypedId, Issuer
// ---------------------------------------------------------------------------

/// `{ "id": ..., "type": ... }` plus any extra members (status references,
/// terms of use).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedId {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

impl TypedId {
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            custom: Map::new(),
        }
    }
}

/// Credential issuer. Serialized as a bare string when it carries no extra
/// fields, as an object otherwise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "IssuerRepr", into = "IssuerRepr")]
pub struct Issuer {
    pub id: String,
    pub custom: Map<String, Value>,
}

impl Issuer {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            custom: Map::new(),
        }
    }

    pub fn with_name(id: impl Into<String>, name: impl Into<String>) -> Self {
        let mut issuer = Self::new(id);
        issuer
            .custom
            .insert("name".into(), Value::String(name.into()));
        issuer
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty() && self.custom.is_empty()
    }

    pub fn name(&self) -> Option<&str> {
        self.custom.get("name").and_then(Value::as_str)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum IssuerRepr {
    Id(String),
    Object {
        #[serde(default)]
        id: String,
        #[serde(flatten)]
        custom: Map<String, Value>,
    },
}

impl From<IssuerRepr> for Issuer {
    fn from(repr: IssuerRepr) -> Self {
        match repr {
            IssuerRepr::Id(id) => Issuer::new(id),
            IssuerRepr::Object { id, custom } => Issuer { id, custom },
        }
    }
}

impl From<Issuer> for IssuerRepr {
    fn from(issuer: Issuer) -> Self {
        if issuer.custom.is_empty() {
            IssuerRepr::Id(issuer.id)
        } else {
            IssuerRepr::Object {
                id: issuer.id,
                custom: issuer.custom,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ContextEntry
// ---------------------------------------------------------------------------

/// One `@context` entry: a vocabulary URI or an inline JSON-LD context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextEntry {
    Uri(String),
    Inline(Map<String, Value>),
}

impl ContextEntry {
    pub fn as_uri(&self) -> Option<&str> {
        match self {
            ContextEntry::Uri(uri) => Some(uri),
            ContextEntry::Inline(_) => None,
        }
    }
}

impl From<&str> for ContextEntry {
    fn from(uri: &str) -> Self {
        ContextEntry::Uri(uri.to_string())
    }
}

impl PartialEq<&str> for ContextEntry {
    fn eq(&self, other: &&str) -> bool {
        self.as_uri() == Some(*other)
    }
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------
/// A verifiable credential body. Members this type does not model are kept
/// in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    #[serde(rename = "@context", deserialize_with = "one_or_many")]
    pub context: Vec<ContextEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type", deserialize_with = "one_or_many")]
    pub types: Vec<String>,

    #[serde(default, skip_serializing_if = "Issuer::is_empty")]
    pub issuer: Issuer,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuance_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub credential_subject: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_status: Option<TypedId>,

    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "one_or_many"
    )]
    pub terms_of_use: Vec<TypedId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Credential {
    /// Parse and validate a credential from JSON. An existing proof is kept
    /// but not checked.
    pub fn parse(json: &[u8]) -> IssueResult<Self> {
        let credential: Credential = serde_json::from_slice(json).map_err(|e| {
            IssueError::InvalidInput(format!("failed to validate credential: {}", e))
        })?;
        credential.validate()?;
        Ok(credential)
    }

    pub fn validate(&self) -> IssueResult<()> {
        if self.context.first().and_then(ContextEntry::as_uri) != Some(W3C_CREDENTIALS_CONTEXT) {
            return Err(IssueError::InvalidInput(format!(
                "failed to validate credential: first @context must be {}",
                W3C_CREDENTIALS_CONTEXT
            )));
        }
        if !self.types.iter().any(|t| t == VERIFIABLE_CREDENTIAL_TYPE) {
            return Err(IssueError::InvalidInput(format!(
                "failed to validate credential: type must include {}",
                VERIFIABLE_CREDENTIAL_TYPE
            )));
        }
        if self.credential_subject.is_null() {
            return Err(IssueError::InvalidInput(
                "failed to validate credential: missing credentialSubject".into(),
            ));
        }
        Ok(())
    }

    /// Whether `context` is declared as a URI entry. Inline contexts are
    /// never matched.
    pub fn has_context(&self, context: &str) -> bool {
        self.context.iter().any(|c| c.as_uri() == Some(context))
    }

    /// Append a context declaration unless it is already present.
    pub fn add_context(&mut self, context: &str) {
        if !self.has_context(context) {
            self.context.push(ContextEntry::from(context));
        }
    }

    pub fn remove_context(&mut self, context: &str) {
        self.context.retain(|c| c.as_uri() != Some(context));
    }

    /// The credential without any proof, as signed.
    pub fn signing_payload(&self) -> IssueResult<Vec<u8>> {
        let unsigned = Credential {
            proof: None,
            ..self.clone()
        };
        Ok(serde_json::to_vec(&unsigned)?)
    }

    /// Append a proof, turning an existing single proof into an array.
    pub fn push_proof(&mut self, proof: Value) {
        self.proof = Some(match self.proof.take() {
            None => proof,
            Some(Value::Array(mut proofs)) => {
                proofs.push(proof);
                Value::Array(proofs)
            }
            Some(existing) => Value::Array(vec![existing, proof]),
        });
    }
}
