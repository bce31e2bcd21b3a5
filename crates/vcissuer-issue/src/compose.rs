use crate::credential::{
    ContextEntry, Credential, Issuer, OneOrMany, TypedId, VERIFIABLE_CREDENTIAL_TYPE,
    W3C_CREDENTIALS_CONTEXT,
};
use crate::error::{IssueError, IssueResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Request to build a credential from parts and issue it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeCredentialRequest {
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub issuance_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,
    /// Subject claims, a JSON object.
    #[serde(default)]
    pub claims: Option<Value>,
    /// A JSON object.
    #[serde(default)]
    pub evidence: Option<Value>,
    /// One typed ID or an array of them.
    #[serde(default)]
    pub terms_of_use: Option<Value>,
    #[serde(default)]
    pub proof_format: Option<String>,
    /// One options object or an array of them.
    #[serde(default)]
    pub proof_format_options: Option<Value>,
}

/// Assemble an unsigned credential from a compose request.
pub fn build_credential(request: &ComposeCredentialRequest) -> IssueResult<Credential> {
    let types = if request.types.is_empty() {
        vec![VERIFIABLE_CREDENTIAL_TYPE.to_string()]
    } else {
        request.types.clone()
    };

    let mut subject = match &request.claims {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(claims)) => claims.clone(),
        Some(_) => {
            return Err(IssueError::InvalidInput(
                "failed to build credential: claims must be a JSON object".into(),
            ))
        }
    };
    subject.insert("id".into(), Value::String(request.subject.clone()));

    let terms_of_use: Vec<TypedId> = match &request.terms_of_use {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => OneOrMany::parse(value, "termsOfUse")
            .map_err(|e| e.in_step("failed to build credential"))?,
    };

    let evidence = match &request.evidence {
        None | Some(Value::Null) => None,
        Some(v @ Value::Object(_)) => Some(v.clone()),
        Some(_) => {
            return Err(IssueError::InvalidInput(
                "failed to build credential: evidence must be a JSON object".into(),
            ))
        }
    };

    Ok(Credential {
        context: vec![ContextEntry::from(W3C_CREDENTIALS_CONTEXT)],
        id: None,
        types,
        issuer: Issuer::new(request.issuer.clone()),
        issuance_date: request.issuance_date.map(format_date),
        expiration_date: request.expiration_date.map(format_date),
        credential_subject: Value::Object(subject),
        credential_status: None,
        terms_of_use,
        evidence,
        proof: None,
        extra: Map::new(),
    })
}

fn format_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
