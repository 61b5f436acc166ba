//! Wire and domain types for the Credhub data and certificates APIs.
//!
//! Credential versions are decoded by their declared `type` into
//! [`CredentialValue`], so callers match on a variant instead of probing a
//! dynamic JSON map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::secret::SecretString;

/// Response of `GET /api/v1/data?path=<prefix>`.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialListResponse {
    #[serde(default)]
    pub credentials: Vec<CredentialSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialSummary {
    pub name: String,
}

/// Response of `GET /api/v1/data?name=<name>&current=true`.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialVersionsResponse {
    #[serde(default)]
    pub data: Vec<CredentialVersion>,
}

/// Response of `GET /api/v1/certificates?name=<name>`.
#[derive(Debug, Clone, Deserialize)]
pub struct CertificateListResponse {
    #[serde(default)]
    pub certificates: Vec<CertificateSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CertificateSummary {
    #[serde(default)]
    pub id: String,
}

/// Body of `PUT /api/v1/data` for value credentials.
#[derive(Debug, Clone, Serialize)]
pub struct SetValueRequest<'a> {
    pub name: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub value: &'a str,
}

/// Body of `POST /api/v1/certificates/<id>/regenerate`.
#[derive(Debug, Clone, Serialize)]
pub struct RegenerateRequest {
    pub set_as_transitional: bool,
}

/// Body of `PUT /api/v1/certificates/<id>/update_transitional_version`.
///
/// `version: null` clears the transitional flag on every version.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateTransitionalRequest<'a> {
    pub version: Option<&'a str>,
}

/// Certificate credential payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CertificateValue {
    #[serde(default)]
    pub ca: Option<String>,
    pub certificate: String,
    #[serde(default)]
    pub private_key: Option<SecretString>,
}

impl CertificateValue {
    /// Certificate payload with no CA chain and no private key.
    pub fn new(certificate: impl Into<String>) -> Self {
        Self {
            ca: None,
            certificate: certificate.into(),
            private_key: None,
        }
    }

    pub fn with_private_key(mut self, private_key: impl Into<SecretString>) -> Self {
        self.private_key = Some(private_key.into());
        self
    }
}

/// Typed value of a single credential version.
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialValue {
    /// `type: "value"`
    Value(String),
    /// `type: "certificate"`
    Certificate(CertificateValue),
    /// Any other credential type (password, json, ssh, rsa, user). Rotation ignores these.
    Other { kind: String },
}

impl CredentialValue {
    fn decode(kind: &str, value: serde_json::Value) -> serde_json::Result<Self> {
        match kind {
            "value" => Ok(Self::Value(serde_json::from_value(value)?)),
            "certificate" => Ok(Self::Certificate(serde_json::from_value(value)?)),
            other => Ok(Self::Other {
                kind: other.to_string(),
            }),
        }
    }

    /// The declared credential type.
    pub fn kind(&self) -> &str {
        match self {
            CredentialValue::Value(_) => "value",
            CredentialValue::Certificate(_) => "certificate",
            CredentialValue::Other { kind } => kind,
        }
    }
}

/// One version of a credential as returned by the store.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawCredentialVersion")]
pub struct CredentialVersion {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub transitional: bool,
    pub value: CredentialValue,
}

#[derive(Deserialize)]
struct RawCredentialVersion {
    id: String,
    version_created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    transitional: bool,
    #[serde(default)]
    value: serde_json::Value,
}

impl TryFrom<RawCredentialVersion> for CredentialVersion {
    type Error = serde_json::Error;

    fn try_from(raw: RawCredentialVersion) -> Result<Self, Self::Error> {
        let value = CredentialValue::decode(&raw.kind, raw.value)?;
        Ok(Self {
            id: raw.id,
            created_at: raw.version_created_at,
            transitional: raw.transitional,
            value,
        })
    }
}

impl CredentialVersion {
    /// A non-transitional certificate version.
    pub fn certificate(
        id: impl Into<String>,
        created_at: DateTime<Utc>,
        value: CertificateValue,
    ) -> Self {
        Self {
            id: id.into(),
            created_at,
            transitional: false,
            value: CredentialValue::Certificate(value),
        }
    }

    /// A plain value version.
    pub fn value(
        id: impl Into<String>,
        created_at: DateTime<Utc>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            created_at,
            transitional: false,
            value: CredentialValue::Value(value.into()),
        }
    }

    pub fn with_transitional(mut self, transitional: bool) -> Self {
        self.transitional = transitional;
        self
    }

    pub fn as_certificate(&self) -> Option<&CertificateValue> {
        match &self.value {
            CredentialValue::Certificate(cert) => Some(cert),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&str> {
        match &self.value {
            CredentialValue::Value(value) => Some(value),
            _ => None,
        }
    }
}
