//! # Error Types
//!
//! Error taxonomy for certificate rotation using `thiserror`.

/// Custom result type for rotation operations
pub type Result<T> = std::result::Result<T, RotationError>;

/// Main error type for certificate rotation
#[derive(thiserror::Error, Debug)]
pub enum RotationError {
    /// Token discovery or token exchange failed, or the store rejected our token
    #[error("Authentication error: {message}")]
    Authentication { message: String },

    /// Network-level failure talking to the credential store or token endpoint
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The named credential does not exist
    #[error("Credential not found: {name}")]
    NotFound { name: String },

    /// Unexpected status code or malformed response body
    #[error("Protocol error: {message}{}", status_suffix(.status))]
    Protocol {
        message: String,
        status: Option<u16>,
    },

    /// A stored certificate could not be decoded
    #[error("Certificate decode error for '{name}': {message}")]
    CertificateDecode { name: String, message: String },

    /// Store contents violate a rotation invariant
    #[error("Consistency error: {message}")]
    Consistency { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The caller cancelled the operation before any mutation was issued
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RotationError {
    /// Create an authentication error
    pub fn authentication<S: Into<String>>(message: S) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a transport error without an underlying source
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error wrapping a reqwest failure
    pub fn transport_with_source<S: Into<String>>(message: S, source: reqwest::Error) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(name: S) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create a protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
            status: None,
        }
    }

    /// Create a protocol error carrying the offending HTTP status
    pub fn protocol_status<S: Into<String>>(message: S, status: u16) -> Self {
        Self::Protocol {
            message: message.into(),
            status: Some(status),
        }
    }

    /// Create a certificate decode error
    pub fn certificate_decode<N: Into<String>, S: Into<String>>(name: N, message: S) -> Self {
        Self::CertificateDecode {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a consistency error
    pub fn consistency<S: Into<String>>(message: S) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled<S: Into<String>>(operation: S) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, RotationError::NotFound { .. })
    }

    /// Check if the transport layer may retry the request that produced this error
    pub fn is_retryable(&self) -> bool {
        match self {
            RotationError::Transport { .. } => true,
            RotationError::Protocol {
                status: Some(status),
                ..
            } => matches!(*status, 502..=504),
            _ => false,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|s| format!(" (status: {})", s))
        .unwrap_or_default()
}

impl From<validator::ValidationErrors> for RotationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::config(format!("Validation failed: {}", message))
    }
}
