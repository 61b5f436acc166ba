//! X.509 CA classification.

use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::*;

use crate::errors::{Result, RotationError};

const CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// Report whether the first PEM block in `pem` is a CA certificate.
///
/// The block must be labelled `CERTIFICATE` and hold a parseable X.509 certificate.
/// The result is the basic-constraints `cA` flag; a certificate without the
/// extension is not a CA. `name` only labels errors.
pub fn classify(name: &str, pem: &[u8]) -> Result<bool> {
    let (_, block) = parse_x509_pem(pem).map_err(|e| {
        RotationError::certificate_decode(name, format!("no PEM block found: {}", e))
    })?;

    if block.label != CERTIFICATE_LABEL {
        return Err(RotationError::certificate_decode(
            name,
            format!("PEM block is '{}', not a certificate", block.label),
        ));
    }

    let (_, cert) = X509Certificate::from_der(&block.contents)
        .map_err(|e| RotationError::certificate_decode(name, format!("invalid X.509: {}", e)))?;

    let constraints = cert.basic_constraints().map_err(|e| {
        RotationError::certificate_decode(name, format!("invalid basic constraints: {}", e))
    })?;

    Ok(constraints.map(|ext| ext.value.ca).unwrap_or(false))
}
