//! HTTPS adapter for the Credhub data and certificates APIs.
//!
//! Authentication uses the OAuth2 client-credentials grant against the auth server
//! that Credhub advertises on `GET /info`. The bearer token is fetched lazily on the
//! first API call and reused until Credhub answers 401; the request is then sent once
//! more with a freshly issued token.
//!
//! # Retries
//!
//! Idempotent requests (GET, PUT, DELETE) are retried on connection failures,
//! timeouts and 502/503/504 responses with a linear backoff. Regenerating a
//! certificate is a POST that creates a new version and is never retried.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn, Instrument};

use super::client::CredentialStore;
use super::secret::SecretString;
use super::types::{
    CertificateListResponse, CredentialListResponse, CredentialVersion,
    CredentialVersionsResponse, RegenerateRequest, SetValueRequest, UpdateTransitionalRequest,
};
use crate::config::CredhubConfig;
use crate::errors::{Result, RotationError};

const JSON: &str = "application/json";

#[derive(Deserialize)]
struct InfoResponse {
    #[serde(rename = "auth-server", default)]
    auth_server: AuthServer,
}

#[derive(Deserialize, Default)]
struct AuthServer {
    #[serde(default)]
    url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
}

/// Credential store backed by a Credhub server.
pub struct HttpCredentialStore {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: SecretString,
    token: Mutex<Option<SecretString>>,
    max_retries: u32,
    retry_delay: Duration,
}

impl std::fmt::Debug for HttpCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCredentialStore")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl HttpCredentialStore {
    /// Build a client for the configured Credhub.
    ///
    /// When a CA bundle is configured it must contain at least one PEM certificate;
    /// those certificates are trusted in addition to the system roots.
    pub fn new(config: &CredhubConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(config.timeout());

        if let Some(bundle) = &config.ca_cert {
            let certs = reqwest::Certificate::from_pem_bundle(bundle.as_bytes()).map_err(|e| {
                RotationError::config(format!("Invalid Credhub CA certificate bundle: {}", e))
            })?;
            if certs.is_empty() {
                return Err(RotationError::config(
                    "Credhub CA certificate bundle must include at least one PEM certificate",
                ));
            }
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        let client = builder
            .build()
            .map_err(|e| RotationError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token: Mutex::new(None),
            max_retries: config.max_retries.max(1),
            retry_delay: config.retry_delay(),
        })
    }

    /// The cached bearer token, fetching one if none is held.
    async fn access_token(&self) -> Result<SecretString> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let token = self.fetch_token().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Drop `stale` from the cache unless another request already replaced it.
    async fn invalidate_token(&self, stale: &SecretString) {
        let mut cached = self.token.lock().await;
        if cached.as_ref() == Some(stale) {
            *cached = None;
        }
    }

    /// Send an authorized API request, re-authenticating once if the token is rejected.
    async fn send_api<F>(&self, operation: &str, idempotent: bool, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let token = self.access_token().await?;
        let response = self
            .execute(operation, idempotent, || authorize(build(), &token))
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!(operation = operation, "Credhub rejected the access token, re-authenticating");
        self.invalidate_token(&token).await;
        let token = self.access_token().await?;
        self.execute(operation, idempotent, || authorize(build(), &token)).await
    }

    async fn discover_auth_server(&self) -> Result<String> {
        let url = format!("{}/info", self.base_url);
        debug!("GET {}", url);

        let response = self
            .execute("GET /info", true, || self.client.get(&url).header(ACCEPT, JSON))
            .await?;
        let response = check_status(response, "GET /info").await?;
        let info: InfoResponse = decode_json(response, "GET /info").await?;

        if info.auth_server.url.is_empty() {
            return Err(RotationError::authentication("no auth server URL found in response"));
        }
        Ok(info.auth_server.url.trim_end_matches('/').to_string())
    }

    async fn fetch_token(&self) -> Result<SecretString> {
        let auth_url = self.discover_auth_server().await?;
        let token_url = format!("{}/oauth/token", auth_url);
        debug!(client_id = %self.client_id, "POST {}", token_url);

        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("grant_type", "client_credentials"),
            ("token_type", "jwt"),
        ];

        let response = self
            .execute("POST /oauth/token", true, || {
                self.client
                    .post(&token_url)
                    .header(ACCEPT, JSON)
                    .form(&form)
            })
            .await?;

        let status = response.status();
        let rejected = matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        );
        if rejected {
            return Err(RotationError::authentication(format!(
                "token request rejected with status {}",
                status
            )));
        }
        let response = check_status(response, "POST /oauth/token").await?;
        let token: TokenResponse = decode_json(response, "POST /oauth/token").await?;

        if token.access_token.is_empty() {
            return Err(RotationError::authentication("no access token found in response"));
        }

        debug!(client_id = %self.client_id, "Obtained Credhub access token");
        Ok(SecretString::new(token.access_token))
    }

    /// Send a request, retrying transient failures when `idempotent` is set.
    async fn execute<F>(&self, operation: &str, idempotent: bool, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let attempts = if idempotent { self.max_retries } else { 1 };
        let mut attempt: u32 = 1;
        let span = crate::store_span!(operation);

        loop {
            span.record("attempt", attempt);
            let outcome = match build().send().instrument(span.clone()).await {
                Ok(response) if matches!(response.status().as_u16(), 502..=504) => {
                    let status = response.status();
                    Err(RotationError::protocol_status(
                        format!("{} returned {}", operation, status),
                        status.as_u16(),
                    ))
                }
                Ok(response) => Ok(response),
                Err(e) => Err(RotationError::transport_with_source(
                    format!("{} failed: {}", operation, e),
                    e,
                )),
            };

            match outcome {
                Ok(response) => return Ok(response),
                Err(err) if attempt < attempts && err.is_retryable() => {
                    warn!(
                        operation = operation,
                        attempt = attempt,
                        error = %err,
                        "Credhub request failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }
}

fn authorize(request: RequestBuilder, token: &SecretString) -> RequestBuilder {
    request
        .header(ACCEPT, JSON)
        .header(AUTHORIZATION, format!("bearer {}", token.expose_secret()))
}

/// Map authentication failures and non-success statuses to errors.
async fn check_status(response: Response, operation: &str) -> Result<Response> {
    let status = response.status();
    debug!(operation = operation, status = status.as_u16(), "Credhub response");

    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return Err(RotationError::authentication(format!(
            "{} rejected with status {}",
            operation, status
        )));
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        debug!(operation = operation, body = %body, "Credhub error response");
        return Err(RotationError::protocol_status(
            format!("{} returned unexpected status {}", operation, status),
            status.as_u16(),
        ));
    }

    Ok(response)
}

async fn decode_json<T: DeserializeOwned>(response: Response, operation: &str) -> Result<T> {
    let body = response.text().await.map_err(|e| {
        RotationError::transport_with_source(
            format!("{}: failed to read response body", operation),
            e,
        )
    })?;

    serde_json::from_str(&body).map_err(|e| {
        RotationError::protocol(format!("{}: failed to decode response: {}", operation, e))
    })
}

#[async_trait]
impl CredentialStore for HttpCredentialStore {
    async fn list_credentials(&self, path: &str) -> Result<Vec<String>> {
        let url = self.api_url("data");
        debug!(path = %path, "GET {}", url);

        let response = self
            .send_api("list credentials", true, || {
                self.client.get(&url).query(&[("path", path)])
            })
            .await?;
        let response = check_status(response, "list credentials").await?;
        let listing: CredentialListResponse = decode_json(response, "list credentials").await?;

        Ok(listing.credentials.into_iter().map(|c| c.name).collect())
    }

    async fn get_credential(&self, name: &str) -> Result<Vec<CredentialVersion>> {
        let url = self.api_url("data");
        debug!(credential = %name, "GET {}", url);

        let response = self
            .send_api("get credential", true, || {
                self.client
                    .get(&url)
                    .query(&[("name", name), ("current", "true")])
            })
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(RotationError::not_found(name));
        }
        let response = check_status(response, "get credential").await?;
        let versions: CredentialVersionsResponse = decode_json(response, "get credential").await?;

        Ok(versions.data)
    }

    async fn set_value_credential(&self, name: &str, value: &str) -> Result<()> {
        let url = self.api_url("data");
        debug!(credential = %name, "PUT {}", url);

        let body = SetValueRequest {
            name,
            kind: "value",
            value,
        };
        let response = self
            .send_api("set value credential", true, || {
                self.client.put(&url).json(&body)
            })
            .await?;
        check_status(response, "set value credential").await?;

        Ok(())
    }

    async fn delete_credential(&self, name: &str) -> Result<()> {
        let url = self.api_url("data");
        debug!(credential = %name, "DELETE {}", url);

        let response = self
            .send_api("delete credential", true, || {
                self.client.delete(&url).query(&[("name", name)])
            })
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RotationError::not_found(name));
        }
        let response = check_status(response, "delete credential").await?;
        if response.status() != StatusCode::NO_CONTENT {
            return Err(RotationError::protocol_status(
                format!("delete credential returned {} instead of 204", status),
                status.as_u16(),
            ));
        }

        Ok(())
    }

    async fn certificate_id(&self, name: &str) -> Result<String> {
        let url = self.api_url("certificates");
        debug!(credential = %name, "GET {}", url);

        let response = self
            .send_api("get certificate id", true, || {
                self.client.get(&url).query(&[("name", name)])
            })
            .await?;
        let response = check_status(response, "get certificate id").await?;
        let listing: CertificateListResponse = decode_json(response, "get certificate id").await?;

        match listing.certificates.as_slice() {
            [only] if !only.id.is_empty() => Ok(only.id.clone()),
            [_] => Err(RotationError::consistency(format!(
                "certificate '{}' has an empty certificate id",
                name
            ))),
            many => Err(RotationError::consistency(format!(
                "expected exactly one certificate named '{}', found {}",
                name,
                many.len()
            ))),
        }
    }

    async fn regenerate_transitional(&self, certificate_id: &str) -> Result<CredentialVersion> {
        let url = self.api_url(&format!("certificates/{}/regenerate", certificate_id));
        debug!(certificate_id = %certificate_id, "POST {}", url);

        let body = RegenerateRequest {
            set_as_transitional: true,
        };
        let response = self
            .send_api("regenerate certificate", false, || {
                self.client.post(&url).json(&body)
            })
            .await?;
        let response = check_status(response, "regenerate certificate").await?;

        decode_json(response, "regenerate certificate").await
    }

    async fn mark_transitional(&self, certificate_id: &str, version_id: &str) -> Result<()> {
        self.update_transitional(certificate_id, Some(version_id)).await
    }

    async fn clear_transitional(&self, certificate_id: &str) -> Result<()> {
        self.update_transitional(certificate_id, None).await
    }
}

impl HttpCredentialStore {
    async fn update_transitional(
        &self,
        certificate_id: &str,
        version: Option<&str>,
    ) -> Result<()> {
        let url =
            self.api_url(&format!("certificates/{}/update_transitional_version", certificate_id));
        debug!(certificate_id = %certificate_id, version = ?version, "PUT {}", url);

        let body = UpdateTransitionalRequest { version };
        let response = self
            .send_api("update transitional version", true, || {
                self.client.put(&url).json(&body)
            })
            .await?;
        check_status(response, "update transitional version").await?;

        Ok(())
    }
}
