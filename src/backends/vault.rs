use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::{BackendError, Result, ResultExt};
use super::id::SecretId;
use super::policy::{branch_name, Policy, PolicyMode};
use super::secret::{Secret, SecretValue};
use super::secret_backend::SecretBackend;
use super::variables::{self, VariableStore};
use crate::telemetry;

/// Access tokens are valid for eight minutes; refresh a little earlier.
const TOKEN_LIFETIME: Duration = Duration::from_secs(7 * 60);

const CLIENT_NAME: &str = "vault";

/// Operations the policy-driven vault offers.
#[async_trait::async_trait]
pub trait VaultApi: Send + Sync {
    /// Current value of a variable, `None` if it is undeclared or has no value.
    async fn retrieve_secret(&self, variable_id: &str) -> Result<Option<String>>;

    /// Store a new value for a declared variable.
    async fn add_secret(&self, variable_id: &str, value: &str) -> Result<()>;

    /// Apply a policy document to a branch.
    async fn load_policy(&self, mode: PolicyMode, branch: &str, policy: &Policy) -> Result<()>;
}

struct AccessToken {
    header: String,
    fetched_at: Instant,
}

/// HTTP client for a Conjur-style vault
#[derive(Clone)]
pub struct VaultClient {
    client: Client,
    base: Url,
    account: String,
    login: String,
    api_key: String,
    token: Arc<Mutex<Option<AccessToken>>>,
}

impl VaultClient {
    /// Create a new vault client
    pub fn new(
        url: &str,
        account: String,
        login: String,
        api_key: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        use anyhow::Context;

        let base = Url::parse(url).with_context(|| format!("Invalid vault URL: {}", url))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("Vault URL cannot be used as a base: {}", url);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base,
            account,
            login,
            api_key,
            token: Arc::new(Mutex::new(None)),
        })
    }

    /// Build an endpoint URL; each segment is percent-encoded as a whole.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, method: &'static str, request: RequestBuilder) -> Result<Response> {
        let start = Instant::now();
        let result = request.send().await;
        let status = match &result {
            Ok(response) => response.status().as_u16().to_string(),
            Err(_) => "error".to_string(),
        };
        telemetry::record_http_request(CLIENT_NAME, method, &status, start.elapsed().as_secs_f64());

        result.map_err(|e| BackendError::unavailable(format!("request to vault failed: {}", e)))
    }

    async fn error_for_status(&self, response: Response) -> BackendError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            // Force a fresh login on the next request
            self.token.lock().await.take();
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            BackendError::unavailable(format!("status {}: {}", status, body))
        } else {
            BackendError::blocked(status.as_u16(), body)
        }
    }

    /// Authorization header for the current access token, logging in if needed
    async fn authorization(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if let Some(current) = token.as_ref() {
            if current.fetched_at.elapsed() < TOKEN_LIFETIME {
                return Ok(current.header.clone());
            }
        }

        let url = self.endpoint(&["authn", self.account.as_str(), self.login.as_str(), "authenticate"]);
        debug!("Authenticating against: {}", url);

        let response = self
            .send("Authenticate", self.client.post(url).body(self.api_key.clone()))
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::blocked(status.as_u16(), body)
                .context(format!("failed to authenticate as {}", self.login)));
        }

        let raw = response
            .bytes()
            .await
            .map_err(|e| BackendError::unavailable(format!("failed to read access token: {}", e)))?;
        let header = format!("Token token=\"{}\"", STANDARD.encode(&raw));
        *token = Some(AccessToken {
            header: header.clone(),
            fetched_at: Instant::now(),
        });

        info!("Authenticated against vault as {}", self.login);
        Ok(header)
    }
}

#[async_trait::async_trait]
impl VaultApi for VaultClient {
    async fn retrieve_secret(&self, variable_id: &str) -> Result<Option<String>> {
        let url = self.endpoint(&["secrets", self.account.as_str(), "variable", variable_id]);
        debug!("Reading secret from: {}", url);

        let authorization = self.authorization().await?;
        let response = self
            .send(
                "RetrieveSecret",
                self.client.get(url).header("Authorization", authorization),
            )
            .await?;

        // 404 means the variable is undeclared or was never given a value
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(self.error_for_status(response).await);
        }

        let value = response
            .text()
            .await
            .map_err(|e| BackendError::unavailable(format!("failed to read secret body: {}", e)))?;
        Ok(Some(value))
    }

    async fn add_secret(&self, variable_id: &str, value: &str) -> Result<()> {
        let url = self.endpoint(&["secrets", self.account.as_str(), "variable", variable_id]);
        debug!("Writing secret to: {}", url);

        let authorization = self.authorization().await?;
        let response = self
            .send(
                "AddSecret",
                self.client
                    .post(url)
                    .header("Authorization", authorization)
                    .body(value.to_string()),
            )
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::not_found(variable_id)
                .context("variable is not declared, onboard the tenant first"));
        }
        if !response.status().is_success() {
            return Err(self.error_for_status(response).await);
        }
        Ok(())
    }

    async fn load_policy(&self, mode: PolicyMode, branch: &str, policy: &Policy) -> Result<()> {
        let url = self.endpoint(&["policies", self.account.as_str(), "policy", branch_name(branch)]);
        debug!("Loading policy {} into: {}", policy.id(), url);

        let authorization = self.authorization().await?;
        let response = self
            .send(
                "LoadPolicy",
                self.client
                    .request(mode.method(), url)
                    .header("Authorization", authorization)
                    .body(policy.render()),
            )
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::not_found(branch_name(branch).to_string())
                .context("policy branch does not exist"));
        }
        if !response.status().is_success() {
            return Err(self.error_for_status(response).await);
        }

        info!("Successfully loaded policy {} into {}", policy.id(), branch_name(branch));
        Ok(())
    }
}

/// Secret backend over a policy-driven vault
///
/// Variables must have been declared by onboarding before they can be written.
pub struct VaultBackend {
    api: Arc<dyn VaultApi>,
    root_policy_path: String,
    secret_length: usize,
}

impl VaultBackend {
    pub fn new(api: Arc<dyn VaultApi>, root_policy_path: String, secret_length: usize) -> Self {
        Self {
            api,
            root_policy_path,
            secret_length,
        }
    }

    pub fn root_policy_path(&self) -> &str {
        &self.root_policy_path
    }

    fn variable_id(&self, id: &SecretId) -> String {
        id.variable_id(&self.root_policy_path)
    }
}

#[async_trait::async_trait]
impl VariableStore for VaultBackend {
    async fn read_variable(&self, id: &SecretId) -> Result<Option<String>> {
        self.api.retrieve_secret(&self.variable_id(id)).await
    }

    async fn write_variable(&self, id: &SecretId, value: &str) -> Result<()> {
        self.api.add_secret(&self.variable_id(id), value).await
    }

    async fn clear_variable(&self, id: &SecretId) -> Result<()> {
        // Variables only disappear with their policy; an empty value counts as absent
        match self.api.add_secret(&self.variable_id(id), "").await {
            Err(e) if e.is_not_found() => {
                warn!("Variable {} is not declared, nothing to delete", self.variable_id(id));
                Ok(())
            }
            result => result,
        }
    }
}

#[async_trait::async_trait]
impl SecretBackend for VaultBackend {
    async fn get(&self, id: &SecretId) -> Result<Secret> {
        variables::get_secret(self, id)
            .await
            .with_context(|| format!("failed to read secret {}", self.variable_id(id)))
    }

    async fn set(&self, id: &SecretId, value: SecretValue) -> Result<Secret> {
        variables::set_secret(self, id, &value, self.secret_length)
            .await
            .with_context(|| format!("failed to write secret {}", self.variable_id(id)))
    }

    async fn delete(&self, id: &SecretId) -> Result<()> {
        variables::delete_secret(self, id)
            .await
            .with_context(|| format!("failed to delete secret {}", self.variable_id(id)))
    }

    fn backend_type(&self) -> &'static str {
        "Vault"
    }
}
