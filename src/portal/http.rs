use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::api::PortalApi;
use super::credential::CredentialHolder;
use super::models::{RunDetail, RunSummary, ScenarioResult};
use crate::config::{AUTH_PATH, AUTH_PURPOSE, CREATE_RUN_PATH, REQUEST_TIMEOUT, RUNS_PATH};
use crate::design::ExperimentPayload;

/// Portal client over HTTPS
///
/// Every request carries the bearer token currently held by the shared
/// [`CredentialHolder`].
pub struct HttpPortal {
    base_url: Url,
    http: Client,
    credential: Arc<CredentialHolder>,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RunIdResponse {
    Bare(i64),
    Wrapped { id: i64 },
}

impl HttpPortal {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_credential(base_url, Arc::new(CredentialHolder::new()))
    }

    pub fn with_credential(base_url: &str, credential: Arc<CredentialHolder>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            http,
            credential,
        })
    }

    pub fn credential(&self) -> &Arc<CredentialHolder> {
        &self.credential
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Invalid API path '{}'", path))
    }

    async fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self.credential.current().await;
        request.bearer_auth(token.as_str())
    }

    async fn fetch_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.authorized(request).await.send().await?;
        let response = check_status(response).await?;
        let url = response.url().clone();
        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to decode response from {}", url))
    }
}

/// Parse the base URL, making sure relative API paths join under it
fn normalize_base_url(base_url: &str) -> Result<Url> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Portal URL is empty"));
    }
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&with_slash).with_context(|| format!("Invalid portal URL '{}'", base_url))
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    Err(anyhow!("Request to {} failed with {}: {}", url, status, body.trim()))
}

#[async_trait]
impl PortalApi for HttpPortal {
    async fn authenticate(&self, access_token: &str) -> Result<()> {
        let url = self.endpoint(AUTH_PATH)?;
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({
                "personalAccessToken": access_token,
                "purpose": AUTH_PURPOSE,
            }))
            .send()
            .await
            .context("Failed to reach portal for authentication")?;
        let auth: AuthResponse = check_status(response)
            .await
            .context("Authentication rejected")?
            .json()
            .await
            .context("Failed to decode authentication response")?;

        self.credential.replace(auth.token).await;
        tracing::debug!("session credential issued");
        Ok(())
    }

    async fn start_run(&self, payload: &ExperimentPayload) -> Result<i64> {
        let url = self.endpoint(CREATE_RUN_PATH)?;
        let id: RunIdResponse = self
            .fetch_json(self.http.post(url).json(payload))
            .await
            .context("Failed to start run")?;
        Ok(match id {
            RunIdResponse::Bare(id) | RunIdResponse::Wrapped { id } => id,
        })
    }

    async fn get_run(&self, run_id: i64) -> Result<RunDetail> {
        let url = self.endpoint(&format!("{RUNS_PATH}/{run_id}"))?;
        self.fetch_json(self.http.get(url))
            .await
            .with_context(|| format!("Failed to get run {}", run_id))
    }

    async fn get_runs(&self, experiment_id: Option<i64>) -> Result<Vec<RunSummary>> {
        let mut url = self.endpoint(RUNS_PATH)?;
        if let Some(id) = experiment_id {
            url.query_pairs_mut()
                .append_pair("experiment_id", &id.to_string());
        }
        self.fetch_json(self.http.get(url))
            .await
            .context("Failed to list runs")
    }

    async fn get_scenario_results(&self, run_id: i64) -> Result<Vec<ScenarioResult>> {
        let url = self.endpoint(&format!("{RUNS_PATH}/{run_id}/scenarios"))?;
        self.fetch_json(self.http.get(url))
            .await
            .with_context(|| format!("Failed to get scenario results for run {}", run_id))
    }

    async fn delete_run(&self, run_id: i64) -> Result<()> {
        let url = self.endpoint(&format!("{RUNS_PATH}/{run_id}"))?;
        let response = self.authorized(self.http.delete(url)).await.send().await?;
        check_status(response)
            .await
            .with_context(|| format!("Failed to delete run {}", run_id))?;
        Ok(())
    }
}
