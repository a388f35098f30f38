//! Kwork mobile API adapter.
//!
//! Implements the `kwn-core` ListingSource over `POST /projects`, signing in
//! with the account credentials and caching the session token.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use kwn_core::{
    domain::{Filter, PageResponse, RawListing},
    errors::Error,
    ports::ListingSource,
    Result,
};

// Public credentials of the Kwork mobile app, sent as HTTP basic auth.
const MOBILE_API_USER: &str = "mobile_api";
const MOBILE_API_PASSWORD: &str = "qFvfRl7w";

#[derive(Clone, Debug)]
pub struct KworkConfig {
    pub api_url: String,
    pub login: String,
    pub password: String,
    pub phone_last: Option<String>,
    pub timeout: Duration,
}

impl From<&kwn_core::config::Config> for KworkConfig {
    fn from(cfg: &kwn_core::config::Config) -> Self {
        Self {
            api_url: cfg.kwork_api_url.clone(),
            login: cfg.kwork_login.clone(),
            password: cfg.kwork_password.clone(),
            phone_last: cfg.kwork_phone_last.clone(),
            timeout: cfg.http_timeout,
        }
    }
}

/// Response envelope shared by every API method.
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    response: serde_json::Value,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Default, Deserialize)]
struct Paging {
    #[serde(default)]
    pages: Option<serde_json::Value>,
}

impl Paging {
    fn pages(&self) -> u32 {
        match &self.pages {
            Some(serde_json::Value::Number(n)) => n
                .as_u64()
                .map_or(0, |v| u32::try_from(v).unwrap_or(u32::MAX)),
            Some(serde_json::Value::String(s)) => s
                .trim()
                .parse::<u64>()
                .map_or(0, |v| u32::try_from(v).unwrap_or(u32::MAX)),
            _ => 0,
        }
    }
}

pub struct KworkClient {
    http: reqwest::Client,
    cfg: KworkConfig,
    token: Mutex<Option<String>>,
}

impl KworkClient {
    pub fn new(cfg: KworkConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| Error::External(format!("http client: {e}")))?;
        Ok(Self {
            http,
            cfg,
            token: Mutex::new(None),
        })
    }

    fn endpoint(&self, api_method: &str) -> String {
        format!("{}/{api_method}", self.cfg.api_url)
    }

    /// POST an API method with query parameters and decode the envelope.
    ///
    /// `success: false` is returned as-is; only transport and decoding
    /// problems are errors.
    async fn api_request(&self, api_method: &str, params: &[(&str, String)]) -> Result<ApiEnvelope> {
        debug!(api_method, "kwork request");
        let resp = self
            .http
            .post(self.endpoint(api_method))
            .basic_auth(MOBILE_API_USER, Some(MOBILE_API_PASSWORD))
            .query(params)
            .send()
            .await
            .map_err(|e| Error::External(format!("kwork {api_method}: {e}")))?;

        let is_json = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("kwork {api_method}: {e}")))?;

        if !is_json {
            return Err(Error::Upstream(format!(
                "kwork {api_method} returned {status} non-JSON: {}",
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn sign_in(&self) -> Result<String> {
        let mut params = vec![
            ("login", self.cfg.login.clone()),
            ("password", self.cfg.password.clone()),
        ];
        if let Some(phone_last) = &self.cfg.phone_last {
            params.push(("phone_last", phone_last.clone()));
        }

        let env = self.api_request("signIn", &params).await?;
        if !env.success {
            return Err(Error::Upstream(format!(
                "kwork sign-in failed: {}",
                env.error.unwrap_or_else(|| "unknown error".to_string())
            )));
        }
        let token = env
            .response
            .get("token")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Upstream("kwork sign-in returned no token".to_string()))?;
        info!("signed in to kwork");
        Ok(token.to_string())
    }

    async fn token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(t) = guard.as_ref() {
            return Ok(t.clone());
        }
        let t = self.sign_in().await?;
        *guard = Some(t.clone());
        Ok(t)
    }

    async fn forget_token(&self) {
        self.token.lock().await.take();
    }

    async fn request_projects(&self, filter: &Filter, page: u32) -> Result<ApiEnvelope> {
        let mut params = project_params(filter, page);
        params.push(("token", self.token().await?));
        self.api_request("projects", &params).await
    }
}

#[async_trait]
impl ListingSource for KworkClient {
    async fn fetch_page(&self, filter: &Filter, page: u32) -> Result<PageResponse> {
        let mut env = self.request_projects(filter, page).await?;
        if !env.success && looks_like_auth_error(env.error.as_deref()) {
            warn!(page, "kwork token rejected, signing in again");
            self.forget_token().await;
            env = self.request_projects(filter, page).await?;
        }
        into_page(env)
    }

    async fn close(&self) -> Result<()> {
        self.forget_token().await;
        debug!("kwork client closed");
        Ok(())
    }
}

/// Query parameters of `POST /projects`; unset filter fields are omitted.
pub fn project_params(filter: &Filter, page: u32) -> Vec<(&'static str, String)> {
    let categories = filter
        .categories
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",");

    let mut params = vec![("categories", categories)];
    let optional = [
        ("price_from", filter.price_from.map(|v| v.to_string())),
        ("price_to", filter.price_to.map(|v| v.to_string())),
        ("hiring_from", filter.hiring_from.map(|v| v.to_string())),
        ("kworks_filter_from", filter.offers_from.map(|v| v.to_string())),
        ("kworks_filter_to", filter.offers_to.map(|v| v.to_string())),
        ("query", filter.query.clone()),
    ];
    params.extend(optional.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))));
    params.push(("page", page.to_string()));
    params
}

fn into_page(env: ApiEnvelope) -> Result<PageResponse> {
    if !env.success {
        return Ok(PageResponse::Failed {
            error: env.error.unwrap_or_else(|| "unknown error".to_string()),
        });
    }

    let listings = match env.response {
        serde_json::Value::Array(items) => items.into_iter().map(decode_listing).collect(),
        serde_json::Value::Null => Vec::new(),
        other => {
            return Err(Error::Upstream(format!(
                "kwork projects: unexpected response shape: {}",
                other.to_string().chars().take(120).collect::<String>()
            )))
        }
    };
    let pages = env.paging.map(|p| p.pages()).unwrap_or(1);

    Ok(PageResponse::Page { listings, pages })
}

/// A record that does not decode is kept as an id-less listing so the poll
/// cycle counts it as rejected instead of losing the whole page.
fn decode_listing(item: serde_json::Value) -> RawListing {
    let id = item.get("id").cloned();
    serde_json::from_value::<RawListing>(item).unwrap_or_else(|e| {
        warn!(?id, error = %e, "undecodable kwork project");
        RawListing::default()
    })
}

fn looks_like_auth_error(error: Option<&str>) -> bool {
    let Some(error) = error else {
        return false;
    };
    let lower = error.to_lowercase();
    lower.contains("token") || lower.contains("auth")
}
