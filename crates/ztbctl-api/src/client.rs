// Async HTTP client for the ZTB management API.
//
// Base: https://<tenant>-api.<domain>
// Auth: `Authorization: Bearer <delegate token>`, refreshed once on 401.
//
// Every call returns the raw status and decoded body. Interpreting
// non-2xx statuses belongs to the caller, which knows whether the
// resource is structural or independent.

use std::future::Future;

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::auth::{Credentials, Token, TokenProvider};
use crate::endpoints;
use crate::{Error, TransportConfig};

// ── Response ────────────────────────────────────────────────────────

/// Status plus decoded body of one API exchange.
///
/// Non-JSON bodies are kept as `Value::String`, empty bodies as `Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    /// Short human-readable rendering of the body for logs and summaries.
    pub fn message(&self) -> String {
        let text = match &self.body {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let preview: String = text.chars().take(200).collect();
        if preview.is_empty() {
            format!("HTTP {}", self.status)
        } else {
            format!("HTTP {}: {preview}", self.status)
        }
    }
}

// ── Transport seam ──────────────────────────────────────────────────

/// The single capability the provisioning workflow needs from the network.
///
/// `path` is relative to the tenant root (e.g. `/api/v2/Network/`) and may
/// carry a query string.
pub trait Transport: Send + Sync {
    fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> impl Future<Output = Result<ApiResponse, Error>> + Send;
}

// ── Client ──────────────────────────────────────────────────────────

/// Everything needed to build a [`ZtbClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub credentials: Credentials,
    pub transport: TransportConfig,
}

/// Production [`Transport`] backed by `reqwest`.
pub struct ZtbClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<SecretString>,
    tokens: TokenProvider,
}

impl ZtbClient {
    // ── Constructors ─────────────────────────────────────────────────

    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let base_url = normalize_base_url(&config.base_url)?;

        let origin = origin_for(&base_url);
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("XMLHttpRequest"),
        );
        if let Ok(value) = HeaderValue::from_str(&origin) {
            headers.insert(reqwest::header::ORIGIN, value);
        }
        if let Ok(value) = HeaderValue::from_str(&format!("{origin}/")) {
            headers.insert(reqwest::header::REFERER, value);
        }

        let http = config.transport.build_client(headers)?;
        Ok(Self::with_client(http, base_url, &config.credentials))
    }

    /// Wrap an existing `reqwest::Client` (used by tests).
    pub fn with_client(http: reqwest::Client, base_url: Url, credentials: &Credentials) -> Self {
        Self {
            http,
            base_url,
            api_key: credentials.api_key().cloned(),
            tokens: TokenProvider::new(credentials.initial_token()),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn tokens(&self) -> &TokenProvider {
        &self.tokens
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Join `path` onto the tenant root and make sure the
    /// `refresh_token=enabled` flag every endpoint expects is present.
    fn url(&self, path: &str) -> Result<Url, Error> {
        let root = self.base_url.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{root}{path}"))?;
        if !url.query_pairs().any(|(k, _)| k == "refresh_token") {
            url.query_pairs_mut().append_pair("refresh_token", "enabled");
        }
        Ok(url)
    }

    // ── Auth ─────────────────────────────────────────────────────────

    /// Exchange the API key for a delegate token.
    pub async fn login(&self) -> Result<Token, Error> {
        let Some(key) = self.api_key.as_ref() else {
            return Err(Error::NotRefreshable);
        };
        let root = self.base_url.as_str().trim_end_matches('/');
        let url = Url::parse(&format!("{root}{}", endpoints::LOGIN))?;
        debug!("POST {url}");

        let resp = self
            .http
            .post(url)
            .json(&json!({ "api_key": key.expose_secret() }))
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(Error::Authentication {
                message: format!("login returned HTTP {}", status.as_u16()),
            });
        }
        let body: Value = serde_json::from_str(&text).map_err(|e| Error::Deserialization {
            message: format!("login response: {e}"),
            body: text.clone(),
        })?;
        Token::from_login_response(&body)
    }

    async fn refresh(&self, seen_generation: u64) -> Result<(), Error> {
        if self.api_key.is_none() {
            return Err(Error::NotRefreshable);
        }
        self.tokens.refresh(seen_generation, || self.login()).await
    }

    // ── Request execution ────────────────────────────────────────────

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        token: Option<&SecretString>,
    ) -> Result<ApiResponse, Error> {
        debug!("{method} {url}");

        let mut req = self.http.request(method, url);
        if let Some(token) = token {
            req = req.bearer_auth(token.expose_secret());
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        debug!(status, "response");

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok(ApiResponse { status, body })
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, Error> {
        let url = self.url(path)?;

        let mut snapshot = self.tokens.snapshot().await;
        if snapshot.stale && self.api_key.is_some() {
            self.refresh(snapshot.generation).await?;
            snapshot = self.tokens.snapshot().await;
        }

        let resp = self
            .send(method.clone(), url.clone(), body, snapshot.token.as_ref())
            .await?;
        if resp.status != 401 {
            return Ok(resp);
        }

        tracing::warn!(path, "401 Unauthorized, refreshing token and retrying once");
        self.refresh(snapshot.generation).await?;
        let retry_token = self.tokens.snapshot().await.token;
        let resp = self.send(method, url, body, retry_token.as_ref()).await?;
        if resp.status == 401 {
            return Err(Error::SessionExpired);
        }
        Ok(resp)
    }
}

impl Transport for ZtbClient {
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, Error> {
        self.execute(method, path, body).await
    }
}

// ── Base URL handling ───────────────────────────────────────────────

/// Strip trailing slashes and a trailing `/api/v2` or `/api/v3`.
///
/// `https://acme-api.example.com/api/v3/` → `https://acme-api.example.com`
pub fn normalize_base_url(raw: &str) -> Result<Url, Error> {
    let mut base = raw.trim().trim_end_matches('/');
    for suffix in ["/api/v3", "/api/v2"] {
        if let Some(stripped) = base.strip_suffix(suffix) {
            base = stripped;
        }
    }
    Ok(Url::parse(base)?)
}

/// The UI origin for an API host: `acme-api.example.com` → `acme.example.com`.
pub fn origin_for(base: &Url) -> String {
    let root = base.as_str().trim_end_matches('/');
    root.replacen("-api.", ".", 1)
}
