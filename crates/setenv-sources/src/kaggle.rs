//! Kaggle user secrets.
//!
//! Inside a Kaggle kernel the runtime exposes a JWT in
//! `KAGGLE_USER_SECRETS_TOKEN`; secrets are fetched by label from the Kaggle
//! web API with that token.

use std::{env, time::Duration};

use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use setenv_core::source::{SecretSource, SourceError};
use tracing::{instrument, trace};

pub const DEFAULT_URL_BASE: &str = "https://www.kaggle.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const GET_SECRET_ENDPOINT: &str = "/requests/GetUserSecretByLabelRequest";
const KAGGLE_AUTH_HEADER: &str = "X-Kaggle-Authorization";
const KAGGLE_PROXY_HEADER: &str = "X-Kaggle-Proxy-Data";

/// Connection settings for the Kaggle secrets endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KaggleSettings {
    pub url_base: String,
    /// Kernel JWT (never logged).
    pub jwt_token: String,
    pub iap_token: Option<String>,
    pub proxy_token: Option<String>,
    pub timeout: Duration,
}

impl KaggleSettings {
    pub fn new(url_base: impl Into<String>, jwt_token: impl Into<String>) -> Self {
        Self {
            url_base: url_base.into(),
            jwt_token: jwt_token.into(),
            iap_token: None,
            proxy_token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Read the kernel environment; `None` outside a Kaggle kernel.
    pub fn from_env() -> Option<Self> {
        let jwt_token = non_empty_var("KAGGLE_USER_SECRETS_TOKEN")?;
        let url_base =
            non_empty_var("KAGGLE_URL_BASE").unwrap_or_else(|| DEFAULT_URL_BASE.to_string());
        Some(Self {
            iap_token: non_empty_var("KAGGLE_IAP_TOKEN"),
            proxy_token: non_empty_var("KAGGLE_DATA_PROXY_TOKEN"),
            ..Self::new(url_base, jwt_token)
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}{}",
            self.url_base.trim_end_matches('/'),
            GET_SECRET_ENDPOINT
        )
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

#[derive(Debug, Serialize)]
struct SecretRequest<'a> {
    #[serde(rename = "Label")]
    label: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretResponse {
    #[serde(default)]
    was_successful: bool,
    result: Option<SecretResult>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SecretResult {
    secret: Option<String>,
}

/// Hosted notebook store B.
#[derive(Debug, Clone, Default)]
pub struct KaggleSecrets {
    settings: Option<KaggleSettings>,
}

impl KaggleSecrets {
    pub fn new(settings: KaggleSettings) -> Self {
        Self {
            settings: Some(settings),
        }
    }

    /// Store configured from the kernel environment, unavailable outside Kaggle.
    pub fn from_env() -> Self {
        Self {
            settings: KaggleSettings::from_env(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if let Some(settings) = self.settings.as_mut() {
            settings.timeout = timeout;
        }
        self
    }

    pub fn is_available(&self) -> bool {
        self.settings.is_some()
    }

    /// The blocking client must not be built or dropped on an async worker; the
    /// request runs on its own scoped thread.
    fn request_secret(
        &self,
        settings: &KaggleSettings,
        key: &str,
    ) -> Result<SecretResponse, SourceError> {
        std::thread::scope(|scope| {
            scope
                .spawn(|| send_request(settings, key))
                .join()
                .unwrap_or_else(|_| {
                    Err(SourceError::backend("kaggle request thread panicked"))
                })
        })
    }
}

fn send_request(settings: &KaggleSettings, key: &str) -> Result<SecretResponse, SourceError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(settings.timeout)
        .build()
        .map_err(SourceError::backend)?;

    let mut request = client
        .post(settings.endpoint())
        .header(KAGGLE_AUTH_HEADER, format!("Bearer {}", settings.jwt_token))
        .json(&SecretRequest { label: key });
    if let Some(iap) = &settings.iap_token {
        request = request.header(AUTHORIZATION, format!("Bearer {iap}"));
    }
    if let Some(proxy) = &settings.proxy_token {
        request = request.header(KAGGLE_PROXY_HEADER, proxy.as_str());
    }

    request
        .send()
        .and_then(|resp| resp.error_for_status())
        .and_then(|resp| resp.json::<SecretResponse>())
        .map_err(SourceError::backend)
}

fn secret_from_response(response: SecretResponse) -> Result<String, SourceError> {
    if !response.was_successful {
        return Err(SourceError::backend(format!(
            "unsuccessful response: {:?}",
            response.errors
        )));
    }
    response
        .result
        .ok_or_else(|| SourceError::backend("response has no result"))?
        .secret
        .ok_or_else(|| SourceError::backend("response has no secret"))
}

impl SecretSource for KaggleSecrets {
    fn name(&self) -> &'static str {
        "kaggle"
    }

    #[instrument(level = "trace", skip(self))]
    fn fetch(&self, key: &str) -> Result<String, SourceError> {
        let Some(settings) = &self.settings else {
            trace!("not in kaggle");
            return Err(SourceError::Unavailable { provider: "kaggle" });
        };
        let response = self.request_secret(settings, key)?;
        secret_from_response(response)
    }
}
