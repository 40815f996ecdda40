//! HTTP client implementation

use std::time::Duration;

use reqwest::{header, Client, Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, error};
use url::Url;

use crate::errors::DeployError;
use crate::http::endpoint::ApiEndpoint;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the Machines API
pub struct HttpClient {
    client: Client,
    token: SecretString,
    endpoint: ApiEndpoint,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(token: SecretString, endpoint: ApiEndpoint) -> Result<Self, DeployError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            token,
            endpoint,
        })
    }

    /// Get the endpoint resolver
    pub fn endpoint(&self) -> &ApiEndpoint {
        &self.endpoint
    }

    /// Build an absolute URL for an API path
    pub async fn url(&self, path: &str) -> Result<Url, DeployError> {
        let host = self.endpoint.resolve().await?;
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("http://{}", host)
        };

        Url::parse(&format!("{}{}", base.trim_end_matches('/'), path))
            .map_err(|e| DeployError::ConfigError(format!("Invalid API endpoint {}: {}", base, e)))
    }

    /// Start an authenticated request
    pub async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, DeployError> {
        let url = self.url(path).await?;
        debug!("{} {}", method, url);

        Ok(self.client.request(method, url).header(
            header::AUTHORIZATION,
            format!("Bearer {}", self.token.expose_secret()),
        ))
    }

    /// Make a GET request and decode the JSON body
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, DeployError> {
        let response = self.request(Method::GET, path).await?.send().await?;
        let response = Self::ensure_success("GET", response).await?;
        Ok(response.json().await?)
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> Result<(), DeployError> {
        let response = self.request(Method::DELETE, path).await?.send().await?;
        Self::ensure_success("DELETE", response).await?;
        Ok(())
    }

    /// Turn a non-2xx response into an error carrying its body
    pub async fn ensure_success(method: &str, response: Response) -> Result<Response, DeployError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!("HTTP {} failed: {} - {}", method, status, body);
        Err(DeployError::ApiError(format!("{}: {}", status, body)))
    }
}
