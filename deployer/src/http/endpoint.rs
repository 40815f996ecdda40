//! Machines API endpoint discovery

use std::process::Stdio;
use std::time::Duration;

use tokio::net::{lookup_host, TcpStream};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use crate::errors::DeployError;
use crate::platform::flyctl::say_status;

/// API host reachable from inside the private network
pub const INTERNAL_API_HOST: &str = "_api.internal:4280";

/// Local address served by `flyctl machines api-proxy`
pub const PROXY_API_HOST: &str = "127.0.0.1:4280";

const PROXY_START_ATTEMPTS: u32 = 50;
const PROXY_START_INTERVAL: Duration = Duration::from_millis(100);

/// Resolves the Machines API host once and keeps any proxy it started alive
#[derive(Debug)]
pub struct ApiEndpoint {
    configured: Option<String>,
    flyctl: String,
    resolved: OnceCell<String>,
    proxy: Mutex<Option<Child>>,
}

impl ApiEndpoint {
    /// `configured` wins over discovery when set
    pub fn new(configured: Option<String>, flyctl: impl Into<String>) -> Self {
        Self {
            configured,
            flyctl: flyctl.into(),
            resolved: OnceCell::new(),
            proxy: Mutex::new(None),
        }
    }

    /// Host (and port) of the API, discovering it on first use
    pub async fn resolve(&self) -> Result<String, DeployError> {
        self.resolved
            .get_or_try_init(|| self.discover())
            .await
            .cloned()
    }

    async fn discover(&self) -> Result<String, DeployError> {
        if let Some(host) = &self.configured {
            debug!("Using configured Machines API endpoint {}", host);
            return Ok(host.clone());
        }

        let internal = lookup_host(INTERNAL_API_HOST)
            .await
            .map(|mut addrs| addrs.next().is_some())
            .unwrap_or(false);
        if internal {
            info!("Using Machines API at {}", INTERNAL_API_HOST);
            return Ok(INTERNAL_API_HOST.to_string());
        }

        self.start_proxy().await?;
        Ok(PROXY_API_HOST.to_string())
    }

    async fn start_proxy(&self) -> Result<(), DeployError> {
        if TcpStream::connect(PROXY_API_HOST).await.is_ok() {
            debug!("Machines API proxy already listening on {}", PROXY_API_HOST);
            return Ok(());
        }

        say_status("run", &format!("{} machines api-proxy", self.flyctl));
        let child = Command::new(&self.flyctl)
            .args(["machines", "api-proxy"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DeployError::CommandError(format!("Failed to start api proxy: {}", e)))?;
        *self.proxy.lock().await = Some(child);

        for _ in 0..PROXY_START_ATTEMPTS {
            if TcpStream::connect(PROXY_API_HOST).await.is_ok() {
                info!("Machines API proxy listening on {}", PROXY_API_HOST);
                return Ok(());
            }
            tokio::time::sleep(PROXY_START_INTERVAL).await;
        }

        Err(DeployError::ApiError(format!(
            "Machines API proxy did not start listening on {}",
            PROXY_API_HOST
        )))
    }
}
