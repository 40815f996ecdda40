//! `flyctl` command adapter

use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use colored::Colorize;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::DeployError;
use crate::platform::{IpVersion, PlatformCli, PostgresRequest};

static CONNECTION_STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"postgres://\S+").expect("valid connection string pattern"));

/// Print a status line the way Rails generators do
pub fn say_status(status: &str, message: &str) {
    println!("{:>12}  {}", status.green().bold(), message);
}

/// Shells out to the Fly CLI
#[derive(Debug, Clone)]
pub struct FlyctlCli {
    program: String,
}

impl FlyctlCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run and capture stdout; a non-zero exit is an error
    async fn capture(&self, args: &[&str]) -> Result<String, DeployError> {
        debug!("{} {}", self.program, args.join(" "));
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                DeployError::CommandError(format!("Failed to run {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeployError::CommandError(format!(
                "{} {} failed: {}",
                self.program,
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run with inherited stdio, announcing `shown` instead of the real arguments
    async fn run_shown(&self, args: &[&str], shown: &str) -> Result<(), DeployError> {
        say_status("run", &format!("{} {}", self.program, shown));
        let status = Command::new(&self.program)
            .args(args)
            .status()
            .await
            .map_err(|e| {
                DeployError::CommandError(format!("Failed to run {}: {}", self.program, e))
            })?;

        if !status.success() {
            return Err(DeployError::CommandError(format!(
                "{} {} exited with {}",
                self.program, shown, status
            )));
        }
        Ok(())
    }

    async fn run(&self, args: &[&str]) -> Result<(), DeployError> {
        self.run_shown(args, &args.join(" ")).await
    }

    /// Run while echoing output, returning stdout and stderr combined
    async fn tee(&self, args: &[&str]) -> Result<String, DeployError> {
        say_status("run", &format!("{} {}", self.program, args.join(" ")));
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                DeployError::CommandError(format!("Failed to run {}: {}", self.program, e))
            })?;

        let (stdout, stderr) = tokio::join!(
            echo_lines(child.stdout.take(), false),
            echo_lines(child.stderr.take(), true)
        );
        let status = child.wait().await?;
        if !status.success() {
            warn!("{} {} exited with {}", self.program, args.join(" "), status);
        }

        Ok(stdout? + &stderr?)
    }
}

async fn echo_lines<R: AsyncRead + Unpin>(
    reader: Option<R>,
    to_stderr: bool,
) -> Result<String, DeployError> {
    let mut captured = String::new();
    let Some(reader) = reader else {
        return Ok(captured);
    };

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if to_stderr {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
        captured.push_str(&line);
        captured.push('\n');
    }
    Ok(captured)
}

fn str_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| value.get(*k).and_then(Value::as_str))
}

/// Region codes from `flyctl regions list --json`
pub fn parse_regions(json: &str) -> Result<Vec<String>, DeployError> {
    let value: Value = serde_json::from_str(json)?;
    let regions = match &value {
        Value::Array(items) => items.as_slice(),
        other => other
            .get("Regions")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
    };

    Ok(regions
        .iter()
        .filter_map(|r| str_field(r, &["Code", "code"]))
        .map(str::to_string)
        .collect())
}

/// Names from a JSON listing such as `secrets list` or `volumes list`
pub fn parse_names(json: &str) -> Result<Vec<String>, DeployError> {
    let value: Value = serde_json::from_str(json)?;
    Ok(value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| str_field(item, &["Name", "name", " Name"]))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default())
}

/// Organization slug of `app` from `flyctl apps list --json`
pub fn parse_app_organization(json: &str, app: &str) -> Result<Option<String>, DeployError> {
    let value: Value = serde_json::from_str(json)?;
    let Some(apps) = value.as_array() else {
        return Ok(None);
    };

    let org = apps
        .iter()
        .find(|a| str_field(a, &["ID", "Name", "name"]) == Some(app))
        .and_then(|a| a.get("Organization"))
        .and_then(|org| match org {
            Value::String(slug) => Some(slug.clone()),
            other => str_field(other, &["Slug", "slug"]).map(str::to_string),
        });
    Ok(org)
}

/// First `postgres://` URL in command output
pub fn extract_connection_string(output: &str) -> Option<String> {
    CONNECTION_STRING
        .find(output)
        .map(|m| m.as_str().to_string())
}

#[async_trait]
impl PlatformCli for FlyctlCli {
    async fn list_regions(&self) -> Result<Vec<String>, DeployError> {
        let output = self.capture(&["regions", "list", "--json"]).await?;
        parse_regions(&output)
    }

    async fn list_secrets(&self, app: &str) -> Result<Vec<String>, DeployError> {
        let output = self
            .capture(&["secrets", "list", "--app", app, "--json"])
            .await?;
        parse_names(&output)
    }

    async fn list_volumes(&self, app: &str) -> Result<Vec<String>, DeployError> {
        let output = self
            .capture(&["volumes", "list", "--app", app, "--json"])
            .await?;
        parse_names(&output)
    }

    async fn create_volume(
        &self,
        app: &str,
        name: &str,
        region: &str,
        size_gb: u32,
    ) -> Result<(), DeployError> {
        let size = size_gb.to_string();
        self.run(&[
            "volumes", "create", name, "--app", app, "--region", region, "--size", &size,
        ])
        .await
    }

    async fn create_postgres(&self, request: &PostgresRequest) -> Result<Option<String>, DeployError> {
        let volume_size = request.volume_size_gb.to_string();
        let cluster_size = request.cluster_size.to_string();
        let output = self
            .tee(&[
                "postgres",
                "create",
                "--name",
                &request.name,
                "--org",
                &request.org,
                "--region",
                &request.region,
                "--vm-size",
                &request.vm_size,
                "--volume-size",
                &volume_size,
                "--initial-cluster-size",
                &cluster_size,
            ])
            .await?;
        Ok(extract_connection_string(&output))
    }

    async fn set_secret(&self, app: &str, name: &str, value: &SecretString) -> Result<(), DeployError> {
        let assignment = format!("{}={}", name, value.expose_secret());
        self.run_shown(
            &["secrets", "set", &assignment, "--app", app],
            &format!("secrets set {}=******** --app {}", name, app),
        )
        .await
    }

    async fn allocate_ip(&self, app: &str, version: IpVersion) -> Result<(), DeployError> {
        let subcommand = match version {
            IpVersion::V4 => "allocate-v4",
            IpVersion::V6 => "allocate-v6",
        };
        self.run(&["ips", subcommand, "--app", app]).await
    }

    async fn auth_token(&self) -> Result<SecretString, DeployError> {
        let output = self.capture(&["auth", "token"]).await?;
        let token = output.trim();
        if token.is_empty() {
            return Err(DeployError::CommandError(
                "flyctl auth token returned nothing; run 'flyctl auth login'".to_string(),
            ));
        }
        Ok(SecretString::from(token.to_string()))
    }

    async fn app_organization(&self, app: &str) -> Result<Option<String>, DeployError> {
        let output = self.capture(&["apps", "list", "--json"]).await?;
        parse_app_organization(&output, app)
    }
}
