//! Command-line options

use std::collections::HashMap;

use crate::errors::DeployError;
use crate::storage::layout::ProjectLayout;

/// What the invocation should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Release, then create and start the app machine
    Deploy { image: String },

    /// Patch `main.tf`, release, then run `terraform apply`
    Terraform { image: String },

    /// Allocate public IP addresses. Neither flag set means both.
    AllocateIps { v4: bool, v6: bool },

    /// Print version information
    Version,
}

/// Options for a single invocation
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub command: Command,

    /// App name; read from `fly.toml` when absent
    pub app: Option<String>,

    pub layout: ProjectLayout,
}

/// Split arguments into the subcommand (first bare word) and `--key=value` flags.
/// Standalone `--flag` arguments are recorded as `"true"`.
pub fn parse_args<I, S>(args: I) -> (Option<String>, HashMap<String, String>)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut subcommand = None;
    let mut flags = HashMap::new();

    for arg in args {
        let arg = arg.as_ref();
        if let Some((key, value)) = arg.split_once('=') {
            let clean_key = key.trim_start_matches('-');
            flags.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            let clean_key = arg.trim_start_matches('-');
            flags.insert(clean_key.to_string(), "true".to_string());
        } else if subcommand.is_none() {
            subcommand = Some(arg.to_string());
        }
    }

    (subcommand, flags)
}

impl RunOptions {
    /// Build options from the process arguments, program name excluded
    pub fn from_args<I, S>(args: I) -> Result<Self, DeployError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (subcommand, flags) = parse_args(args);

        let image = || {
            flags
                .get("image")
                .filter(|image| !image.trim().is_empty())
                .cloned()
                .ok_or_else(|| DeployError::ConfigError("Missing --image=<ref>".to_string()))
        };
        let flag = |name: &str| flags.get(name).is_some_and(|v| v == "true");

        let command = if flags.contains_key("version") {
            Command::Version
        } else {
            match subcommand.as_deref() {
                Some("deploy") => Command::Deploy { image: image()? },
                Some("terraform") => Command::Terraform { image: image()? },
                Some("ips") => Command::AllocateIps {
                    v4: flag("v4"),
                    v6: flag("v6"),
                },
                Some(other) => {
                    return Err(DeployError::ConfigError(format!("Unknown command: {}", other)));
                }
                None => {
                    return Err(DeployError::ConfigError(
                        "Usage: fly-deployer <deploy|terraform|ips> [--image=<ref>] [--app=<name>]"
                            .to_string(),
                    ));
                }
            }
        };

        let layout = flags
            .get("root")
            .map(ProjectLayout::new)
            .unwrap_or_default();

        Ok(Self {
            command,
            app: flags.get("app").filter(|a| !a.is_empty()).cloned(),
            layout,
        })
    }
}
