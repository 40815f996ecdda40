//! Deploy context tests

use fly_deployer::app::state::{DeployContext, DEFAULT_ORG};
use fly_deployer::deploy::database::ProjectInspection;
use fly_deployer::errors::DeployError;
use fly_deployer::filesys::file::File;
use fly_deployer::storage::layout::ProjectLayout;
use fly_deployer::storage::settings::Settings;

use crate::fakes::FakeCli;

async fn project(fly_toml: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    File::new(dir.path().join("fly.toml"))
        .write_string(fly_toml)
        .await
        .unwrap();
    dir
}

#[tokio::test]
async fn test_app_name_from_fly_toml() {
    let dir = project("app = \"toml-app\"\nprimary_region = \"ord\"\n").await;
    let cli = FakeCli::default();

    let ctx = DeployContext::load(None, ProjectLayout::new(dir.path()), Settings::default(), &cli)
        .await
        .unwrap();

    assert_eq!(ctx.app, "toml-app");
    assert_eq!(ctx.org, "acme");
    assert_eq!(cli.calls(), vec!["apps list toml-app".to_string()]);
}

#[tokio::test]
async fn test_explicit_app_wins() {
    let dir = project("app = \"toml-app\"\n").await;
    let cli = FakeCli::default();

    let ctx = DeployContext::load(
        Some("cli-app".to_string()),
        ProjectLayout::new(dir.path()),
        Settings::default(),
        &cli,
    )
    .await
    .unwrap();
    assert_eq!(ctx.app, "cli-app");
}

#[tokio::test]
async fn test_org_lookup_failure_falls_back() {
    let dir = project("app = \"toml-app\"\n").await;
    let cli = FakeCli {
        org: None,
        ..Default::default()
    };

    let ctx = DeployContext::load(None, ProjectLayout::new(dir.path()), Settings::default(), &cli)
        .await
        .unwrap();
    assert_eq!(ctx.org, DEFAULT_ORG);
}

#[tokio::test]
async fn test_missing_app_name() {
    let dir = project("primary_region = \"ord\"\n").await;
    let cli = FakeCli::default();

    let result = DeployContext::load(None, ProjectLayout::new(dir.path()), Settings::default(), &cli).await;
    assert!(matches!(result, Err(DeployError::ConfigError(_))));
    assert!(cli.calls().is_empty());
}

#[tokio::test]
async fn test_project_inspection() {
    let dir = project("app = \"toml-app\"\n").await;
    let layout = ProjectLayout::new(dir.path());
    layout
        .database_yml()
        .write_string("production:\n  adapter: sqlite3\n  database: storage/production.sqlite3\n")
        .await
        .unwrap();
    layout
        .cable_yml()
        .write_string("production:\n  adapter: redis\n  url: redis://localhost:6379/1\n")
        .await
        .unwrap();

    let inspection = ProjectInspection::load(&layout).await;
    assert_eq!(inspection.database_adapter.as_deref(), Some("sqlite3"));
    assert_eq!(inspection.cable_adapter.as_deref(), Some("redis"));

    let empty = ProjectInspection::load(&ProjectLayout::new(dir.path().join("missing"))).await;
    assert_eq!(empty, ProjectInspection::default());
}
