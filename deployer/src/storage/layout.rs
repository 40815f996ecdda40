//! Project layout

use std::path::PathBuf;

use crate::filesys::file::File;

/// Locations of the files a deploy reads or rewrites, relative to the project root
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    /// Application root directory
    pub root_dir: PathBuf,
}

impl ProjectLayout {
    /// Create a new project layout
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Platform app configuration (`fly.toml`)
    pub fn fly_toml(&self) -> File {
        File::new(self.root_dir.join("fly.toml"))
    }

    /// Deployer settings
    pub fn settings_file(&self) -> File {
        File::new(self.root_dir.join("config").join("fly-deploy.json"))
    }

    /// Rails database adapter declaration
    pub fn database_yml(&self) -> File {
        File::new(self.root_dir.join("config").join("database.yml"))
    }

    /// Rails action cable adapter declaration
    pub fn cable_yml(&self) -> File {
        File::new(self.root_dir.join("config").join("cable.yml"))
    }

    /// Terraform configuration
    pub fn main_tf(&self) -> File {
        File::new(self.root_dir.join("main.tf"))
    }
}

impl Default for ProjectLayout {
    fn default() -> Self {
        Self::new(".")
    }
}
