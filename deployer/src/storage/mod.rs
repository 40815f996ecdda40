//! Project files and settings

pub mod layout;
pub mod settings;
