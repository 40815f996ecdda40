//! Fly Deployer Library
//!
//! Release and deploy orchestration for Rails apps on Fly Machines.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod platform;
pub mod storage;
pub mod utils;
