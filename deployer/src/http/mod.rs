//! Machines API over HTTP

pub mod client;
pub mod endpoint;
pub mod machines;
