//! Deploy orchestration

pub mod config;
pub mod database;
pub mod fsm;
pub mod lifecycle;
pub mod release;
pub mod terraform;
