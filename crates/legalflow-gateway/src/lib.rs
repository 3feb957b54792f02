//! LegalFlow Gateway: Remote Data Access for LegalFlow Ops
//!
//! This crate owns all I/O with the hosted database platform. The platform
//! exposes row endpoints per table and named remote procedures; both are
//! reached through the [`DataGateway`] trait.
//!
//! ## Layer 0 - Data Access
//!
//! Focus: a stable wire contract (table, column and RPC names) and
//! faithful error reporting. No retry, no caching.
//!
//! ## Key Components
//!
//! - `RestGateway`: HTTP client for the row API
//! - `MemoryGateway`: in-memory fake with injectable failures
//! - `GatewayConfig`: connection settings read from the environment

mod config;
mod error;
pub mod fakes;
pub mod gateway_traits;
mod rest;

pub use config::{GatewayConfig, DEFAULT_HTTP_TIMEOUT};
pub use error::GatewayError;
pub use fakes::{GatewayCall, MemoryGateway};
pub use gateway_traits::{
    DataGateway, Filter, GatewayResult, Order, Row, RpcRef, SelectQuery, TableRef,
    DEFAULT_SCHEMA,
};
pub use rest::RestGateway;
