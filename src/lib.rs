//! Callscope - request-scoped call and line trace collector
//!
//! This library collects call and line events emitted by a host runtime's
//! instrumentation hooks, keeps them per request with bounded retention,
//! groups calls by the type that executed them, and exports the result as
//! JSON for offline inspection.

pub mod capture;
pub mod cli;
pub mod collector;
pub mod config;
pub mod error;
pub mod event;
pub mod export;
pub mod filter;
pub mod owner;
pub mod report;
pub mod session;

pub use collector::{EventCollector, Overview, OverviewEntry};
pub use error::{CollectorError, Result};
pub use owner::CallSiteInfo;
pub use session::{RequestInfo, SessionController};
