//! # mockwire
//!
//! Request interception for a monitored page. Outgoing requests are checked
//! against user-defined rules and either pass through, get redirected, or are
//! answered locally from a stored mock record.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐  JSON frames  ┌──────────────────┐   messages   ┌──────────────────┐
//! │        Page          │──────────────▶│ Mediating bridge │─────────────▶│    Background    │
//! │ fetch / EventRequest │◀──────────────│  record lookup   │◀─────────────│ RuleStore (lock) │
//! │  interceptor chain   │               └────────┬─────────┘              └────────┬─────────┘
//! └──────────┬───────────┘                        │                                 │
//!            │ pass-through                ┌──────┴──────┐                   ┌──────┴──────┐
//!            ▼                             │ records.db  │                   │  rules.db   │
//!        network                           └─────────────┘                   └─────────────┘
//! ```
//!
//! Every failure on the check path (timeout, closed link, lookup error)
//! falls back to the real network.

pub mod api;
pub mod background;
pub mod bridge;
pub mod models;
pub mod page;
pub mod rules;
pub mod storage;
pub mod synthesizer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use api::{MockRuntime, RuntimeConfig};
pub use page::Page;
