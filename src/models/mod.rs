//! Data models for mockwire
//!
//! Shared by the background context, the mediating bridge and the page
//! context. Everything that crosses a context boundary is serde-serializable.

pub mod envelope;
pub mod mock_record;
pub mod request;
pub mod rule;

pub use envelope::*;
pub use mock_record::*;
pub use request::*;
pub use rule::*;
