//! Rule matching and the rule store owned by the background context.

pub mod matcher;
pub mod store;

pub use matcher::{find_matching_rule, is_valid_pattern};
pub use store::{RuleStore, RuleStoreClosed};
