//! Shared re-exports and small primitives used across the planning and
//! execution crates, mirroring the role a foundation crate plays in a
//! multi-crate workspace: one place to pin the JSON, error, and id
//! conventions every other crate builds on.

pub use anyhow::{anyhow, bail, Error, Result};
pub use async_trait::async_trait;
pub use cuid2::create_id;

pub mod json {
    pub use serde_json::{from_str, from_value, json, to_string, to_string_pretty, to_value, Map, Value};
}

pub mod sync {
    pub use dashmap::{DashMap, DashSet};
    pub use tokio::sync::{mpsc, Mutex, RwLock};
}

/// Timestamp helper, kept in one place so call sites don't each pick a format.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_rfc3339_parses_back() {
        let s = now_rfc3339();
        assert!(chrono::DateTime::parse_from_rfc3339(&s).is_ok());
    }
}
