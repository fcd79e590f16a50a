//! MQTT topic construction and parsing for the `cab/<addr>/<action>` namespace
//!
//! Also validates the gateway node name used as the MQTT client identifier.

use crate::radio::RadioAddress;
use thiserror::Error;

/// Default topic prefix
pub const DEFAULT_PREFIX: &str = "cab";

/// Topic namespace rooted at a configurable prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScheme {
    prefix: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl TopicScheme {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build `<prefix>/<addr>/<action>`
    pub fn build(&self, addr: RadioAddress, action: &str) -> String {
        format!("{}/{}/{}", self.prefix, addr, action)
    }

    /// Subscription filter covering the whole namespace
    pub fn wildcard(&self) -> String {
        format!("{}/#", self.prefix)
    }

    /// Split a topic into its address and action suffix.
    ///
    /// Returns `None` for topics outside the namespace, a non-numeric address,
    /// or an empty action.
    pub fn parse<'a>(&self, topic: &'a str) -> Option<(RadioAddress, &'a str)> {
        let rest = topic.strip_prefix(self.prefix.as_str())?.strip_prefix('/')?;
        let (addr, action) = rest.split_once('/')?;
        if action.is_empty() {
            return None;
        }
        let addr = addr.parse::<RadioAddress>().ok()?;
        Some((addr, action))
    }
}

/// Validate the gateway node name (`[a-zA-Z0-9._-]+`)
pub fn validate_node_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyNodeName);
    }

    for ch in name.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '.' && ch != '_' && ch != '-' {
            return Err(ValidationError::InvalidNodeNameChar(ch));
        }
    }

    Ok(())
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Node name cannot be empty")]
    EmptyNodeName,
    #[error("Node name contains invalid character: '{0}'")]
    InvalidNodeNameChar(char),
}
