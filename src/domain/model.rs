use serde::{Deserialize, Serialize};

/// A concrete model an agent can run, enriched with tier/alias information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    /// Family keyword found in the id ("opus", "sonnet", ...)
    pub tier: Option<String>,
    /// "major.minor" derived from the id, "0" when none
    pub version: String,
    /// Set on the newest model of its tier only
    pub alias: Option<String>,
    pub is_legacy: bool,
}

impl ModelInfo {
    /// A bare entry; tier, version and alias are filled in by enrichment
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tier: None,
            version: "0".to_string(),
            alias: None,
            is_legacy: false,
        }
    }
}
