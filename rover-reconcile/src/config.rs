use serde::Deserialize;

pub const DEFAULT_ID_ATTRIBUTE: &str = "data-rover-id";
pub const DEFAULT_CHECKSUM_ATTRIBUTE: &str = "data-rover-checksum";

/// Per-context settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Attribute holding a node's identifier.
    pub id_attribute: String,
    /// Attribute on a server-rendered root holding the markup checksum.
    pub checksum_attribute: String,
    /// Record a diagnostic when a mount replaces content the reconciler did
    /// not write.
    pub report_foreign_markup: bool,
}

impl RenderConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            id_attribute: DEFAULT_ID_ATTRIBUTE.to_string(),
            checksum_attribute: DEFAULT_CHECKSUM_ATTRIBUTE.to_string(),
            report_foreign_markup: true,
        }
    }
}
