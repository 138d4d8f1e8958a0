//! Author identities, populated once at config load.

use serde::Deserialize;

/// One configured author. Immutable after config load; looked up by dispatch
/// code during parsing and by account at publish time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Author {
    /// Account id at the publishing service. Unique across the config.
    pub account: String,

    /// Dispatch code selecting this author in the script. Exactly one author
    /// has the empty code and serves as the default.
    #[serde(default)]
    pub code: String,

    /// Display color for this author's entries.
    #[serde(default = "default_color")]
    pub color: String,

    /// Bearer token for the publishing service.
    #[serde(default)]
    pub token: Option<String>,
}

fn default_color() -> String {
    "white".to_string()
}
