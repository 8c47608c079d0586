//! Domain model types returned by the certificate store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata about a stored value, without its payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyInfo {
    pub key: String,
    pub size: i64,
    pub modified: DateTime<Utc>,
    /// Keys are flat identifiers, so every key is terminal.
    pub is_terminal: bool,
}

/// How a listing request walks the keyspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ListMode {
    /// Every key starting with the prefix
    #[default]
    FlatPrefix,
    /// Descend into key "directories". Not available for a flat keyspace.
    Recursive,
}

impl From<bool> for ListMode {
    fn from(recursive: bool) -> Self {
        if recursive {
            ListMode::Recursive
        } else {
            ListMode::FlatPrefix
        }
    }
}

impl std::fmt::Display for ListMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListMode::FlatPrefix => write!(f, "flat-prefix"),
            ListMode::Recursive => write!(f, "recursive"),
        }
    }
}

/// Key listing request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListRequest {
    pub prefix: String,
    pub mode: ListMode,
}

impl ListRequest {
    pub fn flat(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            mode: ListMode::FlatPrefix,
        }
    }

    pub fn new(prefix: impl Into<String>, recursive: bool) -> Self {
        Self {
            prefix: prefix.into(),
            mode: recursive.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_mode_from_flag() {
        assert_eq!(ListMode::from(false), ListMode::FlatPrefix);
        assert_eq!(ListMode::from(true), ListMode::Recursive);
        assert_eq!(ListRequest::new("tes", true).mode, ListMode::Recursive);
        assert_eq!(ListRequest::flat("tes").prefix, "tes");
    }

    #[test]
    fn test_key_info_serializes_camel_case() {
        let info = KeyInfo {
            key: "cert/a".to_string(),
            size: 3,
            modified: DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default(),
            is_terminal: true,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["isTerminal"], true);
        assert_eq!(json["size"], 3);
    }
}
