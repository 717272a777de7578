use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A storefront backed by one helper tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreId {
    /// Epic Games Store via `legendary`.
    Epic,
    /// GOG via `gogdl`.
    Gog,
    /// Amazon Games via `nile`.
    Amazon,
    /// Steam, read from the local installation.
    Steam,
}

impl StoreId {
    /// Returns all stores in registry order.
    pub fn all() -> &'static [StoreId] {
        &[StoreId::Epic, StoreId::Gog, StoreId::Amazon, StoreId::Steam]
    }

    /// Stable identifier used in game ids and the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreId::Epic => "epic",
            StoreId::Gog => "gog",
            StoreId::Amazon => "amazon",
            StoreId::Steam => "steam",
        }
    }

    /// Human-readable storefront name.
    pub fn display_name(&self) -> &'static str {
        match self {
            StoreId::Epic => "Epic Games",
            StoreId::Gog => "GOG",
            StoreId::Amazon => "Amazon Games",
            StoreId::Steam => "Steam",
        }
    }

    /// Name of the helper tool that fronts this store.
    pub fn helper_tool(&self) -> &'static str {
        match self {
            StoreId::Epic => "legendary",
            StoreId::Gog => "gogdl",
            StoreId::Amazon => "nile",
            StoreId::Steam => "steam",
        }
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown store: {0}")]
pub struct ParseStoreIdError(pub String);

impl FromStr for StoreId {
    type Err = ParseStoreIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "epic" => Ok(StoreId::Epic),
            "gog" => Ok(StoreId::Gog),
            "amazon" => Ok(StoreId::Amazon),
            "steam" => Ok(StoreId::Steam),
            _ => Err(ParseStoreIdError(s.to_string())),
        }
    }
}

/// Availability and authentication of one store, computed on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    pub id: StoreId,
    pub name: String,
    pub available: bool,
    pub authenticated: bool,
    pub helper_tool: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("GOG".parse::<StoreId>().unwrap(), StoreId::Gog);
        assert_eq!("Epic".parse::<StoreId>().unwrap(), StoreId::Epic);
        assert!("origin".parse::<StoreId>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&StoreId::Amazon).unwrap();
        assert_eq!(json, "\"amazon\"");
    }

    #[test]
    fn status_uses_camel_case() {
        let status = StoreStatus {
            id: StoreId::Steam,
            name: "Steam".into(),
            available: true,
            authenticated: false,
            helper_tool: "steam".into(),
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["helperTool"], "steam");
        assert_eq!(value["id"], "steam");
    }
}
