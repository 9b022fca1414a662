//! Actor roles carried by magic-link tokens

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::GateError;

/// Role of an external actor acting on a passport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    /// Battery manufacturer - may drive any valid edge
    Manufacturer,
    /// Courier moving the unit to its install site
    Logistics,
    /// Field technician installing or re-installing the unit
    Technician,
    /// Recycling facility
    Recycler,
    /// End customer holding the installed unit
    Customer,
}

impl ActorRole {
    pub const ALL: [ActorRole; 5] = [
        ActorRole::Manufacturer,
        ActorRole::Logistics,
        ActorRole::Technician,
        ActorRole::Recycler,
        ActorRole::Customer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Manufacturer => "MANUFACTURER",
            ActorRole::Logistics => "LOGISTICS",
            ActorRole::Technician => "TECHNICIAN",
            ActorRole::Recycler => "RECYCLER",
            ActorRole::Customer => "CUSTOMER",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorRole {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        ActorRole::ALL
            .into_iter()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| GateError::Validation(format!("unknown role: {}", s.trim())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roles() {
        assert_eq!("LOGISTICS".parse::<ActorRole>().unwrap(), ActorRole::Logistics);
        assert_eq!(" recycler ".parse::<ActorRole>().unwrap(), ActorRole::Recycler);
        assert!("ADMIN".parse::<ActorRole>().is_err());
        assert!("".parse::<ActorRole>().is_err());
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&ActorRole::Technician).unwrap();
        assert_eq!(json, "\"TECHNICIAN\"");

        let role: ActorRole = serde_json::from_str("\"CUSTOMER\"").unwrap();
        assert_eq!(role, ActorRole::Customer);
    }

    #[test]
    fn test_display_matches_serde() {
        for role in ActorRole::ALL {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json.trim_matches('"'), role.to_string());
        }
    }
}
