use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntryView {
    pub character_name: String,
    pub timestamp: i64,
}

impl HistoryEntryView {
    pub fn at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

/// The three visible slots; `None` renders as an empty slot.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct SlotView {
    pub left: Option<String>,
    pub center: Option<String>,
    pub right: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerView {
    pub id: String,
    pub display_name: String,
    pub color: String,
    pub selection: Option<String>,
    pub target: Option<String>,
    pub spinning: bool,
    pub window: SlotView,
    pub history: Vec<HistoryEntryView>,
    /// No character can be handed to this player by a single spin.
    pub exhausted: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionView {
    pub players: Vec<PlayerView>,
    pub available: Vec<String>,
    pub icons: BTreeMap<String, String>,
}

impl SessionView {
    pub fn player(&self, id: &str) -> Option<&PlayerView> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn any_spinning(&self) -> bool {
        self.players.iter().any(|p| p.spinning)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ActionResponse {
    pub accepted: bool,
    pub message: Option<String>,
    pub session: SessionView,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RosterResponse {
    pub characters: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SetDefaultRequest {
    pub character_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorBody {
    pub error: String,
}

/// One entry of the character image catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterImage {
    pub id: String,
    pub name: String,
    pub filename: String,
    pub path: String,
    pub is_default: bool,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CatalogResponse {
    pub success: bool,
    pub message: Option<String>,
    pub characters: Vec<CharacterImage>,
    pub default_character: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub character: Option<CharacterImage>,
    pub is_default: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DefaultResponse {
    pub default_character: Option<CharacterImage>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SetDefaultResponse {
    pub success: bool,
    pub message: String,
    pub default_character: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Invalid(_) => 400,
            ApiError::Unauthorized => 401,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::Internal => 500,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_default_request_uses_camel_case() {
        let req: SetDefaultRequest = serde_json::from_str(r#"{"characterId":"hela"}"#).unwrap();
        assert_eq!(req.character_id.as_deref(), Some("hela"));
        let req: SetDefaultRequest = serde_json::from_str("{}").unwrap();
        assert!(req.character_id.is_none());
    }

    #[test]
    fn api_error_status_and_body() {
        assert_eq!(ApiError::Conflict("taken".into()).status_code(), 409);
        assert_eq!(ApiError::NotFound("Hela".into()).body().error, "Hela not found");
    }

    #[test]
    fn history_timestamp_converts() {
        let entry = HistoryEntryView {
            character_name: "Thor".into(),
            timestamp: 0,
        };
        assert_eq!(entry.at().map(|t| t.timestamp()), Some(0));
    }
}
