//! Wire types of the rating service.

use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Sentinel the service returns for a player without a rating.
pub const NOT_RATED: &str = "NR";

/// Short-lived bearer token from the client-credential exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_in: Duration,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    3_600
}

/// Match format as understood by the rating service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchFormat {
    Singles,
    Doubles,
}

impl MatchFormat {
    /// Players per side required by the format.
    pub fn players_per_side(self) -> usize {
        match self {
            MatchFormat::Singles => 1,
            MatchFormat::Doubles => 2,
        }
    }
}

/// One side of a submitted match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SidePayload {
    pub players: Vec<String>,
    /// `gameN` keys, identical on both sides.
    pub scores: IndexMap<String, Option<u32>>,
}

/// Body of the match-create call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchPayload {
    /// Deterministic submission identifier; the service deduplicates on it.
    pub identifier: String,
    pub format: MatchFormat,
    /// RFC 3339 date the result was finalized.
    pub match_date: String,
    pub event_name: String,
    /// Present in club mode only; the service treats an explicit null differently from absence.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub club_id: Option<i64>,
    pub side_a: SidePayload,
    pub side_b: SidePayload,
}

/// Acknowledgement of a created match.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CreatedMatch {
    #[serde(alias = "matchId")]
    pub id: String,
}

/// Current ratings of one rating holder.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PlayerRatings {
    #[serde(alias = "playerId")]
    pub external_id: String,
    #[serde(default, deserialize_with = "rating_value")]
    pub singles: Option<f64>,
    #[serde(default, deserialize_with = "rating_value")]
    pub doubles: Option<f64>,
    #[serde(default, deserialize_with = "rating_value")]
    pub reliability: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LookupResponse {
    pub players: Vec<PlayerRatings>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PlayerIdsRequest<'a> {
    pub player_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(alias = "error", alias = "detail")]
    pub message: String,
}

/// Interpret a rating field: numbers and numeric strings resolve, `NR` and anything else is unknown.
pub fn parse_rating(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) if text.trim().eq_ignore_ascii_case(NOT_RATED) => None,
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn rating_value<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_rating))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn not_rated_sentinel_is_null() {
        assert_eq!(parse_rating(&json!("NR")), None);
        assert_eq!(parse_rating(&json!("4.125")), Some(4.125));
        assert_eq!(parse_rating(&json!(3.5)), Some(3.5));
        assert_eq!(parse_rating(&Value::Null), None);

        let ratings: PlayerRatings = serde_json::from_value(json!({
            "playerId": "ABC123",
            "singles": "NR",
            "doubles": 4.02
        }))
        .unwrap();
        assert_eq!(ratings.singles, None);
        assert_eq!(ratings.doubles, Some(4.02));
        assert_eq!(ratings.reliability, None);
    }

    #[test]
    fn partner_mode_omits_club_id() {
        let payload = MatchPayload {
            identifier: "league_x_y".into(),
            format: MatchFormat::Singles,
            match_date: "2026-01-01".into(),
            event_name: "week 1".into(),
            club_id: None,
            side_a: SidePayload {
                players: vec!["A".into()],
                scores: IndexMap::from([("game1".to_owned(), Some(11))]),
            },
            side_b: SidePayload {
                players: vec!["B".into()],
                scores: IndexMap::from([("game1".to_owned(), Some(4))]),
            },
        };
        let body = serde_json::to_value(&payload).unwrap();
        assert!(body.get("club_id").is_none());
        assert_eq!(body["format"], "SINGLES");
    }
}
