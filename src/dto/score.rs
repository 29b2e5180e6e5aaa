//! DTO definitions for match registration and the score workflow.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Number;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dao::models::{
        AuditAction, AuditEntry, BestOf, EventType, GameScore, GameSettings, MatchEntity,
        MatchOrigin, MatchStatus, OfficialResult, PlayType, ScoreProposal, ScoreState, Side,
        SideEntity, SubmissionRecord, WinBy,
    },
    dto::{
        format_system_time,
        validation::{score_value, validate_score_number},
    },
    error::AppError,
    services::submission_service::identifier_for,
    state::validator::MAX_GAME_POINTS,
};

/// One game as typed in by a player or organizer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct GameScoreInput {
    #[validate(range(min = 1, max = 5))]
    pub game_number: u8,
    /// Whole, non-negative points.
    #[schema(value_type = f64)]
    #[validate(custom(function = "validate_score_number"))]
    pub score_a: Number,
    #[schema(value_type = f64)]
    #[validate(custom(function = "validate_score_number"))]
    pub score_b: Number,
}

impl GameScoreInput {
    fn to_game_score(&self) -> Result<GameScore, AppError> {
        let points = |number: &Number| {
            score_value(number)
                .map_err(|err| AppError::BadRequest(format!("game {}: {err}", self.game_number)))
        };
        Ok(GameScore::new(
            self.game_number,
            points(&self.score_a)?,
            points(&self.score_b)?,
        ))
    }
}

/// Convert typed-in games into domain scores.
pub fn to_game_scores(games: &[GameScoreInput]) -> Result<Vec<GameScore>, AppError> {
    games.iter().map(GameScoreInput::to_game_score).collect()
}

/// Participant score proposal.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ProposeRequest {
    #[validate(length(min = 1, max = 5), nested)]
    pub games: Vec<GameScoreInput>,
}

/// Participant objection to a proposal or signed score.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct DisputeRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

/// Organizer finalization, optionally replacing the proposed games.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct FinalizeRequest {
    /// Required when no agreed proposal exists (disputed or never proposed).
    #[serde(default)]
    #[validate(length(min = 1, max = 5), nested)]
    pub override_games: Option<Vec<GameScoreInput>>,
}

/// Organizer correction of an official result.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CorrectRequest {
    #[validate(length(min = 1, max = 5), nested)]
    pub games: Vec<GameScoreInput>,
    /// Mandatory once the result has reached the rating service.
    #[serde(default)]
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Where a match sits inside its event.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OriginDto {
    Tournament {
        tournament_id: Uuid,
        division: String,
        round: u32,
    },
    League {
        league_id: Uuid,
        week: u32,
    },
    FixtureBoard {
        league_id: Uuid,
        fixture_id: Uuid,
        board: String,
    },
}

impl From<OriginDto> for MatchOrigin {
    fn from(value: OriginDto) -> Self {
        match value {
            OriginDto::Tournament {
                tournament_id,
                division,
                round,
            } => MatchOrigin::Tournament {
                tournament_id,
                division,
                round,
            },
            OriginDto::League { league_id, week } => MatchOrigin::League { league_id, week },
            OriginDto::FixtureBoard {
                league_id,
                fixture_id,
                board,
            } => MatchOrigin::FixtureBoard {
                league_id,
                fixture_id,
                board,
            },
        }
    }
}

impl From<&MatchOrigin> for OriginDto {
    fn from(value: &MatchOrigin) -> Self {
        match value.clone() {
            MatchOrigin::Tournament {
                tournament_id,
                division,
                round,
            } => OriginDto::Tournament {
                tournament_id,
                division,
                round,
            },
            MatchOrigin::League { league_id, week } => OriginDto::League { league_id, week },
            MatchOrigin::FixtureBoard {
                league_id,
                fixture_id,
                board,
            } => OriginDto::FixtureBoard {
                league_id,
                fixture_id,
                board,
            },
        }
    }
}

/// A team or single entrant with its players.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct SideDto {
    pub id: Uuid,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(min = 1, max = 2))]
    pub player_ids: Vec<Uuid>,
}

/// Scoring rules fixed at registration.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SettingsDto {
    pub points_per_game: u32,
    /// 1 or 2.
    pub win_by: u8,
    /// 1, 3 or 5.
    pub best_of: u8,
    #[serde(default)]
    pub cap_at: Option<u32>,
    pub play_type: PlayType,
}

impl Validate for SettingsDto {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !(1..=99).contains(&self.points_per_game) {
            errors.add("points_per_game", message("points_per_game", "must be between 1 and 99"));
        }
        if let Err(err) = WinBy::try_from(self.win_by) {
            errors.add("win_by", message("win_by", &err));
        }
        if let Err(err) = BestOf::try_from(self.best_of) {
            errors.add("best_of", message("best_of", &err));
        }
        if let Some(cap) = self.cap_at {
            if cap < self.points_per_game {
                errors.add("cap_at", message("cap_at", "cannot be below points_per_game"));
            } else if cap > MAX_GAME_POINTS {
                errors.add("cap_at", message("cap_at", "cannot exceed the points ceiling"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl TryFrom<SettingsDto> for GameSettings {
    type Error = AppError;

    fn try_from(value: SettingsDto) -> Result<Self, Self::Error> {
        Ok(GameSettings {
            points_per_game: value.points_per_game,
            win_by: WinBy::try_from(value.win_by).map_err(AppError::BadRequest)?,
            best_of: BestOf::try_from(value.best_of).map_err(AppError::BadRequest)?,
            cap_at: value.cap_at,
            play_type: value.play_type,
        })
    }
}

impl From<&GameSettings> for SettingsDto {
    fn from(value: &GameSettings) -> Self {
        Self {
            points_per_game: value.points_per_game,
            win_by: value.win_by.into(),
            best_of: value.best_of.into(),
            cap_at: value.cap_at,
            play_type: value.play_type,
        }
    }
}

fn message(code: &'static str, text: &str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(text.to_owned().into());
    err
}

/// Match scheduled by a tournament or league.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct RegisterMatchRequest {
    /// Defaults to a fresh identifier.
    #[serde(default)]
    pub id: Option<Uuid>,
    pub origin: OriginDto,
    #[validate(nested)]
    pub side_a: SideDto,
    #[validate(nested)]
    pub side_b: SideDto,
    #[validate(nested)]
    pub settings: SettingsDto,
    /// Exhibition matches are registered with `false` and never relayed.
    #[serde(default = "default_true")]
    pub rating_eligible: bool,
}

fn default_true() -> bool {
    true
}

impl RegisterMatchRequest {
    /// Build the stored document for a brand-new match.
    pub fn into_entity(self, now: SystemTime) -> Result<MatchEntity, AppError> {
        if self.side_a.id == self.side_b.id {
            return Err(AppError::BadRequest(
                "a match needs two different sides".into(),
            ));
        }
        let side = |dto: SideDto| SideEntity {
            id: dto.id,
            name: dto.name,
            player_ids: dto.player_ids,
        };
        Ok(MatchEntity {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            revision: 0,
            origin: self.origin.into(),
            side_a: side(self.side_a),
            side_b: side(self.side_b),
            settings: self.settings.try_into()?,
            status: MatchStatus::Scheduled,
            score_state: ScoreState::None,
            score_proposal: None,
            official_results: Vec::new(),
            audit_log: Vec::new(),
            submission: SubmissionRecord::default(),
            rating_eligible: self.rating_eligible,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Pending participant proposal.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProposalView {
    pub games: Vec<GameScore>,
    pub proposed_by: Uuid,
    pub proposed_by_side: Side,
    pub proposed_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispute_reason: Option<String>,
}

impl From<&ScoreProposal> for ProposalView {
    fn from(value: &ScoreProposal) -> Self {
        Self {
            games: value.games.clone(),
            proposed_by: value.proposed_by,
            proposed_by_side: value.proposed_by_side,
            proposed_at: format_system_time(value.proposed_at),
            confirmed_by: value.confirmed_by,
            confirmed_at: value.confirmed_at.map(format_system_time),
            dispute_reason: value.dispute_reason.clone(),
        }
    }
}

/// Latest official result.
#[derive(Debug, Serialize, ToSchema)]
pub struct OfficialResultView {
    pub version: u32,
    pub games: Vec<GameScore>,
    pub winner: Side,
    pub games_a: u32,
    pub games_b: u32,
    pub points_a: u32,
    pub points_b: u32,
    pub finalized_by: Uuid,
    pub finalized_at: String,
    pub overridden: bool,
    pub score_locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction_reason: Option<String>,
}

impl From<&OfficialResult> for OfficialResultView {
    fn from(value: &OfficialResult) -> Self {
        Self {
            version: value.version,
            games: value.games.clone(),
            winner: value.winner,
            games_a: value.games_a,
            games_b: value.games_b,
            points_a: value.points_a,
            points_b: value.points_b,
            finalized_by: value.finalized_by,
            finalized_at: format_system_time(value.finalized_at),
            overridden: value.overridden,
            score_locked: value.score_locked,
            correction_reason: value.correction_reason.clone(),
        }
    }
}

/// Relay bookkeeping of a match.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubmissionView {
    pub submitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_error: Option<String>,
    pub attempt_count: u32,
    pub pending_submission: bool,
    pub needs_correction: bool,
    pub correction_submitted: bool,
}

impl From<&SubmissionRecord> for SubmissionView {
    fn from(value: &SubmissionRecord) -> Self {
        Self {
            submitted: value.submitted,
            submitted_at: value.submitted_at.map(format_system_time),
            submission_id: value.submission_id.clone(),
            submission_error: value.submission_error.clone(),
            attempt_count: value.attempt_count,
            pending_submission: value.pending_submission,
            needs_correction: value.needs_correction,
            correction_submitted: value.correction_submitted,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditEntryView {
    pub timestamp: String,
    pub action: AuditAction,
    pub actor_id: Uuid,
    pub actor_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<Uuid>,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_snapshot: Option<Vec<GameScore>>,
}

impl From<&AuditEntry> for AuditEntryView {
    fn from(value: &AuditEntry) -> Self {
        Self {
            timestamp: format_system_time(value.timestamp),
            action: value.action,
            actor_id: value.actor_id,
            actor_name: value.actor_name.clone(),
            team_id: value.team_id,
            details: value.details.clone(),
            score_snapshot: value.score_snapshot.clone(),
        }
    }
}

/// Full projection of a match and its score workflow.
#[derive(Debug, Serialize, ToSchema)]
pub struct MatchResponse {
    pub id: Uuid,
    pub revision: u64,
    pub event_type: EventType,
    pub event_id: Uuid,
    pub origin: OriginDto,
    pub side_a: SideDto,
    pub side_b: SideDto,
    pub settings: SettingsDto,
    pub status: MatchStatus,
    pub score_state: ScoreState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal: Option<ProposalView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub official_result: Option<OfficialResultView>,
    /// Number of official result versions, corrections included.
    pub result_versions: usize,
    pub rating_eligible: bool,
    pub submission: SubmissionView,
    /// Identifier the match is relayed under.
    pub submission_identifier: String,
    pub audit_log: Vec<AuditEntryView>,
    /// Advisory findings of the last command.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl MatchResponse {
    pub fn new(entity: &MatchEntity, warnings: Vec<String>) -> Self {
        let event = entity.origin.event_key();
        let side = |side: &SideEntity| SideDto {
            id: side.id,
            name: side.name.clone(),
            player_ids: side.player_ids.clone(),
        };
        Self {
            id: entity.id,
            revision: entity.revision,
            event_type: event.event_type,
            event_id: event.event_id,
            origin: OriginDto::from(&entity.origin),
            side_a: side(&entity.side_a),
            side_b: side(&entity.side_b),
            settings: SettingsDto::from(&entity.settings),
            status: entity.status,
            score_state: entity.score_state,
            proposal: entity.score_proposal.as_ref().map(ProposalView::from),
            official_result: entity.official_result().map(OfficialResultView::from),
            result_versions: entity.official_results.len(),
            rating_eligible: entity.rating_eligible,
            submission: SubmissionView::from(&entity.submission),
            submission_identifier: identifier_for(entity),
            audit_log: entity.audit_log.iter().map(AuditEntryView::from).collect(),
            warnings,
        }
    }
}

impl From<&MatchEntity> for MatchResponse {
    fn from(value: &MatchEntity) -> Self {
        Self::new(value, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn register_body() -> serde_json::Value {
        json!({
            "origin": { "kind": "league", "league_id": Uuid::nil(), "week": 3 },
            "side_a": { "id": Uuid::from_u128(1), "name": "Dinks", "player_ids": [Uuid::from_u128(11)] },
            "side_b": { "id": Uuid::from_u128(2), "name": "Lobs", "player_ids": [Uuid::from_u128(22)] },
            "settings": { "points_per_game": 11, "win_by": 2, "best_of": 3, "play_type": "singles" }
        })
    }

    #[test]
    fn propose_request_rejects_fractional_scores() {
        let request: ProposeRequest = serde_json::from_value(json!({
            "games": [{ "game_number": 1, "score_a": 11.5, "score_b": 9 }]
        }))
        .unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.errors().contains_key("games"));
    }

    #[test]
    fn propose_request_limits_game_count() {
        let games: Vec<_> = (1..=6)
            .map(|n| json!({ "game_number": n.min(5), "score_a": 11, "score_b": 3 }))
            .collect();
        let request: ProposeRequest = serde_json::from_value(json!({ "games": games })).unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn converts_whole_number_games() {
        let request: ProposeRequest = serde_json::from_value(json!({
            "games": [{ "game_number": 1, "score_a": 11.0, "score_b": 7 }]
        }))
        .unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(
            to_game_scores(&request.games).unwrap(),
            vec![GameScore::new(1, 11, 7)]
        );
    }

    #[test]
    fn registration_builds_scheduled_match() {
        let request: RegisterMatchRequest = serde_json::from_value(register_body()).unwrap();
        assert!(request.validate().is_ok());
        let entity = request.into_entity(SystemTime::UNIX_EPOCH).unwrap();
        assert_eq!(entity.score_state, ScoreState::None);
        assert_eq!(entity.settings.best_of, BestOf::Three);
        assert!(entity.rating_eligible);

        let view = MatchResponse::from(&entity);
        assert_eq!(view.event_type, EventType::League);
        assert_eq!(view.result_versions, 0);
        assert!(view.submission_identifier.starts_with("league_"));
    }

    #[test]
    fn game_count_rule_reports_on_the_games_field() {
        let games: Vec<_> = (1..=6)
            .map(|n| json!({ "game_number": n.min(5), "score_a": 11, "score_b": 3 }))
            .collect();
        let request: CorrectRequest =
            serde_json::from_value(json!({ "games": games, "reason": "typo" })).unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.errors().contains_key("games"));

        let request: FinalizeRequest =
            serde_json::from_value(json!({ "override_games": [] })).unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.errors().contains_key("override_games"));

        let request: FinalizeRequest = serde_json::from_value(json!({})).unwrap();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn oversized_scores_and_caps_are_rejected() {
        let request: ProposeRequest = serde_json::from_value(json!({
            "games": [{ "game_number": 1, "score_a": 4_000_000_000u64, "score_b": 3_999_999_998u64 }]
        }))
        .unwrap();
        assert!(request.validate().unwrap_err().errors().contains_key("games"));

        let mut body = register_body();
        body["settings"]["cap_at"] = json!(1_000_000);
        let request: RegisterMatchRequest = serde_json::from_value(body).unwrap();
        assert!(request.validate().unwrap_err().errors().contains_key("settings"));
    }

    #[test]
    fn registration_rejects_unknown_best_of() {
        let mut body = register_body();
        body["settings"]["best_of"] = json!(4);
        let request: RegisterMatchRequest = serde_json::from_value(body).unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.errors().contains_key("settings"));
    }
}
