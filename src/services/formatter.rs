//! Turns an official result into the rating service's match payload.

use indexmap::IndexMap;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    dao::{
        models::{EventType, GameScore, Side},
        rating_api::models::{MatchFormat, MatchPayload, SidePayload},
    },
    state::scorable::{ScorableMatch, ScorableSide},
};

const MAX_GAMES: usize = 5;

/// Hard failures; no payload is produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("match has no official result")]
    NotOfficial,
    #[error("official result must have between 1 and 5 games (got {count})")]
    GameCount { count: usize },
    #[error("game {game_number} is tied")]
    TiedGame { game_number: u8 },
    #[error("{missing} player(s) missing external rating link ({sides})")]
    MissingExternalIds { missing: usize, sides: String },
    #[error("sides must both have 1 or 2 rated players (side A has {side_a}, side B has {side_b})")]
    PlayerCount { side_a: usize, side_b: usize },
    #[error("configured club id `{0}` is not numeric")]
    InvalidClubId(String),
}

/// Payload ready to send plus advisory findings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedSubmission {
    pub payload: MatchPayload,
    pub warnings: Vec<String>,
}

/// Deterministic identifier naming a match's record on the rating service.
pub fn submission_identifier(event_type: EventType, event_id: Uuid, match_id: Uuid) -> String {
    format!(
        "{}_{}_{}",
        event_type.as_str(),
        event_id.simple(),
        match_id.simple()
    )
}

/// Build the match-create payload for `view`.
///
/// The format follows the number of players actually linked on each side rather than the
/// configured play type. A configured `club_id` switches to club mode.
pub fn format_submission(
    view: &ScorableMatch,
    club_id: Option<&str>,
    min_game_score: u32,
) -> Result<FormattedSubmission, FormatError> {
    let result = view
        .official_result
        .as_ref()
        .ok_or(FormatError::NotOfficial)?;
    let games = &result.games;

    if games.is_empty() || games.len() > MAX_GAMES {
        return Err(FormatError::GameCount { count: games.len() });
    }
    if let Some(tied) = games.iter().find(|game| game.winner().is_none()) {
        return Err(FormatError::TiedGame {
            game_number: tied.game_number,
        });
    }

    check_external_ids(view)?;
    let format = detect_format(&view.side_a, &view.side_b)?;

    let club_id = club_id
        .map(|raw| {
            raw.trim()
                .parse::<i64>()
                .map_err(|_| FormatError::InvalidClubId(raw.to_owned()))
        })
        .transpose()?;

    let mut warnings = Vec::new();
    let reached_minimum = games
        .iter()
        .any(|game| game.score_a.max(game.score_b) >= min_game_score);
    if !reached_minimum {
        warnings.push(format!(
            "no game reached {min_game_score} points; the rating service may reject it"
        ));
    }

    let payload = MatchPayload {
        identifier: submission_identifier(view.event.event_type, view.event.event_id, view.id),
        format,
        match_date: OffsetDateTime::from(result.finalized_at).date().to_string(),
        event_name: view.label.clone(),
        club_id,
        side_a: side_payload(&view.side_a, games, Side::A),
        side_b: side_payload(&view.side_b, games, Side::B),
    };

    Ok(FormattedSubmission { payload, warnings })
}

fn check_external_ids(view: &ScorableMatch) -> Result<(), FormatError> {
    let missing_a = view.side_a.missing_external_ids();
    let missing_b = view.side_b.missing_external_ids();
    if missing_a + missing_b == 0 {
        return Ok(());
    }

    let sides = [(Side::A, missing_a), (Side::B, missing_b)]
        .into_iter()
        .filter(|(_, missing)| *missing > 0)
        .map(|(side, missing)| format!("{side}: {missing}"))
        .collect::<Vec<_>>()
        .join(", ");
    Err(FormatError::MissingExternalIds {
        missing: missing_a + missing_b,
        sides,
    })
}

fn detect_format(side_a: &ScorableSide, side_b: &ScorableSide) -> Result<MatchFormat, FormatError> {
    let count_a = side_a.resolved_external_ids().len();
    let count_b = side_b.resolved_external_ids().len();
    let format = match count_a {
        1 => MatchFormat::Singles,
        2 => MatchFormat::Doubles,
        _ => {
            return Err(FormatError::PlayerCount {
                side_a: count_a,
                side_b: count_b,
            });
        }
    };
    if count_b != format.players_per_side() {
        return Err(FormatError::PlayerCount {
            side_a: count_a,
            side_b: count_b,
        });
    }
    Ok(format)
}

fn side_payload(side: &ScorableSide, games: &[GameScore], which: Side) -> SidePayload {
    let scores = games
        .iter()
        .enumerate()
        .map(|(index, game)| {
            let points = match which {
                Side::A => game.score_a,
                Side::B => game.score_b,
            };
            (format!("game{}", index + 1), Some(points))
        })
        .collect::<IndexMap<_, _>>();

    SidePayload {
        players: side
            .resolved_external_ids()
            .into_iter()
            .map(str::to_owned)
            .collect(),
        scores,
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::dao::models::{EventKey, OfficialResult, ScoreState, SubmissionRecord};

    fn side(ids: &[Option<&str>]) -> ScorableSide {
        ScorableSide {
            id: Uuid::new_v4(),
            name: "side".into(),
            player_ids: ids.iter().map(|_| Uuid::new_v4()).collect(),
            external_ids: ids.iter().map(|id| id.map(str::to_owned)).collect(),
        }
    }

    fn view(side_a: ScorableSide, side_b: ScorableSide, scores: &[(u32, u32)]) -> ScorableMatch {
        let games = scores
            .iter()
            .enumerate()
            .map(|(i, (a, b))| GameScore::new(i as u8 + 1, *a, *b))
            .collect::<Vec<_>>();
        ScorableMatch {
            id: Uuid::new_v4(),
            event: EventKey {
                event_type: EventType::League,
                event_id: Uuid::new_v4(),
            },
            label: "week 3".into(),
            side_a,
            side_b,
            score_state: ScoreState::Official,
            score_proposal: None,
            official_result: Some(OfficialResult {
                version: 1,
                games,
                winner: Side::A,
                games_a: 2,
                games_b: 0,
                points_a: 22,
                points_b: 10,
                finalized_by: Uuid::new_v4(),
                finalized_at: SystemTime::UNIX_EPOCH,
                overridden: false,
                score_locked: true,
                correction_reason: None,
            }),
            submission: SubmissionRecord::default(),
        }
    }

    #[test]
    fn identifier_is_deterministic() {
        let event_id = Uuid::new_v4();
        let match_id = Uuid::new_v4();
        let first = submission_identifier(EventType::Tournament, event_id, match_id);
        let second = submission_identifier(EventType::Tournament, event_id, match_id);
        assert_eq!(first, second);
        assert!(first.starts_with("tournament_"));
        assert_ne!(
            first,
            submission_identifier(EventType::League, event_id, match_id)
        );
    }

    #[test]
    fn doubles_payload_has_matching_game_keys() {
        let view = view(
            side(&[Some("A1"), Some("A2")]),
            side(&[Some("B1"), Some("B2")]),
            &[(11, 5), (11, 5)],
        );
        let formatted = format_submission(&view, Some("42"), 6).unwrap();
        let payload = formatted.payload;
        assert_eq!(payload.format, MatchFormat::Doubles);
        assert_eq!(payload.club_id, Some(42));
        assert_eq!(payload.match_date, "1970-01-01");
        let keys_a = payload.side_a.scores.keys().collect::<Vec<_>>();
        let keys_b = payload.side_b.scores.keys().collect::<Vec<_>>();
        assert_eq!(keys_a, vec!["game1", "game2"]);
        assert_eq!(keys_a, keys_b);
        assert_eq!(payload.side_b.scores["game2"], Some(5));
        assert!(formatted.warnings.is_empty());

        let again = format_submission(&view, Some("42"), 6).unwrap();
        assert_eq!(again.payload.identifier, payload.identifier);
    }

    #[test]
    fn format_follows_linked_players_not_play_type() {
        let view = view(side(&[Some("A1")]), side(&[Some("B1")]), &[(11, 5)]);
        let formatted = format_submission(&view, None, 6).unwrap();
        assert_eq!(formatted.payload.format, MatchFormat::Singles);
        assert_eq!(formatted.payload.club_id, None);
    }

    #[test]
    fn missing_links_are_counted_per_side() {
        let view = view(
            side(&[Some("A1"), None]),
            side(&[None, None]),
            &[(11, 5), (11, 5)],
        );
        let err = format_submission(&view, None, 6).unwrap_err();
        assert_eq!(
            err,
            FormatError::MissingExternalIds {
                missing: 3,
                sides: "side A: 1, side B: 2".into()
            }
        );
        assert_eq!(
            err.to_string(),
            "3 player(s) missing external rating link (side A: 1, side B: 2)"
        );
    }

    #[test]
    fn rejects_uneven_sides_ties_and_bad_club() {
        let uneven = view(
            side(&[Some("A1")]),
            side(&[Some("B1"), Some("B2")]),
            &[(11, 5)],
        );
        assert_eq!(
            format_submission(&uneven, None, 6),
            Err(FormatError::PlayerCount {
                side_a: 1,
                side_b: 2
            })
        );

        let tied = view(side(&[Some("A1")]), side(&[Some("B1")]), &[(11, 5), (7, 7)]);
        assert_eq!(
            format_submission(&tied, None, 6),
            Err(FormatError::TiedGame { game_number: 2 })
        );

        let ok = view(side(&[Some("A1")]), side(&[Some("B1")]), &[(11, 5)]);
        assert_eq!(
            format_submission(&ok, Some("club-7"), 6),
            Err(FormatError::InvalidClubId("club-7".into()))
        );
    }

    #[test]
    fn low_scoring_result_only_warns() {
        let view = view(side(&[Some("A1")]), side(&[Some("B1")]), &[(5, 2)]);
        let formatted = format_submission(&view, None, 6).unwrap();
        assert_eq!(formatted.warnings.len(), 1);
    }
}
