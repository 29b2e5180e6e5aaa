//! Normalized view of a match regardless of which event flavour scheduled it.

use std::collections::HashMap;

use uuid::Uuid;

use crate::dao::models::{
    EventKey, MatchEntity, MatchOrigin, OfficialResult, ProfileEntity, ScoreProposal, ScoreState,
    SubmissionRecord,
};

/// One side with its players resolved against local profiles.
#[derive(Debug, Clone, PartialEq)]
pub struct ScorableSide {
    pub id: Uuid,
    pub name: String,
    pub player_ids: Vec<Uuid>,
    /// External rating-holder id per player, in `player_ids` order.
    pub external_ids: Vec<Option<String>>,
}

impl ScorableSide {
    /// Players lacking an external rating link.
    pub fn missing_external_ids(&self) -> usize {
        self.external_ids.iter().filter(|id| id.is_none()).count()
    }

    /// Resolved external ids, skipping unlinked players.
    pub fn resolved_external_ids(&self) -> Vec<&str> {
        self.external_ids.iter().flatten().map(String::as_str).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScorableMatch {
    pub id: Uuid,
    pub event: EventKey,
    /// Human readable position of the match inside its event.
    pub label: String,
    pub side_a: ScorableSide,
    pub side_b: ScorableSide,
    pub score_state: ScoreState,
    pub score_proposal: Option<ScoreProposal>,
    pub official_result: Option<OfficialResult>,
    pub submission: SubmissionRecord,
}

impl ScorableMatch {
    /// Build the view, resolving player external ids from `profiles`.
    pub fn new(entity: &MatchEntity, profiles: &[ProfileEntity]) -> Self {
        let by_id: HashMap<Uuid, &ProfileEntity> =
            profiles.iter().map(|profile| (profile.id, profile)).collect();
        let resolve = |side: &crate::dao::models::SideEntity| ScorableSide {
            id: side.id,
            name: side.name.clone(),
            player_ids: side.player_ids.clone(),
            external_ids: side
                .player_ids
                .iter()
                .map(|player| by_id.get(player).and_then(|p| p.external_id.clone()))
                .collect(),
        };

        Self {
            id: entity.id,
            event: entity.origin.event_key(),
            label: origin_label(&entity.origin),
            side_a: resolve(&entity.side_a),
            side_b: resolve(&entity.side_b),
            score_state: entity.score_state,
            score_proposal: entity.score_proposal.clone(),
            official_result: entity.official_result().cloned(),
            submission: entity.submission.clone(),
        }
    }
}

fn origin_label(origin: &MatchOrigin) -> String {
    match origin {
        MatchOrigin::Tournament {
            division, round, ..
        } => format!("{division} round {round}"),
        MatchOrigin::League { week, .. } => format!("week {week}"),
        MatchOrigin::FixtureBoard { board, .. } => format!("board {board}"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::dao::models::{BestOf, GameSettings, PlayType, SideEntity, WinBy};

    #[test]
    fn resolves_external_ids_and_event() {
        let league_id = Uuid::new_v4();
        let linked = Uuid::new_v4();
        let unlinked = Uuid::new_v4();
        let entity = MatchEntity {
            id: Uuid::new_v4(),
            revision: 0,
            origin: MatchOrigin::FixtureBoard {
                league_id,
                fixture_id: Uuid::new_v4(),
                board: "mixed-1".into(),
            },
            side_a: SideEntity {
                id: Uuid::new_v4(),
                name: "A".into(),
                player_ids: vec![linked],
            },
            side_b: SideEntity {
                id: Uuid::new_v4(),
                name: "B".into(),
                player_ids: vec![unlinked],
            },
            settings: GameSettings {
                points_per_game: 11,
                win_by: WinBy::Two,
                best_of: BestOf::One,
                cap_at: None,
                play_type: PlayType::MixedDoubles,
            },
            status: Default::default(),
            score_state: Default::default(),
            score_proposal: None,
            official_results: vec![],
            audit_log: vec![],
            submission: Default::default(),
            rating_eligible: true,
            created_at: SystemTime::UNIX_EPOCH,
            updated_at: SystemTime::UNIX_EPOCH,
        };
        let profiles = vec![ProfileEntity {
            id: linked,
            display_name: "Linked".into(),
            external_id: Some("EXT1".into()),
            singles_rating: None,
            doubles_rating: None,
            reliability: None,
            last_synced_at: None,
            revision: 0,
        }];

        let view = ScorableMatch::new(&entity, &profiles);
        assert_eq!(view.event.event_id, league_id);
        assert_eq!(view.label, "board mixed-1");
        assert_eq!(view.side_a.resolved_external_ids(), vec!["EXT1"]);
        assert_eq!(view.side_b.missing_external_ids(), 1);
    }
}
