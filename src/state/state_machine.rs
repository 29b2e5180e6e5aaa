use std::time::SystemTime;

use thiserror::Error;
use uuid::Uuid;

use crate::{
    dao::models::{
        AuditAction, AuditEntry, GameScore, MatchEntity, MatchStatus, OfficialResult,
        ScoreProposal, ScoreState, Side,
    },
    state::validator::{
        MatchScoreError, ScoreError, check_game_sequence, validate_game_score,
        validate_match_scores,
    },
};

/// Role the caller acts under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorRole {
    /// Player or captain of one of the sides.
    Participant,
    /// Event organizer; may finalize and correct results.
    Organizer,
}

/// Authenticated caller of a score transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub name: String,
    pub role: ActorRole,
    /// Team the caller plays for, if any.
    pub team_id: Option<Uuid>,
}

/// Commands that can be applied to a match score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoreCommand {
    /// A participant enters game scores for confirmation by the other side.
    Propose { games: Vec<GameScore> },
    /// The opposing side accepts the pending proposal.
    Confirm,
    /// Either side rejects the pending or signed proposal.
    Dispute { reason: String },
    /// The organizer locks in the result, optionally overriding the proposal.
    Finalize { override_games: Option<Vec<GameScore>> },
    /// The organizer amends an official result.
    Correct {
        games: Vec<GameScore>,
        reason: Option<String>,
    },
}

impl ScoreCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ScoreCommand::Propose { .. } => "propose",
            ScoreCommand::Confirm => "confirm",
            ScoreCommand::Dispute { .. } => "dispute",
            ScoreCommand::Finalize { .. } => "finalize",
            ScoreCommand::Correct { .. } => "correct",
        }
    }
}

/// Reasons a command cannot be planned against the current match document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot {command} while the score is {from:?}")]
    InvalidTransition {
        from: ScoreState,
        command: &'static str,
    },
    #[error("match is cancelled")]
    Cancelled,
    #[error("only participants of this match can {command}")]
    NotParticipant { command: &'static str },
    #[error("only the organizer can {command}")]
    NotOrganizer { command: &'static str },
    #[error("the proposal must be confirmed by the opposing side")]
    SameSide,
    #[error("no score proposal to {command}")]
    NoProposal { command: &'static str },
    #[error("a reason is required to {command}")]
    ReasonRequired { command: &'static str },
    #[error("override scores are required to finalize from {from:?}")]
    OverrideRequired { from: ScoreState },
    #[error("game {game_number}: {source}")]
    InvalidGame {
        game_number: u8,
        #[source]
        source: ScoreError,
    },
    #[error("best of {best_of} allows at most {best_of} games (got {count})")]
    TooManyGames { count: usize, best_of: usize },
    #[error(transparent)]
    InvalidMatch(#[from] MatchScoreError),
}

/// Errors raised when applying a plan to a match document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// The document changed since the plan was created.
    #[error("match revision changed (expected {expected}, got {actual})")]
    VersionMismatch { expected: u64, actual: u64 },
}

/// Document changes produced by a planned transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Propose(ScoreProposal),
    Confirm { by: Uuid, at: SystemTime },
    Dispute { reason: String },
    Official {
        result: OfficialResult,
        flag_correction: bool,
    },
}

/// A validated transition that has not been written yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub from: ScoreState,
    pub to: ScoreState,
    /// Revision the plan was computed against.
    pub expected_revision: u64,
    pub change: Change,
    pub audit: AuditEntry,
    /// Non-blocking findings produced by match validation.
    pub warnings: Vec<String>,
}

/// Validate `command` against `current` and compute the resulting changes.
pub fn plan_transition(
    current: &MatchEntity,
    command: &ScoreCommand,
    actor: &Actor,
    now: SystemTime,
) -> Result<Plan, TransitionError> {
    if current.status == MatchStatus::Cancelled {
        return Err(TransitionError::Cancelled);
    }
    let from = current.score_state;
    let name = command.name();

    match command {
        ScoreCommand::Propose { games } => {
            if !matches!(from, ScoreState::None | ScoreState::Proposed) {
                return Err(TransitionError::InvalidTransition {
                    from,
                    command: name,
                });
            }
            let side = participant_side(current, actor, name)?;
            validate_each_game(current, games)?;

            let proposal = ScoreProposal {
                games: games.clone(),
                proposed_by: actor.id,
                proposed_by_side: side,
                proposed_at: now,
                confirmed_by: None,
                confirmed_at: None,
                dispute_reason: None,
            };
            let details = format!("{side} proposed {}", describe_games(games));
            Ok(Plan {
                from,
                to: ScoreState::Proposed,
                expected_revision: current.revision,
                change: Change::Propose(proposal),
                audit: audit(actor, AuditAction::Proposed, now, details, Some(games.clone())),
                warnings: Vec::new(),
            })
        }
        ScoreCommand::Confirm => {
            if from != ScoreState::Proposed {
                return Err(TransitionError::InvalidTransition {
                    from,
                    command: name,
                });
            }
            let proposal = current
                .score_proposal
                .as_ref()
                .ok_or(TransitionError::NoProposal { command: name })?;
            let side = participant_side(current, actor, name)?;
            if side != proposal.proposed_by_side.opponent() {
                return Err(TransitionError::SameSide);
            }

            Ok(Plan {
                from,
                to: ScoreState::Signed,
                expected_revision: current.revision,
                change: Change::Confirm {
                    by: actor.id,
                    at: now,
                },
                audit: audit(
                    actor,
                    AuditAction::Confirmed,
                    now,
                    format!("{side} confirmed the proposed score"),
                    Some(proposal.games.clone()),
                ),
                warnings: Vec::new(),
            })
        }
        ScoreCommand::Dispute { reason } => {
            if !matches!(from, ScoreState::Proposed | ScoreState::Signed) {
                return Err(TransitionError::InvalidTransition {
                    from,
                    command: name,
                });
            }
            let side = participant_side(current, actor, name)?;
            let reason = reason.trim();
            if reason.is_empty() {
                return Err(TransitionError::ReasonRequired { command: name });
            }

            Ok(Plan {
                from,
                to: ScoreState::Disputed,
                expected_revision: current.revision,
                change: Change::Dispute {
                    reason: reason.to_owned(),
                },
                audit: audit(
                    actor,
                    AuditAction::Disputed,
                    now,
                    format!("{side} disputed the score: {reason}"),
                    current.score_proposal.as_ref().map(|p| p.games.clone()),
                ),
                warnings: Vec::new(),
            })
        }
        ScoreCommand::Finalize { override_games } => {
            if from == ScoreState::Official {
                return Err(TransitionError::InvalidTransition {
                    from,
                    command: name,
                });
            }
            require_organizer(actor, name)?;

            let games = match (override_games, from, current.score_proposal.as_ref()) {
                (Some(games), _, _) => games.clone(),
                (None, ScoreState::Proposed | ScoreState::Signed, Some(proposal)) => {
                    proposal.games.clone()
                }
                (None, ScoreState::Proposed | ScoreState::Signed, None) => {
                    return Err(TransitionError::NoProposal { command: name });
                }
                (None, _, _) => return Err(TransitionError::OverrideRequired { from }),
            };
            let overridden = override_games.is_some();
            let (result, warnings) = official_result(current, games, actor, now, 1, overridden, None)?;

            let details = format!(
                "finalized {}-{} in games for {}{}",
                result.games_a,
                result.games_b,
                result.winner,
                if overridden { " (override)" } else { "" }
            );
            Ok(Plan {
                from,
                to: ScoreState::Official,
                expected_revision: current.revision,
                audit: audit(
                    actor,
                    AuditAction::Finalized,
                    now,
                    details,
                    Some(result.games.clone()),
                ),
                change: Change::Official {
                    result,
                    flag_correction: false,
                },
                warnings,
            })
        }
        ScoreCommand::Correct { games, reason } => {
            if from != ScoreState::Official {
                return Err(TransitionError::InvalidTransition {
                    from,
                    command: name,
                });
            }
            require_organizer(actor, name)?;

            let reason = reason
                .as_deref()
                .map(str::trim)
                .filter(|reason| !reason.is_empty());
            let submitted = current.submission.submitted;
            if submitted && reason.is_none() {
                return Err(TransitionError::ReasonRequired { command: name });
            }

            let version = current
                .official_result()
                .map(|result| result.version + 1)
                .unwrap_or(1);
            let (result, warnings) = official_result(
                current,
                games.clone(),
                actor,
                now,
                version,
                true,
                reason.map(str::to_owned),
            )?;

            let details = match reason {
                Some(reason) => format!("corrected result to version {version}: {reason}"),
                None => format!("corrected result to version {version}"),
            };
            Ok(Plan {
                from,
                to: ScoreState::Official,
                expected_revision: current.revision,
                audit: audit(
                    actor,
                    AuditAction::Corrected,
                    now,
                    details,
                    Some(result.games.clone()),
                ),
                change: Change::Official {
                    result,
                    flag_correction: submitted,
                },
                warnings,
            })
        }
    }
}

/// Apply a plan to the document it was computed against, bumping its revision.
pub fn apply_plan(entity: &mut MatchEntity, plan: Plan, now: SystemTime) -> Result<(), ApplyError> {
    if entity.revision != plan.expected_revision {
        return Err(ApplyError::VersionMismatch {
            expected: plan.expected_revision,
            actual: entity.revision,
        });
    }

    match plan.change {
        Change::Propose(proposal) => {
            entity.score_proposal = Some(proposal);
        }
        Change::Confirm { by, at } => {
            if let Some(proposal) = entity.score_proposal.as_mut() {
                proposal.confirmed_by = Some(by);
                proposal.confirmed_at = Some(at);
            }
        }
        Change::Dispute { reason } => {
            if let Some(proposal) = entity.score_proposal.as_mut() {
                proposal.dispute_reason = Some(reason);
            }
        }
        Change::Official {
            result,
            flag_correction,
        } => {
            entity.official_results.push(result);
            entity.status = MatchStatus::Completed;
            if flag_correction {
                entity.submission.needs_correction = true;
                entity.submission.correction_submitted = false;
            }
        }
    }

    entity.score_state = plan.to;
    entity.audit_log.push(plan.audit);
    entity.revision += 1;
    entity.updated_at = now;
    Ok(())
}

fn participant_side(
    current: &MatchEntity,
    actor: &Actor,
    command: &'static str,
) -> Result<Side, TransitionError> {
    actor
        .team_id
        .and_then(|team| current.side_of_team(team))
        .ok_or(TransitionError::NotParticipant { command })
}

fn require_organizer(actor: &Actor, command: &'static str) -> Result<(), TransitionError> {
    match actor.role {
        ActorRole::Organizer => Ok(()),
        ActorRole::Participant => Err(TransitionError::NotOrganizer { command }),
    }
}

fn validate_each_game(current: &MatchEntity, games: &[GameScore]) -> Result<(), TransitionError> {
    let best_of = current.settings.best_of.games();
    if games.is_empty() {
        return Err(MatchScoreError::NoGames.into());
    }
    if games.len() > best_of {
        return Err(TransitionError::TooManyGames {
            count: games.len(),
            best_of,
        });
    }
    check_game_sequence(games)?;
    for game in games {
        validate_game_score(
            i64::from(game.score_a),
            i64::from(game.score_b),
            &current.settings,
        )
        .map_err(|source| TransitionError::InvalidGame {
            game_number: game.game_number,
            source,
        })?;
    }
    Ok(())
}

fn official_result(
    current: &MatchEntity,
    games: Vec<GameScore>,
    actor: &Actor,
    now: SystemTime,
    version: u32,
    overridden: bool,
    correction_reason: Option<String>,
) -> Result<(OfficialResult, Vec<String>), TransitionError> {
    let validated = validate_match_scores(&games, &current.settings)?;
    let warnings = validated.warnings.iter().map(|w| w.message()).collect();
    let tally = validated.tally;

    Ok((
        OfficialResult {
            version,
            games,
            winner: validated.winner,
            games_a: tally.games_a,
            games_b: tally.games_b,
            points_a: tally.points_a,
            points_b: tally.points_b,
            finalized_by: actor.id,
            finalized_at: now,
            overridden,
            score_locked: true,
            correction_reason,
        },
        warnings,
    ))
}

fn audit(
    actor: &Actor,
    action: AuditAction,
    now: SystemTime,
    details: String,
    score_snapshot: Option<Vec<GameScore>>,
) -> AuditEntry {
    AuditEntry {
        timestamp: now,
        action,
        actor_id: actor.id,
        actor_name: actor.name.clone(),
        team_id: actor.team_id,
        details,
        score_snapshot,
    }
}

fn describe_games(games: &[GameScore]) -> String {
    games
        .iter()
        .map(|g| format!("{}-{}", g.score_a, g.score_b))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{
        BestOf, GameSettings, MatchOrigin, PlayType, SideEntity, SubmissionRecord, WinBy,
    };

    struct Fixture {
        entity: MatchEntity,
        captain_a: Actor,
        captain_b: Actor,
        organizer: Actor,
    }

    fn fixture() -> Fixture {
        let now = SystemTime::UNIX_EPOCH;
        let team_a = Uuid::new_v4();
        let team_b = Uuid::new_v4();
        let entity = MatchEntity {
            id: Uuid::new_v4(),
            revision: 0,
            origin: MatchOrigin::Tournament {
                tournament_id: Uuid::new_v4(),
                division: "Open".into(),
                round: 1,
            },
            side_a: SideEntity {
                id: team_a,
                name: "Dinks".into(),
                player_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
            },
            side_b: SideEntity {
                id: team_b,
                name: "Lobs".into(),
                player_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
            },
            settings: GameSettings {
                points_per_game: 11,
                win_by: WinBy::Two,
                best_of: BestOf::Three,
                cap_at: None,
                play_type: PlayType::Doubles,
            },
            status: MatchStatus::Scheduled,
            score_state: ScoreState::None,
            score_proposal: None,
            official_results: vec![],
            audit_log: vec![],
            submission: SubmissionRecord::default(),
            rating_eligible: true,
            created_at: now,
            updated_at: now,
        };
        let actor = |name: &str, role, team_id| Actor {
            id: Uuid::new_v4(),
            name: name.into(),
            role,
            team_id,
        };
        Fixture {
            entity,
            captain_a: actor("Ana", ActorRole::Participant, Some(team_a)),
            captain_b: actor("Ben", ActorRole::Participant, Some(team_b)),
            organizer: actor("Org", ActorRole::Organizer, None),
        }
    }

    fn games(scores: &[(u32, u32)]) -> Vec<GameScore> {
        scores
            .iter()
            .enumerate()
            .map(|(i, (a, b))| GameScore::new(i as u8 + 1, *a, *b))
            .collect()
    }

    fn step(entity: &mut MatchEntity, command: ScoreCommand, actor: &Actor) {
        let plan = plan_transition(entity, &command, actor, SystemTime::UNIX_EPOCH).unwrap();
        apply_plan(entity, plan, SystemTime::UNIX_EPOCH).unwrap();
    }

    #[test]
    fn propose_confirm_finalize_flow() {
        let Fixture {
            mut entity,
            captain_a,
            captain_b,
            organizer,
        } = fixture();
        let scores = games(&[(11, 7), (9, 11), (11, 8)]);

        step(
            &mut entity,
            ScoreCommand::Propose {
                games: scores.clone(),
            },
            &captain_a,
        );
        step(&mut entity, ScoreCommand::Confirm, &captain_b);
        assert_eq!(entity.score_state, ScoreState::Signed);

        step(
            &mut entity,
            ScoreCommand::Finalize {
                override_games: None,
            },
            &organizer,
        );
        let result = entity.official_result().unwrap();
        assert_eq!(entity.score_state, ScoreState::Official);
        assert_eq!(result.winner, Side::A);
        assert!(result.score_locked);
        assert!(!result.overridden);
        assert_eq!(result.games, scores);
        assert_eq!(entity.audit_log.len(), 3);
        assert_eq!(entity.revision, 3);
    }

    #[test]
    fn proposer_side_cannot_confirm() {
        let Fixture {
            mut entity,
            captain_a,
            ..
        } = fixture();
        step(
            &mut entity,
            ScoreCommand::Propose {
                games: games(&[(11, 3), (11, 4)]),
            },
            &captain_a,
        );
        let err = plan_transition(
            &entity,
            &ScoreCommand::Confirm,
            &captain_a,
            SystemTime::UNIX_EPOCH,
        )
        .unwrap_err();
        assert_eq!(err, TransitionError::SameSide);
    }

    #[test]
    fn propose_rejects_invalid_games_and_outsiders() {
        let Fixture {
            entity,
            captain_a,
            organizer,
            ..
        } = fixture();
        let err = plan_transition(
            &entity,
            &ScoreCommand::Propose {
                games: games(&[(11, 10)]),
            },
            &captain_a,
            SystemTime::UNIX_EPOCH,
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidGame { game_number: 1, .. }));

        let err = plan_transition(
            &entity,
            &ScoreCommand::Propose {
                games: games(&[(11, 3)]),
            },
            &organizer,
            SystemTime::UNIX_EPOCH,
        )
        .unwrap_err();
        assert_eq!(err, TransitionError::NotParticipant { command: "propose" });
    }

    #[test]
    fn dispute_needs_reason_and_forces_override() {
        let Fixture {
            mut entity,
            captain_a,
            captain_b,
            organizer,
        } = fixture();
        step(
            &mut entity,
            ScoreCommand::Propose {
                games: games(&[(11, 3), (11, 4)]),
            },
            &captain_a,
        );
        let err = plan_transition(
            &entity,
            &ScoreCommand::Dispute { reason: "  ".into() },
            &captain_b,
            SystemTime::UNIX_EPOCH,
        )
        .unwrap_err();
        assert_eq!(err, TransitionError::ReasonRequired { command: "dispute" });

        step(
            &mut entity,
            ScoreCommand::Dispute {
                reason: "game 2 was 11-9".into(),
            },
            &captain_b,
        );
        assert_eq!(entity.score_state, ScoreState::Disputed);

        let err = plan_transition(
            &entity,
            &ScoreCommand::Finalize {
                override_games: None,
            },
            &organizer,
            SystemTime::UNIX_EPOCH,
        )
        .unwrap_err();
        assert_eq!(
            err,
            TransitionError::OverrideRequired {
                from: ScoreState::Disputed
            }
        );

        step(
            &mut entity,
            ScoreCommand::Finalize {
                override_games: Some(games(&[(11, 3), (11, 9)])),
            },
            &organizer,
        );
        assert!(entity.official_result().unwrap().overridden);
    }

    #[test]
    fn signed_score_can_still_be_disputed() {
        let Fixture {
            mut entity,
            captain_a,
            captain_b,
            organizer,
        } = fixture();
        step(
            &mut entity,
            ScoreCommand::Propose {
                games: games(&[(11, 5), (11, 6)]),
            },
            &captain_a,
        );
        step(&mut entity, ScoreCommand::Confirm, &captain_b);
        assert_eq!(entity.score_state, ScoreState::Signed);

        step(
            &mut entity,
            ScoreCommand::Dispute {
                reason: "wrong team recorded as serving".into(),
            },
            &captain_a,
        );
        assert_eq!(entity.score_state, ScoreState::Disputed);
        let proposal = entity.score_proposal.as_ref().unwrap();
        assert_eq!(
            proposal.dispute_reason.as_deref(),
            Some("wrong team recorded as serving")
        );
        assert_eq!(entity.audit_log.len(), 3);

        let err = plan_transition(
            &entity,
            &ScoreCommand::Dispute {
                reason: "again".into(),
            },
            &captain_b,
            SystemTime::UNIX_EPOCH,
        )
        .unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                from: ScoreState::Disputed,
                command: "dispute"
            }
        );

        let err = plan_transition(
            &entity,
            &ScoreCommand::Finalize {
                override_games: None,
            },
            &organizer,
            SystemTime::UNIX_EPOCH,
        )
        .unwrap_err();
        assert_eq!(
            err,
            TransitionError::OverrideRequired {
                from: ScoreState::Disputed
            }
        );
    }

    #[test]
    fn games_out_of_order_are_rejected() {
        let Fixture {
            entity, captain_a, ..
        } = fixture();
        let err = plan_transition(
            &entity,
            &ScoreCommand::Propose {
                games: vec![GameScore::new(2, 11, 3), GameScore::new(1, 11, 4)],
            },
            &captain_a,
            SystemTime::UNIX_EPOCH,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::InvalidMatch(MatchScoreError::OutOfSequence { position: 1, .. })
        ));
    }

    #[test]
    fn participants_cannot_finalize() {
        let Fixture {
            entity, captain_a, ..
        } = fixture();
        let err = plan_transition(
            &entity,
            &ScoreCommand::Finalize {
                override_games: Some(games(&[(11, 3), (11, 4)])),
            },
            &captain_a,
            SystemTime::UNIX_EPOCH,
        )
        .unwrap_err();
        assert_eq!(err, TransitionError::NotOrganizer { command: "finalize" });
    }

    #[test]
    fn correction_after_submission_flags_resubmission() {
        let Fixture {
            mut entity,
            organizer,
            ..
        } = fixture();
        step(
            &mut entity,
            ScoreCommand::Finalize {
                override_games: Some(games(&[(11, 7), (9, 11), (11, 8)])),
            },
            &organizer,
        );
        entity.submission.submitted = true;

        let err = plan_transition(
            &entity,
            &ScoreCommand::Correct {
                games: games(&[(11, 7), (11, 9)]),
                reason: None,
            },
            &organizer,
            SystemTime::UNIX_EPOCH,
        )
        .unwrap_err();
        assert_eq!(err, TransitionError::ReasonRequired { command: "correct" });

        step(
            &mut entity,
            ScoreCommand::Correct {
                games: games(&[(11, 7), (11, 9)]),
                reason: Some("game 2 was misreported".into()),
            },
            &organizer,
        );
        assert_eq!(entity.official_results.len(), 2);
        assert_eq!(entity.official_result().unwrap().version, 2);
        assert_eq!(entity.official_results[0].games.len(), 3);
        assert!(entity.submission.needs_correction);
        assert!(!entity.submission.correction_submitted);
        assert_eq!(entity.score_state, ScoreState::Official);
    }

    #[test]
    fn stale_plan_is_rejected() {
        let Fixture {
            mut entity,
            captain_a,
            ..
        } = fixture();
        let command = ScoreCommand::Propose {
            games: games(&[(11, 3), (11, 4)]),
        };
        let plan = plan_transition(&entity, &command, &captain_a, SystemTime::UNIX_EPOCH).unwrap();
        entity.revision = 7;
        assert_eq!(
            apply_plan(&mut entity, plan, SystemTime::UNIX_EPOCH),
            Err(ApplyError::VersionMismatch {
                expected: 0,
                actual: 7
            })
        );
    }
}
