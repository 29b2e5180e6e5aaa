//! Scoring rule engine. Everything here is pure so it can gate every state transition.

use thiserror::Error;

use crate::dao::models::{GameScore, GameSettings, Side, WinBy};

/// Highest point total a single game may record.
pub const MAX_GAME_POINTS: u32 = 999;

/// Why a single game score is not acceptable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoreError {
    #[error("scores must be whole numbers")]
    NotInteger,
    #[error("scores cannot be negative")]
    Negative,
    #[error("scores cannot exceed {max} points")]
    TooHigh { max: u32 },
    #[error("a game cannot end in a tie ({score}-{score})")]
    Tie { score: i64 },
    #[error("the winner must reach {target} points (got {winning})")]
    BelowTarget { target: u32, winning: i64 },
    #[error("a game won at {target} needs a 2-point margin (got {winning}-{losing})")]
    MarginTooSmall {
        target: u32,
        winning: i64,
        losing: i64,
    },
    #[error("past {target} the game ends on a 2-point margin (got {winning}-{losing})")]
    DeuceMargin {
        target: u32,
        winning: i64,
        losing: i64,
    },
    #[error("games to {target} win by 1 cannot go past {target} (got {winning})")]
    ExceedsTarget { target: u32, winning: i64 },
    #[error("games are capped at {cap} (got {winning})")]
    ExceedsCap { cap: u32, winning: i64 },
}

/// Why a full set of game scores cannot stand as a match result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchScoreError {
    #[error("at least one game score is required")]
    NoGames,
    #[error("best of {best_of} allows at most {best_of} games (got {count})")]
    TooManyGames { count: usize, best_of: usize },
    #[error("game {game_number}: {source}")]
    InvalidGame {
        game_number: u8,
        #[source]
        source: ScoreError,
    },
    #[error("games must be numbered 1, 2, 3... in order (position {position} is game {game_number})")]
    OutOfSequence { position: usize, game_number: u8 },
    #[error("match is incomplete: {games_a}-{games_b} in games, {needed} needed to win")]
    Incomplete {
        games_a: u32,
        games_b: u32,
        needed: usize,
    },
}

/// Advisory findings that do not block a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoreWarning {
    /// Games were recorded after one side had already won the match.
    GamesAfterDecided { decided_after: usize, recorded: usize },
}

impl ScoreWarning {
    pub fn message(&self) -> String {
        match self {
            ScoreWarning::GamesAfterDecided {
                decided_after,
                recorded,
            } => format!(
                "match was decided after game {decided_after} but {recorded} games were recorded"
            ),
        }
    }
}

/// Per-side tally of a set of game scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchTally {
    pub winner: Option<Side>,
    pub games_a: u32,
    pub games_b: u32,
    pub points_a: u32,
    pub points_b: u32,
}

/// A complete, valid match result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedMatch {
    pub winner: Side,
    pub tally: MatchTally,
    pub warnings: Vec<ScoreWarning>,
}

/// Validate one game's raw scores against the configured rules.
///
/// With `win_by = 2` a score exactly at `cap_at` is accepted with any margin, so 15-14 stands
/// when games are capped at 15.
pub fn validate_game_score(
    score_a: i64,
    score_b: i64,
    settings: &GameSettings,
) -> Result<(), ScoreError> {
    if score_a < 0 || score_b < 0 {
        return Err(ScoreError::Negative);
    }
    if score_a.max(score_b) > i64::from(MAX_GAME_POINTS) {
        return Err(ScoreError::TooHigh {
            max: MAX_GAME_POINTS,
        });
    }
    if score_a == score_b {
        return Err(ScoreError::Tie { score: score_a });
    }

    let winning = score_a.max(score_b);
    let losing = score_a.min(score_b);
    let target = settings.points_per_game;
    let target_i = i64::from(target);

    if winning < target_i {
        return Err(ScoreError::BelowTarget { target, winning });
    }

    match settings.win_by {
        WinBy::One => {
            if winning > target_i {
                return Err(ScoreError::ExceedsTarget { target, winning });
            }
            Ok(())
        }
        WinBy::Two => {
            if winning == target_i {
                if losing > target_i - 2 {
                    return Err(ScoreError::MarginTooSmall {
                        target,
                        winning,
                        losing,
                    });
                }
                return Ok(());
            }

            if let Some(cap) = settings.cap_at {
                let cap_i = i64::from(cap);
                if winning > cap_i {
                    return Err(ScoreError::ExceedsCap { cap, winning });
                }
                if winning == cap_i {
                    return Ok(());
                }
            }

            if winning - losing != 2 {
                return Err(ScoreError::DeuceMargin {
                    target,
                    winning,
                    losing,
                });
            }
            Ok(())
        }
    }
}

/// Tally game and point totals; a side wins once it reaches `ceil(best_of / 2)` games.
pub fn calculate_match_winner(scores: &[GameScore], settings: &GameSettings) -> MatchTally {
    let needed = settings.best_of.games_to_win() as u32;
    let mut tally = MatchTally {
        winner: None,
        games_a: 0,
        games_b: 0,
        points_a: 0,
        points_b: 0,
    };

    for game in scores {
        tally.points_a = tally.points_a.saturating_add(game.score_a);
        tally.points_b = tally.points_b.saturating_add(game.score_b);
        match game.winner() {
            Some(Side::A) => tally.games_a += 1,
            Some(Side::B) => tally.games_b += 1,
            None => {}
        }
        if tally.winner.is_none() {
            if tally.games_a >= needed {
                tally.winner = Some(Side::A);
            } else if tally.games_b >= needed {
                tally.winner = Some(Side::B);
            }
        }
    }

    tally
}

/// Validate every game, the game count and completeness of a whole match.
pub fn validate_match_scores(
    scores: &[GameScore],
    settings: &GameSettings,
) -> Result<ValidatedMatch, MatchScoreError> {
    if scores.is_empty() {
        return Err(MatchScoreError::NoGames);
    }

    let best_of = settings.best_of.games();
    if scores.len() > best_of {
        return Err(MatchScoreError::TooManyGames {
            count: scores.len(),
            best_of,
        });
    }

    check_game_sequence(scores)?;
    for game in scores {
        validate_game_score(i64::from(game.score_a), i64::from(game.score_b), settings).map_err(
            |source| MatchScoreError::InvalidGame {
                game_number: game.game_number,
                source,
            },
        )?;
    }

    let tally = calculate_match_winner(scores, settings);
    let Some(winner) = tally.winner else {
        return Err(MatchScoreError::Incomplete {
            games_a: tally.games_a,
            games_b: tally.games_b,
            needed: settings.best_of.games_to_win(),
        });
    };

    let mut warnings = Vec::new();
    if let Some(decided_after) = decided_after_game(scores, settings)
        && decided_after < scores.len()
    {
        warnings.push(ScoreWarning::GamesAfterDecided {
            decided_after,
            recorded: scores.len(),
        });
    }

    Ok(ValidatedMatch {
        winner,
        tally,
        warnings,
    })
}

/// Games must be numbered `1..=n` in the order they were played.
pub fn check_game_sequence(scores: &[GameScore]) -> Result<(), MatchScoreError> {
    for (index, game) in scores.iter().enumerate() {
        if usize::from(game.game_number) != index + 1 {
            return Err(MatchScoreError::OutOfSequence {
                position: index + 1,
                game_number: game.game_number,
            });
        }
    }
    Ok(())
}

/// Number of games after which the match was mathematically decided.
fn decided_after_game(scores: &[GameScore], settings: &GameSettings) -> Option<usize> {
    let needed = settings.best_of.games_to_win();
    let (mut won_a, mut won_b) = (0, 0);
    for (index, game) in scores.iter().enumerate() {
        match game.winner() {
            Some(Side::A) => won_a += 1,
            Some(Side::B) => won_b += 1,
            None => {}
        }
        if won_a >= needed || won_b >= needed {
            return Some(index + 1);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{BestOf, PlayType};

    fn settings(win_by: WinBy, cap_at: Option<u32>) -> GameSettings {
        GameSettings {
            points_per_game: 11,
            win_by,
            best_of: BestOf::Three,
            cap_at,
            play_type: PlayType::Doubles,
        }
    }

    fn games(scores: &[(u32, u32)]) -> Vec<GameScore> {
        scores
            .iter()
            .enumerate()
            .map(|(i, (a, b))| GameScore::new(i as u8 + 1, *a, *b))
            .collect()
    }

    #[test]
    fn win_by_two_at_target() {
        let s = settings(WinBy::Two, None);
        assert!(validate_game_score(11, 9, &s).is_ok());
        assert!(validate_game_score(3, 11, &s).is_ok());
        assert_eq!(
            validate_game_score(11, 10, &s),
            Err(ScoreError::MarginTooSmall {
                target: 11,
                winning: 11,
                losing: 10
            })
        );
    }

    #[test]
    fn deuce_requires_exact_two_point_margin() {
        let s = settings(WinBy::Two, None);
        assert!(validate_game_score(12, 10, &s).is_ok());
        assert!(validate_game_score(14, 16, &s).is_ok());
        assert!(matches!(
            validate_game_score(13, 10, &s),
            Err(ScoreError::DeuceMargin { .. })
        ));
        assert!(matches!(
            validate_game_score(13, 12, &s),
            Err(ScoreError::DeuceMargin { .. })
        ));
    }

    #[test]
    fn cap_accepts_one_point_margin_only_at_the_cap() {
        let s = settings(WinBy::Two, Some(15));
        assert!(validate_game_score(15, 14, &s).is_ok());
        assert!(validate_game_score(14, 12, &s).is_ok());
        assert!(matches!(
            validate_game_score(14, 13, &s),
            Err(ScoreError::DeuceMargin { .. })
        ));
        assert_eq!(
            validate_game_score(16, 14, &s),
            Err(ScoreError::ExceedsCap {
                cap: 15,
                winning: 16
            })
        );
    }

    #[test]
    fn win_by_one_must_stop_at_target() {
        let s = settings(WinBy::One, None);
        assert!(validate_game_score(11, 10, &s).is_ok());
        assert!(matches!(
            validate_game_score(12, 10, &s),
            Err(ScoreError::ExceedsTarget { .. })
        ));
    }

    #[test]
    fn rejects_ties_negatives_and_short_games() {
        let s = settings(WinBy::Two, None);
        assert_eq!(validate_game_score(-1, 11, &s), Err(ScoreError::Negative));
        assert_eq!(validate_game_score(11, 11, &s), Err(ScoreError::Tie { score: 11 }));
        assert!(matches!(
            validate_game_score(9, 7, &s),
            Err(ScoreError::BelowTarget { .. })
        ));
    }

    #[test]
    fn match_winner_best_of_three() {
        let s = settings(WinBy::Two, None);
        let tally = calculate_match_winner(&games(&[(11, 5), (9, 11), (11, 7)]), &s);
        assert_eq!(tally.winner, Some(Side::A));
        assert_eq!((tally.games_a, tally.games_b), (2, 1));
        assert_eq!((tally.points_a, tally.points_b), (31, 23));
    }

    #[test]
    fn match_validation_rejects_extra_and_incomplete_sets() {
        let s = settings(WinBy::Two, None);
        assert!(matches!(
            validate_match_scores(&games(&[(11, 5), (5, 11), (11, 7), (11, 2)]), &s),
            Err(MatchScoreError::TooManyGames { count: 4, best_of: 3 })
        ));
        assert!(matches!(
            validate_match_scores(&games(&[(11, 5), (5, 11)]), &s),
            Err(MatchScoreError::Incomplete { .. })
        ));
        assert!(matches!(
            validate_match_scores(&games(&[(11, 5), (11, 10)]), &s),
            Err(MatchScoreError::InvalidGame { game_number: 2, .. })
        ));
        assert_eq!(validate_match_scores(&[], &s), Err(MatchScoreError::NoGames));
    }

    #[test]
    fn rejects_scores_past_the_points_ceiling() {
        let s = settings(WinBy::Two, None);
        assert!(validate_game_score(999, 997, &s).is_ok());
        assert_eq!(
            validate_game_score(4_000_000_000, 3_999_999_998, &s),
            Err(ScoreError::TooHigh { max: MAX_GAME_POINTS })
        );
        assert!(matches!(
            validate_match_scores(
                &games(&[(4_000_000_000, 3_999_999_998), (4_000_000_000, 3_999_999_998)]),
                &s
            ),
            Err(MatchScoreError::InvalidGame { game_number: 1, .. })
        ));
    }

    #[test]
    fn point_totals_saturate_instead_of_wrapping() {
        let s = settings(WinBy::Two, None);
        let tally = calculate_match_winner(&games(&[(u32::MAX, 3), (u32::MAX, 5)]), &s);
        assert_eq!(tally.points_a, u32::MAX);
        assert_eq!(tally.points_b, 8);
        assert_eq!(tally.winner, Some(Side::A));
    }

    #[test]
    fn games_must_be_numbered_in_order() {
        let s = settings(WinBy::Two, None);
        let repeated = vec![GameScore::new(1, 11, 5), GameScore::new(1, 11, 7)];
        assert_eq!(
            validate_match_scores(&repeated, &s),
            Err(MatchScoreError::OutOfSequence {
                position: 2,
                game_number: 1
            })
        );
        let swapped = vec![GameScore::new(2, 11, 5), GameScore::new(1, 11, 7)];
        assert!(matches!(
            validate_match_scores(&swapped, &s),
            Err(MatchScoreError::OutOfSequence { position: 1, .. })
        ));
    }

    #[test]
    fn warns_when_games_follow_a_decided_match() {
        let s = settings(WinBy::Two, None);
        let validated = validate_match_scores(&games(&[(11, 5), (11, 7), (4, 11)]), &s).unwrap();
        assert_eq!(validated.winner, Side::A);
        assert_eq!(
            validated.warnings,
            vec![ScoreWarning::GamesAfterDecided {
                decided_after: 2,
                recorded: 3
            }]
        );
    }
}
