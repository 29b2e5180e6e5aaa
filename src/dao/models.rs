use std::{fmt, time::SystemTime};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// One of the two sides of a match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    A,
    B,
}

impl Side {
    /// The opposing side.
    pub fn opponent(self) -> Self {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => f.write_str("side A"),
            Side::B => f.write_str("side B"),
        }
    }
}

/// Raw point totals of a single game.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct GameScore {
    /// 1-based index of the game inside the match.
    pub game_number: u8,
    pub score_a: u32,
    pub score_b: u32,
}

impl GameScore {
    pub fn new(game_number: u8, score_a: u32, score_b: u32) -> Self {
        Self {
            game_number,
            score_a,
            score_b,
        }
    }

    /// Side holding the higher score, `None` for a tie.
    pub fn winner(&self) -> Option<Side> {
        match self.score_a.cmp(&self.score_b) {
            std::cmp::Ordering::Greater => Some(Side::A),
            std::cmp::Ordering::Less => Some(Side::B),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// Margin a game must be won by.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "u8", into = "u8")]
pub enum WinBy {
    One,
    Two,
}

impl TryFrom<u8> for WinBy {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(WinBy::One),
            2 => Ok(WinBy::Two),
            other => Err(format!("win_by must be 1 or 2 (got {other})")),
        }
    }
}

impl From<WinBy> for u8 {
    fn from(value: WinBy) -> Self {
        match value {
            WinBy::One => 1,
            WinBy::Two => 2,
        }
    }
}

/// Number of games a match is played over.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "u8", into = "u8")]
pub enum BestOf {
    One,
    Three,
    Five,
}

impl BestOf {
    pub fn games(self) -> usize {
        match self {
            BestOf::One => 1,
            BestOf::Three => 3,
            BestOf::Five => 5,
        }
    }

    /// Game wins needed to take the match (`ceil(best_of / 2)`).
    pub fn games_to_win(self) -> usize {
        self.games().div_ceil(2)
    }
}

impl TryFrom<u8> for BestOf {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(BestOf::One),
            3 => Ok(BestOf::Three),
            5 => Ok(BestOf::Five),
            other => Err(format!("best_of must be 1, 3 or 5 (got {other})")),
        }
    }
}

impl From<BestOf> for u8 {
    fn from(value: BestOf) -> Self {
        value.games() as u8
    }
}

/// Nominal play type configured on the event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlayType {
    Singles,
    Doubles,
    MixedDoubles,
}

/// Scoring rules of a match. Immutable once the match is created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSettings {
    pub points_per_game: u32,
    pub win_by: WinBy,
    pub best_of: BestOf,
    #[serde(default)]
    pub cap_at: Option<u32>,
    pub play_type: PlayType,
}

/// Workflow position of a match score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScoreState {
    #[default]
    None,
    Proposed,
    Signed,
    Disputed,
    Official,
}

/// Participant-submitted score awaiting confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreProposal {
    pub games: Vec<GameScore>,
    pub proposed_by: Uuid,
    pub proposed_by_side: Side,
    pub proposed_at: SystemTime,
    #[serde(default)]
    pub confirmed_by: Option<Uuid>,
    #[serde(default)]
    pub confirmed_at: Option<SystemTime>,
    #[serde(default)]
    pub dispute_reason: Option<String>,
}

/// One version of the organizer-finalized result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OfficialResult {
    /// Monotonic version, starting at 1.
    pub version: u32,
    pub games: Vec<GameScore>,
    pub winner: Side,
    pub games_a: u32,
    pub games_b: u32,
    pub points_a: u32,
    pub points_b: u32,
    pub finalized_by: Uuid,
    pub finalized_at: SystemTime,
    /// Whether the organizer replaced the participants' proposal.
    pub overridden: bool,
    pub score_locked: bool,
    #[serde(default)]
    pub correction_reason: Option<String>,
}

/// Kind of workflow step recorded in the audit log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Proposed,
    Confirmed,
    Disputed,
    Finalized,
    Corrected,
}

/// Immutable audit log entry. Entries are only ever appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEntry {
    pub timestamp: SystemTime,
    pub action: AuditAction,
    pub actor_id: Uuid,
    pub actor_name: String,
    #[serde(default)]
    pub team_id: Option<Uuid>,
    pub details: String,
    #[serde(default)]
    pub score_snapshot: Option<Vec<GameScore>>,
}

/// Downstream submission bookkeeping embedded in each match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SubmissionRecord {
    pub submitted: bool,
    #[serde(default)]
    pub submitted_at: Option<SystemTime>,
    #[serde(default)]
    pub submission_id: Option<String>,
    #[serde(default)]
    pub submission_error: Option<String>,
    pub attempt_count: u32,
    pub pending_submission: bool,
    pub needs_correction: bool,
    pub correction_submitted: bool,
}

/// A side as scheduled by the owning event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SideEntity {
    /// Team (or single entrant) identifier.
    pub id: Uuid,
    pub name: String,
    /// Local profile ids of the players on this side.
    pub player_ids: Vec<Uuid>,
}

/// Category of event owning a match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Tournament,
    League,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Tournament => "tournament",
            EventType::League => "league",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies the event a match belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub event_type: EventType,
    pub event_id: Uuid,
}

/// Concrete origin of a scorable match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchOrigin {
    /// Bracket or pool match inside a tournament division.
    Tournament {
        tournament_id: Uuid,
        division: String,
        round: u32,
    },
    /// Individual league match between two entrants.
    League { league_id: Uuid, week: u32 },
    /// One board of a team-league fixture; every board is scored independently.
    FixtureBoard {
        league_id: Uuid,
        fixture_id: Uuid,
        board: String,
    },
}

impl MatchOrigin {
    /// Event owning the match.
    pub fn event_key(&self) -> EventKey {
        match self {
            MatchOrigin::Tournament { tournament_id, .. } => EventKey {
                event_type: EventType::Tournament,
                event_id: *tournament_id,
            },
            MatchOrigin::League { league_id, .. } | MatchOrigin::FixtureBoard { league_id, .. } => {
                EventKey {
                    event_type: EventType::League,
                    event_id: *league_id,
                }
            }
        }
    }
}

/// Scheduling status of the match itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
}

/// Persisted match document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchEntity {
    pub id: Uuid,
    /// Optimistic-concurrency counter, bumped on every write.
    pub revision: u64,
    pub origin: MatchOrigin,
    pub side_a: SideEntity,
    pub side_b: SideEntity,
    pub settings: GameSettings,
    #[serde(default)]
    pub status: MatchStatus,
    #[serde(default)]
    pub score_state: ScoreState,
    #[serde(default)]
    pub score_proposal: Option<ScoreProposal>,
    /// Every official result version, oldest first.
    #[serde(default)]
    pub official_results: Vec<OfficialResult>,
    #[serde(default)]
    pub audit_log: Vec<AuditEntry>,
    #[serde(default)]
    pub submission: SubmissionRecord,
    /// Cleared for exhibition matches that must never reach the rating service.
    pub rating_eligible: bool,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl MatchEntity {
    /// Latest official result version.
    pub fn official_result(&self) -> Option<&OfficialResult> {
        self.official_results.last()
    }

    pub fn side(&self, side: Side) -> &SideEntity {
        match side {
            Side::A => &self.side_a,
            Side::B => &self.side_b,
        }
    }

    /// Side whose roster contains `team_id`.
    pub fn side_of_team(&self, team_id: Uuid) -> Option<Side> {
        if self.side_a.id == team_id {
            Some(Side::A)
        } else if self.side_b.id == team_id {
            Some(Side::B)
        } else {
            None
        }
    }
}

/// Lifecycle status of a submission batch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    PartialFailure,
}

impl BatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::PartialFailure => "partial_failure",
        }
    }
}

/// Outcome of one match inside a batch attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
    Skipped,
}

/// Per-match result recorded on a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchSubmissionOutcome {
    pub match_id: Uuid,
    pub status: OutcomeStatus,
    #[serde(default)]
    pub submission_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    pub attempted_at: SystemTime,
}

/// History record of one bulk submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmissionBatchEntity {
    pub id: Uuid,
    pub event: EventKey,
    pub match_ids: Vec<Uuid>,
    pub results: Vec<MatchSubmissionOutcome>,
    pub status: BatchStatus,
    pub retry_count: u32,
    #[serde(default)]
    pub next_retry_at: Option<SystemTime>,
    pub requested_by: Uuid,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl SubmissionBatchEntity {
    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Latest recorded outcome for a match.
    pub fn outcome_for(&self, match_id: Uuid) -> Option<&MatchSubmissionOutcome> {
        self.results.iter().find(|r| r.match_id == match_id)
    }
}

/// Inbound notification persisted under its dedupe key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookEventEntity {
    pub dedupe_key: String,
    pub raw_payload: String,
    pub event_type: String,
    pub received_at: SystemTime,
    pub processed: bool,
}

/// Cached external ratings keyed by rating-holder id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RatingSnapshotEntity {
    pub external_id: String,
    #[serde(default)]
    pub singles_rating: Option<f64>,
    #[serde(default)]
    pub doubles_rating: Option<f64>,
    #[serde(default)]
    pub reliability: Option<f64>,
    #[serde(default)]
    pub last_match_id: Option<String>,
    /// Number of applied updates.
    pub revision: u64,
    pub updated_at: SystemTime,
}

/// Local player profile, optionally linked to a rating-holder id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileEntity {
    pub id: Uuid,
    pub display_name: String,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub singles_rating: Option<f64>,
    #[serde(default)]
    pub doubles_rating: Option<f64>,
    #[serde(default)]
    pub reliability: Option<f64>,
    #[serde(default)]
    pub last_synced_at: Option<SystemTime>,
    /// Number of applied writes; guards concurrent relinks, syncs and webhook updates.
    #[serde(default)]
    pub revision: u64,
}
