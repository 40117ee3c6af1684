use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::Tendency;

pub type TeamId = i64;
pub type MatchId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub short_name: String,
    pub logo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub kickoff: DateTime<Utc>,
    pub matchday: i32,
    pub season: String,
    pub finished: bool,
    pub home_goals: Option<i32>,
    pub away_goals: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_synced: DateTime<Utc>,
}

impl Match {
    /// Final score, present only when both goal counts are stored.
    pub fn score(&self) -> Option<Score> {
        match (self.home_goals, self.away_goals) {
            (Some(home), Some(away)) if home >= 0 && away >= 0 => Some(Score::new(home as u32, away as u32)),
            _ => None,
        }
    }

    /// (goals scored, goals conceded) from `team_id`'s side.
    pub fn goals_from_perspective(&self, team_id: TeamId) -> Option<(u32, u32)> {
        let score = self.score()?;
        if self.home_team_id == team_id {
            Some((score.home, score.away))
        } else if self.away_team_id == team_id {
            Some((score.away, score.home))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

impl Score {
    pub fn new(home: u32, away: u32) -> Self {
        Self { home, away }
    }

    pub fn tendency(&self) -> Tendency {
        Tendency::from_goals(self.home, self.away)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.home, self.away)
    }
}

impl FromStr for Score {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (home, away) = s
            .split_once(':')
            .ok_or_else(|| format!("score '{}' is not in H:A form", s))?;
        let home = home.trim().parse().map_err(|_| format!("bad home goals in '{}'", s))?;
        let away = away.trim().parse().map_err(|_| format!("bad away goals in '{}'", s))?;
        Ok(Score::new(home, away))
    }
}

// ── Records coming in from the external source ──────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRecord {
    pub id: TeamId,
    pub name: String,
    pub short_name: String,
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub id: MatchId,
    pub home: TeamRecord,
    pub away: TeamRecord,
    pub kickoff: DateTime<Utc>,
    pub matchday: i32,
    pub season: String,
    pub finished: bool,
    /// Final score; `None` until the source reports one.
    pub score: Option<Score>,
}

// ── Predictions ─────────────────────────────────────────────────────────────

/// Statistical inputs a prediction was computed from, stored for auditability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionInputs {
    pub home_form: f64,
    pub away_form: f64,
    pub home_goal_rate: f64,
    pub away_goal_rate: f64,
    pub window_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub match_id: MatchId,
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub home_win_probability: f64,
    pub draw_probability: f64,
    pub away_win_probability: f64,
    pub predicted_score: Score,
    pub inputs: PredictionInputs,
    pub algorithm_version: String,
    pub calculated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitType {
    ExactMatch,
    TendencyMatch,
    Miss,
}

impl HitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HitType::ExactMatch => "exact_match",
            HitType::TendencyMatch => "tendency_match",
            HitType::Miss => "miss",
        }
    }

    /// Points awarded for the hit: 3 exact, 1 tendency, 0 miss.
    pub fn points(&self) -> u32 {
        match self {
            HitType::ExactMatch => 3,
            HitType::TendencyMatch => 1,
            HitType::Miss => 0,
        }
    }
}

impl FromStr for HitType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact_match" => Ok(HitType::ExactMatch),
            "tendency_match" => Ok(HitType::TendencyMatch),
            "miss" => Ok(HitType::Miss),
            other => Err(format!("unknown hit type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionQuality {
    pub match_id: MatchId,
    pub predicted_score: Score,
    pub actual_score: Score,
    pub predicted_home_win_probability: f64,
    pub predicted_draw_probability: f64,
    pub predicted_away_win_probability: f64,
    pub hit_type: HitType,
    pub tendency_correct: bool,
    pub exact_score_correct: bool,
    pub calculated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityStats {
    pub total: u32,
    pub exact: u32,
    pub tendency: u32,
    pub miss: u32,
    pub exact_rate: f64,
    pub tendency_rate: f64,
    pub overall_accuracy: f64,
    pub quality_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub entries: Vec<PredictionQuality>,
    pub stats: QualityStats,
}

// ── Sync bookkeeping ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Teams,
    Matches,
}

impl EntityType {
    pub const ALL: [EntityType; 2] = [EntityType::Teams, EntityType::Matches];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Teams => "teams",
            EntityType::Matches => "matches",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "teams" => Ok(EntityType::Teams),
            "matches" => Ok(EntityType::Matches),
            other => Err(format!("unknown entity type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub entity_type: String,
    pub last_sync: DateTime<Utc>,
    pub success: bool,
    pub message: String,
    pub records_synced: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Success,
    PartialFailure,
    Failure,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub entity: EntityType,
    pub outcome: SyncOutcome,
    /// Records written successfully, changed or not.
    pub synced: usize,
    /// Records actually inserted or updated.
    pub changed: usize,
    pub errors: Vec<String>,
    pub skipped: bool,
}

impl SyncResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, SyncOutcome::Success | SyncOutcome::Skipped)
    }
}

// ── Read models ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    pub position: u32,
    pub team_id: TeamId,
    pub team_name: String,
    pub played: u32,
    pub won: u32,
    pub drawn: u32,
    pub lost: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub goal_difference: i64,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchdayInfo {
    pub season: String,
    pub current_matchday: i32,
    pub next_matchday: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub teams: i64,
    pub matches: i64,
    pub finished_matches: i64,
    pub predictions: i64,
    pub prediction_quality: i64,
}

// API Response types
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }

    /// Failure that still carries a structured payload (per-entity sync detail).
    pub fn failure(message: String, data: T) -> Self {
        Self {
            success: false,
            data: Some(data),
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_parses_and_formats() {
        let score: Score = "2:1".parse().unwrap();
        assert_eq!(score, Score::new(2, 1));
        assert_eq!(score.to_string(), "2:1");
        assert!("2-1".parse::<Score>().is_err());
    }

    #[test]
    fn hit_type_round_trips_through_storage_names() {
        for hit in [HitType::ExactMatch, HitType::TendencyMatch, HitType::Miss] {
            assert_eq!(hit.as_str().parse::<HitType>().unwrap(), hit);
        }
    }

    #[test]
    fn entity_type_is_case_insensitive() {
        assert_eq!("Teams".parse::<EntityType>().unwrap(), EntityType::Teams);
        assert!("players".parse::<EntityType>().is_err());
    }
}
