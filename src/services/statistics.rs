use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{RepoResult, Repository};
use crate::models::{Match, TeamId};
use crate::utils::match_points;

pub const DEFAULT_WINDOW: u32 = 14;

/// Form given to a team with no finished matches in the window.
pub const NEUTRAL_FORM: f64 = 0.5;

/// Form and goal rate of one team over its window of recent results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TeamStatistics {
    pub team_id: TeamId,
    /// Points won over points available, in [0, 1].
    pub form: f64,
    /// Total goals scored across the window, not an average.
    pub goal_rate: f64,
    pub matches_considered: u32,
}

impl TeamStatistics {
    /// Computes statistics from an already-selected window. Matches the team did
    /// not play in, or without a full score, are ignored.
    pub fn from_window(team_id: TeamId, window: &[Match]) -> Self {
        let mut points = 0u32;
        let mut goals = 0u32;
        let mut played = 0u32;

        for m in window {
            if let Some((scored, conceded)) = m.goals_from_perspective(team_id) {
                points += match_points(scored, conceded);
                goals += scored;
                played += 1;
            }
        }

        if played == 0 {
            return Self {
                team_id,
                form: NEUTRAL_FORM,
                goal_rate: 0.0,
                matches_considered: 0,
            };
        }

        Self {
            team_id,
            form: points as f64 / (played * 3) as f64,
            goal_rate: goals as f64,
            matches_considered: played,
        }
    }
}

/// Reads match windows from the repository and runs [`TeamStatistics::from_window`] on them.
#[derive(Clone)]
pub struct StatisticsEngine {
    repo: Repository,
    seasons: Vec<String>,
    window: u32,
}

impl StatisticsEngine {
    pub fn new(repo: Repository, seasons: Vec<String>, window: u32) -> Self {
        Self { repo, seasons, window }
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    /// Statistics over the configured window. With `as_of`, only matches that
    /// kicked off before that instant are considered.
    pub async fn team_statistics(&self, team_id: TeamId, as_of: Option<DateTime<Utc>>) -> RepoResult<TeamStatistics> {
        self.statistics_with_window(team_id, self.window, as_of).await
    }

    pub async fn team_form(&self, team_id: TeamId, window: u32) -> RepoResult<f64> {
        Ok(self.statistics_with_window(team_id, window, None).await?.form)
    }

    pub async fn team_goal_rate(&self, team_id: TeamId, window: u32) -> RepoResult<f64> {
        Ok(self.statistics_with_window(team_id, window, None).await?.goal_rate)
    }

    async fn statistics_with_window(
        &self,
        team_id: TeamId,
        window: u32,
        as_of: Option<DateTime<Utc>>,
    ) -> RepoResult<TeamStatistics> {
        let matches = self
            .repo
            .get_finished_matches(team_id, &self.seasons, window, as_of)
            .await?;
        Ok(TeamStatistics::from_window(team_id, &matches))
    }
}
