use chrono::{DateTime, Utc};

use crate::db::{RepoResult, Repository};
use crate::models::{Match, MatchId, Prediction, PredictionInputs, Score, TeamId};
use crate::services::statistics::{StatisticsEngine, TeamStatistics};
use crate::utils::normalize_probabilities;

pub const ALGORITHM_VERSION: &str = "form_goals_v1";

pub const HOME_ADVANTAGE: f64 = 0.10;
const BASE_HOME_WIN: f64 = 0.45;
const BASE_AWAY_WIN: f64 = 0.35;
const DRAW: f64 = 0.20;
const MIN_PROBABILITY: f64 = 0.05;
const MAX_PROBABILITY: f64 = 0.90;
const GOAL_DIFF_SCALE: f64 = 20.0;
const MIN_EXPECTED_GOALS: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Probabilities {
    pub home_win: f64,
    pub draw: f64,
    pub away_win: f64,
}

/// Win/draw/loss probabilities from both teams' form and goal rate. Always sums to 1.
pub fn compute_probabilities(home_form: f64, away_form: f64, home_goal_rate: f64, away_goal_rate: f64) -> Probabilities {
    let form_diff = home_form - away_form;
    let goal_diff = (home_goal_rate - away_goal_rate) / GOAL_DIFF_SCALE;

    let home = (BASE_HOME_WIN + form_diff / 3.0 + goal_diff / 4.0 + HOME_ADVANTAGE).clamp(MIN_PROBABILITY, MAX_PROBABILITY);
    let away = (BASE_AWAY_WIN - form_diff / 3.0 - goal_diff / 4.0).clamp(MIN_PROBABILITY, MAX_PROBABILITY);

    // Clamping breaks the sum, so renormalize afterwards.
    let [home_win, draw, away_win] = normalize_probabilities([home, DRAW, away]);
    Probabilities { home_win, draw, away_win }
}

/// Expected goals for one side, rounded half to even so the 0.5 floor predicts 0.
pub fn predicted_goals(goal_rate: f64, form: f64, window: u32) -> u32 {
    let window = window.max(1) as f64;
    let expected = (goal_rate / window * form * 2.0).max(MIN_EXPECTED_GOALS);
    expected.round_ties_even() as u32
}

/// Pure prediction for one fixture from both teams' statistics.
pub fn build_prediction(
    match_id: MatchId,
    home: &TeamStatistics,
    away: &TeamStatistics,
    window: u32,
    calculated_at: DateTime<Utc>,
) -> Prediction {
    let probabilities = compute_probabilities(home.form, away.form, home.goal_rate, away.goal_rate);
    let predicted_score = Score::new(
        predicted_goals(home.goal_rate, home.form, window),
        predicted_goals(away.goal_rate, away.form, window),
    );

    Prediction {
        match_id,
        home_team_id: home.team_id,
        away_team_id: away.team_id,
        home_win_probability: probabilities.home_win,
        draw_probability: probabilities.draw,
        away_win_probability: probabilities.away_win,
        predicted_score,
        inputs: PredictionInputs {
            home_form: home.form,
            away_form: away.form,
            home_goal_rate: home.goal_rate,
            away_goal_rate: away.goal_rate,
            window_size: window,
        },
        algorithm_version: ALGORITHM_VERSION.to_string(),
        calculated_at,
    }
}

/// Computes predictions from repository statistics and is the only writer of stored predictions.
#[derive(Clone)]
pub struct PredictionEngine {
    repo: Repository,
    stats: StatisticsEngine,
}

impl PredictionEngine {
    pub fn new(repo: Repository, stats: StatisticsEngine) -> Self {
        Self { repo, stats }
    }

    pub fn statistics(&self) -> &StatisticsEngine {
        &self.stats
    }

    /// Prediction for `home` vs `away` using results known before `as_of`. Not stored.
    pub async fn predict_match(
        &self,
        match_id: MatchId,
        home: TeamId,
        away: TeamId,
        as_of: Option<DateTime<Utc>>,
    ) -> RepoResult<Prediction> {
        let home_stats = self.stats.team_statistics(home, as_of).await?;
        let away_stats = self.stats.team_statistics(away, as_of).await?;
        Ok(build_prediction(match_id, &home_stats, &away_stats, self.stats.window(), Utc::now()))
    }

    /// Recomputes the prediction for a fixture as of its kickoff and overwrites the stored one.
    pub async fn refresh_prediction(&self, fixture: &Match) -> RepoResult<Prediction> {
        let prediction = self
            .predict_match(fixture.id, fixture.home_team_id, fixture.away_team_id, Some(fixture.kickoff))
            .await?;
        self.repo.save_prediction(&prediction).await?;

        tracing::debug!(
            "Predicted match {}: {} (home {:.1}%, draw {:.1}%, away {:.1}%)",
            fixture.id,
            prediction.predicted_score,
            prediction.home_win_probability * 100.0,
            prediction.draw_probability * 100.0,
            prediction.away_win_probability * 100.0
        );
        Ok(prediction)
    }
}
