use chrono::{DateTime, Utc};

use crate::db::{RepoResult, Repository};
use crate::models::{HitType, Prediction, PredictionQuality, QualityReport, QualityStats, Score};
use crate::services::predictor::PredictionEngine;

/// Classifies a prediction against the final score of its match.
pub fn score_match(prediction: &Prediction, actual: Score, calculated_at: DateTime<Utc>) -> PredictionQuality {
    let predicted = prediction.predicted_score;
    let exact_score_correct = predicted == actual;
    let tendency_correct = predicted.tendency() == actual.tendency();

    let hit_type = if exact_score_correct {
        HitType::ExactMatch
    } else if tendency_correct {
        HitType::TendencyMatch
    } else {
        HitType::Miss
    };

    PredictionQuality {
        match_id: prediction.match_id,
        predicted_score: predicted,
        actual_score: actual,
        predicted_home_win_probability: prediction.home_win_probability,
        predicted_draw_probability: prediction.draw_probability,
        predicted_away_win_probability: prediction.away_win_probability,
        hit_type,
        tendency_correct,
        exact_score_correct,
        calculated_at,
    }
}

pub fn aggregate_stats(records: &[PredictionQuality]) -> QualityStats {
    let total = records.len() as u32;
    if total == 0 {
        return QualityStats::default();
    }

    let count = |hit: HitType| records.iter().filter(|r| r.hit_type == hit).count() as u32;
    let exact = count(HitType::ExactMatch);
    let tendency = count(HitType::TendencyMatch);
    let miss = count(HitType::Miss);
    let total_f = total as f64;

    QualityStats {
        total,
        exact,
        tendency,
        miss,
        exact_rate: exact as f64 / total_f,
        tendency_rate: tendency as f64 / total_f,
        overall_accuracy: (exact + tendency) as f64 / total_f,
        quality_score: (exact * 3 + tendency) as f64 / (total_f * 3.0),
    }
}

/// Scores finished matches of one season and is the only writer of quality rows.
///
/// A match is scored against the prediction stored for it. When none was stored
/// before the final whistle, one is computed through the [`PredictionEngine`] from
/// results known at kickoff, so the match's own result never leaks into its prediction.
#[derive(Clone)]
pub struct QualityBacktester {
    repo: Repository,
    engine: PredictionEngine,
    season: String,
}

impl QualityBacktester {
    pub fn new(repo: Repository, engine: PredictionEngine, season: String) -> Self {
        Self { repo, engine, season }
    }

    /// Scores finished matches that have no quality row yet, or whose result changed since
    /// they were scored. Returns how many were scored.
    pub async fn backfill(&self) -> RepoResult<usize> {
        let pending = self.repo.get_finished_matches_to_score(&self.season).await?;
        let mut scored = 0;

        for fixture in &pending {
            let Some(actual) = fixture.score() else {
                continue;
            };

            let prediction = match self.repo.get_prediction(fixture.id).await? {
                Some(stored) => stored,
                None => self.engine.refresh_prediction(fixture).await?,
            };

            let quality = score_match(&prediction, actual, Utc::now());
            self.repo.save_prediction_quality(&quality).await?;
            scored += 1;
        }

        if scored > 0 {
            tracing::info!("Scored {} finished matches against their predictions", scored);
        }
        Ok(scored)
    }

    pub async fn report(&self) -> RepoResult<QualityReport> {
        let entries = self.repo.get_prediction_quality_for_season(&self.season).await?;
        let stats = aggregate_stats(&entries);
        Ok(QualityReport { entries, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PredictionInputs;

    fn prediction(home: u32, away: u32) -> Prediction {
        Prediction {
            match_id: 1,
            home_team_id: 10,
            away_team_id: 20,
            home_win_probability: 0.5,
            draw_probability: 0.2,
            away_win_probability: 0.3,
            predicted_score: Score::new(home, away),
            inputs: PredictionInputs {
                home_form: 0.5,
                away_form: 0.5,
                home_goal_rate: 0.0,
                away_goal_rate: 0.0,
                window_size: 14,
            },
            algorithm_version: "test".into(),
            calculated_at: Utc::now(),
        }
    }

    fn assert_consistent(q: &PredictionQuality) {
        match q.hit_type {
            HitType::ExactMatch => assert!(q.tendency_correct && q.exact_score_correct),
            HitType::TendencyMatch => assert!(q.tendency_correct && !q.exact_score_correct),
            HitType::Miss => assert!(!q.tendency_correct && !q.exact_score_correct),
        }
    }

    #[test]
    fn classifies_exact_tendency_and_miss() {
        let actual = Score::new(2, 1);
        let exact = score_match(&prediction(2, 1), actual, Utc::now());
        let tendency = score_match(&prediction(1, 0), actual, Utc::now());
        let miss = score_match(&prediction(0, 1), actual, Utc::now());

        assert_eq!(exact.hit_type, HitType::ExactMatch);
        assert_eq!(tendency.hit_type, HitType::TendencyMatch);
        assert_eq!(miss.hit_type, HitType::Miss);
        for q in [&exact, &tendency, &miss] {
            assert_consistent(q);
        }
    }

    #[test]
    fn draws_share_a_tendency() {
        let q = score_match(&prediction(0, 0), Score::new(3, 3), Utc::now());
        assert_eq!(q.hit_type, HitType::TendencyMatch);
        assert_consistent(&q);
    }

    #[test]
    fn aggregate_of_nothing_is_all_zero() {
        let stats = aggregate_stats(&[]);
        assert_eq!(stats, QualityStats::default());
        assert_eq!(stats.quality_score, 0.0);
        assert!(!stats.exact_rate.is_nan());
    }

    #[test]
    fn aggregate_weights_exact_hits_three_times() {
        let actual = Score::new(2, 1);
        let records = vec![
            score_match(&prediction(2, 1), actual, Utc::now()),
            score_match(&prediction(1, 0), actual, Utc::now()),
            score_match(&prediction(3, 1), actual, Utc::now()),
            score_match(&prediction(0, 2), actual, Utc::now()),
        ];
        let stats = aggregate_stats(&records);

        assert_eq!((stats.total, stats.exact, stats.tendency, stats.miss), (4, 1, 2, 1));
        assert_eq!(stats.exact_rate, 0.25);
        assert_eq!(stats.tendency_rate, 0.5);
        assert_eq!(stats.overall_accuracy, 0.75);
        assert!((stats.quality_score - 5.0 / 12.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn backfill_scores_each_finished_match_once() {
        use crate::db::tests::finished;
        use crate::services::statistics::StatisticsEngine;

        let repo = Repository::in_memory().await.unwrap();
        for record in [finished(1, 1, 2, 0, (2, 0)), finished(2, 2, 1, 7, (1, 1))] {
            repo.upsert_team(&record.home).await.unwrap();
            repo.upsert_team(&record.away).await.unwrap();
            repo.upsert_match(&record).await.unwrap();
        }
        let stats = StatisticsEngine::new(repo.clone(), vec!["2025".into()], 14);
        let engine = PredictionEngine::new(repo.clone(), stats);
        let backtester = QualityBacktester::new(repo.clone(), engine, "2025".into());

        assert_eq!(backtester.backfill().await.unwrap(), 2);
        assert_eq!(backtester.backfill().await.unwrap(), 0);

        // First match had no history: neutral 0:0 prediction against a 2:0 home win.
        let report = backtester.report().await.unwrap();
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[0].predicted_score, Score::new(0, 0));
        assert_eq!(report.entries[0].hit_type, HitType::Miss);
        assert!(repo.get_prediction(1).await.unwrap().is_some());
        for entry in &report.entries {
            assert_consistent(entry);
        }
    }

    #[tokio::test]
    async fn corrected_result_is_rescored() {
        use crate::db::tests::finished;
        use crate::services::statistics::StatisticsEngine;

        let repo = Repository::in_memory().await.unwrap();
        let original = finished(1, 1, 2, 0, (1, 0));
        repo.upsert_team(&original.home).await.unwrap();
        repo.upsert_team(&original.away).await.unwrap();
        repo.upsert_match(&original).await.unwrap();

        let stats = StatisticsEngine::new(repo.clone(), vec!["2025".into()], 14);
        let engine = PredictionEngine::new(repo.clone(), stats);
        let backtester = QualityBacktester::new(repo.clone(), engine, "2025".into());
        assert_eq!(backtester.backfill().await.unwrap(), 1);

        let corrected = finished(1, 1, 2, 0, (0, 0));
        repo.upsert_match(&corrected).await.unwrap();
        assert_eq!(backtester.backfill().await.unwrap(), 1);
        assert_eq!(backtester.backfill().await.unwrap(), 0);

        // Neutral 0:0 prediction now matches the corrected result exactly.
        let report = backtester.report().await.unwrap();
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].actual_score, Score::new(0, 0));
        assert_eq!(report.entries[0].hit_type, HitType::ExactMatch);
        assert_eq!(report.stats.exact, 1);
    }
}
