use chrono::Duration;

use crate::db::Repository;
use crate::error::ServiceError;
use crate::models::{Prediction, QualityReport};
use crate::services::cache::{CacheKey, CachedValue, ResultCache};
use crate::services::predictor::PredictionEngine;
use crate::services::quality::QualityBacktester;

/// Read-through front for predictions and quality reports. Fresh results are
/// cached per operation; when a computation fails the last cached value is served.
pub struct PredictionService {
    repo: Repository,
    engine: PredictionEngine,
    backtester: QualityBacktester,
    cache: ResultCache,
    season: String,
    prediction_ttl: Duration,
    quality_ttl: Duration,
}

impl PredictionService {
    pub fn new(
        repo: Repository,
        engine: PredictionEngine,
        backtester: QualityBacktester,
        season: String,
        prediction_ttl: Duration,
        quality_ttl: Duration,
    ) -> Self {
        Self {
            repo,
            engine,
            backtester,
            cache: ResultCache::new(),
            season,
            prediction_ttl,
            quality_ttl,
        }
    }

    pub fn engine(&self) -> &PredictionEngine {
        &self.engine
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub async fn get_predictions_for_matchday(&self, matchday: i32) -> Result<Vec<Prediction>, ServiceError> {
        if matchday < 1 {
            return Err(ServiceError::InvalidMatchday(matchday));
        }

        let key = CacheKey::MatchdayPredictions(matchday);
        if let Some(CachedValue::Predictions(cached)) = self.cache.get(&key) {
            tracing::debug!("Cache hit for {}", key);
            return Ok(cached);
        }

        match self.compute_matchday(matchday).await {
            Ok(predictions) => {
                self.cache
                    .put(key, CachedValue::Predictions(predictions.clone()), self.prediction_ttl);
                Ok(predictions)
            }
            Err(e) => match self.cache.get_stale(&key) {
                Some(CachedValue::Predictions(stale)) => {
                    tracing::warn!("Serving stale {} after error: {}", key, e);
                    Ok(stale)
                }
                _ => Err(e),
            },
        }
    }

    pub async fn get_prediction_quality(&self) -> Result<QualityReport, ServiceError> {
        let key = CacheKey::QualitySummary;
        if let Some(CachedValue::Quality(cached)) = self.cache.get(&key) {
            tracing::debug!("Cache hit for {}", key);
            return Ok(cached);
        }

        match self.compute_quality().await {
            Ok(report) => {
                self.cache.put(key, CachedValue::Quality(report.clone()), self.quality_ttl);
                Ok(report)
            }
            Err(e) => match self.cache.get_stale(&key) {
                Some(CachedValue::Quality(stale)) => {
                    tracing::warn!("Serving stale {} after error: {}", key, e);
                    Ok(stale)
                }
                _ => Err(e),
            },
        }
    }

    /// Drops one matchday's predictions, or every cached result when `matchday` is `None`.
    pub fn clear_prediction_cache(&self, matchday: Option<i32>) {
        match matchday {
            Some(day) => self.cache.invalidate(&CacheKey::MatchdayPredictions(day)),
            None => self.cache.invalidate_all(),
        }
    }

    async fn compute_matchday(&self, matchday: i32) -> Result<Vec<Prediction>, ServiceError> {
        let fixtures = self.repo.get_matches_by_matchday(&self.season, matchday).await?;
        let mut predictions = Vec::with_capacity(fixtures.len());
        for fixture in &fixtures {
            predictions.push(self.engine.refresh_prediction(fixture).await?);
        }
        tracing::info!("Computed {} predictions for matchday {}", predictions.len(), matchday);
        Ok(predictions)
    }

    async fn compute_quality(&self) -> Result<QualityReport, ServiceError> {
        self.backtester.backfill().await?;
        Ok(self.backtester.report().await?)
    }
}
