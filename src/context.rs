use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::Config;
use crate::db::{RepoResult, Repository};
use crate::models::{EntityType, MatchdayInfo, SyncResult, TableEntry, Team};
use crate::services::lookup::find_team;
use crate::services::openliga::OpenLigaClient;
use crate::services::prediction_service::PredictionService;
use crate::services::predictor::PredictionEngine;
use crate::services::quality::QualityBacktester;
use crate::services::source::MatchSource;
use crate::services::standings::compute_table;
use crate::services::statistics::StatisticsEngine;
use crate::services::sync::SyncOrchestrator;

/// Everything the process shares, built once at startup and passed by reference.
pub struct AppContext {
    pub config: Config,
    pub repo: Repository,
    pub sync: SyncOrchestrator,
    pub predictions: PredictionService,
}

impl AppContext {
    /// Opens the database, creates the schema and wires the OpenLigaDB client.
    pub async fn connect(config: Config) -> Result<Self> {
        let repo = Repository::connect(&config.database_url).await?;
        repo.init_schema().await?;
        Self::with_repository(config, repo)
    }

    /// Like [`AppContext::connect`], but waits once for a store that is not reachable yet.
    /// Used by the long-running server, whose volume may come up after the process.
    pub async fn connect_with_startup_retry(config: Config) -> Result<Self> {
        let repo = Repository::connect_with_retry(&config.database_url, config.startup_retry_delay).await?;
        Self::with_repository(config, repo)
    }

    fn with_repository(config: Config, repo: Repository) -> Result<Self> {
        let source = OpenLigaClient::new(&config.openliga_base_url, config.http_timeout, config.source_timezone)?;
        Ok(Self::with_source(config, repo, Arc::new(source)))
    }

    pub fn with_source(config: Config, repo: Repository, source: Arc<dyn MatchSource>) -> Self {
        let sync = SyncOrchestrator::new(
            repo.clone(),
            source,
            config.league.clone(),
            config.season.clone(),
            config.previous_season.clone(),
            config.min_refresh,
        );

        let stats = StatisticsEngine::new(repo.clone(), config.stat_seasons(), config.form_window);
        let engine = PredictionEngine::new(repo.clone(), stats);
        let backtester = QualityBacktester::new(repo.clone(), engine.clone(), config.season.clone());
        let predictions = PredictionService::new(
            repo.clone(),
            engine,
            backtester,
            config.season.clone(),
            config.prediction_ttl,
            config.quality_ttl,
        );

        Self {
            config,
            repo,
            sync,
            predictions,
        }
    }

    pub async fn run_sync(&self, entity: EntityType, force: bool) -> SyncResult {
        let result = self.sync.run_sync(entity, force).await;
        self.after_sync(&result);
        result
    }

    pub async fn run_sync_with_cancel(
        &self,
        entity: EntityType,
        force: bool,
        cancel: &watch::Receiver<bool>,
    ) -> SyncResult {
        let result = self.sync.run_sync_with_cancel(entity, force, cancel).await;
        self.after_sync(&result);
        result
    }

    pub async fn sync_matchday(&self, matchday: u32, force: bool) -> SyncResult {
        let result = self.sync.sync_matchday(matchday, force).await;
        self.after_sync(&result);
        result
    }

    pub async fn sync_all(&self, force: bool) -> Vec<SyncResult> {
        let results = self.sync.sync_all(force).await;
        for result in &results {
            self.after_sync(result);
        }
        results
    }

    /// New or changed match results make every cached prediction and quality summary stale.
    fn after_sync(&self, result: &SyncResult) {
        if result.entity == EntityType::Matches && result.changed > 0 {
            tracing::info!("{} matches changed, clearing prediction cache", result.changed);
            self.predictions.clear_prediction_cache(None);
        }
    }

    pub async fn league_table(&self) -> RepoResult<Vec<TableEntry>> {
        let teams = self.repo.get_all_teams().await?;
        let matches = self.repo.get_finished_matches_for_season(&self.config.season).await?;
        Ok(compute_table(&teams, &matches))
    }

    pub async fn matchday_info(&self) -> RepoResult<MatchdayInfo> {
        let current = self
            .repo
            .latest_finished_matchday(&self.config.season)
            .await?
            .unwrap_or(0);
        Ok(MatchdayInfo {
            season: self.config.season.clone(),
            current_matchday: current,
            next_matchday: current + 1,
        })
    }

    pub async fn find_team(&self, query: &str) -> RepoResult<Option<Team>> {
        let teams = self.repo.get_all_teams().await?;
        Ok(find_team(query, &teams).cloned())
    }
}
