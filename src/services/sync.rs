use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;

use crate::db::{Repository, WriteOutcome};
use crate::error::RecordConversionError;
use crate::models::{EntityType, MatchRecord, SyncOutcome, SyncResult, TeamRecord};
use crate::services::source::{FetchBatch, MatchSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Fetching,
    Reconciling,
    Done,
}

/// Which slice of match data a matches cycle pulls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchScope {
    /// Current and previous season in full.
    Seasons,
    /// One matchday of the current season.
    Matchday(u32),
}

/// Everything one cycle produced, before it is written to the sync status.
#[derive(Debug, Default)]
struct CycleReport {
    synced: usize,
    changed: usize,
    errors: Vec<String>,
    fatal: Option<String>,
}

impl CycleReport {
    fn aborted(reason: String) -> Self {
        Self {
            fatal: Some(reason),
            ..Self::default()
        }
    }

    fn reject_all(&mut self, rejected: Vec<RecordConversionError>) {
        self.errors.extend(rejected.into_iter().map(|r| r.to_string()));
    }

    fn count(&mut self, outcome: WriteOutcome) {
        self.synced += 1;
        if outcome != WriteOutcome::Unchanged {
            self.changed += 1;
        }
    }

    fn outcome(&self) -> SyncOutcome {
        if self.fatal.is_some() {
            SyncOutcome::Failure
        } else if self.errors.is_empty() {
            SyncOutcome::Success
        } else {
            SyncOutcome::PartialFailure
        }
    }

    fn message(&self, entity: EntityType) -> String {
        match (&self.fatal, self.errors.len()) {
            (Some(reason), _) => reason.clone(),
            (None, 0) => format!("Synced {} {} ({} changed)", self.synced, entity, self.changed),
            (None, n) => format!(
                "Synced {} {} with {} errors; first: {}",
                self.synced,
                entity,
                n,
                self.errors[0]
            ),
        }
    }
}

/// Tracks the current phase of one cycle for logging.
struct Cycle {
    entity: EntityType,
    phase: SyncPhase,
}

impl Cycle {
    fn new(entity: EntityType) -> Self {
        Self {
            entity,
            phase: SyncPhase::Idle,
        }
    }

    fn enter(&mut self, phase: SyncPhase) {
        tracing::debug!("{} sync: {:?} -> {:?}", self.entity, self.phase, phase);
        self.phase = phase;
    }
}

/// Drives fetch-and-reconcile cycles for teams and matches. The only caller of
/// the repository's team, match and sync-status writes.
#[derive(Clone)]
pub struct SyncOrchestrator {
    repo: Repository,
    source: Arc<dyn MatchSource>,
    league: String,
    season: String,
    previous_season: String,
    min_refresh: Duration,
}

impl SyncOrchestrator {
    pub fn new(
        repo: Repository,
        source: Arc<dyn MatchSource>,
        league: String,
        season: String,
        previous_season: String,
        min_refresh: Duration,
    ) -> Self {
        Self {
            repo,
            source,
            league,
            season,
            previous_season,
            min_refresh,
        }
    }

    pub async fn run_sync(&self, entity: EntityType, force: bool) -> SyncResult {
        let (_keep, never) = watch::channel(false);
        self.run_sync_with_cancel(entity, force, &never).await
    }

    /// Like [`run_sync`](Self::run_sync), stopping between records once `cancel` turns true.
    pub async fn run_sync_with_cancel(
        &self,
        entity: EntityType,
        force: bool,
        cancel: &watch::Receiver<bool>,
    ) -> SyncResult {
        self.run_cycle(entity, MatchScope::Seasons, force, cancel).await
    }

    /// Matches cycle limited to one matchday of the current season.
    pub async fn sync_matchday(&self, matchday: u32, force: bool) -> SyncResult {
        let (_keep, never) = watch::channel(false);
        self.run_cycle(EntityType::Matches, MatchScope::Matchday(matchday), force, &never)
            .await
    }

    /// Teams first, then matches.
    pub async fn sync_all(&self, force: bool) -> Vec<SyncResult> {
        let mut results = Vec::with_capacity(EntityType::ALL.len());
        for entity in EntityType::ALL {
            results.push(self.run_sync(entity, force).await);
        }
        results
    }

    /// True when the last recorded attempt is older than the minimum refresh interval.
    pub async fn is_due(&self, entity: EntityType) -> bool {
        match self.repo.get_sync_status(entity).await {
            Ok(Some(status)) => Utc::now() - status.last_sync >= self.min_refresh,
            Ok(None) => true,
            Err(e) => {
                tracing::warn!("Could not read {} sync status, syncing anyway: {}", entity, e);
                true
            }
        }
    }

    async fn run_cycle(
        &self,
        entity: EntityType,
        scope: MatchScope,
        force: bool,
        cancel: &watch::Receiver<bool>,
    ) -> SyncResult {
        if !force && !self.is_due(entity).await {
            tracing::debug!("Skipping {} sync, last run is recent", entity);
            return SyncResult {
                entity,
                outcome: SyncOutcome::Skipped,
                synced: 0,
                changed: 0,
                errors: Vec::new(),
                skipped: true,
            };
        }

        tracing::info!("Starting {} sync (force={})", entity, force);
        let mut cycle = Cycle::new(entity);
        let mut report = match entity {
            EntityType::Teams => self.sync_teams(&mut cycle, cancel).await,
            EntityType::Matches => self.sync_matches(&mut cycle, scope, cancel).await,
        };
        cycle.enter(SyncPhase::Done);

        let outcome = report.outcome();
        let message = report.message(entity);
        let success = outcome == SyncOutcome::Success;

        if let Err(e) = self
            .repo
            .record_sync_status(entity, success, &message, report.synced)
            .await
        {
            tracing::error!("Failed to record {} sync status: {}", entity, e);
            report.errors.push(format!("failed to record sync status: {}", e));
        }

        match outcome {
            SyncOutcome::Failure => tracing::error!("{} sync failed: {}", entity, message),
            SyncOutcome::PartialFailure => tracing::warn!("{}", message),
            _ => tracing::info!("{}", message),
        }

        let mut errors = report.errors;
        if let Some(fatal) = report.fatal {
            errors.insert(0, fatal);
        }
        let outcome = match outcome {
            SyncOutcome::Success if !errors.is_empty() => SyncOutcome::PartialFailure,
            other => other,
        };

        SyncResult {
            entity,
            outcome,
            synced: report.synced,
            changed: report.changed,
            errors,
            skipped: false,
        }
    }

    // ── Teams ───────────────────────────────────────────────────────────────

    async fn sync_teams(&self, cycle: &mut Cycle, cancel: &watch::Receiver<bool>) -> CycleReport {
        cycle.enter(SyncPhase::Fetching);
        let mut batch = match self.source.fetch_teams(&self.league, &self.season).await {
            Ok(batch) => batch,
            Err(e) => return CycleReport::aborted(e.to_string()),
        };

        if batch.is_empty() {
            tracing::info!("Teams endpoint returned nothing, deriving teams from season matches");
            batch = match self.source.fetch_season(&self.league, &self.season).await {
                Ok(matches) => teams_from_matches(matches),
                Err(e) => return CycleReport::aborted(e.to_string()),
            };
        }

        cycle.enter(SyncPhase::Reconciling);
        let mut report = CycleReport::default();
        report.reject_all(batch.rejected);

        for team in &batch.records {
            if cancelled(cancel, &mut report) {
                break;
            }
            match self.repo.upsert_team(team).await {
                Ok(upserted) => report.count(upserted.outcome),
                Err(e) => {
                    tracing::warn!("Failed to store team {}: {}", team.id, e);
                    report.errors.push(format!("team {}: {}", team.id, e));
                }
            }
        }
        report
    }

    // ── Matches ─────────────────────────────────────────────────────────────

    async fn sync_matches(
        &self,
        cycle: &mut Cycle,
        scope: MatchScope,
        cancel: &watch::Receiver<bool>,
    ) -> CycleReport {
        cycle.enter(SyncPhase::Fetching);
        let batch = match scope {
            MatchScope::Matchday(day) => self.source.fetch_matchday(&self.league, &self.season, day).await,
            MatchScope::Seasons => self.fetch_both_seasons().await,
        };
        let batch = match batch {
            Ok(batch) => batch,
            Err(e) => return CycleReport::aborted(e.to_string()),
        };

        cycle.enter(SyncPhase::Reconciling);
        let mut report = CycleReport::default();
        report.reject_all(batch.rejected);

        for record in &batch.records {
            if cancelled(cancel, &mut report) {
                break;
            }
            match self.reconcile_match(record).await {
                Ok(outcome) => report.count(outcome),
                Err(e) => {
                    tracing::warn!("Failed to store match {}: {}", record.id, e);
                    report.errors.push(format!("match {}: {}", record.id, e));
                }
            }
        }
        report
    }

    async fn fetch_both_seasons(&self) -> Result<FetchBatch<MatchRecord>, crate::error::AdapterError> {
        let mut combined = self.source.fetch_season(&self.league, &self.previous_season).await?;
        let current = self.source.fetch_season(&self.league, &self.season).await?;
        combined.records.extend(current.records);
        combined.rejected.extend(current.rejected);
        Ok(combined)
    }

    /// Teams go in before the match that references them.
    async fn reconcile_match(&self, record: &MatchRecord) -> Result<WriteOutcome, crate::error::RepositoryError> {
        self.repo.upsert_team(&record.home).await?;
        self.repo.upsert_team(&record.away).await?;
        Ok(self.repo.upsert_match(record).await?.outcome)
    }
}

fn cancelled(cancel: &watch::Receiver<bool>, report: &mut CycleReport) -> bool {
    if *cancel.borrow() {
        tracing::warn!("Sync cancelled after {} records", report.synced);
        report.errors.push(format!("cancelled after {} records", report.synced));
        return true;
    }
    false
}

/// Unique teams in order of first appearance.
fn teams_from_matches(batch: FetchBatch<MatchRecord>) -> FetchBatch<TeamRecord> {
    let mut seen = HashSet::new();
    let mut teams = Vec::new();
    for record in batch.records {
        for team in [record.home, record.away] {
            if seen.insert(team.id) {
                teams.push(team);
            }
        }
    }
    FetchBatch {
        records: teams,
        rejected: batch.rejected,
    }
}
