use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

use kickcast::db::Repository;
use kickcast::error::{AdapterError, RecordConversionError};
use kickcast::models::{EntityType, MatchRecord, Score, SyncOutcome, TeamRecord};
use kickcast::services::{FetchBatch, MatchSource, SyncOrchestrator};
use kickcast::{AppContext, Config};

/// Scripted source: returns whatever the test loaded, or fails when `down` is set.
#[derive(Default)]
struct FakeSource {
    teams: Mutex<Vec<TeamRecord>>,
    current: Mutex<Vec<MatchRecord>>,
    rejected: Mutex<Vec<RecordConversionError>>,
    down: Mutex<bool>,
    calls: Mutex<Vec<String>>,
}

impl FakeSource {
    fn check(&self, call: String) -> Result<(), AdapterError> {
        self.calls.lock().push(call.clone());
        if *self.down.lock() {
            return Err(AdapterError::Status {
                url: call,
                status: 503,
                body: "maintenance".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MatchSource for FakeSource {
    async fn fetch_teams(&self, league: &str, season: &str) -> Result<FetchBatch<TeamRecord>, AdapterError> {
        self.check(format!("teams/{}/{}", league, season))?;
        Ok(FetchBatch::new(self.teams.lock().clone()))
    }

    async fn fetch_matchday(
        &self,
        league: &str,
        season: &str,
        matchday: u32,
    ) -> Result<FetchBatch<MatchRecord>, AdapterError> {
        self.check(format!("matches/{}/{}/{}", league, season, matchday))?;
        let records = self
            .current
            .lock()
            .iter()
            .filter(|m| m.matchday == matchday as i32)
            .cloned()
            .collect();
        Ok(FetchBatch::new(records))
    }

    async fn fetch_season(&self, league: &str, season: &str) -> Result<FetchBatch<MatchRecord>, AdapterError> {
        self.check(format!("matches/{}/{}", league, season))?;
        if season != "2025" {
            return Ok(FetchBatch::new(Vec::new()));
        }
        Ok(FetchBatch {
            records: self.current.lock().clone(),
            rejected: self.rejected.lock().clone(),
        })
    }
}

fn team(id: i64) -> TeamRecord {
    TeamRecord {
        id,
        name: format!("Team {}", id),
        short_name: format!("T{}", id),
        logo_url: None,
    }
}

fn fixture(id: i64, home: i64, away: i64, matchday: i32, score: Option<(u32, u32)>) -> MatchRecord {
    MatchRecord {
        id,
        home: team(home),
        away: team(away),
        kickoff: Utc.with_ymd_and_hms(2025, 8, 22, 18, 30, 0).unwrap() + Duration::days(7 * matchday as i64),
        matchday,
        season: "2025".into(),
        finished: score.is_some(),
        score: score.map(|(h, a)| Score::new(h, a)),
    }
}

async fn setup() -> (Repository, Arc<FakeSource>, SyncOrchestrator) {
    let repo = Repository::in_memory().await.unwrap();
    let source = Arc::new(FakeSource::default());
    let orchestrator = SyncOrchestrator::new(
        repo.clone(),
        source.clone(),
        "bl1".into(),
        "2025".into(),
        "2024".into(),
        Duration::minutes(30),
    );
    (repo, source, orchestrator)
}

#[tokio::test]
async fn one_malformed_record_in_ten_is_a_partial_failure() {
    let (repo, source, orchestrator) = setup().await;
    let mut records: Vec<_> = (1..=10).map(|i| fixture(i, 100 + i, 200 + i, 1, Some((1, 0)))).collect();
    records.remove(2);
    *source.current.lock() = records;
    *source.rejected.lock() = vec![RecordConversionError::new("match 3", "missing matchday")];

    let result = orchestrator.run_sync(EntityType::Matches, false).await;

    assert_eq!(result.synced, 9);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.outcome, SyncOutcome::PartialFailure);
    assert!(!result.skipped);

    let status = repo.get_sync_status(EntityType::Matches).await.unwrap().unwrap();
    assert!(!status.success);
    assert_eq!(status.records_synced, 9);
    assert_eq!(repo.database_stats().await.unwrap().matches, 9);
}

#[tokio::test]
async fn adapter_failure_is_recorded_as_failed_cycle() {
    let (repo, source, orchestrator) = setup().await;
    *source.down.lock() = true;

    let result = orchestrator.run_sync(EntityType::Teams, true).await;

    assert_eq!(result.outcome, SyncOutcome::Failure);
    assert_eq!(result.synced, 0);
    assert!(result.errors[0].contains("503"));

    let status = repo.get_sync_status(EntityType::Teams).await.unwrap().unwrap();
    assert!(!status.success);
    assert!(status.message.contains("maintenance"));
}

#[tokio::test]
async fn recent_sync_is_skipped_unless_forced() {
    let (_repo, source, orchestrator) = setup().await;
    *source.teams.lock() = vec![team(1), team(2)];

    let first = orchestrator.run_sync(EntityType::Teams, false).await;
    assert_eq!(first.outcome, SyncOutcome::Success);
    assert_eq!(first.changed, 2);

    let second = orchestrator.run_sync(EntityType::Teams, false).await;
    assert!(second.skipped);
    assert_eq!(second.outcome, SyncOutcome::Skipped);
    assert_eq!(source.calls.lock().len(), 1);

    let forced = orchestrator.run_sync(EntityType::Teams, true).await;
    assert_eq!(forced.outcome, SyncOutcome::Success);
    assert_eq!(forced.synced, 2);
    assert_eq!(forced.changed, 0);
}

#[tokio::test]
async fn resync_with_identical_data_changes_nothing() {
    let (repo, source, orchestrator) = setup().await;
    *source.current.lock() = vec![fixture(1, 10, 20, 1, Some((2, 1))), fixture(2, 20, 10, 2, None)];

    orchestrator.run_sync(EntityType::Matches, true).await;
    let before = repo.get_match(1).await.unwrap().unwrap();

    let again = orchestrator.run_sync(EntityType::Matches, true).await;
    assert_eq!(again.changed, 0);
    assert_eq!(repo.get_match(1).await.unwrap().unwrap(), before);
}

#[tokio::test]
async fn empty_teams_endpoint_falls_back_to_match_payload() {
    let (repo, source, orchestrator) = setup().await;
    *source.current.lock() = vec![fixture(1, 10, 20, 1, None), fixture(2, 20, 30, 2, None)];

    let result = orchestrator.run_sync(EntityType::Teams, true).await;

    assert_eq!(result.outcome, SyncOutcome::Success);
    assert_eq!(result.synced, 3);
    assert_eq!(repo.get_all_teams().await.unwrap().len(), 3);
}

#[tokio::test]
async fn matchday_sync_only_touches_that_matchday() {
    let (repo, source, orchestrator) = setup().await;
    *source.current.lock() = vec![fixture(1, 10, 20, 1, Some((0, 0))), fixture(2, 20, 10, 2, None)];

    let result = orchestrator.sync_matchday(2, true).await;

    assert_eq!(result.synced, 1);
    assert!(repo.get_match(1).await.unwrap().is_none());
    assert!(repo.get_match(2).await.unwrap().is_some());
    assert_eq!(source.calls.lock().as_slice(), ["matches/bl1/2025/2"]);
}

#[tokio::test]
async fn cancelled_cycle_stops_between_records_and_still_records_status() {
    let (repo, source, orchestrator) = setup().await;
    *source.teams.lock() = (1..=5).map(team).collect();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    cancel_tx.send(true).unwrap();

    let result = orchestrator
        .run_sync_with_cancel(EntityType::Teams, true, &cancel_rx)
        .await;

    assert_eq!(result.synced, 0);
    assert_eq!(result.outcome, SyncOutcome::PartialFailure);
    assert!(repo.get_sync_status(EntityType::Teams).await.unwrap().is_some());
}

#[tokio::test]
async fn context_sync_clears_cached_predictions_when_matches_change() {
    let repo = Repository::in_memory().await.unwrap();
    let source = Arc::new(FakeSource::default());
    *source.current.lock() = vec![fixture(1, 10, 20, 1, None)];

    let config = Config::from_lookup(|key| match key {
        "KICKCAST_LEAGUE" => Some("bl1".into()),
        "KICKCAST_SEASON" => Some("2025".into()),
        _ => None,
    })
    .unwrap();
    let ctx = AppContext::with_source(config, repo, source.clone());

    let results = ctx.sync_all(true).await;
    assert!(results.iter().all(|r| r.is_success()));

    let predictions = ctx.predictions.get_predictions_for_matchday(1).await.unwrap();
    assert_eq!(predictions.len(), 1);
    assert!(!ctx.predictions.cache().is_empty());

    *source.current.lock() = vec![fixture(1, 10, 20, 1, Some((3, 1)))];
    ctx.run_sync(EntityType::Matches, true).await;
    assert!(ctx.predictions.cache().is_empty());

    let quality = ctx.predictions.get_prediction_quality().await.unwrap();
    assert_eq!(quality.stats.total, 1);
}
