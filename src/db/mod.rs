pub mod locks;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

use crate::error::RepositoryError;
use crate::models::*;
use crate::utils::{db_timestamp, parse_db_timestamp};
use locks::{KeyedLocks, LockKey};

pub type RepoResult<T> = Result<T, RepositoryError>;

/// What an upsert did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Upserted<T> {
    pub record: T,
    pub outcome: WriteOutcome,
}

/// Sole owner of the SQLite schema and every read/write against it.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
    locks: Arc<KeyedLocks>,
}

impl Repository {
    pub async fn connect(database_url: &str) -> RepoResult<Self> {
        // Strip the "sqlite:" prefix to get the file path, create parent dir if needed
        let file_path = database_url
            .strip_prefix("sqlite:///")
            .or_else(|| database_url.strip_prefix("sqlite://"))
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);

        if file_path != ":memory:" {
            if let Some(parent) = std::path::Path::new(file_path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.ok();
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(options).await?;
        Ok(Self::from_pool(pool))
    }

    /// Connects and creates the schema. When the store is not reachable yet (volume not
    /// mounted, directory not writable), waits `retry_delay` and tries exactly once more.
    pub async fn connect_with_retry(database_url: &str, retry_delay: std::time::Duration) -> RepoResult<Self> {
        match Self::open(database_url).await {
            Ok(repo) => Ok(repo),
            Err(e) => {
                tracing::warn!("Store not reachable ({}), retrying in {:?}", e, retry_delay);
                tokio::time::sleep(retry_delay).await;
                Self::open(database_url).await
            }
        }
    }

    async fn open(database_url: &str) -> RepoResult<Self> {
        let repo = Self::connect(database_url).await?;
        repo.init_schema().await?;
        Ok(repo)
    }

    /// Private in-memory database. One connection that never recycles, so the data lives as long as the pool.
    pub async fn in_memory() -> RepoResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let repo = Self::from_pool(pool);
        repo.init_schema().await?;
        Ok(repo)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn init_schema(&self) -> RepoResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS teams (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                short_name TEXT NOT NULL,
                logo_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS matches (
                id INTEGER PRIMARY KEY,
                home_team_id INTEGER NOT NULL,
                away_team_id INTEGER NOT NULL,
                kickoff TEXT NOT NULL,
                matchday INTEGER NOT NULL,
                season TEXT NOT NULL,
                finished INTEGER NOT NULL DEFAULT 0,
                home_goals INTEGER,
                away_goals INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_synced TEXT NOT NULL,
                FOREIGN KEY (home_team_id) REFERENCES teams (id),
                FOREIGN KEY (away_team_id) REFERENCES teams (id),
                CHECK ((home_goals IS NULL) = (away_goals IS NULL)),
                CHECK (finished = 0 OR home_goals IS NOT NULL)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS predictions (
                match_id INTEGER PRIMARY KEY,
                home_team_id INTEGER NOT NULL,
                away_team_id INTEGER NOT NULL,
                home_win_probability REAL NOT NULL,
                draw_probability REAL NOT NULL,
                away_win_probability REAL NOT NULL,
                predicted_score TEXT NOT NULL,
                home_form REAL NOT NULL,
                away_form REAL NOT NULL,
                home_goal_rate REAL NOT NULL,
                away_goal_rate REAL NOT NULL,
                window_size INTEGER NOT NULL,
                algorithm_version TEXT NOT NULL,
                calculated_at TEXT NOT NULL,
                FOREIGN KEY (match_id) REFERENCES matches (id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS prediction_quality (
                match_id INTEGER PRIMARY KEY,
                predicted_score TEXT NOT NULL,
                actual_score TEXT NOT NULL,
                predicted_home_win_probability REAL NOT NULL,
                predicted_draw_probability REAL NOT NULL,
                predicted_away_win_probability REAL NOT NULL,
                hit_type TEXT NOT NULL,
                tendency_correct INTEGER NOT NULL,
                exact_score_correct INTEGER NOT NULL,
                calculated_at TEXT NOT NULL,
                FOREIGN KEY (match_id) REFERENCES matches (id),
                CHECK (
                    (hit_type = 'exact_match' AND tendency_correct = 1 AND exact_score_correct = 1) OR
                    (hit_type = 'tendency_match' AND tendency_correct = 1 AND exact_score_correct = 0) OR
                    (hit_type = 'miss' AND tendency_correct = 0 AND exact_score_correct = 0)
                )
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_status (
                entity_type TEXT PRIMARY KEY,
                last_sync TEXT NOT NULL,
                success INTEGER NOT NULL,
                message TEXT NOT NULL,
                records_synced INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_matches_home_kickoff ON matches(home_team_id, kickoff)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_matches_away_kickoff ON matches(away_team_id, kickoff)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_matches_season_matchday ON matches(season, matchday)")
            .execute(&self.pool)
            .await?;

        tracing::info!("Database initialized successfully");
        Ok(())
    }

    // ── Teams ───────────────────────────────────────────────────────────────

    /// Insert or update a team by its external ID. A logo the source stops sending is kept.
    pub async fn upsert_team(&self, record: &TeamRecord) -> RepoResult<Upserted<Team>> {
        let _guard = self.locks.acquire(LockKey::Team(record.id)).await;
        let existed = self.get_team(record.id).await?.is_some();
        let now = db_timestamp(Utc::now());

        let result = sqlx::query(
            r#"
            INSERT INTO teams (id, name, short_name, logo_url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name       = excluded.name,
                short_name = excluded.short_name,
                logo_url   = COALESCE(excluded.logo_url, teams.logo_url),
                updated_at = excluded.updated_at
            WHERE teams.name IS NOT excluded.name
               OR teams.short_name IS NOT excluded.short_name
               OR (excluded.logo_url IS NOT NULL AND teams.logo_url IS NOT excluded.logo_url)
            "#,
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(&record.short_name)
        .bind(&record.logo_url)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let outcome = classify(existed, result.rows_affected());
        let team = self
            .get_team(record.id)
            .await?
            .ok_or(RepositoryError::Database(sqlx::Error::RowNotFound))?;
        Ok(Upserted { record: team, outcome })
    }

    pub async fn get_team(&self, team_id: TeamId) -> RepoResult<Option<Team>> {
        let row = sqlx::query("SELECT * FROM teams WHERE id = ?")
            .bind(team_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(team_from_row).transpose()
    }

    pub async fn get_all_teams(&self) -> RepoResult<Vec<Team>> {
        let rows = sqlx::query("SELECT * FROM teams ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(team_from_row).collect()
    }

    // ── Matches ─────────────────────────────────────────────────────────────

    /// Insert or update a match by its external ID. Both teams must already be stored.
    pub async fn upsert_match(&self, record: &MatchRecord) -> RepoResult<Upserted<Match>> {
        if record.finished && record.score.is_none() {
            return Err(RepositoryError::Invariant {
                match_id: record.id,
                rule: "finished match must carry a score",
            });
        }

        let _guard = self.locks.acquire(LockKey::Match(record.id)).await;
        let existed = self.get_match(record.id).await?.is_some();
        let now = db_timestamp(Utc::now());

        let result = sqlx::query(
            r#"
            INSERT INTO matches
            (id, home_team_id, away_team_id, kickoff, matchday, season, finished,
             home_goals, away_goals, created_at, updated_at, last_synced)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                home_team_id = excluded.home_team_id,
                away_team_id = excluded.away_team_id,
                kickoff      = excluded.kickoff,
                matchday     = excluded.matchday,
                season       = excluded.season,
                finished     = excluded.finished,
                home_goals   = excluded.home_goals,
                away_goals   = excluded.away_goals,
                updated_at   = excluded.updated_at,
                last_synced  = excluded.last_synced
            WHERE matches.home_team_id IS NOT excluded.home_team_id
               OR matches.away_team_id IS NOT excluded.away_team_id
               OR matches.kickoff IS NOT excluded.kickoff
               OR matches.matchday IS NOT excluded.matchday
               OR matches.season IS NOT excluded.season
               OR matches.finished IS NOT excluded.finished
               OR matches.home_goals IS NOT excluded.home_goals
               OR matches.away_goals IS NOT excluded.away_goals
            "#,
        )
        .bind(record.id)
        .bind(record.home.id)
        .bind(record.away.id)
        .bind(db_timestamp(record.kickoff))
        .bind(record.matchday)
        .bind(&record.season)
        .bind(record.finished)
        .bind(record.score.map(|s| s.home as i32))
        .bind(record.score.map(|s| s.away as i32))
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let outcome = classify(existed, result.rows_affected());
        let stored = self
            .get_match(record.id)
            .await?
            .ok_or(RepositoryError::Database(sqlx::Error::RowNotFound))?;
        Ok(Upserted { record: stored, outcome })
    }

    pub async fn get_match(&self, match_id: MatchId) -> RepoResult<Option<Match>> {
        let row = sqlx::query("SELECT * FROM matches WHERE id = ?")
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(match_from_row).transpose()
    }

    /// The team's most recent finished matches across `seasons`, newest first.
    /// `before` restricts the window to matches that kicked off strictly earlier.
    pub async fn get_finished_matches(
        &self,
        team_id: TeamId,
        seasons: &[String],
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> RepoResult<Vec<Match>> {
        if seasons.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT * FROM matches WHERE finished = 1 AND home_goals IS NOT NULL AND away_goals IS NOT NULL AND (home_team_id = ",
        );
        query.push_bind(team_id);
        query.push(" OR away_team_id = ");
        query.push_bind(team_id);
        query.push(") AND season IN (");
        let mut separated = query.separated(", ");
        for season in seasons {
            separated.push_bind(season);
        }
        separated.push_unseparated(")");
        if let Some(before) = before {
            query.push(" AND kickoff < ");
            query.push_bind(db_timestamp(before));
        }
        query.push(" ORDER BY kickoff DESC, id DESC LIMIT ");
        query.push_bind(limit as i64);

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(match_from_row).collect()
    }

    pub async fn get_matches_by_matchday(&self, season: &str, matchday: i32) -> RepoResult<Vec<Match>> {
        let rows = sqlx::query("SELECT * FROM matches WHERE season = ? AND matchday = ? ORDER BY kickoff, id")
            .bind(season)
            .bind(matchday)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(match_from_row).collect()
    }

    pub async fn get_finished_matches_for_season(&self, season: &str) -> RepoResult<Vec<Match>> {
        let rows = sqlx::query(
            "SELECT * FROM matches WHERE season = ? AND finished = 1 AND home_goals IS NOT NULL ORDER BY kickoff, id",
        )
        .bind(season)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(match_from_row).collect()
    }

    /// Finished matches in `season` with no quality row, or whose quality row was scored
    /// against a result the source has since corrected. Oldest first.
    pub async fn get_finished_matches_to_score(&self, season: &str) -> RepoResult<Vec<Match>> {
        let rows = sqlx::query(
            r#"SELECT m.* FROM matches m
               LEFT JOIN prediction_quality q ON q.match_id = m.id
               WHERE m.season = ? AND m.finished = 1 AND m.home_goals IS NOT NULL
                 AND (q.match_id IS NULL OR q.actual_score <> (m.home_goals || ':' || m.away_goals))
               ORDER BY m.kickoff, m.id"#,
        )
        .bind(season)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(match_from_row).collect()
    }

    pub async fn latest_finished_matchday(&self, season: &str) -> RepoResult<Option<i32>> {
        let row = sqlx::query("SELECT MAX(matchday) AS matchday FROM matches WHERE season = ? AND finished = 1")
            .bind(season)
            .fetch_one(&self.pool)
            .await?;
        let matchday: Option<i64> = row.try_get("matchday")?;
        Ok(matchday.map(|day| day as i32))
    }

    // ── Predictions ─────────────────────────────────────────────────────────

    pub async fn save_prediction(&self, prediction: &Prediction) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO predictions
            (match_id, home_team_id, away_team_id, home_win_probability, draw_probability,
             away_win_probability, predicted_score, home_form, away_form, home_goal_rate,
             away_goal_rate, window_size, algorithm_version, calculated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(match_id) DO UPDATE SET
                home_team_id         = excluded.home_team_id,
                away_team_id         = excluded.away_team_id,
                home_win_probability = excluded.home_win_probability,
                draw_probability     = excluded.draw_probability,
                away_win_probability = excluded.away_win_probability,
                predicted_score      = excluded.predicted_score,
                home_form            = excluded.home_form,
                away_form            = excluded.away_form,
                home_goal_rate       = excluded.home_goal_rate,
                away_goal_rate       = excluded.away_goal_rate,
                window_size          = excluded.window_size,
                algorithm_version    = excluded.algorithm_version,
                calculated_at        = excluded.calculated_at
            "#,
        )
        .bind(prediction.match_id)
        .bind(prediction.home_team_id)
        .bind(prediction.away_team_id)
        .bind(prediction.home_win_probability)
        .bind(prediction.draw_probability)
        .bind(prediction.away_win_probability)
        .bind(prediction.predicted_score.to_string())
        .bind(prediction.inputs.home_form)
        .bind(prediction.inputs.away_form)
        .bind(prediction.inputs.home_goal_rate)
        .bind(prediction.inputs.away_goal_rate)
        .bind(prediction.inputs.window_size as i64)
        .bind(&prediction.algorithm_version)
        .bind(db_timestamp(prediction.calculated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_prediction(&self, match_id: MatchId) -> RepoResult<Option<Prediction>> {
        let row = sqlx::query("SELECT * FROM predictions WHERE match_id = ?")
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(prediction_from_row).transpose()
    }

    // ── Prediction quality ──────────────────────────────────────────────────

    pub async fn save_prediction_quality(&self, quality: &PredictionQuality) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO prediction_quality
            (match_id, predicted_score, actual_score, predicted_home_win_probability,
             predicted_draw_probability, predicted_away_win_probability, hit_type,
             tendency_correct, exact_score_correct, calculated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(match_id) DO UPDATE SET
                predicted_score                = excluded.predicted_score,
                actual_score                   = excluded.actual_score,
                predicted_home_win_probability = excluded.predicted_home_win_probability,
                predicted_draw_probability     = excluded.predicted_draw_probability,
                predicted_away_win_probability = excluded.predicted_away_win_probability,
                hit_type                       = excluded.hit_type,
                tendency_correct               = excluded.tendency_correct,
                exact_score_correct            = excluded.exact_score_correct,
                calculated_at                  = excluded.calculated_at
            "#,
        )
        .bind(quality.match_id)
        .bind(quality.predicted_score.to_string())
        .bind(quality.actual_score.to_string())
        .bind(quality.predicted_home_win_probability)
        .bind(quality.predicted_draw_probability)
        .bind(quality.predicted_away_win_probability)
        .bind(quality.hit_type.as_str())
        .bind(quality.tendency_correct)
        .bind(quality.exact_score_correct)
        .bind(db_timestamp(quality.calculated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Quality rows for `season`, in kickoff order.
    pub async fn get_prediction_quality_for_season(&self, season: &str) -> RepoResult<Vec<PredictionQuality>> {
        let rows = sqlx::query(
            r#"SELECT q.* FROM prediction_quality q
               JOIN matches m ON m.id = q.match_id
               WHERE m.season = ?
               ORDER BY m.kickoff, m.id"#,
        )
        .bind(season)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(quality_from_row).collect()
    }

    // ── Sync status ─────────────────────────────────────────────────────────

    pub async fn record_sync_status(
        &self,
        entity: EntityType,
        success: bool,
        message: &str,
        records_synced: usize,
    ) -> RepoResult<()> {
        sqlx::query(
            r#"INSERT INTO sync_status (entity_type, last_sync, success, message, records_synced)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(entity_type) DO UPDATE SET
                   last_sync      = excluded.last_sync,
                   success        = excluded.success,
                   message        = excluded.message,
                   records_synced = excluded.records_synced"#,
        )
        .bind(entity.as_str())
        .bind(db_timestamp(Utc::now()))
        .bind(success)
        .bind(message)
        .bind(records_synced as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_sync_status(&self, entity: EntityType) -> RepoResult<Option<SyncStatus>> {
        let row = sqlx::query("SELECT * FROM sync_status WHERE entity_type = ?")
            .bind(entity.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(sync_status_from_row).transpose()
    }

    pub async fn get_all_sync_status(&self) -> RepoResult<Vec<SyncStatus>> {
        let rows = sqlx::query("SELECT * FROM sync_status ORDER BY entity_type")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(sync_status_from_row).collect()
    }

    pub async fn database_stats(&self) -> RepoResult<DatabaseStats> {
        let row = sqlx::query(
            r#"SELECT
                (SELECT COUNT(*) FROM teams) AS teams,
                (SELECT COUNT(*) FROM matches) AS matches,
                (SELECT COUNT(*) FROM matches WHERE finished = 1) AS finished_matches,
                (SELECT COUNT(*) FROM predictions) AS predictions,
                (SELECT COUNT(*) FROM prediction_quality) AS prediction_quality"#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(DatabaseStats {
            teams: row.get("teams"),
            matches: row.get("matches"),
            finished_matches: row.get("finished_matches"),
            predictions: row.get("predictions"),
            prediction_quality: row.get("prediction_quality"),
        })
    }
}

fn classify(existed: bool, rows_affected: u64) -> WriteOutcome {
    match (existed, rows_affected) {
        (false, _) => WriteOutcome::Inserted,
        (true, 0) => WriteOutcome::Unchanged,
        (true, _) => WriteOutcome::Updated,
    }
}

// ── Row mapping ─────────────────────────────────────────────────────────────

fn timestamp(row: &SqliteRow, column: &'static str) -> RepoResult<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    parse_db_timestamp(&raw).ok_or(RepositoryError::Corrupt { column, value: raw })
}

fn score(row: &SqliteRow, column: &'static str) -> RepoResult<Score> {
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|_| RepositoryError::Corrupt { column, value: raw })
}

fn team_from_row(row: &SqliteRow) -> RepoResult<Team> {
    Ok(Team {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        short_name: row.try_get("short_name")?,
        logo_url: row.try_get("logo_url")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

fn match_from_row(row: &SqliteRow) -> RepoResult<Match> {
    Ok(Match {
        id: row.try_get("id")?,
        home_team_id: row.try_get("home_team_id")?,
        away_team_id: row.try_get("away_team_id")?,
        kickoff: timestamp(row, "kickoff")?,
        matchday: row.try_get("matchday")?,
        season: row.try_get("season")?,
        finished: row.try_get("finished")?,
        home_goals: row.try_get("home_goals")?,
        away_goals: row.try_get("away_goals")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
        last_synced: timestamp(row, "last_synced")?,
    })
}

fn prediction_from_row(row: &SqliteRow) -> RepoResult<Prediction> {
    Ok(Prediction {
        match_id: row.try_get("match_id")?,
        home_team_id: row.try_get("home_team_id")?,
        away_team_id: row.try_get("away_team_id")?,
        home_win_probability: row.try_get("home_win_probability")?,
        draw_probability: row.try_get("draw_probability")?,
        away_win_probability: row.try_get("away_win_probability")?,
        predicted_score: score(row, "predicted_score")?,
        inputs: PredictionInputs {
            home_form: row.try_get("home_form")?,
            away_form: row.try_get("away_form")?,
            home_goal_rate: row.try_get("home_goal_rate")?,
            away_goal_rate: row.try_get("away_goal_rate")?,
            window_size: row.try_get::<i64, _>("window_size")? as u32,
        },
        algorithm_version: row.try_get("algorithm_version")?,
        calculated_at: timestamp(row, "calculated_at")?,
    })
}

fn quality_from_row(row: &SqliteRow) -> RepoResult<PredictionQuality> {
    let raw_hit: String = row.try_get("hit_type")?;
    let hit_type = raw_hit.parse::<HitType>().map_err(|_| RepositoryError::Corrupt {
        column: "hit_type",
        value: raw_hit.clone(),
    })?;

    Ok(PredictionQuality {
        match_id: row.try_get("match_id")?,
        predicted_score: score(row, "predicted_score")?,
        actual_score: score(row, "actual_score")?,
        predicted_home_win_probability: row.try_get("predicted_home_win_probability")?,
        predicted_draw_probability: row.try_get("predicted_draw_probability")?,
        predicted_away_win_probability: row.try_get("predicted_away_win_probability")?,
        hit_type,
        tendency_correct: row.try_get("tendency_correct")?,
        exact_score_correct: row.try_get("exact_score_correct")?,
        calculated_at: timestamp(row, "calculated_at")?,
    })
}

fn sync_status_from_row(row: &SqliteRow) -> RepoResult<SyncStatus> {
    Ok(SyncStatus {
        entity_type: row.try_get("entity_type")?,
        last_sync: timestamp(row, "last_sync")?,
        success: row.try_get("success")?,
        message: row.try_get("message")?,
        records_synced: row.try_get("records_synced")?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn connect_with_retry_waits_for_the_store_once() {
        let root = std::env::temp_dir().join(format!("kickcast-retry-{}", std::process::id()));
        std::fs::remove_dir_all(&root).ok();
        std::fs::create_dir_all(&root).unwrap();
        // A plain file where the data directory belongs makes the first attempt fail.
        let data_dir = root.join("data");
        std::fs::write(&data_dir, b"not mounted").unwrap();
        let url = format!("sqlite:{}", data_dir.join("kickcast.db").display());

        assert!(Repository::connect(&url).await.is_err());

        let mount = {
            let data_dir = data_dir.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                std::fs::remove_file(&data_dir).unwrap();
                std::fs::create_dir_all(&data_dir).unwrap();
            })
        };

        let repo = Repository::connect_with_retry(&url, std::time::Duration::from_millis(300))
            .await
            .unwrap();
        mount.await.unwrap();
        assert_eq!(repo.database_stats().await.unwrap().teams, 0);

        repo.pool().close().await;
        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn connect_with_retry_gives_up_after_second_attempt() {
        let root = std::env::temp_dir().join(format!("kickcast-noretry-{}", std::process::id()));
        std::fs::remove_dir_all(&root).ok();
        std::fs::create_dir_all(&root).unwrap();
        let blocker = root.join("data");
        std::fs::write(&blocker, b"never mounted").unwrap();
        let url = format!("sqlite:{}", blocker.join("kickcast.db").display());

        let started = tokio::time::Instant::now();
        assert!(Repository::connect_with_retry(&url, std::time::Duration::from_millis(20)).await.is_err());
        assert!(started.elapsed() >= std::time::Duration::from_millis(20));

        std::fs::remove_dir_all(&root).ok();
    }

    pub(crate) fn team(id: TeamId) -> TeamRecord {
        TeamRecord {
            id,
            name: format!("Team {}", id),
            short_name: format!("T{}", id),
            logo_url: None,
        }
    }

    pub(crate) fn finished(id: MatchId, home: TeamId, away: TeamId, day: i64, score: (u32, u32)) -> MatchRecord {
        MatchRecord {
            id,
            home: team(home),
            away: team(away),
            kickoff: Utc.with_ymd_and_hms(2025, 8, 1, 15, 30, 0).unwrap() + Duration::days(day),
            matchday: (day + 1) as i32,
            season: "2025".into(),
            finished: true,
            score: Some(Score::new(score.0, score.1)),
        }
    }

    async fn store(repo: &Repository, record: &MatchRecord) {
        repo.upsert_team(&record.home).await.unwrap();
        repo.upsert_team(&record.away).await.unwrap();
        repo.upsert_match(record).await.unwrap();
    }

    #[tokio::test]
    async fn team_upsert_is_idempotent() {
        let repo = Repository::in_memory().await.unwrap();
        let first = repo.upsert_team(&team(1)).await.unwrap();
        assert_eq!(first.outcome, WriteOutcome::Inserted);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = repo.upsert_team(&team(1)).await.unwrap();
        assert_eq!(second.outcome, WriteOutcome::Unchanged);
        assert_eq!(second.record, first.record);
        assert_eq!(repo.get_all_teams().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn team_rename_updates_in_place_and_keeps_logo() {
        let repo = Repository::in_memory().await.unwrap();
        let mut record = team(1);
        record.logo_url = Some("https://img/1.png".into());
        let first = repo.upsert_team(&record).await.unwrap();

        record.name = "Renamed".into();
        record.logo_url = None;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = repo.upsert_team(&record).await.unwrap();

        assert_eq!(second.outcome, WriteOutcome::Updated);
        assert_eq!(second.record.name, "Renamed");
        assert_eq!(second.record.logo_url.as_deref(), Some("https://img/1.png"));
        assert_eq!(second.record.created_at, first.record.created_at);
        assert!(second.record.updated_at > first.record.updated_at);
    }

    #[tokio::test]
    async fn match_upsert_is_idempotent_and_tracks_results() {
        let repo = Repository::in_memory().await.unwrap();
        let mut record = finished(100, 1, 2, 0, (0, 0));
        record.finished = false;
        record.score = None;
        store(&repo, &record).await;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let again = repo.upsert_match(&record).await.unwrap();
        assert_eq!(again.outcome, WriteOutcome::Unchanged);
        let before = again.record;

        record.finished = true;
        record.score = Some(Score::new(2, 1));
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let updated = repo.upsert_match(&record).await.unwrap();
        assert_eq!(updated.outcome, WriteOutcome::Updated);
        assert_eq!(updated.record.score(), Some(Score::new(2, 1)));
        assert!(updated.record.updated_at > before.updated_at);
        assert!(updated.record.last_synced > before.last_synced);
    }

    #[tokio::test]
    async fn finished_match_without_score_is_rejected() {
        let repo = Repository::in_memory().await.unwrap();
        let mut record = finished(100, 1, 2, 0, (1, 0));
        record.score = None;
        repo.upsert_team(&record.home).await.unwrap();
        repo.upsert_team(&record.away).await.unwrap();

        let err = repo.upsert_match(&record).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Invariant { match_id: 100, .. }));
        assert!(repo.get_match(100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn match_with_unknown_team_violates_foreign_key() {
        let repo = Repository::in_memory().await.unwrap();
        let err = repo.upsert_match(&finished(100, 1, 2, 0, (1, 0))).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Database(_)));
    }

    #[tokio::test]
    async fn concurrent_upserts_of_same_match_leave_one_row() {
        let repo = Repository::in_memory().await.unwrap();
        let record = finished(100, 1, 2, 0, (1, 1));
        repo.upsert_team(&record.home).await.unwrap();
        repo.upsert_team(&record.away).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let repo = repo.clone();
                let record = record.clone();
                tokio::spawn(async move { repo.upsert_match(&record).await.unwrap().outcome })
            })
            .collect();

        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap() == WriteOutcome::Inserted {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(repo.database_stats().await.unwrap().matches, 1);
    }

    #[tokio::test]
    async fn finished_matches_window_is_newest_first_across_seasons() {
        let repo = Repository::in_memory().await.unwrap();
        for day in 0..5 {
            let mut record = finished(200 + day, 1, 2, day, (1, 0));
            if day < 2 {
                record.season = "2024".into();
            }
            store(&repo, &record).await;
        }
        let mut upcoming = finished(300, 2, 1, 10, (0, 0));
        upcoming.finished = false;
        upcoming.score = None;
        store(&repo, &upcoming).await;

        let seasons = vec!["2025".to_string(), "2024".to_string()];
        let window = repo.get_finished_matches(1, &seasons, 3, None).await.unwrap();
        let ids: Vec<_> = window.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![204, 203, 202]);

        let all = repo.get_finished_matches(2, &seasons, 14, None).await.unwrap();
        assert_eq!(all.len(), 5);

        let only_current = repo.get_finished_matches(1, &seasons[..1], 14, None).await.unwrap();
        assert_eq!(only_current.len(), 3);

        let cutoff = window[1].kickoff;
        let earlier = repo.get_finished_matches(1, &seasons, 14, Some(cutoff)).await.unwrap();
        assert_eq!(earlier.iter().map(|m| m.id).collect::<Vec<_>>(), vec![202, 201, 200]);
    }

    #[tokio::test]
    async fn sync_status_is_overwritten_per_entity() {
        let repo = Repository::in_memory().await.unwrap();
        repo.record_sync_status(EntityType::Matches, false, "boom", 0).await.unwrap();
        repo.record_sync_status(EntityType::Matches, true, "ok", 9).await.unwrap();

        let all = repo.get_all_sync_status().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].success);
        assert_eq!(all[0].records_synced, 9);
        assert!(repo.get_sync_status(EntityType::Teams).await.unwrap().is_none());
    }
}
