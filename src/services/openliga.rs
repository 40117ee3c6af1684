use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::error::{AdapterError, RecordConversionError};
use crate::models::{MatchRecord, Score, TeamRecord};
use crate::services::source::{FetchBatch, MatchSource};

const MAX_ERROR_BODY: usize = 200;

// ── OpenLigaDB structures ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMatch {
    #[serde(rename = "matchID")]
    match_id: i64,
    #[serde(rename = "matchDateTimeUTC")]
    match_date_time_utc: Option<String>,
    match_date_time: Option<String>,
    group: Option<WireGroup>,
    team1: Option<WireTeam>,
    team2: Option<WireTeam>,
    #[serde(default)]
    match_is_finished: bool,
    #[serde(default)]
    match_results: Option<Vec<WireResult>>,
}

#[derive(Debug, Deserialize)]
struct WireGroup {
    #[serde(rename = "groupOrderID")]
    group_order_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTeam {
    team_id: i64,
    team_name: Option<String>,
    short_name: Option<String>,
    team_icon_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResult {
    points_team1: i64,
    points_team2: i64,
}

// ── Conversion into internal records ────────────────────────────────────────

fn convert_team(wire: WireTeam) -> Result<TeamRecord, RecordConversionError> {
    let record = format!("team {}", wire.team_id);
    let name = wire
        .team_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| RecordConversionError::new(&record, "missing teamName"))?;

    let short_name = wire
        .short_name
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| name.chars().take(3).collect::<String>().trim_end().to_string());

    Ok(TeamRecord {
        id: wire.team_id,
        name,
        short_name,
        logo_url: wire.team_icon_url.filter(|u| !u.trim().is_empty()),
    })
}

/// `matchDateTime` is wall-clock time in the league's zone, usually without an offset.
fn parse_local_kickoff(raw: &str, zone: Tz) -> Result<DateTime<Utc>, String> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Ok(with_offset.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").map_err(|e| e.to_string())?;
    zone.from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| format!("does not exist in {}", zone.name()))
}

fn convert_match(wire: WireMatch, season: &str, zone: Tz) -> Result<MatchRecord, RecordConversionError> {
    let record = format!("match {}", wire.match_id);

    let kickoff = match (wire.match_date_time_utc.as_deref(), wire.match_date_time.as_deref()) {
        (Some(utc), _) => DateTime::parse_from_rfc3339(utc)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| RecordConversionError::new(&record, format!("bad kickoff '{}': {}", utc, e)))?,
        (None, Some(local)) => parse_local_kickoff(local, zone)
            .map_err(|e| RecordConversionError::new(&record, format!("bad kickoff '{}': {}", local, e)))?,
        (None, None) => return Err(RecordConversionError::new(&record, "missing kickoff time")),
    };

    let matchday = wire
        .group
        .and_then(|g| g.group_order_id)
        .filter(|day| *day >= 1)
        .ok_or_else(|| RecordConversionError::new(&record, "missing matchday"))?;

    let home = wire
        .team1
        .ok_or_else(|| RecordConversionError::new(&record, "missing team1"))
        .and_then(convert_team)?;
    let away = wire
        .team2
        .ok_or_else(|| RecordConversionError::new(&record, "missing team2"))
        .and_then(convert_team)?;

    // Results arrive in order; the last one is the final score.
    let score = if wire.match_is_finished {
        let last = wire
            .match_results
            .as_ref()
            .and_then(|results| results.last())
            .ok_or_else(|| RecordConversionError::new(&record, "finished match without results"))?;
        if last.points_team1 < 0 || last.points_team2 < 0 {
            return Err(RecordConversionError::new(&record, "negative goal count"));
        }
        Some(Score::new(last.points_team1 as u32, last.points_team2 as u32))
    } else {
        None
    };

    Ok(MatchRecord {
        id: wire.match_id,
        home,
        away,
        kickoff,
        matchday,
        season: season.to_string(),
        finished: wire.match_is_finished,
        score,
    })
}

/// Label used in rejection messages for elements that do not even parse.
fn element_label(value: &Value, index: usize, id_field: &str) -> String {
    match value.get(id_field).and_then(Value::as_i64) {
        Some(id) => format!("{} {}", id_field, id),
        None => format!("element #{}", index + 1),
    }
}

fn convert_batch<W, T, F>(values: Vec<Value>, id_field: &str, convert: F) -> FetchBatch<T>
where
    W: DeserializeOwned,
    F: Fn(W) -> Result<T, RecordConversionError>,
{
    let mut batch = FetchBatch::new(Vec::with_capacity(values.len()));
    for (index, value) in values.into_iter().enumerate() {
        let label = element_label(&value, index, id_field);
        let converted = serde_json::from_value::<W>(value)
            .map_err(|e| RecordConversionError::new(label, e.to_string()))
            .and_then(&convert);

        match converted {
            Ok(record) => batch.records.push(record),
            Err(rejection) => {
                tracing::warn!("Skipping malformed record: {}", rejection);
                batch.rejected.push(rejection);
            }
        }
    }
    batch
}

// ── OpenLigaClient ──────────────────────────────────────────────────────────

pub struct OpenLigaClient {
    client: Client,
    base_url: String,
    zone: Tz,
}

impl OpenLigaClient {
    /// `zone` is the league's local time zone, used for kickoffs sent without an offset.
    pub fn new(base_url: &str, timeout: Duration, zone: Tz) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("kickcast/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(AdapterError::Client)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            zone,
        })
    }

    async fn get_array(&self, url: String) -> Result<Vec<Value>, AdapterError> {
        tracing::debug!("GET {}", url);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(source) => return Err(AdapterError::Transport { url, source }),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Status {
                url,
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(source) => return Err(AdapterError::Transport { url, source }),
        };

        serde_json::from_str::<Vec<Value>>(&body).map_err(|e| AdapterError::Decode {
            url,
            reason: e.to_string(),
        })
    }

    async fn fetch_matches(&self, url: String, season: &str) -> Result<FetchBatch<MatchRecord>, AdapterError> {
        let values = self.get_array(url).await?;
        let zone = self.zone;
        let batch = convert_batch(values, "matchID", |wire: WireMatch| convert_match(wire, season, zone));
        tracing::info!(
            "Fetched {} matches ({} rejected) for season {}",
            batch.records.len(),
            batch.rejected.len(),
            season
        );
        Ok(batch)
    }
}

#[async_trait]
impl MatchSource for OpenLigaClient {
    async fn fetch_teams(&self, league: &str, season: &str) -> Result<FetchBatch<TeamRecord>, AdapterError> {
        let url = format!("{}/getavailableteams/{}/{}", self.base_url, league, season);
        let values = self.get_array(url).await?;
        let batch = convert_batch(values, "teamId", convert_team);
        tracing::info!("Fetched {} teams for {}/{}", batch.records.len(), league, season);
        Ok(batch)
    }

    async fn fetch_matchday(
        &self,
        league: &str,
        season: &str,
        matchday: u32,
    ) -> Result<FetchBatch<MatchRecord>, AdapterError> {
        let url = format!("{}/getmatchdata/{}/{}/{}", self.base_url, league, season, matchday);
        self.fetch_matches(url, season).await
    }

    async fn fetch_season(&self, league: &str, season: &str) -> Result<FetchBatch<MatchRecord>, AdapterError> {
        let url = format!("{}/getmatchdata/{}/{}", self.base_url, league, season);
        self.fetch_matches(url, season).await
    }
}
