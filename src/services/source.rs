use async_trait::async_trait;

use crate::error::{AdapterError, RecordConversionError};
use crate::models::{MatchRecord, TeamRecord};

/// Records converted from one fetch, plus the ones that failed conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchBatch<T> {
    pub records: Vec<T>,
    pub rejected: Vec<RecordConversionError>,
}

impl<T> FetchBatch<T> {
    pub fn new(records: Vec<T>) -> Self {
        Self {
            records,
            rejected: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.rejected.is_empty()
    }
}

/// Read-only access to the external match data provider.
#[async_trait]
pub trait MatchSource: Send + Sync {
    async fn fetch_teams(&self, league: &str, season: &str) -> Result<FetchBatch<TeamRecord>, AdapterError>;

    async fn fetch_matchday(
        &self,
        league: &str,
        season: &str,
        matchday: u32,
    ) -> Result<FetchBatch<MatchRecord>, AdapterError>;

    async fn fetch_season(&self, league: &str, season: &str) -> Result<FetchBatch<MatchRecord>, AdapterError>;
}
