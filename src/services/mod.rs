pub mod cache;
pub mod lookup;
pub mod openliga;
pub mod prediction_service;
pub mod predictor;
pub mod quality;
pub mod scheduler;
pub mod source;
pub mod standings;
pub mod statistics;
pub mod sync;

pub use cache::{CacheKey, CachedValue, ResultCache};
pub use openliga::OpenLigaClient;
pub use prediction_service::PredictionService;
pub use predictor::PredictionEngine;
pub use quality::QualityBacktester;
pub use source::{FetchBatch, MatchSource};
pub use statistics::{StatisticsEngine, TeamStatistics};
pub use sync::SyncOrchestrator;
