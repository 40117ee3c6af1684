use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Coarse match outcome, ignoring the exact scoreline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tendency {
    HomeWin,
    Draw,
    AwayWin,
}

impl Tendency {
    pub fn from_goals(home: u32, away: u32) -> Self {
        match home.cmp(&away) {
            std::cmp::Ordering::Greater => Tendency::HomeWin,
            std::cmp::Ordering::Equal => Tendency::Draw,
            std::cmp::Ordering::Less => Tendency::AwayWin,
        }
    }
}

/// League points for one result: 3 win, 1 draw, 0 loss.
pub fn match_points(goals_for: u32, goals_against: u32) -> u32 {
    match goals_for.cmp(&goals_against) {
        std::cmp::Ordering::Greater => 3,
        std::cmp::Ordering::Equal => 1,
        std::cmp::Ordering::Less => 0,
    }
}

/// Normalize probabilities to sum to 1.0
pub fn normalize_probabilities(probs: [f64; 3]) -> [f64; 3] {
    let sum: f64 = probs.iter().sum();
    if sum == 0.0 {
        return probs;
    }
    probs.map(|p| p / sum)
}

/// Fixed-width UTC timestamp so that text ordering in SQL matches time ordering.
pub fn db_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_db_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_tendency_from_goals() {
        assert_eq!(Tendency::from_goals(2, 1), Tendency::HomeWin);
        assert_eq!(Tendency::from_goals(0, 0), Tendency::Draw);
        assert_eq!(Tendency::from_goals(0, 3), Tendency::AwayWin);
    }

    #[test]
    fn test_match_points() {
        assert_eq!(match_points(3, 0), 3);
        assert_eq!(match_points(1, 1), 1);
        assert_eq!(match_points(0, 2), 0);
    }

    #[test]
    fn test_normalize_probabilities() {
        let normalized = normalize_probabilities([0.4, 0.3, 0.2]);
        let sum: f64 = normalized.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert_eq!(normalize_probabilities([0.0; 3]), [0.0; 3]);
    }

    #[test]
    fn test_db_timestamp_sorts_like_time() {
        let a = Utc.with_ymd_and_hms(2025, 8, 22, 18, 30, 0).unwrap();
        let b = a + chrono::Duration::milliseconds(1500);
        assert!(db_timestamp(a) < db_timestamp(b));
        assert_eq!(db_timestamp(a), "2025-08-22T18:30:00.000Z");
        assert_eq!(parse_db_timestamp(&db_timestamp(b)), Some(b));
    }
}
