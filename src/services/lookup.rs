use strsim::jaro_winkler;

use crate::models::Team;

const MIN_SIMILARITY: f64 = 0.75;

/// Best team for a free-text query: exact name or short name first, then substring,
/// then the closest Jaro-Winkler match above a floor.
pub fn find_team<'a>(query: &str, teams: &'a [Team]) -> Option<&'a Team> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    if let Some(team) = teams
        .iter()
        .find(|t| t.name.to_lowercase() == needle || t.short_name.to_lowercase() == needle)
    {
        return Some(team);
    }

    if let Some(team) = teams.iter().find(|t| t.name.to_lowercase().contains(&needle)) {
        return Some(team);
    }

    teams
        .iter()
        .map(|t| (t, jaro_winkler(&t.name.to_lowercase(), &needle)))
        .filter(|(_, score)| *score >= MIN_SIMILARITY)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(team, _)| team)
}
