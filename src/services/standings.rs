use std::collections::HashMap;

use crate::models::{Match, TableEntry, Team, TeamId};
use crate::utils::match_points;

/// League table from finished matches. Only teams that have played appear.
/// Ordered by points, goal difference, goals scored, then name.
pub fn compute_table(teams: &[Team], matches: &[Match]) -> Vec<TableEntry> {
    let names: HashMap<TeamId, &str> = teams.iter().map(|t| (t.id, t.name.as_str())).collect();
    let mut rows: HashMap<TeamId, TableEntry> = HashMap::new();

    for m in matches.iter().filter(|m| m.finished) {
        for team_id in [m.home_team_id, m.away_team_id] {
            let Some((scored, conceded)) = m.goals_from_perspective(team_id) else {
                continue;
            };
            let row = rows.entry(team_id).or_insert_with(|| TableEntry {
                position: 0,
                team_id,
                team_name: names
                    .get(&team_id)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| format!("Team {}", team_id)),
                played: 0,
                won: 0,
                drawn: 0,
                lost: 0,
                goals_for: 0,
                goals_against: 0,
                goal_difference: 0,
                points: 0,
            });

            row.played += 1;
            row.goals_for += scored;
            row.goals_against += conceded;
            row.goal_difference = row.goals_for as i64 - row.goals_against as i64;
            let points = match_points(scored, conceded);
            row.points += points;
            match points {
                3 => row.won += 1,
                1 => row.drawn += 1,
                _ => row.lost += 1,
            }
        }
    }

    let mut table: Vec<TableEntry> = rows.into_values().collect();
    table.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then(b.goal_difference.cmp(&a.goal_difference))
            .then(b.goals_for.cmp(&a.goals_for))
            .then_with(|| a.team_name.cmp(&b.team_name))
    });
    for (index, row) in table.iter_mut().enumerate() {
        row.position = index as u32 + 1;
    }
    table
}
