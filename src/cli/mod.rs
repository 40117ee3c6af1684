use anyhow::{anyhow, Result};
use std::path::Path;

use crate::context::AppContext;
use crate::models::{EntityType, QualityReport, SyncOutcome, SyncResult};

pub async fn sync(ctx: &AppContext, entity: &str, force: bool, matchday: Option<u32>) -> Result<()> {
    let results = match (entity.to_lowercase().as_str(), matchday) {
        ("all", _) => {
            println!("📥 Syncing teams and matches...");
            ctx.sync_all(force).await
        }
        ("matches", Some(day)) => {
            println!("📥 Syncing matchday {}...", day);
            vec![ctx.sync_matchday(day, force).await]
        }
        (other, _) => {
            let entity: EntityType = other.parse().map_err(|e: String| anyhow!(e))?;
            println!("📥 Syncing {}...", entity);
            vec![ctx.run_sync(entity, force).await]
        }
    };

    for result in &results {
        print_sync_result(result);
    }

    if results.iter().any(|r| !r.is_success()) {
        return Err(anyhow!("sync did not complete cleanly"));
    }
    Ok(())
}

fn print_sync_result(result: &SyncResult) {
    match result.outcome {
        SyncOutcome::Skipped => println!("⏭️  {}: skipped, synced recently (use --force)", result.entity),
        SyncOutcome::Success => println!(
            "✅ {}: {} records synced, {} changed",
            result.entity, result.synced, result.changed
        ),
        SyncOutcome::PartialFailure => {
            println!(
                "⚠️  {}: {} records synced, {} errors",
                result.entity,
                result.synced,
                result.errors.len()
            );
            for error in result.errors.iter().take(10) {
                println!("   • {}", error);
            }
        }
        SyncOutcome::Failure => {
            println!("❌ {}: sync failed", result.entity);
            for error in &result.errors {
                println!("   • {}", error);
            }
        }
    }
}

pub async fn predict(ctx: &AppContext, matchday: Option<i32>) -> Result<()> {
    let matchday = match matchday {
        Some(day) => day,
        None => ctx.matchday_info().await?.next_matchday,
    };

    println!("🔮 Predictions for matchday {} ({})", matchday, ctx.config.season);
    let predictions = ctx.predictions.get_predictions_for_matchday(matchday).await?;

    if predictions.is_empty() {
        println!("📭 No matches stored for this matchday. Try: kickcast sync --entity all");
        return Ok(());
    }

    let names = team_names(ctx).await?;
    for prediction in &predictions {
        println!(
            "{:>24} {:^5} {:<24} | H {:>5.1}% D {:>5.1}% A {:>5.1}%",
            name_of(&names, prediction.home_team_id),
            prediction.predicted_score.to_string(),
            name_of(&names, prediction.away_team_id),
            prediction.home_win_probability * 100.0,
            prediction.draw_probability * 100.0,
            prediction.away_win_probability * 100.0
        );
    }
    Ok(())
}

pub async fn quality(ctx: &AppContext, export: Option<&Path>) -> Result<()> {
    let report = ctx.predictions.get_prediction_quality().await?;
    let stats = &report.stats;

    println!("📊 Prediction quality, season {}", ctx.config.season);
    println!("   Scored matches:   {}", stats.total);
    println!("   Exact hits:       {} ({:.1}%)", stats.exact, stats.exact_rate * 100.0);
    println!("   Tendency hits:    {} ({:.1}%)", stats.tendency, stats.tendency_rate * 100.0);
    println!("   Misses:           {}", stats.miss);
    println!("   Overall accuracy: {:.1}%", stats.overall_accuracy * 100.0);
    println!("   Quality score:    {:.3}", stats.quality_score);

    if let Some(path) = export {
        export_quality_csv(&report, path)?;
        println!("💾 Wrote {} rows to {}", report.entries.len(), path.display());
    }
    Ok(())
}

pub fn export_quality_csv(report: &QualityReport, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "match_id",
        "predicted_score",
        "actual_score",
        "home_win_probability",
        "draw_probability",
        "away_win_probability",
        "hit_type",
        "tendency_correct",
        "exact_score_correct",
        "quality_points",
    ])?;

    for entry in &report.entries {
        writer.write_record([
            entry.match_id.to_string(),
            entry.predicted_score.to_string(),
            entry.actual_score.to_string(),
            format!("{:.4}", entry.predicted_home_win_probability),
            format!("{:.4}", entry.predicted_draw_probability),
            format!("{:.4}", entry.predicted_away_win_probability),
            entry.hit_type.as_str().to_string(),
            entry.tendency_correct.to_string(),
            entry.exact_score_correct.to_string(),
            entry.hit_type.points().to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

pub async fn status(ctx: &AppContext) -> Result<()> {
    let stats = ctx.repo.database_stats().await?;
    println!("🗄️  Database");
    println!("   Teams:              {}", stats.teams);
    println!("   Matches:            {} ({} finished)", stats.matches, stats.finished_matches);
    println!("   Predictions:        {}", stats.predictions);
    println!("   Quality records:    {}", stats.prediction_quality);

    println!("\n🔄 Sync status");
    let statuses = ctx.repo.get_all_sync_status().await?;
    if statuses.is_empty() {
        println!("   Never synced");
    }
    for status in statuses {
        let icon = if status.success { "✅" } else { "❌" };
        println!(
            "   {} {:<8} {} | {} records | {}",
            icon,
            status.entity_type,
            status.last_sync.format("%Y-%m-%d %H:%M UTC"),
            status.records_synced,
            status.message
        );
    }
    Ok(())
}

pub async fn table(ctx: &AppContext) -> Result<()> {
    let table = ctx.league_table().await?;
    if table.is_empty() {
        println!("📭 No finished matches for season {}", ctx.config.season);
        return Ok(());
    }

    println!("🏆 Table, season {}", ctx.config.season);
    println!("{:>3}  {:<28} {:>3} {:>3} {:>3} {:>3} {:>7} {:>4} {:>4}", "#", "Team", "P", "W", "D", "L", "Goals", "GD", "Pts");
    for row in &table {
        println!(
            "{:>3}  {:<28} {:>3} {:>3} {:>3} {:>3} {:>3}:{:<3} {:>4} {:>4}",
            row.position,
            row.team_name,
            row.played,
            row.won,
            row.drawn,
            row.lost,
            row.goals_for,
            row.goals_against,
            row.goal_difference,
            row.points
        );
    }
    Ok(())
}

pub async fn query_team(ctx: &AppContext, name: &str) -> Result<()> {
    println!("🔍 Searching for team: {}", name);

    let Some(team) = ctx.find_team(name).await? else {
        println!("❌ No team found matching '{}'", name);
        let teams = ctx.repo.get_all_teams().await?;
        if !teams.is_empty() {
            println!("\n💡 Available teams:");
            for team in teams.iter().take(20) {
                println!("   • {} ({})", team.name, team.short_name);
            }
        }
        return Ok(());
    };

    let stats = ctx
        .predictions
        .engine()
        .statistics()
        .team_statistics(team.id, None)
        .await?;

    println!("🏟️  {} ({}) #{}", team.name, team.short_name, team.id);
    if let Some(logo) = &team.logo_url {
        println!("   Logo: {}", logo);
    }
    println!("   Matches in window: {}", stats.matches_considered);
    println!("   Form:              {:.3}", stats.form);
    println!("   Goals in window:   {}", stats.goal_rate);
    Ok(())
}

async fn team_names(ctx: &AppContext) -> Result<std::collections::HashMap<i64, String>> {
    Ok(ctx
        .repo
        .get_all_teams()
        .await?
        .into_iter()
        .map(|t| (t.id, t.name))
        .collect())
}

fn name_of(names: &std::collections::HashMap<i64, String>, id: i64) -> String {
    names.get(&id).cloned().unwrap_or_else(|| format!("Team {}", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HitType, PredictionQuality, QualityStats, Score};
    use chrono::Utc;

    #[test]
    fn quality_export_writes_one_row_per_entry() {
        let entry = PredictionQuality {
            match_id: 42,
            predicted_score: Score::new(2, 1),
            actual_score: Score::new(1, 0),
            predicted_home_win_probability: 0.5,
            predicted_draw_probability: 0.2,
            predicted_away_win_probability: 0.3,
            hit_type: HitType::TendencyMatch,
            tendency_correct: true,
            exact_score_correct: false,
            calculated_at: Utc::now(),
        };
        let report = QualityReport {
            entries: vec![entry],
            stats: QualityStats::default(),
        };

        let path = std::env::temp_dir().join(format!("kickcast-quality-{}.csv", std::process::id()));
        export_quality_csv(&report, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let lines: Vec<_> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("match_id,predicted_score"));
        assert_eq!(lines[1], "42,2:1,1:0,0.5000,0.2000,0.3000,tendency_match,true,false,1");
    }
}
