//! Per-day walking totals.
//!
//! Sessions live in two places: the journal (not yet rolled up) and
//! `sessions.csv` (archived). Both are read, de-duplicated by session id, and
//! folded into one [`DailyWalkStats`] per calendar day.

use crate::rollup::{read_rows, SessionRow};
use crate::{DailyWalkStats, Result};
use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Every known session, journal entries first, each id once
pub fn load_rows(journal_path: &Path, csv_path: &Path) -> Result<Vec<SessionRow>> {
    let mut seen = HashSet::new();
    let mut rows = Vec::new();

    for summary in crate::journal::read_summaries(journal_path)? {
        if seen.insert(summary.id) {
            rows.push(SessionRow::from(&summary));
        }
    }
    let journaled = rows.len();

    for row in read_rows(csv_path)? {
        if seen.insert(row.id) {
            rows.push(row);
        }
    }

    tracing::debug!(
        "Loaded {} journaled and {} archived sessions",
        journaled,
        rows.len() - journaled
    );
    Ok(rows)
}

/// Fold rows into per-day totals for the `days` days ending at `today`.
///
/// Only days with at least one session are returned, newest first.
pub fn aggregate(rows: &[SessionRow], today: NaiveDate, days: u32) -> Vec<DailyWalkStats> {
    if days == 0 {
        return Vec::new();
    }
    let first_day = today - Duration::days(i64::from(days) - 1);

    let mut by_day: BTreeMap<NaiveDate, DailyWalkStats> = BTreeMap::new();
    for row in rows {
        if row.date < first_day || row.date > today {
            continue;
        }
        let stats = by_day.entry(row.date).or_insert_with(|| DailyWalkStats {
            date: row.date,
            total_steps: 0,
            total_distance_km: 0.0,
            total_coins: 0,
            sessions_count: 0,
        });
        stats.total_steps += row.steps;
        stats.total_distance_km += row.distance_km;
        stats.total_coins += row.coins;
        stats.sessions_count += 1;
    }

    by_day.into_values().rev().collect()
}

/// Per-day totals for the last `days` days from journal and CSV
pub fn daily_stats(
    journal_path: &Path,
    csv_path: &Path,
    today: NaiveDate,
    days: u32,
) -> Result<Vec<DailyWalkStats>> {
    let rows = load_rows(journal_path, csv_path)?;
    let stats = aggregate(&rows, today, days);
    tracing::info!("{} active days in the last {} days", stats.len(), days);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{JsonlSink, SessionSink};
    use crate::rollup::journal_to_csv;
    use crate::{ConfidenceTier, SessionSummary};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn row(date: NaiveDate, steps: u64, coins: u64) -> SessionRow {
        let started_at = Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).unwrap());
        SessionRow {
            id: Uuid::new_v4(),
            date,
            started_at,
            ended_at: started_at,
            steps,
            distance_km: coins as f64 / 100.0,
            coins,
            final_tier: ConfidenceTier::High,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
    }

    #[test]
    fn test_aggregate_per_day() {
        let rows = vec![
            row(day(10), 1000, 50),
            row(day(10), 500, 30),
            row(day(8), 2000, 120),
            row(day(1), 9999, 999),
        ];

        let stats = aggregate(&rows, day(10), 7);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].date, day(10));
        assert_eq!(stats[0].total_steps, 1500);
        assert_eq!(stats[0].total_coins, 80);
        assert_eq!(stats[0].sessions_count, 2);
        assert!((stats[0].total_distance_km - 0.8).abs() < 1e-9);
        assert_eq!(stats[1].date, day(8));
    }

    #[test]
    fn test_window_boundaries() {
        let rows = vec![row(day(4), 1, 1), row(day(3), 1, 1), row(day(11), 1, 1)];
        let stats = aggregate(&rows, day(10), 7);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].date, day(4));
        assert!(aggregate(&rows, day(10), 0).is_empty());
    }

    #[test]
    fn test_daily_stats_dedups_journal_and_csv() {
        let temp_dir = tempfile::tempdir().unwrap();
        let journal = temp_dir.path().join("sessions.wal");
        let csv_path = temp_dir.path().join("sessions.csv");

        let started_at = Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap();
        let summary = SessionSummary {
            id: Uuid::new_v4(),
            started_at,
            ended_at: started_at + Duration::minutes(10),
            steps: 800,
            distance_km: 0.6,
            coins: 60,
            final_tier: ConfidenceTier::High,
        };

        let mut sink = JsonlSink::new(&journal);
        sink.append(&summary).unwrap();
        journal_to_csv(&journal, &csv_path).unwrap();
        // Same session journaled again, as after a crash mid-rollup
        sink.append(&summary).unwrap();

        let rows = load_rows(&journal, &csv_path).unwrap();
        assert_eq!(rows.len(), 1);

        let today = rows[0].date;
        let stats = daily_stats(&journal, &csv_path, today, 7).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].sessions_count, 1);
        assert_eq!(stats[0].total_steps, 800);
    }
}
