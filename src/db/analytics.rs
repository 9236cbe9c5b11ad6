//! Dashboard KPIs and per-member task statistics.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::debug;

use crate::error::Result;

/// Days covered by the dashboard trend, today included.
pub const TREND_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardKpis {
    pub open_tasks: i64,
    pub in_progress: i64,
    pub closed_today: i64,
    pub closed_this_hour: i64,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusShare {
    pub status: String,
    pub count: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub tasks_created: i64,
    pub tasks_completed: i64,
    pub tasks_in_progress: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TeamPerformance {
    pub team_name: String,
    pub completed: i64,
    pub in_progress: i64,
    pub open: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub kpis: DashboardKpis,
    pub task_distribution: Vec<StatusShare>,
    pub trend: Vec<TrendPoint>,
    pub team_performance: Vec<TeamPerformance>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberStats {
    pub name: String,
    pub total_assigned: i64,
    pub ongoing: i64,
    pub completed: i64,
    pub trend_percent: f64,
}

/// Which timestamp a trend bucket was counted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrendSeries {
    Created,
    Completed,
    InProgress,
}

impl TrendSeries {
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "created" => Some(TrendSeries::Created),
            "completed" => Some(TrendSeries::Completed),
            "in_progress" => Some(TrendSeries::InProgress),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendBucket {
    pub series: TrendSeries,
    pub day: NaiveDate,
    pub count: i64,
}

#[derive(sqlx::FromRow)]
struct KpiRow {
    total: i64,
    open_tasks: i64,
    in_progress: i64,
    finished: i64,
    closed_today: i64,
    closed_this_hour: i64,
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    name: String,
    total_assigned: i64,
    ongoing: i64,
    completed: i64,
}

const KPI_QUERY: &str = r#"
    SELECT
        COUNT(*) AS total,
        COUNT(*) FILTER (WHERE status = 'open') AS open_tasks,
        COUNT(*) FILTER (WHERE status = 'in_progress') AS in_progress,
        COUNT(*) FILTER (WHERE status IN ('completed', 'closed')) AS finished,
        COUNT(*) FILTER (WHERE closed_at >= $1 AND closed_at < $2) AS closed_today,
        COUNT(*) FILTER (WHERE closed_at >= $3 AND closed_at <= $4) AS closed_this_hour
    FROM tasks
"#;

const TREND_QUERY: &str = r#"
    SELECT 'created' AS series, (created_at AT TIME ZONE 'UTC')::date AS day, COUNT(*) AS count
    FROM tasks WHERE created_at >= $1 GROUP BY 2
    UNION ALL
    SELECT 'completed', (closed_at AT TIME ZONE 'UTC')::date, COUNT(*)
    FROM tasks WHERE closed_at IS NOT NULL AND closed_at >= $1 GROUP BY 2
    UNION ALL
    SELECT 'in_progress', (last_updated AT TIME ZONE 'UTC')::date, COUNT(*)
    FROM tasks WHERE status = 'in_progress' AND last_updated >= $1 GROUP BY 2
"#;

const TEAM_QUERY: &str = r#"
    SELECT
        team_name,
        COUNT(*) FILTER (WHERE status IN ('completed', 'closed')) AS completed,
        COUNT(*) FILTER (WHERE status = 'in_progress') AS in_progress,
        COUNT(*) FILTER (WHERE status = 'open') AS open
    FROM tasks
    GROUP BY team_name
    ORDER BY team_name
"#;

const MEMBER_QUERY: &str = r#"
    SELECT
        member_name AS name,
        COUNT(*) AS total_assigned,
        COUNT(*) FILTER (WHERE status = 'in_progress') AS ongoing,
        COUNT(*) FILTER (WHERE status IN ('completed', 'closed')) AS completed
    FROM tasks
    GROUP BY member_name
    ORDER BY member_name
"#;

#[derive(Clone)]
pub struct AnalyticsRepository {
    pool: PgPool,
}

impl AnalyticsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn dashboard(&self, now: DateTime<Utc>) -> Result<Dashboard> {
        let start_today = start_of_day(now);
        let start_hour = now - Duration::hours(1);
        let window_start = start_today - Duration::days(TREND_DAYS - 1);

        let kpi: KpiRow = sqlx::query_as(KPI_QUERY)
            .bind(start_today)
            .bind(start_today + Duration::days(1))
            .bind(start_hour)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        let status_counts: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM tasks GROUP BY status ORDER BY status")
                .fetch_all(&self.pool)
                .await?;

        let buckets: Vec<TrendBucket> = sqlx::query_as::<_, (String, NaiveDate, i64)>(TREND_QUERY)
            .bind(window_start)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .filter_map(|(label, day, count)| {
                TrendSeries::from_label(&label).map(|series| TrendBucket { series, day, count })
            })
            .collect();

        let team_performance: Vec<TeamPerformance> =
            sqlx::query_as(TEAM_QUERY).fetch_all(&self.pool).await?;

        debug!(total = kpi.total, teams = team_performance.len(), "Dashboard computed");

        Ok(Dashboard {
            kpis: DashboardKpis {
                open_tasks: kpi.open_tasks,
                in_progress: kpi.in_progress,
                closed_today: kpi.closed_today,
                closed_this_hour: kpi.closed_this_hour,
                completion_rate: percentage(kpi.finished, kpi.total),
            },
            task_distribution: distribution(status_counts, kpi.total),
            trend: fill_trend(window_start.date_naive(), &buckets),
            team_performance,
        })
    }

    pub async fn task_management(&self) -> Result<Vec<MemberStats>> {
        let rows: Vec<MemberRow> = sqlx::query_as(MEMBER_QUERY).fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|row| MemberStats {
                trend_percent: percentage(row.completed, row.total_assigned),
                name: row.name,
                total_assigned: row.total_assigned,
                ongoing: row.ongoing,
                completed: row.completed,
            })
            .collect())
    }
}

/// `part / total` as a percentage rounded to two decimals; 0 when empty.
pub fn percentage(part: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 10_000.0).round() / 100.0
}

pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(chrono::NaiveTime::MIN).and_utc()
}

fn distribution(status_counts: Vec<(String, i64)>, total: i64) -> Vec<StatusShare> {
    status_counts
        .into_iter()
        .map(|(status, count)| StatusShare {
            percentage: percentage(count, total),
            status,
            count,
        })
        .collect()
}

/// One point per day from `first_day`, zero where no bucket landed.
pub fn fill_trend(first_day: NaiveDate, buckets: &[TrendBucket]) -> Vec<TrendPoint> {
    let mut counts: HashMap<(TrendSeries, NaiveDate), i64> = HashMap::new();
    for bucket in buckets {
        *counts.entry((bucket.series, bucket.day)).or_default() += bucket.count;
    }
    let count = |series: TrendSeries, day: NaiveDate| counts.get(&(series, day)).copied().unwrap_or(0);

    (0..TREND_DAYS)
        .map(|offset| {
            let day = first_day + Duration::days(offset);
            TrendPoint {
                date: day,
                tasks_created: count(TrendSeries::Created, day),
                tasks_completed: count(TrendSeries::Completed, day),
                tasks_in_progress: count(TrendSeries::InProgress, day),
            }
        })
        .collect()
}
