use std::collections::BTreeSet;

use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};
use sqlx::SqlitePool;
use tracing::debug;

use crate::db;
use crate::error::Result;
use crate::models::{
    Activity, ActivityFilter, BmiCategory, DayOfWeekPattern, Metric, MetricsSummary,
    StudentMetrics, TrendPoint, WeightDirection, WeightProgress, WindowMetrics,
};

/// Minimum number of rows before weekday patterns mean anything.
pub const MIN_PATTERN_ROWS: usize = 5;

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// First day of a window ending `today`; clamps to the earliest date chrono can hold.
pub fn window_start(today: NaiveDate, window_days: i64) -> NaiveDate {
    Duration::try_days(window_days.max(0))
        .and_then(|span| today.checked_sub_signed(span))
        .unwrap_or(NaiveDate::MIN)
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

pub fn calculate_bmi(height_cm: Option<f64>, weight_kg: Option<f64>) -> Option<f64> {
    let height_cm = height_cm.filter(|h| *h > 0.0)?;
    let weight_kg = weight_kg.filter(|w| *w > 0.0)?;
    let height_m = height_cm / 100.0;
    Some(round_to(weight_kg / (height_m * height_m), 1))
}

pub fn bmi_category(bmi: Option<f64>) -> BmiCategory {
    match bmi {
        None => BmiCategory::Unknown,
        Some(value) if value < 18.5 => BmiCategory::Underweight,
        Some(value) if value < 25.0 => BmiCategory::NormalWeight,
        Some(value) if value < 30.0 => BmiCategory::Overweight,
        Some(_) => BmiCategory::Obese,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Latest row by date, with insertion id breaking same-date ties.
pub fn latest_activity(rows: &[Activity]) -> Option<&Activity> {
    rows.iter().max_by_key(|activity| (activity.date, activity.id))
}

/// Aggregates a window of rows. Totals treat nulls as zero, means skip them.
pub fn summarize(rows: &[Activity], height_cm: Option<f64>) -> WindowMetrics {
    let Some(latest) = latest_activity(rows) else {
        return WindowMetrics::NoActivity;
    };

    let latest_weight = latest.weight_kg;
    let bmi = calculate_bmi(height_cm, latest_weight);

    WindowMetrics::Observed(MetricsSummary {
        total_steps: rows.iter().filter_map(|a| a.steps).sum(),
        avg_steps: mean(rows.iter().filter_map(|a| Metric::Steps.value(a))),
        total_calories: rows.iter().filter_map(|a| a.calories).sum(),
        avg_active_minutes: mean(rows.iter().filter_map(|a| Metric::ActiveMinutes.value(a))),
        latest_weight,
        bmi,
        bmi_category: bmi_category(bmi),
    })
}

/// Returns `None` when the student does not exist.
pub async fn get_student_metrics(
    pool: &SqlitePool,
    student_id: i64,
    window_days: i64,
    today: NaiveDate,
) -> Result<Option<StudentMetrics>> {
    let Some(student) = db::fetch_student(pool, student_id).await? else {
        debug!("No student {} for metrics", student_id);
        return Ok(None);
    };

    let start = window_start(today, window_days);
    let filter = ActivityFilter {
        date_from: Some(start),
        date_to: Some(today),
        limit: None,
    };
    let activity_rows = db::fetch_activities(pool, student_id, &filter).await?;
    let metrics = summarize(&activity_rows, student.height_cm);

    debug!(
        "Computed metrics for student {} over {} rows",
        student_id,
        activity_rows.len()
    );

    Ok(Some(StudentMetrics {
        student,
        window_start: start,
        window_end: today,
        metrics,
        activity_rows,
    }))
}

/// Consecutive logged days ending today, or yesterday when today has no row yet.
///
/// Several rows on one date count as a single day. Rows dated after `today`
/// are ignored.
pub fn activity_streak(rows: &[Activity], today: NaiveDate) -> u32 {
    let dates: BTreeSet<NaiveDate> = rows
        .iter()
        .map(|a| a.date)
        .filter(|date| *date <= today)
        .collect();

    let mut expected = today;
    let mut streak = 0;
    for date in dates.into_iter().rev() {
        if date == expected || expected.pred_opt() == Some(date) {
            streak += 1;
            expected = date;
        } else {
            break;
        }
    }
    streak
}

/// Best and worst weekday by mean steps, scanning Monday through Sunday.
pub fn day_of_week_pattern(rows: &[Activity]) -> Option<DayOfWeekPattern> {
    if rows.len() < MIN_PATTERN_ROWS {
        return None;
    }

    let mut buckets = [(0.0f64, 0usize); 7];
    for activity in rows {
        if let Some(steps) = activity.steps {
            let slot = &mut buckets[activity.date.weekday().num_days_from_monday() as usize];
            slot.0 += steps as f64;
            slot.1 += 1;
        }
    }

    let mut best: Option<(Weekday, f64)> = None;
    let mut worst: Option<(Weekday, f64)> = None;
    for (weekday, (sum, count)) in WEEK.iter().zip(buckets) {
        if count == 0 {
            continue;
        }
        let avg = sum / count as f64;
        if best.map_or(true, |(_, value)| avg > value) {
            best = Some((*weekday, avg));
        }
        if worst.map_or(true, |(_, value)| avg < value) {
            worst = Some((*weekday, avg));
        }
    }

    let (best_day, best_avg_steps) = best?;
    let (worst_day, worst_avg_steps) = worst?;
    Some(DayOfWeekPattern {
        best_day,
        best_avg_steps,
        worst_day,
        worst_avg_steps,
    })
}

pub fn goal_days_met(rows: &[Activity], metric: Metric, goal: f64) -> usize {
    rows.iter()
        .filter(|a| metric.value(a).is_some_and(|value| value >= goal))
        .count()
}

/// Percentage of rows whose metric meets or exceeds `goal`; nulls never do.
pub fn goal_achievement_rate(rows: &[Activity], metric: Metric, goal: f64) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    goal_days_met(rows, metric, goal) as f64 / rows.len() as f64 * 100.0
}

pub fn trend(rows: &[Activity], metric: Metric) -> Vec<TrendPoint> {
    let mut ordered: Vec<&Activity> = rows.iter().collect();
    ordered.sort_by_key(|a| (a.date, a.id));
    ordered
        .into_iter()
        .filter_map(|a| {
            metric.value(a).map(|value| TrendPoint {
                date: a.date,
                value,
            })
        })
        .collect()
}

/// Share of the window's days that have at least one row, capped at 100.
pub fn consistency(rows: &[Activity], window_days: i64) -> f64 {
    if window_days <= 0 {
        return 0.0;
    }
    let active_days: BTreeSet<NaiveDate> = rows.iter().map(|a| a.date).collect();
    (active_days.len() as f64 / window_days as f64 * 100.0).min(100.0)
}

pub fn avg_daily_calories(total_calories: f64, window_days: i64) -> f64 {
    if window_days <= 0 {
        return 0.0;
    }
    total_calories / window_days as f64
}

pub fn has_step_day_over(rows: &[Activity], threshold: i64) -> bool {
    rows.iter().any(|a| a.steps.is_some_and(|steps| steps > threshold))
}

/// Progress from the oldest logged weight toward `goal_kg`, capped at 100%.
pub fn weight_goal_progress(rows: &[Activity], goal_kg: f64) -> Option<WeightProgress> {
    let mut weighed: Vec<(&Activity, f64)> = rows
        .iter()
        .filter_map(|a| a.weight_kg.map(|weight| (a, weight)))
        .collect();
    weighed.sort_by_key(|(a, _)| (a.date, a.id));

    let starting_weight = weighed.first()?.1;
    let current_weight = weighed.last()?.1;

    let (direction, target, achieved) = if starting_weight > goal_kg {
        (
            WeightDirection::Lose,
            starting_weight - goal_kg,
            starting_weight - current_weight,
        )
    } else {
        (
            WeightDirection::Gain,
            goal_kg - starting_weight,
            current_weight - starting_weight,
        )
    };
    let progress_pct = if target > 0.0 {
        (achieved / target * 100.0).min(100.0)
    } else {
        0.0
    };

    Some(WeightProgress {
        starting_weight,
        current_weight,
        goal_weight: goal_kg,
        direction,
        progress_pct,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{FitnessLevel, NewActivity, NewStudent};

    pub(crate) fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn row(id: i64, date: NaiveDate, steps: Option<i64>) -> Activity {
        Activity {
            id,
            student_id: 1,
            date,
            steps,
            active_minutes: Some(30),
            distance: None,
            calories: Some(200.0),
            heart_rate: None,
            weight_kg: None,
        }
    }

    #[test]
    fn bmi_rounds_to_one_decimal() {
        assert_eq!(calculate_bmi(Some(170.0), Some(70.0)), Some(24.2));
        assert_eq!(calculate_bmi(Some(165.0), Some(55.0)), Some(20.2));
    }

    #[test]
    fn bmi_needs_both_inputs() {
        assert_eq!(calculate_bmi(Some(0.0), Some(70.0)), None);
        assert_eq!(calculate_bmi(Some(170.0), None), None);
        assert_eq!(calculate_bmi(None, Some(70.0)), None);
        assert_eq!(calculate_bmi(Some(170.0), Some(0.0)), None);
    }

    #[test]
    fn bmi_bands_include_lower_edge() {
        assert_eq!(bmi_category(None), BmiCategory::Unknown);
        assert_eq!(bmi_category(Some(18.4)), BmiCategory::Underweight);
        assert_eq!(bmi_category(Some(18.5)), BmiCategory::NormalWeight);
        assert_eq!(bmi_category(Some(24.9)), BmiCategory::NormalWeight);
        assert_eq!(bmi_category(Some(25.0)), BmiCategory::Overweight);
        assert_eq!(bmi_category(Some(30.0)), BmiCategory::Obese);
    }

    #[test]
    fn bmi_category_matches_computed_bands() {
        for height in [150.0, 165.0, 180.0, 195.0] {
            for weight in [40.0, 55.0, 70.0, 85.0, 110.0] {
                let bmi = calculate_bmi(Some(height), Some(weight)).unwrap();
                let expected = if bmi < 18.5 {
                    BmiCategory::Underweight
                } else if bmi < 25.0 {
                    BmiCategory::NormalWeight
                } else if bmi < 30.0 {
                    BmiCategory::Overweight
                } else {
                    BmiCategory::Obese
                };
                assert_eq!(bmi_category(Some(bmi)), expected);
                assert_eq!(calculate_bmi(Some(height), Some(weight)), Some(bmi));
            }
        }
    }

    #[test]
    fn summary_averages_steps() {
        let rows = vec![
            row(3, day(2026, 3, 3), Some(3000)),
            row(2, day(2026, 3, 2), Some(12000)),
            row(1, day(2026, 3, 1), Some(8000)),
        ];
        let summary = summarize(&rows, Some(170.0)).summary();
        assert_eq!(summary.total_steps, 23000);
        assert_eq!(format!("{:.2}", summary.avg_steps), "7666.67");
        assert_eq!(summary.total_calories, 600.0);
        assert_eq!(summary.avg_active_minutes, 30.0);
    }

    #[test]
    fn summary_skips_null_steps_in_mean() {
        let rows = vec![
            row(1, day(2026, 3, 1), Some(4000)),
            row(2, day(2026, 3, 2), None),
        ];
        let summary = summarize(&rows, None).summary();
        assert_eq!(summary.total_steps, 4000);
        assert_eq!(summary.avg_steps, 4000.0);
    }

    #[test]
    fn latest_weight_drives_bmi() {
        let mut older = row(1, day(2026, 3, 1), Some(5000));
        older.weight_kg = Some(72.0);
        let mut newer = row(2, day(2026, 3, 2), Some(5000));
        newer.weight_kg = Some(70.0);

        let summary = summarize(&[older, newer], Some(170.0)).summary();
        assert_eq!(summary.latest_weight, Some(70.0));
        assert_eq!(summary.bmi, Some(24.2));
        assert_eq!(summary.bmi_category.as_str(), "Normal weight");
    }

    #[test]
    fn same_date_rows_prefer_latest_insert() {
        let mut first = row(4, day(2026, 3, 2), Some(5000));
        first.weight_kg = Some(60.0);
        let mut second = row(9, day(2026, 3, 2), Some(5000));
        second.weight_kg = Some(61.0);

        let summary = summarize(&[first, second], Some(170.0)).summary();
        assert_eq!(summary.latest_weight, Some(61.0));
    }

    #[test]
    fn window_start_clamps_huge_windows() {
        let today = day(2026, 3, 10);
        assert_eq!(window_start(today, 7), day(2026, 3, 3));
        assert_eq!(window_start(today, -4), today);
        assert_eq!(window_start(today, 100_000_000), NaiveDate::MIN);
        assert_eq!(window_start(today, i64::MAX), NaiveDate::MIN);
    }

    #[test]
    fn empty_rows_are_no_activity() {
        assert_eq!(summarize(&[], Some(170.0)), WindowMetrics::NoActivity);
    }

    #[test]
    fn streak_counts_consecutive_days() {
        let today = day(2026, 3, 10);
        let rows = vec![
            row(1, today, Some(1)),
            row(2, day(2026, 3, 9), Some(1)),
            row(3, day(2026, 3, 8), Some(1)),
        ];
        assert_eq!(activity_streak(&rows, today), 3);
    }

    #[test]
    fn streak_stops_at_gap() {
        let today = day(2026, 3, 10);
        let rows = vec![
            row(1, today, Some(1)),
            row(2, day(2026, 3, 7), Some(1)),
            row(3, day(2026, 3, 6), Some(1)),
        ];
        assert_eq!(activity_streak(&rows, today), 1);

        let stale = vec![row(1, day(2026, 3, 7), Some(1))];
        assert_eq!(activity_streak(&stale, today), 0);
    }

    #[test]
    fn streak_allows_one_day_grace() {
        let today = day(2026, 3, 10);
        let rows = vec![
            row(1, day(2026, 3, 9), Some(1)),
            row(2, day(2026, 3, 8), Some(1)),
        ];
        assert_eq!(activity_streak(&rows, today), 2);
    }

    #[test]
    fn streak_counts_duplicate_dates_once() {
        let today = day(2026, 3, 10);
        let rows = vec![
            row(1, today, Some(1)),
            row(2, today, Some(1)),
            row(3, day(2026, 3, 9), Some(1)),
            row(4, day(2026, 3, 12), Some(1)),
        ];
        assert_eq!(activity_streak(&rows, today), 2);
    }

    #[test]
    fn weekday_pattern_needs_five_rows() {
        let rows: Vec<Activity> = (0..4)
            .map(|i| row(i, day(2026, 3, 2) + Duration::days(i), Some(1000)))
            .collect();
        assert!(day_of_week_pattern(&rows).is_none());
    }

    #[test]
    fn weekday_pattern_finds_best_and_worst() {
        // 2026-03-02 is a Monday.
        let rows = vec![
            row(1, day(2026, 3, 2), Some(4000)),
            row(2, day(2026, 3, 9), Some(6000)),
            row(3, day(2026, 3, 3), Some(12000)),
            row(4, day(2026, 3, 4), Some(2000)),
            row(5, day(2026, 3, 5), Some(7000)),
        ];
        let pattern = day_of_week_pattern(&rows).unwrap();
        assert_eq!(pattern.best_day, Weekday::Tue);
        assert_eq!(pattern.worst_day, Weekday::Wed);
        assert_eq!(pattern.worst_avg_steps, 2000.0);
    }

    #[test]
    fn weekday_ties_go_to_earlier_day() {
        let rows: Vec<Activity> = (0..7)
            .map(|i| row(i, day(2026, 3, 2) + Duration::days(i), Some(5000)))
            .collect();
        let pattern = day_of_week_pattern(&rows).unwrap();
        assert_eq!(pattern.best_day, Weekday::Mon);
        assert_eq!(pattern.worst_day, Weekday::Mon);
    }

    #[test]
    fn goal_rate_counts_rows_meeting_goal() {
        let rows = vec![
            row(1, day(2026, 3, 1), Some(8000)),
            row(2, day(2026, 3, 2), Some(7500)),
            row(3, day(2026, 3, 3), Some(9100)),
            row(4, day(2026, 3, 4), Some(10000)),
            row(5, day(2026, 3, 5), Some(4000)),
        ];
        assert_eq!(goal_achievement_rate(&rows, Metric::Steps, 7500.0), 80.0);
        assert_eq!(goal_days_met(&rows, Metric::Steps, 7500.0), 4);
        assert_eq!(goal_achievement_rate(&[], Metric::Steps, 7500.0), 0.0);
    }

    #[test]
    fn null_metric_never_meets_goal() {
        let rows = vec![
            row(1, day(2026, 3, 1), None),
            row(2, day(2026, 3, 2), Some(9000)),
        ];
        assert_eq!(goal_achievement_rate(&rows, Metric::Steps, 100.0), 50.0);
    }

    #[test]
    fn trend_is_oldest_first() {
        let rows = vec![
            row(2, day(2026, 3, 2), Some(2000)),
            row(1, day(2026, 3, 1), Some(1000)),
            row(3, day(2026, 3, 3), None),
        ];
        let points = trend(&rows, Metric::Steps);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, day(2026, 3, 1));
        assert_eq!(points[1].value, 2000.0);
    }

    #[test]
    fn degenerate_windows_yield_zero() {
        let rows = vec![row(1, day(2026, 3, 1), Some(1000))];
        assert_eq!(consistency(&rows, 0), 0.0);
        assert_eq!(avg_daily_calories(500.0, 0), 0.0);
        assert_eq!(consistency(&rows, 10), 10.0);
        assert_eq!(avg_daily_calories(300.0, 30), 10.0);
    }

    #[test]
    fn weight_progress_tracks_loss_and_gain() {
        let mut start = row(1, day(2026, 3, 1), None);
        start.weight_kg = Some(80.0);
        let mut now = row(2, day(2026, 3, 20), None);
        now.weight_kg = Some(77.0);
        let rows = vec![now, start];

        let loss = weight_goal_progress(&rows, 74.0).unwrap();
        assert_eq!(loss.direction, WeightDirection::Lose);
        assert_eq!(loss.progress_pct, 50.0);

        let gain = weight_goal_progress(&rows, 90.0).unwrap();
        assert_eq!(gain.direction, WeightDirection::Gain);
        assert!(gain.progress_pct < 0.0);

        let reached = weight_goal_progress(&rows, 78.0).unwrap();
        assert_eq!(reached.progress_pct, 100.0);

        assert!(weight_goal_progress(&[row(3, day(2026, 3, 1), None)], 70.0).is_none());
    }

    #[tokio::test]
    async fn metrics_for_missing_student_are_absent() {
        let pool = db::test_pool().await;
        let result = get_student_metrics(&pool, 42, 30, day(2026, 3, 10))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn huge_window_reads_all_history() {
        let pool = db::test_pool().await;
        let student = db::insert_student(
            &pool,
            &NewStudent {
                name: "Alice".to_string(),
                height_cm: Some(165.0),
                ..NewStudent::default()
            },
        )
        .await
        .unwrap();
        db::insert_activity(
            &pool,
            &NewActivity {
                student_id: student.id,
                date: day(2020, 1, 15),
                steps: Some(4000),
                active_minutes: None,
                distance: None,
                calories: None,
                heart_rate: None,
                weight_kg: None,
            },
        )
        .await
        .unwrap();

        let result = get_student_metrics(&pool, student.id, 100_000_000, day(2026, 3, 10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.window_start, NaiveDate::MIN);
        assert_eq!(result.activity_rows.len(), 1);
        assert_eq!(result.metrics.summary().total_steps, 4000);
        assert_eq!(avg_daily_calories(0.0, 100_000_000), 0.0);
    }

    #[tokio::test]
    async fn metrics_without_rows_are_zeroed() {
        let pool = db::test_pool().await;
        let student = db::insert_student(
            &pool,
            &NewStudent {
                name: "Charlie".to_string(),
                fitness_level: Some(FitnessLevel::Advanced),
                height_cm: Some(160.0),
                ..NewStudent::default()
            },
        )
        .await
        .unwrap();

        let result = get_student_metrics(&pool, student.id, 30, day(2026, 3, 10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.metrics, WindowMetrics::NoActivity);
        let summary = result.metrics.summary();
        assert_eq!(summary.avg_steps, 0.0);
        assert_eq!(summary.latest_weight, None);
        assert_eq!(summary.bmi, None);
        assert_eq!(summary.bmi_category.as_str(), "N/A");
    }

    #[tokio::test]
    async fn metrics_respect_window_bounds() {
        let pool = db::test_pool().await;
        let student = db::insert_student(
            &pool,
            &NewStudent {
                name: "Bob".to_string(),
                height_cm: Some(170.0),
                ..NewStudent::default()
            },
        )
        .await
        .unwrap();
        let today = day(2026, 3, 31);

        for (date, steps, weight) in [
            (day(2026, 3, 31), 3000, 70.0),
            (day(2026, 3, 20), 12000, 71.0),
            (day(2026, 3, 1), 8000, 72.0),
            (day(2026, 2, 27), 50000, 90.0),
            (day(2026, 4, 1), 50000, 90.0),
        ] {
            db::insert_activity(
                &pool,
                &NewActivity {
                    student_id: student.id,
                    date,
                    steps: Some(steps),
                    active_minutes: Some(20),
                    distance: None,
                    calories: Some(100.0),
                    heart_rate: None,
                    weight_kg: Some(weight),
                },
            )
            .await
            .unwrap();
        }

        let result = get_student_metrics(&pool, student.id, 30, today)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.activity_rows.len(), 3);
        assert_eq!(result.window_start, day(2026, 3, 1));
        let summary = result.metrics.summary();
        assert_eq!(summary.total_steps, 23000);
        assert_eq!(format!("{:.2}", summary.avg_steps), "7666.67");
        assert_eq!(summary.latest_weight, Some(70.0));
        assert_eq!(summary.bmi, Some(24.2));
        assert_eq!(summary.bmi_category, BmiCategory::NormalWeight);
    }
}
