use chrono::NaiveDate;
use serde::Serialize;

use crate::metrics;
use crate::models::{
    Activity, BmiCategory, DayOfWeekPattern, FitnessLevel, MetricsSummary, StudentMetrics,
};
use crate::session::StudentGoals;

pub const DEFAULT_STEPS_GOAL: i64 = 7500;
pub const DEFAULT_ACTIVE_MINUTES_GOAL: i64 = 30;
pub const PREMIUM_POINTS: i64 = 30;
/// Gaps longer than this many days since the last row raise a logging alert.
pub const LOGGING_GAP_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActivityLevel {
    Low,
    Moderate,
    High,
}

impl ActivityLevel {
    pub fn from_avg_steps(avg_steps: f64) -> Self {
        if avg_steps < 5000.0 {
            ActivityLevel::Low
        } else if avg_steps < 7500.0 {
            ActivityLevel::Moderate
        } else {
            ActivityLevel::High
        }
    }

    pub fn advice(&self) -> &'static str {
        match self {
            ActivityLevel::Low => "Your activity level is relatively low. Try to increase your daily steps by 500 each week until you reach at least 7,500 steps per day.",
            ActivityLevel::Moderate => "Your activity level is moderate. You're on the right track! Try to reach 10,000 steps on at least 3 days per week.",
            ActivityLevel::High => "Your activity level is good! Consider adding some strength training to complement your cardio activity.",
        }
    }

    pub fn weekly_focus(&self) -> (&'static str, &'static str) {
        match self {
            ActivityLevel::Low => (
                "Consistency",
                "Try to be active every day, even if just for 10 minutes. Add a 5-minute walk after each meal to easily increase your daily steps.",
            ),
            ActivityLevel::Moderate => (
                "Intensity",
                "Add short bursts of higher intensity to your routine. Try walking faster for 30 seconds, then normal pace for 2 minutes, and repeat.",
            ),
            ActivityLevel::High => (
                "Recovery",
                "Make sure you're balancing activity with proper rest. Add some gentle stretching or yoga to help your muscles recover.",
            ),
        }
    }
}

/// Suggested activities; a student without a level gets the advanced list.
pub fn activities_for(level: Option<FitnessLevel>) -> &'static [&'static str] {
    match level {
        Some(FitnessLevel::Beginner) => &[
            "Walking: start with 15-20 minute walks and gradually increase duration",
            "Light stretching: 5-10 minutes daily to improve flexibility",
            "Chair exercises: if mobility is limited, try seated exercises",
            "Water activities: swimming or water walking for low-impact exercise",
        ],
        Some(FitnessLevel::Intermediate) => &[
            "Brisk walking or light jogging: 20-30 minutes, 3-4 times per week",
            "Bodyweight exercises: push-ups, squats, and lunges",
            "Cycling: great for cardio and lower body strength",
            "Group fitness classes: try a beginner or intermediate class",
        ],
        Some(FitnessLevel::Advanced) | None => &[
            "Interval training: mix high-intensity bursts with recovery periods",
            "Strength training: add weights to your routine 2-3 times per week",
            "Running or jogging: work up to 5K or longer distances",
            "Sports participation: join a local team or league",
            "Advanced classes: HIIT, spinning, or boot camp style workouts",
        ],
    }
}

pub fn bmi_advice(category: BmiCategory) -> Option<&'static [&'static str]> {
    match category {
        BmiCategory::Unknown => None,
        BmiCategory::Underweight => Some(&[
            "Increase caloric intake with nutrient-dense foods",
            "Add strength training to build muscle mass",
            "Focus on protein-rich foods after exercise",
            "Consult a healthcare provider about healthy weight gain",
        ]),
        BmiCategory::NormalWeight => Some(&[
            "Continue your balanced approach to activity",
            "Focus on maintaining strength and cardiovascular fitness",
            "Add variety to your routine to stay engaged",
            "Pay attention to recovery and sleep quality",
        ]),
        BmiCategory::Overweight => Some(&[
            "Gradually increase activity levels, especially cardio",
            "Set a goal of 150+ active minutes per week",
            "Add strength training to build muscle and boost metabolism",
            "Focus on nutrient-dense foods and portion awareness",
        ]),
        BmiCategory::Obese => Some(&[
            "Start with low-impact activities like walking or swimming",
            "Build up gradually to avoid injury",
            "Set realistic, small goals for daily activity",
            "Consult a healthcare provider about a safe approach",
        ]),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GoalStatus {
    NoGoals,
    Exceeding,
    WorkingToward,
}

impl GoalStatus {
    pub fn message(&self) -> &'static str {
        match self {
            GoalStatus::NoGoals => "You haven't set any specific goals yet. Setting clear, achievable goals gives you something concrete to work toward.",
            GoalStatus::Exceeding => "You're exceeding your current goals. Consider increasing your step goal by 10% or adding a new type of activity.",
            GoalStatus::WorkingToward => "You're making progress! Focus on consistency rather than perfection and do at least some activity every day.",
        }
    }
}

pub fn goal_status(summary: &MetricsSummary, goals: Option<&StudentGoals>) -> GoalStatus {
    let Some(goals) = goals else {
        return GoalStatus::NoGoals;
    };
    let steps_goal = goals.steps.unwrap_or(DEFAULT_STEPS_GOAL) as f64;
    let minutes_goal = goals.active_minutes.unwrap_or(DEFAULT_ACTIVE_MINUTES_GOAL) as f64;

    if summary.avg_steps >= steps_goal && summary.avg_active_minutes >= minutes_goal {
        GoalStatus::Exceeding
    } else {
        GoalStatus::WorkingToward
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Premium {
    Unlocked(&'static [&'static str]),
    Locked { points_needed: i64 },
}

pub fn premium(points: i64) -> Premium {
    if points >= PREMIUM_POINTS {
        Premium::Unlocked(&[
            "Monday: Cardio - walking/jogging",
            "Tuesday: Strength - upper body",
            "Wednesday: Rest or light activity",
            "Thursday: Cardio - interval training",
            "Friday: Strength - lower body",
            "Weekend: Active recovery (walking, swimming)",
        ])
    } else {
        Premium::Locked {
            points_needed: PREMIUM_POINTS - points,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoggingStatus {
    OnTrack,
    Lapsed,
}

impl LoggingStatus {
    pub fn from_gap(days_since_last: Option<i64>) -> Self {
        match days_since_last {
            Some(days) if days > LOGGING_GAP_DAYS => LoggingStatus::Lapsed,
            _ => LoggingStatus::OnTrack,
        }
    }
}

/// Days between the newest logged row and `today`.
pub fn days_since_last(rows: &[Activity], today: NaiveDate) -> Option<i64> {
    rows.iter()
        .map(|a| a.date)
        .max()
        .map(|last| (today - last).num_days().max(0))
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendations {
    pub activity_level: ActivityLevel,
    pub days_since_last: Option<i64>,
    pub logging: LoggingStatus,
    pub pattern: DayOfWeekPattern,
    pub activities: &'static [&'static str],
    pub bmi_advice: Option<&'static [&'static str]>,
    pub goal_status: GoalStatus,
    pub premium: Premium,
}

#[derive(Debug, Clone, Serialize)]
pub enum RecommendationOutcome {
    /// Fewer rows in the window than weekday patterns need.
    InsufficientData { rows: usize },
    /// Enough rows, but none of them carry a step count.
    NoStepData { rows: usize },
    Ready(Recommendations),
}

pub fn build(
    student_metrics: &StudentMetrics,
    goals: Option<&StudentGoals>,
    points: i64,
) -> RecommendationOutcome {
    let rows = &student_metrics.activity_rows;
    if rows.len() < metrics::MIN_PATTERN_ROWS {
        return RecommendationOutcome::InsufficientData { rows: rows.len() };
    }
    let Some(pattern) = metrics::day_of_week_pattern(rows) else {
        return RecommendationOutcome::NoStepData { rows: rows.len() };
    };
    let summary = student_metrics.metrics.summary();
    let gap = days_since_last(rows, student_metrics.window_end);

    RecommendationOutcome::Ready(Recommendations {
        activity_level: ActivityLevel::from_avg_steps(summary.avg_steps),
        days_since_last: gap,
        logging: LoggingStatus::from_gap(gap),
        pattern,
        activities: activities_for(student_metrics.student.fitness_level),
        bmi_advice: bmi_advice(summary.bmi_category),
        goal_status: goal_status(&summary, goals),
        premium: premium(points),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum WeightTarget {
    Reduce(f64),
    Increase(f64),
    Maintain(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendedGoals {
    pub steps: Option<i64>,
    pub active_minutes: Option<i64>,
    pub weight: Option<WeightTarget>,
}

fn round_to_step(value: f64, step: f64) -> f64 {
    (value / step).round() * step
}

/// Next targets: roughly 10% above current averages, weight moved 5% toward the normal band.
pub fn recommended_goals(summary: &MetricsSummary) -> RecommendedGoals {
    let steps = (summary.avg_steps > 0.0)
        .then(|| round_to_step(summary.avg_steps * 1.1, 500.0) as i64);
    let active_minutes = (summary.avg_active_minutes > 0.0)
        .then(|| round_to_step((summary.avg_active_minutes * 1.1).max(30.0), 5.0) as i64);

    let weight = match (summary.bmi, summary.latest_weight) {
        (Some(bmi), Some(weight)) if bmi > 25.0 => {
            Some(WeightTarget::Reduce(round_to_step(weight * 0.95, 0.5)))
        }
        (Some(bmi), Some(weight)) if bmi < 18.5 => {
            Some(WeightTarget::Increase(round_to_step(weight * 1.05, 0.5)))
        }
        (Some(_), Some(weight)) => Some(WeightTarget::Maintain(weight)),
        _ => None,
    };

    RecommendedGoals {
        steps,
        active_minutes,
        weight,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::tests::{day, row};
    use crate::models::{Activity, Student, WindowMetrics};
    use chrono::{Duration, Weekday};

    fn summary(avg_steps: f64, avg_active_minutes: f64) -> MetricsSummary {
        MetricsSummary {
            avg_steps,
            avg_active_minutes,
            ..MetricsSummary::zeroed()
        }
    }

    fn student_metrics(rows: Vec<Activity>) -> StudentMetrics {
        let student = Student {
            id: 1,
            name: "Alice".to_string(),
            age: Some(15),
            grade: Some("10".to_string()),
            gender: None,
            fitness_level: Some(FitnessLevel::Beginner),
            height_cm: Some(165.0),
        };
        let metrics = metrics::summarize(&rows, student.height_cm);
        StudentMetrics {
            student,
            window_start: day(2026, 3, 1),
            window_end: day(2026, 3, 31),
            metrics,
            activity_rows: rows,
        }
    }

    #[test]
    fn activity_level_thresholds() {
        assert_eq!(ActivityLevel::from_avg_steps(4999.0), ActivityLevel::Low);
        assert_eq!(ActivityLevel::from_avg_steps(5000.0), ActivityLevel::Moderate);
        assert_eq!(ActivityLevel::from_avg_steps(7500.0), ActivityLevel::High);
        assert_eq!(ActivityLevel::Low.weekly_focus().0, "Consistency");
    }

    #[test]
    fn goal_status_uses_defaults_for_missing_targets() {
        let goals = StudentGoals {
            steps: Some(9000),
            ..StudentGoals::default()
        };
        assert_eq!(goal_status(&summary(9500.0, 45.0), None), GoalStatus::NoGoals);
        assert_eq!(
            goal_status(&summary(9500.0, 45.0), Some(&goals)),
            GoalStatus::Exceeding
        );
        assert_eq!(
            goal_status(&summary(9500.0, 20.0), Some(&goals)),
            GoalStatus::WorkingToward
        );
    }

    #[test]
    fn premium_unlocks_at_thirty_points() {
        assert_eq!(premium(12), Premium::Locked { points_needed: 18 });
        assert!(matches!(premium(30), Premium::Unlocked(_)));
    }

    #[test]
    fn bmi_advice_only_with_known_bmi() {
        assert!(bmi_advice(BmiCategory::Unknown).is_none());
        assert_eq!(bmi_advice(BmiCategory::Obese).unwrap().len(), 4);
    }

    #[test]
    fn recommendations_need_five_rows() {
        let rows: Vec<Activity> = (0..3)
            .map(|i| row(i, day(2026, 3, 2) + Duration::days(i), Some(6000)))
            .collect();
        assert!(matches!(
            build(&student_metrics(rows), None, 0),
            RecommendationOutcome::InsufficientData { rows: 3 }
        ));
    }

    #[test]
    fn recommendations_combine_rules() {
        let rows: Vec<Activity> = (0..6)
            .map(|i| row(i, day(2026, 3, 2) + Duration::days(i), Some(4000 + i * 100)))
            .collect();
        let outcome = build(&student_metrics(rows), None, 45);
        let RecommendationOutcome::Ready(recs) = outcome else {
            panic!("expected recommendations");
        };
        assert_eq!(recs.activity_level, ActivityLevel::Low);
        assert_eq!(recs.pattern.best_day, Weekday::Sat);
        assert_eq!(recs.pattern.worst_day, Weekday::Mon);
        assert_eq!(recs.activities, activities_for(Some(FitnessLevel::Beginner)));
        assert!(recs.bmi_advice.is_none());
        assert_eq!(recs.goal_status, GoalStatus::NoGoals);
        assert!(matches!(recs.premium, Premium::Unlocked(_)));
    }

    #[test]
    fn rows_without_steps_are_not_too_few() {
        let rows: Vec<Activity> = (0..7)
            .map(|i| row(i, day(2026, 3, 2) + Duration::days(i), None))
            .collect();
        assert!(matches!(
            build(&student_metrics(rows), None, 0),
            RecommendationOutcome::NoStepData { rows: 7 }
        ));
    }

    #[test]
    fn recent_logging_is_on_track() {
        let rows: Vec<Activity> = (0..5)
            .map(|i| row(i, day(2026, 3, 29) - Duration::days(i), Some(6000)))
            .collect();
        let RecommendationOutcome::Ready(recs) = build(&student_metrics(rows), None, 0) else {
            panic!("expected recommendations");
        };
        assert_eq!(recs.days_since_last, Some(2));
        assert_eq!(recs.logging, LoggingStatus::OnTrack);
    }

    #[test]
    fn long_gap_raises_logging_alert() {
        let rows: Vec<Activity> = (0..5)
            .map(|i| row(i, day(2026, 3, 26) - Duration::days(i), Some(6000)))
            .collect();
        let RecommendationOutcome::Ready(recs) = build(&student_metrics(rows), None, 0) else {
            panic!("expected recommendations");
        };
        assert_eq!(recs.days_since_last, Some(5));
        assert_eq!(recs.logging, LoggingStatus::Lapsed);
        assert_eq!(LoggingStatus::from_gap(Some(3)), LoggingStatus::OnTrack);
        assert_eq!(LoggingStatus::from_gap(None), LoggingStatus::OnTrack);
    }

    #[test]
    fn recommended_goals_round_to_friendly_steps() {
        let mut current = summary(7666.67, 20.0);
        current.latest_weight = Some(80.0);
        current.bmi = Some(27.7);
        let goals = recommended_goals(&current);
        assert_eq!(goals.steps, Some(8500));
        assert_eq!(goals.active_minutes, Some(30));
        assert_eq!(goals.weight, Some(WeightTarget::Reduce(76.0)));

        let mut light = summary(0.0, 50.0);
        light.latest_weight = Some(45.0);
        light.bmi = Some(17.0);
        let goals = recommended_goals(&light);
        assert_eq!(goals.steps, None);
        assert_eq!(goals.active_minutes, Some(55));
        assert_eq!(goals.weight, Some(WeightTarget::Increase(47.5)));

        let goals = recommended_goals(&MetricsSummary::zeroed());
        assert_eq!(goals.weight, None);
        assert_eq!(WindowMetrics::NoActivity.summary(), MetricsSummary::zeroed());
    }
}
