use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::TrackerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum FitnessLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl FitnessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FitnessLevel::Beginner => "Beginner",
            FitnessLevel::Intermediate => "Intermediate",
            FitnessLevel::Advanced => "Advanced",
        }
    }
}

impl fmt::Display for FitnessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FitnessLevel {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(FitnessLevel::Beginner),
            "intermediate" => Ok(FitnessLevel::Intermediate),
            "advanced" => Ok(FitnessLevel::Advanced),
            other => Err(TrackerError::InvalidInput(format!(
                "unknown fitness level '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub age: Option<i64>,
    pub grade: Option<String>,
    pub gender: Option<String>,
    pub fitness_level: Option<FitnessLevel>,
    pub height_cm: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewStudent {
    pub name: String,
    pub age: Option<i64>,
    pub grade: Option<String>,
    pub gender: Option<String>,
    pub fitness_level: Option<FitnessLevel>,
    pub height_cm: Option<f64>,
}

/// Fields left as `None` keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct StudentUpdate {
    pub name: Option<String>,
    pub age: Option<i64>,
    pub grade: Option<String>,
    pub gender: Option<String>,
    pub fitness_level: Option<FitnessLevel>,
    pub height_cm: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    pub student_id: i64,
    pub date: NaiveDate,
    pub steps: Option<i64>,
    pub active_minutes: Option<i64>,
    pub distance: Option<f64>,
    pub calories: Option<f64>,
    pub heart_rate: Option<i64>,
    pub weight_kg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewActivity {
    pub student_id: i64,
    pub date: NaiveDate,
    pub steps: Option<i64>,
    pub active_minutes: Option<i64>,
    pub distance: Option<f64>,
    pub calories: Option<f64>,
    pub heart_rate: Option<i64>,
    pub weight_kg: Option<f64>,
}

/// Fields left as `None` keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct ActivityUpdate {
    pub date: Option<NaiveDate>,
    pub steps: Option<i64>,
    pub active_minutes: Option<i64>,
    pub distance: Option<f64>,
    pub calories: Option<f64>,
    pub heart_rate: Option<i64>,
    pub weight_kg: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub limit: Option<i64>,
}

/// A numeric activity column that metrics can be computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Steps,
    ActiveMinutes,
    Distance,
    Calories,
    HeartRate,
    Weight,
}

impl Metric {
    pub fn value(&self, activity: &Activity) -> Option<f64> {
        match self {
            Metric::Steps => activity.steps.map(|v| v as f64),
            Metric::ActiveMinutes => activity.active_minutes.map(|v| v as f64),
            Metric::Distance => activity.distance,
            Metric::Calories => activity.calories,
            Metric::HeartRate => activity.heart_rate.map(|v| v as f64),
            Metric::Weight => activity.weight_kg,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Metric::Steps => "steps",
            Metric::ActiveMinutes => "active minutes",
            Metric::Distance => "distance (km)",
            Metric::Calories => "calories",
            Metric::HeartRate => "heart rate",
            Metric::Weight => "weight (kg)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BmiCategory {
    #[serde(rename = "N/A")]
    Unknown,
    Underweight,
    #[serde(rename = "Normal weight")]
    NormalWeight,
    Overweight,
    Obese,
}

impl BmiCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            BmiCategory::Unknown => "N/A",
            BmiCategory::Underweight => "Underweight",
            BmiCategory::NormalWeight => "Normal weight",
            BmiCategory::Overweight => "Overweight",
            BmiCategory::Obese => "Obese",
        }
    }
}

impl fmt::Display for BmiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub total_steps: i64,
    pub avg_steps: f64,
    pub total_calories: f64,
    pub avg_active_minutes: f64,
    pub latest_weight: Option<f64>,
    pub bmi: Option<f64>,
    pub bmi_category: BmiCategory,
}

impl MetricsSummary {
    pub fn zeroed() -> Self {
        MetricsSummary {
            total_steps: 0,
            avg_steps: 0.0,
            total_calories: 0.0,
            avg_active_minutes: 0.0,
            latest_weight: None,
            bmi: None,
            bmi_category: BmiCategory::Unknown,
        }
    }
}

/// Metrics for a window, keeping "nothing logged" apart from computed values.
///
/// Serializes as `{"state": ..., "values": ...}` with zeroed values when nothing was logged.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowMetrics {
    NoActivity,
    Observed(MetricsSummary),
}

impl WindowMetrics {
    pub fn summary(&self) -> MetricsSummary {
        match self {
            WindowMetrics::NoActivity => MetricsSummary::zeroed(),
            WindowMetrics::Observed(summary) => summary.clone(),
        }
    }

    pub fn has_activity(&self) -> bool {
        matches!(self, WindowMetrics::Observed(_))
    }

    pub fn state(&self) -> &'static str {
        match self {
            WindowMetrics::NoActivity => "no_activity",
            WindowMetrics::Observed(_) => "observed",
        }
    }
}

impl Serialize for WindowMetrics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("WindowMetrics", 2)?;
        state.serialize_field("state", self.state())?;
        state.serialize_field("values", &self.summary())?;
        state.end()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentMetrics {
    pub student: Student,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub metrics: WindowMetrics,
    pub activity_rows: Vec<Activity>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayOfWeekPattern {
    pub best_day: chrono::Weekday,
    pub best_avg_steps: f64,
    pub worst_day: chrono::Weekday,
    pub worst_avg_steps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WeightDirection {
    Lose,
    Gain,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightProgress {
    pub starting_weight: f64,
    pub current_weight: f64,
    pub goal_weight: f64,
    pub direction: WeightDirection,
    pub progress_pct: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fitness_level_parses_case_insensitively() {
        assert_eq!(
            "beginner".parse::<FitnessLevel>().unwrap(),
            FitnessLevel::Beginner
        );
        assert_eq!(
            " Advanced ".parse::<FitnessLevel>().unwrap(),
            FitnessLevel::Advanced
        );
        assert!("elite".parse::<FitnessLevel>().is_err());
    }

    #[test]
    fn metric_reads_nullable_columns() {
        let activity = Activity {
            id: 1,
            student_id: 1,
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            steps: Some(4200),
            active_minutes: None,
            distance: Some(3.5),
            calories: None,
            heart_rate: Some(88),
            weight_kg: Some(61.2),
        };

        assert_eq!(Metric::Steps.value(&activity), Some(4200.0));
        assert_eq!(Metric::ActiveMinutes.value(&activity), None);
        assert_eq!(Metric::Weight.value(&activity), Some(61.2));
    }

    #[test]
    fn empty_window_reports_zeroes() {
        let summary = WindowMetrics::NoActivity.summary();
        assert_eq!(summary.avg_steps, 0.0);
        assert_eq!(summary.latest_weight, None);
        assert_eq!(summary.bmi, None);
        assert_eq!(summary.bmi_category.as_str(), "N/A");
        assert!(!WindowMetrics::NoActivity.has_activity());
    }

    #[test]
    fn empty_window_serializes_zeroed_values() {
        let json = serde_json::to_value(WindowMetrics::NoActivity).unwrap();
        assert_eq!(json["state"], "no_activity");
        assert_eq!(json["values"]["total_steps"], 0);
        assert_eq!(json["values"]["avg_steps"], 0.0);
        assert!(json["values"]["latest_weight"].is_null());
        assert!(json["values"]["bmi"].is_null());
        assert_eq!(json["values"]["bmi_category"], "N/A");
    }
}
