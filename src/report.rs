use std::fmt::Write;

use chrono::NaiveDate;

use crate::metrics;
use crate::models::{Metric, StudentMetrics, WeightDirection};
use crate::recommend::{self, LoggingStatus, Premium, RecommendationOutcome, WeightTarget};
use crate::session::SessionState;

/// Formats a whole number with thousands separators.
pub fn with_commas(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0 {
        out.insert(0, '-');
    }
    out
}

fn or_na(value: Option<String>) -> String {
    value.unwrap_or_else(|| "N/A".to_string())
}

pub fn build_report(
    student_metrics: &StudentMetrics,
    window_days: i64,
    today: NaiveDate,
    session: Option<&SessionState>,
    advanced_metrics: bool,
) -> String {
    let student = &student_metrics.student;
    let rows = &student_metrics.activity_rows;
    let summary = student_metrics.metrics.summary();
    let goals = session.and_then(|s| s.goals_for(student.id));

    let mut output = String::new();

    let _ = writeln!(output, "# Fitness Report: {}", student.name);
    let _ = writeln!(
        output,
        "Activity from {} to {} ({} days)",
        student_metrics.window_start, student_metrics.window_end, window_days
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Profile");
    let _ = writeln!(output, "- Age: {}", or_na(student.age.map(|a| a.to_string())));
    let _ = writeln!(output, "- Grade: {}", or_na(student.grade.clone()));
    let _ = writeln!(output, "- Gender: {}", or_na(student.gender.clone()));
    let _ = writeln!(
        output,
        "- Fitness level: {}",
        or_na(student.fitness_level.map(|l| l.to_string()))
    );
    let _ = writeln!(
        output,
        "- Height: {}",
        or_na(student.height_cm.map(|h| format!("{h:.1} cm")))
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Key Metrics");

    if !student_metrics.metrics.has_activity() {
        let _ = writeln!(output, "No activity logged in this window.");
    } else {
        let _ = writeln!(
            output,
            "- Current weight: {}",
            or_na(summary.latest_weight.map(|w| format!("{w:.1} kg")))
        );
        let _ = writeln!(
            output,
            "- BMI: {} ({})",
            or_na(summary.bmi.map(|b| format!("{b:.1}"))),
            summary.bmi_category
        );
        let _ = writeln!(
            output,
            "- Activity streak: {} days",
            metrics::activity_streak(rows, today)
        );
        let _ = writeln!(
            output,
            "- Total steps: {} (avg {} per day logged)",
            with_commas(summary.total_steps),
            with_commas(summary.avg_steps.round() as i64)
        );
        let _ = writeln!(
            output,
            "- Avg active minutes: {:.1}",
            summary.avg_active_minutes
        );
        let _ = writeln!(
            output,
            "- Avg daily calories: {:.1}",
            metrics::avg_daily_calories(summary.total_calories, window_days)
        );
        if advanced_metrics {
            let _ = writeln!(
                output,
                "- Consistency: {:.1}%",
                metrics::consistency(rows, window_days)
            );
        }
    }

    if advanced_metrics {
        if let Some(pattern) = metrics::day_of_week_pattern(rows) {
            let _ = writeln!(output);
            let _ = writeln!(output, "## Weekly Pattern");
            let _ = writeln!(
                output,
                "- Most active day: {} ({} avg steps)",
                metrics::weekday_name(pattern.best_day),
                with_commas(pattern.best_avg_steps.round() as i64)
            );
            let _ = writeln!(
                output,
                "- Least active day: {} ({} avg steps)",
                metrics::weekday_name(pattern.worst_day),
                with_commas(pattern.worst_avg_steps.round() as i64)
            );
        }
    }

    if let Some(goals) = goals {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Goal Progress");
        for (label, metric, goal) in [
            ("Steps", Metric::Steps, goals.steps),
            ("Active minutes", Metric::ActiveMinutes, goals.active_minutes),
        ] {
            if let Some(goal) = goal {
                let _ = writeln!(
                    output,
                    "- {} goal {}: met on {} of {} days ({:.1}%)",
                    label,
                    with_commas(goal),
                    metrics::goal_days_met(rows, metric, goal as f64),
                    rows.len(),
                    metrics::goal_achievement_rate(rows, metric, goal as f64)
                );
            }
        }
        if let Some(goal) = goals.weight_kg {
            match metrics::weight_goal_progress(rows, goal) {
                Some(progress) => {
                    let verb = match progress.direction {
                        WeightDirection::Lose => "loss",
                        WeightDirection::Gain => "gain",
                    };
                    let _ = writeln!(
                        output,
                        "- Weight {} goal {:.1} kg: {:.1} kg -> {:.1} kg, {:.1}% complete",
                        verb,
                        goal,
                        progress.starting_weight,
                        progress.current_weight,
                        progress.progress_pct
                    );
                }
                None => {
                    let _ = writeln!(output, "- Weight goal {goal:.1} kg: no weight logged");
                }
            }
        }
    }

    let targets = recommend::recommended_goals(&summary);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recommended Goals");
    if !student_metrics.metrics.has_activity() {
        let _ = writeln!(output, "Log some activities to receive goal suggestions.");
    } else {
        if let Some(steps) = targets.steps {
            let _ = writeln!(output, "- Steps: {} per day", with_commas(steps));
        }
        if let Some(minutes) = targets.active_minutes {
            let _ = writeln!(output, "- Active minutes: {minutes} per day");
        }
        match targets.weight {
            Some(WeightTarget::Reduce(kg)) => {
                let _ = writeln!(output, "- Weight: {kg:.1} kg (5% reduction)");
            }
            Some(WeightTarget::Increase(kg)) => {
                let _ = writeln!(output, "- Weight: {kg:.1} kg (5% increase)");
            }
            Some(WeightTarget::Maintain(kg)) => {
                let _ = writeln!(output, "- Weight: maintain {kg:.1} kg");
            }
            None => {}
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recommendations");
    let points = session.map(|s| s.points).unwrap_or(0);
    write_recommendations(
        &mut output,
        &recommend::build(student_metrics, goals, points),
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Activity");
    if rows.is_empty() {
        let _ = writeln!(output, "No activity recorded for this window.");
    } else {
        for activity in rows.iter().take(5) {
            let _ = writeln!(
                output,
                "- {}: {} steps, {} active min, {} kcal",
                activity.date,
                or_na(activity.steps.map(with_commas)),
                or_na(activity.active_minutes.map(|m| m.to_string())),
                or_na(activity.calories.map(|c| format!("{c:.1}")))
            );
        }
    }

    output
}

pub fn write_recommendations(output: &mut String, outcome: &RecommendationOutcome) {
    let recs = match outcome {
        RecommendationOutcome::InsufficientData { rows } => {
            let _ = writeln!(
                output,
                "At least {} days of activity are needed for personalized recommendations ({} logged).",
                metrics::MIN_PATTERN_ROWS,
                rows
            );
            return;
        }
        RecommendationOutcome::NoStepData { rows } => {
            let _ = writeln!(
                output,
                "None of the {rows} logged days include a step count; log steps to receive personalized recommendations."
            );
            return;
        }
        RecommendationOutcome::Ready(recs) => recs,
    };

    let _ = writeln!(output, "- Activity level: {}", recs.activity_level.advice());
    match (recs.logging, recs.days_since_last) {
        (LoggingStatus::Lapsed, Some(days)) => {
            let _ = writeln!(
                output,
                "- Consistency alert: it's been {days} days since your last logged activity. Try to be more consistent with your routine."
            );
        }
        _ => {
            let _ = writeln!(
                output,
                "- Consistency: you're doing well with tracking your activity regularly. Keep it up!"
            );
        }
    }
    let _ = writeln!(
        output,
        "- Challenge yourself on {}s: add an extra 1,000 steps or 10 minutes of more intense activity.",
        metrics::weekday_name(recs.pattern.best_day)
    );
    let _ = writeln!(
        output,
        "- Focus on {}s: schedule a 15-minute walk or light exercise session.",
        metrics::weekday_name(recs.pattern.worst_day)
    );
    let _ = writeln!(output, "- Recommended activities:");
    for activity in recs.activities {
        let _ = writeln!(output, "  - {activity}");
    }
    if let Some(advice) = recs.bmi_advice {
        let _ = writeln!(output, "- Body composition:");
        for line in advice {
            let _ = writeln!(output, "  - {line}");
        }
    }
    let _ = writeln!(output, "- Goals: {}", recs.goal_status.message());
    let (focus, detail) = recs.activity_level.weekly_focus();
    let _ = writeln!(output, "- Weekly focus, {focus}: {detail}");
    match &recs.premium {
        Premium::Unlocked(plan) => {
            let _ = writeln!(output, "- Cross-training plan:");
            for day in plan.iter() {
                let _ = writeln!(output, "  - {day}");
            }
        }
        Premium::Locked { points_needed } => {
            let _ = writeln!(
                output,
                "- Earn {points_needed} more points to unlock a cross-training plan."
            );
        }
    }
}
