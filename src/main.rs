use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

mod config;
mod db;
mod error;
mod metrics;
mod models;
mod recommend;
mod report;
mod session;

use config::Settings;
use models::{
    ActivityFilter, ActivityUpdate, DayOfWeekPattern, FitnessLevel, Metric, NewActivity,
    NewStudent, StudentMetrics, StudentUpdate,
};
use report::with_commas;
use session::{AchievementId, Goal, SessionStore};

#[derive(Parser)]
#[command(name = "fitness-tracker")]
#[command(about = "Student fitness tracker: activity logs, metrics and recommendations", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start, end or inspect a session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    #[command(flatten)]
    Tracker(Commands),
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample students with 30 days of activity
    Seed,
    /// Import activity rows from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Register a new student
    AddStudent {
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: Option<i64>,
        #[arg(long)]
        grade: Option<String>,
        #[arg(long)]
        gender: Option<String>,
        #[arg(long, value_enum)]
        fitness_level: Option<FitnessLevel>,
        #[arg(long)]
        height_cm: Option<f64>,
        #[arg(long)]
        session: Option<Uuid>,
    },
    /// List all students by name
    ListStudents,
    /// Change fields of an existing student
    UpdateStudent {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        age: Option<i64>,
        #[arg(long)]
        grade: Option<String>,
        #[arg(long)]
        gender: Option<String>,
        #[arg(long, value_enum)]
        fitness_level: Option<FitnessLevel>,
        #[arg(long)]
        height_cm: Option<f64>,
    },
    /// Delete a student and their activity
    DeleteStudent {
        #[arg(long)]
        id: i64,
    },
    /// Log a day of activity for a student
    LogActivity {
        #[arg(long)]
        student: i64,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        steps: Option<i64>,
        #[arg(long)]
        active_minutes: Option<i64>,
        #[arg(long)]
        distance: Option<f64>,
        #[arg(long)]
        calories: Option<f64>,
        #[arg(long)]
        heart_rate: Option<i64>,
        #[arg(long)]
        weight_kg: Option<f64>,
        #[arg(long)]
        session: Option<Uuid>,
    },
    /// Show recent activity rows, newest first
    ListActivities {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Change fields of a logged activity
    UpdateActivity {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        steps: Option<i64>,
        #[arg(long)]
        active_minutes: Option<i64>,
        #[arg(long)]
        distance: Option<f64>,
        #[arg(long)]
        calories: Option<f64>,
        #[arg(long)]
        heart_rate: Option<i64>,
        #[arg(long)]
        weight_kg: Option<f64>,
    },
    /// Delete a logged activity
    DeleteActivity {
        #[arg(long)]
        id: i64,
    },
    /// Show derived metrics for a student
    Metrics {
        #[arg(long)]
        student: i64,
        #[arg(long, default_value_t = 30)]
        days: i64,
        #[arg(long)]
        json: bool,
    },
    /// Print one metric over time, oldest first
    Trend {
        #[arg(long)]
        student: i64,
        #[arg(long, value_enum)]
        metric: Metric,
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
    /// Share of days meeting a goal for one metric
    GoalRate {
        #[arg(long)]
        student: i64,
        #[arg(long, value_enum)]
        metric: Metric,
        #[arg(long)]
        goal: f64,
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
    /// Personalized recommendations
    Recommend {
        #[arg(long)]
        student: i64,
        #[arg(long, default_value_t = 30)]
        days: i64,
        #[arg(long)]
        session: Option<Uuid>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        student: i64,
        #[arg(long, default_value_t = 30)]
        days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long)]
        session: Option<Uuid>,
    },
    /// Set goals or check progress toward them
    Goal {
        #[command(subcommand)]
        action: GoalAction,
    },
    /// List unlocked and locked achievements
    Achievements {
        #[arg(long)]
        session: Uuid,
    },
    /// Claim an achievement by hand
    Claim {
        #[arg(long)]
        session: Uuid,
        #[arg(long, value_enum)]
        achievement: AchievementId,
    },
    /// Spend points on a reward
    Redeem {
        #[arg(long)]
        session: Uuid,
        #[arg(long)]
        reward: String,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    Start,
    End {
        #[arg(long)]
        id: Uuid,
    },
    Show {
        #[arg(long)]
        id: Uuid,
    },
}

#[derive(Subcommand)]
enum GoalAction {
    Set {
        #[arg(long)]
        session: Uuid,
        #[arg(long)]
        student: i64,
        #[arg(long)]
        steps: Option<i64>,
        #[arg(long)]
        active_minutes: Option<i64>,
        #[arg(long)]
        weight_kg: Option<f64>,
    },
    Progress {
        #[arg(long)]
        session: Uuid,
        #[arg(long)]
        student: i64,
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
}

#[derive(Serialize)]
struct MetricsView<'a> {
    #[serde(flatten)]
    metrics: &'a StudentMetrics,
    streak: u32,
    avg_daily_calories: f64,
    consistency: Option<f64>,
    pattern: Option<DayOfWeekPattern>,
}

fn load_sessions(settings: &Settings) -> anyhow::Result<SessionStore> {
    SessionStore::load(&settings.session_file).with_context(|| {
        format!(
            "failed to read sessions from {}",
            settings.session_file.display()
        )
    })
}

fn save_sessions(settings: &Settings, store: &SessionStore) -> anyhow::Result<()> {
    store.save(&settings.session_file).with_context(|| {
        format!(
            "failed to write sessions to {}",
            settings.session_file.display()
        )
    })
}

async fn load_metrics(
    pool: &SqlitePool,
    student_id: i64,
    days: i64,
) -> anyhow::Result<Option<StudentMetrics>> {
    let result = metrics::get_student_metrics(pool, student_id, days, metrics::today()).await?;
    if result.is_none() {
        println!("No student with id {student_id}.");
    }
    Ok(result)
}

fn announce(earned: &[AchievementId]) {
    for id in earned {
        let details = id.details();
        println!(
            "Achievement unlocked: {} (+{} points)",
            details.name, details.points
        );
    }
}

fn print_metrics(view: &MetricsView<'_>, days: i64) {
    let student = &view.metrics.student;
    let summary = view.metrics.metrics.summary();

    println!(
        "{} (id {}), {} to {}",
        student.name, student.id, view.metrics.window_start, view.metrics.window_end
    );
    if !view.metrics.metrics.has_activity() {
        println!("No activity logged in the last {days} days.");
        return;
    }

    println!(
        "- Weight: {}",
        summary
            .latest_weight
            .map(|w| format!("{w:.1} kg"))
            .unwrap_or_else(|| "N/A".to_string())
    );
    println!(
        "- BMI: {} ({})",
        summary
            .bmi
            .map(|b| format!("{b:.1}"))
            .unwrap_or_else(|| "N/A".to_string()),
        summary.bmi_category
    );
    println!("- Streak: {} days", view.streak);
    println!(
        "- Steps: {} total, {} avg",
        with_commas(summary.total_steps),
        with_commas(summary.avg_steps.round() as i64)
    );
    println!("- Avg active minutes: {:.1}", summary.avg_active_minutes);
    println!(
        "- Calories: {:.1} total, {:.1} avg per day",
        summary.total_calories, view.avg_daily_calories
    );
    if let Some(consistency) = view.consistency {
        println!("- Consistency: {consistency:.1}%");
    }
    if let Some(pattern) = &view.pattern {
        println!(
            "- Most active day: {}, least active day: {}",
            metrics::weekday_name(pattern.best_day),
            metrics::weekday_name(pattern.worst_day)
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let settings = cli.settings;

    match cli.command {
        Command::Session { action } => run_session(&settings, action),
        Command::Tracker(command) => {
            let pool = db::connect(&settings.database_url)
                .await
                .context("failed to connect to SQLite")?;
            run(command, &settings, &pool).await
        }
    }
}

fn run_session(settings: &Settings, action: SessionAction) -> anyhow::Result<()> {
    let mut store = load_sessions(settings)?;
    match action {
        SessionAction::Start => {
            let id = store.start();
            save_sessions(settings, &store)?;
            println!("Session started: {id} ({} open)", store.len());
        }
        SessionAction::End { id } => {
            let ended = store.end(id)?;
            save_sessions(settings, &store)?;
            println!(
                "Session {} ended with {} points (level {}).",
                ended.id,
                ended.points,
                ended.level()
            );
        }
        SessionAction::Show { id } => {
            let session = store.get(id)?;
            println!("{}", serde_json::to_string_pretty(session)?);
        }
    }
    Ok(())
}

async fn run(command: Commands, settings: &Settings, pool: &SqlitePool) -> anyhow::Result<()> {
    match command {
        Commands::InitDb => {
            db::init_db(pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let ids = db::seed(pool, metrics::today()).await?;
            println!("Sample data loaded for {} students.", ids.len());
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(pool, &csv).await?;
            println!("Inserted {inserted} activity rows from {}.", csv.display());
        }
        Commands::AddStudent {
            name,
            age,
            grade,
            gender,
            fitness_level,
            height_cm,
            session,
        } => {
            let student = db::insert_student(
                pool,
                &NewStudent {
                    name,
                    age,
                    grade,
                    gender,
                    fitness_level,
                    height_cm,
                },
            )
            .await?;
            println!("Student '{}' added with id {}.", student.name, student.id);

            if let (Some(id), true) = (session, settings.gamification) {
                let mut store = load_sessions(settings)?;
                store.get_mut(id)?.award(session::ADD_STUDENT_POINTS);
                save_sessions(settings, &store)?;
                println!(
                    "You earned {} points for adding a new student!",
                    session::ADD_STUDENT_POINTS
                );
            }
        }
        Commands::ListStudents => {
            let students = db::list_students(pool).await?;
            if students.is_empty() {
                println!("No students found.");
            }
            for student in students {
                println!(
                    "- {} (ID: {}) grade {}, {}, {}",
                    student.name,
                    student.id,
                    student.grade.as_deref().unwrap_or("N/A"),
                    student
                        .fitness_level
                        .map(|level| level.to_string())
                        .unwrap_or_else(|| "N/A".to_string()),
                    student
                        .height_cm
                        .map(|h| format!("{h:.1} cm"))
                        .unwrap_or_else(|| "N/A".to_string())
                );
            }
        }
        Commands::UpdateStudent {
            id,
            name,
            age,
            grade,
            gender,
            fitness_level,
            height_cm,
        } => {
            let student = db::update_student(
                pool,
                id,
                &StudentUpdate {
                    name,
                    age,
                    grade,
                    gender,
                    fitness_level,
                    height_cm,
                },
            )
            .await?;
            println!("Student '{}' updated.", student.name);
        }
        Commands::DeleteStudent { id } => {
            let student = db::delete_student(pool, id).await?;
            println!("Student '{}' deleted.", student.name);
        }
        Commands::LogActivity {
            student,
            date,
            steps,
            active_minutes,
            distance,
            calories,
            heart_rate,
            weight_kg,
            session,
        } => {
            let today = metrics::today();
            let activity = db::insert_activity(
                pool,
                &NewActivity {
                    student_id: student,
                    date: date.unwrap_or(today),
                    steps,
                    active_minutes,
                    distance,
                    calories,
                    heart_rate,
                    weight_kg,
                },
            )
            .await?;
            println!(
                "Activity logged for {} (id {}).",
                activity.date, activity.id
            );

            if let (Some(id), true) = (session, settings.gamification) {
                let mut store = load_sessions(settings)?;
                let state = store.get_mut(id)?;
                let points = session::points_for_steps(activity.steps);
                state.award(points);
                println!("You earned {points} points for logging activity!");

                if let Some(current) = metrics::get_student_metrics(pool, student, 30, today).await? {
                    announce(&state.evaluate_progress(student, &current.activity_rows, today));
                }
                save_sessions(settings, &store)?;
            }
        }
        Commands::ListActivities {
            student,
            from,
            to,
            limit,
        } => {
            let filter = ActivityFilter {
                date_from: from,
                date_to: to,
                limit: Some(limit),
            };
            let rows = db::fetch_activities(pool, student, &filter).await?;
            if rows.is_empty() {
                println!("No activity found for student {student}.");
            }
            for activity in rows {
                println!(
                    "- [{}] {}: steps {}, active {} min, {} km, {} kcal, hr {}, {} kg",
                    activity.id,
                    activity.date,
                    activity.steps.map(with_commas).unwrap_or_else(|| "-".to_string()),
                    activity
                        .active_minutes
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    activity
                        .distance
                        .map(|v| format!("{v:.2}"))
                        .unwrap_or_else(|| "-".to_string()),
                    activity
                        .calories
                        .map(|v| format!("{v:.1}"))
                        .unwrap_or_else(|| "-".to_string()),
                    activity
                        .heart_rate
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    activity
                        .weight_kg
                        .map(|v| format!("{v:.1}"))
                        .unwrap_or_else(|| "-".to_string())
                );
            }
        }
        Commands::UpdateActivity {
            id,
            date,
            steps,
            active_minutes,
            distance,
            calories,
            heart_rate,
            weight_kg,
        } => {
            let activity = db::update_activity(
                pool,
                id,
                &ActivityUpdate {
                    date,
                    steps,
                    active_minutes,
                    distance,
                    calories,
                    heart_rate,
                    weight_kg,
                },
            )
            .await?;
            println!("Activity {} updated.", activity.id);
        }
        Commands::DeleteActivity { id } => {
            let activity = db::delete_activity(pool, id).await?;
            println!("Activity {} on {} deleted.", activity.id, activity.date);
        }
        Commands::Metrics {
            student,
            days,
            json,
        } => {
            let Some(current) = load_metrics(pool, student, days).await? else {
                return Ok(());
            };
            let rows = &current.activity_rows;
            let view = MetricsView {
                streak: metrics::activity_streak(rows, current.window_end),
                avg_daily_calories: metrics::avg_daily_calories(
                    current.metrics.summary().total_calories,
                    days,
                ),
                consistency: settings
                    .advanced_metrics
                    .then(|| metrics::consistency(rows, days)),
                pattern: settings
                    .advanced_metrics
                    .then(|| metrics::day_of_week_pattern(rows))
                    .flatten(),
                metrics: &current,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print_metrics(&view, days);
            }
        }
        Commands::Trend {
            student,
            metric,
            days,
        } => {
            let Some(current) = load_metrics(pool, student, days).await? else {
                return Ok(());
            };
            let points = metrics::trend(&current.activity_rows, metric);
            if points.is_empty() {
                println!("No {} data in the last {days} days.", metric.label());
            }
            for point in points {
                println!("{}\t{}", point.date, point.value);
            }
        }
        Commands::GoalRate {
            student,
            metric,
            goal,
            days,
        } => {
            let Some(current) = load_metrics(pool, student, days).await? else {
                return Ok(());
            };
            let rows = &current.activity_rows;
            println!(
                "Goal {} {}: met on {} of {} days ({:.1}%).",
                goal,
                metric.label(),
                metrics::goal_days_met(rows, metric, goal),
                rows.len(),
                metrics::goal_achievement_rate(rows, metric, goal)
            );
        }
        Commands::Recommend {
            student,
            days,
            session,
        } => {
            let Some(current) = load_metrics(pool, student, days).await? else {
                return Ok(());
            };
            let store = match session {
                Some(_) => Some(load_sessions(settings)?),
                None => None,
            };
            let state = match (&store, session) {
                (Some(store), Some(id)) => Some(store.get(id)?),
                _ => None,
            };

            let outcome = recommend::build(
                &current,
                state.and_then(|s| s.goals_for(student)),
                state.map(|s| s.points).unwrap_or(0),
            );
            let mut output = String::new();
            report::write_recommendations(&mut output, &outcome);
            print!("{output}");
        }
        Commands::Report {
            student,
            days,
            out,
            session,
        } => {
            let Some(current) = load_metrics(pool, student, days).await? else {
                return Ok(());
            };
            let mut store = match session {
                Some(_) => Some(load_sessions(settings)?),
                None => None,
            };

            if let (Some(store), Some(id), true) = (store.as_mut(), session, settings.gamification)
            {
                if store.get_mut(id)?.unlock(AchievementId::DataAnalyst) {
                    announce(&[AchievementId::DataAnalyst]);
                }
            }

            let state = match (&store, session) {
                (Some(store), Some(id)) => Some(store.get(id)?),
                _ => None,
            };
            let report = report::build_report(
                &current,
                days,
                metrics::today(),
                state,
                settings.advanced_metrics,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;

            if let Some(store) = &store {
                save_sessions(settings, store)?;
            }
            info!("Report for student {} written", student);
            println!("Report written to {}.", out.display());
        }
        Commands::Goal { action } => match action {
            GoalAction::Set {
                session,
                student,
                steps,
                active_minutes,
                weight_kg,
            } => {
                if db::fetch_student(pool, student).await?.is_none() {
                    println!("No student with id {student}.");
                    return Ok(());
                }
                let goals: Vec<Goal> = [
                    steps.map(Goal::Steps),
                    active_minutes.map(Goal::ActiveMinutes),
                    weight_kg.map(Goal::WeightKg),
                ]
                .into_iter()
                .flatten()
                .collect();
                if goals.is_empty() {
                    warn!("No goal values given; nothing to set");
                    return Ok(());
                }

                let mut store = load_sessions(settings)?;
                let state = store.get_mut(session)?;
                for goal in goals {
                    state.set_goal(student, goal)?;
                    println!("Goal set: {goal:?}");
                    if settings.gamification {
                        state.award(session::SET_GOAL_POINTS);
                        println!(
                            "You earned {} points for setting a goal!",
                            session::SET_GOAL_POINTS
                        );
                    }
                }
                save_sessions(settings, &store)?;
            }
            GoalAction::Progress {
                session,
                student,
                days,
            } => {
                let Some(current) = load_metrics(pool, student, days).await? else {
                    return Ok(());
                };
                let mut store = load_sessions(settings)?;
                let state = store.get_mut(session)?;
                let rows = &current.activity_rows;

                match state.goals_for(student) {
                    None => println!("No goals set for {} in this session.", current.student.name),
                    Some(goals) => {
                        if let Some(goal) = goals.steps {
                            println!(
                                "Steps goal {}: {:.1}% ({} of {} days)",
                                with_commas(goal),
                                metrics::goal_achievement_rate(rows, Metric::Steps, goal as f64),
                                metrics::goal_days_met(rows, Metric::Steps, goal as f64),
                                rows.len()
                            );
                        }
                        if let Some(goal) = goals.active_minutes {
                            println!(
                                "Active minutes goal {}: {:.1}% ({} of {} days)",
                                goal,
                                metrics::goal_achievement_rate(
                                    rows,
                                    Metric::ActiveMinutes,
                                    goal as f64
                                ),
                                metrics::goal_days_met(rows, Metric::ActiveMinutes, goal as f64),
                                rows.len()
                            );
                        }
                        if let Some(goal) = goals.weight_kg {
                            match metrics::weight_goal_progress(rows, goal) {
                                Some(progress) => println!(
                                    "Weight goal {:.1} kg: {:.1} kg -> {:.1} kg, {:.1}% complete",
                                    goal,
                                    progress.starting_weight,
                                    progress.current_weight,
                                    progress.progress_pct
                                ),
                                None => println!("Weight goal {goal:.1} kg: no weight logged"),
                            }
                        }
                    }
                }

                if settings.gamification {
                    announce(&state.evaluate_progress(student, rows, current.window_end));
                    save_sessions(settings, &store)?;
                }
            }
        },
        Commands::Achievements { session } => {
            let store = load_sessions(settings)?;
            let state = store.get(session)?;
            println!("Total points: {} (level {})", state.points, state.level());
            println!("Unlocked:");
            for id in &state.achievements {
                let details = id.details();
                println!("- {}: {} (+{})", details.name, details.description, details.points);
            }
            println!("Locked:");
            for id in state.locked() {
                let details = id.details();
                println!("- {}: {} (+{})", details.name, details.description, details.points);
            }
            println!("Rewards:");
            for reward in session::REWARDS.iter() {
                println!("- {} ({} points): {}", reward.name, reward.cost, reward.description);
            }
        }
        Commands::Claim {
            session,
            achievement,
        } => {
            let mut store = load_sessions(settings)?;
            let state = store.get_mut(session)?;
            if state.has(achievement) {
                println!("Achievement already claimed.");
                return Ok(());
            }
            state.unlock(achievement);
            announce(&[achievement]);
            save_sessions(settings, &store)?;
        }
        Commands::Redeem { session, reward } => {
            let mut store = load_sessions(settings)?;
            let state = store.get_mut(session)?;
            let redeemed = state.redeem(&reward)?;
            let remaining = state.points;
            save_sessions(settings, &store)?;
            println!(
                "Redeemed {} for {} points; {} points left.",
                redeemed.name, redeemed.cost, remaining
            );
        }
    }

    Ok(())
}
