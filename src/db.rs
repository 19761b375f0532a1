use std::path::Path;
use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{Result, TrackerError};
use crate::models::{
    Activity, ActivityFilter, ActivityUpdate, FitnessLevel, NewActivity, NewStudent, Student,
    StudentUpdate,
};

pub const SAMPLE_DATA_KEY: &str = "sample_data_loaded_at";

/// Opens the single shared connection used by every command.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    info!("Database connection opened: {}", database_url);
    Ok(pool)
}

pub async fn init_db(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations");
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn student_from_row(row: &SqliteRow) -> Result<Student> {
    let fitness_level: Option<String> = row.try_get("fitness_level")?;
    Ok(Student {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        age: row.try_get("age")?,
        grade: row.try_get("grade")?,
        gender: row.try_get("gender")?,
        fitness_level: fitness_level
            .as_deref()
            .map(FitnessLevel::from_str)
            .transpose()?,
        height_cm: row.try_get("height_cm")?,
    })
}

fn activity_from_row(row: &SqliteRow) -> Result<Activity> {
    Ok(Activity {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        date: row.try_get("date")?,
        steps: row.try_get("steps")?,
        active_minutes: row.try_get("active_minutes")?,
        distance: row.try_get("distance")?,
        calories: row.try_get("calories")?,
        heart_rate: row.try_get("heart_rate")?,
        weight_kg: row.try_get("weight_kg")?,
    })
}

fn validate_student(name: &str, age: Option<i64>, height_cm: Option<f64>) -> Result<()> {
    if name.trim().is_empty() {
        return Err(TrackerError::InvalidInput(
            "student name is required".to_string(),
        ));
    }
    if matches!(age, Some(a) if a < 0) {
        return Err(TrackerError::InvalidInput(
            "age must not be negative".to_string(),
        ));
    }
    if matches!(height_cm, Some(h) if !(h > 0.0)) {
        return Err(TrackerError::InvalidInput(
            "height must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_activity(
    steps: Option<i64>,
    active_minutes: Option<i64>,
    distance: Option<f64>,
    calories: Option<f64>,
    heart_rate: Option<i64>,
    weight_kg: Option<f64>,
) -> Result<()> {
    let counts = [
        ("steps", steps),
        ("active minutes", active_minutes),
        ("heart rate", heart_rate),
    ];
    for (field, value) in counts {
        if matches!(value, Some(v) if v < 0) {
            return Err(TrackerError::InvalidInput(format!(
                "{field} must not be negative"
            )));
        }
    }

    let measures = [
        ("distance", distance),
        ("calories", calories),
        ("weight", weight_kg),
    ];
    for (field, value) in measures {
        if matches!(value, Some(v) if !v.is_finite() || v < 0.0) {
            return Err(TrackerError::InvalidInput(format!(
                "{field} must be a non-negative number"
            )));
        }
    }
    Ok(())
}

pub async fn insert_student(pool: &SqlitePool, student: &NewStudent) -> Result<Student> {
    validate_student(&student.name, student.age, student.height_cm)?;

    let result = sqlx::query(
        r#"
        INSERT INTO students (name, age, grade, gender, fitness_level, height_cm)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(student.name.trim())
    .bind(student.age)
    .bind(&student.grade)
    .bind(&student.gender)
    .bind(student.fitness_level.map(|level| level.as_str()))
    .bind(student.height_cm)
    .execute(pool)
    .await?;

    let id = result.last_insert_rowid();
    info!("Added student {} ({})", id, student.name.trim());

    Ok(Student {
        id,
        name: student.name.trim().to_string(),
        age: student.age,
        grade: student.grade.clone(),
        gender: student.gender.clone(),
        fitness_level: student.fitness_level,
        height_cm: student.height_cm,
    })
}

pub async fn fetch_student(pool: &SqlitePool, student_id: i64) -> Result<Option<Student>> {
    let row = sqlx::query("SELECT * FROM students WHERE id = ?")
        .bind(student_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(student_from_row).transpose()
}

pub async fn list_students(pool: &SqlitePool) -> Result<Vec<Student>> {
    let rows = sqlx::query("SELECT * FROM students ORDER BY name, id")
        .fetch_all(pool)
        .await?;

    rows.iter().map(student_from_row).collect()
}

pub async fn update_student(
    pool: &SqlitePool,
    student_id: i64,
    update: &StudentUpdate,
) -> Result<Student> {
    let mut student = fetch_student(pool, student_id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("student {student_id}")))?;

    if let Some(name) = &update.name {
        student.name = name.trim().to_string();
    }
    if update.age.is_some() {
        student.age = update.age;
    }
    if update.grade.is_some() {
        student.grade = update.grade.clone();
    }
    if update.gender.is_some() {
        student.gender = update.gender.clone();
    }
    if update.fitness_level.is_some() {
        student.fitness_level = update.fitness_level;
    }
    if update.height_cm.is_some() {
        student.height_cm = update.height_cm;
    }
    validate_student(&student.name, student.age, student.height_cm)?;

    sqlx::query(
        r#"
        UPDATE students
        SET name = ?, age = ?, grade = ?, gender = ?, fitness_level = ?, height_cm = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(&student.name)
    .bind(student.age)
    .bind(&student.grade)
    .bind(&student.gender)
    .bind(student.fitness_level.map(|level| level.as_str()))
    .bind(student.height_cm)
    .bind(student.id)
    .execute(pool)
    .await?;

    info!("Updated student {}", student.id);
    Ok(student)
}

/// Removes the student together with all of their activity rows.
pub async fn delete_student(pool: &SqlitePool, student_id: i64) -> Result<Student> {
    let student = fetch_student(pool, student_id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("student {student_id}")))?;

    let mut tx = pool.begin().await?;
    let removed = sqlx::query("DELETE FROM activity WHERE student_id = ?")
        .bind(student_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    sqlx::query("DELETE FROM students WHERE id = ?")
        .bind(student_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(
        "Deleted student {} and {} activity rows",
        student_id, removed
    );
    Ok(student)
}

pub async fn insert_activity(pool: &SqlitePool, activity: &NewActivity) -> Result<Activity> {
    validate_activity(
        activity.steps,
        activity.active_minutes,
        activity.distance,
        activity.calories,
        activity.heart_rate,
        activity.weight_kg,
    )?;

    if fetch_student(pool, activity.student_id).await?.is_none() {
        return Err(TrackerError::NotFound(format!(
            "student {}",
            activity.student_id
        )));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO activity
        (student_id, date, steps, active_minutes, distance, calories, heart_rate, weight_kg)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(activity.student_id)
    .bind(activity.date)
    .bind(activity.steps)
    .bind(activity.active_minutes)
    .bind(activity.distance)
    .bind(activity.calories)
    .bind(activity.heart_rate)
    .bind(activity.weight_kg)
    .execute(pool)
    .await?;

    let id = result.last_insert_rowid();
    debug!(
        "Logged activity {} for student {} on {}",
        id, activity.student_id, activity.date
    );

    Ok(Activity {
        id,
        student_id: activity.student_id,
        date: activity.date,
        steps: activity.steps,
        active_minutes: activity.active_minutes,
        distance: activity.distance,
        calories: activity.calories,
        heart_rate: activity.heart_rate,
        weight_kg: activity.weight_kg,
    })
}

pub async fn fetch_activity(pool: &SqlitePool, activity_id: i64) -> Result<Option<Activity>> {
    let row = sqlx::query("SELECT * FROM activity WHERE id = ?")
        .bind(activity_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(activity_from_row).transpose()
}

/// Rows come back newest first; same-date rows are ordered by insertion id, newest first.
pub async fn fetch_activities(
    pool: &SqlitePool,
    student_id: i64,
    filter: &ActivityFilter,
) -> Result<Vec<Activity>> {
    let mut query = String::from("SELECT * FROM activity WHERE student_id = ?");

    if filter.date_from.is_some() {
        query.push_str(" AND date >= ?");
    }
    if filter.date_to.is_some() {
        query.push_str(" AND date <= ?");
    }
    query.push_str(" ORDER BY date DESC, id DESC");
    if filter.limit.is_some() {
        query.push_str(" LIMIT ?");
    }

    let mut rows = sqlx::query(&query).bind(student_id);

    if let Some(from) = filter.date_from {
        rows = rows.bind(from);
    }
    if let Some(to) = filter.date_to {
        rows = rows.bind(to);
    }
    if let Some(limit) = filter.limit {
        rows = rows.bind(limit.max(0));
    }

    let records = rows.fetch_all(pool).await?;
    records.iter().map(activity_from_row).collect()
}

pub async fn update_activity(
    pool: &SqlitePool,
    activity_id: i64,
    update: &ActivityUpdate,
) -> Result<Activity> {
    let mut activity = fetch_activity(pool, activity_id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("activity {activity_id}")))?;

    if let Some(date) = update.date {
        activity.date = date;
    }
    if update.steps.is_some() {
        activity.steps = update.steps;
    }
    if update.active_minutes.is_some() {
        activity.active_minutes = update.active_minutes;
    }
    if update.distance.is_some() {
        activity.distance = update.distance;
    }
    if update.calories.is_some() {
        activity.calories = update.calories;
    }
    if update.heart_rate.is_some() {
        activity.heart_rate = update.heart_rate;
    }
    if update.weight_kg.is_some() {
        activity.weight_kg = update.weight_kg;
    }
    validate_activity(
        activity.steps,
        activity.active_minutes,
        activity.distance,
        activity.calories,
        activity.heart_rate,
        activity.weight_kg,
    )?;

    sqlx::query(
        r#"
        UPDATE activity
        SET date = ?, steps = ?, active_minutes = ?, distance = ?, calories = ?,
            heart_rate = ?, weight_kg = ?
        WHERE id = ?
        "#,
    )
    .bind(activity.date)
    .bind(activity.steps)
    .bind(activity.active_minutes)
    .bind(activity.distance)
    .bind(activity.calories)
    .bind(activity.heart_rate)
    .bind(activity.weight_kg)
    .bind(activity.id)
    .execute(pool)
    .await?;

    info!("Updated activity {}", activity.id);
    Ok(activity)
}

pub async fn delete_activity(pool: &SqlitePool, activity_id: i64) -> Result<Activity> {
    let activity = fetch_activity(pool, activity_id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("activity {activity_id}")))?;

    sqlx::query("DELETE FROM activity WHERE id = ?")
        .bind(activity_id)
        .execute(pool)
        .await?;

    info!("Deleted activity {}", activity_id);
    Ok(activity)
}

pub async fn get_metadata(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    Ok(value.flatten())
}

pub async fn set_metadata(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO metadata (key, value) VALUES (?, ?)
        ON CONFLICT (key) DO UPDATE
        SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}

/// Loads three sample students with 30 days of activity ending `today`.
///
/// Students are matched by name and days that already have a row are left
/// alone, so running it twice does not duplicate anything.
pub async fn seed(pool: &SqlitePool, today: NaiveDate) -> Result<Vec<i64>> {
    let students = vec![
        ("Alice", 15, "10", "Female", FitnessLevel::Beginner, 165.0, 55.0),
        ("Bob", 16, "11", "Male", FitnessLevel::Intermediate, 175.0, 65.0),
        ("Charlie", 14, "9", "Other", FitnessLevel::Advanced, 160.0, 50.0),
    ];
    let num_days: i64 = 30;
    let start = today - Duration::days(num_days - 1);

    let existing = list_students(pool).await?;
    let mut student_ids = Vec::new();

    for (index, (name, age, grade, gender, level, height_cm, base_weight)) in
        students.into_iter().enumerate()
    {
        let student_id = match existing.iter().find(|s| s.name == name) {
            Some(student) => student.id,
            None => {
                insert_student(
                    pool,
                    &NewStudent {
                        name: name.to_string(),
                        age: Some(age),
                        grade: Some(grade.to_string()),
                        gender: Some(gender.to_string()),
                        fitness_level: Some(level),
                        height_cm: Some(height_cm),
                    },
                )
                .await?
                .id
            }
        };

        let offset = index as i64 * 7;
        for day in 0..num_days {
            let date = start + Duration::days(day);
            let filter = ActivityFilter {
                date_from: Some(date),
                date_to: Some(date),
                limit: Some(1),
            };
            if !fetch_activities(pool, student_id, &filter).await?.is_empty() {
                continue;
            }

            let wave = (day * 37 + offset * 13) % 100;
            let weight_drift = ((day + offset) % 11 - 5) as f64 / 10.0;
            insert_activity(
                pool,
                &NewActivity {
                    student_id,
                    date,
                    steps: Some(3000 + wave * 120),
                    active_minutes: Some(10 + (wave * 11) / 10),
                    distance: Some(2.0 + wave as f64 * 0.08),
                    calories: Some(100.0 + wave as f64 * 7.0),
                    heart_rate: Some(60 + wave),
                    weight_kg: Some(((base_weight + weight_drift) * 10.0).round() / 10.0),
                },
            )
            .await?;
        }

        student_ids.push(student_id);
    }

    set_metadata(pool, SAMPLE_DATA_KEY, &today.to_string()).await?;
    info!("Sample data ready for {} students", student_ids.len());
    Ok(student_ids)
}

/// Imports activity rows; rows for unknown students are skipped.
pub async fn import_csv(pool: &SqlitePool, csv_path: &Path) -> Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_id: i64,
        date: NaiveDate,
        steps: Option<i64>,
        active_minutes: Option<i64>,
        distance: Option<f64>,
        calories: Option<f64>,
        heart_rate: Option<i64>,
        weight_kg: Option<f64>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;

        if fetch_student(pool, row.student_id).await?.is_none() {
            warn!(
                "Skipping activity on {} for unknown student {}",
                row.date, row.student_id
            );
            continue;
        }

        insert_activity(
            pool,
            &NewActivity {
                student_id: row.student_id,
                date: row.date,
                steps: row.steps,
                active_minutes: row.active_minutes,
                distance: row.distance,
                calories: row.calories,
                heart_rate: row.heart_rate,
                weight_kg: row.weight_kg,
            },
        )
        .await?;
        inserted += 1;
    }

    info!("Imported {} activity rows from {}", inserted, csv_path.display());
    Ok(inserted)
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = connect("sqlite::memory:").await.unwrap();
    init_db(&pool).await.unwrap();
    pool
}
