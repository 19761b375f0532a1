//! Per-session gamification state: points, unlocked achievements and goals.
//!
//! Sessions live in a [`SessionStore`] keyed by id. A session is created by
//! [`SessionStore::start`] and discarded by [`SessionStore::end`]; between CLI
//! invocations the store can be kept in a JSON file. Nothing in here is read
//! by the metrics engine.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, TrackerError};
use crate::metrics;
use crate::models::{Activity, Metric};

pub const ADD_STUDENT_POINTS: i64 = 5;
pub const SET_GOAL_POINTS: i64 = 2;
pub const POINTS_PER_LEVEL: i64 = 20;
pub const GOAL_ACHIEVER_RATE: f64 = 80.0;
pub const WEIGHT_PROGRESS_PCT: f64 = 50.0;
pub const CONSISTENT_STREAK_DAYS: u32 = 7;
pub const STEP_MASTER_STEPS: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AchievementId {
    StepMaster,
    StepsAchiever,
    ActivityAchiever,
    WeightProgress,
    ConsistentLogger,
    DataAnalyst,
    GoalSetter,
    EarlyAdopter,
}

#[derive(Debug, Clone, Copy)]
pub struct Achievement {
    pub id: AchievementId,
    pub name: &'static str,
    pub description: &'static str,
    pub points: i64,
}

pub static ACHIEVEMENTS: [Achievement; 8] = [
    Achievement {
        id: AchievementId::StepMaster,
        name: "Step Master",
        description: "Logged over 10,000 steps in a single day",
        points: 10,
    },
    Achievement {
        id: AchievementId::StepsAchiever,
        name: "Steps Champion",
        description: "Achieved your steps goal on 80% of days",
        points: 20,
    },
    Achievement {
        id: AchievementId::ActivityAchiever,
        name: "Active Lifestyle Master",
        description: "Achieved your active minutes goal on 80% of days",
        points: 20,
    },
    Achievement {
        id: AchievementId::WeightProgress,
        name: "Halfway There",
        description: "Reached 50% of your weight goal",
        points: 15,
    },
    Achievement {
        id: AchievementId::ConsistentLogger,
        name: "Consistent Logger",
        description: "Logged activity for 7 consecutive days",
        points: 15,
    },
    Achievement {
        id: AchievementId::DataAnalyst,
        name: "Data Analyst",
        description: "Viewed all dashboard charts and analytics",
        points: 5,
    },
    Achievement {
        id: AchievementId::GoalSetter,
        name: "Goal Setter",
        description: "Set goals for steps, activity, and weight",
        points: 10,
    },
    Achievement {
        id: AchievementId::EarlyAdopter,
        name: "Early Adopter",
        description: "One of the first to use the fitness tracker",
        points: 5,
    },
];

impl AchievementId {
    pub fn details(&self) -> &'static Achievement {
        let index = match self {
            AchievementId::StepMaster => 0,
            AchievementId::StepsAchiever => 1,
            AchievementId::ActivityAchiever => 2,
            AchievementId::WeightProgress => 3,
            AchievementId::ConsistentLogger => 4,
            AchievementId::DataAnalyst => 5,
            AchievementId::GoalSetter => 6,
            AchievementId::EarlyAdopter => 7,
        };
        &ACHIEVEMENTS[index]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Reward {
    pub name: &'static str,
    pub description: &'static str,
    pub cost: i64,
}

pub static REWARDS: [Reward; 4] = [
    Reward {
        name: "Custom Badge",
        description: "Unlock a custom profile badge of your choice",
        cost: 30,
    },
    Reward {
        name: "Dashboard Theme",
        description: "Unlock a special color theme for your dashboard",
        cost: 50,
    },
    Reward {
        name: "Advanced Analytics",
        description: "Unlock additional analytics features",
        cost: 75,
    },
    Reward {
        name: "Virtual Trophy",
        description: "A virtual trophy to display on your profile",
        cost: 100,
    },
];

/// Points for logging one activity row.
pub fn points_for_steps(steps: Option<i64>) -> i64 {
    match steps.unwrap_or(0) {
        s if s > 10_000 => 10,
        s if s > 5_000 => 5,
        _ => 2,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Goal {
    Steps(i64),
    ActiveMinutes(i64),
    WeightKg(f64),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentGoals {
    pub steps: Option<i64>,
    pub active_minutes: Option<i64>,
    pub weight_kg: Option<f64>,
}

impl StudentGoals {
    pub fn is_complete(&self) -> bool {
        self.steps.is_some() && self.active_minutes.is_some() && self.weight_kg.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub points: i64,
    pub achievements: Vec<AchievementId>,
    pub goals: BTreeMap<i64, StudentGoals>,
    #[serde(default)]
    pub redeemed: Vec<String>,
}

impl SessionState {
    pub fn new() -> Self {
        SessionState {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            points: 0,
            achievements: Vec::new(),
            goals: BTreeMap::new(),
            redeemed: Vec::new(),
        }
    }

    pub fn level(&self) -> i64 {
        1 + self.points.max(0) / POINTS_PER_LEVEL
    }

    pub fn award(&mut self, points: i64) {
        self.points += points;
    }

    pub fn has(&self, id: AchievementId) -> bool {
        self.achievements.contains(&id)
    }

    /// Returns `true` on first unlock, which also credits the achievement's points.
    pub fn unlock(&mut self, id: AchievementId) -> bool {
        if self.has(id) {
            return false;
        }
        self.achievements.push(id);
        self.points += id.details().points;
        debug!("Session {} unlocked {:?}", self.id, id);
        true
    }

    pub fn locked(&self) -> Vec<AchievementId> {
        ACHIEVEMENTS
            .iter()
            .map(|achievement| achievement.id)
            .filter(|id| !self.has(*id))
            .collect()
    }

    pub fn goals_for(&self, student_id: i64) -> Option<&StudentGoals> {
        self.goals.get(&student_id)
    }

    pub fn set_goal(&mut self, student_id: i64, goal: Goal) -> Result<()> {
        let valid = match goal {
            Goal::Steps(steps) => steps > 0,
            Goal::ActiveMinutes(minutes) => minutes > 0,
            Goal::WeightKg(weight) => weight.is_finite() && weight > 0.0,
        };
        if !valid {
            return Err(TrackerError::InvalidInput(format!(
                "goal must be positive: {goal:?}"
            )));
        }

        let goals = self.goals.entry(student_id).or_default();
        match goal {
            Goal::Steps(steps) => goals.steps = Some(steps),
            Goal::ActiveMinutes(minutes) => goals.active_minutes = Some(minutes),
            Goal::WeightKg(weight) => goals.weight_kg = Some(weight),
        }
        Ok(())
    }

    pub fn redeem(&mut self, reward_name: &str) -> Result<Reward> {
        let reward = REWARDS
            .iter()
            .find(|reward| reward.name.eq_ignore_ascii_case(reward_name.trim()))
            .copied()
            .ok_or_else(|| TrackerError::NotFound(format!("reward '{reward_name}'")))?;

        if self.points < reward.cost {
            return Err(TrackerError::InvalidInput(format!(
                "not enough points for {}: need {} more",
                reward.name,
                reward.cost - self.points
            )));
        }

        self.points -= reward.cost;
        self.redeemed.push(reward.name.to_string());
        Ok(reward)
    }

    /// Unlocks every achievement the student's windowed rows now qualify for.
    pub fn evaluate_progress(
        &mut self,
        student_id: i64,
        rows: &[Activity],
        today: NaiveDate,
    ) -> Vec<AchievementId> {
        let mut earned = Vec::new();
        let goals = self.goals_for(student_id).cloned().unwrap_or_default();

        if metrics::has_step_day_over(rows, STEP_MASTER_STEPS) {
            earned.push(AchievementId::StepMaster);
        }
        if let Some(goal) = goals.steps {
            if !rows.is_empty()
                && metrics::goal_achievement_rate(rows, Metric::Steps, goal as f64)
                    >= GOAL_ACHIEVER_RATE
            {
                earned.push(AchievementId::StepsAchiever);
            }
        }
        if let Some(goal) = goals.active_minutes {
            if !rows.is_empty()
                && metrics::goal_achievement_rate(rows, Metric::ActiveMinutes, goal as f64)
                    >= GOAL_ACHIEVER_RATE
            {
                earned.push(AchievementId::ActivityAchiever);
            }
        }
        if let Some(goal) = goals.weight_kg {
            if metrics::weight_goal_progress(rows, goal)
                .is_some_and(|progress| progress.progress_pct >= WEIGHT_PROGRESS_PCT)
            {
                earned.push(AchievementId::WeightProgress);
            }
        }
        if metrics::activity_streak(rows, today) >= CONSISTENT_STREAK_DAYS {
            earned.push(AchievementId::ConsistentLogger);
        }
        if goals.is_complete() {
            earned.push(AchievementId::GoalSetter);
        }

        earned.retain(|id| self.unlock(*id));
        earned
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SessionStore {
    sessions: HashMap<Uuid, SessionState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a saved store; a missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let contents = std::fs::read_to_string(path)?;
        let store: SessionStore = serde_json::from_str(&contents)?;
        debug!(
            "Loaded {} sessions from {}",
            store.sessions.len(),
            path.display()
        );
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn start(&mut self) -> Uuid {
        let session = SessionState::new();
        let id = session.id;
        self.sessions.insert(id, session);
        info!("Started session {}", id);
        id
    }

    pub fn get(&self, id: Uuid) -> Result<&SessionState> {
        self.sessions
            .get(&id)
            .ok_or_else(|| TrackerError::NotFound(format!("session {id}")))
    }

    pub fn get_mut(&mut self, id: Uuid) -> Result<&mut SessionState> {
        self.sessions
            .get_mut(&id)
            .ok_or_else(|| TrackerError::NotFound(format!("session {id}")))
    }

    pub fn end(&mut self, id: Uuid) -> Result<SessionState> {
        let session = self
            .sessions
            .remove(&id)
            .ok_or_else(|| TrackerError::NotFound(format!("session {id}")))?;
        info!("Ended session {} with {} points", id, session.points);
        Ok(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
