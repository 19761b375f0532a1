use std::path::PathBuf;

use clap::{ArgAction, Args};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://fitness_tracker.db";
pub const DEFAULT_SESSION_FILE: &str = "fitness_sessions.json";

/// Options shared by every subcommand; each can also come from the environment.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// SQLite database to read and write
    #[arg(long, global = true, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    pub database_url: String,

    /// JSON file that keeps session state between runs
    #[arg(long, global = true, env = "FITNESS_SESSION_FILE", default_value = DEFAULT_SESSION_FILE)]
    pub session_file: PathBuf,

    /// Award points and achievements to sessions
    #[arg(long, global = true, env = "FITNESS_ENABLE_GAMIFICATION", action = ArgAction::SetTrue)]
    pub gamification: bool,

    /// Include weekday patterns and consistency in metrics output
    #[arg(
        long,
        global = true,
        env = "FITNESS_ADVANCED_METRICS",
        action = ArgAction::Set,
        default_value_t = true
    )]
    pub advanced_metrics: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        settings: Settings,
    }

    #[test]
    fn defaults_apply_without_flags() {
        let cli = TestCli::try_parse_from(["fitness-tracker"]).unwrap();
        assert!(cli.settings.advanced_metrics);
        assert_eq!(
            cli.settings.session_file,
            PathBuf::from(DEFAULT_SESSION_FILE)
        );
    }

    #[test]
    fn flags_override_defaults() {
        let cli = TestCli::try_parse_from([
            "fitness-tracker",
            "--database-url",
            "sqlite::memory:",
            "--gamification",
            "--advanced-metrics",
            "false",
        ])
        .unwrap();
        assert_eq!(cli.settings.database_url, "sqlite::memory:");
        assert!(cli.settings.gamification);
        assert!(!cli.settings.advanced_metrics);
    }
}
