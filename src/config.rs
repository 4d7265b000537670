use anyhow::Context;
use clap::Args;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Process-wide settings. Every flag falls back to an environment variable.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    pub database_url: Option<String>,

    /// Connection pool size
    #[arg(
        long,
        env = "STUDENT_ANALYTICS_MAX_CONNECTIONS",
        default_value_t = 5,
        global = true
    )]
    pub max_connections: u32,

    /// tracing filter directives, e.g. `info,sqlx=warn`
    #[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
    pub log_filter: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

impl Settings {
    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .context("DATABASE_URL must be set to a Postgres instance")
    }

    pub async fn connect(&self) -> anyhow::Result<PgPool> {
        PgPoolOptions::new()
            .max_connections(self.max_connections.max(1))
            .connect(self.database_url()?)
            .await
            .context("failed to connect to Postgres")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        settings: Settings,
    }

    #[test]
    fn flags_override_defaults() {
        let harness = Harness::parse_from([
            "student-analytics",
            "--database-url",
            "postgres://localhost/school",
            "--max-connections",
            "12",
            "--log-filter",
            "debug",
            "--log-json",
        ]);
        assert_eq!(
            harness.settings.database_url().unwrap(),
            "postgres://localhost/school"
        );
        assert_eq!(harness.settings.max_connections, 12);
        assert_eq!(harness.settings.log_filter, "debug");
        assert!(harness.settings.log_json);
    }

    #[test]
    fn blank_database_url_is_rejected() {
        let settings = Settings {
            database_url: Some("  ".to_string()),
            max_connections: 5,
            log_filter: "info".to_string(),
            log_json: false,
        };
        let err = settings.database_url().unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }
}
