use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for Clearwater Loop
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClearwaterConfig {
    /// Follow-up task policy
    pub tasks: TaskPolicyConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
    /// Database settings (optional; in-memory store when absent)
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskPolicyConfig {
    /// Hours until a reschedule task is due after a no-show
    pub reschedule_due_hours: i64,
    /// Who reschedule tasks land on
    pub reschedule_assignee: String,
    /// Who transport tasks land on
    pub transport_assignee: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit JSON log lines
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
}

impl Default for ClearwaterConfig {
    fn default() -> Self {
        Self {
            tasks: TaskPolicyConfig {
                reschedule_due_hours: 24,
                reschedule_assignee: "Nursing Station".to_string(),
                transport_assignee: "Volunteer Drivers".to_string(),
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: true,
            },
            database: None,
        }
    }
}

impl ClearwaterConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (clearwater-loop.toml, .clearwater-loop-rc)
    /// 3. Environment variables (prefixed with CLEARWATER_LOOP_)
    pub fn load() -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default(
                "tasks.reschedule_due_hours",
                defaults.tasks.reschedule_due_hours,
            )?
            .set_default("tasks.reschedule_assignee", defaults.tasks.reschedule_assignee)?
            .set_default("tasks.transport_assignee", defaults.tasks.transport_assignee)?
            .set_default("observability.log_level", defaults.observability.log_level)?
            .set_default("observability.json_logs", defaults.observability.json_logs)?;

        if Path::new("clearwater-loop.toml").exists() {
            builder = builder.add_source(File::with_name("clearwater-loop"));
        }

        if Path::new(".clearwater-loop-rc").exists() {
            builder = builder.add_source(File::with_name(".clearwater-loop-rc"));
        }

        builder = builder.add_source(
            Environment::with_prefix("CLEARWATER_LOOP")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<ClearwaterConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = ClearwaterConfig::load_env_file();
        ClearwaterConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static ClearwaterConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}
