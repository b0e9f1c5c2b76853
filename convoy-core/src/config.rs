// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Actor credentials, service domain, reconnect interval, scenario selection, logging
use crate::paths;
use crate::traits::Credentials;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub scenario: ScenarioConfig,
    #[serde(default)]
    pub actors: Vec<ActorConfig>,
}

/// Which service implementation the binary talks to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// In-process loopback service
    #[default]
    Loopback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub kind: ServiceKind,
    /// Home domain actors log on against unless they name their own
    pub domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay between a disconnect and the next logon attempt
    #[serde(default = "default_min_logon_interval_ms")]
    pub min_logon_interval_ms: u64,
}

impl ReconnectConfig {
    pub fn min_logon_interval(&self) -> Duration {
        Duration::from_millis(self.min_logon_interval_ms)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            min_logon_interval_ms: default_min_logon_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Scenario to run (see the scenario catalog)
    #[serde(default = "default_scenario_name")]
    pub name: String,
    /// Existing conversation to use instead of a direct conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Directory whose files are uploaded as attachments
    #[serde(default = "default_files_path")]
    pub files_path: String,
    /// Upper bound for a single step; unset means no limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_timeout_secs: Option<u64>,
}

impl ScenarioConfig {
    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            name: default_scenario_name(),
            conversation_id: None,
            files_path: default_files_path(),
            step_timeout_secs: None,
        }
    }
}

/// One scripted participant (user or bot)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Short name scenarios refer to (e.g., "A", "B")
    pub name: String,
    #[serde(flatten)]
    pub credentials: Credentials,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Overrides the service domain for this actor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl ActorConfig {
    pub fn new(name: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            name: name.into(),
            credentials,
            display_name: None,
            domain: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Email or client id; the key actors are registered under
    pub fn identity(&self) -> &str {
        self.credentials.identity()
    }

    pub fn domain_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.domain.as_deref().unwrap_or(default)
    }

    /// Environment variable that overrides this actor's secret
    pub fn secret_env_var(&self) -> String {
        let name: String = self
            .name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("CONVOY_{}_SECRET", name)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_min_logon_interval_ms() -> u64 {
    5000
}

fn default_scenario_name() -> String {
    "conversation".to_string()
}

fn default_files_path() -> String {
    "./files".to_string()
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. CONVOY_CONFIG_PATH env var (if set)
    /// 2. ./convoy.toml (current directory)
    /// 3. ~/.config/convoy/convoy.toml (XDG config dir)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("CONVOY_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from(paths::CONFIG_FILE_NAME);
        if local_config.exists() {
            return Some(local_config);
        }

        paths::config_file().filter(|path| path.exists())
    }

    /// Parse a TOML document without env overrides or validation
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str::<Config>(content).context("Failed to parse convoy configuration")
    }

    /// Load configuration from convoy.toml with environment variable overrides
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`load`](Self::load), but an explicit path wins over the search order
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            if !path.exists() {
                anyhow::bail!("config file not found: {}", path.display());
            }
        }
        let config_path = path.map(Path::to_path_buf).or_else(Self::find_config_file);

        let mut config = if let Some(config_path) = config_path {
            tracing::info!(
                path = %config_path.display(),
                "Loading configuration from file"
            );
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            tracing::info!("No config file found, using environment variables and defaults");
            Config {
                service: ServiceConfig {
                    kind: ServiceKind::default(),
                    domain: String::new(),
                },
                logging: LoggingConfig::default(),
                reconnect: ReconnectConfig::default(),
                scenario: ScenarioConfig::default(),
                actors: Vec::new(),
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("CONVOY_DOMAIN") {
            self.service.domain = val;
        }
        if let Ok(val) = std::env::var("CONVOY_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("CONVOY_LOG_JSON") {
            self.logging.json = val.parse().with_context(|| {
                format!("CONVOY_LOG_JSON must be true or false, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("CONVOY_MIN_LOGON_INTERVAL_MS") {
            self.reconnect.min_logon_interval_ms = val.parse().with_context(|| {
                format!(
                    "CONVOY_MIN_LOGON_INTERVAL_MS must be a number of milliseconds, got: {}",
                    val
                )
            })?;
        }
        if let Ok(val) = std::env::var("CONVOY_SCENARIO") {
            self.scenario.name = val;
        }
        if let Ok(val) = std::env::var("CONVOY_CONVERSATION_ID") {
            self.scenario.conversation_id = Some(val);
        }
        if let Ok(val) = std::env::var("CONVOY_FILES_PATH") {
            self.scenario.files_path = val;
        }
        if let Ok(val) = std::env::var("CONVOY_STEP_TIMEOUT_SECS") {
            self.scenario.step_timeout_secs = Some(val.parse().with_context(|| {
                format!("CONVOY_STEP_TIMEOUT_SECS must be a number of seconds, got: {}", val)
            })?);
        }
        for actor in &mut self.actors {
            let var = actor.secret_env_var();
            if let Ok(val) = std::env::var(&var) {
                actor.credentials.set_secret(val);
                // Clear from environment to prevent exposure via /proc or ps
                std::env::remove_var(&var);
            }
        }

        self.scenario.files_path = paths::expand_tilde(&self.scenario.files_path);
        Ok(())
    }

    /// Check required fields and cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.service.domain.trim().is_empty() {
            anyhow::bail!(
                "service.domain is required (set in convoy.toml or CONVOY_DOMAIN env var)"
            );
        }
        if self.reconnect.min_logon_interval_ms == 0 {
            anyhow::bail!("reconnect.min_logon_interval_ms must be greater than zero");
        }
        if self.scenario.step_timeout_secs == Some(0) {
            anyhow::bail!("scenario.step_timeout_secs must be greater than zero when set");
        }
        if self.scenario.name.trim().is_empty() {
            anyhow::bail!("scenario.name must not be empty");
        }
        if self.actors.is_empty() {
            anyhow::bail!("at least one [[actors]] entry is required");
        }

        let mut names = HashSet::new();
        let mut identities = HashSet::new();
        for actor in &self.actors {
            if actor.name.trim().is_empty() {
                anyhow::bail!("every actor needs a name");
            }
            if actor.identity().trim().is_empty() {
                anyhow::bail!("actor {} has an empty email/client_id", actor.name);
            }
            if actor.credentials.secret().is_empty() {
                anyhow::bail!(
                    "actor {} has an empty secret (set it in convoy.toml or {})",
                    actor.name,
                    actor.secret_env_var()
                );
            }
            if !names.insert(actor.name.as_str()) {
                anyhow::bail!("duplicate actor name: {}", actor.name);
            }
            if !identities.insert(actor.identity()) {
                anyhow::bail!("duplicate actor identity: {}", actor.identity());
            }
        }

        Ok(())
    }

    /// Look up an actor by name
    pub fn actor(&self, name: &str) -> Option<&ActorConfig> {
        self.actors.iter().find(|a| a.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [service]
        domain = "sandbox.example.com"

        [reconnect]
        min_logon_interval_ms = 250

        [scenario]
        name = "direct-reply"
        files_path = "./upload"

        [[actors]]
        name = "A"
        email = "alice@example.com"
        password = "hunter2"
        display_name = "Alice"

        [[actors]]
        name = "bot"
        client_id = "bot-client"
        client_secret = "s3cret"
        domain = "bots.example.com"
    "#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.service.kind, ServiceKind::Loopback);
        assert_eq!(config.service.domain, "sandbox.example.com");
        assert_eq!(config.reconnect.min_logon_interval(), Duration::from_millis(250));
        assert_eq!(config.scenario.name, "direct-reply");
        assert!(config.scenario.step_timeout().is_none());
        assert_eq!(config.actors.len(), 2);

        let alice = config.actor("A").unwrap();
        assert_eq!(
            alice.credentials,
            Credentials::password("alice@example.com", "hunter2")
        );
        assert_eq!(alice.display_name.as_deref(), Some("Alice"));
        assert_eq!(alice.domain_or("sandbox.example.com"), "sandbox.example.com");

        let bot = config.actor("bot").unwrap();
        assert_eq!(bot.identity(), "bot-client");
        assert_eq!(bot.domain_or("sandbox.example.com"), "bots.example.com");
        config.validate().unwrap();
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str(
            r#"
            [service]
            domain = "d"
            "#,
        )
        .unwrap();
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert_eq!(config.reconnect.min_logon_interval_ms, 5000);
        assert_eq!(config.scenario.name, "conversation");
        assert_eq!(config.scenario.files_path, "./files");
        assert!(config.actors.is_empty());
    }

    #[test]
    fn test_validate_requires_actors() {
        let config = Config::from_toml_str("[service]\ndomain = \"d\"\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("[[actors]]"));
    }

    #[test]
    fn test_validate_rejects_empty_domain() {
        let mut config = Config::from_toml_str(SAMPLE).unwrap();
        config.service.domain = "  ".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("service.domain"));
    }

    #[test]
    fn test_validate_rejects_duplicate_identity() {
        let mut config = Config::from_toml_str(SAMPLE).unwrap();
        let mut dup = config.actors[0].clone();
        dup.name = "A2".to_string();
        config.actors.push(dup);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate actor identity"));
    }

    #[test]
    fn test_validate_rejects_zero_interval_and_timeout() {
        let mut config = Config::from_toml_str(SAMPLE).unwrap();
        config.reconnect.min_logon_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::from_toml_str(SAMPLE).unwrap();
        config.scenario.step_timeout_secs = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secret_env_var_name() {
        let actor = ActorConfig::new("bot-1", Credentials::client("c", "s"));
        assert_eq!(actor.secret_env_var(), "CONVOY_BOT_1_SECRET");
    }

    #[test]
    fn test_debug_redacts_actor_secret() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("alice@example.com"));
    }
}
