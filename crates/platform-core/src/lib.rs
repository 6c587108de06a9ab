use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppEnv {
    Local,
    Dev,
    Test,
    Prod,
}

impl AppEnv {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Dev => "dev",
            Self::Test => "test",
            Self::Prod => "prod",
        }
    }
}

impl std::str::FromStr for AppEnv {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "dev" | "development" => Ok(Self::Dev),
            "test" => Ok(Self::Test),
            "prod" | "production" => Ok(Self::Prod),
            other => Err(ConfigError::InvalidEnv(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyName {
    Aggressive,
    Conservative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub app: AppSection,
    pub server: ServerSection,
    pub room: RoomSection,
    pub bootstrap: BootstrapSection,
    pub report: ReportSection,
    pub run: RunSection,
    pub observability: ObservabilitySection,
    pub agents: Vec<AgentSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSection {
    pub env: AppEnv,
    pub service_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSection {
    pub max_players: u8,
    pub initial_chips: u64,
    pub small_blind: u64,
    pub big_blind: u64,
    pub min_players_to_start: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapSection {
    pub discovery_delay_ms: u64,
    pub fallback_delay_ms: u64,
}

impl BootstrapSection {
    #[must_use]
    pub fn discovery_delay(&self) -> Duration {
        Duration::from_millis(self.discovery_delay_ms)
    }

    #[must_use]
    pub fn fallback_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    pub interval_ms: u64,
    pub window: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSection {
    pub max_hands: Option<u64>,
    pub max_duration_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySection {
    pub log_filter: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    pub policy: PolicyName,
    #[serde(default)]
    pub opener: bool,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub think_time_ms: Option<u64>,
}

impl AgentSpec {
    #[must_use]
    pub fn think_time(&self) -> Duration {
        let default_ms = match self.policy {
            PolicyName::Aggressive => 1_000,
            PolicyName::Conservative => 1_500,
        };
        Duration::from_millis(self.think_time_ms.unwrap_or(default_ms))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid APP_ENV value: {0}")]
    InvalidEnv(String),
    #[error("invalid value for {name}: {value}")]
    InvalidOverride { name: String, value: String },
    #[error("failed reading config file {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed parsing config file {path}: {source}")]
    ParseToml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid harness config: {0}")]
    Invalid(String),
}

#[derive(Debug, Default, Deserialize)]
struct PartialHarnessConfig {
    app: Option<PartialAppSection>,
    server: Option<PartialServerSection>,
    room: Option<PartialRoomSection>,
    bootstrap: Option<PartialBootstrapSection>,
    report: Option<PartialReportSection>,
    run: Option<RunSection>,
    observability: Option<PartialObservabilitySection>,
    agents: Option<Vec<AgentSpec>>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialAppSection {
    env: Option<AppEnv>,
    service_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialServerSection {
    endpoint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialRoomSection {
    max_players: Option<u8>,
    initial_chips: Option<u64>,
    small_blind: Option<u64>,
    big_blind: Option<u64>,
    min_players_to_start: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialBootstrapSection {
    discovery_delay_ms: Option<u64>,
    fallback_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialReportSection {
    interval_ms: Option<u64>,
    window: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialObservabilitySection {
    log_filter: Option<String>,
}

impl HarnessConfig {
    /// Built-in defaults, then `config/default.toml` and `config/<env>.toml`
    /// when a config directory exists, then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let app_env = env::var("APP_ENV")
            .ok()
            .map(|value| value.parse())
            .transpose()?
            .unwrap_or(AppEnv::Local);
        let mut config = match resolve_config_dir() {
            Some(config_dir) => Self::load_from_dir_for_env(config_dir, app_env)?,
            None => Self::default_for_env(app_env),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_dir_for_env(
        config_dir: impl AsRef<Path>,
        app_env: AppEnv,
    ) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let mut config = Self::default_for_env(app_env);
        merge_file(&mut config, &config_dir.join("default.toml"))?;
        let env_file = config_dir.join(format!("{}.toml", app_env.as_str()));
        if env_file.exists() {
            merge_file(&mut config, &env_file)?;
        }
        config.app.env = app_env;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn default_for_env(app_env: AppEnv) -> Self {
        Self {
            app: AppSection {
                env: app_env,
                service_name: "headless-agent-client".to_string(),
            },
            server: ServerSection {
                endpoint: "ws://127.0.0.1:3000/ws".to_string(),
            },
            room: RoomSection {
                max_players: 6,
                initial_chips: 1_000,
                small_blind: 10,
                big_blind: 20,
                min_players_to_start: 2,
            },
            bootstrap: BootstrapSection {
                discovery_delay_ms: 2_000,
                fallback_delay_ms: 3_000,
            },
            report: ReportSection {
                interval_ms: 10_000,
                window: 50,
            },
            run: RunSection::default(),
            observability: ObservabilitySection {
                log_filter: "info".to_string(),
            },
            agents: vec![
                AgentSpec {
                    name: "AggroBot".to_string(),
                    policy: PolicyName::Aggressive,
                    opener: true,
                    device_id: None,
                    think_time_ms: None,
                },
                AgentSpec {
                    name: "SafeBot".to_string(),
                    policy: PolicyName::Conservative,
                    opener: false,
                    device_id: None,
                    think_time_ms: None,
                },
            ],
        }
    }

    /// Index of the agent that creates the session. Falls back to the first
    /// agent when none is flagged.
    #[must_use]
    pub fn opener_index(&self) -> usize {
        self.agents.iter().position(|a| a.opener).unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agents.is_empty() {
            return Err(ConfigError::Invalid("at least one agent is required".to_string()));
        }
        if self.agents.iter().filter(|a| a.opener).count() > 1 {
            return Err(ConfigError::Invalid("only one agent may be the opener".to_string()));
        }
        if self.bootstrap.fallback_delay_ms <= self.bootstrap.discovery_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "bootstrap.fallback_delay_ms ({}) must exceed discovery_delay_ms ({})",
                self.bootstrap.fallback_delay_ms, self.bootstrap.discovery_delay_ms
            )));
        }
        if self.report.window == 0 {
            return Err(ConfigError::Invalid("report.window must be positive".to_string()));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(raw_env) = env::var("APP_ENV") {
            self.app.env = raw_env.parse()?;
        }
        if let Ok(endpoint) = env::var("HARNESS__ENDPOINT") {
            self.server.endpoint = endpoint;
        }
        if let Some(max_hands) = env_parse_u64("HARNESS__MAX_HANDS")? {
            self.run.max_hands = Some(max_hands);
        }
        if let Some(secs) = env_parse_u64("HARNESS__MAX_DURATION_SECS")? {
            self.run.max_duration_secs = Some(secs);
        }
        if let Some(think_ms) = env_parse_u64("HARNESS__THINK_TIME_MS")? {
            for agent in &mut self.agents {
                agent.think_time_ms = Some(think_ms);
            }
        }
        if let Ok(log_filter) = env::var("OBSERVABILITY__LOG_FILTER") {
            self.observability.log_filter = log_filter;
        } else if let Ok(log_filter) = env::var("RUST_LOG") {
            self.observability.log_filter = log_filter;
        }
        Ok(())
    }

    fn merge_partial(&mut self, partial: PartialHarnessConfig) {
        if let Some(app) = partial.app {
            if let Some(value) = app.env {
                self.app.env = value;
            }
            if let Some(value) = app.service_name {
                self.app.service_name = value;
            }
        }
        if let Some(server) = partial.server {
            if let Some(value) = server.endpoint {
                self.server.endpoint = value;
            }
        }
        if let Some(room) = partial.room {
            if let Some(value) = room.max_players {
                self.room.max_players = value;
            }
            if let Some(value) = room.initial_chips {
                self.room.initial_chips = value;
            }
            if let Some(value) = room.small_blind {
                self.room.small_blind = value;
            }
            if let Some(value) = room.big_blind {
                self.room.big_blind = value;
            }
            if let Some(value) = room.min_players_to_start {
                self.room.min_players_to_start = value;
            }
        }
        if let Some(bootstrap) = partial.bootstrap {
            if let Some(value) = bootstrap.discovery_delay_ms {
                self.bootstrap.discovery_delay_ms = value;
            }
            if let Some(value) = bootstrap.fallback_delay_ms {
                self.bootstrap.fallback_delay_ms = value;
            }
        }
        if let Some(report) = partial.report {
            if let Some(value) = report.interval_ms {
                self.report.interval_ms = value;
            }
            if let Some(value) = report.window {
                self.report.window = value;
            }
        }
        if let Some(run) = partial.run {
            if run.max_hands.is_some() {
                self.run.max_hands = run.max_hands;
            }
            if run.max_duration_secs.is_some() {
                self.run.max_duration_secs = run.max_duration_secs;
            }
        }
        if let Some(observability) = partial.observability {
            if let Some(value) = observability.log_filter {
                self.observability.log_filter = value;
            }
        }
        if let Some(agents) = partial.agents {
            self.agents = agents;
        }
    }
}

fn env_parse_u64(name: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidOverride {
                name: name.to_string(),
                value: raw,
            }),
        _ => Ok(None),
    }
}

fn merge_file(config: &mut HarnessConfig, path: &Path) -> Result<(), ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.display().to_string(),
        source,
    })?;
    let partial = toml::from_str::<PartialHarnessConfig>(&content).map_err(|source| {
        ConfigError::ParseToml {
            path: path.display().to_string(),
            source,
        }
    })?;
    config.merge_partial(partial);
    Ok(())
}

fn resolve_config_dir() -> Option<PathBuf> {
    if let Ok(path) = env::var("HARNESS_CONFIG_DIR") {
        return Some(PathBuf::from(path));
    }

    let mut current_dir = env::current_dir().ok()?;
    loop {
        let candidate = current_dir.join("config");
        if candidate.join("default.toml").exists() {
            return Some(candidate);
        }
        if !current_dir.pop() {
            return None;
        }
    }
}
