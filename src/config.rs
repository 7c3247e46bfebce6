use std::net::SocketAddr;
use std::time::Duration;

use tracing::trace;

use crate::util::{get_agent_endpoints, get_forecaster_url};

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Agent base URLs, e.g. `http://10.0.0.5:8080`
    #[serde(default)]
    pub agents: Vec<String>,

    /// Base URL of the forecasting service's API
    #[serde(default = "default_forecaster_url")]
    pub forecaster_url: String,

    #[serde(default)]
    pub intervals: Intervals,

    #[serde(default)]
    pub timeouts: Timeouts,

    /// Run the scaling rules on every metrics cycle
    #[serde(default)]
    pub auto_scale: bool,

    /// Latency of the simulated actuator
    #[serde(default = "default_actuator_delay_ms")]
    pub actuator_delay_ms: u64,

    #[serde(default)]
    pub api: ApiSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agents: vec![],
            forecaster_url: default_forecaster_url(),
            intervals: Intervals::default(),
            timeouts: Timeouts::default(),
            auto_scale: false,
            actuator_delay_ms: default_actuator_delay_ms(),
            api: ApiSettings::default(),
        }
    }
}

impl Config {
    /// Apply `CLOUDPULSE_*` environment overrides on top of the file values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(agents) = get_agent_endpoints() {
            self.agents = agents;
        }
        if let Some(url) = get_forecaster_url() {
            self.forecaster_url = url;
        }
        self
    }

    /// Every interval and timeout must be at least one second.
    pub fn validate(&self) -> anyhow::Result<()> {
        let Intervals {
            metrics_secs,
            forecast_secs,
            health_secs,
        } = self.intervals;
        let Timeouts {
            agent_secs,
            forecast_secs: forecast_timeout,
            refresh_secs,
            actuator_secs,
        } = self.timeouts;

        let fields = [
            ("intervals.metrics_secs", metrics_secs),
            ("intervals.forecast_secs", forecast_secs),
            ("intervals.health_secs", health_secs),
            ("timeouts.agent_secs", agent_secs),
            ("timeouts.forecast_secs", forecast_timeout),
            ("timeouts.refresh_secs", refresh_secs),
            ("timeouts.actuator_secs", actuator_secs),
        ];

        if let Some((name, _)) = fields.iter().find(|(_, value)| *value == 0) {
            anyhow::bail!("Invalid configuration: {name} must be greater than zero");
        }

        Ok(())
    }

    pub fn actuator_delay(&self) -> Duration {
        Duration::from_millis(self.actuator_delay_ms)
    }
}

/// Cadences of the three scheduled cycles, in seconds
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Intervals {
    #[serde(default = "default_metrics_interval")]
    pub metrics_secs: u64,
    #[serde(default = "default_forecast_interval")]
    pub forecast_secs: u64,
    #[serde(default = "default_health_interval")]
    pub health_secs: u64,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            metrics_secs: default_metrics_interval(),
            forecast_secs: default_forecast_interval(),
            health_secs: default_health_interval(),
        }
    }
}

/// Upper bounds for every outbound call, in seconds
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_agent_timeout")]
    pub agent_secs: u64,
    #[serde(default = "default_forecast_timeout")]
    pub forecast_secs: u64,
    #[serde(default = "default_refresh_timeout")]
    pub refresh_secs: u64,
    #[serde(default = "default_actuator_timeout")]
    pub actuator_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            agent_secs: default_agent_timeout(),
            forecast_secs: default_forecast_timeout(),
            refresh_secs: default_refresh_timeout(),
            actuator_secs: default_actuator_timeout(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            enable_cors: default_enable_cors(),
        }
    }
}

fn default_forecaster_url() -> String {
    String::from("http://localhost:5000/api")
}

fn default_actuator_delay_ms() -> u64 {
    2000
}

fn default_metrics_interval() -> u64 {
    30
}

fn default_forecast_interval() -> u64 {
    300
}

fn default_health_interval() -> u64 {
    60
}

fn default_agent_timeout() -> u64 {
    5
}

fn default_forecast_timeout() -> u64 {
    10
}

fn default_refresh_timeout() -> u64 {
    30
}

fn default_actuator_timeout() -> u64 {
    10
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_enable_cors() -> bool {
    true
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))?;
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
