//! Engine configuration
//!
//! Loaded with figment: an optional YAML file, then `HHC_`-prefixed environment
//! variables on top (`HHC_HOST`, `HHC_SCAN_INTERVAL_SECS`, ...).

use std::path::Path;
use std::time::Duration;

use errors::{config_error, invalid_config, HeatResult};
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::catalog::heat_control_points;
use crate::constants::{
    DEFAULT_PORT, DEFAULT_SCAN_INTERVAL_SECS, DEFAULT_UNIT_ID, MODBUS_MAX_READ_REGISTERS,
};
use crate::engine::{io_timeout, EngineOptions, PollEngine, WriteFunction};
use crate::planner::PlanOptions;
use crate::point::PointDefinition;
use crate::registry::PointRegistry;
use crate::transport::{RegisterTransport, TcpTransport};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "HHC_";

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// Defaults to three scan intervals
    #[serde(default)]
    pub stale_after_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub batch_reads: bool,
    #[serde(default = "default_max_batch")]
    pub max_batch_registers: u16,
    #[serde(default)]
    pub max_gap_registers: u16,
    #[serde(default)]
    pub write_function: WriteFunction,
    /// Log filter applied once the configuration is loaded (`debug`, `info,hhcsrv=trace`)
    #[serde(default)]
    pub log_level: Option<String>,
    /// Custom point table; the built-in catalog is used when absent
    #[serde(default)]
    pub points: Option<Vec<PointDefinition>>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_unit_id() -> u8 {
    DEFAULT_UNIT_ID
}

fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL_SECS
}

fn default_true() -> bool {
    true
}

fn default_max_batch() -> u16 {
    32
}

impl EngineConfig {
    /// Load from `path` (if given) and the environment, then validate.
    pub fn load(path: Option<&Path>) -> HeatResult<Self> {
        Self::load_with_env(path, ENV_PREFIX)
    }

    pub fn load_with_env(path: Option<&Path>, env_prefix: &str) -> HeatResult<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            if !path.exists() {
                return Err(config_error!("config file not found: {}", path.display()));
            }
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed(env_prefix));
        Self::from_figment(figment)
    }

    pub fn from_yaml_str(yaml: &str) -> HeatResult<Self> {
        Self::from_figment(Figment::from(Yaml::string(yaml)))
    }

    fn from_figment(figment: Figment) -> HeatResult<Self> {
        let config: Self = figment
            .extract()
            .map_err(|e| config_error!("failed to load configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> HeatResult<()> {
        if self.host.trim().is_empty() {
            return Err(invalid_config!("host", "must not be empty"));
        }
        if self.port == 0 {
            return Err(invalid_config!("port", "must not be zero"));
        }
        if self.max_batch_registers == 0 || self.max_batch_registers > MODBUS_MAX_READ_REGISTERS
        {
            return Err(invalid_config!(
                "max_batch_registers",
                format!("must be within 1..={MODBUS_MAX_READ_REGISTERS}")
            ));
        }
        if self
            .log_level
            .as_deref()
            .is_some_and(|level| level.trim().is_empty())
        {
            return Err(invalid_config!("log_level", "must not be empty"));
        }
        if self.stale_after_secs == Some(0) {
            return Err(invalid_config!("stale_after_secs", "must not be zero"));
        }
        Ok(())
    }

    /// Scan interval with the one-second minimum applied
    pub fn scan_interval(&self) -> Duration {
        if self.scan_interval_secs < 1 {
            warn!("scan_interval_secs {} raised to 1", self.scan_interval_secs);
        }
        Duration::from_secs(self.scan_interval_secs.max(1))
    }

    pub fn engine_options(&self) -> EngineOptions {
        let mut options = EngineOptions::with_interval(self.scan_interval());
        if let Some(secs) = self.stale_after_secs {
            options.stale_after = Duration::from_secs(secs);
        }
        options.plan = PlanOptions {
            batch: self.batch_reads,
            max_batch: self.max_batch_registers,
            max_gap: self.max_gap_registers,
        };
        options.write_function = self.write_function;
        options
    }

    /// Point registry from the configured table or the built-in catalog
    pub fn registry(&self) -> HeatResult<PointRegistry> {
        let points = match &self.points {
            Some(defs) => defs
                .iter()
                .cloned()
                .map(|d| d.into_point(self.unit_id))
                .collect(),
            None => heat_control_points(self.unit_id),
        };
        PointRegistry::new(points)
    }

    /// Engine talking Modbus TCP to the configured endpoint
    pub fn build_engine(&self) -> HeatResult<PollEngine> {
        let transport = TcpTransport::new(
            self.host.clone(),
            self.port,
            io_timeout(self.scan_interval()),
        );
        self.build_engine_with(Box::new(transport))
    }

    /// Engine over a caller-supplied transport
    pub fn build_engine_with(&self, transport: Box<dyn RegisterTransport>) -> HeatResult<PollEngine> {
        let registry = self.registry()?;
        info!(
            "Engine config: {}:{} unit {} ({} points)",
            self.host,
            self.port,
            self.unit_id,
            registry.len()
        );
        Ok(PollEngine::new(registry, transport, self.engine_options()))
    }
}
