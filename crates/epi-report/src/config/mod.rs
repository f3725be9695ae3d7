use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::surveillance::domain::{CommuneId, RegionId};
use crate::surveillance::scope::{OriginClasses, SurveillanceScope};
use crate::surveillance::submission::MissingDemographicsPolicy;
use crate::surveillance::window::parse_bound;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub surveillance: SurveillanceScope,
    pub data_path: Option<PathBuf>,
    pub ministry: MinistryConfig,
}

const DEFAULT_WINDOW_START: &str = "2020-09-01 00:00";
const DEFAULT_MINISTRY_TIMEOUT_SECS: u64 = 30;

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            surveillance: load_scope()?,
            data_path: non_empty("SURVEILLANCE_DATA").map(PathBuf::from),
            ministry: load_ministry()?,
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn load_scope() -> Result<SurveillanceScope, ConfigError> {
    let communes = match non_empty("COMUNAS") {
        Some(raw) => parse_id_list(&raw)
            .map(|ids| ids.into_iter().map(CommuneId).collect())
            .map_err(|value| ConfigError::InvalidCommuneList { value })?,
        None => Vec::new(),
    };

    let region = non_empty("REGION")
        .map(|raw| {
            raw.parse::<u32>()
                .map(RegionId)
                .map_err(|_| ConfigError::InvalidRegion { value: raw })
        })
        .transpose()?;

    let commune_population = match non_empty("COMMUNE_POPULATION") {
        Some(raw) => parse_populations(&raw)?,
        None => BTreeMap::new(),
    };

    let region_population = non_empty("REGION_POPULATION")
        .map(|raw| {
            raw.parse::<u64>()
                .map_err(|_| ConfigError::InvalidPopulation { value: raw })
        })
        .transpose()?;

    let mut origins = OriginClasses::default();
    if let Some(raw) = non_empty("ORIGIN_HOSPITAL") {
        origins.hospital = split_names(&raw);
    }
    if let Some(raw) = non_empty("ORIGIN_PRIVATE") {
        origins.private = split_names(&raw);
    }

    Ok(SurveillanceScope {
        communes,
        region,
        commune_population,
        region_population,
        origins,
    })
}

fn load_ministry() -> Result<MinistryConfig, ConfigError> {
    let timeout_secs = match non_empty("MINISTRY_WS_TIMEOUT_SECS") {
        Some(raw) => raw
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or(ConfigError::InvalidTimeout { value: raw })?,
        None => DEFAULT_MINISTRY_TIMEOUT_SECS,
    };

    let raw_start =
        non_empty("MINISTRY_WS_WINDOW_START").unwrap_or_else(|| DEFAULT_WINDOW_START.to_string());
    let window_start = parse_bound(&raw_start, false)
        .ok_or(ConfigError::InvalidWindowStart { value: raw_start })?;

    let missing_demographics = match non_empty("MINISTRY_WS_MISSING_DEMOGRAPHICS") {
        Some(raw) => raw
            .parse::<MissingDemographicsPolicy>()
            .map_err(|value| ConfigError::InvalidMissingDemographicsPolicy { value })?,
        None => MissingDemographicsPolicy::default(),
    };

    Ok(MinistryConfig {
        base_url: non_empty("MINISTRY_WS_URL"),
        timeout: Duration::from_secs(timeout_secs),
        window_start,
        missing_demographics,
    })
}

fn parse_id_list(raw: &str) -> Result<Vec<u32>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<u32>().map_err(|_| part.to_string()))
        .collect()
}

fn parse_populations(raw: &str) -> Result<BTreeMap<CommuneId, u64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|pair| {
            let invalid = || ConfigError::InvalidPopulation {
                value: pair.to_string(),
            };
            let (id, population) = pair.split_once(':').ok_or_else(invalid)?;
            let id = id.trim().parse::<u32>().map_err(|_| invalid())?;
            let population = population.trim().parse::<u64>().map_err(|_| invalid())?;
            Ok((CommuneId(id), population))
        })
        .collect()
}

fn split_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Ministry web service client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinistryConfig {
    /// Submission is disabled when unset.
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub window_start: NaiveDateTime,
    pub missing_demographics: MissingDemographicsPolicy,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidCommuneList { value: String },
    InvalidRegion { value: String },
    InvalidPopulation { value: String },
    InvalidTimeout { value: String },
    InvalidWindowStart { value: String },
    InvalidMissingDemographicsPolicy { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidCommuneList { value } => {
                write!(f, "COMUNAS must list numeric commune ids, found `{value}`")
            }
            ConfigError::InvalidRegion { value } => {
                write!(f, "REGION must be a numeric region id, found `{value}`")
            }
            ConfigError::InvalidPopulation { value } => write!(
                f,
                "population settings must be numeric (`id:population` pairs), found `{value}`"
            ),
            ConfigError::InvalidTimeout { value } => write!(
                f,
                "MINISTRY_WS_TIMEOUT_SECS must be a positive number of seconds, found `{value}`"
            ),
            ConfigError::InvalidWindowStart { value } => write!(
                f,
                "MINISTRY_WS_WINDOW_START must be a date or timestamp, found `{value}`"
            ),
            ConfigError::InvalidMissingDemographicsPolicy { value } => write!(
                f,
                "MINISTRY_WS_MISSING_DEMOGRAPHICS must be `abort` or `skip`, found `{value}`"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
