use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ─── Config Types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HookRelayConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingest_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_body_mb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay_window_sec: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrent_deliveries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_base_sec: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_cap_sec: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dlq_retention_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_retention_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_hmac_verification: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    pub mode: AuthMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt: Option<JwtConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthMode {
    None,
    Jwt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
}

/// `HookRelayConfig` with every field defaulted, as consumed by the engine
/// and the delivery worker pool at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub ingest_port: u16,
    pub log_level: LogLevel,
    pub max_body_mb: u64,
    pub replay_window_sec: i64,
    pub concurrent_deliveries: u32,
    pub retry_base_sec: u64,
    pub retry_cap_sec: u64,
    pub retry_policy: String,
    pub dlq_retention_days: u32,
    pub log_retention_days: u32,
    pub disable_hmac_verification: bool,
    pub auth: Option<AuthConfig>,
    pub redis_url: Option<String>,
    pub postgres_url: Option<String>,
}

pub const DEFAULT_INGEST_PORT: u16 = 8080;
pub const DEFAULT_MAX_BODY_MB: u64 = 2;
pub const DEFAULT_REPLAY_WINDOW_SEC: i64 = 300;
pub const DEFAULT_CONCURRENT_DELIVERIES: u32 = 10;
pub const DEFAULT_RETRY_BASE_SEC: u64 = 1;
pub const DEFAULT_RETRY_CAP_SEC: u64 = 30;
pub const DEFAULT_RETRY_POLICY: &str = "exponential";
pub const DEFAULT_DLQ_RETENTION_DAYS: u32 = 30;
pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 30;

impl HookRelayConfig {
    pub fn resolve(&self) -> ResolvedConfig {
        ResolvedConfig {
            ingest_port: self.ingest_port.unwrap_or(DEFAULT_INGEST_PORT),
            log_level: self.log_level.clone().unwrap_or(LogLevel::Info),
            max_body_mb: self.max_body_mb.unwrap_or(DEFAULT_MAX_BODY_MB),
            replay_window_sec: self.replay_window_sec.unwrap_or(DEFAULT_REPLAY_WINDOW_SEC),
            concurrent_deliveries: self
                .concurrent_deliveries
                .unwrap_or(DEFAULT_CONCURRENT_DELIVERIES),
            retry_base_sec: self.retry_base_sec.unwrap_or(DEFAULT_RETRY_BASE_SEC),
            retry_cap_sec: self.retry_cap_sec.unwrap_or(DEFAULT_RETRY_CAP_SEC),
            retry_policy: self
                .retry_policy
                .clone()
                .unwrap_or_else(|| DEFAULT_RETRY_POLICY.to_string()),
            dlq_retention_days: self.dlq_retention_days.unwrap_or(DEFAULT_DLQ_RETENTION_DAYS),
            log_retention_days: self.log_retention_days.unwrap_or(DEFAULT_LOG_RETENTION_DAYS),
            disable_hmac_verification: self.disable_hmac_verification.unwrap_or(false),
            auth: self.auth.clone(),
            redis_url: self.redis_url.clone(),
            postgres_url: self.postgres_url.clone(),
        }
    }

    /// Applies the `${6}`-fixed environment keys on top of whatever the
    /// config file set, env winning on conflict. `DISABLE_HMAC_VERIFICATION`
    /// is accepted here but the caller is responsible for ignoring it
    /// outside a development deployment.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("INGEST_PORT") {
            if let Ok(n) = v.parse() {
                self.ingest_port = Some(n);
            }
        }
        if let Ok(v) = std::env::var("MAX_BODY_MB") {
            if let Ok(n) = v.parse() {
                self.max_body_mb = Some(n);
            }
        }
        if let Ok(v) = std::env::var("REPLAY_WINDOW_SEC") {
            if let Ok(n) = v.parse() {
                self.replay_window_sec = Some(n);
            }
        }
        if let Ok(v) = std::env::var("CONCURRENT_DELIVERIES") {
            if let Ok(n) = v.parse() {
                self.concurrent_deliveries = Some(n);
            }
        }
        if let Ok(v) = std::env::var("RETRY_BASE_SEC") {
            if let Ok(n) = v.parse() {
                self.retry_base_sec = Some(n);
            }
        }
        if let Ok(v) = std::env::var("RETRY_CAP_SEC") {
            if let Ok(n) = v.parse() {
                self.retry_cap_sec = Some(n);
            }
        }
        if let Ok(v) = std::env::var("RETRY_POLICY") {
            self.retry_policy = Some(v);
        }
        if let Ok(v) = std::env::var("DLQ_RETENTION_DAYS") {
            if let Ok(n) = v.parse() {
                self.dlq_retention_days = Some(n);
            }
        }
        if let Ok(v) = std::env::var("LOG_RETENTION_DAYS") {
            if let Ok(n) = v.parse() {
                self.log_retention_days = Some(n);
            }
        }
        if let Ok(v) = std::env::var("DISABLE_HMAC_VERIFICATION") {
            self.disable_hmac_verification = Some(v == "1" || v.eq_ignore_ascii_case("true"));
        }
        if let Ok(v) = std::env::var("HOOKRELAY_REDIS_URL") {
            self.redis_url = Some(v);
        }
        if let Ok(v) = std::env::var("HOOKRELAY_POSTGRES_URL") {
            self.postgres_url = Some(v);
        }
    }
}

// ─── Environment ─────────────────────────────────────────────────────────────

/// Deployment environment, read from `APP_ENV`. Gates dev-only config
/// escape hatches (currently `disable_hmac_verification`) so they can't
/// silently take effect in production.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Defaults to `Production` when `APP_ENV` is unset or unrecognized —
    /// a dev-only bypass should require an explicit opt-in, not an absent
    /// variable.
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV") {
            Ok(v) if v.eq_ignore_ascii_case("development") || v.eq_ignore_ascii_case("dev") => {
                Environment::Development
            }
            _ => Environment::Production,
        }
    }

    pub fn is_development(self) -> bool {
        matches!(self, Environment::Development)
    }
}

// ─── Config Format ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

// ─── Error ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Environment Variable Interpolation ──────────────────────────────────────

/// Replace `${VAR_NAME}` patterns in a string with environment variable values.
/// If the environment variable is not set, the original `${VAR_NAME}` is kept.
pub fn interpolate_env_vars(value: &str) -> String {
    let re = Regex::new(r"\$\{([^}]+)\}").expect("invalid regex");
    re.replace_all(value, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

fn interpolate_value(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(interpolate_env_vars(&s)),
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(interpolate_value).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter().map(|(k, v)| (k, interpolate_value(v))).collect(),
        ),
        other => other,
    }
}

// ─── Parsing ─────────────────────────────────────────────────────────────────

/// Parse a config string in the given format, with environment variable
/// interpolation.
///
/// - **YAML**: env vars are interpolated in the raw string *before* YAML parsing.
/// - **JSON**: the string is parsed first, then env vars are interpolated in values.
pub fn parse_config(content: &str, format: ConfigFormat) -> Result<HookRelayConfig, ConfigError> {
    let raw: serde_json::Value = match format {
        ConfigFormat::Json => serde_json::from_str(content)?,
        ConfigFormat::Yaml => {
            let interpolated = interpolate_env_vars(content);
            let parsed: serde_json::Value = serde_yaml::from_str(&interpolated)?;
            if parsed.is_null() {
                return Ok(HookRelayConfig::default());
            }
            parsed
        }
    };

    let interpolated = interpolate_value(raw);
    let final_value = coerce_port(interpolated);

    let config: HookRelayConfig =
        serde_json::from_value(final_value).map_err(ConfigError::JsonParse)?;
    Ok(config)
}

/// If `ingestPort` arrived as a JSON string (from env-var substitution),
/// coerce it to a number; drop it if it doesn't parse.
fn coerce_port(mut value: serde_json::Value) -> serde_json::Value {
    if let serde_json::Value::Object(ref mut map) = value {
        if let Some(port_val) = map.get("ingestPort") {
            if let serde_json::Value::String(s) = port_val {
                match s.parse::<u64>() {
                    Ok(n) => {
                        map.insert("ingestPort".to_string(), serde_json::Value::Number(n.into()));
                    }
                    Err(_) => {
                        map.remove("ingestPort");
                    }
                }
            }
        }
    }
    value
}

// ─── File Loading ────────────────────────────────────────────────────────────

const DEFAULT_CANDIDATES: &[&str] = &[
    "hookrelay.config.yaml",
    "hookrelay.config.yml",
    "hookrelay.config.json",
];

/// Load a config file from disk, apply `${6}` environment overrides, and
/// return the raw (not yet defaulted) config.
pub fn load_config_file(config_path: Option<&str>) -> Result<HookRelayConfig, ConfigError> {
    let base_dir = std::env::current_dir()?;
    let mut config = load_config_file_from_dir(config_path, &base_dir)?;
    config.apply_env_overrides();
    Ok(config)
}

fn load_config_file_from_dir(
    config_path: Option<&str>,
    base_dir: &Path,
) -> Result<HookRelayConfig, ConfigError> {
    let candidates: Vec<&str> = match config_path {
        Some(path) => vec![path],
        None => DEFAULT_CANDIDATES.to_vec(),
    };

    for candidate in candidates {
        let full_path = if Path::new(candidate).is_absolute() {
            std::path::PathBuf::from(candidate)
        } else {
            base_dir.join(candidate)
        };

        if !full_path.exists() {
            continue;
        }

        let ext = full_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let content = std::fs::read_to_string(&full_path)?;
        let format = if ext == "json" {
            ConfigFormat::Json
        } else {
            ConfigFormat::Yaml
        };

        return parse_config(&content, format);
    }

    Ok(HookRelayConfig::default())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
