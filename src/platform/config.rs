// MedScan - platform/config.rs
//
// Platform-specific data directory resolution and config.toml loading with
// startup validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::core::model::StageSpec;
use crate::core::preprocess::PreprocessConfig;
use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Resolved platform paths for MedScan data and configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/medscan/ or %APPDATA%\MedScan\config\)
    pub config_dir: PathBuf,

    /// Data directory holding the durable store.
    pub data_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let data_dir = proj_dirs.data_dir().to_path_buf();

            tracing::debug!(
                config = %config_dir.display(),
                data = %data_dir.display(),
                "Platform paths resolved"
            );

            Self {
                config_dir,
                data_dir,
            }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            let fallback = PathBuf::from(".");
            Self {
                config_dir: fallback.clone(),
                data_dir: fallback,
            }
        }
    }

    /// Path of the durable key-value store file.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(constants::STORE_FILE_NAME)
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored for forward compatibility.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub service: ServiceSection,
    pub cooldown: CooldownSection,
    pub preprocess: PreprocessSection,
    pub pipeline: PipelineSection,
    pub storage: StorageSection,
    pub logging: LoggingSection,
}

/// `[service]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    /// URL the image payload is POSTed to.
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the bearer token.
    pub api_key_env: Option<String>,
    /// Request timeout; absent means wait indefinitely.
    pub request_timeout_secs: Option<u64>,
}

/// `[cooldown]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct CooldownSection {
    pub window_seconds: Option<u64>,
}

/// `[preprocess]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct PreprocessSection {
    pub max_dimension: Option<u32>,
    pub jpeg_quality: Option<u8>,
    pub max_input_bytes: Option<u64>,
}

/// `[pipeline]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub stages: Option<Vec<RawStage>>,
}

/// One `[[pipeline.stages]]` entry.
#[derive(Debug, serde::Deserialize)]
pub struct RawStage {
    pub title: String,
    pub min_duration_ms: u64,
}

/// `[storage]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Persist the cooldown deadline across restarts (default true).
    pub persist: Option<bool>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
}

/// Validated application configuration derived from `config.toml`.
///
/// Invalid values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // -- Service --
    pub endpoint: Option<String>,
    pub api_key_env: String,
    pub request_timeout: Option<Duration>,

    // -- Session --
    pub cooldown_window_secs: u64,
    pub preprocess: PreprocessConfig,
    pub stages: Vec<StageSpec>,
    pub persist: bool,

    // -- Logging --
    pub log_level: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: constants::DEFAULT_API_KEY_ENV.to_string(),
            request_timeout: None,
            cooldown_window_secs: constants::DEFAULT_COOLDOWN_WINDOW_SECS,
            preprocess: PreprocessConfig::default(),
            stages: default_stages(),
            persist: true,
            log_level: None,
        }
    }
}

/// The built-in analysis stages.
pub fn default_stages() -> Vec<StageSpec> {
    constants::DEFAULT_ANALYSIS_STAGES
        .iter()
        .map(|&(title, ms)| StageSpec::new(title, Duration::from_millis(ms)))
        .collect()
}

/// Load and validate `config.toml` from the given config directory.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// If the file does not exist, returns defaults with no warnings (first-run).
/// If the file is unparseable, returns defaults with a warning.
pub fn load_config(config_dir: &Path) -> (AppConfig, Vec<String>) {
    let config_path = config_dir.join(constants::CONFIG_FILE_NAME);

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), Vec::new());
    }

    let content = match std::fs::read_to_string(&config_path) {
        Ok(c) => c,
        Err(source) => {
            return fallback(ConfigError::Io {
                path: config_path,
                source,
            })
        }
    };

    let raw: RawConfig = match toml::from_str(&content) {
        Ok(r) => r,
        Err(source) => {
            return fallback(ConfigError::TomlParse {
                path: config_path,
                source,
            })
        }
    };

    tracing::info!(path = %config_path.display(), "Loaded config.toml");
    validate(raw)
}

/// Defaults plus a single warning describing why the file was not used.
fn fallback(err: ConfigError) -> (AppConfig, Vec<String>) {
    let msg = format!("{err}. Using defaults.");
    tracing::warn!(error = %err, "config.toml ignored");
    (AppConfig::default(), vec![msg])
}

/// Validate each field against named constants, accumulating all warnings.
pub fn validate(raw: RawConfig) -> (AppConfig, Vec<String>) {
    let mut config = AppConfig::default();
    let mut warnings: Vec<String> = Vec::new();

    // -- Service --
    if let Some(endpoint) = raw.service.endpoint {
        let endpoint = endpoint.trim().to_string();
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            config.endpoint = Some(endpoint);
        } else if !endpoint.is_empty() {
            warnings.push(format!(
                "[service] endpoint = \"{endpoint}\" is not an http(s) URL. Ignoring it."
            ));
        }
    }

    if let Some(env) = raw.service.api_key_env {
        if !env.trim().is_empty() {
            config.api_key_env = env.trim().to_string();
        }
    }

    if let Some(secs) = raw.service.request_timeout_secs {
        if (1..=constants::MAX_REQUEST_TIMEOUT_SECS).contains(&secs) {
            config.request_timeout = Some(Duration::from_secs(secs));
        } else {
            warnings.push(format!(
                "[service] request_timeout_secs = {secs} is out of range (1-{}). \
                 Requests will not time out.",
                constants::MAX_REQUEST_TIMEOUT_SECS,
            ));
        }
    }

    // -- Cooldown --
    if let Some(secs) = raw.cooldown.window_seconds {
        if (constants::MIN_COOLDOWN_WINDOW_SECS..=constants::MAX_COOLDOWN_WINDOW_SECS)
            .contains(&secs)
        {
            config.cooldown_window_secs = secs;
        } else {
            warnings.push(format!(
                "[cooldown] window_seconds = {secs} is out of range ({}-{}). Using default ({}).",
                constants::MIN_COOLDOWN_WINDOW_SECS,
                constants::MAX_COOLDOWN_WINDOW_SECS,
                constants::DEFAULT_COOLDOWN_WINDOW_SECS,
            ));
        }
    }

    // -- Preprocess --
    if let Some(dim) = raw.preprocess.max_dimension {
        if (constants::MIN_MAX_IMAGE_DIMENSION..=constants::ABSOLUTE_MAX_IMAGE_DIMENSION)
            .contains(&dim)
        {
            config.preprocess.max_dimension = dim;
        } else {
            warnings.push(format!(
                "[preprocess] max_dimension = {dim} is out of range ({}-{}). Using default ({}).",
                constants::MIN_MAX_IMAGE_DIMENSION,
                constants::ABSOLUTE_MAX_IMAGE_DIMENSION,
                constants::DEFAULT_MAX_IMAGE_DIMENSION,
            ));
        }
    }

    if let Some(quality) = raw.preprocess.jpeg_quality {
        if (1..=100).contains(&quality) {
            config.preprocess.jpeg_quality = quality;
        } else {
            warnings.push(format!(
                "[preprocess] jpeg_quality = {quality} is out of range (1-100). Using default ({}).",
                constants::DEFAULT_JPEG_QUALITY,
            ));
        }
    }

    if let Some(bytes) = raw.preprocess.max_input_bytes {
        if (1..=constants::ABSOLUTE_MAX_INPUT_BYTES).contains(&bytes) {
            config.preprocess.max_input_bytes = bytes;
        } else {
            warnings.push(format!(
                "[preprocess] max_input_bytes = {bytes} is out of range (1-{}). Using default ({}).",
                constants::ABSOLUTE_MAX_INPUT_BYTES,
                constants::DEFAULT_MAX_INPUT_BYTES,
            ));
        }
    }

    // -- Pipeline --
    if let Some(stages) = raw.pipeline.stages {
        match validate_stages(&stages) {
            Ok(specs) => config.stages = specs,
            Err(reason) => warnings.push(format!(
                "[pipeline] stages: {reason}. Using the built-in stages."
            )),
        }
    }

    // -- Storage --
    if let Some(persist) = raw.storage.persist {
        config.persist = persist;
    }

    // -- Logging --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.to_lowercase());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default (info).",
            ));
        }
    }

    if !warnings.is_empty() {
        tracing::warn!(
            count = warnings.len(),
            "Config validation produced warnings"
        );
    }

    (config, warnings)
}

fn validate_stages(stages: &[RawStage]) -> Result<Vec<StageSpec>, String> {
    if stages.is_empty() {
        return Err("at least one stage is required".to_string());
    }
    if stages.len() > constants::MAX_ANALYSIS_STAGES {
        return Err(format!(
            "{} stages configured, maximum is {}",
            stages.len(),
            constants::MAX_ANALYSIS_STAGES
        ));
    }

    stages
        .iter()
        .map(|stage| {
            let title = stage.title.trim();
            if title.is_empty() {
                return Err("stage titles must not be empty".to_string());
            }
            if stage.min_duration_ms > constants::MAX_STAGE_DWELL_MS {
                return Err(format!(
                    "stage \"{title}\" dwell of {} ms exceeds {} ms",
                    stage.min_duration_ms,
                    constants::MAX_STAGE_DWELL_MS
                ));
            }
            Ok(StageSpec::new(
                title,
                Duration::from_millis(stage.min_duration_ms),
            ))
        })
        .collect()
}
