use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Top-level configuration loaded from benchfan.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct BenchConfig {
    pub runner: RunnerConfig,
    pub orchestrator: OrchestratorConfig,
    pub logs: LogsConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub mode: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub max_processes: u32,
    /// Per-child deadline; 0 disables it.
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    pub dir: PathBuf,
    pub clear_before_run: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub path: PathBuf,
    pub separator: Separator,
    pub write_mode: WriteMode,
    pub average_mode: AverageMode,
    /// Key-generation milestones reported without per-core normalization.
    pub setup_metrics: Vec<String>,
}

/// Field separator used in report lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Separator {
    /// `" # "`
    Hash,
    /// `": "`
    Colon,
}

impl Separator {
    pub fn as_str(self) -> &'static str {
        match self {
            Separator::Hash => " # ",
            Separator::Colon => ": ",
        }
    }
}

/// How the report file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    Truncate,
    Append,
}

/// Which formula produces `average_value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AverageMode {
    /// `sum / (n * n)`, the formula existing reports were produced with.
    SquaredCount,
    /// `sum / n`.
    Mean,
}

pub const DEFAULT_AVERAGE_MODE: AverageMode = AverageMode::SquaredCount;

pub const DEFAULT_SETUP_METRICS: &[&str] = &[
    "Generate Keys Done",
    "Generate Relinearization Keys Done",
    "Generating Galois Key Done",
];

// --- Default implementations ---

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command: "../bin/clustarexamples".to_string(),
            args: vec!["{degree}".to_string(), "{mode}".to_string()],
            mode: "2".to_string(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_processes: 40,
            timeout_secs: 0,
        }
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("record"),
            clear_before_run: true,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("report.txt"),
            separator: Separator::Hash,
            write_mode: WriteMode::Truncate,
            average_mode: DEFAULT_AVERAGE_MODE,
            setup_metrics: DEFAULT_SETUP_METRICS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl OrchestratorConfig {
    /// Upper bound for the process count: the configured maximum, clamped
    /// to the host's available parallelism.
    pub fn effective_max_processes(&self) -> u32 {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1);
        self.max_processes.min(cores).max(1)
    }
}

/// Load config from `path`. A missing file yields defaults; an unreadable or
/// malformed one is an error.
pub fn load_config(path: &Path) -> Result<BenchConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(BenchConfig::default());
        }
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Number of benchmark processes, validated against the host bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessCount(u32);

impl ProcessCount {
    pub fn new(requested: u32, max: u32) -> Result<Self, ConfigError> {
        if requested == 0 || requested > max {
            return Err(ConfigError::ProcessCountOutOfRange { requested, max });
        }
        Ok(Self(requested))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

/// Legal `poly_modulus_degree` values accepted by the benchmark binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolyModulusDegree {
    D1024,
    D2048,
    D4096,
    D8192,
    D16384,
    D32768,
}

impl PolyModulusDegree {
    pub const ALL: [PolyModulusDegree; 6] = [
        PolyModulusDegree::D1024,
        PolyModulusDegree::D2048,
        PolyModulusDegree::D4096,
        PolyModulusDegree::D8192,
        PolyModulusDegree::D16384,
        PolyModulusDegree::D32768,
    ];

    pub fn value(self) -> u32 {
        match self {
            PolyModulusDegree::D1024 => 1024,
            PolyModulusDegree::D2048 => 2048,
            PolyModulusDegree::D4096 => 4096,
            PolyModulusDegree::D8192 => 8192,
            PolyModulusDegree::D16384 => 16384,
            PolyModulusDegree::D32768 => 32768,
        }
    }
}

impl fmt::Display for PolyModulusDegree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl FromStr for PolyModulusDegree {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let value: u32 = trimmed.parse().map_err(|_| ConfigError::UnsupportedDegree {
            value: trimmed.to_string(),
        })?;
        Self::ALL
            .into_iter()
            .find(|d| d.value() == value)
            .ok_or_else(|| ConfigError::UnsupportedDegree {
                value: trimmed.to_string(),
            })
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    ProcessCountOutOfRange { requested: u32, max: u32 },
    UnsupportedDegree { value: String },
    InvalidNumber { input: String },
    Read { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
    Prompt { source: std::io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ProcessCountOutOfRange { requested, max } => write!(
                f,
                "number of parallel processes must be between 1 and {max} (got {requested})"
            ),
            ConfigError::UnsupportedDegree { value } => write!(
                f,
                "poly_modulus_degree must be 1024, 2048, 4096, 8192, 16384 or 32768 (got {value:?})"
            ),
            ConfigError::InvalidNumber { input } => {
                write!(f, "expected a number, got {input:?}")
            }
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::Prompt { source } => write!(f, "failed to read input: {source}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Prompt { source } => Some(source),
            _ => None,
        }
    }
}
