// rgrid settings
// Loaded from ~/.config/rostergrid/config.toml, or the file given with --config

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rostergrid_engine::cell_ref::parse_column;
use rostergrid_engine::populate::{DropdownTarget, RowSpanPolicy, DEFAULT_COLUMN, DEFAULT_FIRST_ROW};
use rostergrid_engine::validation::ErrorAlert;
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    Io { path: PathBuf, message: String },
    /// TOML syntax or type error.
    Parse(String),
    /// Well-formed but unusable value.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, message } => write!(f, "cannot read config {}: {message}", path.display()),
            Self::Parse(msg) => write!(f, "config parse error: {msg}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// A column given either as letters (`"L"`) or a 1-based number (`12`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnSpec {
    Number(usize),
    Letters(String),
}

impl Default for ColumnSpec {
    fn default() -> Self {
        ColumnSpec::Number(DEFAULT_COLUMN)
    }
}

impl ColumnSpec {
    /// 1-based column number, or None if the value is not a column.
    pub fn resolve(&self) -> Option<usize> {
        match self {
            ColumnSpec::Number(0) => None,
            ColumnSpec::Number(n) => Some(*n),
            ColumnSpec::Letters(s) => parse_column(s),
        }
    }
}

/// `[target]`: where the dropdown goes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSettings {
    /// Sheet name; unset means the workbook's active sheet.
    pub sheet: Option<String>,
    pub column: ColumnSpec,
    pub first_row: usize,
    pub span: RowSpanPolicy,
    pub allow_invalid: bool,
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            sheet: None,
            column: ColumnSpec::default(),
            first_row: DEFAULT_FIRST_ROW,
            span: RowSpanPolicy::default(),
            allow_invalid: false,
        }
    }
}

/// `[alert]`: text shown when a cell gets a value outside the list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub title: String,
    pub message: String,
}

impl Default for AlertSettings {
    fn default() -> Self {
        let alert = ErrorAlert::default();
        Self { title: alert.title, message: alert.message }
    }
}

/// `[bamboohr]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BambooSettings {
    pub subdomain: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub target: TargetSettings,
    pub alert: AlertSettings,
    pub bamboohr: BambooSettings,
}

impl Settings {
    /// Default config file location, if the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rostergrid").join("config.toml"))
    }

    /// Load settings.
    ///
    /// An explicit path must exist. Without one, the default location is used
    /// when present and built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(p) => p,
                None => {
                    log::debug!("no config file, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let contents = fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let settings = Self::from_toml(&contents)?;
        log::debug!("loaded config from {}", path.display());
        Ok(settings)
    }

    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.column.resolve().is_none() {
            return Err(ConfigError::Invalid(format!(
                "target.column {:?} is not a column",
                self.target.column
            )));
        }
        if self.target.first_row == 0 {
            return Err(ConfigError::Invalid("target.first_row is 1-based and must be at least 1".into()));
        }
        if let Some(sub) = &self.bamboohr.subdomain {
            if sub.trim().is_empty() {
                return Err(ConfigError::Invalid("bamboohr.subdomain is empty".into()));
            }
        }
        Ok(())
    }

    /// Dropdown target described by these settings.
    pub fn dropdown_target(&self) -> DropdownTarget {
        DropdownTarget {
            column: self.target.column.resolve().unwrap_or(DEFAULT_COLUMN),
            first_row: self.target.first_row,
            span: self.target.span,
            allow_invalid: self.target.allow_invalid,
            alert: ErrorAlert::stop(&self.alert.title, &self.alert.message),
        }
    }
}
