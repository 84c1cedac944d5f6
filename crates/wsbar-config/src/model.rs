//! Configuration data model

use std::collections::BTreeMap;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub global: GlobalConfig,
    pub workspaces: WorkspacesConfig,
}

/// Global settings
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub log_level: LogLevel,
    /// Upper bound for one command-channel round trip. `None` waits forever.
    pub request_timeout: Option<Duration>,
    /// Reconcile at least this often even when no events arrive
    pub refresh_interval: Duration,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            request_timeout: None,
            refresh_interval: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`
    pub fn as_directive(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

/// Ordering applied to the workspace list on every reconciliation tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortMethod {
    /// Compositor-assigned workspace id
    Id,
    /// Name, numeric-aware when every name is an integer
    Name,
    /// Integer value of the name, non-numeric names last
    Number,
    /// Special workspaces in the middle of the list
    SpecialCentered,
    /// Position of the workspace's monitor
    Coordinates,
    /// Creation order
    #[default]
    Default,
}

impl std::str::FromStr for SortMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('_', "-").as_str() {
            "ID" => Ok(Self::Id),
            "NAME" => Ok(Self::Name),
            "NUMBER" => Ok(Self::Number),
            "SPECIAL-CENTERED" => Ok(Self::SpecialCentered),
            "COORDINATES" => Ok(Self::Coordinates),
            "DEFAULT" => Ok(Self::Default),
            _ => Err(format!("Unknown sort method: {}", s)),
        }
    }
}

/// Settings for the workspaces module
#[derive(Debug, Clone)]
pub struct WorkspacesConfig {
    /// Output the bar is drawn on; `None` shows every output
    pub output: Option<String>,
    pub all_outputs: bool,
    pub show_special: bool,
    pub special_visible_only: bool,
    pub active_only: bool,
    pub persistent_only: bool,
    pub move_to_monitor: bool,
    pub sort_by: SortMethod,
    pub format: String,
    pub window_separator: String,
    /// Ticks an unclaimed window may wait for its workspace before eviction
    pub window_retry_budget: u32,
    /// Regex patterns; matching workspace names are never shown
    pub ignore_workspaces: Vec<String>,
    pub format_icons: BTreeMap<String, String>,
    pub persistent_workspaces: Vec<PersistentWorkspace>,
    pub window_rewrite_default: String,
    pub window_rewrite: Vec<RewriteRuleConfig>,
}

impl Default for WorkspacesConfig {
    fn default() -> Self {
        Self {
            output: None,
            all_outputs: false,
            show_special: false,
            special_visible_only: false,
            active_only: false,
            persistent_only: false,
            move_to_monitor: false,
            sort_by: SortMethod::Default,
            format: "{name}".to_string(),
            window_separator: " ".to_string(),
            window_retry_budget: 5,
            ignore_workspaces: Vec::new(),
            format_icons: BTreeMap::new(),
            persistent_workspaces: Vec::new(),
            window_rewrite_default: "?".to_string(),
            window_rewrite: Vec::new(),
        }
    }
}

/// A workspace declared persistent by local configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistentWorkspace {
    /// A named workspace, restricted to `outputs` when non-empty
    Named { name: String, outputs: Vec<String> },
    /// `"*" N`: workspaces `1..=N` on every output
    Count(u32),
}

impl PersistentWorkspace {
    /// Expand this declaration into the workspace names relevant for `output`.
    ///
    /// `output == None` means the bar spans every output.
    pub fn names_for_output(&self, output: Option<&str>) -> Vec<String> {
        match self {
            Self::Named { name, outputs } => {
                let applies = match output {
                    Some(out) => outputs.is_empty() || outputs.iter().any(|o| o == out),
                    None => true,
                };
                if applies {
                    vec![name.clone()]
                } else {
                    Vec::new()
                }
            }
            Self::Count(count) => (1..=*count).map(|n| n.to_string()).collect(),
        }
    }
}

/// One `window-rewrite` entry as written in the config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRuleConfig {
    pub pattern: String,
    pub template: String,
    /// Explicit priority; `None` lets the engine's priority function decide
    pub priority: Option<i32>,
}
