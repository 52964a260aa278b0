//! Configuration data model

use std::path::PathBuf;
use std::time::Duration;

/// Maximum number of tags; tag masks are 32-bit and one bit is kept spare
pub const MAX_TAGS: usize = 31;

/// Root configuration structure
#[derive(Debug, Clone)]
pub struct Config {
    pub global: GlobalConfig,
    pub ipc: IpcConfig,
    /// Tag labels in display order
    pub tags: Vec<String>,
    /// Layout symbols in registration order; a layout's id is its index
    pub layouts: Vec<String>,
    pub monitors: Vec<MonitorConfig>,
    /// Feature-gated client state flags reported over IPC
    pub client_flags: Vec<OptionalFlag>,
    /// Clients present when the daemon starts
    pub clients: Vec<ClientConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global: GlobalConfig::default(),
            ipc: IpcConfig::default(),
            tags: (1..=9).map(|n| n.to_string()).collect(),
            layouts: vec!["[]=".to_string(), "><>".to_string(), "[M]".to_string()],
            monitors: vec![MonitorConfig::default()],
            client_flags: Vec::new(),
            clients: Vec::new(),
        }
    }
}

impl Config {
    /// Bitmask covering every configured tag
    pub fn tag_mask(&self) -> u32 {
        match self.tags.len() {
            0 => 0,
            n => u32::MAX >> (32 - n.min(32)),
        }
    }
}

/// Global settings
#[derive(Debug, Clone, Default)]
pub struct GlobalConfig {
    pub log_level: LogLevel,
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
    /// Directive string usable with `tracing_subscriber::EnvFilter`
    pub fn as_filter(&self) -> &'static str {
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

/// IPC socket settings
#[derive(Debug, Clone)]
pub struct IpcConfig {
    /// Socket path; `None` means the daemon picks its runtime default
    pub socket_path: Option<PathBuf>,
    /// Connections accepted beyond this count are closed immediately
    pub max_clients: usize,
    /// Drop connections stuck mid-frame for this long (0 disables)
    pub idle_timeout_ms: u64,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            max_clients: 64,
            idle_timeout_ms: 0,
        }
    }
}

impl IpcConfig {
    /// Configured socket path, or the runtime default
    pub fn resolved_socket_path(&self) -> PathBuf {
        self.socket_path.clone().unwrap_or_else(default_socket_path)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }
}

/// Default socket location
///
/// Prefers `$XDG_RUNTIME_DIR/dwm.sock`, falling back to `/tmp/dwm.sock` when
/// the runtime directory is not set.
pub fn default_socket_path() -> PathBuf {
    match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(runtime_dir) => PathBuf::from(runtime_dir).join("dwm.sock"),
        None => {
            tracing::warn!("XDG_RUNTIME_DIR not set, using fallback socket path in /tmp");
            PathBuf::from("/tmp/dwm.sock")
        }
    }
}

/// A physical monitor
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub mfact: f32,
    pub nmaster: u32,
    pub bar_height: i32,
    pub show_bar: bool,
    pub top_bar: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
            mfact: 0.55,
            nmaster: 1,
            bar_height: 20,
            show_bar: true,
            top_bar: true,
        }
    }
}

/// Client state flags that only exist in some builds
///
/// The always-present flags (fixed, floating, urgent, never-focus,
/// fullscreen) are not listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionalFlag {
    FakeFullscreen,
    Sticky,
    Hidden,
    Game,
    Panel,
    AlwaysOnTop,
}

impl std::str::FromStr for OptionalFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fake-fullscreen" => Ok(Self::FakeFullscreen),
            "sticky" => Ok(Self::Sticky),
            "hidden" => Ok(Self::Hidden),
            "game" => Ok(Self::Game),
            "panel" => Ok(Self::Panel),
            "always-on-top" => Ok(Self::AlwaysOnTop),
            _ => Err(format!("Unknown client flag: {}", s)),
        }
    }
}

/// A client window present at startup
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub name: String,
    pub pid: u32,
    pub tags: u32,
    /// Index into `Config::monitors`
    pub monitor: usize,
    pub floating: bool,
    pub urgent: bool,
    pub fullscreen: bool,
}

impl ClientConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pid: 0,
            tags: 1,
            monitor: 0,
            floating: false,
            urgent: false,
            fullscreen: false,
        }
    }
}
