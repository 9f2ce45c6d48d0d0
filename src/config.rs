//! CLI flags (C10) plus an optional TOML config file, merged with CLI taking
//! precedence over the file, which takes precedence over built-in defaults
//! (§6).

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

const DEFAULT_QMP_DIR: &str = "/var/run/qips";

/// Named adapter choice. `null` is the only backend this repo ships; a
/// downstream integrator adds variants for real hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AdapterChoice {
    Null,
}

impl Default for AdapterChoice {
    fn default() -> Self {
        Self::Null
    }
}

#[derive(Debug, Parser)]
#[command(name = "vmswitch", version, about = "Host-side input proxy and focus switcher for multi-guest virtualization consoles")]
pub struct Cli {
    /// Directory watched for guest control sockets (`slot-<N>`).
    #[arg(long, value_name = "PATH")]
    pub qmp_dir: Option<PathBuf>,

    /// Console backend to load (keyboard grab/release, LED state).
    #[arg(long, value_enum)]
    pub console_backend: Option<AdapterChoice>,

    /// Console frontend to load (display switching).
    #[arg(long, value_enum)]
    pub console_frontend: Option<AdapterChoice>,

    /// Input backend to load (physical device enumeration).
    #[arg(long, value_enum)]
    pub input_backend: Option<AdapterChoice>,

    /// Optional TOML config file; CLI flags override its values.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Basic debug logging.
    #[arg(short = 'D', long)]
    pub debug: bool,

    /// Reserved for a future evdev backend.
    #[arg(short = 'E', long)]
    pub debug_evdev: bool,

    /// Verbose per-event input logging.
    #[arg(short = 'I', long)]
    pub debug_input: bool,

    /// Reserved; vmswitch does not background itself.
    #[arg(short = 'd', long)]
    pub daemonize: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    vmswitch: ConfigFileSection,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFileSection {
    qmp_dir: Option<PathBuf>,
    console_backend: Option<AdapterChoice>,
    console_frontend: Option<AdapterChoice>,
    input_backend: Option<AdapterChoice>,
    response_timeout_ms: Option<u64>,
}

/// Resolved configuration, CLI over file over defaults.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub qmp_dir: PathBuf,
    pub console_backend: AdapterChoice,
    pub console_frontend: AdapterChoice,
    pub input_backend: AdapterChoice,
    pub response_timeout: Option<Duration>,
    pub debug: bool,
    pub debug_evdev: bool,
    pub debug_input: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
}

impl ResolvedConfig {
    /// Merge a parsed CLI invocation with an optional config file on disk.
    /// Absence of `cli.config` is not an error (§6: "no persisted state").
    pub fn resolve(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        }
        .unwrap_or_default();

        let qmp_dir = cli
            .qmp_dir
            .or(file.vmswitch.qmp_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_QMP_DIR));
        let console_backend = cli.console_backend.or(file.vmswitch.console_backend).unwrap_or_default();
        let console_frontend = cli.console_frontend.or(file.vmswitch.console_frontend).unwrap_or_default();
        let input_backend = cli.input_backend.or(file.vmswitch.input_backend).unwrap_or_default();
        let response_timeout = file.vmswitch.response_timeout_ms.map(Duration::from_millis);

        Ok(Self {
            qmp_dir,
            console_backend,
            console_frontend,
            input_backend,
            response_timeout,
            debug: cli.debug,
            debug_evdev: cli.debug_evdev,
            debug_input: cli.debug_input,
        })
    }
}

fn read_config_file(path: &PathBuf) -> Result<ConfigFile, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.clone(), source })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.clone(), source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_file_values() {
        let cli = Cli {
            qmp_dir: Some(PathBuf::from("/tmp/override")),
            console_backend: None,
            console_frontend: None,
            input_backend: None,
            config: None,
            debug: false,
            debug_evdev: false,
            debug_input: false,
            daemonize: false,
        };
        let resolved = ResolvedConfig::resolve(cli).unwrap();
        assert_eq!(resolved.qmp_dir, PathBuf::from("/tmp/override"));
        assert_eq!(resolved.console_backend, AdapterChoice::Null);
        assert!(resolved.response_timeout.is_none());
    }

    #[test]
    fn missing_config_file_path_is_not_an_error() {
        let cli = Cli {
            qmp_dir: None,
            console_backend: None,
            console_frontend: None,
            input_backend: None,
            config: None,
            debug: false,
            debug_evdev: false,
            debug_input: false,
            daemonize: false,
        };
        let resolved = ResolvedConfig::resolve(cli).unwrap();
        assert_eq!(resolved.qmp_dir, PathBuf::from(DEFAULT_QMP_DIR));
    }

    #[test]
    fn file_values_fill_in_when_cli_omits_them() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vmswitch.toml");
        std::fs::write(&path, "[vmswitch]\nqmp_dir = \"/srv/qips\"\nresponse_timeout_ms = 250\n").unwrap();

        let cli = Cli {
            qmp_dir: None,
            console_backend: None,
            console_frontend: None,
            input_backend: None,
            config: Some(path),
            debug: false,
            debug_evdev: false,
            debug_input: false,
            daemonize: false,
        };
        let resolved = ResolvedConfig::resolve(cli).unwrap();
        assert_eq!(resolved.qmp_dir, PathBuf::from("/srv/qips"));
        assert_eq!(resolved.response_timeout, Some(Duration::from_millis(250)));
    }
}
