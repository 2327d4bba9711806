//! Output configuration: command-line flags and an optional TOML file.
//!
//! Flags follow the usual long/short pairs and, like `getopt_long_only`,
//! long names are also accepted with a single dash (`-address`). Values may
//! be given as the next argument or inline (`--port=4000`).
//!
//! ```toml
//! address = "receiver.local"
//! port = 40405
//! window = 10
//! timeout_s = 30
//! input = 0
//! family = "ipv4"
//! ```

use std::fmt;
use std::io;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

use framelink_transport::wire::{DEFAULT_ACK_TIMEOUT, DEFAULT_PORT, DEFAULT_WINDOW};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

pub const CONFIG_VERSION: u32 = 1;

pub const HELP: &str = "\
 ---------------------------------------------------------------
 framelink output
 ---------------------------------------------------------------
 The following parameters are accepted:
 [-h | --help ]........: show help and exit
 [-a | --address ].....: IP/DNS address of recipient
 [-p | --port ]........: TCP port of recipient (default 40405)
 [-w | --window ]......: maximum number of frames to be sent without ACK
 [-t | --timeout ].....: maximum amount of seconds to wait for ACK
 [-i | --input ].......: read frames from the specified input
                         (first input is the 0th)
 [-c | --config ]......: TOML file with defaults for the options above
 ---------------------------------------------------------------";

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("help requested")]
    HelpRequested,
    #[error("unrecognized option '{0}'")]
    UnknownOption(String),
    #[error("option '{0}' requires a value")]
    MissingValue(String),
    #[error("invalid value '{value}' for --{option}: {reason}")]
    InvalidValue {
        option: &'static str,
        value: String,
        reason: String,
    },
    #[error("missing recipient's address")]
    MissingAddress,
    #[error("input {index} is out of range: only {available} inputs loaded")]
    InputOutOfRange { index: usize, available: usize },
    #[error("unsupported config version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid config TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

// ── Address Family ──────────────────────────────────────────────────

/// Network family the receiver's address must resolve to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    #[default]
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub fn matches(self, addr: &std::net::SocketAddr) -> bool {
        match self {
            AddressFamily::Ipv4 => addr.is_ipv4(),
            AddressFamily::Ipv6 => addr.is_ipv6(),
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => f.write_str("IPv4"),
            AddressFamily::Ipv6 => f.write_str("IPv6"),
        }
    }
}

// ── Config ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    /// Hostname or literal address of the receiver.
    pub address: Option<String>,
    pub port: u16,
    /// Maximum frames in flight without acknowledgment.
    pub window: NonZeroU32,
    /// Accepted and reported, but the ack wait is not bounded by it.
    pub ack_timeout: Duration,
    /// Index of the frame source to read from.
    pub input: usize,
    pub family: AddressFamily,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            address: None,
            port: DEFAULT_PORT,
            window: NonZeroU32::new(DEFAULT_WINDOW).unwrap_or(NonZeroU32::MIN),
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            input: 0,
            family: AddressFamily::default(),
        }
    }
}

/// Where and how to connect, once the configuration has been validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub family: AddressFamily,
}

impl OutputConfig {
    /// A config pointing at `address` with every other option defaulted.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Self::default()
        }
    }

    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        let parsed: OutputConfigInput = toml::from_str(input)?;
        parsed.resolve()
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses command-line options (program name excluded).
    ///
    /// A `--config` file, wherever it appears, provides the base values;
    /// the remaining flags override it.
    pub fn from_args<I, S>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let opts = parse_options(args.into_iter().map(Into::into))?;

        let mut config = match opts.iter().rev().find(|(opt, _)| *opt == Opt::Config) {
            Some((_, path)) => Self::from_toml_file(Path::new(path))?,
            None => Self::default(),
        };
        for (opt, value) in opts {
            config.apply(opt, value)?;
        }
        Ok(config)
    }

    fn apply(&mut self, opt: Opt, value: String) -> Result<(), ConfigError> {
        match opt {
            Opt::Help => return Err(ConfigError::HelpRequested),
            Opt::Config => {}
            Opt::Address => self.address = Some(value),
            Opt::Port => self.port = parse_value("port", &value)?,
            Opt::Window => {
                let window: u32 = parse_value("window", &value)?;
                self.window = NonZeroU32::new(window).ok_or_else(|| ConfigError::InvalidValue {
                    option: "window",
                    value,
                    reason: "must be at least 1".into(),
                })?;
            }
            Opt::Timeout => self.ack_timeout = Duration::from_secs(parse_value("timeout", &value)?),
            Opt::Input => self.input = parse_value("input", &value)?,
        }
        Ok(())
    }

    /// Checks the options against the number of available frame sources and
    /// returns the connection target.
    pub fn validate(&self, sources: usize) -> Result<Target, ConfigError> {
        if self.input >= sources {
            return Err(ConfigError::InputOutOfRange {
                index: self.input,
                available: sources,
            });
        }
        let host = self
            .address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or(ConfigError::MissingAddress)?;
        Ok(Target {
            host: host.to_string(),
            port: self.port,
            family: self.family,
        })
    }

    /// Logs the effective settings.
    pub fn log_summary(&self, input_name: &str) {
        info!(
            input = self.input,
            input_name,
            address = self.address.as_deref().unwrap_or("-"),
            port = self.port,
            window = self.window.get(),
            timeout_s = self.ack_timeout.as_secs(),
            family = %self.family,
            "output configured"
        );
    }
}

// ── TOML Input ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfigInput {
    pub version: u32,
    pub address: Option<String>,
    pub port: Option<u16>,
    pub window: Option<u32>,
    pub timeout_s: Option<u64>,
    pub input: Option<usize>,
    pub family: Option<AddressFamily>,
}

impl OutputConfigInput {
    pub fn resolve(self) -> Result<OutputConfig, ConfigError> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(version));
        }

        let defaults = OutputConfig::default();
        let window = match self.window {
            Some(w) => NonZeroU32::new(w).ok_or_else(|| ConfigError::InvalidValue {
                option: "window",
                value: w.to_string(),
                reason: "must be at least 1".into(),
            })?,
            None => defaults.window,
        };
        let address = self.address.and_then(|a| {
            let trimmed = a.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        });

        Ok(OutputConfig {
            address,
            port: self.port.unwrap_or(defaults.port),
            window,
            ack_timeout: self
                .timeout_s
                .map(Duration::from_secs)
                .unwrap_or(defaults.ack_timeout),
            input: self.input.unwrap_or(defaults.input),
            family: self.family.unwrap_or(defaults.family),
        })
    }
}

// ── CLI Parsing ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opt {
    Help,
    Address,
    Port,
    Window,
    Timeout,
    Input,
    Config,
}

impl Opt {
    fn lookup(name: &str) -> Option<Opt> {
        Some(match name {
            "h" | "help" => Opt::Help,
            "a" | "address" => Opt::Address,
            "p" | "port" => Opt::Port,
            "w" | "window" => Opt::Window,
            "t" | "timeout" => Opt::Timeout,
            "i" | "input" => Opt::Input,
            "c" | "config" => Opt::Config,
            _ => return None,
        })
    }

    fn takes_value(self) -> bool {
        self != Opt::Help
    }
}

fn parse_options(args: impl Iterator<Item = String>) -> Result<Vec<(Opt, String)>, ConfigError> {
    let mut args = args.peekable();
    let mut out = Vec::new();

    while let Some(arg) = args.next() {
        let name = arg
            .strip_prefix("--")
            .or_else(|| arg.strip_prefix('-'))
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ConfigError::UnknownOption(arg.clone()))?;
        let (name, inline) = match name.split_once('=') {
            Some((n, v)) => (n, Some(v.to_string())),
            None => (name, None),
        };
        let opt = Opt::lookup(name).ok_or_else(|| ConfigError::UnknownOption(arg.clone()))?;

        let value = match (opt.takes_value(), inline) {
            (false, None) => String::new(),
            (false, Some(_)) => return Err(ConfigError::UnknownOption(arg)),
            (true, Some(v)) => v,
            (true, None) => args
                .next()
                .ok_or_else(|| ConfigError::MissingValue(arg.clone()))?,
        };
        out.push((opt, value));
    }
    Ok(out)
}

fn parse_value<T>(option: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            option,
            value: value.to_string(),
            reason: e.to_string(),
        })
}
