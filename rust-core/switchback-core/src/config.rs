//! # Engine Configuration
//!
//! Run mode and dispatch options, passed explicitly into the engine at
//! construction time. Nothing here is process-wide, so tests can build
//! engines with different configurations side by side.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Environment variable holding the run mode
pub const MODE_ENV: &str = "SWITCHBACK_MODE";

/// Environment variable holding the group prefix matching strategy
pub const PREFIX_MATCH_ENV: &str = "SWITCHBACK_PREFIX_MATCH";

/// Engine run mode
///
/// Debug mode turns on registration and dispatch diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Verbose diagnostics (default)
    #[default]
    Debug,
    /// Production
    Release,
    /// Test runs
    Test,
}

impl Mode {
    /// Whether debug diagnostics are enabled
    #[must_use]
    pub const fn is_debug(self) -> bool {
        matches!(self, Self::Debug)
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "debug" => Ok(Self::Debug),
            "release" => Ok(Self::Release),
            "test" => Ok(Self::Test),
            other => Err(Error::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Release => write!(f, "release"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// How a group prefix is tested against a request path
///
/// `String` is a plain string prefix test: group `/v1` also applies to
/// `/v1x` and `/v12/items`. `Segment` requires the prefix to end on a path
/// segment boundary and is a behavior change from `String`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefixMatch {
    /// Plain string prefix (default)
    #[default]
    String,
    /// Segment-aware prefix
    Segment,
}

impl PrefixMatch {
    /// Test whether `prefix` applies to `path`
    #[must_use]
    pub fn matches(self, prefix: &str, path: &str) -> bool {
        if !path.starts_with(prefix) {
            return false;
        }
        match self {
            Self::String => true,
            Self::Segment => {
                prefix.is_empty()
                    || prefix.ends_with('/')
                    || path.len() == prefix.len()
                    || path.as_bytes()[prefix.len()] == b'/'
            }
        }
    }
}

impl FromStr for PrefixMatch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "string" => Ok(Self::String),
            "segment" => Ok(Self::Segment),
            other => Err(Error::InvalidMode(other.to_string())),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run mode
    pub mode: Mode,
    /// Group prefix matching strategy used at dispatch
    pub prefix_match: PrefixMatch,
}

impl Config {
    /// Create a configuration with the given mode and default options
    #[must_use]
    pub fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` on malformed input or unknown values.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Read the configuration from `SWITCHBACK_MODE` and
    /// `SWITCHBACK_PREFIX_MATCH`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMode` when a variable holds an unknown value.
    pub fn from_env() -> Result<Self> {
        let mode = std::env::var(MODE_ENV).unwrap_or_default().parse()?;
        let prefix_match = std::env::var(PREFIX_MATCH_ENV)
            .unwrap_or_default()
            .parse()?;
        Ok(Self { mode, prefix_match })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!("".parse::<Mode>().unwrap(), Mode::Debug);
        assert_eq!("release".parse::<Mode>().unwrap(), Mode::Release);
        assert_eq!("test".parse::<Mode>().unwrap(), Mode::Test);
        assert!(matches!(
            "verbose".parse::<Mode>(),
            Err(Error::InvalidMode(m)) if m == "verbose"
        ));
    }

    #[test]
    fn test_mode_display_round_trip() {
        assert_eq!(Mode::Release.to_string(), "release");
        assert!(Mode::Debug.is_debug());
        assert!(!Mode::Test.is_debug());
    }

    #[test]
    fn test_string_prefix_quirk() {
        let m = PrefixMatch::String;
        assert!(m.matches("/v1", "/v1/items"));
        assert!(m.matches("/v1", "/v1x"));
        assert!(m.matches("/v1", "/v12/x"));
        assert!(!m.matches("/v2", "/v1"));
    }

    #[test]
    fn test_segment_prefix() {
        let m = PrefixMatch::Segment;
        assert!(m.matches("", "/anything"));
        assert!(m.matches("/v1", "/v1"));
        assert!(m.matches("/v1", "/v1/items"));
        assert!(m.matches("/v1/", "/v1/items"));
        assert!(!m.matches("/v1", "/v1x"));
        assert!(!m.matches("/v1", "/v12/x"));
    }

    #[test]
    fn test_config_from_json() {
        let config = Config::from_json(r#"{"mode": "release"}"#).unwrap();
        assert_eq!(config.mode, Mode::Release);
        assert_eq!(config.prefix_match, PrefixMatch::String);

        let config = Config::from_json(r#"{"prefix_match": "segment"}"#).unwrap();
        assert_eq!(config.mode, Mode::Debug);
        assert_eq!(config.prefix_match, PrefixMatch::Segment);

        assert!(Config::from_json(r#"{"mode": "loud"}"#).is_err());
    }
}
