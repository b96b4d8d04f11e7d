//! Runtime configuration
//!
//! Loaded from a TOML file by the `smu-measure` binary. Every section and key is optional and falls back
//! to the values the bench this driver was written for is wired with:
//!
//! ```toml
//! [connection]
//! kind = "serial"
//! path = "/dev/ttyUSB0"
//! baud_rate = 9600
//! line_ending = "\r\n"
//!
//! [channels]
//! force = 3
//! common = 4
//! assignments = [[6, 2], [7, 3], [8, 4], [9, 5]]
//!
//! [limits]
//! switching_compliance = 1e-3
//! forming_compliance = 5e-6
//! ```

use std::path::{ Path, PathBuf };
use serde::{ Deserialize, Serialize };
use crate::{
    session::LineEnding,
    spec::ChannelConfig,
    units::Ampere,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError
{
    #[error("Failed to read config file {path:?}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("Failed to parse config file {path:?}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("Unsupported line ending {0:?}, expected \"\\n\" or \"\\r\\n\"")]
    LineEnding(String),
}

/// How the instrument bus is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind
{
    /// A local serial line or USB-serial GPIB adapter
    Serial,
    /// A LAN/GPIB bridge exposing a raw TCP socket
    Tcp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig
{
    pub kind: ConnectionKind,
    /// Serial device path
    pub path: String,
    pub baud_rate: u32,
    /// `host:port` of a TCP bridge
    pub address: String,
    /// Terminator appended to every command
    pub line_ending: String,
}

impl Default for ConnectionConfig
{
    fn default() -> Self
    {
        Self {
            kind: ConnectionKind::Serial,
            path: String::from("/dev/ttyUSB0"),
            baud_rate: 9600,
            address: String::from("127.0.0.1:1234"),
            line_ending: String::from("\r\n"),
        }
    }
}

impl ConnectionConfig
{
    pub fn line_ending(&self) -> Result<LineEnding, ConfigError>
    {
        match self.line_ending.as_str() {
            "\n" => Ok(LineEnding::Lf),
            "\r\n" => Ok(LineEnding::CrLf),
            other => Err(ConfigError::LineEnding(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig
{
    pub force: u8,
    pub common: u8,
    /// `[channel, slot]` pairs mapped once after connecting
    pub assignments: Vec<(u8, u8)>,
}

impl Default for ChannelsConfig
{
    fn default() -> Self
    {
        Self {
            force: 3,
            common: 4,
            assignments: Vec::new(),
        }
    }
}

/// Current compliance limits in amps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig
{
    /// Used for sweeps and non-destructive sampling
    pub switching_compliance: f64,
    /// Used for forming, which must stay far below the switching current
    pub forming_compliance: f64,
}

impl Default for LimitsConfig
{
    fn default() -> Self
    {
        Self {
            switching_compliance: 1e-3,
            forming_compliance: 5e-6,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmuConfig
{
    pub connection: ConnectionConfig,
    pub channels: ChannelsConfig,
    pub limits: LimitsConfig,
}

impl SmuConfig
{
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError>
    {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.to_path_buf(),
            source: err,
        })?;

        Self::from_toml(&content).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            source: err,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error>
    {
        toml::from_str(content)
    }

    /// Channel pair at the switching compliance
    pub fn switching_channels(&self) -> ChannelConfig
    {
        ChannelConfig::new(
            self.channels.force,
            self.channels.common,
            Ampere::from_f64_base(self.limits.switching_compliance),
        )
    }

    /// Channel pair at the forming compliance
    pub fn forming_channels(&self) -> ChannelConfig
    {
        ChannelConfig::new(
            self.channels.force,
            self.channels.common,
            Ampere::from_f64_base(self.limits.forming_compliance),
        )
    }
}

#[cfg(test)]
mod tests
{
    use super::{ SmuConfig, ConnectionKind, ConfigError };
    use crate::session::LineEnding;

    #[test]
    fn empty_file_is_default()
    {
        let config = SmuConfig::from_toml("").unwrap();
        assert_eq!(config, SmuConfig::default());
        assert_eq!(config.connection.line_ending().unwrap(), LineEnding::CrLf);
        assert_eq!(config.switching_channels().force, 3);
    }

    #[test]
    fn partial_sections()
    {
        let config = SmuConfig::from_toml(r#"
            [connection]
            kind = "tcp"
            address = "10.0.0.7:5025"
            line_ending = "\n"

            [channels]
            assignments = [[6, 2], [7, 3]]

            [limits]
            forming_compliance = 1e-6
        "#).unwrap();

        assert_eq!(config.connection.kind, ConnectionKind::Tcp);
        assert_eq!(config.connection.baud_rate, 9600);
        assert_eq!(config.connection.line_ending().unwrap(), LineEnding::Lf);
        assert_eq!(config.channels.assignments, vec![(6, 2), (7, 3)]);
        assert_eq!(config.channels.common, 4);
        assert_eq!(config.forming_channels().compliance.as_f64_base(), 1e-6);
        assert_eq!(config.limits.switching_compliance, 1e-3);
    }

    #[test]
    fn bad_line_ending()
    {
        let config = SmuConfig::from_toml("[connection]\nline_ending = \"\\r\"").unwrap();
        assert!(matches!(config.connection.line_ending(), Err(ConfigError::LineEnding(_))));
    }

    #[test]
    fn missing_file()
    {
        assert!(matches!(SmuConfig::load("/nonexistent/smu.toml"), Err(ConfigError::Read { .. })));
    }
}
