use std::path::{Path, PathBuf};
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use serde_derive::{Serialize, Deserialize};
use simplelog::LevelFilter;

use crate::constants::{DEFAULT_MAX_DATAGRAM_SIZE, DEFAULT_PORT};
use crate::error::ConfigError;
use crate::run_id::RunId;

/// Which storage backend the receiver hands its generations to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Null,
    Text,
    Hdf5,
    Network
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub address: String,
    pub port: u16,
    pub max_datagram_size: usize,
    pub backend: Backend,
    pub output_path: PathBuf,
    pub basename: String,
    pub sort: bool,
    pub forward_address: String,
    pub receive_timeout_ms: u64,
    pub log_level: String
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: String::from("0.0.0.0"),
            port: DEFAULT_PORT,
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
            backend: Backend::Null,
            output_path: PathBuf::from("."),
            basename: String::from("run_"),
            sort: false,
            forward_address: format!("127.0.0.1:{}", DEFAULT_PORT + 1),
            receive_timeout_ms: 500,
            log_level: String::from("info")
        }
    }
}

impl Config {

    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    pub fn get_listen_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn get_forward_address(&self) -> Result<SocketAddr, ConfigError> {
        match self.forward_address.to_socket_addrs()?.next() {
            Some(addr) => Ok(addr),
            None => Err(ConfigError::BadAddress(self.forward_address.clone()))
        }
    }

    /// Output file for a run, <output_path>/<basename><run id>.<extension>
    pub fn get_output_file(&self, run_id: &RunId, extension: &str) -> PathBuf {
        get_output_file(&self.output_path, &self.basename, run_id, extension)
    }

    pub fn get_log_level(&self) -> LevelFilter {
        LevelFilter::from_str(&self.log_level).unwrap_or(LevelFilter::Info)
    }
}

pub fn get_output_file(directory: &Path, basename: &str, run_id: &RunId, extension: &str) -> PathBuf {
    directory.join(format!("{}{}.{}", basename, run_id, extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_fields_take_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port: 4000\nbackend: hdf5\nsort: true").unwrap();
        let config = Config::read_config_file(file.path()).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.backend, Backend::Hdf5);
        assert!(config.sort);
        assert_eq!(config.address, "0.0.0.0");
        assert_eq!(config.max_datagram_size, DEFAULT_MAX_DATAGRAM_SIZE);
        assert_eq!(config.get_listen_address(), "0.0.0.0:4000");
    }

    #[test]
    fn bad_path_is_reported() {
        let result = Config::read_config_file(Path::new("/definitely/not/here.yml"));
        assert!(matches!(result, Err(ConfigError::BadFilePath(_))));
    }

    #[test]
    fn output_file_naming() {
        let config = Config { output_path: PathBuf::from("/data"), basename: String::from("qdc_"), ..Default::default() };
        let path = config.get_output_file(&RunId(0x1f), "h5");
        assert_eq!(path, PathBuf::from("/data/qdc_000000000000001f.h5"));
        assert_eq!(config.get_log_level(), LevelFilter::Info);
    }
}
