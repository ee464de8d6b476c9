//! Handles settings for the application. Configuration is read from an
//! optional `settings.toml`, then from `OPENSPLIT__SECTION__KEY` environment
//! variables. `MONGODB_URI` still overrides the database URI.
use std::time::Duration;

use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use crate::store::Timeouts;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Server {
    pub bind: String,
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Server {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Mongodb,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Database {
    pub backend: Backend,
    pub uri: String,
    pub name: String,
}

impl Default for Database {
    fn default() -> Self {
        Database {
            backend: Backend::Mongodb,
            uri: "mongodb://localhost:27017".to_string(),
            name: "expenses_db".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub lookup_secs: u64,
    pub write_secs: u64,
    pub scan_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        TimeoutSettings {
            lookup_secs: 5,
            write_secs: 10,
            scan_secs: 30,
        }
    }
}

impl TimeoutSettings {
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            lookup: Duration::from_secs(self.lookup_secs),
            write: Duration::from_secs(self.write_secs),
            scan: Duration::from_secs(self.scan_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Log {
    pub level: String,
}

impl Default for Log {
    fn default() -> Self {
        Log {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: Server,
    pub database: Database,
    pub timeouts: TimeoutSettings,
    pub log: Log,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("settings").required(false))
            .add_source(
                Environment::with_prefix("OPENSPLIT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database.uri", std::env::var("MONGODB_URI").ok())?;
        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use config::FileFormat;

    use super::*;

    #[test]
    fn empty_configuration_uses_defaults() {
        let settings = Settings::build(Config::builder()).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.database.backend, Backend::Mongodb);
        assert_eq!(settings.timeouts.timeouts(), Timeouts::default());
    }

    #[test]
    fn reads_toml_sections() {
        let toml = r#"
            [server]
            port = 9090

            [database]
            backend = "memory"

            [timeouts]
            scan_secs = 60
        "#;
        let settings =
            Settings::build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
                .unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.bind, "0.0.0.0");
        assert_eq!(settings.database.backend, Backend::Memory);
        assert_eq!(settings.database.name, "expenses_db");
        assert_eq!(settings.timeouts.scan_secs, 60);
        assert_eq!(settings.timeouts.lookup_secs, 5);
    }
}
