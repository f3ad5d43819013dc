//! Client configuration, driver specifications and the driver registry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{DbmiError, DbmiResult};
use crate::proto::CodecLimits;

// ============================================================================
// Client Configuration
// ============================================================================

/// Timeouts and decoding bounds applied to every handle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Per-call deadline in milliseconds (none by default)
    pub call_timeout_ms: Option<u64>,
    /// Bound on the shutdown notification sent by `close()`
    pub shutdown_timeout_ms: u64,
    /// How long `close()` waits for the driver to exit before killing it
    pub reap_grace_ms: u64,
    pub limits: CodecLimits,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: None,
            shutdown_timeout_ms: 2000,
            reap_grace_ms: 500,
            limits: CodecLimits::default(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> DbmiResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| DbmiError::Config(format!("Invalid client configuration: {}", e)))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> DbmiResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| DbmiError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| DbmiError::Config(format!("Invalid client configuration in {}: {}", path.display(), e)))
    }

    /// Set the per-call deadline.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn reap_grace(mut self, grace: Duration) -> Self {
        self.reap_grace_ms = grace.as_millis() as u64;
        self
    }

    pub fn limits(mut self, limits: CodecLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn call_timeout_duration(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    pub fn shutdown_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn reap_grace_duration(&self) -> Duration {
        Duration::from_millis(self.reap_grace_ms)
    }
}

// ============================================================================
// Driver Specification
// ============================================================================

/// How to launch one driver executable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DriverSpec {
    pub name: String,
    pub command: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl DriverSpec {
    pub fn new(name: &str, command: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
            comment: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Sent to the driver in the open-database handshake.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ConnectionParams {
    pub database: String,
    #[serde(default)]
    pub schema: Option<String>,
}

impl ConnectionParams {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            schema: None,
        }
    }

    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.to_string());
        self
    }
}

// ============================================================================
// Driver Registry
// ============================================================================

/// The set of installed drivers, by name.
///
/// The text form has one driver per line, `name:command[:comment]`; blank
/// lines and lines starting with `#` are skipped. Relative commands resolve
/// against the directory given to [`DriverRegistry::parse_dbmscap`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverRegistry {
    drivers: Vec<DriverSpec>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_dbmscap(text: &str, driver_dir: Option<&Path>) -> DbmiResult<Self> {
        let mut registry = Self::new();

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.splitn(3, ':');
            let name = fields.next().unwrap_or_default().trim();
            let command = fields.next().map(str::trim).unwrap_or_default();
            let comment = fields
                .next()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string);

            if name.is_empty() || command.is_empty() {
                return Err(DbmiError::Config(format!(
                    "dbmscap line {}: expected 'name:command[:comment]', got '{}'",
                    lineno + 1,
                    line
                )));
            }

            let command = match driver_dir {
                Some(dir) if Path::new(command).is_relative() => dir.join(command),
                _ => PathBuf::from(command),
            };

            let mut spec = DriverSpec::new(name, command);
            spec.comment = comment;
            registry.register(spec)?;
        }

        Ok(registry)
    }

    pub fn load_dbmscap(path: impl AsRef<Path>) -> DbmiResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::parse_dbmscap(&text, path.parent())
    }

    /// Parse a JSON array of driver specifications.
    pub fn from_json_str(json: &str) -> DbmiResult<Self> {
        let specs: Vec<DriverSpec> = serde_json::from_str(json)
            .map_err(|e| DbmiError::Config(format!("Invalid driver registry: {}", e)))?;
        let mut registry = Self::new();
        for spec in specs {
            registry.register(spec)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, spec: DriverSpec) -> DbmiResult<()> {
        if self.find(&spec.name).is_some() {
            return Err(DbmiError::Config(format!(
                "Driver '{}' is registered twice",
                spec.name
            )));
        }
        self.drivers.push(spec);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&DriverSpec> {
        self.drivers.iter().find(|d| d.name == name)
    }

    pub fn get(&self, name: &str) -> DbmiResult<&DriverSpec> {
        self.find(name)
            .ok_or_else(|| DbmiError::Config(format!("Unknown driver '{}'", name)))
    }

    pub fn drivers(&self) -> &[DriverSpec] {
        &self.drivers
    }
}
