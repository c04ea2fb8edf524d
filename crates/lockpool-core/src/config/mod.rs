//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Most lock slots a pool may be configured with
pub const MAX_LOCK_COUNT: usize = 65_536;

/// Largest event channel buffer a pool may be configured with
pub const MAX_EVENT_CAPACITY: usize = 1 << 20;

/// lockpool configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pool: PoolConfig,
    pub philosophers: PhilosophersConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of lock slots in the pool
    pub lock_count: usize,
    /// Buffer size of the lock event channel
    pub event_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhilosophersConfig {
    /// Philosophers at the table, one chopstick each
    pub seats: usize,
    /// Meals each philosopher eats before leaving
    pub rounds: usize,
    pub max_think_ms: u64,
    pub max_eat_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            lock_count: 5,
            event_capacity: 256,
        }
    }
}

impl Default for PhilosophersConfig {
    fn default() -> Self {
        Self {
            seats: 6,
            rounds: 3,
            max_think_ms: 20,
            max_eat_ms: 20,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=MAX_LOCK_COUNT).contains(&self.lock_count) {
            return Err(anyhow!("pool.lock_count must be between 1 and {}", MAX_LOCK_COUNT));
        }
        if !(1..=MAX_EVENT_CAPACITY).contains(&self.event_capacity) {
            return Err(anyhow!("pool.event_capacity must be between 1 and {}", MAX_EVENT_CAPACITY));
        }
        Ok(())
    }
}

impl PhilosophersConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(2..=MAX_LOCK_COUNT).contains(&self.seats) {
            return Err(anyhow!("philosophers.seats must be between 2 and {}", MAX_LOCK_COUNT));
        }
        if self.max_think_ms == 0 || self.max_eat_ms == 0 {
            return Err(anyhow!("philosophers think and eat times must be positive"));
        }
        Ok(())
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("LOCKPOOL_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("lockpool")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or fall back to defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config = Self::from_toml(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.pool.validate()?;
        self.philosophers.validate()
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "pool.lock_count" => Ok(self.pool.lock_count.to_string()),
            "pool.event_capacity" => Ok(self.pool.event_capacity.to_string()),
            "philosophers.seats" => Ok(self.philosophers.seats.to_string()),
            "philosophers.rounds" => Ok(self.philosophers.rounds.to_string()),
            "philosophers.max_think_ms" => Ok(self.philosophers.max_think_ms.to_string()),
            "philosophers.max_eat_ms" => Ok(self.philosophers.max_eat_ms.to_string()),
            _ => Err(anyhow!("Unknown configuration key: {}. Use `lockpool config list` to see available keys.", key)),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "pool.lock_count" => {
                self.pool.lock_count = value.parse()
                    .with_context(|| format!("Invalid lock_count value: {}", value))?;
            }
            "pool.event_capacity" => {
                self.pool.event_capacity = value.parse()
                    .with_context(|| format!("Invalid event_capacity value: {}", value))?;
            }
            "philosophers.seats" => {
                self.philosophers.seats = value.parse()
                    .with_context(|| format!("Invalid seats value: {}", value))?;
            }
            "philosophers.rounds" => {
                self.philosophers.rounds = value.parse()
                    .with_context(|| format!("Invalid rounds value: {}", value))?;
            }
            "philosophers.max_think_ms" => {
                self.philosophers.max_think_ms = value.parse()
                    .with_context(|| format!("Invalid max_think_ms value: {}", value))?;
            }
            "philosophers.max_eat_ms" => {
                self.philosophers.max_eat_ms = value.parse()
                    .with_context(|| format!("Invalid max_eat_ms value: {}", value))?;
            }
            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `lockpool config list` to see available keys.",
                    key
                ));
            }
        }
        self.validate()
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = vec![
            "pool.lock_count",
            "pool.event_capacity",
            "philosophers.seats",
            "philosophers.rounds",
            "philosophers.max_think_ms",
            "philosophers.max_eat_ms",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}
