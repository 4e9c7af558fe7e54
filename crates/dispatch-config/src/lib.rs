//! Parsing and validation for the `[thread]` worker-pool configuration
//! section.
//!
//! Mirrors the manifest-parsing shape used elsewhere in this workspace:
//! deserialize with `serde` + `toml`, then run a second, explicit
//! validation pass rather than leaning on `serde`'s type system for
//! anything beyond field shape. Bounds are clamped where the design calls
//! for clamping and rejected where it calls for a fatal error.

use std::path::Path;
use std::str::FromStr;

use dispatch_common::PoolError;
use serde::Deserialize;

/// The heap comparator policy, fixed for the pool's lifetime once chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// Smaller `priority` first; ties broken by earlier arrival.
    Default,
    /// Earlier arrival timestamp only.
    Time,
    /// Higher `packet.rounds` first, then fall back to `Default`.
    Eap,
}

impl FromStr for Comparator {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "time" => Ok(Self::Time),
            "eap" => Ok(Self::Eap),
            other => Err(PoolError::Config(format!(
                "unknown queue_priority '{other}', expected one of default, time, eap"
            ))),
        }
    }
}

/// Raw, not-yet-validated configuration as deserialized from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    pub start_servers: usize,
    pub max_servers: usize,
    pub min_spare_servers: usize,
    pub max_spare_servers: usize,
    pub max_requests_per_server: usize,
    pub cleanup_delay: u64,
    pub max_queue_size: usize,
    pub queue_priority: String,
    pub auto_limit_acct: bool,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            start_servers: 5,
            max_servers: 32,
            min_spare_servers: 3,
            max_spare_servers: 10,
            max_requests_per_server: 0,
            cleanup_delay: 5,
            max_queue_size: 65536,
            queue_priority: "default".to_string(),
            auto_limit_acct: false,
        }
    }
}

const MIN_QUEUE_SIZE: usize = 2;
const MAX_QUEUE_SIZE: usize = 1_048_575;

/// A `ThreadConfig` that has passed validation: bounds clamped, the
/// comparator name resolved to a [`Comparator`].
#[derive(Debug, Clone)]
pub struct ValidatedThreadConfig {
    pub start_servers: usize,
    pub max_servers: usize,
    pub min_spare_servers: usize,
    pub max_spare_servers: usize,
    pub max_requests_per_server: usize,
    pub cleanup_delay: u64,
    pub max_queue_size: usize,
    pub queue_priority: Comparator,
    pub auto_limit_acct: bool,
}

impl ThreadConfig {
    /// Parse a TOML document containing a top-level `[thread]` table.
    /// A missing `[thread]` section is not an error -- every key falls
    /// back to its documented default.
    pub fn from_str(content: &str) -> Result<Self, PoolError> {
        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct Document {
            thread: ThreadConfig,
        }
        let doc: Document =
            toml::from_str(content).map_err(|e| PoolError::Config(e.to_string()))?;
        Ok(doc.thread)
    }

    pub fn from_file(path: &Path) -> Result<Self, PoolError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PoolError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_str(&content)
    }

    /// Validate and clamp bounds, resolving `queue_priority` to a
    /// [`Comparator`]. An invalid `queue_priority` is the one truly fatal
    /// configuration error; everything else is clamped into range.
    pub fn validate(self) -> Result<ValidatedThreadConfig, PoolError> {
        let queue_priority = Comparator::from_str(&self.queue_priority)?;

        let max_queue_size = self.max_queue_size.clamp(MIN_QUEUE_SIZE, MAX_QUEUE_SIZE);

        let max_spare_servers = if self.max_spare_servers < self.min_spare_servers {
            self.min_spare_servers
        } else {
            self.max_spare_servers
        };

        Ok(ValidatedThreadConfig {
            start_servers: self.start_servers,
            max_servers: self.max_servers,
            min_spare_servers: self.min_spare_servers,
            max_spare_servers,
            max_requests_per_server: self.max_requests_per_server,
            cleanup_delay: self.cleanup_delay,
            max_queue_size,
            queue_priority,
            auto_limit_acct: self.auto_limit_acct,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_table() {
        let cfg = ThreadConfig::from_str("").unwrap().validate().unwrap();
        assert_eq!(cfg.start_servers, 5);
        assert_eq!(cfg.max_servers, 32);
        assert_eq!(cfg.min_spare_servers, 3);
        assert_eq!(cfg.max_spare_servers, 10);
        assert_eq!(cfg.max_requests_per_server, 0);
        assert_eq!(cfg.cleanup_delay, 5);
        assert_eq!(cfg.max_queue_size, 65536);
        assert_eq!(cfg.queue_priority, Comparator::Default);
        assert!(!cfg.auto_limit_acct);
    }

    #[test]
    fn parses_overridden_values() {
        let toml = r#"
            [thread]
            start_servers = 10
            max_servers = 64
            queue_priority = "eap"
            auto_limit_acct = true
        "#;
        let cfg = ThreadConfig::from_str(toml).unwrap().validate().unwrap();
        assert_eq!(cfg.start_servers, 10);
        assert_eq!(cfg.max_servers, 64);
        assert_eq!(cfg.queue_priority, Comparator::Eap);
        assert!(cfg.auto_limit_acct);
    }

    #[test]
    fn invalid_queue_priority_is_fatal() {
        let toml = r#"
            [thread]
            queue_priority = "bogus"
        "#;
        let err = ThreadConfig::from_str(toml).unwrap().validate().unwrap_err();
        assert!(matches!(err, PoolError::Config(_)));
    }

    #[test]
    fn max_queue_size_is_clamped_not_rejected() {
        let toml = r#"
            [thread]
            max_queue_size = 1
        "#;
        let cfg = ThreadConfig::from_str(toml).unwrap().validate().unwrap();
        assert_eq!(cfg.max_queue_size, MIN_QUEUE_SIZE);

        let toml = r#"
            [thread]
            max_queue_size = 99999999
        "#;
        let cfg = ThreadConfig::from_str(toml).unwrap().validate().unwrap();
        assert_eq!(cfg.max_queue_size, MAX_QUEUE_SIZE);
    }

    #[test]
    fn max_spare_below_min_spare_is_raised_to_match() {
        let toml = r#"
            [thread]
            min_spare_servers = 20
            max_spare_servers = 5
        "#;
        let cfg = ThreadConfig::from_str(toml).unwrap().validate().unwrap();
        assert_eq!(cfg.max_spare_servers, 20);
    }

    #[test]
    fn from_file_reads_and_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dispatchd.toml");
        std::fs::write(&path, "[thread]\nstart_servers = 7\n").unwrap();
        let cfg = ThreadConfig::from_file(&path).unwrap().validate().unwrap();
        assert_eq!(cfg.start_servers, 7);
    }
}
