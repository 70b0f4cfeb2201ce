//! Configuration consumed by the frontend core.
//!
//! The frontend does not own its configuration; the process bootstrap loads a
//! [`FrontendConfig`] (usually from TOML) and hands it over at construction.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::article::is_valid_newsgroup_name;
use crate::error::{Error, Result};

/// Limits, timeouts and allow-lists for the frontend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrontendConfig {
    /// Instance name used for generated Message-IDs and the Path header (default: "nntpchan")
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Newsgroups the frontend serves and accepts posts for (empty = any valid name)
    #[serde(default)]
    pub allowed_newsgroups: Vec<String>,

    /// Maximum subject length in characters (default: 256)
    #[serde(default = "default_max_subject_len")]
    pub max_subject_len: usize,

    /// Maximum body size in bytes (default: 64 KiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Maximum poster name length in characters (default: 64)
    #[serde(default = "default_max_name_len")]
    pub max_name_len: usize,

    /// Maximum attachment size in bytes (default: 5 MiB)
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: usize,

    /// Accepted attachment content types
    #[serde(default = "default_attachment_types")]
    pub allowed_attachment_types: Vec<String>,

    /// Age after which a cached newsgroup is refetched (default: 30s)
    #[serde(default = "default_staleness_window", with = "duration_serde")]
    pub staleness_window: Duration,

    /// Timeout applied to every article store call (default: 10s)
    #[serde(default = "default_call_timeout", with = "duration_serde")]
    pub call_timeout: Duration,

    /// Minimum age of a cached newsgroup before a request for an unknown
    /// thread root triggers a refetch (default: 2s, 0 = always refetch)
    #[serde(default = "default_refetch_min_age", with = "duration_serde")]
    pub refetch_min_age: Duration,

    /// Period of the background cache sweep started by `run()` (default: 60s)
    #[serde(default = "default_sweep_interval", with = "duration_serde")]
    pub sweep_interval: Duration,

    /// Buffered post events per subscriber before lagging (default: 64)
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            allowed_newsgroups: Vec::new(),
            max_subject_len: default_max_subject_len(),
            max_body_bytes: default_max_body_bytes(),
            max_name_len: default_max_name_len(),
            max_attachment_bytes: default_max_attachment_bytes(),
            allowed_attachment_types: default_attachment_types(),
            staleness_window: default_staleness_window(),
            call_timeout: default_call_timeout(),
            refetch_min_age: default_refetch_min_age(),
            sweep_interval: default_sweep_interval(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl FrontendConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: FrontendConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Reject settings the frontend cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.instance_name.is_empty()
            || !self
                .instance_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            return Err(Error::Config(format!(
                "instance_name {:?} must be a non-empty host-like name",
                self.instance_name
            )));
        }
        if let Some(bad) = self
            .allowed_newsgroups
            .iter()
            .find(|g| !is_valid_newsgroup_name(g))
        {
            return Err(Error::Config(format!("invalid newsgroup name {bad:?}")));
        }
        if self.max_body_bytes == 0 || self.max_subject_len == 0 || self.max_name_len == 0 {
            return Err(Error::Config("size limits must be non-zero".to_string()));
        }
        for (name, value) in [
            ("staleness_window", self.staleness_window),
            ("call_timeout", self.call_timeout),
            ("sweep_interval", self.sweep_interval),
        ] {
            if value.is_zero() {
                return Err(Error::Config(format!("{name} must be non-zero")));
            }
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Whether the frontend serves this newsgroup.
    pub fn allows_newsgroup(&self, name: &str) -> bool {
        if self.allowed_newsgroups.is_empty() {
            is_valid_newsgroup_name(name)
        } else {
            self.allowed_newsgroups.iter().any(|g| g == name)
        }
    }

    /// Whether an attachment content type is accepted.
    pub fn allows_attachment_type(&self, content_type: &str) -> bool {
        self.allowed_attachment_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(content_type))
    }
}

fn default_instance_name() -> String {
    "nntpchan".to_string()
}

fn default_max_subject_len() -> usize {
    256
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

fn default_max_name_len() -> usize {
    64
}

fn default_max_attachment_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_attachment_types() -> Vec<String> {
    ["image/jpeg", "image/png", "image/gif", "image/webp"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_staleness_window() -> Duration {
    Duration::from_secs(30)
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_refetch_min_age() -> Duration {
    Duration::from_secs(2)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_event_capacity() -> usize {
    64
}

// Durations are written as whole seconds
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FrontendConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.instance_name, "nntpchan");
        assert_eq!(config.staleness_window, Duration::from_secs(30));
        assert_eq!(config.refetch_min_age, Duration::from_secs(2));
        assert!(config.allows_attachment_type("IMAGE/PNG"));
        assert!(!config.allows_attachment_type("application/x-msdownload"));
    }

    #[test]
    fn test_from_toml_partial() {
        let config = FrontendConfig::from_toml_str(
            r#"
            instance_name = "chan.example"
            allowed_newsgroups = ["overchan.test", "overchan.random"]
            staleness_window = 5
            max_body_bytes = 2048
            "#,
        )
        .unwrap();

        assert_eq!(config.instance_name, "chan.example");
        assert_eq!(config.staleness_window, Duration::from_secs(5));
        assert_eq!(config.max_body_bytes, 2048);
        assert_eq!(config.call_timeout, Duration::from_secs(10));
        assert!(config.allows_newsgroup("overchan.test"));
        assert!(!config.allows_newsgroup("overchan.other"));
    }

    #[test]
    fn test_from_toml_rejects_zero_timeout() {
        let err = FrontendConfig::from_toml_str("call_timeout = 0").unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("call_timeout")));
    }

    #[test]
    fn test_from_toml_allows_zero_refetch_age() {
        let config = FrontendConfig::from_toml_str("refetch_min_age = 0").unwrap();
        assert!(config.refetch_min_age.is_zero());
    }

    #[test]
    fn test_from_toml_rejects_bad_group() {
        let err = FrontendConfig::from_toml_str(r#"allowed_newsgroups = ["Bad Group"]"#)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_toml_syntax_error() {
        assert!(matches!(
            FrontendConfig::from_toml_str("instance_name = "),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_empty_allow_list_accepts_valid_names() {
        let config = FrontendConfig::default();
        assert!(config.allows_newsgroup("overchan.test"));
        assert!(!config.allows_newsgroup("not a group"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frontend.toml");
        std::fs::write(&path, "instance_name = \"node1\"\n").unwrap();

        let config = FrontendConfig::load(&path).unwrap();
        assert_eq!(config.instance_name, "node1");

        let missing = FrontendConfig::load(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(Error::Config(_))));
    }
}
