use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Tuning for [`Commands`](crate::commands::Commands).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// How often a command reloads and retries after a concurrency conflict.
    pub max_push_retries: u32,
    /// Deadline for each storage call. `None` waits indefinitely.
    #[serde(with = "millis")]
    pub storage_timeout: Option<Duration>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        CommandsConfig {
            max_push_retries: 3,
            storage_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl CommandsConfig {
    /// Read overrides from `IDPSTORE_MAX_PUSH_RETRIES` and
    /// `IDPSTORE_STORAGE_TIMEOUT_MS`. A timeout of 0 disables the deadline.
    pub fn from_env() -> Result<Self> {
        let mut config = CommandsConfig::default();

        if let Ok(retries) = std::env::var("IDPSTORE_MAX_PUSH_RETRIES") {
            config.max_push_retries = retries
                .parse()
                .with_context(|| format!("invalid IDPSTORE_MAX_PUSH_RETRIES: {retries}"))?;
        }

        if let Ok(timeout) = std::env::var("IDPSTORE_STORAGE_TIMEOUT_MS") {
            let ms: u64 = timeout
                .parse()
                .with_context(|| format!("invalid IDPSTORE_STORAGE_TIMEOUT_MS: {timeout}"))?;
            config.storage_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }

        Ok(config)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let ms = Option::<u64>::deserialize(deserializer)?;
        Ok(ms.filter(|ms| *ms > 0).map(Duration::from_millis))
    }
}
