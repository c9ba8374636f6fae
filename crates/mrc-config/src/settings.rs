use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Typed view over the merged configuration. Every field has a default, so
/// an empty config is a valid dry-run config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub run: RunSettings,
    #[serde(default = "FeedLayout::primary")]
    pub primary: FeedLayout,
    #[serde(default = "FeedLayout::secondary")]
    pub secondary: FeedLayout,
    pub reconcile: ReconcileSettings,
    pub delivery: DeliverySettings,
    pub queue: QueueSettings,
    pub dry_run: DryRunSettings,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            run: RunSettings::default(),
            primary: FeedLayout::primary(),
            secondary: FeedLayout::secondary(),
            reconcile: ReconcileSettings::default(),
            delivery: DeliverySettings::default(),
            queue: QueueSettings::default(),
            dry_run: DryRunSettings::default(),
        }
    }
}

impl SyncSettings {
    pub fn from_json(config_json: &Value) -> Result<Self> {
        let settings: SyncSettings =
            serde_json::from_value(config_json.clone()).context("invalid settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        for layout in [&self.primary, &self.secondary] {
            if layout.columns.is_empty() {
                bail!("CONFIG_INVALID: {} layout has no columns", layout.name);
            }
            if let Some(f) = layout
                .base64_fields
                .iter()
                .find(|f| !layout.columns.contains(f))
            {
                bail!(
                    "CONFIG_INVALID: {} base64 field '{}' is not a column",
                    layout.name,
                    f
                );
            }
        }
        if !(0.0..=1.0).contains(&self.dry_run.failure_rate) {
            bail!(
                "CONFIG_INVALID: dry_run.failure_rate must be within [0, 1], got {}",
                self.dry_run.failure_rate
            );
        }
        if self.run.read_ahead == 0 {
            bail!("CONFIG_INVALID: run.read_ahead must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Progress signal every N read units; 0 disables it.
    pub progress_interval: u64,
    pub read_ahead: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            progress_interval: 10_000,
            read_ahead: 1_024,
        }
    }
}

/// Column layout of one input feed. `columns[0]` is the key column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedLayout {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub base64_fields: Vec<String>,
    #[serde(default = "default_separator")]
    pub separator: char,
}

fn default_separator() -> char {
    ','
}

impl FeedLayout {
    pub fn primary() -> Self {
        Self {
            name: "primary".to_string(),
            columns: ["uid", "email", "locale", "createDate"]
                .map(String::from)
                .to_vec(),
            base64_fields: vec!["email".to_string(), "locale".to_string()],
            separator: default_separator(),
        }
    }

    pub fn secondary() -> Self {
        Self {
            name: "secondary".to_string(),
            columns: vec!["uid".to_string(), "email".to_string()],
            base64_fields: Vec::new(),
            separator: default_separator(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
    /// Field compared (case-insensitively) to tell UPDATE from IGNORE.
    pub identity_field: String,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            identity_field: "email".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    pub max_batch_size: usize,
    pub max_in_flight: usize,
    /// Fields holding epoch milliseconds, converted to seconds on the wire.
    pub epoch_ms_fields: Vec<String>,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            max_in_flight: 4,
            epoch_ms_fields: vec!["createDate".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub url: Option<String>,
    /// SQS-compatible endpoint that signs requests itself (queue emulator or
    /// signing proxy). Live delivery requires one.
    pub endpoint: Option<String>,
    /// NAME of the env var holding a bearer token.
    pub auth_token_env: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DryRunSettings {
    pub failure_rate: f64,
    pub seed: Option<u64>,
}
