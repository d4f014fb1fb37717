use chrome_trace_format::LoadOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub load: LoadConfig,

    #[serde(default)]
    pub layout: LayoutConfig,

    #[serde(default)]
    pub selection: SelectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_long_task_threshold_ms")]
    pub long_task_threshold_ms: f64,
    #[serde(default = "default_long_interaction_threshold_ms")]
    pub long_interaction_threshold_ms: f64,
    #[serde(default = "default_show_frames")]
    pub show_frames: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_chunk_size() -> usize {
    1 << 20
}

fn default_batch_size() -> usize {
    50_000
}

fn default_long_task_threshold_ms() -> f64 {
    50.0
}

fn default_long_interaction_threshold_ms() -> f64 {
    200.0
}

fn default_show_frames() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    100
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            long_task_threshold_ms: default_long_task_threshold_ms(),
            long_interaction_threshold_ms: default_long_interaction_threshold_ms(),
            show_frames: default_show_frames(),
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl LoadConfig {
    pub fn options(&self, total_bytes: Option<usize>) -> LoadOptions {
        LoadOptions {
            chunk_size: self.chunk_size,
            batch_size: self.batch_size,
            total_bytes,
        }
    }
}

impl SelectionConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.load.chunk_size, 1 << 20);
        assert_eq!(config.layout, LayoutConfig::default());
        assert_eq!(config.selection.debounce(), Duration::from_millis(100));
    }

    #[rstest]
    fn test_partial_sections_keep_remaining_defaults() {
        let config: Config = toml::from_str(
            r#"
[layout]
long_interaction_threshold_ms = 150.0

[selection]
debounce_ms = 30
"#,
        )
        .unwrap();

        assert_eq!(config.layout.long_interaction_threshold_ms, 150.0);
        assert_eq!(config.layout.long_task_threshold_ms, 50.0);
        assert_eq!(config.selection.debounce_ms, 30);
        assert_eq!(config.load.batch_size, 50_000);
    }
}
