use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{GrabError, GrabResult};

/// Environment variable holding an explicit config path.
pub const CONFIG_ENV: &str = "AUTOGRAB_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub click: ClickConfig,
    #[serde(default)]
    pub burst: BurstConfig,
    #[serde(default)]
    pub secondary: SecondaryConfig,
    #[serde(default)]
    pub reverify: ReverifyConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub pause: PauseConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub presentation: PresentationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Substring matched against window titles; first match wins.
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { title: default_title() }
    }
}

fn default_title() -> String {
    "微信".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_model_path")]
    pub model_path: String,
    /// YOLO dataset description whose `names` field lists the classes.
    #[serde(default = "default_dataset_config")]
    pub dataset_config: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default = "default_iou")]
    pub iou: f32,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default)]
    pub categories: CategoryConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            dataset_config: default_dataset_config(),
            confidence: default_confidence(),
            iou: default_iou(),
            input_size: default_input_size(),
            categories: CategoryConfig::default(),
        }
    }
}

fn default_model_path() -> String {
    "models/best.onnx".into()
}

fn default_dataset_config() -> String {
    "dataset.yaml".into()
}

fn default_confidence() -> f32 {
    0.5
}

fn default_iou() -> f32 {
    0.45
}

fn default_input_size() -> u32 {
    640
}

/// Which detector class names feed each arbiter category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    #[serde(default = "default_primary")]
    pub primary: Vec<String>,
    #[serde(default = "default_secondary")]
    pub secondary: Vec<String>,
    #[serde(default = "default_dismiss_back")]
    pub dismiss_back: Vec<String>,
    #[serde(default = "default_dismiss_close")]
    pub dismiss_close: Vec<String>,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            secondary: default_secondary(),
            dismiss_back: default_dismiss_back(),
            dismiss_close: default_dismiss_close(),
        }
    }
}

fn default_primary() -> Vec<String> {
    vec!["open_button".into()]
}

fn default_secondary() -> Vec<String> {
    vec!["red_packet".into()]
}

fn default_dismiss_back() -> Vec<String> {
    vec!["back_button".into()]
}

fn default_dismiss_close() -> Vec<String> {
    vec!["close_button".into()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Minimum wall-clock length of one cycle.
    #[serde(default = "default_cycle_budget_ms")]
    pub cycle_budget_ms: u64,
    #[serde(default = "default_backoff_ms")]
    pub capture_backoff_ms: u64,
    #[serde(default = "default_backoff_ms")]
    pub error_backoff_ms: u64,
    /// Settle time between raising the window and pinning it on start.
    #[serde(default = "default_start_settle_ms")]
    pub start_settle_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cycle_budget_ms: default_cycle_budget_ms(),
            capture_backoff_ms: default_backoff_ms(),
            error_backoff_ms: default_backoff_ms(),
            start_settle_ms: default_start_settle_ms(),
        }
    }
}

fn default_cycle_budget_ms() -> u64 {
    30
}

fn default_backoff_ms() -> u64 {
    300
}

fn default_start_settle_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickConfig {
    /// Delay between button-down and button-up.
    #[serde(default = "default_press_settle_ms")]
    pub press_settle_ms: u64,
    /// Delay after every click before the next one may be issued.
    #[serde(default = "default_post_click_ms")]
    pub post_click_ms: u64,
    /// Delay between raising the window and the first click.
    #[serde(default = "default_raise_settle_ms")]
    pub raise_settle_ms: u64,
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            press_settle_ms: default_press_settle_ms(),
            post_click_ms: default_post_click_ms(),
            raise_settle_ms: default_raise_settle_ms(),
        }
    }
}

fn default_press_settle_ms() -> u64 {
    10
}

fn default_post_click_ms() -> u64 {
    20
}

fn default_raise_settle_ms() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurstConfig {
    #[serde(default = "default_burst_duration_ms")]
    pub duration_ms: u64,
    #[serde(default = "default_burst_interval_ms")]
    pub interval_ms: u64,
    /// Pause after the burst before the recovery task is launched.
    #[serde(default = "default_post_burst_ms")]
    pub post_burst_ms: u64,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            duration_ms: default_burst_duration_ms(),
            interval_ms: default_burst_interval_ms(),
            post_burst_ms: default_post_burst_ms(),
        }
    }
}

fn default_burst_duration_ms() -> u64 {
    200
}

fn default_burst_interval_ms() -> u64 {
    10
}

fn default_post_burst_ms() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecondaryConfig {
    #[serde(default = "default_secondary_raise_ms")]
    pub raise_settle_ms: u64,
    #[serde(default = "default_secondary_post_ms")]
    pub post_click_ms: u64,
}

impl Default for SecondaryConfig {
    fn default() -> Self {
        Self {
            raise_settle_ms: default_secondary_raise_ms(),
            post_click_ms: default_secondary_post_ms(),
        }
    }
}

fn default_secondary_raise_ms() -> u64 {
    30
}

fn default_secondary_post_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverifyConfig {
    #[serde(default = "default_back_delay_ms")]
    pub back_delay_ms: u64,
    /// Close dialogs linger, so they wait longer than back buttons.
    #[serde(default = "default_close_delay_ms")]
    pub close_delay_ms: u64,
    #[serde(default = "default_post_dismiss_ms")]
    pub post_click_ms: u64,
}

impl Default for ReverifyConfig {
    fn default() -> Self {
        Self {
            back_delay_ms: default_back_delay_ms(),
            close_delay_ms: default_close_delay_ms(),
            post_click_ms: default_post_dismiss_ms(),
        }
    }
}

fn default_back_delay_ms() -> u64 {
    200
}

fn default_close_delay_ms() -> u64 {
    2000
}

fn default_post_dismiss_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Subtracted from the live threshold while looking for the baseline.
    #[serde(default = "default_confidence_margin")]
    pub confidence_margin: f32,
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f32,
    #[serde(default = "default_retry_wait_ms")]
    pub retry_wait_ms: u64,
    #[serde(default = "default_dismiss_settle_ms")]
    pub dismiss_settle_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            confidence_margin: default_confidence_margin(),
            confidence_floor: default_confidence_floor(),
            retry_wait_ms: default_retry_wait_ms(),
            dismiss_settle_ms: default_dismiss_settle_ms(),
        }
    }
}

impl RecoveryConfig {
    pub fn lowered_threshold(&self, live: f32) -> f32 {
        (live - self.confidence_margin).max(self.confidence_floor)
    }
}

fn default_max_attempts() -> u32 {
    10
}

fn default_confidence_margin() -> f32 {
    0.2
}

fn default_confidence_floor() -> f32 {
    0.3
}

fn default_retry_wait_ms() -> u64 {
    100
}

fn default_dismiss_settle_ms() -> u64 {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Global pause key, `F1`..`F24`, `Pause` or `ScrollLock`. Empty disables it.
    #[serde(default = "default_hotkey")]
    pub hotkey: String,
    #[serde(default = "default_hotkey_poll_ms")]
    pub hotkey_poll_ms: u64,
}

impl Default for PauseConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            hotkey: default_hotkey(),
            hotkey_poll_ms: default_hotkey_poll_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_hotkey() -> String {
    "F9".into()
}

fn default_hotkey_poll_ms() -> u64 {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_preview_path")]
    pub path: String,
    /// Minimum gap between two preview files written by the presenter.
    #[serde(default = "default_preview_interval_ms")]
    pub interval_ms: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_preview_path(),
            interval_ms: default_preview_interval_ms(),
        }
    }
}

fn default_preview_path() -> String {
    "preview.png".into()
}

fn default_preview_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresentationConfig {
    /// Print every loop event as one JSON line on stdout.
    #[serde(default)]
    pub json_events: bool,
}

pub fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn resolve_config_path() -> GrabResult<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV) {
        let candidate = PathBuf::from(explicit);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config taken from {CONFIG_ENV}");
            return Ok(candidate);
        }
        return Err(GrabError::Config(format!(
            "{CONFIG_ENV} points to missing file {}",
            candidate.display()
        )));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("autograb").join("config.toml");
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config dir");
            return Ok(candidate);
        }
    }

    Err(GrabError::Config(
        "config.toml not found next to executable, in working directory or user config dir".into(),
    ))
}

pub fn load_config_from(path: &Path) -> GrabResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), window = %config.window.title, "config loaded");
    Ok(config)
}

pub fn load_config() -> GrabResult<AppConfig> {
    let path = resolve_config_path()?;
    load_config_from(&path)
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> GrabResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

/// Overwrite the config file in use, or create `config.toml` in the
/// working directory when none was found. Returns the path written.
pub fn save_config(config: &AppConfig) -> GrabResult<PathBuf> {
    let path = match resolve_config_path() {
        Ok(path) => path,
        Err(_) => std::env::current_dir()?.join("config.toml"),
    };
    save_config_to(config, &path)?;
    Ok(path)
}
