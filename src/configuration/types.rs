use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

/// Container runtime settings for attacker and victim containers.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Image used for every attacker sandbox.
    #[serde(default = "default_attacker_image")]
    pub attacker_image: String,

    /// Port the in-container terminal service listens on.
    #[serde(default = "default_attacker_service_port")]
    pub attacker_service_port: u16,

    /// Directory holding one Dockerfile build context per level key.
    #[serde(default = "default_victim_context_dir")]
    pub victim_context_dir: PathBuf,

    /// Network joined when the orchestrator's own network cannot be detected.
    #[serde(default = "default_network")]
    pub default_network: String,

    /// Value of the `app` label stamped on every managed container.
    #[serde(default = "default_app_label")]
    pub app_label: String,

    /// Value of the `type` label on attacker containers.
    #[serde(default = "default_attacker_label")]
    pub attacker_label: String,

    /// Value of the `type` label on victim containers.
    #[serde(default = "default_victim_label")]
    pub victim_label: String,

    /// Upper bound on TCP connect attempts while waiting for a freshly
    /// started attacker's terminal service.
    #[serde(default = "default_ready_wait_attempts")]
    pub ready_wait_max_attempts: u32,

    /// Host name used when assembling player-facing terminal URLs.
    #[serde(default = "default_terminal_host")]
    pub terminal_host: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            attacker_image: default_attacker_image(),
            attacker_service_port: default_attacker_service_port(),
            victim_context_dir: default_victim_context_dir(),
            default_network: default_network(),
            app_label: default_app_label(),
            attacker_label: default_attacker_label(),
            victim_label: default_victim_label(),
            ready_wait_max_attempts: default_ready_wait_attempts(),
            terminal_host: default_terminal_host(),
        }
    }
}

/// Scoring parameters: the hint penalty and the level allow-list with the
/// completion point value per level key.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_hint_penalty")]
    pub hint_penalty: i64,

    /// Allowed level keys mapped to their completion points. A selection
    /// containing none of these keys fails session creation.
    #[serde(default = "default_level_points")]
    pub level_points: BTreeMap<String, i64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            hint_penalty: default_hint_penalty(),
            level_points: default_level_points(),
        }
    }
}

/// Session creation defaults and join-code generation bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Attempts at sampling an unused six-digit join code before giving up.
    #[serde(default = "default_code_attempts")]
    pub code_attempts: u32,

    #[serde(default = "default_duration_secs")]
    pub default_duration_secs: i64,

    #[serde(default = "default_max_players")]
    pub default_max_players: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            code_attempts: default_code_attempts(),
            default_duration_secs: default_duration_secs(),
            default_max_players: default_max_players(),
        }
    }
}

/// HTTP API settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_web_port")]
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_web_port(),
        }
    }
}

fn default_attacker_image() -> String {
    "mits-attacker:latest".to_string()
}

fn default_attacker_service_port() -> u16 {
    3000
}

fn default_victim_context_dir() -> PathBuf {
    PathBuf::from("victims")
}

fn default_network() -> String {
    "mits-net".to_string()
}

fn default_app_label() -> String {
    "mits-multiplayer".to_string()
}

fn default_attacker_label() -> String {
    "MITS-ATTACKER".to_string()
}

fn default_victim_label() -> String {
    "MITS-VICTIM".to_string()
}

fn default_ready_wait_attempts() -> u32 {
    30
}

fn default_terminal_host() -> String {
    "localhost".to_string()
}

fn default_hint_penalty() -> i64 {
    5
}

fn default_level_points() -> BTreeMap<String, i64> {
    BTreeMap::from([
        ("level1".to_string(), 100),
        ("level2".to_string(), 150),
        ("level3".to_string(), 200),
    ])
}

fn default_code_attempts() -> u32 {
    10
}

fn default_duration_secs() -> i64 {
    3600
}

fn default_max_players() -> i64 {
    10
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_web_port() -> u16 {
    8080
}
