use std::{collections::HashMap, fs, path::Path};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "server.toml";
/// Larger buffers are rejected like unparsable ones; the broadcast queue is allocated up front.
pub const MAX_EVENT_BUFFER: usize = 65_536;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub event_buffer: usize,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8787".into(),
            event_buffer: 256,
            log_filter: "info".into(),
        }
    }
}

/// Defaults, then `server.toml` if present, then environment overrides.
pub fn load_settings() -> anyhow::Result<Settings> {
    let mut settings = Settings::default();
    apply_file(&mut settings, Path::new(DEFAULT_CONFIG_PATH))?;
    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{}'", path.display()))?;
    apply_file_config(settings, &raw)
}

pub(crate) fn apply_file_config(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg = toml::from_str::<HashMap<String, String>>(raw)
        .context("config file must be a flat table of string values")?;

    if let Some(v) = file_cfg.get("bind_addr") {
        settings.server_bind = v.clone();
    }
    if let Some(v) = file_cfg.get("event_buffer").and_then(|v| parse_buffer(v)) {
        settings.event_buffer = v;
    }
    if let Some(v) = file_cfg.get("log_filter") {
        settings.log_filter = v.clone();
    }

    Ok(())
}

pub(crate) fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = var("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = var("APP__EVENT_BUFFER").and_then(|v| parse_buffer(&v)) {
        settings.event_buffer = v;
    }

    if let Some(v) = var("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
}

fn parse_buffer(raw: &str) -> Option<usize> {
    raw.trim()
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=MAX_EVENT_BUFFER).contains(n))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
