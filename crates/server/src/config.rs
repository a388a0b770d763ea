use std::{collections::HashMap, fs, path::Path};

use anyhow::Context;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub server_public_url: Option<String>,
    pub session_issuer: String,
    pub session_secret: String,
    pub session_ttl_seconds: i64,
    pub max_blob_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/catalog.db".into(),
            server_public_url: None,
            session_issuer: "broadcast-catalog".into(),
            session_secret: "devsecret".into(),
            session_ttl_seconds: 12 * 3600,
            max_blob_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Defaults, then `server.toml` in the working directory, then environment.
pub fn load_settings() -> anyhow::Result<Settings> {
    let mut settings = Settings::default();
    let file = Path::new("server.toml");
    if file.exists() {
        let raw = fs::read_to_string(file).context("failed to read server.toml")?;
        apply_file_overrides(&mut settings, &raw)?;
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

fn apply_file_overrides(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: HashMap<String, toml::Value> =
        toml::from_str(raw).context("server.toml is not valid TOML")?;
    let text = |key: &str| file_cfg.get(key).map(toml_to_string);

    if let Some(v) = text("bind_addr") {
        settings.server_bind = v;
    }
    if let Some(v) = text("database_url") {
        settings.database_url = v;
    }
    if let Some(v) = text("server_public_url") {
        settings.server_public_url = Some(v);
    }
    if let Some(v) = text("session_issuer") {
        settings.session_issuer = v;
    }
    if let Some(v) = text("session_secret") {
        settings.session_secret = v;
    }
    if let Some(v) = text("session_ttl_seconds") {
        settings.session_ttl_seconds = parse_number("session_ttl_seconds", &v)?;
    }
    if let Some(v) = text("max_blob_bytes") {
        settings.max_blob_bytes = parse_number("max_blob_bytes", &v)?;
    }
    Ok(())
}

/// `lookup` is `std::env::var` in production; tests pass a map.
fn apply_env_overrides(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    let first = |keys: &[&str]| keys.iter().find_map(|key| lookup(key));

    if let Some(v) = first(&["APP__BIND_ADDR", "SERVER_BIND"]) {
        settings.server_bind = v;
    }
    if let Some(v) = first(&["APP__DATABASE_URL", "DATABASE_URL"]) {
        settings.database_url = v;
    }
    if let Some(v) = first(&["APP__SERVER_PUBLIC_URL", "SERVER_PUBLIC_URL"]) {
        settings.server_public_url = Some(v);
    }
    if let Some(v) = first(&["APP__SESSION_SECRET", "SESSION_SECRET"]) {
        settings.session_secret = v;
    }
    if let Some(v) = first(&["APP__SESSION_TTL_SECONDS", "SESSION_TTL_SECONDS"]) {
        settings.session_ttl_seconds = parse_number("SESSION_TTL_SECONDS", &v)?;
    }
    if let Some(v) = first(&["APP__MAX_BLOB_BYTES", "MAX_BLOB_BYTES"]) {
        settings.max_blob_bytes = parse_number("MAX_BLOB_BYTES", &v)?;
    }
    Ok(())
}

fn toml_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("{key} must be a number, got '{raw}'"))
}

/// Accepts plain file paths as well as `sqlite:` URLs.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw = raw_database_url.trim();
    if raw.is_empty() {
        return Settings::default().database_url;
    }
    if raw.starts_with("sqlite:") || raw.contains("://") {
        return raw.to_string();
    }
    format!("sqlite://{}", raw.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
