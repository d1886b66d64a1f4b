use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{bail, Context};
use pipeline_core::ReconciliationMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" | "in_memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

#[derive(Debug)]
pub struct Settings {
    pub store: StoreBackend,
    pub database_url: String,
    pub seed_path: Option<PathBuf>,
    pub latency_ms: u64,
    pub reconciliation: ReconciliationMode,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store: StoreBackend::Sqlite,
            database_url: "sqlite://./data/leads.db".into(),
            seed_path: None,
            latency_ms: 0,
            reconciliation: ReconciliationMode::KeepLocal,
            log_filter: "info".into(),
        }
    }
}

/// Defaults, then `path` (flat top-level keys) if it exists, then
/// `PIPELINE__*` environment variables.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        let file_cfg = toml::from_str::<toml::Table>(&raw)
            .with_context(|| format!("failed to parse settings file '{}'", path.display()))?;
        apply_overrides(&mut settings, |key| {
            file_cfg.get(key).map(|value| match value {
                toml::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        })?;
    }

    apply_overrides(&mut settings, |key| {
        std::env::var(format!("PIPELINE__{}", key.to_ascii_uppercase())).ok()
    })?;

    Ok(settings)
}

fn apply_overrides(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = lookup("store") {
        settings.store = v.parse().map_err(anyhow::Error::msg)?;
    }
    if let Some(v) = lookup("database_url") {
        settings.database_url = v;
    }
    if let Some(v) = lookup("seed_path") {
        settings.seed_path = (!v.trim().is_empty()).then(|| PathBuf::from(v));
    }
    if let Some(v) = lookup("latency_ms") {
        settings.latency_ms = v
            .trim()
            .parse()
            .with_context(|| format!("invalid latency_ms '{v}'"))?;
    }
    if let Some(v) = lookup("reconciliation") {
        settings.reconciliation = v.parse().map_err(anyhow::Error::msg)?;
    }
    if let Some(v) = lookup("log_filter") {
        if v.trim().is_empty() {
            bail!("log_filter must not be empty");
        }
        settings.log_filter = v;
    }
    Ok(())
}

/// Turns a bare file path or `sqlite:path` into a `sqlite://` url. The store
/// creates missing parent directories when it opens the file.
pub fn normalize_database_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return Settings::default().database_url;
    }
    if raw.contains("://") || raw.starts_with("sqlite::memory:") {
        return raw.to_string();
    }
    let path = raw.strip_prefix("sqlite:").unwrap_or(raw);
    format!("sqlite://{}", path.replace('\\', "/"))
}
