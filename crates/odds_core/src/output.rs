use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Pretty JSON to `path`, parent directories created. Written to a
/// temporary sibling first so readers never see a half-written file.
pub fn write_json_file<T: Serialize + ?Sized>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value).context("serialize output")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("rename into {}", path.display()))?;
    Ok(())
}

/// Compact JSON on a single stdout line. Serialization failure prints `[]`
/// so a consumer parsing stdout always gets a JSON array.
pub fn print_json_stdout<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .unwrap_or_else(|e| {
        tracing::error!("serializing to stdout failed: {e}");
        "[]".to_string()
    });

    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    writeln!(lock, "{json}").context("write stdout")?;
    lock.flush().context("flush stdout")?;
    Ok(())
}

/// Read a JSON file written by `write_json_file`.
pub fn read_json_file(path: impl AsRef<Path>) -> Result<serde_json::Value> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}
