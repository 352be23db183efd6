//! rsx config - Show or edit configuration
//!
//! Reads come from the effective config (files plus `RSX_*` overrides).
//! Writes go to the project config file and are validated before saving.

use std::path::Path;

use clap::Args;

use crate::app::AppContext;
use crate::cli::output;
use crate::config::Config;
use crate::error::{Result, RsError};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Dotted key, e.g. `breaker.defaults.failure_threshold`
    pub key: Option<String>,

    /// Value to set
    pub value: Option<String>,

    /// Remove the key from the config file
    #[arg(long)]
    pub unset: bool,

    /// Print the config file path
    #[arg(long)]
    pub path: bool,
}

pub fn run(ctx: &AppContext, args: &ConfigArgs) -> Result<()> {
    if args.path {
        if ctx.is_json() {
            return output::emit_json(&output::json_ok(serde_json::json!({
                "path": ctx.config_path,
                "exists": ctx.config_path.exists(),
            })));
        }
        println!("{}", ctx.config_path.display());
        return Ok(());
    }

    match (&args.key, &args.value, args.unset) {
        (None, _, true) => Err(RsError::Config("--unset needs a key".to_string())),
        (Some(_), Some(_), true) => Err(RsError::Config("cannot use --unset with a value".to_string())),
        (None, _, false) => show_all(ctx),
        (Some(key), None, true) => edit(&ctx.config_path, |doc| unset_path(doc, key)),
        (Some(key), Some(value), false) => {
            let value = parse_value(value)?;
            edit(&ctx.config_path, |doc| set_path(doc, key, value))
        }
        (Some(key), None, false) => show_key(ctx, key),
    }
}

fn show_all(ctx: &AppContext) -> Result<()> {
    if ctx.is_json() {
        return output::emit_json(&output::json_ok(&ctx.config));
    }
    let rendered = toml::to_string_pretty(&ctx.config).map_err(|err| RsError::Config(format!("render config: {err}")))?;
    println!("{rendered}");
    Ok(())
}

fn show_key(ctx: &AppContext, key: &str) -> Result<()> {
    let doc = toml::Value::try_from(&ctx.config).map_err(|err| RsError::Config(format!("serialize config: {err}")))?;
    let value = get_path(&doc, key)?;
    if ctx.is_json() {
        return output::emit_json(&output::json_ok(serde_json::json!({ "key": key, "value": value })));
    }
    match &value {
        toml::Value::String(s) => println!("{s}"),
        other => println!("{other}"),
    }
    Ok(())
}

/// Load the config file, apply `change`, validate the result, and save.
fn edit<F>(path: &Path, change: F) -> Result<()>
where
    F: FnOnce(&mut toml::Value) -> Result<()>,
{
    let mut doc = if path.exists() {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|err| RsError::Config(format!("parse {}: {err}", path.display())))?
    } else {
        toml::Value::Table(toml::Table::new())
    };

    change(&mut doc)?;

    let rendered = toml::to_string_pretty(&doc).map_err(|err| RsError::Config(format!("render config: {err}")))?;
    Config::check_document(&rendered)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, rendered)?;
    tracing::info!(path = %path.display(), "config updated");
    Ok(())
}

/// TOML literal when it parses as one, else a plain string.
fn parse_value(raw: &str) -> Result<toml::Value> {
    if let Ok(doc) = toml::from_str::<toml::Table>(&format!("value = {raw}")) {
        if let Some(value) = doc.get("value") {
            return Ok(value.clone());
        }
    }
    Ok(toml::Value::String(raw.to_string()))
}

fn split_key(key: &str) -> Result<(Vec<&str>, &str)> {
    let mut parts: Vec<&str> = key.split('.').collect();
    let last = parts.pop().unwrap_or_default();
    if last.is_empty() || parts.iter().any(|p| p.is_empty()) {
        return Err(RsError::Config(format!("invalid key: '{key}'")));
    }
    Ok((parts, last))
}

fn get_path(doc: &toml::Value, key: &str) -> Result<toml::Value> {
    key.split('.')
        .try_fold(doc, |current, part| current.get(part))
        .cloned()
        .ok_or_else(|| RsError::Config(format!("unknown key: {key}")))
}

fn set_path(doc: &mut toml::Value, key: &str, value: toml::Value) -> Result<()> {
    let (parents, last) = split_key(key)?;
    let mut current = doc;
    for part in parents {
        current = as_table(current)?
            .entry(part.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
    }
    as_table(current)?.insert(last.to_string(), value);
    Ok(())
}

fn unset_path(doc: &mut toml::Value, key: &str) -> Result<()> {
    let (parents, last) = split_key(key)?;
    let mut current = doc;
    for part in parents {
        current = as_table(current)?
            .get_mut(part)
            .ok_or_else(|| RsError::Config(format!("key not set in config file: {key}")))?;
    }
    as_table(current)?
        .remove(last)
        .map(|_| ())
        .ok_or_else(|| RsError::Config(format!("key not set in config file: {key}")))
}

fn as_table(value: &mut toml::Value) -> Result<&mut toml::Table> {
    value
        .as_table_mut()
        .ok_or_else(|| RsError::Config("config path is not a table".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn values_parse_as_toml_or_string() {
        assert_eq!(parse_value("5").unwrap(), toml::Value::Integer(5));
        assert_eq!(parse_value("true").unwrap(), toml::Value::Boolean(true));
        assert_eq!(parse_value("0.25").unwrap(), toml::Value::Float(0.25));
        assert_eq!(parse_value("memory").unwrap(), toml::Value::String("memory".to_string()));
    }

    #[test]
    fn set_then_unset_nested_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        edit(&path, |doc| set_path(doc, "breaker.defaults.failure_threshold", toml::Value::Integer(3))).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let doc: toml::Value = toml::from_str(&raw).unwrap();
        assert_eq!(
            get_path(&doc, "breaker.defaults.failure_threshold").unwrap(),
            toml::Value::Integer(3)
        );

        edit(&path, |doc| unset_path(doc, "breaker.defaults.failure_threshold")).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let doc: toml::Value = toml::from_str(&raw).unwrap();
        assert!(get_path(&doc, "breaker.defaults.failure_threshold").is_err());
    }

    #[test]
    fn invalid_result_is_not_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let err = edit(&path, |doc| set_path(doc, "no_such_section.key", toml::Value::Integer(1)));
        assert!(err.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn empty_key_segments_are_rejected() {
        let mut doc = toml::Value::Table(toml::Table::new());
        assert!(set_path(&mut doc, "breaker..x", toml::Value::Integer(1)).is_err());
        assert!(set_path(&mut doc, "", toml::Value::Integer(1)).is_err());
    }
}
