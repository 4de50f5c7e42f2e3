//! `TESSERA_*` environment variable fallbacks.
//!
//! A variable only fills a field that no config file set. Values are
//! coerced to integers for numeric fields; everything else stays a string.

use std::collections::HashMap;

use crate::error::{ConfigError, ConfigResult};
use crate::loader::FileFields;

/// Maps an environment variable to a dotted config field.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "TESSERA_STORAGE_DIR",
        field_path: "repository.storage_dir",
    },
    EnvMapping {
        var_name: "TESSERA_CATALOG_FILE",
        field_path: "repository.catalog_file",
    },
    EnvMapping {
        var_name: "TESSERA_DIGEST_ALGORITHM",
        field_path: "repository.digest_algorithm",
    },
    EnvMapping {
        var_name: "TESSERA_LOCK_TIMEOUT_MS",
        field_path: "runtime.lock_timeout_ms",
    },
    EnvMapping {
        var_name: "TESSERA_DATA_DIR",
        field_path: "runtime.data_dir",
    },
    EnvMapping {
        var_name: "TESSERA_LOG_LEVEL",
        field_path: "logging.level",
    },
];

const INTEGER_FIELDS: &[&str] = &["runtime.lock_timeout_ms", "runtime.event_queue_warn_depth"];

/// Snapshot of the `TESSERA_*` variables in the process environment.
pub(crate) fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with("TESSERA_"))
        .collect()
}

/// Apply fallbacks to `merged`, skipping fields in `file_fields`. Returns
/// the field paths that were filled.
pub(crate) fn apply_env_fallbacks(
    merged: &mut toml::Value,
    file_fields: &FileFields,
    env_vars: &HashMap<String, String>,
) -> ConfigResult<Vec<String>> {
    let mut applied = Vec::new();
    for mapping in ENV_MAPPINGS {
        if file_fields.contains(mapping.field_path) {
            continue;
        }
        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };
        if raw.is_empty() {
            continue;
        }
        let value = coerce_to_toml_value(mapping, raw)?;
        set_field(merged, mapping.field_path, value);
        applied.push(mapping.field_path.to_owned());
    }
    Ok(applied)
}

fn coerce_to_toml_value(mapping: &EnvMapping, raw: &str) -> ConfigResult<toml::Value> {
    if INTEGER_FIELDS.contains(&mapping.field_path) {
        return raw
            .trim()
            .parse::<i64>()
            .map(toml::Value::Integer)
            .map_err(|e| ConfigError::EnvError {
                var_name: mapping.var_name.to_owned(),
                message: format!("expected an integer: {e}"),
            });
    }
    Ok(toml::Value::String(raw.to_owned()))
}

fn set_field(root: &mut toml::Value, field_path: &str, value: toml::Value) {
    let mut current = root;
    let mut segments = field_path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        if segments.peek().is_none() {
            table.insert(segment.to_owned(), value);
            return;
        }
        current = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
}
