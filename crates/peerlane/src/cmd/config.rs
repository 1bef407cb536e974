use std::path::Path;

use peerlane::association::Settings;
use serde::Serialize;
use serde_json::Value;

use crate::cmd::ConfigArgs;
use crate::exit::{settings_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{new_table, print_json, print_json_pretty, OutputFormat};

#[derive(Serialize)]
struct CheckOutput {
    valid: bool,
    source: String,
}

/// Load and validate settings; defaults when no file is given.
pub fn load_settings(path: Option<&Path>) -> CliResult<Settings> {
    match path {
        Some(path) => Settings::from_path(path)
            .map_err(|err| settings_error(&format!("invalid configuration {}", path.display()), err)),
        None => Ok(Settings::default()),
    }
}

pub fn run(args: ConfigArgs, format: OutputFormat) -> CliResult<i32> {
    let settings = load_settings(args.file.as_deref())?;
    let source = args
        .file
        .as_ref()
        .map_or_else(|| "defaults".to_string(), |path| path.display().to_string());

    if args.check {
        match format {
            OutputFormat::Json => print_json(&CheckOutput {
                valid: true,
                source,
            }),
            _ => println!("configuration ok ({source})"),
        }
        return Ok(SUCCESS);
    }

    match format {
        OutputFormat::Json => print_json(&settings),
        OutputFormat::Pretty => print_json_pretty(&settings),
        OutputFormat::Raw => {
            let json = serde_json::to_string(&settings).map_err(|err| {
                CliError::new(INTERNAL, format!("failed to render settings: {err}"))
            })?;
            println!("{json}");
        }
        OutputFormat::Table => {
            let value = serde_json::to_value(&settings).map_err(|err| {
                CliError::new(INTERNAL, format!("failed to render settings: {err}"))
            })?;
            let mut rows = Vec::new();
            flatten("", &value, &mut rows);
            let mut table = new_table(vec!["KEY", "VALUE"]);
            for (key, value) in rows {
                table.add_row(vec![key, value]);
            }
            println!("{table}");
        }
    }
    Ok(SUCCESS)
}

/// Flatten nested objects into dotted keys, the form validation errors use.
fn flatten(prefix: &str, value: &Value, rows: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                let key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&key, value, rows);
            }
        }
        Value::String(text) => rows.push((prefix.to_string(), text.clone())),
        other => rows.push((prefix.to_string(), other.to_string())),
    }
}
