//! Module configuration list: one module id per line, `#` starts a comment
//! line, anything unparsable is skipped.

use crate::config::ConfigError;
use std::path::Path;
use tracing::warn;

pub fn parse_module_list(text: &str) -> Vec<u16> {
    let mut modules = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.parse::<u16>() {
            Ok(id) if !modules.contains(&id) => modules.push(id),
            Ok(_) => {}
            Err(_) => warn!(line = lineno + 1, text = line, "skipping malformed module config line"),
        }
    }
    modules
}

pub fn load_module_list(path: impl AsRef<Path>) -> Result<Vec<u16>, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(parse_module_list(&text))
}
