//! Loading of the gateway's adjacent `.env` file.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const ENV_FILE_NAME: &str = ".env";

/// `.env` path next to the gateway binary.
pub fn env_file_for(binary: &Path) -> PathBuf {
    binary
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(ENV_FILE_NAME)
}

/// Parse `KEY=VALUE` pairs in file order.
///
/// Each line is trimmed; blank lines and `#` comments are skipped. The line
/// is split at the first `=` and both sides are trimmed. Values are taken
/// literally: no quote stripping, escapes or `$VAR` expansion. A missing file
/// yields no entries; lines without a key are logged and skipped.
pub fn load_env_file(path: &Path) -> Vec<(String, String)> {
    if !path.is_file() {
        return Vec::new();
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read env file {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let vars = parse_env_lines(&content, path);
    debug!("Loaded {} variables from {}", vars.len(), path.display());
    vars
}

fn parse_env_lines(content: &str, path: &Path) -> Vec<(String, String)> {
    let mut vars = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            warn!("Skipping line {} in {}: missing '='", idx + 1, path.display());
            continue;
        };
        let key = key.trim();
        if key.is_empty() || line.contains('\0') {
            warn!("Skipping line {} in {}: invalid entry", idx + 1, path.display());
            continue;
        }
        vars.push((key.to_string(), value.trim().to_string()));
    }
    vars
}
