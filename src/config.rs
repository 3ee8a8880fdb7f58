// Configuration: the API token and project id the tool works against.
// Loaded once in `main` and handed to the API client; never written back.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.json";
pub const CONFIG_ENV: &str = "KUALITEE_CONFIG";

/// Printed when the config cannot be loaded.
pub const SAMPLE_CONFIG: &str = r#"{
  "token": "TOKEN_HERE",
  "project_id": 27433
}"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub token: String,
    pub project_id: u64,
}

// Fields are optional here so a missing key maps to `MissingField`
// instead of a generic serde message.
#[derive(Deserialize)]
struct RawConfig {
    token: Option<String>,
    project_id: Option<serde_json::Value>,
}

/// Pick the config file: `$KUALITEE_CONFIG`, then `./config.json`, then
/// `~/.kualitee/config.json`. Falls back to `./config.json` so the error
/// names the file the user is expected to create.
pub fn resolve_config_path() -> PathBuf {
    if let Ok(p) = std::env::var(CONFIG_ENV) {
        if !p.trim().is_empty() {
            return PathBuf::from(p);
        }
    }
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return local;
    }
    if let Some(home) = dirs::home_dir() {
        let candidate = home.join(".kualitee").join(CONFIG_FILE);
        if candidate.exists() {
            return candidate;
        }
    }
    local
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::Missing(path.to_path_buf()));
    }
    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(path, &data)
}

fn parse_config(path: &Path, data: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = serde_json::from_str(data).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let token = raw.token.ok_or(ConfigError::MissingField("token"))?;
    if token.trim().is_empty() {
        return Err(ConfigError::Invalid("token is empty".into()));
    }

    let project_id = raw
        .project_id
        .ok_or(ConfigError::MissingField("project_id"))?;
    let project_id = project_id_from_json(&project_id)?;

    Ok(Config {
        token: token.trim().to_string(),
        project_id,
    })
}

// The service documents project_id as an integer, but hand-written configs
// often quote it.
fn project_id_from_json(v: &serde_json::Value) -> Result<u64, ConfigError> {
    let id = match v {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    match id {
        Some(id) if id > 0 => Ok(id),
        _ => Err(ConfigError::Invalid(format!(
            "project_id must be a positive integer, got {}",
            v
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_fields_exactly() {
        let f = write_config(r#"{"token":"abc","project_id":27433}"#);
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(
            cfg,
            Config {
                token: "abc".into(),
                project_id: 27433
            }
        );
    }

    #[test]
    fn accepts_quoted_project_id_and_extra_keys() {
        let f = write_config(r#"{"token":"t0k","project_id":"42","theme":"dark"}"#);
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.project_id, 42);
    }

    #[test]
    fn missing_token_is_reported() {
        let f = write_config(r#"{"project_id":1}"#);
        assert!(matches!(
            load_config(f.path()),
            Err(ConfigError::MissingField("token"))
        ));
    }

    #[test]
    fn missing_project_id_is_reported() {
        let f = write_config(r#"{"token":"abc"}"#);
        assert!(matches!(
            load_config(f.path()),
            Err(ConfigError::MissingField("project_id"))
        ));
    }

    #[test]
    fn empty_token_and_bad_project_id_are_invalid() {
        let f = write_config(r#"{"token":"  ","project_id":1}"#);
        assert!(matches!(load_config(f.path()), Err(ConfigError::Invalid(_))));

        let f = write_config(r#"{"token":"abc","project_id":0}"#);
        assert!(matches!(load_config(f.path()), Err(ConfigError::Invalid(_))));

        let f = write_config(r#"{"token":"abc","project_id":"x"}"#);
        assert!(matches!(load_config(f.path()), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let f = write_config("{ token: ");
        assert!(matches!(
            load_config(f.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn absent_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert!(matches!(load_config(&path), Err(ConfigError::Missing(_))));
    }
}
