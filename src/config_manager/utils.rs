use std::fs;
use std::path::Path;
use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Read a JSON, JSON-LD or YAML configuration file with environment variable substitution
pub fn read_config_value(config_path: &str) -> Result<Value> {
    if !Path::new(config_path).exists() {
        anyhow::bail!("Configuration file not found: {}", config_path);
    }

    let content = load_text_file_with_guess_encoding(config_path)?;
    if content.trim().is_empty() {
        anyhow::bail!("Configuration file is empty: {}", config_path);
    }

    let content = substitute_env_vars(&content, |name| std::env::var(name).ok())?;

    let path_lower = config_path.to_lowercase();
    let value = if path_lower.ends_with(".yaml") || path_lower.ends_with(".yml") {
        serde_yaml::from_str::<Value>(&content)
            .with_context(|| format!("Invalid YAML in {}", config_path))?
    } else {
        serde_json::from_str::<Value>(&content)
            .with_context(|| format!("Invalid JSON in {}", config_path))?
    };

    debug!("Read configuration from {}", config_path);
    Ok(value)
}

/// Replace environment variables: ${VAR_NAME}
/// Unknown variables are left in place so missing secrets stay detectable.
pub fn substitute_env_vars<F>(content: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let pattern = Regex::new(r"\$\{(\w+)\}")?;
    let replaced = pattern.replace_all(content, |caps: &regex::Captures| {
        lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    });
    Ok(replaced.into_owned())
}

/// Load text file with encoding detection
pub fn load_text_file_with_guess_encoding(file_path: &str) -> Result<String> {
    let bytes = fs::read(file_path)
        .with_context(|| format!("Failed to read {}", file_path))?;
    Ok(decode_text(&bytes))
}

/// UTF-8 (with or without BOM) first, then GBK, which is what Chinese Windows editors save
fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (cow, _, _) = encoding_rs::GBK.decode(bytes);
            cow.into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_variables_only() {
        let out = substitute_env_vars(
            r#"{"key": "${API_KEY}", "url": "${MISSING}"}"#,
            |name| (name == "API_KEY").then(|| "sk-123".to_string()),
        )
        .expect("substitution should succeed");

        assert_eq!(out, r#"{"key": "sk-123", "url": "${MISSING}"}"#);
    }

    #[test]
    fn strips_utf8_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("门店".as_bytes());
        assert_eq!(decode_text(&bytes), "门店");
    }

    #[test]
    fn falls_back_to_gbk() {
        let (encoded, _, _) = encoding_rs::GBK.encode("租车门店");
        assert_eq!(decode_text(&encoded), "租车门店");
    }

    #[test]
    fn reads_yaml_and_json_by_extension() {
        let dir = std::env::temp_dir().join(format!("rental-ai-config-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("create temp dir");

        let yaml_path = dir.join("conf.yaml");
        fs::write(&yaml_path, "system_config:\n  port: 9000\n").expect("write yaml");
        let json_path = dir.join("conf.jsonld");
        fs::write(&json_path, r#"{"@context": {}, "system_config": {"port": 9001}}"#).expect("write json");

        let yaml = read_config_value(yaml_path.to_str().expect("utf-8 path")).expect("yaml loads");
        let json = read_config_value(json_path.to_str().expect("utf-8 path")).expect("json loads");

        assert_eq!(yaml["system_config"]["port"], 9000);
        assert_eq!(json["system_config"]["port"], 9001);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(read_config_value("/definitely/not/here/conf.json").is_err());
    }
}
