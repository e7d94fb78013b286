use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Read a JSON file and deserialise into a typed struct.
pub fn read_json<T: DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let contents = fs::read_to_string(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    let value: T = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?;
    Ok(value)
}

/// Read a YAML (`.yaml`/`.yml`) or JSON config file, chosen by extension.
pub fn read_config<T: DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let is_yaml = matches!(
        canonical.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if !is_yaml {
        return read_json(path);
    }

    let contents = fs::read_to_string(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    let value: T = serde_yaml::from_str(&contents)
        .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?;
    Ok(value)
}

/// Resolve and validate the path, preventing directory traversal.
pub fn resolve_path(path: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let p = Path::new(path);
    let canonical = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };

    // Basic existence check
    if !canonical.exists() {
        return Err(format!("File not found: {}", canonical.display()).into());
    }

    if !canonical.is_file() {
        return Err(format!("Not a file: {}", canonical.display()).into());
    }

    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        rate: f64,
    }

    #[test]
    fn test_yaml_and_json_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("run.yaml");
        let mut f = fs::File::create(&yaml).unwrap();
        writeln!(f, "name: base\nrate: 0.02").unwrap();

        let json = dir.path().join("run.json");
        fs::write(&json, r#"{"name": "base", "rate": 0.02}"#).unwrap();

        let expected = Sample {
            name: "base".into(),
            rate: 0.02,
        };
        let from_yaml: Sample = read_config(yaml.to_str().unwrap()).unwrap();
        let from_json: Sample = read_config(json.to_str().unwrap()).unwrap();
        assert_eq!(from_yaml, expected);
        assert_eq!(from_json, expected);
    }

    #[test]
    fn test_missing_file() {
        let err = read_config::<Sample>("/definitely/not/here.yaml").unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }
}
