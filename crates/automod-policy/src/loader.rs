// loader.rs — Read policy definitions from YAML or JSON files.
//
// A policy file is a list of policies. The format is picked by extension
// (`.yaml`/`.yml` or `.json`); every policy is validated before it is
// returned so a bad file fails at startup rather than at evaluation time.

use std::path::Path;

use crate::error::PolicyError;
use crate::policy::Policy;

/// Load and validate every policy in a file.
pub fn load_policies(path: impl AsRef<Path>) -> Result<Vec<Policy>, PolicyError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| PolicyError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })?;

    let policies: Vec<Policy> = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
        Some("json") => serde_json::from_str(&content)?,
        _ => {
            return Err(PolicyError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    };

    for policy in &policies {
        policy.validate()?;
    }

    tracing::info!(count = policies.len(), path = %path.display(), "loaded policies");
    Ok(policies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_yaml_list() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("policies.yaml");
        std::fs::write(
            &path,
            "- id: a\n  name: A\n  triggers: [message_create]\n- id: b\n  name: B\n  priority: 9\n",
        )
        .unwrap();

        let policies = load_policies(&path).unwrap();
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[1].priority, 9);
    }

    #[test]
    fn loads_json_list() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("policies.json");
        std::fs::write(&path, r#"[{"id": "a", "name": "A", "triggers": ["member_join"]}]"#).unwrap();
        assert_eq!(load_policies(&path).unwrap()[0].id, "a");
    }

    #[test]
    fn rejects_invalid_policy_in_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("policies.yml");
        std::fs::write(&path, "- id: a\n  name: A\n  priority: 0\n").unwrap();
        assert!(matches!(
            load_policies(&path),
            Err(PolicyError::InvalidPolicy { .. })
        ));
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("policies.txt");
        std::fs::write(&path, "[]").unwrap();
        assert!(matches!(
            load_policies(&path),
            Err(PolicyError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn missing_file_is_read_error() {
        assert!(matches!(
            load_policies("/nonexistent/policies.yaml"),
            Err(PolicyError::ReadFailed { .. })
        ));
    }
}
