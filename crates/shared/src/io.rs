use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const FINGERPRINT_CACHE_FILE: &str = "processed_articles.json";
pub const SUMMARIES_FILE: &str = "news_summaries.json";
pub const IDEAS_FILE: &str = "content_ideas.json";

/// Get the default directory for local worker files
pub fn get_default_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .context("Could not determine local data directory")?
        .join("content-automation");

    Ok(data_dir)
}

/// Load a JSON array file. A missing file is an empty list.
pub fn load_json_list<T: DeserializeOwned>(filepath: &Path) -> Result<Vec<T>> {
    if !filepath.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(filepath)
        .with_context(|| format!("Failed to read {}", filepath.display()))?;

    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str(&content).with_context(|| {
        format!(
            "Failed to parse {}. The file may be corrupted.",
            filepath.display()
        )
    })
}

/// Replace a file's contents with pretty JSON via a temp file and rename,
/// so readers never observe a half-written file.
pub fn save_json<T: Serialize + ?Sized>(value: &T, filepath: &Path) -> Result<()> {
    if let Some(parent) = filepath.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(value).context("Failed to serialize data")?;

    let file_name = filepath
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("data.json");
    let temp_path = filepath.with_file_name(format!(".{}.tmp", file_name));

    fs::write(&temp_path, json)
        .with_context(|| format!("Failed to write {}", temp_path.display()))?;
    fs::rename(&temp_path, filepath).with_context(|| {
        format!(
            "Failed to move {} into place at {}",
            temp_path.display(),
            filepath.display()
        )
    })?;

    Ok(())
}

/// Append records to a JSON array file (read, extend, rewrite).
pub fn append_json_list<T: Serialize + DeserializeOwned + Clone>(
    records: &[T],
    filepath: &Path,
) -> Result<usize> {
    let mut existing: Vec<T> = load_json_list(filepath)?;
    existing.extend_from_slice(records);
    save_json(&existing, filepath)?;
    Ok(existing.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempdir().expect("tempdir");
        let loaded: Vec<String> = load_json_list(&dir.path().join("absent.json")).expect("load");
        assert!(loaded.is_empty());
    }

    #[test]
    fn append_extends_existing_array() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("list.json");

        append_json_list(&["a".to_string()], &path).expect("first append");
        let total = append_json_list(&["b".to_string(), "c".to_string()], &path)
            .expect("second append");

        assert_eq!(total, 3);
        let loaded: Vec<String> = load_json_list(&path).expect("load");
        assert_eq!(loaded, vec!["a", "b", "c"]);
        assert!(!path.with_file_name(".list.json.tmp").exists());
    }

    #[test]
    fn corrupted_file_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").expect("write");
        assert!(load_json_list::<String>(&path).is_err());
    }
}
