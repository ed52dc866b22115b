//! JSON helpers for the files under the data directory.

use std::io;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::ser::{PrettyFormatter, Serializer};
use tokio::fs;

/// Error type for serialization operations.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    /// JSON serialization failed.
    #[error("JSON serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// JSON deserialization failed.
    #[error("JSON deserialization failed: {0}")]
    Deserialize(serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Serializes a value to pretty JSON bytes with a trailing newline.
///
/// Key order follows the source types; use `BTreeMap` for sorted keys.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_json_stable_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, SerializationError> {
    let mut buffer = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"  ");
    let mut serializer = Serializer::with_formatter(&mut buffer, formatter);
    value.serialize(&mut serializer)?;
    buffer.push(b'\n');
    Ok(buffer)
}

/// Deserializes JSON from bytes.
///
/// # Errors
///
/// Returns an error if the JSON is invalid or doesn't match the expected type.
pub fn from_json_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SerializationError> {
    serde_json::from_slice(bytes).map_err(SerializationError::Deserialize)
}

/// Reads and parses `path`, `None` if the file does not exist.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub async fn read_json_file<T: DeserializeOwned>(
    path: &Path,
) -> Result<Option<T>, SerializationError> {
    match fs::read(path).await {
        Ok(bytes) => from_json_bytes(&bytes).map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Writes `value` to `path` through a sibling temp file and a rename,
/// creating parent directories as needed.
///
/// # Errors
///
/// Returns an error if serialization or any file operation fails.
pub async fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<(), SerializationError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let content = to_json_stable_bytes(value)?;
    let temp = path.with_extension("json.tmp");
    fs::write(&temp, content).await?;
    fs::rename(&temp, path).await?;
    Ok(())
}

/// Removes `path`. A missing file is not an error.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be removed.
pub async fn remove_file_if_exists(path: &Path) -> Result<(), SerializationError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_stable_bytes_are_indented_and_terminated() {
        let mut map = BTreeMap::new();
        map.insert("zebra", 1);
        map.insert("apple", 2);

        let bytes = to_json_stable_bytes(&map).expect("serialization should work");
        let json = String::from_utf8(bytes).expect("utf-8");

        assert!(json.ends_with('\n'));
        assert!(json.contains("  \"apple\""));
        assert!(json.find("apple") < json.find("zebra"));
    }

    #[tokio::test]
    async fn test_missing_file_reads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let value: Option<BTreeMap<String, u32>> = read_json_file(&dir.path().join("absent.json"))
            .await
            .expect("read should work");
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_write_creates_parents_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("state.json");
        let mut map = BTreeMap::new();
        map.insert("count".to_string(), 3_u32);

        write_json_file(&path, &map).await.expect("write should work");
        let restored: Option<BTreeMap<String, u32>> =
            read_json_file(&path).await.expect("read should work");

        assert_eq!(restored, Some(map));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.json");
        tokio::fs::write(&path, b"{not json").await.expect("write");

        let result: Result<Option<BTreeMap<String, u32>>, _> = read_json_file(&path).await;
        assert!(matches!(result, Err(SerializationError::Deserialize(_))));
    }

    #[tokio::test]
    async fn test_remove_missing_file_is_ok() {
        let dir = tempfile::tempdir().expect("tempdir");
        remove_file_if_exists(&dir.path().join("gone.json"))
            .await
            .expect("remove should work");
    }
}
