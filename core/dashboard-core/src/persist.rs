//! Atomic JSON persistence.
//!
//! Writes go to a temp file in the target's directory and are renamed over the
//! target, so a reader sees either the previous file or the complete new one.
//! Temp files are named `.<random>.tmp`; directory scans only look at `*.json`.
//!
//! Reads distinguish three outcomes: missing (`Ok(None)`), parsed, and
//! corrupt (`Err(StoreError::Corrupt)`). Callers scanning many records log the
//! corrupt ones and keep going.

use std::io::{Read, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StoreError};

/// Records larger than this are refused rather than parsed.
pub const MAX_RECORD_BYTES: u64 = 10 * 1024 * 1024;

/// Serializes `value` as pretty JSON and atomically replaces `path`.
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut content = serde_json::to_string_pretty(value).map_err(|e| StoreError::Json {
        context: format!("serializing {}", path.display()),
        source: e,
    })?;
    content.push('\n');
    write_atomic(path, content.as_bytes())
}

/// Writes `bytes` to `path` via temp file + rename.
///
/// On failure the temp file is dropped (and deleted) and `path` is untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut tmp = tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| StoreError::io(format!("creating temp file in {}", dir.display()), e))?;

    tmp.write_all(bytes)
        .map_err(|e| StoreError::io(format!("writing temp file for {}", path.display()), e))?;

    tmp.flush()
        .map_err(|e| StoreError::io(format!("flushing temp file for {}", path.display()), e))?;

    tmp.as_file()
        .sync_all()
        .map_err(|e| StoreError::io(format!("syncing temp file for {}", path.display()), e))?;

    tmp.persist(path).map_err(|e| {
        StoreError::io(
            format!("persisting temp file to {}", path.display()),
            e.error,
        )
    })?;

    Ok(())
}

/// Reads `path` as untyped JSON. `Ok(None)` if the file does not exist.
pub fn load_json(path: &Path) -> Result<Option<serde_json::Value>> {
    load_json_limited(path, MAX_RECORD_BYTES)
}

/// Reads and deserializes `path`. Shape mismatches count as corruption.
pub fn load_record<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let Some(value) = load_json(path)? else {
        return Ok(None);
    };
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            details: e.to_string(),
        })
}

fn load_json_limited(path: &Path, max_bytes: u64) -> Result<Option<serde_json::Value>> {
    let mut file = match open_no_follow(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) if is_symlink_refusal(&e) => {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                details: "refusing to read symlink".to_string(),
            })
        }
        Err(e) => return Err(StoreError::io(format!("opening {}", path.display()), e)),
    };

    let size = file
        .metadata()
        .map_err(|e| StoreError::io(format!("stat {}", path.display()), e))?
        .len();
    if size > max_bytes {
        return Err(StoreError::Corrupt {
            path: path.to_path_buf(),
            details: format!("file too large ({} bytes, max {})", size, max_bytes),
        });
    }

    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| StoreError::io(format!("reading {}", path.display()), e))?;

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            details: e.to_string(),
        })
}

#[cfg(unix)]
fn open_no_follow(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    std::fs::OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOFOLLOW)
        .open(path)
}

#[cfg(not(unix))]
fn open_no_follow(path: &Path) -> std::io::Result<std::fs::File> {
    if fs_err::symlink_metadata(path)?.file_type().is_symlink() {
        return Err(std::io::Error::other("symlink"));
    }
    std::fs::File::open(path)
}

fn is_symlink_refusal(err: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        matches!(err.raw_os_error(), Some(code) if code == libc::ELOOP || code == libc::EMLINK)
    }
    #[cfg(not(unix))]
    {
        err.to_string() == "symlink"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn json_files(dir: &Path) -> Vec<String> {
        fs_err::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_save_creates_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("rec.json");
        save_json(&path, &json!({"a": 1})).unwrap();

        let content = fs_err::read_to_string(&path).unwrap();
        assert!(content.ends_with('\n'));
        assert_eq!(load_json(&path).unwrap(), Some(json!({"a": 1})));
    }

    #[test]
    fn test_save_overwrites() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("rec.json");
        save_json(&path, &json!({"v": 1})).unwrap();
        save_json(&path, &json!({"v": 2})).unwrap();
        assert_eq!(load_json(&path).unwrap(), Some(json!({"v": 2})));
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("rec.json");
        for i in 0..5 {
            save_json(&path, &json!({"v": i})).unwrap();
        }
        assert_eq!(json_files(temp.path()), vec!["rec.json".to_string()]);
    }

    #[test]
    fn test_interrupted_write_keeps_prior_content() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("rec.json");
        save_json(&path, &json!({"v": "old"})).unwrap();

        // A writer that dies before the rename: its temp file never replaces the target.
        {
            let mut tmp = tempfile::Builder::new()
                .prefix(".")
                .suffix(".tmp")
                .tempfile_in(temp.path())
                .unwrap();
            tmp.write_all(b"{\"v\": \"ne").unwrap();
        }

        assert_eq!(load_json(&path).unwrap(), Some(json!({"v": "old"})));
        assert_eq!(json_files(temp.path()), vec!["rec.json".to_string()]);
    }

    #[test]
    fn test_failed_save_keeps_prior_content() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("rec.json");
        save_json(&path, &json!({"v": "old"})).unwrap();

        // Non-string map keys fail serialization before anything touches disk.
        let mut bad = std::collections::HashMap::new();
        bad.insert((1, 2), 3);
        assert!(save_json(&path, &bad).is_err());

        assert_eq!(load_json(&path).unwrap(), Some(json!({"v": "old"})));
    }

    #[test]
    fn test_load_missing_is_none() {
        let temp = tempdir().unwrap();
        assert!(load_json(&temp.path().join("nope.json")).unwrap().is_none());
    }

    #[test]
    fn test_load_corrupt_is_corrupt_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("bad.json");
        fs_err::write(&path, "{invalid json}").unwrap();
        assert!(matches!(
            load_json(&path),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_load_empty_file_is_corrupt() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("empty.json");
        fs_err::write(&path, "").unwrap();
        assert!(matches!(
            load_json(&path),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_load_refuses_oversized_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("big.json");
        fs_err::write(&path, "[1,2,3,4,5,6,7,8,9,10]").unwrap();
        assert!(matches!(
            load_json_limited(&path, 8),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_load_refuses_symlink() {
        let temp = tempdir().unwrap();
        let real = temp.path().join("real.json");
        let link = temp.path().join("link.json");
        save_json(&real, &json!({"v": 1})).unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();

        assert!(matches!(load_json(&link), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_load_record_shape_mismatch_is_corrupt() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Needs {
            field: u32,
        }
        let temp = tempdir().unwrap();
        let path = temp.path().join("rec.json");
        save_json(&path, &json!({"other": true})).unwrap();
        assert!(matches!(
            load_record::<Needs>(&path),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
