//! Atomic file snapshotting: write-temp-then-rename, used by every on-disk
//! state named in §6 (historical memory cache, baseline metrics, positions
//! snapshot). There is no teacher precedent for file-backed persistence —
//! the teacher persists through `sqlx` throughout — so this generalizes the
//! shape of a small save/load façade (as in `trading-agent::StateManager`)
//! to files instead of a SQL pool.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Serialize `value` as pretty JSON and atomically replace `path`.
///
/// Writes to a sibling `.tmp` file in the same directory, flushes and syncs
/// it, then renames over the target. A crash at any point leaves `path`
/// holding either its previous complete contents or the new complete
/// contents, never a partial write (§8 atomicity property).
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    {
        let mut f = fs::File::create(&tmp_path)?;
        f.write_all(&bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Append one line of JSON to a JSONL file, creating it and parent
/// directories if needed. Used by the trade journal and health snapshot
/// logs (§6), which are append-only and do not need rename atomicity.
pub fn append_jsonl<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut line = serde_json::to_vec(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    line.push(b'\n');
    let mut f = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    f.write_all(&line)?;
    Ok(())
}

/// Load and deserialize a JSON snapshot. A missing file is not an error —
/// callers treat it as "no prior snapshot" and initialize cold (§4.2
/// failure semantics: snapshot load error is non-fatal).
pub fn read_json<T: DeserializeOwned>(path: &Path) -> std::io::Result<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => {
            let value = serde_json::from_slice(&bytes)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Dummy {
        value: u32,
    }

    #[test]
    fn round_trips_through_atomic_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");

        assert!(read_json::<Dummy>(&path).unwrap().is_none());

        write_json_atomic(&path, &Dummy { value: 42 }).unwrap();
        let loaded: Dummy = read_json(&path).unwrap().unwrap();
        assert_eq!(loaded, Dummy { value: 42 });

        // tmp file must not linger after a successful write
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn appends_jsonl_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        append_jsonl(&path, &Dummy { value: 1 }).unwrap();
        append_jsonl(&path, &Dummy { value: 2 }).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
