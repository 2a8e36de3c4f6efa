//! Local tag tree kept in a JSON file, served through [`TagClient`].
//!
//! ```json
//! {"roots": {"Plant": [{"path": "Tank.Level", "type": "Float64", "value": 3.5}]}}
//! ```
//!
//! Paths are unique per root and keep file order. Calls complete without
//! blocking, so the timeout is accepted but never reached.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::types::TagEntry;
use crate::io::remote::{RemoteError, RemoteTag, TagClient};
use crate::io::tag_json::JsonTag;

/// On-disk document: tags grouped by root node name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagTree {
    pub roots: BTreeMap<String, Vec<JsonTag>>,
}

impl TagTree {
    /// Reject duplicate paths and values that do not match their declared type.
    pub fn validate(&self) -> Result<()> {
        for (root, tags) in &self.roots {
            let mut seen = HashSet::new();
            for tag in tags {
                if !seen.insert(tag.path.as_str()) {
                    return Err(anyhow!("duplicate tag path {:?} under {:?}", tag.path, root));
                }
                tag.to_remote()
                    .with_context(|| format!("invalid tag under {root:?}"))?;
            }
        }
        Ok(())
    }
}

pub struct JsonTagStore {
    path: PathBuf,
    tree: Mutex<TagTree>,
}

impl JsonTagStore {
    /// Load and validate a tag tree file.
    pub fn open(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read tag tree {}", path.display()))?;
        let tree: TagTree = serde_json::from_str(&contents)
            .with_context(|| format!("parse tag tree {}", path.display()))?;
        tree.validate()
            .with_context(|| format!("validate tag tree {}", path.display()))?;
        debug!(path = %path.display(), roots = tree.roots.len(), "tag tree loaded");
        Ok(Self {
            path: path.to_path_buf(),
            tree: Mutex::new(tree),
        })
    }

    /// Write `tree` to `path` and serve it.
    pub fn create(path: &Path, tree: TagTree) -> Result<Self> {
        tree.validate()?;
        write_tree(path, &tree)?;
        Ok(Self {
            path: path.to_path_buf(),
            tree: Mutex::new(tree),
        })
    }

    pub fn snapshot(&self) -> Result<TagTree> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, TagTree>, RemoteError> {
        self.tree
            .lock()
            .map_err(|_| RemoteError::Transport("tag store lock poisoned".to_string()))
    }
}

impl TagClient for JsonTagStore {
    #[instrument(skip_all, fields(root = %root))]
    fn read_children(&self, root: &str, _timeout: Duration) -> Result<Vec<RemoteTag>, RemoteError> {
        let tree = self.lock()?;
        let tags = tree
            .roots
            .get(root)
            .ok_or_else(|| RemoteError::UnknownRoot(root.to_string()))?;
        tags.iter()
            .map(|tag| {
                tag.to_remote()
                    .map_err(|err| RemoteError::Transport(err.to_string()))
            })
            .collect()
    }

    fn browse(&self, root: &str, _timeout: Duration) -> Result<BTreeSet<String>, RemoteError> {
        let tree = self.lock()?;
        let tags = tree
            .roots
            .get(root)
            .ok_or_else(|| RemoteError::UnknownRoot(root.to_string()))?;
        Ok(tags.iter().map(|tag| tag.path.clone()).collect())
    }

    #[instrument(skip_all, fields(root = %root, count = values.len()))]
    fn write_children(
        &self,
        root: &str,
        values: &[TagEntry],
        _timeout: Duration,
    ) -> Result<(), RemoteError> {
        let mut tree = self.lock()?;
        let mut updated = tree.clone();
        let tags = updated
            .roots
            .get_mut(root)
            .ok_or_else(|| RemoteError::UnknownRoot(root.to_string()))?;
        for entry in values {
            let slot = tags
                .iter_mut()
                .find(|tag| tag.path == entry.relative_path)
                .ok_or_else(|| RemoteError::UnknownTag {
                    root: root.to_string(),
                    path: entry.relative_path.clone(),
                })?;
            *slot = JsonTag::from_entry(entry);
        }
        write_tree(&self.path, &updated)
            .map_err(|err| RemoteError::Transport(format!("{err:#}")))?;
        *tree = updated;
        debug!(path = %self.path.display(), "tag tree written");
        Ok(())
    }
}

/// Atomically write the tree to disk (temp file + rename).
pub fn write_tree(path: &Path, tree: &TagTree) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(tree).context("serialize tag tree")?;
    buf.push('\n');
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp tag tree {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace tag tree {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ScalarValue, TagValue};
    use crate::io::remote::RemoteValue;
    use proptest::prelude::*;
    use serde_json::json;

    fn sample_tree() -> TagTree {
        serde_json::from_value(json!({
            "roots": {
                "Plant": [
                    {"path": "Tank.Level", "type": "Float64", "value": 3.5},
                    {"path": "Line.Setpoints", "type": "Int32", "value": [1, 2, 3]},
                    {"path": "Pump.Serial", "type": "Guid", "value": "abc"}
                ]
            }
        }))
        .expect("tree")
    }

    #[test]
    fn read_children_keeps_file_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store =
            JsonTagStore::create(&temp.path().join("tags.json"), sample_tree()).expect("create");
        let tags = store
            .read_children("Plant", Duration::from_secs(1))
            .expect("read");
        let paths: Vec<&str> = tags.iter().map(|t| t.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["Tank.Level", "Line.Setpoints", "Pump.Serial"]);
        assert_eq!(
            tags[0].value,
            RemoteValue::Scalar(ScalarValue::Float64(3.5))
        );
    }

    #[test]
    fn unknown_root_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store =
            JsonTagStore::create(&temp.path().join("tags.json"), sample_tree()).expect("create");
        let err = store
            .browse("Nope", Duration::from_secs(1))
            .expect_err("unknown root");
        assert_eq!(err, RemoteError::UnknownRoot("Nope".to_string()));
    }

    #[test]
    fn write_persists_and_reloads() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tags.json");
        let store = JsonTagStore::create(&path, sample_tree()).expect("create");
        store
            .write_children(
                "Plant",
                &[TagEntry::new(
                    "Tank.Level",
                    TagValue::Scalar(ScalarValue::Float64(7.25)),
                )],
                Duration::from_secs(1),
            )
            .expect("write");

        let reloaded = JsonTagStore::open(&path).expect("open");
        let tags = reloaded
            .read_children("Plant", Duration::from_secs(1))
            .expect("read");
        assert_eq!(
            tags[0].value,
            RemoteValue::Scalar(ScalarValue::Float64(7.25))
        );
    }

    #[test]
    fn write_to_unknown_tag_changes_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tags.json");
        let store = JsonTagStore::create(&path, sample_tree()).expect("create");
        let err = store
            .write_children(
                "Plant",
                &[
                    TagEntry::new("Tank.Level", TagValue::Scalar(ScalarValue::Float64(1.0))),
                    TagEntry::new("Missing", TagValue::Scalar(ScalarValue::Bool(true))),
                ],
                Duration::from_secs(1),
            )
            .expect_err("unknown tag");
        assert!(matches!(err, RemoteError::UnknownTag { .. }));
        assert_eq!(store.snapshot().expect("snapshot"), sample_tree());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn float64_values_survive_reopen_bit_exact(bits in prop::collection::vec(any::<u64>(), 1..200)) {
            let values: Vec<f64> = bits
                .into_iter()
                .map(f64::from_bits)
                .filter(|v| v.is_finite())
                .collect();
            let paths: Vec<String> = (0..values.len()).map(|i| format!("F{i}")).collect();
            let tags: Vec<serde_json::Value> = paths
                .iter()
                .map(|path| json!({"path": path, "type": "Float64", "value": 0.0}))
                .collect();
            let tree: TagTree =
                serde_json::from_value(json!({"roots": {"Plant": tags}})).expect("tree");

            let temp = tempfile::tempdir().expect("tempdir");
            let path = temp.path().join("tags.json");
            let store = JsonTagStore::create(&path, tree).expect("create");
            let entries: Vec<TagEntry> = paths
                .iter()
                .zip(&values)
                .map(|(path, v)| TagEntry::new(path.as_str(), TagValue::Scalar(ScalarValue::Float64(*v))))
                .collect();
            store
                .write_children("Plant", &entries, Duration::from_secs(1))
                .expect("write");

            let reopened = JsonTagStore::open(&path).expect("reopen");
            let tags = reopened
                .read_children("Plant", Duration::from_secs(1))
                .expect("read");
            prop_assert_eq!(tags.len(), values.len());
            for (tag, expected) in tags.iter().zip(&values) {
                let RemoteValue::Scalar(ScalarValue::Float64(found)) = &tag.value else {
                    panic!("{} is not a Float64 scalar", tag.relative_path);
                };
                prop_assert_eq!(found.to_bits(), expected.to_bits(), "{}", tag.relative_path);
            }
        }
    }

    #[test]
    fn duplicate_paths_fail_validation() {
        let tree: TagTree = serde_json::from_value(json!({
            "roots": {"Plant": [
                {"path": "A", "type": "Int32", "value": 1},
                {"path": "A", "type": "Int32", "value": 2}
            ]}
        }))
        .expect("tree");
        let err = tree.validate().expect_err("duplicate");
        assert!(err.to_string().contains("duplicate tag path"));
    }
}
