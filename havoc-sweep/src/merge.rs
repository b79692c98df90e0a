//! Right-biased recursive merge of partial result documents

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use havoc_core::{HavocError, Result};

/// Merge two JSON values.
///
/// Objects are merged recursively (key union); for any other pair the
/// later value wins. Merging is idempotent and associative on disjoint
/// key sets.
pub fn merge_values(base: Value, later: Value) -> Value {
    match (base, later) {
        (Value::Object(mut base), Value::Object(later)) => {
            for (key, value) in later {
                let merged = match base.remove(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, later) => later,
    }
}

/// Merge every partial result file in `dir` into one document.
///
/// Files are visited in name order. A file that cannot be read or
/// parsed is reported and skipped; the merge proceeds without it.
pub fn merge_dir(dir: &Path) -> Result<Value> {
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut output = Value::Object(Map::new());
    for path in paths {
        match read_partial(&path) {
            Ok(value) => output = merge_values(output, value),
            Err(e) => tracing::warn!("{}", e),
        }
    }
    Ok(output)
}

fn read_partial(path: &Path) -> Result<Value> {
    let unreadable = |reason: String| HavocError::Merge {
        path: path.to_path_buf(),
        reason,
    };
    let text = fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| unreadable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_disjoint_keys_union() {
        let merged = merge_values(json!({"a": 1}), json!({"b": 2}));
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_nested_objects_union_recursively() {
        let merged = merge_values(json!({"a": {"x": 1}}), json!({"a": {"y": 2}}));
        assert_eq!(merged, json!({"a": {"x": 1, "y": 2}}));
    }

    #[test]
    fn test_scalar_conflict_later_wins() {
        let merged = merge_values(json!({"a": 1}), json!({"a": 2}));
        assert_eq!(merged, json!({"a": 2}));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let doc = json!({"a": {"x": 1}, "b": 2});
        assert_eq!(merge_values(doc.clone(), doc.clone()), doc);
    }

    #[test]
    fn test_merge_is_associative_on_disjoint_keys() {
        let a = json!({"a": 1});
        let b = json!({"b": 2});
        let c = json!({"c": 3});

        let left = merge_values(merge_values(a.clone(), b.clone()), c.clone());
        let right = merge_values(a, merge_values(b, c));
        assert_eq!(left, right);
    }

    #[test]
    fn test_merge_dir_skips_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("one.json"), r#"{"a": 1}"#).unwrap();
        fs::write(dir.path().join("two.json"), "not json at all").unwrap();
        fs::write(dir.path().join("three.json"), r#"{"b": 2}"#).unwrap();

        let merged = merge_dir(dir.path()).unwrap();
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }
}
