//! 🔬 Change detection: strip what we don't sync, then compare what's left.

use serde_json::Value;

/// 🧹 Clone `instance` without the excluded dotted paths.
pub fn strip_excluded(instance: &Value, excluded: &[&str]) -> Value {
    let mut stripped = instance.clone();
    for path in excluded {
        remove_path(&mut stripped, path);
    }
    stripped
}

fn remove_path(value: &mut Value, path: &str) {
    match path.split_once('.') {
        None => {
            if let Value::Object(map) = value {
                map.remove(path);
            }
        }
        Some((head, rest)) => {
            if let Some(child) = value.get_mut(head) {
                remove_path(child, rest);
            }
        }
    }
}

/// ⚖️ True when the two differ once excluded attributes are out of the picture.
pub fn differs(source: &Value, destination: &Value, excluded: &[&str]) -> bool {
    strip_excluded(source, excluded) != strip_excluded(destination, excluded)
}

/// 🗺️ Dotted paths where the two sides disagree, excluded attributes ignored.
/// Arrays are compared whole; a reordered list is a changed list.
pub fn diff_paths(source: &Value, destination: &Value, excluded: &[&str]) -> Vec<String> {
    let mut paths = Vec::new();
    collect(
        &strip_excluded(source, excluded),
        &strip_excluded(destination, excluded),
        "",
        &mut paths,
    );
    paths
}

fn collect(left: &Value, right: &Value, prefix: &str, out: &mut Vec<String>) {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            let mut keys: Vec<&String> = l.keys().chain(r.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                match (l.get(key), r.get(key)) {
                    (Some(a), Some(b)) => collect(a, b, &path, out),
                    _ => out.push(path),
                }
            }
        }
        (a, b) if a != b => out.push(if prefix.is_empty() {
            "<root>".to_string()
        } else {
            prefix.to_string()
        }),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_generated_secrets_dont_count_as_changes() {
        let source = json!({"account_id": "1", "host_tags": ["a"], "external_id": "src"});
        let dest = json!({"account_id": "1", "host_tags": ["a"], "external_id": "dst", "errors": []});
        assert!(!differs(&source, &dest, &["external_id", "errors"]));
        assert!(differs(&source, &dest, &[]));
    }

    #[test]
    fn the_one_where_nested_paths_get_stripped_too() {
        let value = json!({"attributes": {"meta": {"x": 1}, "name": "n"}});
        assert_eq!(
            strip_excluded(&value, &["attributes.meta", "not.there"]),
            json!({"attributes": {"name": "n"}})
        );
    }

    #[test]
    fn the_one_where_diffs_point_at_the_exact_spot() {
        let source = json!({"a": 1, "b": {"c": 2, "d": [1, 2]}, "only_src": true});
        let dest = json!({"a": 1, "b": {"c": 3, "d": [2, 1]}, "only_dst": true});
        assert_eq!(
            diff_paths(&source, &dest, &[]),
            vec!["b.c", "b.d", "only_dst", "only_src"]
        );
    }
}
