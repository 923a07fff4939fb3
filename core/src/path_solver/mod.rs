// Copyright 2025 The TreeDb Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Dot-path utilities and resolution over an assembled [`Value`] tree.
//!
//! Paths are strings of dot-separated segments (`"a.b.c"`). A query name
//! may carry a `$` modifier suffix (`"a.b$keys"`, `"a.b$type"`) that is
//! applied after the base path resolves.

use crate::models::{PropertyMap, Value};

/// Query modifier appended after `$` in a path name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// Immediate child segments of the resolved value.
    Keys,
    /// Shape discriminator of the resolved value.
    Type,
    /// Anything else; resolves to absent.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathQuery<'a> {
    pub key: &'a str,
    pub modifier: Option<Modifier>,
}

/// Splits a query name into its base path and optional `$` modifier.
pub fn parse(name: &str) -> PathQuery<'_> {
    match name.split_once('$') {
        None => PathQuery {
            key: name,
            modifier: None,
        },
        Some((key, modifier)) => PathQuery {
            key,
            modifier: Some(match modifier {
                "keys" => Modifier::Keys,
                "type" => Modifier::Type,
                _ => Modifier::Unknown,
            }),
        },
    }
}

/// First dot-segment of a path.
pub fn root_key(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// Number of dot-segments in a path.
pub fn depth(name: &str) -> usize {
    if name.is_empty() {
        0
    } else {
        name.split('.').count()
    }
}

/// True when the two paths address overlapping subtrees: equal, or one is
/// a dot-prefix of the other.
pub fn is_related(a: &str, b: &str) -> bool {
    a == b || is_ancestor(a, b) || is_ancestor(b, a)
}

/// True when `ancestor` is a strict dot-prefix of `name`.
pub fn is_ancestor(ancestor: &str, name: &str) -> bool {
    name.len() > ancestor.len()
        && name.as_bytes()[ancestor.len()] == b'.'
        && name.starts_with(ancestor)
}

/// The remainder of `name` below `ancestor`. Caller guarantees the
/// ancestor relation holds.
pub fn relative<'a>(name: &'a str, ancestor: &str) -> &'a str {
    &name[ancestor.len() + 1..]
}

/// Joins a prefix and a name, tolerating an empty name.
pub fn join(prefix: &str, name: &str) -> String {
    if name.is_empty() {
        prefix.to_string()
    } else if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Reads the value at `path` inside `root`.
pub fn get_tree<'a>(root: &'a PropertyMap, path: &str) -> Option<&'a Value> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let value = root.get(head)?;
    match rest {
        None => Some(value),
        Some(rest) => get_tree(value.as_object()?, rest),
    }
}

/// Navigates a relative path below an already-resolved value.
pub fn descend<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    get_tree(value.as_object()?, path)
}

/// Writes `value` at `path` inside `root`, creating intermediate objects
/// and overwriting non-object intermediates.
pub fn set_tree(root: &mut PropertyMap, path: &str, value: Value) {
    match path.split_once('.') {
        None => root.insert(path, value),
        Some((head, rest)) => {
            if !matches!(root.get(head), Some(Value::Object(_))) {
                root.insert(head, Value::Object(PropertyMap::new()));
            }
            if let Some(Value::Object(child)) = root.get_mut(head) {
                set_tree(child, rest, value);
            }
        }
    }
}

/// Deletes the field at `path` inside `root`, pruning ancestor objects
/// that become empty. Returns whether anything was removed.
pub fn del_tree(root: &mut PropertyMap, path: &str) -> bool {
    match path.split_once('.') {
        None => root.remove(path).is_some(),
        Some((head, rest)) => {
            let child = match root.get_mut(head) {
                Some(Value::Object(child)) => child,
                _ => return false,
            };
            let changed = del_tree(child, rest);
            if changed && child.is_empty() {
                root.remove(head);
            }
            changed
        }
    }
}

/// Resolves a full query name (base path plus optional modifier) against
/// an assembled tree. An empty base path or unknown modifier is absent.
pub fn resolve(root: &PropertyMap, name: &str) -> Option<Value> {
    let query = parse(name);
    if query.key.is_empty() {
        return None;
    }
    let value = get_tree(root, query.key);
    match query.modifier {
        None => value.cloned(),
        Some(Modifier::Keys) => {
            let keys = value?.as_object()?.keys();
            Some(Value::List(
                keys.map(|k| Value::String(k.clone())).collect(),
            ))
        }
        Some(Modifier::Type) => value.map(|v| Value::from(v.type_name())),
        Some(Modifier::Unknown) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(json: serde_json::Value) -> PropertyMap {
        PropertyMap::from(&json)
    }

    #[test]
    fn parse_modifiers() {
        assert_eq!(
            parse("a.b"),
            PathQuery {
                key: "a.b",
                modifier: None
            }
        );
        assert_eq!(
            parse("a.b$keys"),
            PathQuery {
                key: "a.b",
                modifier: Some(Modifier::Keys)
            }
        );
        assert_eq!(
            parse("a$type"),
            PathQuery {
                key: "a",
                modifier: Some(Modifier::Type)
            }
        );
        assert_eq!(
            parse("$keys"),
            PathQuery {
                key: "",
                modifier: Some(Modifier::Keys)
            }
        );
        assert_eq!(parse("a$bogus").modifier, Some(Modifier::Unknown));
    }

    #[test]
    fn key_relations() {
        assert!(is_related("a.b", "a.b"));
        assert!(is_related("a", "a.b"));
        assert!(is_related("a.b.c", "a.b"));
        assert!(!is_related("a", "ab"));
        assert!(!is_related("a.b", "a.c"));
        assert!(is_ancestor("a", "a.b"));
        assert!(!is_ancestor("a.b", "a.b"));
        assert!(!is_ancestor("a", "ab.c"));
        assert_eq!(relative("a.b.c", "a"), "b.c");
        assert_eq!(root_key("a.b.c"), "a");
        assert_eq!(depth("a.b.c"), 3);
        assert_eq!(depth(""), 0);
    }

    #[test]
    fn join_paths() {
        assert_eq!(join("a", "b.c"), "a.b.c");
        assert_eq!(join("a", ""), "a");
        assert_eq!(join("", "b"), "b");
    }

    #[test]
    fn get_and_set() {
        let mut root = PropertyMap::new();
        set_tree(&mut root, "a.b.c", Value::from(3i64));
        assert_eq!(get_tree(&root, "a.b.c"), Some(&Value::from(3i64)));
        assert!(matches!(get_tree(&root, "a.b"), Some(Value::Object(_))));
        assert_eq!(get_tree(&root, "a.x"), None);
        assert_eq!(get_tree(&root, "a.b.c.d"), None);

        // overwriting a scalar intermediate replaces it with an object
        set_tree(&mut root, "a.b.c.d", Value::from(4i64));
        assert_eq!(get_tree(&root, "a.b.c.d"), Some(&Value::from(4i64)));
    }

    #[test]
    fn del_prunes_empty_ancestors() {
        let mut root = tree(json!({ "a": { "b": { "c": 3 } }, "x": 1 }));
        assert!(del_tree(&mut root, "a.b.c"));
        assert_eq!(get_tree(&root, "a"), None);
        assert_eq!(get_tree(&root, "x"), Some(&Value::from(1i64)));
    }

    #[test]
    fn del_keeps_populated_ancestors() {
        let mut root = tree(json!({ "a": { "b": { "c": 3, "d": 4 } } }));
        assert!(del_tree(&mut root, "a.b.c"));
        assert_eq!(get_tree(&root, "a.b.d"), Some(&Value::from(4i64)));
    }

    #[test]
    fn del_missing_is_noop() {
        let mut root = tree(json!({ "a": { "b": 1 } }));
        assert!(!del_tree(&mut root, "a.c"));
        assert!(!del_tree(&mut root, "a.b.c"));
        assert!(!del_tree(&mut root, "x"));
        assert_eq!(get_tree(&root, "a.b"), Some(&Value::from(1i64)));
    }

    #[test]
    fn resolve_plain_and_modifiers() {
        let root = tree(json!({ "a": { "b": { "c": 3 } }, "s": "text" }));
        assert_eq!(resolve(&root, "a.b.c"), Some(Value::from(3i64)));
        assert_eq!(resolve(&root, "missing"), None);
        assert_eq!(
            resolve(&root, "a.b$keys"),
            Some(Value::List(vec![Value::from("c")]))
        );
        assert_eq!(resolve(&root, "s$keys"), None);
        assert_eq!(resolve(&root, "a$type"), Some(Value::from("object")));
        assert_eq!(resolve(&root, "s$type"), Some(Value::from("string")));
        assert_eq!(resolve(&root, "missing$type"), None);
        assert_eq!(resolve(&root, "a$bogus"), None);
        assert_eq!(resolve(&root, ""), None);
    }
}
