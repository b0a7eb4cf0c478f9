//! Tiny path-addressed JSON patch helpers. Request bodies flow as opaque
//! bytes through the pipeline and every stage here only ever touches a
//! handful of dotted paths, so a full typed tree is unwarranted — see
//! design note §9 ("dynamic JSON manipulation").

use serde_json::Value;

/// Reads a dotted path (`"a.b.c"`) out of a JSON value.
pub fn get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = value;
    for segment in path.split('.') {
        cur = cur.as_object()?.get(segment)?;
    }
    Some(cur)
}

/// Writes a value at a dotted path, creating intermediate objects as needed.
/// No-op if an intermediate segment exists but isn't an object.
pub fn set(value: &mut Value, path: &str, new_value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    set_inner(value, &segments, new_value);
}

fn set_inner(value: &mut Value, segments: &[&str], new_value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if !value.is_object() {
        *value = Value::Object(serde_json::Map::new());
    }
    let obj = value.as_object_mut().expect("just ensured object");
    if rest.is_empty() {
        obj.insert((*head).to_string(), new_value);
        return;
    }
    let entry = obj
        .entry((*head).to_string())
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    set_inner(entry, rest, new_value);
}

/// Deletes the value at a dotted path, if present. Sibling fields and empty
/// parent objects are left untouched.
pub fn delete(value: &mut Value, path: &str) {
    let segments: Vec<&str> = path.split('.').collect();
    delete_inner(value, &segments);
}

fn delete_inner(value: &mut Value, segments: &[&str]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    let Some(obj) = value.as_object_mut() else {
        return;
    };
    if rest.is_empty() {
        obj.remove(*head);
        return;
    }
    if let Some(child) = obj.get_mut(*head) {
        delete_inner(child, rest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_creates_intermediate_objects() {
        let mut v = json!({});
        set(&mut v, "a.b.c", json!(42));
        assert_eq!(v, json!({"a": {"b": {"c": 42}}}));
    }

    #[test]
    fn set_preserves_siblings() {
        let mut v = json!({"a": {"x": 1}});
        set(&mut v, "a.b", json!(2));
        assert_eq!(v, json!({"a": {"x": 1, "b": 2}}));
    }

    #[test]
    fn delete_removes_leaf_only() {
        let mut v = json!({"a": {"b": 1, "c": 2}});
        delete(&mut v, "a.b");
        assert_eq!(v, json!({"a": {"c": 2}}));
    }

    #[test]
    fn get_returns_none_for_missing_path() {
        let v = json!({"a": {"b": 1}});
        assert!(get(&v, "a.c").is_none());
        assert!(get(&v, "x.y").is_none());
    }
}
