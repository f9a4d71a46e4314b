//! The update interpreter.
//!
//! Operations are applied to a private copy of the document. Containers are
//! unshared with `Arc::make_mut` only along the paths an operator touches, so
//! the result shares every other subtree with the input. On error the copy is
//! dropped and the caller's document is unchanged.

use crate::compare::{compare_values, equivalent};
use crate::error::{AssignError, Result};
use crate::operation::{BitOp, DateKind, Op, Operator, PopEnd, PushModifier, SortDirection, SortSpec, UpdateOperation};
use crate::path::{child_of, DocumentPath};
use crate::restorable::Restorable;
use crate::value::Value;
use chrono::{DateTime, SecondsFormat, Utc};
use std::cmp::Ordering;
use std::sync::Arc;

/// Apply one operation.
pub fn apply<T: Restorable>(document: &T, operation: &UpdateOperation) -> Result<T> {
    apply_at(document, std::slice::from_ref(operation), Utc::now())
}

/// Apply operations left to right.
pub fn apply_all<'a, T, I>(document: &T, operations: I) -> Result<T>
where
    T: Restorable,
    I: IntoIterator<Item = &'a UpdateOperation>,
{
    apply_at(document, operations, Utc::now())
}

/// Apply operations left to right with an explicit clock for `$currentDate`.
pub fn apply_at<'a, T, I>(document: &T, operations: I, now: DateTime<Utc>) -> Result<T>
where
    T: Restorable,
    I: IntoIterator<Item = &'a UpdateOperation>,
{
    let mut value = document.to_document()?;
    for operation in operations {
        for op in operation.ops() {
            run(&mut value, op, now)?;
        }
    }
    T::restore(value)
}

fn run(root: &mut Value, op: &Op, now: DateTime<Utc>) -> Result<()> {
    let operator = op.operator();
    match op {
        Op::Set(entries) => {
            for (path, value) in entries {
                let (parent, key) = parent_or_create(root, path, operator)?;
                set_child(parent, key, value.clone(), operator, path)?;
            }
        }
        Op::Unset(paths) => {
            for path in paths {
                let (parent, key) = existing_parent(root, path, operator)?;
                if let Some(parent) = parent {
                    remove_child(parent, key);
                }
            }
        }
        Op::Rename(entries) => {
            for (path, to) in entries {
                rename(root, path, to)?;
            }
        }
        Op::Inc(entries) | Op::Mul(entries) => {
            for (path, operand) in entries {
                let (parent, key) = parent_or_create(root, path, operator)?;
                let next = match child_of(parent, key) {
                    None if operator == Operator::Inc => *operand,
                    None => operand.zero_like(),
                    Some(current) => {
                        let current = current.as_number().ok_or_else(|| {
                            AssignError::invalid(
                                operator.name(),
                                path,
                                format!("cannot apply to a value of type {}", current.type_name()),
                            )
                        })?;
                        let result = if operator == Operator::Inc {
                            current.checked_add(*operand)
                        } else {
                            current.checked_mul(*operand)
                        };
                        result.ok_or_else(|| {
                            AssignError::invalid(operator.name(), path, "integer overflow")
                        })?
                    }
                };
                set_child(parent, key, Value::from(next), operator, path)?;
            }
        }
        Op::Min(entries) | Op::Max(entries) => {
            let wanted = if operator == Operator::Min {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            for (path, operand) in entries {
                let (parent, key) = parent_or_create(root, path, operator)?;
                let replace = child_of(parent, key)
                    .map_or(true, |current| compare_values(operand, current) == wanted);
                if replace {
                    set_child(parent, key, operand.clone(), operator, path)?;
                }
            }
        }
        Op::Bit(entries) => {
            for (path, ops) in entries {
                let (parent, key) = parent_or_create(root, path, operator)?;
                let current = match child_of(parent, key) {
                    None => 0,
                    Some(Value::Int(i)) => *i,
                    Some(other) => {
                        return Err(AssignError::invalid(
                            operator.name(),
                            path,
                            format!("cannot apply to a value of type {}", other.type_name()),
                        ))
                    }
                };
                let result = ops.iter().fold(current, |acc, op| match op {
                    BitOp::And(n) => acc & n,
                    BitOp::Or(n) => acc | n,
                    BitOp::Xor(n) => acc ^ n,
                });
                set_child(parent, key, Value::Int(result), operator, path)?;
            }
        }
        Op::CurrentDate(entries) => {
            for (path, kind) in entries {
                let stamp = match kind {
                    DateKind::Date => Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
                    DateKind::Timestamp => Value::Int(now.timestamp_millis()),
                };
                let (parent, key) = parent_or_create(root, path, operator)?;
                set_child(parent, key, stamp, operator, path)?;
            }
        }
        Op::Push(entries) => {
            for (path, modifier) in entries {
                let items = sequence_or_create(root, path, operator)?;
                push(items, modifier);
            }
        }
        Op::AddToSet(entries) => {
            for (path, values) in entries {
                let items = sequence_or_create(root, path, operator)?;
                for value in values {
                    if !items.iter().any(|item| equivalent(item, value)) {
                        items.push(value.clone());
                    }
                }
            }
        }
        Op::Pull(entries) => {
            for (path, condition) in entries {
                if let Some(items) = existing_sequence(root, path, operator)? {
                    items.retain(|item| !condition.matches(item));
                }
            }
        }
        Op::Pop(entries) => {
            for (path, end) in entries {
                if let Some(items) = existing_sequence(root, path, operator)? {
                    match end {
                        PopEnd::First if !items.is_empty() => {
                            items.remove(0);
                        }
                        PopEnd::Last => {
                            items.pop();
                        }
                        PopEnd::First => {}
                    }
                }
            }
        }
    }
    Ok(())
}

fn rename(root: &mut Value, path: &DocumentPath, to: &str) -> Result<()> {
    let target = if to.contains('.') {
        DocumentPath::parse(to)
    } else {
        match path.parent() {
            Some(parent) => parent.child(to),
            None => DocumentPath::parse(to),
        }
    };
    target.validate(Operator::Rename.name())?;
    if &target == path {
        return Ok(());
    }

    let (parent, key) = existing_parent(root, path, Operator::Rename)?;
    let Some(parent) = parent else {
        return Ok(());
    };
    if matches!(parent, Value::Array(_)) {
        return Err(AssignError::invalid(
            Operator::Rename.name(),
            path,
            "cannot rename a sequence element",
        ));
    }
    let Some(value) = remove_child(parent, key) else {
        return Ok(());
    };

    let (parent, key) = parent_or_create(root, &target, Operator::Rename)?;
    set_child(parent, key, value, Operator::Rename, &target)
}

fn push(items: &mut Vec<Value>, modifier: &PushModifier) {
    let len = items.len();
    let at = match modifier.position {
        None => len,
        Some(p) if p >= 0 => (p as usize).min(len),
        Some(p) => len.saturating_sub(p.unsigned_abs() as usize),
    };
    let tail = items.split_off(at);
    items.extend(modifier.each.iter().cloned());
    items.extend(tail);

    match &modifier.sort {
        Some(SortSpec::Elements(direction)) => {
            items.sort_by(|a, b| directed(compare_values(a, b), *direction))
        }
        Some(SortSpec::Keys(keys)) => items.sort_by(|a, b| {
            keys.iter().fold(Ordering::Equal, |ord, (key, direction)| {
                ord.then_with(|| {
                    let left = key.resolve(a).unwrap_or(&Value::Null);
                    let right = key.resolve(b).unwrap_or(&Value::Null);
                    directed(compare_values(left, right), *direction)
                })
            })
        }),
        None => {}
    }

    match modifier.slice {
        Some(n) if n >= 0 => items.truncate(n as usize),
        Some(n) => {
            let keep = n.unsigned_abs() as usize;
            if items.len() > keep {
                items.drain(..items.len() - keep);
            }
        }
        None => {}
    }
}

fn directed(ord: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Ascending => ord,
        SortDirection::Descending => ord.reverse(),
    }
}

/// Walk to the parent of `path`, creating missing intermediates as mappings.
fn parent_or_create<'a, 'p>(
    root: &'a mut Value,
    path: &'p DocumentPath,
    operator: Operator,
) -> Result<(&'a mut Value, &'p str)> {
    let (parent, key) = descend(root, path, operator, true)?;
    let parent = parent.ok_or_else(|| AssignError::invalid(operator.name(), path, "path not reachable"))?;
    Ok((parent, key))
}

/// Walk to the parent of `path` without creating anything.
fn existing_parent<'a, 'p>(
    root: &'a mut Value,
    path: &'p DocumentPath,
    operator: Operator,
) -> Result<(Option<&'a mut Value>, &'p str)> {
    descend(root, path, operator, false)
}

fn descend<'a, 'p>(
    root: &'a mut Value,
    path: &'p DocumentPath,
    operator: Operator,
    create: bool,
) -> Result<(Option<&'a mut Value>, &'p str)> {
    path.validate(operator.name())?;
    let Some((key, parents)) = path.segments().split_last() else {
        return Err(AssignError::invalid(operator.name(), path, "empty path"));
    };

    let mut node = root;
    for segment in parents {
        if child_of(node, segment).is_none() {
            if !create {
                return Ok((None, key));
            }
            set_child(node, segment, Value::empty_object(), operator, path)?;
        }
        node = match child_mut(node, segment) {
            Some(child) => child,
            None => return Ok((None, key)),
        };
    }
    Ok((Some(node), key))
}

fn sequence_or_create<'a>(
    root: &'a mut Value,
    path: &DocumentPath,
    operator: Operator,
) -> Result<&'a mut Vec<Value>> {
    let (parent, key) = parent_or_create(root, path, operator)?;
    if child_of(parent, key).is_none() {
        set_child(parent, key, Value::empty_array(), operator, path)?;
    }
    match child_mut(parent, key) {
        Some(leaf) => as_sequence(leaf, operator, path),
        None => Err(AssignError::invalid(operator.name(), path, "path not reachable")),
    }
}

fn existing_sequence<'a>(
    root: &'a mut Value,
    path: &DocumentPath,
    operator: Operator,
) -> Result<Option<&'a mut Vec<Value>>> {
    let (parent, key) = existing_parent(root, path, operator)?;
    match parent.and_then(|parent| child_mut(parent, key)) {
        Some(leaf) => as_sequence(leaf, operator, path).map(Some),
        None => Ok(None),
    }
}

fn as_sequence<'a>(
    leaf: &'a mut Value,
    operator: Operator,
    path: &DocumentPath,
) -> Result<&'a mut Vec<Value>> {
    match leaf {
        Value::Array(items) => Ok(Arc::make_mut(items)),
        other => Err(AssignError::invalid(
            operator.name(),
            path,
            format!("expected an array, found {}", other.type_name()),
        )),
    }
}

fn child_mut<'a>(node: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match node {
        Value::Object(map) => Arc::make_mut(map).get_mut(segment),
        Value::Array(items) => {
            let index = segment.parse::<usize>().ok()?;
            Arc::make_mut(items).get_mut(index)
        }
        _ => None,
    }
}

/// How many `Null`s a write past the end of a sequence may insert.
const MAX_PADDING: usize = 10_000;

fn set_child(
    node: &mut Value,
    segment: &str,
    value: Value,
    operator: Operator,
    path: &DocumentPath,
) -> Result<()> {
    match node {
        Value::Object(map) => {
            Arc::make_mut(map).insert(segment.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = segment.parse::<usize>().map_err(|_| {
                AssignError::invalid(
                    operator.name(),
                    path,
                    format!("cannot use field name {} inside an array", segment),
                )
            })?;
            let len = items.len();
            let end = index
                .checked_add(1)
                .filter(|end| *end <= len.saturating_add(MAX_PADDING))
                .ok_or_else(|| {
                    AssignError::invalid(operator.name(), path, "index out of range")
                })?;
            let items = Arc::make_mut(items);
            if end > len {
                items.resize(end, Value::Null);
            }
            items[index] = value;
            Ok(())
        }
        other => Err(AssignError::invalid(
            operator.name(),
            path,
            format!("cannot create field {} in a value of type {}", segment, other.type_name()),
        )),
    }
}

/// Remove a mapping entry. Sequence elements are replaced by `Null`.
fn remove_child(node: &mut Value, segment: &str) -> Option<Value> {
    match node {
        Value::Object(map) => {
            if !map.contains_key(segment) {
                return None;
            }
            Arc::make_mut(map).shift_remove(segment)
        }
        Value::Array(items) => {
            let index = segment.parse::<usize>().ok().filter(|i| *i < items.len())?;
            Some(std::mem::take(&mut Arc::make_mut(items)[index]))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use chrono::TimeZone;
    use serde_json::json;

    fn doc(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    fn op(json: serde_json::Value) -> UpdateOperation {
        UpdateOperation::from_value(&Value::from(json)).unwrap()
    }

    fn run_op(document: serde_json::Value, operation: serde_json::Value) -> Value {
        apply(&doc(document), &op(operation)).unwrap()
    }

    #[test]
    fn test_set_creates_intermediate_mappings() {
        let result = run_op(json!({}), json!({ "$set": { "a.b.c": 1 } }));
        assert_eq!(result, doc(json!({ "a": { "b": { "c": 1 } } })));
    }

    #[test]
    fn test_set_through_sequence_index() {
        let result = run_op(
            json!({ "items": [{ "v": 1 }, { "v": 2 }] }),
            json!({ "$set": { "items.1.v": 20 } }),
        );
        assert_eq!(result, doc(json!({ "items": [{ "v": 1 }, { "v": 20 }] })));
    }

    #[test]
    fn test_set_past_end_pads_with_null() {
        let result = run_op(json!({ "a": [1] }), json!({ "$set": { "a.3": 4 } }));
        assert_eq!(result, doc(json!({ "a": [1, null, null, 4] })));
    }

    #[test]
    fn test_set_far_past_end_is_out_of_range() {
        let input = doc(json!({ "a": [1] }));
        for path in ["a.18446744073709551615", "a.4000000000", "a.10002"] {
            let err = apply(&input, &UpdateOperation::new().set(path, 1));
            assert!(matches!(
                err,
                Err(AssignError::InvalidOperation { ref operator, ref path, ref reason })
                    if operator == "$set" && path.starts_with("a.") && reason == "index out of range"
            ));
        }
        assert_eq!(input, doc(json!({ "a": [1] })));

        let padded = apply(&input, &UpdateOperation::new().set("a.10000", 1)).unwrap();
        assert_eq!(padded.get("a").and_then(Value::as_array).map(<[Value]>::len), Some(10_001));
    }

    #[test]
    fn test_set_into_scalar_fails() {
        let err = apply(&doc(json!({ "a": 5 })), &op(json!({ "$set": { "a.b": 1 } })));
        assert!(matches!(
            err,
            Err(AssignError::InvalidOperation { ref operator, ref path, .. })
                if operator == "$set" && path == "a.b"
        ));
    }

    #[test]
    fn test_plain_document_is_an_implicit_set() {
        let result = run_op(json!({ "a": 1, "b": 2 }), json!({ "a": 10, "c": { "d": 3 } }));
        assert_eq!(result, doc(json!({ "a": 10, "b": 2, "c": { "d": 3 } })));
    }

    #[test]
    fn test_untouched_subtrees_are_shared() {
        let input = doc(json!({ "left": { "deep": [1, 2, 3] }, "right": { "n": 1 } }));
        let output = apply(&input, &op(json!({ "$inc": { "right.n": 1 } }))).unwrap();

        assert!(output.get("left").unwrap().shares_with(input.get("left").unwrap()));
        assert!(!output.get("right").unwrap().shares_with(input.get("right").unwrap()));
        assert_eq!(input, doc(json!({ "left": { "deep": [1, 2, 3] }, "right": { "n": 1 } })));
    }

    #[test]
    fn test_failed_operation_leaves_input_untouched() {
        let input = doc(json!({ "n": 1, "s": "text" }));
        let operation = UpdateOperation::new().inc("n", 1).inc("s", 1);
        assert!(apply(&input, &operation).is_err());
        assert_eq!(input, doc(json!({ "n": 1, "s": "text" })));
    }

    #[test]
    fn test_unset() {
        let result = run_op(
            json!({ "a": { "b": 1, "c": 2 }, "list": [1, 2, 3] }),
            json!({ "$unset": { "a.b": "", "list.1": "", "missing.x": "" } }),
        );
        assert_eq!(result, doc(json!({ "a": { "c": 2 }, "list": [1, null, 3] })));
    }

    #[test]
    fn test_rename_stays_under_the_parent() {
        let result = run_op(
            json!({ "baz": { "qux": "value" } }),
            json!({ "$rename": { "baz.qux": "foobar" } }),
        );
        assert_eq!(result, doc(json!({ "baz": { "foobar": "value" } })));
    }

    #[test]
    fn test_rename_to_a_dotted_path() {
        let result = run_op(
            json!({ "name": { "first": "a" }, "other": 1 }),
            json!({ "$rename": { "name.first": "profile.given" } }),
        );
        assert_eq!(result, doc(json!({ "name": {}, "other": 1, "profile": { "given": "a" } })));
    }

    #[test]
    fn test_rename_missing_field_is_a_noop() {
        let result = run_op(json!({ "a": 1 }), json!({ "$rename": { "b": "c" } }));
        assert_eq!(result, doc(json!({ "a": 1 })));
    }

    #[test]
    fn test_inc() {
        let result = run_op(
            json!({ "_id": 1, "sku": "abc123", "quantity": 10, "metrics": { "orders": 2, "ratings": 3.5 } }),
            json!({ "$inc": { "quantity": -2, "metrics.orders": 1 } }),
        );
        assert_eq!(
            result,
            doc(json!({ "_id": 1, "sku": "abc123", "quantity": 8, "metrics": { "orders": 3, "ratings": 3.5 } }))
        );
    }

    #[test]
    fn test_inc_creates_missing_field() {
        let result = run_op(json!({}), json!({ "$inc": { "count": 5 } }));
        assert_eq!(result, doc(json!({ "count": 5 })));
    }

    #[test]
    fn test_inc_overflow_fails() {
        let input = Value::object([("n", Value::Int(i64::MAX))]);
        let err = apply(&input, &UpdateOperation::new().inc("n", 1));
        assert!(matches!(err, Err(AssignError::InvalidOperation { .. })));
    }

    #[test]
    fn test_mul() {
        let result = run_op(
            json!({ "price": 10.99, "qty": 25 }),
            json!({ "$mul": { "price": 20.89, "qty": 2, "missing": 3 } }),
        );
        assert_eq!(
            result,
            doc(json!({ "price": 229.58110000000002, "qty": 50, "missing": 0 }))
        );
    }

    #[test]
    fn test_min_and_max() {
        let result = run_op(
            json!({ "low": 300, "high": 700 }),
            json!({ "$min": { "low": 150 }, "$max": { "high": 500, "fresh": 1 } }),
        );
        assert_eq!(result, doc(json!({ "low": 150, "high": 700, "fresh": 1 })));
    }

    #[test]
    fn test_bit_and() {
        let result = run_op(json!({ "flags": 1010 }), json!({ "$bit": { "flags": { "and": 101 } } }));
        assert_eq!(result.get("flags"), Some(&Value::Int(96)));

        let result = run_op(json!({}), json!({ "$bit": { "mask": { "or": 5, "xor": 1 } } }));
        assert_eq!(result.get("mask"), Some(&Value::Int(4)));
    }

    #[test]
    fn test_bit_on_float_fails() {
        let err = apply(
            &doc(json!({ "flags": 1.5 })),
            &op(json!({ "$bit": { "flags": { "or": 1 } } })),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_current_date() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let operation = UpdateOperation::new()
            .current_date("updatedAt", DateKind::Date)
            .current_date("stamp", DateKind::Timestamp);
        let result = apply_at(&Value::empty_object(), [&operation], now).unwrap();
        assert_eq!(result.get("updatedAt"), Some(&Value::from("2024-03-01T12:30:00.000Z")));
        assert_eq!(result.get("stamp"), Some(&Value::Int(1_709_296_200_000)));
    }

    #[test]
    fn test_push_bare_value() {
        let result = run_op(json!({ "tags": ["a"] }), json!({ "$push": { "tags": "b", "new": 1 } }));
        assert_eq!(result, doc(json!({ "tags": ["a", "b"], "new": [1] })));
    }

    #[test]
    fn test_push_sort_and_slice() {
        let result = run_op(
            json!({ "users": [{ "id": "user2" }, { "id": "user4" }, { "id": "user6" }] }),
            json!({ "$push": { "users": {
                "$each": [{ "id": "user1" }, { "id": "user3" }, { "id": "user5" }],
                "$sort": { "id": -1 },
                "$slice": 3
            }}}),
        );
        assert_eq!(
            result,
            doc(json!({ "users": [{ "id": "user6" }, { "id": "user5" }, { "id": "user4" }] }))
        );
    }

    #[test]
    fn test_push_position_and_slice() {
        let result = run_op(
            json!({ "users": [{ "id": "user2" }, { "id": "user4" }, { "id": "user6" }] }),
            json!({ "$push": { "users": {
                "$each": [{ "id": "user1" }, { "id": "user3" }, { "id": "user5" }],
                "$position": 1,
                "$slice": 3
            }}}),
        );
        assert_eq!(
            result,
            doc(json!({ "users": [{ "id": "user2" }, { "id": "user1" }, { "id": "user3" }] }))
        );
    }

    #[test]
    fn test_push_multi_key_sort() {
        let result = run_op(
            json!({ "users": [
                { "id": "c", "age": 30 },
                { "id": "a", "age": 40 }
            ]}),
            json!({ "$push": { "users": {
                "$each": [{ "id": "b", "age": 30 }],
                "$sort": { "age": -1, "id": 1 }
            }}}),
        );
        assert_eq!(
            result,
            doc(json!({ "users": [
                { "id": "a", "age": 40 },
                { "id": "b", "age": 30 },
                { "id": "c", "age": 30 }
            ]}))
        );
    }

    #[test]
    fn test_push_negative_position_and_slice() {
        let operation = UpdateOperation::new().push_with(
            "n",
            PushModifier::each(vec![Value::Int(9)]).position(-1).slice(-2),
        );
        let result = apply(&doc(json!({ "n": [1, 2, 3] })), &operation).unwrap();
        assert_eq!(result, doc(json!({ "n": [9, 3] })));

        let emptied = apply(
            &doc(json!({ "n": [1, 2, 3] })),
            &UpdateOperation::new().push_with("n", PushModifier::each(vec![]).slice(0)),
        )
        .unwrap();
        assert_eq!(emptied, doc(json!({ "n": [] })));
    }

    #[test]
    fn test_push_to_non_array_fails() {
        let err = apply(&doc(json!({ "n": 1 })), &UpdateOperation::new().push("n", 2));
        assert!(matches!(err, Err(AssignError::InvalidOperation { .. })));
    }

    #[test]
    fn test_add_to_set() {
        let result = run_op(
            json!({ "tags": ["electronics", "news"] }),
            json!({ "$addToSet": { "tags": { "$each": ["news", "sports", "sports"] } } }),
        );
        assert_eq!(result, doc(json!({ "tags": ["electronics", "news", "sports"] })));
    }

    #[test]
    fn test_add_to_set_compares_structurally() {
        let result = run_op(
            json!({ "pairs": [{ "a": 1, "b": 2 }] }),
            json!({ "$addToSet": { "pairs": { "b": 2, "a": 1 } } }),
        );
        assert_eq!(result, doc(json!({ "pairs": [{ "a": 1, "b": 2 }] })));
    }

    #[test]
    fn test_pull_by_value_and_condition() {
        let result = run_op(
            json!({ "fruits": ["apple", "pear", "apple"], "votes": [3, 5, 6, 7, 7, 8] }),
            json!({ "$pull": { "fruits": "apple", "votes": { "$gte": 6 }, "absent": 1 } }),
        );
        assert_eq!(result, doc(json!({ "fruits": ["pear"], "votes": [3, 5] })));
    }

    #[test]
    fn test_pull_where_fields_match() {
        let operation = UpdateOperation::new().pull_where(
            "results",
            Condition::parse(&doc(json!({ "score": 8, "item": "B" })), &"results".into()).unwrap(),
        );
        let result = apply(
            &doc(json!({ "results": [{ "item": "A", "score": 5 }, { "item": "B", "score": 8 }] })),
            &operation,
        )
        .unwrap();
        assert_eq!(result, doc(json!({ "results": [{ "item": "A", "score": 5 }] })));
    }

    #[test]
    fn test_pop() {
        let last = run_op(json!({ "scores": [8, 9, 10] }), json!({ "$pop": { "scores": 1 } }));
        assert_eq!(last, doc(json!({ "scores": [8, 9] })));
        let first = run_op(json!({ "scores": [8, 9, 10] }), json!({ "$pop": { "scores": -1 } }));
        assert_eq!(first, doc(json!({ "scores": [9, 10] })));
        let empty = run_op(json!({ "scores": [] }), json!({ "$pop": { "scores": -1 } }));
        assert_eq!(empty, doc(json!({ "scores": [] })));
    }

    #[test]
    fn test_apply_all_is_left_to_right() {
        let ops = [
            UpdateOperation::new().set("n", 2),
            UpdateOperation::new().mul("n", 10),
            UpdateOperation::new().inc("n", 1),
        ];
        let result = apply_all(&Value::empty_object(), &ops).unwrap();
        assert_eq!(result.get("n"), Some(&Value::Int(21)));
    }

    #[test]
    fn test_empty_path_segment_fails() {
        let err = apply(&Value::empty_object(), &UpdateOperation::new().set("a..b", 1));
        assert!(matches!(err, Err(AssignError::InvalidOperation { .. })));
    }
}
