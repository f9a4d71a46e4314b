//! Element predicates for `$pull`.
//!
//! A small matcher, not a query language: equality, membership, range
//! comparison, and per-field conditions for mapping elements.

use crate::compare::{compare_values, equivalent, same_bracket};
use crate::error::{AssignError, Result};
use crate::path::DocumentPath;
use crate::value::Value;
use std::cmp::Ordering;

/// Comparison operator inside a condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    pub fn name(self) -> &'static str {
        match self {
            Comparison::Eq => "$eq",
            Comparison::Ne => "$ne",
            Comparison::Gt => "$gt",
            Comparison::Gte => "$gte",
            Comparison::Lt => "$lt",
            Comparison::Lte => "$lte",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "$eq" => Comparison::Eq,
            "$ne" => Comparison::Ne,
            "$gt" => Comparison::Gt,
            "$gte" => Comparison::Gte,
            "$lt" => Comparison::Lt,
            "$lte" => Comparison::Lte,
            _ => return None,
        })
    }

    fn holds(self, actual: &Value, operand: &Value) -> bool {
        match self {
            Comparison::Eq => equivalent(actual, operand),
            Comparison::Ne => !equivalent(actual, operand),
            _ if !same_bracket(actual, operand) => false,
            Comparison::Gt => compare_values(actual, operand) == Ordering::Greater,
            Comparison::Gte => compare_values(actual, operand) != Ordering::Less,
            Comparison::Lt => compare_values(actual, operand) == Ordering::Less,
            Comparison::Lte => compare_values(actual, operand) != Ordering::Greater,
        }
    }
}

/// Predicate over sequence elements.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// Element equals the value.
    Equals(Value),
    /// Element equals one of the values.
    In(Vec<Value>),
    /// Element equals none of the values.
    NotIn(Vec<Value>),
    /// Element compares with the value.
    Compare(Comparison, Value),
    /// Every condition holds.
    All(Vec<Condition>),
    /// Element is a mapping whose fields satisfy the conditions.
    Fields(Vec<(DocumentPath, Condition)>),
}

impl Condition {
    /// Parse a `$pull` operand.
    pub fn parse(operand: &Value, path: &DocumentPath) -> Result<Self> {
        let Some(map) = operand.as_object() else {
            return Ok(Condition::Equals(operand.clone()));
        };
        let operator_keys = map.keys().filter(|k| k.starts_with('$')).count();
        if operator_keys == 0 {
            if map.is_empty() {
                return Ok(Condition::Equals(operand.clone()));
            }
            let fields = map
                .iter()
                .map(|(k, v)| Ok((DocumentPath::parse(k), Condition::parse(v, path)?)))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Condition::Fields(fields));
        }
        if operator_keys != map.len() {
            return Err(AssignError::invalid(
                "$pull",
                path,
                "condition mixes operators and field names",
            ));
        }

        let mut parts = Vec::with_capacity(map.len());
        for (key, arg) in map.iter() {
            let part = match key.as_str() {
                "$in" | "$nin" => {
                    let items = arg.as_array().ok_or_else(|| {
                        AssignError::invalid("$pull", path, format!("{} needs an array", key))
                    })?;
                    if key == "$in" {
                        Condition::In(items.to_vec())
                    } else {
                        Condition::NotIn(items.to_vec())
                    }
                }
                other => match Comparison::from_name(other) {
                    Some(cmp) => Condition::Compare(cmp, arg.clone()),
                    None => {
                        return Err(AssignError::invalid(
                            "$pull",
                            path,
                            format!("unsupported condition operator {}", other),
                        ))
                    }
                },
            };
            parts.push(part);
        }
        Ok(match parts.len() {
            1 => match parts.remove(0) {
                Condition::Compare(Comparison::Eq, value) => Condition::Equals(value),
                part => part,
            },
            _ => Condition::All(parts),
        })
    }

    /// Check an element against the condition.
    pub fn matches(&self, element: &Value) -> bool {
        match self {
            Condition::Equals(value) => equivalent(element, value),
            Condition::In(values) => values.iter().any(|v| equivalent(element, v)),
            Condition::NotIn(values) => !values.iter().any(|v| equivalent(element, v)),
            Condition::Compare(cmp, value) => cmp.holds(element, value),
            Condition::All(parts) => parts.iter().all(|p| p.matches(element)),
            Condition::Fields(fields) => {
                element.as_object().is_some()
                    && fields.iter().all(|(field, cond)| {
                        let actual = field.resolve(element).unwrap_or(&Value::Null);
                        cond.matches(actual)
                    })
            }
        }
    }

    /// Wire form of the condition.
    pub fn to_value(&self) -> Value {
        match self {
            // A bare non-empty mapping would read back as field conditions.
            Condition::Equals(value) if value.as_object().map_or(false, |m| !m.is_empty()) => {
                Value::object([("$eq", value.clone())])
            }
            Condition::Equals(value) => value.clone(),
            Condition::In(values) => Value::object([("$in", Value::array(values.clone()))]),
            Condition::NotIn(values) => Value::object([("$nin", Value::array(values.clone()))]),
            Condition::Compare(cmp, value) => Value::object([(cmp.name(), value.clone())]),
            Condition::All(parts) => Value::object(parts.iter().flat_map(|p| {
                p.to_value()
                    .as_object()
                    .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Vec<_>>())
                    .unwrap_or_default()
            })),
            Condition::Fields(fields) => Value::object(
                fields
                    .iter()
                    .map(|(field, cond)| (field.to_string(), cond.to_value())),
            ),
        }
    }
}
