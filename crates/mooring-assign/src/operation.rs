//! Update operations.
//!
//! An [`UpdateOperation`] maps operators to per-path operands. It is kept in
//! canonical form (one entry per operator, operators in a fixed order, paths
//! sorted) so two operations expressing the same change compare equal.
//!
//! Wire form is a JSON object keyed by operator name:
//!
//! ```text
//! { "$set": { "name.first": "nao" }, "$inc": { "age": 1 } }
//! ```
//!
//! An object with no operator keys is an implicit `$set` of its fields.

use crate::condition::Condition;
use crate::error::{AssignError, Result};
use crate::path::DocumentPath;
use crate::value::{Number, Value};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

/// The closed set of update operators.
///
/// Variant order is the order operators run in within one operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operator {
    Set,
    Unset,
    Rename,
    Inc,
    Mul,
    Min,
    Max,
    Bit,
    CurrentDate,
    Push,
    AddToSet,
    Pull,
    Pop,
}

impl Operator {
    pub const ALL: [Operator; 13] = [
        Operator::Set,
        Operator::Unset,
        Operator::Rename,
        Operator::Inc,
        Operator::Mul,
        Operator::Min,
        Operator::Max,
        Operator::Bit,
        Operator::CurrentDate,
        Operator::Push,
        Operator::AddToSet,
        Operator::Pull,
        Operator::Pop,
    ];

    /// Wire name, e.g. `"$addToSet"`.
    pub fn name(self) -> &'static str {
        match self {
            Operator::Set => "$set",
            Operator::Unset => "$unset",
            Operator::Rename => "$rename",
            Operator::Inc => "$inc",
            Operator::Mul => "$mul",
            Operator::Min => "$min",
            Operator::Max => "$max",
            Operator::Bit => "$bit",
            Operator::CurrentDate => "$currentDate",
            Operator::Push => "$push",
            Operator::AddToSet => "$addToSet",
            Operator::Pull => "$pull",
            Operator::Pop => "$pop",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Operator::ALL.into_iter().find(|op| op.name() == name)
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Sort direction: `1` ascending, `-1` descending.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    fn parse(value: &Value, path: &DocumentPath) -> Result<Self> {
        match value.as_f64() {
            Some(d) if d == 1.0 => Ok(SortDirection::Ascending),
            Some(d) if d == -1.0 => Ok(SortDirection::Descending),
            _ => Err(AssignError::invalid(
                Operator::Push.name(),
                path,
                format!("sort direction must be 1 or -1, got {}", value),
            )),
        }
    }

    fn to_value(self) -> Value {
        match self {
            SortDirection::Ascending => Value::Int(1),
            SortDirection::Descending => Value::Int(-1),
        }
    }
}

/// `$sort` modifier of `$push`.
#[derive(Clone, Debug, PartialEq)]
pub enum SortSpec {
    /// Sort whole elements.
    Elements(SortDirection),
    /// Sort mapping elements by keys; later keys break ties.
    Keys(Vec<(DocumentPath, SortDirection)>),
}

/// Operand of `$push`.
#[derive(Clone, Debug, PartialEq)]
pub struct PushModifier {
    pub each: Vec<Value>,
    pub position: Option<i64>,
    pub slice: Option<i64>,
    pub sort: Option<SortSpec>,
}

impl PushModifier {
    /// Push a single value.
    pub fn value(value: impl Into<Value>) -> Self {
        Self::each(vec![value.into()])
    }

    /// Push several values.
    pub fn each(values: Vec<Value>) -> Self {
        Self {
            each: values,
            position: None,
            slice: None,
            sort: None,
        }
    }

    pub fn position(mut self, position: i64) -> Self {
        self.position = Some(position);
        self
    }

    pub fn slice(mut self, slice: i64) -> Self {
        self.slice = Some(slice);
        self
    }

    /// Sort whole elements.
    pub fn sort(mut self, direction: SortDirection) -> Self {
        self.sort = Some(SortSpec::Elements(direction));
        self
    }

    /// Add a sort key.
    pub fn sort_by(mut self, key: impl Into<DocumentPath>, direction: SortDirection) -> Self {
        match &mut self.sort {
            Some(SortSpec::Keys(keys)) => keys.push((key.into(), direction)),
            _ => self.sort = Some(SortSpec::Keys(vec![(key.into(), direction)])),
        }
        self
    }

    fn is_plain(&self) -> bool {
        self.each.len() == 1
            && !has_operator_keys(&self.each[0])
            && self.position.is_none()
            && self.slice.is_none()
            && self.sort.is_none()
    }

    fn parse(operand: &Value, path: &DocumentPath) -> Result<Self> {
        let Some(map) = operand.as_object().filter(|m| m.contains_key("$each")) else {
            if has_operator_keys(operand) {
                return Err(AssignError::invalid(
                    Operator::Push.name(),
                    path,
                    "modifiers require $each",
                ));
            }
            return Ok(Self::value(operand.clone()));
        };

        let each = map
            .get("$each")
            .and_then(Value::as_array)
            .ok_or_else(|| AssignError::invalid(Operator::Push.name(), path, "$each must be an array"))?
            .to_vec();
        let mut modifier = Self::each(each);

        for (key, arg) in map.iter() {
            match key.as_str() {
                "$each" => {}
                "$position" => modifier.position = Some(integer(arg, Operator::Push, path, key)?),
                "$slice" => modifier.slice = Some(integer(arg, Operator::Push, path, key)?),
                "$sort" => {
                    modifier.sort = Some(match arg.as_object() {
                        Some(keys) => SortSpec::Keys(
                            keys.iter()
                                .map(|(k, d)| Ok((DocumentPath::parse(k), SortDirection::parse(d, path)?)))
                                .collect::<Result<Vec<_>>>()?,
                        ),
                        None => SortSpec::Elements(SortDirection::parse(arg, path)?),
                    })
                }
                other => {
                    return Err(AssignError::invalid(
                        Operator::Push.name(),
                        path,
                        format!("unknown modifier {}", other),
                    ))
                }
            }
        }
        Ok(modifier)
    }

    fn to_value(&self) -> Value {
        if self.is_plain() {
            return self.each[0].clone();
        }
        let mut entries = vec![("$each".to_string(), Value::array(self.each.clone()))];
        if let Some(position) = self.position {
            entries.push(("$position".to_string(), Value::Int(position)));
        }
        if let Some(slice) = self.slice {
            entries.push(("$slice".to_string(), Value::Int(slice)));
        }
        match &self.sort {
            Some(SortSpec::Elements(direction)) => {
                entries.push(("$sort".to_string(), direction.to_value()))
            }
            Some(SortSpec::Keys(keys)) => entries.push((
                "$sort".to_string(),
                Value::object(keys.iter().map(|(k, d)| (k.to_string(), d.to_value()))),
            )),
            None => {}
        }
        Value::object(entries)
    }
}

/// Bitwise operand of `$bit`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitOp {
    And(i64),
    Or(i64),
    Xor(i64),
}

/// What `$currentDate` writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateKind {
    /// RFC 3339 string.
    Date,
    /// Milliseconds since the epoch.
    Timestamp,
}

/// Which end `$pop` removes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PopEnd {
    /// `-1`
    First,
    /// `1`
    Last,
}

/// One operator with its per-path operands.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Set(BTreeMap<DocumentPath, Value>),
    Unset(BTreeSet<DocumentPath>),
    Rename(BTreeMap<DocumentPath, String>),
    Inc(BTreeMap<DocumentPath, Number>),
    Mul(BTreeMap<DocumentPath, Number>),
    Min(BTreeMap<DocumentPath, Value>),
    Max(BTreeMap<DocumentPath, Value>),
    Bit(BTreeMap<DocumentPath, Vec<BitOp>>),
    CurrentDate(BTreeMap<DocumentPath, DateKind>),
    Push(BTreeMap<DocumentPath, PushModifier>),
    AddToSet(BTreeMap<DocumentPath, Vec<Value>>),
    Pull(BTreeMap<DocumentPath, Condition>),
    Pop(BTreeMap<DocumentPath, PopEnd>),
}

impl Op {
    pub fn operator(&self) -> Operator {
        match self {
            Op::Set(_) => Operator::Set,
            Op::Unset(_) => Operator::Unset,
            Op::Rename(_) => Operator::Rename,
            Op::Inc(_) => Operator::Inc,
            Op::Mul(_) => Operator::Mul,
            Op::Min(_) => Operator::Min,
            Op::Max(_) => Operator::Max,
            Op::Bit(_) => Operator::Bit,
            Op::CurrentDate(_) => Operator::CurrentDate,
            Op::Push(_) => Operator::Push,
            Op::AddToSet(_) => Operator::AddToSet,
            Op::Pull(_) => Operator::Pull,
            Op::Pop(_) => Operator::Pop,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Op::Set(m) | Op::Min(m) | Op::Max(m) => m.is_empty(),
            Op::Unset(s) => s.is_empty(),
            Op::Rename(m) => m.is_empty(),
            Op::Inc(m) | Op::Mul(m) => m.is_empty(),
            Op::Bit(m) => m.is_empty(),
            Op::CurrentDate(m) => m.is_empty(),
            Op::Push(m) => m.is_empty(),
            Op::AddToSet(m) => m.is_empty(),
            Op::Pull(m) => m.is_empty(),
            Op::Pop(m) => m.is_empty(),
        }
    }

    /// Paths the op addresses. `$rename` targets are not included.
    pub fn paths(&self) -> Vec<&DocumentPath> {
        match self {
            Op::Set(m) | Op::Min(m) | Op::Max(m) => m.keys().collect(),
            Op::Unset(s) => s.iter().collect(),
            Op::Rename(m) => m.keys().collect(),
            Op::Inc(m) | Op::Mul(m) => m.keys().collect(),
            Op::Bit(m) => m.keys().collect(),
            Op::CurrentDate(m) => m.keys().collect(),
            Op::Push(m) => m.keys().collect(),
            Op::AddToSet(m) => m.keys().collect(),
            Op::Pull(m) => m.keys().collect(),
            Op::Pop(m) => m.keys().collect(),
        }
    }

    /// Fold another op of the same operator into this one.
    fn absorb(&mut self, other: Op) {
        match (self, other) {
            (Op::Set(a), Op::Set(b)) => a.extend(b),
            (Op::Unset(a), Op::Unset(b)) => a.extend(b),
            (Op::Rename(a), Op::Rename(b)) => a.extend(b),
            (Op::Inc(a), Op::Inc(b)) => a.extend(b),
            (Op::Mul(a), Op::Mul(b)) => a.extend(b),
            (Op::Min(a), Op::Min(b)) => a.extend(b),
            (Op::Max(a), Op::Max(b)) => a.extend(b),
            (Op::Bit(a), Op::Bit(b)) => a.extend(b),
            (Op::CurrentDate(a), Op::CurrentDate(b)) => a.extend(b),
            (Op::Push(a), Op::Push(b)) => a.extend(b),
            (Op::AddToSet(a), Op::AddToSet(b)) => a.extend(b),
            (Op::Pull(a), Op::Pull(b)) => a.extend(b),
            (Op::Pop(a), Op::Pop(b)) => a.extend(b),
            // Callers pair ops by operator, so this only replaces like with like.
            (slot, other) => *slot = other,
        }
    }

    fn parse(operator: Operator, payload: &Value) -> Result<Self> {
        let map = payload.as_object().ok_or_else(|| {
            AssignError::MalformedOperation(format!(
                "{} expects a mapping of paths, got {}",
                operator,
                payload.type_name()
            ))
        })?;
        let entries = map.iter().map(|(k, v)| (DocumentPath::parse(k), v));

        Ok(match operator {
            Operator::Set => Op::Set(entries.map(|(p, v)| (p, v.clone())).collect()),
            Operator::Min => Op::Min(entries.map(|(p, v)| (p, v.clone())).collect()),
            Operator::Max => Op::Max(entries.map(|(p, v)| (p, v.clone())).collect()),
            Operator::Unset => Op::Unset(entries.map(|(p, _)| p).collect()),
            Operator::Rename => Op::Rename(
                entries
                    .map(|(p, v)| match v.as_str() {
                        Some(to) => Ok((p, to.to_string())),
                        None => Err(AssignError::invalid(operator.name(), &p, "new name must be a string")),
                    })
                    .collect::<Result<_>>()?,
            ),
            Operator::Inc | Operator::Mul => {
                let numbers = entries
                    .map(|(p, v)| match v.as_number() {
                        Some(n) => Ok((p, n)),
                        None => Err(AssignError::invalid(
                            operator.name(),
                            &p,
                            format!("operand must be a number, got {}", v.type_name()),
                        )),
                    })
                    .collect::<Result<_>>()?;
                if operator == Operator::Inc {
                    Op::Inc(numbers)
                } else {
                    Op::Mul(numbers)
                }
            }
            Operator::Bit => Op::Bit(
                entries
                    .map(|(p, v)| Ok((p.clone(), parse_bit_ops(v, &p)?)))
                    .collect::<Result<_>>()?,
            ),
            Operator::CurrentDate => Op::CurrentDate(
                entries
                    .map(|(p, v)| Ok((p.clone(), parse_date_kind(v, &p)?)))
                    .collect::<Result<_>>()?,
            ),
            Operator::Push => Op::Push(
                entries
                    .map(|(p, v)| Ok((p.clone(), PushModifier::parse(v, &p)?)))
                    .collect::<Result<_>>()?,
            ),
            Operator::AddToSet => Op::AddToSet(
                entries
                    .map(|(p, v)| Ok((p.clone(), parse_add_to_set(v, &p)?)))
                    .collect::<Result<_>>()?,
            ),
            Operator::Pull => Op::Pull(
                entries
                    .map(|(p, v)| Ok((p.clone(), Condition::parse(v, &p)?)))
                    .collect::<Result<_>>()?,
            ),
            Operator::Pop => Op::Pop(
                entries
                    .map(|(p, v)| match v.as_f64() {
                        Some(d) if d == 1.0 => Ok((p, PopEnd::Last)),
                        Some(d) if d == -1.0 => Ok((p, PopEnd::First)),
                        _ => Err(AssignError::invalid(operator.name(), &p, "operand must be 1 or -1")),
                    })
                    .collect::<Result<_>>()?,
            ),
        })
    }

    fn payload(&self) -> Value {
        fn entries<'a, T: 'a>(
            map: &'a BTreeMap<DocumentPath, T>,
            f: impl Fn(&T) -> Value + 'a,
        ) -> Value {
            Value::object(map.iter().map(|(p, v)| (p.to_string(), f(v))))
        }

        match self {
            Op::Set(m) | Op::Min(m) | Op::Max(m) => entries(m, Value::clone),
            Op::Unset(paths) => {
                Value::object(paths.iter().map(|p| (p.to_string(), Value::from(""))))
            }
            Op::Rename(m) => entries(m, |to| Value::from(to.as_str())),
            Op::Inc(m) | Op::Mul(m) => entries(m, |n| Value::from(*n)),
            Op::Bit(m) => entries(m, |ops| {
                Value::object(ops.iter().map(|op| match op {
                    BitOp::And(n) => ("and", Value::Int(*n)),
                    BitOp::Or(n) => ("or", Value::Int(*n)),
                    BitOp::Xor(n) => ("xor", Value::Int(*n)),
                }))
            }),
            Op::CurrentDate(m) => entries(m, |kind| match kind {
                DateKind::Date => Value::Bool(true),
                DateKind::Timestamp => Value::object([("$type", Value::from("timestamp"))]),
            }),
            Op::Push(m) => entries(m, PushModifier::to_value),
            Op::AddToSet(m) => entries(m, |values| {
                if values.len() == 1 && !has_operator_keys(&values[0]) {
                    values[0].clone()
                } else {
                    Value::object([("$each", Value::array(values.clone()))])
                }
            }),
            Op::Pull(m) => entries(m, Condition::to_value),
            Op::Pop(m) => entries(m, |end| match end {
                PopEnd::First => Value::Int(-1),
                PopEnd::Last => Value::Int(1),
            }),
        }
    }
}

fn has_operator_keys(value: &Value) -> bool {
    value
        .as_object()
        .map_or(false, |m| m.keys().any(|k| k.starts_with('$')))
}

fn integer(value: &Value, operator: Operator, path: &DocumentPath, what: &str) -> Result<i64> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
        _ => Err(AssignError::invalid(
            operator.name(),
            path,
            format!("{} must be an integer", what),
        )),
    }
}

fn parse_bit_ops(value: &Value, path: &DocumentPath) -> Result<Vec<BitOp>> {
    let map = value
        .as_object()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| AssignError::invalid(Operator::Bit.name(), path, "expects {and|or|xor: int}"))?;
    map.iter()
        .map(|(key, arg)| {
            let n = integer(arg, Operator::Bit, path, key)?;
            match key.as_str() {
                "and" => Ok(BitOp::And(n)),
                "or" => Ok(BitOp::Or(n)),
                "xor" => Ok(BitOp::Xor(n)),
                other => Err(AssignError::invalid(
                    Operator::Bit.name(),
                    path,
                    format!("unknown bitwise operator {}", other),
                )),
            }
        })
        .collect()
}

fn parse_date_kind(value: &Value, path: &DocumentPath) -> Result<DateKind> {
    match value {
        Value::Bool(true) => Ok(DateKind::Date),
        Value::Object(map) => match map.get("$type").and_then(Value::as_str) {
            Some("date") => Ok(DateKind::Date),
            Some("timestamp") => Ok(DateKind::Timestamp),
            _ => Err(AssignError::invalid(
                Operator::CurrentDate.name(),
                path,
                "$type must be \"date\" or \"timestamp\"",
            )),
        },
        _ => Err(AssignError::invalid(
            Operator::CurrentDate.name(),
            path,
            "operand must be true or {$type}",
        )),
    }
}

fn parse_add_to_set(value: &Value, path: &DocumentPath) -> Result<Vec<Value>> {
    match value.as_object().and_then(|m| m.get("$each")) {
        Some(each) => each.as_array().map(<[Value]>::to_vec).ok_or_else(|| {
            AssignError::invalid(Operator::AddToSet.name(), path, "$each must be an array")
        }),
        None => Ok(vec![value.clone()]),
    }
}

/// A composable update operation.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct UpdateOperation {
    ops: Vec<Op>,
}

impl UpdateOperation {
    /// An operation that changes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from ops in any order; ops of the same operator are merged.
    pub fn from_ops<I: IntoIterator<Item = Op>>(ops: I) -> Self {
        ops.into_iter().fold(Self::new(), Self::with)
    }

    /// Ops in application order.
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.iter().all(Op::is_empty)
    }

    /// Add an op, merging it with an existing op of the same operator.
    ///
    /// A path already present for that operator is overwritten.
    pub fn with(mut self, op: Op) -> Self {
        if op.is_empty() {
            return self;
        }
        match self
            .ops
            .binary_search_by_key(&op.operator(), Op::operator)
        {
            Ok(idx) => self.ops[idx].absorb(op),
            Err(idx) => self.ops.insert(idx, op),
        }
        self
    }

    /// Merge every op of `other` into this operation.
    pub fn merge(self, other: UpdateOperation) -> Self {
        other.ops.into_iter().fold(self, Self::with)
    }

    pub fn set(self, path: impl Into<DocumentPath>, value: impl Into<Value>) -> Self {
        self.with(Op::Set(BTreeMap::from([(path.into(), value.into())])))
    }

    pub fn unset(self, path: impl Into<DocumentPath>) -> Self {
        self.with(Op::Unset(BTreeSet::from([path.into()])))
    }

    pub fn rename(self, path: impl Into<DocumentPath>, to: impl Into<String>) -> Self {
        self.with(Op::Rename(BTreeMap::from([(path.into(), to.into())])))
    }

    pub fn inc(self, path: impl Into<DocumentPath>, amount: impl Into<Number>) -> Self {
        self.with(Op::Inc(BTreeMap::from([(path.into(), amount.into())])))
    }

    pub fn mul(self, path: impl Into<DocumentPath>, factor: impl Into<Number>) -> Self {
        self.with(Op::Mul(BTreeMap::from([(path.into(), factor.into())])))
    }

    pub fn min(self, path: impl Into<DocumentPath>, value: impl Into<Value>) -> Self {
        self.with(Op::Min(BTreeMap::from([(path.into(), value.into())])))
    }

    pub fn max(self, path: impl Into<DocumentPath>, value: impl Into<Value>) -> Self {
        self.with(Op::Max(BTreeMap::from([(path.into(), value.into())])))
    }

    pub fn bit(self, path: impl Into<DocumentPath>, op: BitOp) -> Self {
        self.with(Op::Bit(BTreeMap::from([(path.into(), vec![op])])))
    }

    pub fn current_date(self, path: impl Into<DocumentPath>, kind: DateKind) -> Self {
        self.with(Op::CurrentDate(BTreeMap::from([(path.into(), kind)])))
    }

    /// Append one value.
    pub fn push(self, path: impl Into<DocumentPath>, value: impl Into<Value>) -> Self {
        self.push_with(path, PushModifier::value(value))
    }

    /// Push with `$each`/`$position`/`$sort`/`$slice` modifiers.
    pub fn push_with(self, path: impl Into<DocumentPath>, modifier: PushModifier) -> Self {
        self.with(Op::Push(BTreeMap::from([(path.into(), modifier)])))
    }

    pub fn add_to_set(self, path: impl Into<DocumentPath>, value: impl Into<Value>) -> Self {
        self.add_each_to_set(path, vec![value.into()])
    }

    pub fn add_each_to_set(self, path: impl Into<DocumentPath>, values: Vec<Value>) -> Self {
        self.with(Op::AddToSet(BTreeMap::from([(path.into(), values)])))
    }

    /// Remove elements equal to `value`.
    pub fn pull(self, path: impl Into<DocumentPath>, value: impl Into<Value>) -> Self {
        self.pull_where(path, Condition::Equals(value.into()))
    }

    /// Remove elements matching `condition`.
    pub fn pull_where(self, path: impl Into<DocumentPath>, condition: Condition) -> Self {
        self.with(Op::Pull(BTreeMap::from([(path.into(), condition)])))
    }

    pub fn pop(self, path: impl Into<DocumentPath>, end: PopEnd) -> Self {
        self.with(Op::Pop(BTreeMap::from([(path.into(), end)])))
    }

    /// Parse the wire form.
    pub fn from_value(document: &Value) -> Result<Self> {
        let map = document.as_object().ok_or_else(|| {
            AssignError::MalformedOperation(format!(
                "expected a mapping, got {}",
                document.type_name()
            ))
        })?;

        let operator_keys = map.keys().filter(|k| k.starts_with('$')).count();
        if operator_keys == 0 {
            return Ok(map
                .iter()
                .fold(Self::new(), |op, (k, v)| op.set(k.as_str(), v.clone())));
        }
        if operator_keys != map.len() {
            return Err(AssignError::MalformedOperation(
                "operator keys and plain fields cannot be mixed".to_string(),
            ));
        }

        map.iter().try_fold(Self::new(), |acc, (key, payload)| {
            let operator = Operator::from_name(key).ok_or_else(|| {
                AssignError::MalformedOperation(format!("unknown operator {}", key))
            })?;
            Ok(acc.with(Op::parse(operator, payload)?))
        })
    }

    /// Wire form.
    pub fn to_value(&self) -> Value {
        Value::object(
            self.ops
                .iter()
                .filter(|op| !op.is_empty())
                .map(|op| (op.operator().name(), op.payload())),
        )
    }
}

impl Serialize for UpdateOperation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UpdateOperation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let document = Value::deserialize(deserializer)?;
        UpdateOperation::from_value(&document).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(json: serde_json::Value) -> UpdateOperation {
        UpdateOperation::from_value(&Value::from(json)).unwrap()
    }

    #[test]
    fn test_implicit_set() {
        assert_eq!(
            parse(json!({ "name": "kerisu" })),
            UpdateOperation::new().set("name", "kerisu")
        );
    }

    #[test]
    fn test_canonical_equality_ignores_construction_order() {
        let a = UpdateOperation::new().inc("age", 1).set("name", "x");
        let b = UpdateOperation::new().set("name", "x").inc("age", 1);
        assert_eq!(a, b);
        assert_eq!(a.ops()[0].operator(), Operator::Set);
    }

    #[test]
    fn test_mixed_keys_are_rejected() {
        let err = UpdateOperation::from_value(&Value::from(json!({ "$set": {}, "name": 1 })));
        assert!(matches!(err, Err(AssignError::MalformedOperation(_))));
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        let err = UpdateOperation::from_value(&Value::from(json!({ "$frobnicate": { "a": 1 } })));
        assert!(matches!(err, Err(AssignError::MalformedOperation(_))));
    }

    #[test]
    fn test_push_modifiers_parse_in_key_order() {
        let op = parse(json!({ "$push": { "users": {
            "$each": [{ "id": "u1" }],
            "$sort": { "age": -1, "id": 1 },
            "$slice": 3
        }}}));
        let Op::Push(map) = &op.ops()[0] else {
            panic!("expected $push");
        };
        let modifier = &map[&DocumentPath::parse("users")];
        assert_eq!(modifier.slice, Some(3));
        assert_eq!(
            modifier.sort,
            Some(SortSpec::Keys(vec![
                (DocumentPath::parse("age"), SortDirection::Descending),
                (DocumentPath::parse("id"), SortDirection::Ascending),
            ]))
        );
    }

    #[test]
    fn test_push_modifier_without_each_is_invalid() {
        let err = UpdateOperation::from_value(&Value::from(json!({ "$push": { "a": { "$slice": 1 } } })));
        assert!(matches!(err, Err(AssignError::InvalidOperation { .. })));
    }

    #[test]
    fn test_single_each_is_the_same_as_a_bare_value() {
        assert_eq!(
            parse(json!({ "$push": { "tags": { "$each": ["a"] } } })),
            parse(json!({ "$push": { "tags": "a" } }))
        );
    }

    #[test]
    fn test_wire_form_parses_back() {
        let op = UpdateOperation::new()
            .set("a.b", 1)
            .unset("c")
            .rename("d", "e")
            .inc("n", 2.5)
            .bit("flags", BitOp::Xor(3))
            .current_date("at", DateKind::Timestamp)
            .push_with(
                "list",
                PushModifier::each(vec![Value::Int(1), Value::Int(2)]).position(0).slice(-5),
            )
            .add_each_to_set("tags", vec![Value::from("x"), Value::from("y")])
            .pull("old", "z")
            .pop("queue", PopEnd::First);

        let text = serde_json::to_string(&op).unwrap();
        let back: UpdateOperation = serde_json::from_str(&text).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn test_pushing_an_operation_document_survives_the_wire() {
        let commit = UpdateOperation::new().set("title", "draft").to_value();
        let op = UpdateOperation::new().push("commits", commit);
        let back = UpdateOperation::from_value(&op.to_value()).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn test_empty_ops_are_dropped() {
        assert!(UpdateOperation::new().is_empty());
        assert!(parse(json!({ "$set": {} })).is_empty());
        assert_eq!(UpdateOperation::new().to_value(), Value::empty_object());
    }

    #[test]
    fn test_merge_combines_operators() {
        let merged = UpdateOperation::new()
            .set("a", 1)
            .merge(UpdateOperation::new().set("b", 2).inc("c", 1));
        assert_eq!(merged, UpdateOperation::new().set("a", 1).set("b", 2).inc("c", 1));
    }
}
