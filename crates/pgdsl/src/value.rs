//! Backend-neutral values: what a statement binds and what a row carries.

use std::fmt;
use std::ops::RangeInclusive;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

/// A single SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short type name used in decode errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Uuid(_) => "uuid",
            Value::Date(_) => "date",
            Value::Timestamp(_) => "timestamp",
            Value::Json(_) => "json",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "'{v}'"),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Uuid(v) => write!(f, "{v}"),
            Value::Date(v) => write!(f, "{v}"),
            Value::Timestamp(v) => write!(f, "{v}"),
            Value::Json(v) => write!(f, "{v}"),
        }
    }
}

/// Conversion of a Rust value into a bindable [`Value`].
pub trait ToValue {
    fn to_value(&self) -> Value;
}

/// Conversion of a row [`Value`] into a Rust value.
///
/// NULL only decodes into `Option<T>`.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, String>;
}

fn mismatch(expected: &str, got: &Value) -> String {
    format!("expected {expected}, found {}", got.kind())
}

macro_rules! int_value {
    ($($ty:ty),*) => {$(
        impl ToValue for $ty {
            fn to_value(&self) -> Value {
                Value::Int(i64::from(*self))
            }
        }

        impl FromValue for $ty {
            fn from_value(value: &Value) -> Result<Self, String> {
                match value {
                    Value::Int(v) => <$ty>::try_from(*v)
                        .map_err(|_| format!("{v} is out of range for {}", stringify!($ty))),
                    other => Err(mismatch(stringify!($ty), other)),
                }
            }
        }
    )*};
}

int_value!(i16, i32, i64, u32);

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            other => Err(mismatch("f64", other)),
        }
    }
}

impl ToValue for f32 {
    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self, String> {
        f64::from_value(value).map(|v| v as f32)
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bool(v) => Ok(*v),
            other => Err(mismatch("bool", other)),
        }
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl ToValue for &str {
    fn to_value(&self) -> Value {
        Value::Text((*self).to_string())
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Text(v) => Ok(v.clone()),
            other => Err(mismatch("text", other)),
        }
    }
}

impl ToValue for Vec<u8> {
    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }
}

impl ToValue for bytes::Bytes {
    fn to_value(&self) -> Value {
        Value::Bytes(self.to_vec())
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bytes(v) => Ok(v.clone()),
            other => Err(mismatch("bytes", other)),
        }
    }
}

impl FromValue for bytes::Bytes {
    fn from_value(value: &Value) -> Result<Self, String> {
        Vec::<u8>::from_value(value).map(bytes::Bytes::from)
    }
}

impl ToValue for Uuid {
    fn to_value(&self) -> Value {
        Value::Uuid(*self)
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Uuid(v) => Ok(*v),
            Value::Text(v) => Uuid::parse_str(v).map_err(|e| e.to_string()),
            other => Err(mismatch("uuid", other)),
        }
    }
}

impl ToValue for NaiveDate {
    fn to_value(&self) -> Value {
        Value::Date(*self)
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Date(v) => Ok(*v),
            other => Err(mismatch("date", other)),
        }
    }
}

impl ToValue for NaiveDateTime {
    fn to_value(&self) -> Value {
        Value::Timestamp(*self)
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Timestamp(v) => Ok(*v),
            other => Err(mismatch("timestamp", other)),
        }
    }
}

impl ToValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::Timestamp(self.naive_utc())
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Result<Self, String> {
        NaiveDateTime::from_value(value).map(|v| v.and_utc())
    }
}

impl ToValue for serde_json::Value {
    fn to_value(&self) -> Value {
        Value::Json(self.clone())
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Json(v) => Ok(v.clone()),
            Value::Null => Ok(serde_json::Value::Null),
            other => Err(mismatch("json", other)),
        }
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, String> {
        Ok(value.clone())
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, ToValue::to_value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// A bound parameter, before placeholder expansion.
///
/// The variant decides how one logical `?` is rendered: a scalar stays a single
/// placeholder, a range becomes `? and ?`, a collection becomes `?, ?, ...`.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Scalar(Value),
    Range(Value, Value),
    Collection(Vec<Value>),
}

impl Param {
    /// Number of flattened values this parameter contributes.
    pub fn width(&self) -> usize {
        match self {
            Param::Scalar(_) => 1,
            Param::Range(..) => 2,
            Param::Collection(values) => values.len(),
        }
    }

    pub(crate) fn write_placeholders(&self, out: &mut String) {
        match self {
            Param::Scalar(_) => out.push('?'),
            Param::Range(..) => out.push_str("? and ?"),
            // `in (null)` is valid and matches nothing
            Param::Collection(values) if values.is_empty() => out.push_str("null"),
            Param::Collection(values) => {
                for i in 0..values.len() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push('?');
                }
            }
        }
    }

    pub(crate) fn flatten_into(self, params: &mut Vec<Value>) {
        match self {
            Param::Scalar(value) => params.push(value),
            Param::Range(low, high) => {
                params.push(low);
                params.push(high);
            }
            Param::Collection(values) => params.extend(values),
        }
    }
}

/// A slot type in a statement's parameter list.
///
/// Each `where`/`values`/`set` call appends one slot type; `bind` takes one value
/// per slot and converts it into a [`Param`] here.
pub trait Slot {
    fn into_param(self) -> Param;
}

macro_rules! scalar_slot {
    ($($ty:ty),*) => {$(
        impl Slot for $ty {
            fn into_param(self) -> Param {
                Param::Scalar(self.to_value())
            }
        }
    )*};
}

scalar_slot!(
    bool,
    i16,
    i32,
    i64,
    u32,
    f32,
    f64,
    String,
    Vec<u8>,
    bytes::Bytes,
    Uuid,
    NaiveDate,
    NaiveDateTime,
    DateTime<Utc>,
    serde_json::Value,
    Value
);

impl<T: ToValue> Slot for Option<T> {
    fn into_param(self) -> Param {
        Param::Scalar(self.to_value())
    }
}

/// Slot type of an `in (...)` condition: expands to one placeholder per element.
#[derive(Debug, Clone, PartialEq)]
pub struct List<T>(pub Vec<T>);

impl<T: ToValue> Slot for List<T> {
    fn into_param(self) -> Param {
        Param::Collection(self.0.iter().map(ToValue::to_value).collect())
    }
}

impl<T> From<Vec<T>> for List<T> {
    fn from(values: Vec<T>) -> Self {
        List(values)
    }
}

impl<T: Clone> From<&[T]> for List<T> {
    fn from(values: &[T]) -> Self {
        List(values.to_vec())
    }
}

impl<T, const N: usize> From<[T; N]> for List<T> {
    fn from(values: [T; N]) -> Self {
        List(values.into())
    }
}

/// Slot type of a `between` condition: expands to `? and ?`.
#[derive(Debug, Clone, PartialEq)]
pub struct Between<T> {
    pub low: T,
    pub high: T,
}

impl<T: ToValue> Slot for Between<T> {
    fn into_param(self) -> Param {
        Param::Range(self.low.to_value(), self.high.to_value())
    }
}

impl<T> From<RangeInclusive<T>> for Between<T> {
    fn from(range: RangeInclusive<T>) -> Self {
        let (low, high) = range.into_inner();
        Between { low, high }
    }
}

impl<T> From<(T, T)> for Between<T> {
    fn from((low, high): (T, T)) -> Self {
        Between { low, high }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ints_decode_with_range_checks() {
        assert_eq!(i32::from_value(&Value::Int(7)), Ok(7));
        assert!(i16::from_value(&Value::Int(70_000)).is_err());
        assert!(i64::from_value(&Value::Text("7".into())).is_err());
    }

    #[test]
    fn null_only_decodes_into_option() {
        assert_eq!(Option::<String>::from_value(&Value::Null), Ok(None));
        assert_eq!(
            Option::<String>::from_value(&Value::Text("a".into())),
            Ok(Some("a".to_string()))
        );
        assert!(String::from_value(&Value::Null).is_err());
    }

    #[test]
    fn option_encodes_null() {
        assert_eq!(None::<i32>.to_value(), Value::Null);
        assert_eq!(Some(3_i32).to_value(), Value::Int(3));
    }

    #[test]
    fn param_expansion_matches_width() {
        let cases = [
            Param::Scalar(Value::Int(1)),
            Param::Range(Value::Int(1), Value::Int(9)),
            Param::Collection(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            Param::Collection(vec![]),
        ];
        for param in cases {
            let mut text = String::new();
            param.write_placeholders(&mut text);
            let mut flat = Vec::new();
            let width = param.width();
            param.flatten_into(&mut flat);
            assert_eq!(text.matches('?').count(), width);
            assert_eq!(flat.len(), width);
        }
    }

    #[test]
    fn empty_collection_renders_null() {
        let mut text = String::new();
        List::<i64>(vec![]).into_param().write_placeholders(&mut text);
        assert_eq!(text, "null");
    }

    #[test]
    fn between_from_inclusive_range() {
        let between: Between<i64> = (2..=5).into();
        assert_eq!(between.into_param(), Param::Range(Value::Int(2), Value::Int(5)));
    }
}
