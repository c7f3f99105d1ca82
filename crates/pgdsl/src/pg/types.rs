//! Conversions between [`Value`] and PostgreSQL wire types.

use std::error::Error;
use std::sync::Arc;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type};
use uuid::Uuid;

use crate::error::{DslError, DslResult};
use crate::row::{ColumnMetadata, Row, RowMetadata};
use crate::value::Value;

type BoxError = Box<dyn Error + Sync + Send>;

fn encode<T: ToSql>(value: &T, kind: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if !T::accepts(ty) {
        return Err(format!("cannot bind {kind} value to parameter of type {ty}").into());
    }
    value.to_sql(ty, out)
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        let kind = self.kind();
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => encode(v, kind, ty, out),
            Value::Int(v) => match *ty {
                Type::INT2 => encode(&i16::try_from(*v)?, kind, ty, out),
                Type::INT4 => encode(&i32::try_from(*v)?, kind, ty, out),
                Type::OID => encode(&u32::try_from(*v)?, kind, ty, out),
                Type::FLOAT4 => encode(&(*v as f32), kind, ty, out),
                Type::FLOAT8 => encode(&(*v as f64), kind, ty, out),
                _ => encode(v, kind, ty, out),
            },
            Value::Float(v) => match *ty {
                Type::FLOAT4 => encode(&(*v as f32), kind, ty, out),
                _ => encode(v, kind, ty, out),
            },
            Value::Text(v) => encode(v, kind, ty, out),
            Value::Bytes(v) => encode(v, kind, ty, out),
            Value::Uuid(v) => encode(v, kind, ty, out),
            Value::Date(v) => encode(v, kind, ty, out),
            Value::Timestamp(v) => match *ty {
                Type::TIMESTAMPTZ => encode(&v.and_utc(), kind, ty, out),
                _ => encode(v, kind, ty, out),
            },
            Value::Json(v) => encode(v, kind, ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    tokio_postgres::types::to_sql_checked!();
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// `numeric` as a [`Value`]: integral values that fit in `i64` (such as
/// `sum(int8)` or `count(*)::numeric`) decode to `Int`, everything else to
/// `Float`, where precision beyond f64 is lost.
struct Numeric(Value);

impl Numeric {
    fn integral(digits: &[i16], weight: i32) -> Option<i64> {
        let mut value = 0_i128;
        for (i, &digit) in digits.iter().enumerate() {
            let exponent = weight - i as i32;
            if exponent < 0 {
                if digit != 0 {
                    return None;
                }
                continue;
            }
            let scale = 10_000_i128.checked_pow(u32::try_from(exponent).ok()?)?;
            value = value.checked_add(i128::from(digit).checked_mul(scale)?)?;
        }
        i64::try_from(value).ok()
    }

    fn float(digits: &[i16], weight: i32) -> f64 {
        digits.iter().enumerate().fold(0.0, |value, (i, &digit)| {
            let exponent = weight - i as i32;
            value
                + if exponent >= 0 {
                    f64::from(digit) * 10_000_f64.powi(exponent)
                } else {
                    f64::from(digit) / 10_000_f64.powi(-exponent)
                }
        })
    }
}

impl<'a> FromSql<'a> for Numeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        if raw.len() < 8 {
            return Err("numeric value too short".into());
        }
        let word = |at: usize| i16::from_be_bytes([raw[at], raw[at + 1]]);
        let ndigits = word(0) as u16 as usize;
        let weight = i32::from(word(2));
        let sign = word(4) as u16;
        let dscale = word(6);
        if raw.len() < 8 + ndigits * 2 {
            return Err("numeric value truncated".into());
        }
        match sign {
            NUMERIC_NAN => return Ok(Numeric(Value::Float(f64::NAN))),
            NUMERIC_PINF => return Ok(Numeric(Value::Float(f64::INFINITY))),
            NUMERIC_NINF => return Ok(Numeric(Value::Float(f64::NEG_INFINITY))),
            _ => {}
        }

        let digits: Vec<i16> = (0..ndigits).map(|i| word(8 + i * 2)).collect();
        let negative = sign == NUMERIC_NEG;
        let integral = if dscale == 0 {
            Self::integral(&digits, weight)
        } else {
            None
        };
        let value = match integral {
            Some(value) if negative => Value::Int(-value),
            Some(value) => Value::Int(value),
            None => {
                let value = Self::float(&digits, weight);
                Value::Float(if negative { -value } else { value })
            }
        };
        Ok(Numeric(value))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a tokio_postgres::Row, index: usize) -> DslResult<Option<T>> {
    row.try_get::<_, Option<T>>(index)
        .map_err(|e| DslError::decode(row.columns()[index].name(), e.to_string()))
}

fn read_value(row: &tokio_postgres::Row, index: usize) -> DslResult<Value> {
    let column = &row.columns()[index];
    let value = match *column.type_() {
        Type::BOOL => get::<bool>(row, index)?.map(Value::Bool),
        Type::INT2 => get::<i16>(row, index)?.map(|v| Value::Int(v.into())),
        Type::INT4 => get::<i32>(row, index)?.map(|v| Value::Int(v.into())),
        Type::INT8 => get::<i64>(row, index)?.map(Value::Int),
        Type::OID => get::<u32>(row, index)?.map(|v| Value::Int(v.into())),
        Type::FLOAT4 => get::<f32>(row, index)?.map(|v| Value::Float(v.into())),
        Type::FLOAT8 => get::<f64>(row, index)?.map(Value::Float),
        Type::NUMERIC => get::<Numeric>(row, index)?.map(|v| v.0),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            get::<String>(row, index)?.map(Value::Text)
        }
        Type::BYTEA => get::<Vec<u8>>(row, index)?.map(Value::Bytes),
        Type::UUID => get::<Uuid>(row, index)?.map(Value::Uuid),
        Type::DATE => get::<NaiveDate>(row, index)?.map(Value::Date),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, index)?.map(Value::Timestamp),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, index)?.map(|v| Value::Timestamp(v.naive_utc())),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, index)?.map(Value::Json),
        ref other => {
            return Err(DslError::decode(
                column.name(),
                format!("unsupported column type {other}"),
            ));
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Layout of a prepared statement's result.
pub(crate) fn metadata_of(columns: &[tokio_postgres::Column]) -> Arc<RowMetadata> {
    Arc::new(RowMetadata::new(
        columns
            .iter()
            .map(|column| ColumnMetadata::new(column.name(), column.type_().name(), None))
            .collect(),
    ))
}

pub(crate) fn read_row(metadata: &Arc<RowMetadata>, row: &tokio_postgres::Row) -> DslResult<Row> {
    let values = (0..row.len())
        .map(|index| read_value(row, index))
        .collect::<DslResult<Vec<_>>>()?;
    Row::new(Arc::clone(metadata), values)
}
