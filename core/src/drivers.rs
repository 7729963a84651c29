//! Database driver implementations for [`Value`].

#[cfg(any(feature = "rusqlite", feature = "tokio-postgres"))]
use crate::value::Value;

//------------------------------------------------------------------------------
// rusqlite
//------------------------------------------------------------------------------

#[cfg(feature = "rusqlite")]
mod rusqlite_impl {
    use super::Value;
    use rusqlite::types::{FromSql, FromSqlResult, ToSqlOutput, ValueRef};

    impl rusqlite::ToSql for Value {
        fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
            match self {
                Value::Null => Ok(ToSqlOutput::Owned(rusqlite::types::Value::Null)),
                Value::Integer(i) => Ok(ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i))),
                Value::Float(f) => Ok(ToSqlOutput::Owned(rusqlite::types::Value::Real(*f))),
                Value::Bool(b) => Ok(ToSqlOutput::Owned(rusqlite::types::Value::Integer(
                    i64::from(*b),
                ))),
                Value::Text(s) | Value::Raw(s) => {
                    Ok(ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())))
                }
                Value::List(_) | Value::Subquery(_) => Err(rusqlite::Error::ToSqlConversionFailure(
                    "list and subquery values cannot be bound as a single parameter".into(),
                )),
            }
        }
    }

    impl FromSql for Value {
        fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
            let result = match value {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(i) => Value::Integer(i),
                ValueRef::Real(r) => Value::Float(r),
                ValueRef::Text(items) | ValueRef::Blob(items) => {
                    Value::Text(String::from_utf8_lossy(items).into_owned())
                }
            };
            Ok(result)
        }
    }
}

//------------------------------------------------------------------------------
// tokio-postgres
//------------------------------------------------------------------------------

#[cfg(feature = "tokio-postgres")]
mod postgres_impl {
    use super::Value;
    use bytes::BytesMut;
    use tokio_postgres::types::{FromSql, IsNull, ToSql, Type};

    type BoxError = Box<dyn std::error::Error + Sync + Send>;

    impl ToSql for Value {
        fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
            match self {
                Value::Null => Ok(IsNull::Yes),
                Value::Integer(i) => match *ty {
                    Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                    Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                    Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                    Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                    _ => i.to_sql(ty, out),
                },
                Value::Float(f) => match *ty {
                    Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                    _ => f.to_sql(ty, out),
                },
                Value::Text(s) | Value::Raw(s) => s.as_str().to_sql(ty, out),
                Value::Bool(b) => b.to_sql(ty, out),
                Value::List(_) | Value::Subquery(_) => {
                    Err("list and subquery values cannot be bound as a single parameter".into())
                }
            }
        }

        fn accepts(_ty: &Type) -> bool {
            // Conversion is decided per value in `to_sql`
            true
        }

        tokio_postgres::types::to_sql_checked!();
    }

    impl<'a> FromSql<'a> for Value {
        fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
            let value = match *ty {
                Type::BOOL => Value::Bool(bool::from_sql(ty, raw)?),
                Type::INT2 => Value::Integer(i64::from(i16::from_sql(ty, raw)?)),
                Type::INT4 => Value::Integer(i64::from(i32::from_sql(ty, raw)?)),
                Type::INT8 => Value::Integer(i64::from_sql(ty, raw)?),
                Type::FLOAT4 => Value::Float(f64::from(f32::from_sql(ty, raw)?)),
                Type::FLOAT8 => Value::Float(f64::from_sql(ty, raw)?),
                _ => Value::Text(String::from_sql(ty, raw)?),
            };
            Ok(value)
        }

        fn from_sql_null(_ty: &Type) -> Result<Self, BoxError> {
            Ok(Value::Null)
        }

        fn accepts(ty: &Type) -> bool {
            matches!(
                *ty,
                Type::BOOL | Type::INT2 | Type::INT4 | Type::INT8 | Type::FLOAT4 | Type::FLOAT8
            ) || <String as FromSql<'a>>::accepts(ty)
        }
    }
}
