//! Per-backend conversion of result cells into [`Scalar`] values.
//!
//! Each decoder looks at the driver's type name for the column, tries the
//! matching Rust type, and falls back to reading the cell as text. A cell
//! that cannot be read either way fails the whole query with
//! `UnsupportedColumnType`; nothing is silently turned into NULL.

use std::fmt::Write as _;
use std::net::IpAddr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::types::{Oid, PgInterval, PgMoney, PgTimeTz};
use sqlx::postgres::{PgRow, PgTypeKind, PgValueFormat};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo, ValueRef};

use crate::error::{QueryGateError, Result};
use crate::schema::types::DataType;
use crate::value::Scalar;

fn get<'r, R, T>(row: &'r R, idx: usize) -> Option<T>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<T, usize>(idx).ok()
}

fn is_null<R>(row: &R, idx: usize) -> bool
where
    R: Row,
    usize: ColumnIndex<R>,
{
    row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(false)
}

/// Driver type name of column `idx`; empty when the row is narrower.
fn type_name<R: Row>(row: &R, idx: usize) -> String {
    row.columns()
        .get(idx)
        .map(|c| c.type_info().name().to_string())
        .unwrap_or_default()
}

fn unsupported<R: Row>(row: &R, idx: usize) -> QueryGateError {
    match row.columns().get(idx) {
        Some(column) => QueryGateError::UnsupportedColumnType {
            column: column.name().to_string(),
            type_name: column.type_info().name().to_string(),
        },
        None => QueryGateError::UnsupportedColumnType {
            column: format!("#{}", idx + 1),
            type_name: "missing".to_string(),
        },
    }
}

fn iso_datetime(v: NaiveDateTime) -> Scalar {
    Scalar::Timestamp(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

fn iso_date(v: NaiveDate) -> Scalar {
    Scalar::Timestamp(v.format("%Y-%m-%d").to_string())
}

fn iso_time(v: NaiveTime) -> Scalar {
    Scalar::Timestamp(v.format("%H:%M:%S%.f").to_string())
}

fn iso_datetime_tz(v: DateTime<Utc>) -> Scalar {
    Scalar::Timestamp(v.to_rfc3339())
}

fn time_tz(v: PgTimeTz<NaiveTime, FixedOffset>) -> Scalar {
    Scalar::Timestamp(format!("{}{}", v.time.format("%H:%M:%S%.f"), v.offset))
}

/// PostgreSQL's default interval output: `1 year 2 mons 3 days 04:05:06.5`.
fn interval_text(v: PgInterval) -> String {
    fn unit(n: i32, name: &str) -> String {
        if n.abs() == 1 {
            format!("{} {}", n, name)
        } else {
            format!("{} {}s", n, name)
        }
    }

    let mut parts = Vec::new();
    let (years, months) = (v.months / 12, v.months % 12);
    if years != 0 {
        parts.push(unit(years, "year"));
    }
    if months != 0 {
        parts.push(unit(months, "mon"));
    }
    if v.days != 0 {
        parts.push(unit(v.days, "day"));
    }
    if v.microseconds != 0 || parts.is_empty() {
        let sign = if v.microseconds < 0 { "-" } else { "" };
        let micros = v.microseconds.unsigned_abs();
        let secs = micros / 1_000_000;
        let mut clock = format!(
            "{}{:02}:{:02}:{:02}",
            sign,
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        let frac = micros % 1_000_000;
        if frac != 0 {
            let digits = format!("{:06}", frac);
            clock.push('.');
            clock.push_str(digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }
    parts.join(" ")
}

/// Binary INET/CIDR: family, prefix bits, is_cidr, address length, address.
fn inet_text(bytes: &[u8]) -> Option<String> {
    let (prefix, addr) = match bytes {
        [2, prefix, _, 4, a, b, c, d] => (*prefix, IpAddr::from([*a, *b, *c, *d])),
        [3, prefix, _, 16, rest @ ..] => {
            let octets: [u8; 16] = rest.try_into().ok()?;
            (*prefix, IpAddr::from(octets))
        }
        _ => return None,
    };
    let full = if addr.is_ipv4() { 32 } else { 128 };
    Some(if prefix == full {
        addr.to_string()
    } else {
        format!("{}/{}", addr, prefix)
    })
}

/// NUMERIC values `rust_decimal` has no room for: NaN and the infinities.
/// The sign word sits at bytes 4..6 of the binary form.
fn numeric_special(bytes: &[u8]) -> Option<&'static str> {
    match bytes.get(4..6)? {
        [0xC0, 0x00] => Some("NaN"),
        [0xD0, 0x00] => Some("Infinity"),
        [0xF0, 0x00] => Some("-Infinity"),
        _ => None,
    }
}

/// Read a Postgres cell through its wire bytes. Text-format cells are
/// passed through as-is.
fn pg_raw(row: &PgRow, idx: usize, binary: fn(&[u8]) -> Option<String>) -> Option<Scalar> {
    let raw = row.try_get_raw(idx).ok()?;
    let text = match raw.format() {
        PgValueFormat::Text => raw.as_str().ok().map(str::to_string),
        PgValueFormat::Binary => raw.as_bytes().ok().and_then(binary),
    };
    text.map(Scalar::Text)
}

fn decimal(v: Decimal) -> Scalar {
    match v.to_f64() {
        Some(f) => Scalar::Float(f),
        None => Scalar::Text(v.to_string()),
    }
}

/// Lowercase hex, `\x` prefixed the way PostgreSQL prints bytea.
pub(crate) fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

fn json_text<T: serde::Serialize>(v: &T) -> Option<Scalar> {
    serde_json::to_string(v).ok().map(Scalar::Text)
}

pub(crate) fn postgres(row: &PgRow, idx: usize) -> Result<Scalar> {
    if is_null(row, idx) {
        return Ok(Scalar::Null);
    }
    let Some(column) = row.columns().get(idx) else {
        return Err(unsupported(row, idx));
    };
    let type_info = column.type_info();
    let type_name = type_info.name().to_string();

    // User-defined enums arrive as their label bytes
    if let PgTypeKind::Enum(_) = type_info.kind() {
        return row
            .try_get_unchecked::<String, usize>(idx)
            .map(Scalar::Text)
            .map_err(|_| unsupported(row, idx));
    }

    let special = match type_name.as_str() {
        "OID" => get(row, idx).map(|v: Oid| Scalar::Integer(v.0.into())),
        "INET" | "CIDR" => pg_raw(row, idx, inet_text),
        "TIMETZ" => get(row, idx).map(time_tz),
        _ => None,
    };
    if let Some(value) = special {
        return Ok(value);
    }

    let value = match DataType::from_raw(&type_name) {
        DataType::SmallInt => get(row, idx).map(|v: i16| Scalar::Integer(v.into())),
        DataType::Integer | DataType::Serial => {
            get(row, idx).map(|v: i32| Scalar::Integer(v.into()))
        }
        DataType::BigInt | DataType::BigSerial => get(row, idx).map(Scalar::Integer),
        DataType::Float => get(row, idx).map(|v: f32| Scalar::Float(v.into())),
        DataType::Double => get(row, idx).map(Scalar::Float),
        DataType::Numeric => get(row, idx).map(decimal).or_else(|| {
            pg_raw(row, idx, |bytes| numeric_special(bytes).map(str::to_string))
        }),
        // Assumes the usual two fractional digits of lc_monetary
        DataType::Money => get(row, idx).map(|v: PgMoney| decimal(v.to_decimal(2))),
        DataType::Interval => get(row, idx).map(|v: PgInterval| Scalar::Text(interval_text(v))),
        DataType::Boolean => get(row, idx).map(Scalar::Boolean),
        DataType::Date => get(row, idx).map(iso_date),
        DataType::Time => get(row, idx).map(iso_time),
        DataType::Timestamp => get(row, idx).map(iso_datetime),
        DataType::TimestampTz => get(row, idx).map(iso_datetime_tz),
        DataType::Uuid => get(row, idx).map(|v: uuid::Uuid| Scalar::Text(v.to_string())),
        DataType::Json | DataType::Jsonb => {
            get(row, idx).map(|v: serde_json::Value| Scalar::Text(v.to_string()))
        }
        DataType::Binary => get(row, idx).map(|v: Vec<u8>| Scalar::Text(hex(&v))),
        DataType::Array(inner) => match *inner {
            DataType::SmallInt => get(row, idx).and_then(|v: Vec<i16>| json_text(&v)),
            DataType::Integer => get(row, idx).and_then(|v: Vec<i32>| json_text(&v)),
            DataType::BigInt => get(row, idx).and_then(|v: Vec<i64>| json_text(&v)),
            DataType::Double => get(row, idx).and_then(|v: Vec<f64>| json_text(&v)),
            DataType::Boolean => get(row, idx).and_then(|v: Vec<bool>| json_text(&v)),
            _ => get(row, idx).and_then(|v: Vec<String>| json_text(&v)),
        },
        _ => None,
    };

    value
        .or_else(|| get(row, idx).map(Scalar::Text))
        .ok_or_else(|| unsupported(row, idx))
}

pub(crate) fn mysql(row: &MySqlRow, idx: usize) -> Result<Scalar> {
    if is_null(row, idx) {
        return Ok(Scalar::Null);
    }
    let type_name = type_name(row, idx);

    // TIMESTAMP is stored as UTC; DATETIME has no zone.
    let value = if type_name.eq_ignore_ascii_case("TIMESTAMP") {
        get(row, idx).map(iso_datetime_tz)
    } else {
        match DataType::from_raw(&type_name) {
            DataType::SmallInt | DataType::Integer | DataType::BigInt => get(row, idx)
                .map(Scalar::Integer)
                .or_else(|| {
                    get(row, idx).map(|v: u64| match i64::try_from(v) {
                        Ok(i) => Scalar::Integer(i),
                        Err(_) => Scalar::Float(v as f64),
                    })
                }),
            DataType::Float => get(row, idx).map(|v: f32| Scalar::Float(v.into())),
            DataType::Double => get(row, idx).map(Scalar::Float),
            DataType::Numeric => get(row, idx).map(decimal),
            DataType::Boolean => get(row, idx)
                .map(Scalar::Boolean)
                .or_else(|| get(row, idx).map(|v: u64| Scalar::Boolean(v != 0))),
            DataType::Date => get(row, idx).map(iso_date),
            DataType::Time => get(row, idx).map(iso_time),
            DataType::Timestamp => get(row, idx).map(iso_datetime),
            DataType::Json => {
                get(row, idx).map(|v: serde_json::Value| Scalar::Text(v.to_string()))
            }
            DataType::Binary => get(row, idx).map(|v: Vec<u8>| Scalar::Text(hex(&v))),
            _ => None,
        }
    };

    value
        .or_else(|| get(row, idx).map(Scalar::Text))
        .ok_or_else(|| unsupported(row, idx))
}

/// SQLite is dynamically typed: the storage class of the cell decides the
/// decoder, and the declared column type only refines it (booleans, dates).
pub(crate) fn sqlite(row: &SqliteRow, idx: usize) -> Result<Scalar> {
    let storage = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Ok(Scalar::Null),
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return Err(unsupported(row, idx)),
    };
    let declared = DataType::from_raw(&type_name(row, idx));

    let value = match storage.as_str() {
        "INTEGER" if declared == DataType::Boolean => {
            get(row, idx).map(|v: i64| Scalar::Boolean(v != 0))
        }
        "INTEGER" => get(row, idx).map(Scalar::Integer),
        "REAL" => get(row, idx).map(Scalar::Float),
        "TEXT" => {
            let parsed = match declared {
                DataType::Timestamp => get(row, idx).map(iso_datetime),
                DataType::Date => get(row, idx).map(iso_date),
                DataType::Time => get(row, idx).map(iso_time),
                _ => None,
            };
            parsed.or_else(|| {
                get(row, idx).map(|v: String| {
                    if declared.is_temporal() {
                        Scalar::Timestamp(v)
                    } else {
                        Scalar::Text(v)
                    }
                })
            })
        }
        "BLOB" => get(row, idx).map(|v: Vec<u8>| Scalar::Text(hex(&v))),
        _ => None,
    };

    value.ok_or_else(|| unsupported(row, idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0xde, 0xad, 0x01]), "\\xdead01");
        assert_eq!(hex(&[]), "\\x");
    }

    #[test]
    fn test_decimal_to_float() {
        assert_eq!(decimal(Decimal::new(125, 2)), Scalar::Float(1.25));
        assert_eq!(decimal(Decimal::new(-40, 0)), Scalar::Float(-40.0));
    }

    #[test]
    fn test_interval_text() {
        let iv = |months, days, microseconds| PgInterval {
            months,
            days,
            microseconds,
        };
        assert_eq!(interval_text(iv(0, 0, 0)), "00:00:00");
        assert_eq!(interval_text(iv(0, 1, 0)), "1 day");
        assert_eq!(interval_text(iv(14, 3, 0)), "1 year 2 mons 3 days");
        assert_eq!(
            interval_text(iv(0, 2, 7_506_500_000)),
            "2 days 02:05:06.5"
        );
        assert_eq!(interval_text(iv(0, 0, -90_000_000)), "-00:01:30");
    }

    #[test]
    fn test_inet_text() {
        assert_eq!(inet_text(&[2, 32, 0, 4, 10, 0, 0, 1]).as_deref(), Some("10.0.0.1"));
        assert_eq!(inet_text(&[2, 8, 1, 4, 10, 0, 0, 0]).as_deref(), Some("10.0.0.0/8"));
        let mut v6 = vec![3, 128, 0, 16];
        v6.extend_from_slice(&[0; 15]);
        v6.push(1);
        assert_eq!(inet_text(&v6).as_deref(), Some("::1"));
        assert_eq!(inet_text(&[2, 32, 0, 4, 10]), None);
    }

    #[test]
    fn test_numeric_special() {
        assert_eq!(numeric_special(&[0, 0, 0, 0, 0xC0, 0, 0, 0]), Some("NaN"));
        assert_eq!(numeric_special(&[0, 0, 0, 0, 0xF0, 0, 0, 0]), Some("-Infinity"));
        assert_eq!(numeric_special(&[0, 1, 0, 0, 0x40, 0, 0, 2, 0, 12]), None);
    }

    #[test]
    fn test_time_tz() {
        let v = PgTimeTz {
            time: NaiveTime::from_hms_opt(4, 5, 6).unwrap(),
            offset: FixedOffset::east_opt(2 * 3600).unwrap(),
        };
        assert_eq!(time_tz(v), Scalar::Timestamp("04:05:06+02:00".to_string()));
    }

    #[test]
    fn test_iso_rendering() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 5)
            .unwrap();
        assert_eq!(
            iso_datetime(dt),
            Scalar::Timestamp("2024-03-01T12:30:05".to_string())
        );
        assert_eq!(
            iso_datetime_tz(dt.and_utc()),
            Scalar::Timestamp("2024-03-01T12:30:05+00:00".to_string())
        );
        assert_eq!(
            iso_date(dt.date()),
            Scalar::Timestamp("2024-03-01".to_string())
        );
    }
}
