use std::error::Error;
use std::fmt::Write as _;
use std::net::IpAddr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Row, Statement};
use uuid::Uuid;

use crate::error::SqlWritebackError;
use crate::results::QueryResult;
use crate::types::RowValues;

/// Extracts a `RowValues` from a `tokio_postgres` row at the given index.
///
/// # Errors
/// Returns `SqlWritebackError::PostgresError` if the column cannot be decoded.
pub fn postgres_extract_value(row: &Row, idx: usize) -> Result<RowValues, SqlWritebackError> {
    let type_info = row.columns()[idx].type_();

    let value = match type_info.name() {
        "int2" => row
            .try_get::<_, Option<i16>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))),
        "int4" => row
            .try_get::<_, Option<i32>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))),
        "int8" => row
            .try_get::<_, Option<i64>>(idx)?
            .map_or(RowValues::Null, RowValues::Int),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Float(f64::from(v))),
        "float8" => row
            .try_get::<_, Option<f64>>(idx)?
            .map_or(RowValues::Null, RowValues::Float),
        "bool" => row
            .try_get::<_, Option<bool>>(idx)?
            .map_or(RowValues::Null, RowValues::Bool),
        "timestamp" => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map_or(RowValues::Null, RowValues::Timestamp),
        "timestamptz" => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Timestamp(v.naive_utc())),
        "date" => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Text(v.to_string())),
        "json" | "jsonb" => row
            .try_get::<_, Option<Value>>(idx)?
            .map_or(RowValues::Null, RowValues::JSON),
        "bytea" => row
            .try_get::<_, Option<Vec<u8>>>(idx)?
            .map_or(RowValues::Null, RowValues::Blob),
        "oid" => row
            .try_get::<_, Option<u32>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))),
        "numeric" => row
            .try_get::<_, Option<PgNumeric>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Text(v.0)),
        "uuid" => row
            .try_get::<_, Option<Uuid>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Text(v.to_string())),
        "time" => row
            .try_get::<_, Option<NaiveTime>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Text(v.to_string())),
        "interval" => row
            .try_get::<_, Option<PgInterval>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Text(v.0)),
        "inet" => row
            .try_get::<_, Option<IpAddr>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Text(v.to_string())),
        "text" | "varchar" | "bpchar" | "name" => row
            .try_get::<_, Option<String>>(idx)?
            .map_or(RowValues::Null, RowValues::Text),
        _ => row
            .try_get::<_, Option<PgText>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Text(v.0)),
    };
    Ok(value)
}

/// Collect rows into a `QueryResult`, labelling columns from the prepared statement so an
/// empty result still reports its columns.
///
/// # Errors
/// Returns `SqlWritebackError::PostgresError` if any cell cannot be decoded.
pub fn build_query_result(stmt: &Statement, rows: &[Row]) -> Result<QueryResult, SqlWritebackError> {
    let column_names: Vec<String> = stmt
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut cells = Vec::with_capacity(column_names.len());
        for idx in 0..row.columns().len() {
            cells.push(postgres_extract_value(row, idx)?.to_text());
        }
        out.push(cells);
    }

    Ok(QueryResult::new(column_names, out))
}

type DecodeError = Box<dyn Error + Sync + Send>;

/// Any column type, rendered from its raw bytes as lossy UTF-8.
struct PgText(String);

impl<'a> FromSql<'a> for PgText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        Ok(PgText(String::from_utf8_lossy(raw).into_owned()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// `NUMERIC` as its exact decimal text.
struct PgNumeric(String);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        decode_numeric(raw).map(PgNumeric)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// `INTERVAL` in the server's default output style, e.g. `1 year 2 mons 3 days 04:05:06`.
struct PgInterval(String);

impl<'a> FromSql<'a> for PgInterval {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        decode_interval(raw).map(PgInterval)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

fn read_word(raw: &[u8], at: usize) -> Result<[u8; 2], DecodeError> {
    raw.get(at..at + 2)
        .map(|b| [b[0], b[1]])
        .ok_or_else(|| "truncated numeric value".into())
}

fn read_i16(raw: &[u8], at: usize) -> Result<i16, DecodeError> {
    read_word(raw, at).map(i16::from_be_bytes)
}

fn read_u16(raw: &[u8], at: usize) -> Result<u16, DecodeError> {
    read_word(raw, at).map(u16::from_be_bytes)
}

/// Binary `NUMERIC`: digit count, weight, sign and display scale as 16-bit words, then
/// base-10000 digits, the first of which is scaled by `10000^weight`.
fn decode_numeric(raw: &[u8]) -> Result<String, DecodeError> {
    let ndigits = usize::try_from(read_i16(raw, 0)?)?;
    let weight = i32::from(read_i16(raw, 2)?);
    let sign = read_u16(raw, 4)?;
    let dscale = usize::from(read_u16(raw, 6)?);

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| read_i16(raw, 8 + 2 * i))
        .collect::<Result<Vec<_>, _>>()?;
    let digit_at = |pos: i32| -> i16 {
        usize::try_from(pos)
            .ok()
            .and_then(|p| digits.get(p).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for pos in 0..=weight {
            if pos == 0 {
                write!(out, "{}", digit_at(pos))?;
            } else {
                write!(out, "{:04}", digit_at(pos))?;
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut pos = weight + 1;
        while fraction.len() < dscale {
            write!(fraction, "{:04}", digit_at(pos))?;
            pos += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

/// Binary `INTERVAL`: microseconds (i64), days (i32), months (i32).
fn decode_interval(raw: &[u8]) -> Result<String, DecodeError> {
    let bytes: [u8; 16] = raw
        .try_into()
        .map_err(|_| "interval value must be 16 bytes")?;
    let mut micros_be = [0u8; 8];
    micros_be.copy_from_slice(&bytes[0..8]);
    let mut days_be = [0u8; 4];
    days_be.copy_from_slice(&bytes[8..12]);
    let mut months_be = [0u8; 4];
    months_be.copy_from_slice(&bytes[12..16]);

    let micros = i64::from_be_bytes(micros_be);
    let days = i32::from_be_bytes(days_be);
    let months = i32::from_be_bytes(months_be);

    let mut parts: Vec<String> = Vec::new();
    let plural = |n: i64, unit: &str, units: &str| {
        format!("{n} {}", if n.abs() == 1 { unit } else { units })
    };
    let (years, months) = (months / 12, months % 12);
    if years != 0 {
        parts.push(plural(i64::from(years), "year", "years"));
    }
    if months != 0 {
        parts.push(plural(i64::from(months), "mon", "mons"));
    }
    if days != 0 {
        parts.push(plural(i64::from(days), "day", "days"));
    }
    if micros != 0 || parts.is_empty() {
        let magnitude = micros.unsigned_abs();
        let (secs, frac) = (magnitude / 1_000_000, magnitude % 1_000_000);
        let mut clock = format!(
            "{}{:02}:{:02}:{:02}",
            if micros < 0 { "-" } else { "" },
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        if frac != 0 {
            let digits = format!("{frac:06}");
            clock.push('.');
            clock.push_str(digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }
    Ok(parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(weight: i16, sign: u16, dscale: u16, digits: &[i16]) -> Vec<u8> {
        let ndigits = i16::try_from(digits.len()).unwrap();
        let mut raw = Vec::new();
        raw.extend_from_slice(&ndigits.to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            raw.extend_from_slice(&d.to_be_bytes());
        }
        raw
    }

    fn interval(micros: i64, days: i32, months: i32) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&micros.to_be_bytes());
        raw.extend_from_slice(&days.to_be_bytes());
        raw.extend_from_slice(&months.to_be_bytes());
        raw
    }

    #[test]
    fn numeric_with_integer_and_fraction() {
        let raw = numeric(1, 0, 2, &[1, 2345, 6700]);
        assert_eq!(decode_numeric(&raw).unwrap(), "12345.67");
    }

    #[test]
    fn numeric_below_one_keeps_leading_zeros() {
        assert_eq!(decode_numeric(&numeric(-1, 0, 2, &[500])).unwrap(), "0.05");
        assert_eq!(decode_numeric(&numeric(-2, 0, 8, &[5])).unwrap(), "0.00000005");
    }

    #[test]
    fn numeric_trailing_zero_groups_are_implied() {
        assert_eq!(decode_numeric(&numeric(1, 0, 0, &[1])).unwrap(), "10000");
        assert_eq!(decode_numeric(&numeric(0, 0, 3, &[7])).unwrap(), "7.000");
    }

    #[test]
    fn numeric_sign_and_specials() {
        assert_eq!(decode_numeric(&numeric(0, NUMERIC_NEG, 0, &[3])).unwrap(), "-3");
        assert_eq!(decode_numeric(&numeric(0, 0, 0, &[])).unwrap(), "0");
        assert_eq!(decode_numeric(&numeric(0, NUMERIC_NAN, 0, &[])).unwrap(), "NaN");
        assert_eq!(decode_numeric(&numeric(0, NUMERIC_NINF, 0, &[])).unwrap(), "-Infinity");
    }

    #[test]
    fn numeric_rejects_truncated_input() {
        let mut raw = numeric(1, 0, 2, &[1, 2345, 6700]);
        raw.truncate(raw.len() - 1);
        assert!(decode_numeric(&raw).is_err());
        assert!(decode_numeric(&[0, 1]).is_err());
    }

    #[test]
    fn interval_renders_every_unit() {
        let micros = (4 * 3600 + 5 * 60 + 6) * 1_000_000;
        let raw = interval(micros, 3, 14);
        assert_eq!(decode_interval(&raw).unwrap(), "1 year 2 mons 3 days 04:05:06");
    }

    #[test]
    fn interval_edge_forms() {
        assert_eq!(decode_interval(&interval(0, 0, 0)).unwrap(), "00:00:00");
        assert_eq!(decode_interval(&interval(0, 1, 0)).unwrap(), "1 day");
        assert_eq!(decode_interval(&interval(-1_500_000, 0, 0)).unwrap(), "-00:00:01.5");
        assert!(decode_interval(&[0; 12]).is_err());
    }

    #[test]
    fn text_fallback_accepts_any_type() {
        assert!(<PgText as FromSql>::accepts(&Type::MONEY));
        assert!(<PgNumeric as FromSql>::accepts(&Type::NUMERIC));
        assert!(!<PgNumeric as FromSql>::accepts(&Type::TEXT));
    }
}
