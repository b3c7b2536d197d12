//! Method argument codec.
//!
//! Arguments are described by a format string with one character per
//! argument:
//!
//! | char | type                                   | [`Value`]            |
//! |------|----------------------------------------|----------------------|
//! | `b`  | bit, consecutive bits share one octet  | `Bool`               |
//! | `o`  | octet                                  | `U8`                 |
//! | `B`  | short (u16)                            | `U16`                |
//! | `l`  | long (u32)                             | `U32`                |
//! | `L`  | long long (u64)                        | `U64`                |
//! | `s`  | short string (≤ 255 bytes)             | `ShortStr`           |
//! | `S`  | long string                            | `LongStr` / `Bytes`  |
//! | `x`  | long string kept as raw bytes          | `Bytes`              |
//! | `F`  | field table                            | `Table`              |
//! | `A`  | field array                            | `Array`              |
//! | `T`  | timestamp (u64 seconds)                | `Timestamp`          |
//!
//! All integers are big-endian, as on the wire.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{DecodeError, EncodeError};

/// A field table. Keys are short strings.
pub type FieldTable = BTreeMap<String, Value>;

/// A decoded argument or field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    ShortStr(String),
    LongStr(String),
    Bytes(Bytes),
    Timestamp(u64),
    Table(FieldTable),
    Array(Vec<Value>),
}

impl Value {
    /// Short type name, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Bool(_) => "bool",
            Value::I8(_) => "i8",
            Value::U8(_) => "u8",
            Value::I16(_) => "i16",
            Value::U16(_) => "u16",
            Value::I32(_) => "i32",
            Value::U32(_) => "u32",
            Value::I64(_) => "i64",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::ShortStr(_) => "short string",
            Value::LongStr(_) => "long string",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
            Value::Table(_) => "table",
            Value::Array(_) => "array",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Any unsigned integer (or non-negative signed integer) widened to u64.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::U8(v) => Some(v.into()),
            Value::U16(v) => Some(v.into()),
            Value::U32(v) => Some(v.into()),
            Value::U64(v) | Value::Timestamp(v) => Some(v),
            Value::I8(v) => u64::try_from(v).ok(),
            Value::I16(v) => u64::try_from(v).ok(),
            Value::I32(v) => u64::try_from(v).ok(),
            Value::I64(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::ShortStr(s) | Value::LongStr(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::ShortStr(s) | Value::LongStr(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&FieldTable> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::U8(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::U16(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::U64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::ShortStr(v.to_owned())
    }
}

impl From<FieldTable> for Value {
    fn from(v: FieldTable) -> Self {
        Value::Table(v)
    }
}

/// Encode `args` according to `format`.
pub fn dumps(format: &str, args: &[Value]) -> Result<Bytes, EncodeError> {
    let expected = format.chars().count();
    if expected != args.len() {
        return Err(EncodeError::ArgumentCount {
            expected,
            actual: args.len(),
        });
    }

    let mut out = BytesMut::new();
    let mut bits = 0u8;
    let mut bit_count = 0u8;

    for (index, (fmt, value)) in format.chars().zip(args).enumerate() {
        if fmt == 'b' {
            if bit_count == 8 {
                out.put_u8(bits);
                bits = 0;
                bit_count = 0;
            }
            let set = value.as_bool().ok_or_else(|| mismatch(index, fmt, value))?;
            if set {
                bits |= 1 << bit_count;
            }
            bit_count += 1;
            continue;
        }
        if bit_count > 0 {
            out.put_u8(bits);
            bits = 0;
            bit_count = 0;
        }

        match fmt {
            'o' => out.put_u8(unsigned(index, fmt, value)?),
            'B' => out.put_u16(unsigned(index, fmt, value)?),
            'l' => out.put_u32(unsigned(index, fmt, value)?),
            'L' | 'T' => out.put_u64(unsigned(index, fmt, value)?),
            's' => {
                let s = value.as_str().ok_or_else(|| mismatch(index, fmt, value))?;
                put_short_str(&mut out, s)?;
            }
            'S' | 'x' => {
                let b = value
                    .as_bytes()
                    .ok_or_else(|| mismatch(index, fmt, value))?;
                put_long_bytes(&mut out, b);
            }
            'F' => {
                let table = value
                    .as_table()
                    .ok_or_else(|| mismatch(index, fmt, value))?;
                put_table(&mut out, table)?;
            }
            'A' => match value {
                Value::Array(items) => put_array(&mut out, items)?,
                other => return Err(mismatch(index, fmt, other)),
            },
            other => return Err(EncodeError::UnknownFormat(other)),
        }
    }
    if bit_count > 0 {
        out.put_u8(bits);
    }

    Ok(out.freeze())
}

/// Decode arguments described by `format` starting at `offset`.
///
/// Returns the values and the offset just past the last consumed byte.
pub fn loads(format: &str, buf: &[u8], offset: usize) -> Result<(Vec<Value>, usize), DecodeError> {
    let mut cursor = buf.get(offset..).ok_or(DecodeError::UnexpectedEof)?;
    let start = cursor.len();
    let mut values = Vec::with_capacity(format.len());
    let mut bits = 0u8;
    let mut bit_count = 0u8;

    for fmt in format.chars() {
        if fmt == 'b' {
            if bit_count == 0 {
                need(&cursor, 1)?;
                bits = cursor.get_u8();
                bit_count = 8;
            }
            values.push(Value::Bool(bits & 1 == 1));
            bits >>= 1;
            bit_count -= 1;
            continue;
        }
        bit_count = 0;

        let value = match fmt {
            'o' => {
                need(&cursor, 1)?;
                Value::U8(cursor.get_u8())
            }
            'B' => {
                need(&cursor, 2)?;
                Value::U16(cursor.get_u16())
            }
            'l' => {
                need(&cursor, 4)?;
                Value::U32(cursor.get_u32())
            }
            'L' => {
                need(&cursor, 8)?;
                Value::U64(cursor.get_u64())
            }
            'T' => {
                need(&cursor, 8)?;
                Value::Timestamp(cursor.get_u64())
            }
            's' => Value::ShortStr(get_short_str(&mut cursor)?),
            'S' => long_string_value(get_long_bytes(&mut cursor)?),
            'x' => Value::Bytes(get_long_bytes(&mut cursor)?),
            'F' => Value::Table(get_table(&mut cursor)?),
            'A' => Value::Array(get_array(&mut cursor)?),
            other => return Err(DecodeError::UnknownFormat(other)),
        };
        values.push(value);
    }

    Ok((values, offset + (start - cursor.remaining())))
}

fn mismatch(index: usize, expected: char, value: &Value) -> EncodeError {
    EncodeError::TypeMismatch {
        index,
        expected,
        found: value.kind(),
    }
}

fn unsigned<T: TryFrom<u64>>(index: usize, fmt: char, value: &Value) -> Result<T, EncodeError> {
    value
        .as_u64()
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| mismatch(index, fmt, value))
}

fn need(buf: &&[u8], n: usize) -> Result<(), DecodeError> {
    if buf.remaining() < n {
        Err(DecodeError::UnexpectedEof)
    } else {
        Ok(())
    }
}

pub(crate) fn put_short_str(out: &mut BytesMut, s: &str) -> Result<(), EncodeError> {
    let len = u8::try_from(s.len()).map_err(|_| EncodeError::StringTooLong { len: s.len() })?;
    out.put_u8(len);
    out.put_slice(s.as_bytes());
    Ok(())
}

fn put_long_bytes(out: &mut BytesMut, b: &[u8]) {
    out.put_u32(b.len() as u32);
    out.put_slice(b);
}

pub(crate) fn put_table(out: &mut BytesMut, table: &FieldTable) -> Result<(), EncodeError> {
    let mut body = BytesMut::new();
    for (key, value) in table {
        put_short_str(&mut body, key)?;
        put_field_value(&mut body, value)?;
    }
    put_long_bytes(out, &body);
    Ok(())
}

fn put_array(out: &mut BytesMut, items: &[Value]) -> Result<(), EncodeError> {
    let mut body = BytesMut::new();
    for item in items {
        put_field_value(&mut body, item)?;
    }
    put_long_bytes(out, &body);
    Ok(())
}

fn put_field_value(out: &mut BytesMut, value: &Value) -> Result<(), EncodeError> {
    match value {
        Value::Void => out.put_u8(b'V'),
        Value::Bool(v) => {
            out.put_u8(b't');
            out.put_u8(u8::from(*v));
        }
        Value::I8(v) => {
            out.put_u8(b'b');
            out.put_i8(*v);
        }
        Value::U8(v) => {
            out.put_u8(b'B');
            out.put_u8(*v);
        }
        Value::I16(v) => {
            out.put_u8(b's');
            out.put_i16(*v);
        }
        Value::U16(v) => {
            out.put_u8(b'u');
            out.put_u16(*v);
        }
        Value::I32(v) => {
            out.put_u8(b'I');
            out.put_i32(*v);
        }
        Value::U32(v) => {
            out.put_u8(b'i');
            out.put_u32(*v);
        }
        Value::I64(v) => {
            out.put_u8(b'l');
            out.put_i64(*v);
        }
        Value::U64(v) => {
            out.put_u8(b'L');
            out.put_u64(*v);
        }
        Value::F32(v) => {
            out.put_u8(b'f');
            out.put_f32(*v);
        }
        Value::F64(v) => {
            out.put_u8(b'd');
            out.put_f64(*v);
        }
        // Brokers only accept long strings inside tables.
        Value::ShortStr(s) | Value::LongStr(s) => {
            out.put_u8(b'S');
            put_long_bytes(out, s.as_bytes());
        }
        Value::Bytes(b) => {
            out.put_u8(b'x');
            put_long_bytes(out, b);
        }
        Value::Timestamp(v) => {
            out.put_u8(b'T');
            out.put_u64(*v);
        }
        Value::Table(t) => {
            out.put_u8(b'F');
            put_table(out, t)?;
        }
        Value::Array(items) => {
            out.put_u8(b'A');
            put_array(out, items)?;
        }
    }
    Ok(())
}

pub(crate) fn get_short_str(buf: &mut &[u8]) -> Result<String, DecodeError> {
    need(buf, 1)?;
    let len = buf.get_u8() as usize;
    need(buf, len)?;
    let s = std::str::from_utf8(&buf[..len])
        .map_err(|e| DecodeError::InvalidData(format!("short string is not UTF-8: {e}")))?
        .to_owned();
    buf.advance(len);
    Ok(s)
}

fn get_long_bytes(buf: &mut &[u8]) -> Result<Bytes, DecodeError> {
    need(buf, 4)?;
    let len = buf.get_u32() as usize;
    need(buf, len)?;
    Ok(buf.copy_to_bytes(len))
}

fn long_string_value(raw: Bytes) -> Value {
    match String::from_utf8(raw.to_vec()) {
        Ok(s) => Value::LongStr(s),
        Err(_) => Value::Bytes(raw),
    }
}

pub(crate) fn get_table(buf: &mut &[u8]) -> Result<FieldTable, DecodeError> {
    let raw = get_long_bytes(buf)?;
    let mut body: &[u8] = &raw;
    let mut table = FieldTable::new();
    while body.has_remaining() {
        let key = get_short_str(&mut body)?;
        let value = get_field_value(&mut body)?;
        table.insert(key, value);
    }
    Ok(table)
}

fn get_array(buf: &mut &[u8]) -> Result<Vec<Value>, DecodeError> {
    let raw = get_long_bytes(buf)?;
    let mut body: &[u8] = &raw;
    let mut items = Vec::new();
    while body.has_remaining() {
        items.push(get_field_value(&mut body)?);
    }
    Ok(items)
}

fn get_field_value(buf: &mut &[u8]) -> Result<Value, DecodeError> {
    need(buf, 1)?;
    let tag = buf.get_u8();
    let value = match tag {
        b'V' => Value::Void,
        b't' => {
            need(buf, 1)?;
            Value::Bool(buf.get_u8() != 0)
        }
        b'b' => {
            need(buf, 1)?;
            Value::I8(buf.get_i8())
        }
        b'B' => {
            need(buf, 1)?;
            Value::U8(buf.get_u8())
        }
        b's' => {
            need(buf, 2)?;
            Value::I16(buf.get_i16())
        }
        b'u' => {
            need(buf, 2)?;
            Value::U16(buf.get_u16())
        }
        b'I' => {
            need(buf, 4)?;
            Value::I32(buf.get_i32())
        }
        b'i' => {
            need(buf, 4)?;
            Value::U32(buf.get_u32())
        }
        b'l' => {
            need(buf, 8)?;
            Value::I64(buf.get_i64())
        }
        b'L' => {
            need(buf, 8)?;
            Value::U64(buf.get_u64())
        }
        b'f' => {
            need(buf, 4)?;
            Value::F32(buf.get_f32())
        }
        b'd' => {
            need(buf, 8)?;
            Value::F64(buf.get_f64())
        }
        b'S' => long_string_value(get_long_bytes(buf)?),
        b'x' => Value::Bytes(get_long_bytes(buf)?),
        b'T' => {
            need(buf, 8)?;
            Value::Timestamp(buf.get_u64())
        }
        b'F' => Value::Table(get_table(buf)?),
        b'A' => Value::Array(get_array(buf)?),
        other => {
            return Err(DecodeError::InvalidData(format!(
                "unknown field value type {:?}",
                other as char
            )));
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_bits_share_one_octet() {
        let args = [
            Value::U16(0),
            Value::from("q"),
            Value::Bool(true),
            Value::Bool(false),
            Value::Bool(true),
            Value::U8(7),
        ];
        let encoded = dumps("Bsbbbo", &args).unwrap();
        assert_eq!(&encoded[..], &[0, 0, 1, b'q', 0b101, 7]);

        let (decoded, end) = loads("Bsbbbo", &encoded, 0).unwrap();
        assert_eq!(decoded, args);
        assert_eq!(end, encoded.len());
    }

    #[test]
    fn ninth_bit_starts_a_new_octet() {
        let args: Vec<Value> = (0..9).map(|i| Value::Bool(i == 8)).collect();
        let encoded = dumps("bbbbbbbbb", &args).unwrap();
        assert_eq!(&encoded[..], &[0, 1]);
    }

    #[test]
    fn decode_respects_offset() {
        let payload = [0xAA, 0xBB, 0, 0, 0, 42];
        let (values, end) = loads("l", &payload, 2).unwrap();
        assert_eq!(values, vec![Value::U32(42)]);
        assert_eq!(end, 6);
    }

    #[test]
    fn tables_and_arrays_nest() {
        let mut inner = FieldTable::new();
        inner.insert("n".into(), Value::I32(-5));
        let mut table = FieldTable::new();
        table.insert("inner".into(), Value::Table(inner));
        table.insert(
            "list".into(),
            Value::Array(vec![Value::Bool(true), Value::LongStr("x".into())]),
        );
        table.insert("ratio".into(), Value::F64(0.5));

        let encoded = dumps("F", &[Value::Table(table.clone())]).unwrap();
        let (decoded, _) = loads("F", &encoded, 0).unwrap();
        assert_eq!(decoded, vec![Value::Table(table)]);
    }

    #[test]
    fn long_string_that_is_not_utf8_stays_bytes() {
        let encoded = dumps("x", &[Value::Bytes(Bytes::from_static(&[0xFF, 0xFE]))]).unwrap();
        let (decoded, _) = loads("S", &encoded, 0).unwrap();
        assert_eq!(decoded, vec![Value::Bytes(Bytes::from_static(&[0xFF, 0xFE]))]);
    }

    #[test]
    fn encode_rejects_wrong_argument_count() {
        let err = dumps("Bs", &[Value::U16(1)]).unwrap_err();
        assert_eq!(
            err,
            EncodeError::ArgumentCount {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn encode_rejects_out_of_range_integer() {
        let err = dumps("o", &[Value::U32(300)]).unwrap_err();
        assert!(matches!(err, EncodeError::TypeMismatch { index: 0, .. }));
    }

    #[test]
    fn encode_rejects_long_short_string() {
        let long = "x".repeat(256);
        let err = dumps("s", &[Value::ShortStr(long)]).unwrap_err();
        assert_eq!(err, EncodeError::StringTooLong { len: 256 });
    }

    #[test]
    fn truncated_payload_is_an_error() {
        assert_eq!(loads("l", &[0, 0], 0), Err(DecodeError::UnexpectedEof));
        assert_eq!(loads("o", &[1], 4), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn unknown_format_is_an_error() {
        assert_eq!(loads("?", &[], 0), Err(DecodeError::UnknownFormat('?')));
        assert_eq!(
            dumps("?", &[Value::Void]),
            Err(EncodeError::UnknownFormat('?'))
        );
    }
}
