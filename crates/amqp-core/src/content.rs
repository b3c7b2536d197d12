//! Message content: body plus basic properties.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::serialization::{get_short_str, get_table, put_short_str, put_table};
use crate::{DecodeError, EncodeError, FieldTable};

/// Content body, either raw or transcoded to text by auto-decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Bytes(Bytes),
    Text(String),
}

impl Body {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Bytes(b) => b,
            Body::Text(s) => s.as_bytes(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(s) => Some(s),
            Body::Bytes(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Basic-class content properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub headers: Option<FieldTable>,
    pub delivery_mode: Option<u8>,
    pub priority: Option<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub expiration: Option<String>,
    pub message_id: Option<String>,
    pub timestamp: Option<u64>,
    pub kind: Option<String>,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
}

const FLAG_CONTENT_TYPE: u16 = 1 << 15;
const FLAG_CONTENT_ENCODING: u16 = 1 << 14;
const FLAG_HEADERS: u16 = 1 << 13;
const FLAG_DELIVERY_MODE: u16 = 1 << 12;
const FLAG_PRIORITY: u16 = 1 << 11;
const FLAG_CORRELATION_ID: u16 = 1 << 10;
const FLAG_REPLY_TO: u16 = 1 << 9;
const FLAG_EXPIRATION: u16 = 1 << 8;
const FLAG_MESSAGE_ID: u16 = 1 << 7;
const FLAG_TIMESTAMP: u16 = 1 << 6;
const FLAG_TYPE: u16 = 1 << 5;
const FLAG_USER_ID: u16 = 1 << 4;
const FLAG_APP_ID: u16 = 1 << 3;

impl Properties {
    /// Encode as `property_flags` followed by the present properties.
    pub(crate) fn encode(&self, out: &mut BytesMut) -> Result<(), EncodeError> {
        let mut flags = 0u16;
        let mut body = BytesMut::new();

        let short_strs = [
            (FLAG_CONTENT_TYPE, &self.content_type),
            (FLAG_CONTENT_ENCODING, &self.content_encoding),
        ];
        for (flag, value) in short_strs {
            if let Some(s) = value {
                flags |= flag;
                put_short_str(&mut body, s)?;
            }
        }
        if let Some(headers) = &self.headers {
            flags |= FLAG_HEADERS;
            put_table(&mut body, headers)?;
        }
        if let Some(mode) = self.delivery_mode {
            flags |= FLAG_DELIVERY_MODE;
            body.put_u8(mode);
        }
        if let Some(priority) = self.priority {
            flags |= FLAG_PRIORITY;
            body.put_u8(priority);
        }
        let short_strs = [
            (FLAG_CORRELATION_ID, &self.correlation_id),
            (FLAG_REPLY_TO, &self.reply_to),
            (FLAG_EXPIRATION, &self.expiration),
            (FLAG_MESSAGE_ID, &self.message_id),
        ];
        for (flag, value) in short_strs {
            if let Some(s) = value {
                flags |= flag;
                put_short_str(&mut body, s)?;
            }
        }
        if let Some(ts) = self.timestamp {
            flags |= FLAG_TIMESTAMP;
            body.put_u64(ts);
        }
        let short_strs = [
            (FLAG_TYPE, &self.kind),
            (FLAG_USER_ID, &self.user_id),
            (FLAG_APP_ID, &self.app_id),
        ];
        for (flag, value) in short_strs {
            if let Some(s) = value {
                flags |= flag;
                put_short_str(&mut body, s)?;
            }
        }

        out.put_u16(flags);
        out.put_slice(&body);
        Ok(())
    }

    pub(crate) fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        if buf.remaining() < 2 {
            return Err(DecodeError::UnexpectedEof);
        }
        let flags = buf.get_u16();
        let mut props = Properties::default();
        let has = |flag: u16| flags & flag != 0;

        if has(FLAG_CONTENT_TYPE) {
            props.content_type = Some(get_short_str(buf)?);
        }
        if has(FLAG_CONTENT_ENCODING) {
            props.content_encoding = Some(get_short_str(buf)?);
        }
        if has(FLAG_HEADERS) {
            props.headers = Some(get_table(buf)?);
        }
        if has(FLAG_DELIVERY_MODE) {
            props.delivery_mode = Some(get_octet(buf)?);
        }
        if has(FLAG_PRIORITY) {
            props.priority = Some(get_octet(buf)?);
        }
        if has(FLAG_CORRELATION_ID) {
            props.correlation_id = Some(get_short_str(buf)?);
        }
        if has(FLAG_REPLY_TO) {
            props.reply_to = Some(get_short_str(buf)?);
        }
        if has(FLAG_EXPIRATION) {
            props.expiration = Some(get_short_str(buf)?);
        }
        if has(FLAG_MESSAGE_ID) {
            props.message_id = Some(get_short_str(buf)?);
        }
        if has(FLAG_TIMESTAMP) {
            if buf.remaining() < 8 {
                return Err(DecodeError::UnexpectedEof);
            }
            props.timestamp = Some(buf.get_u64());
        }
        if has(FLAG_TYPE) {
            props.kind = Some(get_short_str(buf)?);
        }
        if has(FLAG_USER_ID) {
            props.user_id = Some(get_short_str(buf)?);
        }
        if has(FLAG_APP_ID) {
            props.app_id = Some(get_short_str(buf)?);
        }
        Ok(props)
    }
}

fn get_octet(buf: &mut &[u8]) -> Result<u8, DecodeError> {
    if !buf.has_remaining() {
        return Err(DecodeError::UnexpectedEof);
    }
    Ok(buf.get_u8())
}

/// A content body together with its properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub body: Body,
    pub properties: Properties,
}

impl Content {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: Body::Bytes(body.into()),
            properties: Properties::default(),
        }
    }

    pub fn with_properties(body: impl Into<Bytes>, properties: Properties) -> Self {
        Self {
            body: Body::Bytes(body.into()),
            properties,
        }
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.properties.content_encoding.as_deref()
    }

    /// Transcode a raw body using the declared content encoding.
    ///
    /// Leaves the content untouched and returns the error when the encoding is
    /// unknown or the bytes are invalid for it. Does nothing when no encoding
    /// is declared or the body is already text.
    pub fn auto_decode(&mut self) -> Result<(), DecodeError> {
        let (Some(encoding), Body::Bytes(raw)) = (self.content_encoding(), &self.body) else {
            return Ok(());
        };
        let text = transcode(encoding, raw)?;
        self.body = Body::Text(text);
        Ok(())
    }
}

/// Decode `raw` as text in the named encoding.
pub fn transcode(encoding: &str, raw: &[u8]) -> Result<String, DecodeError> {
    match encoding.to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" => String::from_utf8(raw.to_vec())
            .map_err(|e| DecodeError::InvalidData(format!("body is not utf-8: {e}"))),
        "ascii" | "us-ascii" => {
            if raw.is_ascii() {
                Ok(raw.iter().map(|&b| b as char).collect())
            } else {
                Err(DecodeError::InvalidData("body is not ascii".into()))
            }
        }
        "latin-1" | "latin1" | "iso-8859-1" => Ok(raw.iter().map(|&b| b as char).collect()),
        other => Err(DecodeError::InvalidData(format!(
            "unsupported content encoding {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_decode_transcodes_declared_encoding() {
        let mut content = Content::with_properties(
            "caf\u{e9}".as_bytes().to_vec(),
            Properties {
                content_encoding: Some("UTF-8".into()),
                ..Properties::default()
            },
        );
        content.auto_decode().unwrap();
        assert_eq!(content.body.as_text(), Some("caf\u{e9}"));
    }

    #[test]
    fn auto_decode_keeps_bytes_on_unknown_encoding() {
        let mut content = Content::with_properties(
            b"payload".to_vec(),
            Properties {
                content_encoding: Some("no-such-codec".into()),
                ..Properties::default()
            },
        );
        assert!(content.auto_decode().is_err());
        assert_eq!(content.body, Body::Bytes(Bytes::from_static(b"payload")));
    }

    #[test]
    fn latin1_maps_every_byte() {
        assert_eq!(transcode("latin-1", &[0x63, 0xE9]).unwrap(), "c\u{e9}");
        assert!(transcode("ascii", &[0xE9]).is_err());
    }

    #[test]
    fn properties_survive_encoding() {
        let mut headers = FieldTable::new();
        headers.insert("x-retry".into(), crate::Value::I32(3));
        let props = Properties {
            content_type: Some("text/plain".into()),
            content_encoding: Some("utf-8".into()),
            headers: Some(headers),
            delivery_mode: Some(2),
            correlation_id: Some("abc".into()),
            timestamp: Some(1_700_000_000),
            app_id: Some("tests".into()),
            ..Properties::default()
        };
        let mut out = BytesMut::new();
        props.encode(&mut out).unwrap();

        let mut buf: &[u8] = &out;
        let decoded = Properties::decode(&mut buf).unwrap();
        assert_eq!(decoded, props);
        assert!(buf.is_empty());
    }
}
