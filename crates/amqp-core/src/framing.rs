//! AMQP 0-9-1 wire framing.
//!
//! Every wire frame is `type: u8, channel: u16, size: u32, payload, 0xCE`.
//! A method with content is sent as one method frame, one content header
//! frame and zero or more body frames; [`FrameAssembler`] puts them back
//! together on the receiving side.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{Body, Content, EncodeError, Frame, MethodSig, MethodTable, Properties, TransportError};

pub const FRAME_METHOD: u8 = 1;
pub const FRAME_HEADER: u8 = 2;
pub const FRAME_BODY: u8 = 3;
pub const FRAME_HEARTBEAT: u8 = 8;
pub const FRAME_END: u8 = 0xCE;

/// Bytes of framing around each payload: 7 header bytes plus the end octet.
pub const FRAME_OVERHEAD: usize = 8;

/// Frame size negotiated by default with most brokers.
pub const DEFAULT_FRAME_MAX: u32 = 131_072;

/// Upper bound on the body buffer reserved up front; the declared size comes
/// from the peer, so larger bodies grow as their frames arrive.
const INITIAL_BODY_CAPACITY: usize = DEFAULT_FRAME_MAX as usize;

/// A single frame as read off the wire, before reassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub kind: u8,
    pub channel: u16,
    pub payload: Bytes,
}

fn put_raw(out: &mut BytesMut, kind: u8, channel: u16, payload: &[u8]) {
    out.reserve(payload.len() + FRAME_OVERHEAD);
    out.put_u8(kind);
    out.put_u16(channel);
    out.put_u32(payload.len() as u32);
    out.put_slice(payload);
    out.put_u8(FRAME_END);
}

/// Append the wire frames for `frame` to `out`.
pub fn encode_frame(frame: &Frame, frame_max: u32, out: &mut BytesMut) -> Result<(), EncodeError> {
    let mut method = BytesMut::with_capacity(4 + frame.payload.len());
    method.put_u16(frame.sig.class_id);
    method.put_u16(frame.sig.method_id);
    method.put_slice(&frame.payload);
    put_raw(out, FRAME_METHOD, frame.channel_id, &method);

    let Some(content) = &frame.content else {
        return Ok(());
    };

    let body = content.body.as_bytes();
    let mut header = BytesMut::new();
    header.put_u16(frame.sig.class_id);
    header.put_u16(0);
    header.put_u64(body.len() as u64);
    content.properties.encode(&mut header)?;
    put_raw(out, FRAME_HEADER, frame.channel_id, &header);

    let chunk_size = (frame_max as usize).saturating_sub(FRAME_OVERHEAD).max(1);
    for chunk in body.chunks(chunk_size) {
        put_raw(out, FRAME_BODY, frame.channel_id, chunk);
    }
    Ok(())
}

/// Split one complete wire frame off the front of `buf`.
///
/// Returns `Ok(None)` when `buf` does not yet hold a whole frame; nothing is
/// consumed in that case.
pub fn parse_raw_frame(buf: &mut BytesMut, frame_max: u32) -> Result<Option<RawFrame>, TransportError> {
    if buf.len() < 7 {
        return Ok(None);
    }
    let kind = buf[0];
    let channel = u16::from_be_bytes([buf[1], buf[2]]);
    let size = u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]) as usize;
    if size > frame_max as usize {
        return Err(TransportError::Framing(format!(
            "frame of {size} bytes exceeds frame_max {frame_max}"
        )));
    }
    if buf.len() < size + FRAME_OVERHEAD {
        return Ok(None);
    }

    buf.advance(7);
    let payload = buf.split_to(size).freeze();
    let end = buf.get_u8();
    if end != FRAME_END {
        return Err(TransportError::Framing(format!(
            "bad frame end octet {end:#04x}"
        )));
    }
    Ok(Some(RawFrame {
        kind,
        channel,
        payload,
    }))
}

#[derive(Debug)]
enum Partial {
    AwaitingHeader {
        sig: MethodSig,
        args: Bytes,
    },
    AwaitingBody {
        sig: MethodSig,
        args: Bytes,
        properties: Properties,
        expected: usize,
        body: BytesMut,
    },
}

/// Reassembles method, header and body frames into [`Frame`]s, per channel.
#[derive(Debug)]
pub struct FrameAssembler {
    methods: Arc<MethodTable>,
    partial: HashMap<u16, Partial>,
}

impl FrameAssembler {
    pub fn new(methods: Arc<MethodTable>) -> Self {
        Self {
            methods,
            partial: HashMap::new(),
        }
    }

    /// Feed one raw frame. Returns a frame once a method (and its content,
    /// when the method carries content) is complete.
    pub fn push(&mut self, raw: RawFrame) -> Result<Option<Frame>, TransportError> {
        let channel = raw.channel;
        match raw.kind {
            FRAME_METHOD => {
                if self.partial.contains_key(&channel) {
                    return Err(TransportError::Framing(format!(
                        "method frame on channel {channel} while content is pending"
                    )));
                }
                let mut payload = raw.payload;
                if payload.len() < 4 {
                    return Err(TransportError::Framing(format!(
                        "method frame of {} bytes is too short",
                        payload.len()
                    )));
                }
                let sig = MethodSig::new(payload.get_u16(), payload.get_u16());
                if self.methods.carries_content(sig) {
                    self.partial.insert(channel, Partial::AwaitingHeader { sig, args: payload });
                    Ok(None)
                } else {
                    Ok(Some(Frame::new(channel, sig, payload)))
                }
            }
            FRAME_HEADER => {
                let Some(Partial::AwaitingHeader { sig, args }) = self.partial.remove(&channel)
                else {
                    return Err(TransportError::Framing(format!(
                        "unexpected content header on channel {channel}"
                    )));
                };
                let mut header: &[u8] = &raw.payload;
                if header.remaining() < 12 {
                    return Err(TransportError::Framing("content header too short".into()));
                }
                let _class_id = header.get_u16();
                let _weight = header.get_u16();
                let declared = header.get_u64();
                let expected = usize::try_from(declared).map_err(|_| {
                    TransportError::Framing(format!(
                        "content body of {declared} bytes does not fit in memory"
                    ))
                })?;
                let properties = Properties::decode(&mut header)?;

                if expected == 0 {
                    let content = Content::with_properties(Bytes::new(), properties);
                    return Ok(Some(Frame::with_content(channel, sig, args, content)));
                }
                self.partial.insert(
                    channel,
                    Partial::AwaitingBody {
                        sig,
                        args,
                        properties,
                        expected,
                        body: BytesMut::with_capacity(expected.min(INITIAL_BODY_CAPACITY)),
                    },
                );
                Ok(None)
            }
            FRAME_BODY => {
                let Some(Partial::AwaitingBody {
                    sig,
                    args,
                    properties,
                    expected,
                    mut body,
                }) = self.partial.remove(&channel)
                else {
                    return Err(TransportError::Framing(format!(
                        "unexpected body frame on channel {channel}"
                    )));
                };
                body.extend_from_slice(&raw.payload);
                if body.len() > expected {
                    return Err(TransportError::Framing(format!(
                        "content body of {} bytes exceeds declared {expected}",
                        body.len()
                    )));
                }
                if body.len() == expected {
                    let content = Content {
                        body: Body::Bytes(body.freeze()),
                        properties,
                    };
                    return Ok(Some(Frame::with_content(channel, sig, args, content)));
                }
                self.partial.insert(
                    channel,
                    Partial::AwaitingBody {
                        sig,
                        args,
                        properties,
                        expected,
                        body,
                    },
                );
                Ok(None)
            }
            FRAME_HEARTBEAT => {
                tracing::trace!(channel, "heartbeat frame");
                Ok(None)
            }
            other => Err(TransportError::Framing(format!(
                "unknown frame type {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    fn assembler() -> FrameAssembler {
        FrameAssembler::new(Arc::new(catalog::amqp_0_9_1()))
    }

    fn read_all(wire: &mut BytesMut, assembler: &mut FrameAssembler) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(raw) = parse_raw_frame(wire, DEFAULT_FRAME_MAX).unwrap() {
            if let Some(frame) = assembler.push(raw).unwrap() {
                frames.push(frame);
            }
        }
        frames
    }

    #[test]
    fn method_frame_layout() {
        let frame = Frame::new(3, catalog::BASIC_ACK, vec![0, 0, 0, 0, 0, 0, 0, 9, 0]);
        let mut wire = BytesMut::new();
        encode_frame(&frame, DEFAULT_FRAME_MAX, &mut wire).unwrap();

        assert_eq!(&wire[..7], &[FRAME_METHOD, 0, 3, 0, 0, 0, 13]);
        assert_eq!(&wire[7..11], &[0, 60, 0, 80]);
        assert_eq!(wire[wire.len() - 1], FRAME_END);
    }

    #[test]
    fn content_is_split_into_body_frames_and_reassembled() {
        let content = Content::with_properties(
            vec![7u8; 25],
            Properties {
                content_type: Some("application/octet-stream".into()),
                ..Properties::default()
            },
        );
        let frame = Frame::with_content(1, catalog::BASIC_DELIVER, vec![1, 2], content);

        let mut wire = BytesMut::new();
        encode_frame(&frame, 18, &mut wire).unwrap();
        // method + header + three 10-byte body frames
        let raw_count = {
            let mut copy = wire.clone();
            let mut n = 0;
            while parse_raw_frame(&mut copy, DEFAULT_FRAME_MAX).unwrap().is_some() {
                n += 1;
            }
            n
        };
        assert_eq!(raw_count, 5);

        let frames = read_all(&mut wire, &mut assembler());
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn empty_body_completes_on_header() {
        let frame = Frame::with_content(2, catalog::BASIC_GET_OK, Bytes::new(), Content::new(Bytes::new()));
        let mut wire = BytesMut::new();
        encode_frame(&frame, DEFAULT_FRAME_MAX, &mut wire).unwrap();
        assert_eq!(read_all(&mut wire, &mut assembler()), vec![frame]);
    }

    #[test]
    fn partial_input_waits_for_more_bytes() {
        let frame = Frame::new(0, catalog::CONNECTION_CLOSE_OK, Bytes::new());
        let mut full = BytesMut::new();
        encode_frame(&frame, DEFAULT_FRAME_MAX, &mut full).unwrap();

        let mut wire = BytesMut::from(&full[..5]);
        assert_eq!(parse_raw_frame(&mut wire, DEFAULT_FRAME_MAX).unwrap(), None);
        assert_eq!(wire.len(), 5);
        wire.extend_from_slice(&full[5..]);
        assert!(parse_raw_frame(&mut wire, DEFAULT_FRAME_MAX).unwrap().is_some());
        assert!(wire.is_empty());
    }

    #[test]
    fn heartbeats_are_skipped() {
        let mut wire = BytesMut::new();
        put_raw(&mut wire, FRAME_HEARTBEAT, 0, &[]);
        encode_frame(
            &Frame::new(0, catalog::CONNECTION_CLOSE_OK, Bytes::new()),
            DEFAULT_FRAME_MAX,
            &mut wire,
        )
        .unwrap();
        let frames = read_all(&mut wire, &mut assembler());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].sig, catalog::CONNECTION_CLOSE_OK);
    }

    #[test]
    fn oversized_declared_body_does_not_preallocate() {
        let mut assembler = assembler();
        let method = RawFrame {
            kind: FRAME_METHOD,
            channel: 1,
            payload: Bytes::from_static(&[0, 60, 0, 60]),
        };
        assert_eq!(assembler.push(method).unwrap(), None);

        let mut header = BytesMut::new();
        header.put_u16(60);
        header.put_u16(0);
        header.put_u64(u64::MAX / 2);
        Properties::default().encode(&mut header).unwrap();
        let header = RawFrame {
            kind: FRAME_HEADER,
            channel: 1,
            payload: header.freeze(),
        };
        assert_eq!(assembler.push(header).unwrap(), None);

        let body = RawFrame {
            kind: FRAME_BODY,
            channel: 1,
            payload: Bytes::from_static(b"partial"),
        };
        assert_eq!(assembler.push(body).unwrap(), None);
    }

    #[test]
    fn bad_end_octet_is_rejected() {
        let mut wire = BytesMut::new();
        put_raw(&mut wire, FRAME_METHOD, 0, &[0, 10, 0, 51]);
        let last = wire.len() - 1;
        wire[last] = 0;
        assert!(matches!(
            parse_raw_frame(&mut wire, DEFAULT_FRAME_MAX),
            Err(TransportError::Framing(_))
        ));
    }

    #[test]
    fn body_without_header_is_rejected() {
        let raw = RawFrame {
            kind: FRAME_BODY,
            channel: 1,
            payload: Bytes::from_static(b"stray"),
        };
        assert!(matches!(
            assembler().push(raw),
            Err(TransportError::Framing(_))
        ));
    }
}
