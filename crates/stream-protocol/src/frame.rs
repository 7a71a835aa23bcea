//! Frame codec (spec §4.1): the 4- or 8-byte transport header and the
//! `tokio_util` codec that turns a byte stream into `Frame`s.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::StreamError;

const SIGNAL_NUMBER_MASK: u32 = 0x000f_ffff;
const SHORT_LENGTH_SHIFT: u32 = 20;
const SHORT_LENGTH_MASK: u32 = 0xff;
const TYPE_SHIFT: u32 = 28;
const TYPE_MASK: u32 = 0x3;

/// Short length values above this must use the 8-byte extended header.
pub const MAX_SHORT_LENGTH: u32 = 0xff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    SignalData = 1,
    MetaInformation = 2,
}

impl TransportType {
    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            1 => Some(Self::SignalData),
            2 => Some(Self::MetaInformation),
            _ => None,
        }
    }
}

/// A fully decoded frame: the routing key, its transport type, and the
/// payload bytes (never empty).
#[derive(Debug, Clone)]
pub struct Frame {
    pub transport_type: TransportType,
    pub signal_number: u32,
    pub payload: Bytes,
}

/// Encodes a frame header for `payload_len` bytes following.
///
/// Returns 4 bytes if `payload_len` fits the short-length field
/// (`1..=255`), 8 bytes otherwise. Fails if `payload_len == 0` or if a
/// stream-scoped (`signal_number == 0`) header is asked to carry
/// signal data.
pub fn encode_header(
    transport_type: TransportType,
    signal_number: u32,
    payload_len: u32,
) -> Result<Vec<u8>, StreamError> {
    if payload_len == 0 {
        return Err(StreamError::MalformedHeader {
            reason: "payload length must be nonzero",
        });
    }
    if signal_number == 0 && transport_type == TransportType::SignalData {
        return Err(StreamError::MalformedHeader {
            reason: "stream-scoped frame cannot carry signal data",
        });
    }
    let type_bits = (transport_type as u32) << TYPE_SHIFT;
    let mut out = Vec::with_capacity(8);
    if payload_len <= MAX_SHORT_LENGTH {
        let word = (signal_number & SIGNAL_NUMBER_MASK)
            | type_bits
            | ((payload_len & SHORT_LENGTH_MASK) << SHORT_LENGTH_SHIFT);
        out.extend_from_slice(&word.to_le_bytes());
    } else {
        let word = (signal_number & SIGNAL_NUMBER_MASK) | type_bits;
        out.extend_from_slice(&word.to_le_bytes());
        out.extend_from_slice(&payload_len.to_le_bytes());
    }
    Ok(out)
}

struct DecodedHeaderWord {
    transport_type: TransportType,
    signal_number: u32,
    short_length: u32,
}

fn decode_header_word(word: u32) -> Result<DecodedHeaderWord, StreamError> {
    let reserved = word >> 30;
    if reserved != 0 {
        return Err(StreamError::MalformedHeader {
            reason: "reserved header bits are set",
        });
    }
    let signal_number = word & SIGNAL_NUMBER_MASK;
    let type_bits = (word >> TYPE_SHIFT) & TYPE_MASK;
    let transport_type = TransportType::from_bits(type_bits).ok_or(StreamError::MalformedHeader {
        reason: "transport type must be 1 (signal data) or 2 (meta information)",
    })?;
    if signal_number == 0 && transport_type == TransportType::SignalData {
        return Err(StreamError::MalformedHeader {
            reason: "stream-scoped frame cannot carry signal data",
        });
    }
    let short_length = (word >> SHORT_LENGTH_SHIFT) & SHORT_LENGTH_MASK;
    Ok(DecodedHeaderWord {
        transport_type,
        signal_number,
        short_length,
    })
}

/// `tokio_util::codec::Decoder`/`Encoder` implementation driving the
/// frame-level state machine over any `AsyncRead + AsyncWrite`
/// transport wrapped in `Framed`.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = StreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, StreamError> {
        if src.len() < 4 {
            return Ok(None);
        }
        let word = u32::from_le_bytes(src[0..4].try_into().unwrap());
        let decoded = decode_header_word(word)?;

        let (header_len, length) = if decoded.short_length == 0 {
            if src.len() < 8 {
                return Ok(None);
            }
            let length = u32::from_le_bytes(src[4..8].try_into().unwrap());
            (8usize, length)
        } else {
            (4usize, decoded.short_length)
        };

        if src.len() < header_len + length as usize {
            src.reserve(header_len + length as usize - src.len());
            return Ok(None);
        }

        src.advance(header_len);
        let payload = src.split_to(length as usize).freeze();
        Ok(Some(Frame {
            transport_type: decoded.transport_type,
            signal_number: decoded.signal_number,
            payload,
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = StreamError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), StreamError> {
        let header = encode_header(
            frame.transport_type,
            frame.signal_number,
            frame.payload.len() as u32,
        )?;
        dst.extend_from_slice(&header);
        dst.extend_from_slice(&frame.payload);
        Ok(())
    }
}
