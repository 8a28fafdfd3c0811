//! MessagePack stream codec.
//!
//! Every message on the control-plane stream is one self-delimiting
//! MessagePack value: request and response headers, then bodies. The decoder
//! yields exactly one complete value per frame and leaves a partial value
//! buffered until the rest of it arrives.

use bytes::{BufMut, Bytes, BytesMut};
use rmp::Marker;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

/// Upper bound on a single buffered message.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Deepest array and map nesting accepted in one message.
pub const MAX_DEPTH: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("Invalid MessagePack marker 0x{0:02x}")]
    InvalidMarker(u8),

    #[error("Message exceeds {MAX_FRAME_LEN} bytes")]
    FrameTooLarge,

    #[error("Message nests deeper than {MAX_DEPTH} levels")]
    TooDeep,

    #[error("Connection closed by server")]
    Closed,
}

/// Splits the stream into one MessagePack value per frame.
///
/// Scanning resumes where the previous call stopped, so a large value that
/// arrives over many reads is walked once.
#[derive(Debug, Default)]
pub struct MsgpackCodec {
    scan: Scan,
}

impl MsgpackCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Progress through the value at the front of the buffer.
#[derive(Debug, Default)]
struct Scan {
    /// Bytes of the value already walked.
    pos: usize,
    /// Items still owed at each open nesting level, innermost last.
    pending: Vec<u64>,
}

enum Progress {
    /// The value is complete and this many bytes long.
    Complete(usize),
    /// More input is needed. Carries the buffer length the current item ends
    /// at once its size is known.
    Partial(Option<usize>),
}

/// Encoded size of one item, not counting the items nested inside it.
struct Item {
    header: usize,
    body: usize,
    children: u64,
}

impl Item {
    fn scalar(header: usize, body: usize) -> Option<Self> {
        Some(Self {
            header,
            body,
            children: 0,
        })
    }

    fn container(header: usize, children: u64) -> Option<Self> {
        Some(Self {
            header,
            body: 0,
            children,
        })
    }
}

/// Big-endian length field of `width` bytes following the marker.
fn length_field(buf: &[u8], width: usize) -> Option<usize> {
    let bytes = buf.get(1..1 + width)?;
    Some(bytes.iter().fold(0usize, |acc, b| (acc << 8) | usize::from(*b)))
}

/// Size of the item starting at `buf[0]`, or `None` while its length field
/// is still incomplete.
fn item_at(buf: &[u8]) -> Result<Option<Item>, CodecError> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    let sized = |width: usize, extra: usize| {
        length_field(buf, width).and_then(|len| Item::scalar(1 + width + extra, len))
    };
    let counted = |width: usize, per: u64| {
        length_field(buf, width).and_then(|n| Item::container(1 + width, n as u64 * per))
    };

    let item = match Marker::from_u8(first) {
        Marker::FixPos(_) | Marker::FixNeg(_) | Marker::Null | Marker::True | Marker::False => {
            Item::scalar(1, 0)
        }
        Marker::U8 | Marker::I8 => Item::scalar(1, 1),
        Marker::U16 | Marker::I16 => Item::scalar(1, 2),
        Marker::U32 | Marker::I32 | Marker::F32 => Item::scalar(1, 4),
        Marker::U64 | Marker::I64 | Marker::F64 => Item::scalar(1, 8),
        Marker::FixStr(len) => Item::scalar(1, usize::from(len)),
        Marker::Str8 | Marker::Bin8 => sized(1, 0),
        Marker::Str16 | Marker::Bin16 => sized(2, 0),
        Marker::Str32 | Marker::Bin32 => sized(4, 0),
        Marker::FixArray(n) => Item::container(1, u64::from(n)),
        Marker::Array16 => counted(2, 1),
        Marker::Array32 => counted(4, 1),
        Marker::FixMap(n) => Item::container(1, u64::from(n) * 2),
        Marker::Map16 => counted(2, 2),
        Marker::Map32 => counted(4, 2),
        // Fixed extensions carry a type byte, then the data.
        Marker::FixExt1 => Item::scalar(2, 1),
        Marker::FixExt2 => Item::scalar(2, 2),
        Marker::FixExt4 => Item::scalar(2, 4),
        Marker::FixExt8 => Item::scalar(2, 8),
        Marker::FixExt16 => Item::scalar(2, 16),
        Marker::Ext8 => sized(1, 1),
        Marker::Ext16 => sized(2, 1),
        Marker::Ext32 => sized(4, 1),
        Marker::Reserved => return Err(CodecError::InvalidMarker(first)),
    };
    Ok(item)
}

impl Scan {
    fn advance(&mut self, buf: &[u8]) -> Result<Progress, CodecError> {
        if self.pending.is_empty() {
            self.pending.push(1);
        }

        loop {
            while self.pending.last() == Some(&0) {
                self.pending.pop();
            }
            if self.pending.is_empty() {
                return Ok(Progress::Complete(std::mem::take(&mut self.pos)));
            }

            let Some(item) = item_at(&buf[self.pos..])? else {
                return Ok(Progress::Partial(None));
            };
            let end = self
                .pos
                .saturating_add(item.header)
                .saturating_add(item.body);
            if end > MAX_FRAME_LEN {
                return Err(CodecError::FrameTooLarge);
            }
            if end > buf.len() {
                return Ok(Progress::Partial(Some(end)));
            }

            self.pos = end;
            if let Some(owed) = self.pending.last_mut() {
                *owed -= 1;
            }
            if item.children > 0 {
                if self.pending.len() > MAX_DEPTH {
                    return Err(CodecError::TooDeep);
                }
                self.pending.push(item.children);
            }
        }
    }
}

impl Decoder for MsgpackCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, CodecError> {
        let progress = match self.scan.advance(&src[..]) {
            Ok(progress) => progress,
            Err(e) => {
                self.scan = Scan::default();
                return Err(e);
            }
        };

        match progress {
            Progress::Complete(len) => Ok(Some(src.split_to(len).freeze())),
            Progress::Partial(until) => {
                if src.len() > MAX_FRAME_LEN {
                    self.scan = Scan::default();
                    return Err(CodecError::FrameTooLarge);
                }
                if let Some(end) = until {
                    src.reserve(end - src.len());
                }
                Ok(None)
            }
        }
    }
}

impl<T: Serialize> Encoder<T> for MsgpackCodec {
    type Error = CodecError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), CodecError> {
        rmp_serde::encode::write_named(&mut dst.writer(), &item)?;
        Ok(())
    }
}

/// Decode a complete frame into a typed message.
pub fn decode_frame<T: DeserializeOwned>(frame: &[u8]) -> Result<T, CodecError> {
    Ok(rmp_serde::from_slice(frame)?)
}

/// Encode a message the way the codec puts it on the wire.
pub fn encode_message<T: Serialize + ?Sized>(msg: &T) -> Result<Vec<u8>, CodecError> {
    Ok(rmp_serde::to_vec_named(msg)?)
}
