pub mod codec;
pub mod error;
pub mod event;

pub use crate::{
    codec::SseCodec,
    error::{Result, SseError},
    event::{DEFAULT_EVENT, SseEvent},
};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Decode every complete event in `src`, treating it as the end of the stream.
pub fn decode_all(src: &mut BytesMut) -> Result<Vec<SseEvent>> {
    let mut codec = SseCodec::new();
    let mut events = Vec::new();
    while let Some(event) = codec.decode(src)? {
        events.push(event);
    }
    while let Some(event) = codec.decode_eof(src)? {
        events.push(event);
    }
    Ok(events)
}
