//! Frame extraction for stream links.
//!
//! TAK servers speak two stream framings and may switch between them:
//! plain XML documents delimited by the `</event>` close tag, and TAK
//! protocol stream frames with a varint length prefix. The splitter
//! sniffs each frame head and handles both, so one read loop serves
//! every TCP and TLS link. Extracted frames keep their framing bytes;
//! the decoder downstream already dispatches on them.

use crate::{InboundFrame, TransportError, TransportStats};
use bytes::{Buf, Bytes, BytesMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};
use vigiltak_cot::parser::{read_varint, DecodeError};

/// Upper bound for a single frame on a stream link.
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

const EVENT_CLOSE_TAG: &[u8] = b"</event>";
const SELF_CLOSED_EVENT: &[u8] = b"/>";

/// Pulls one complete frame off the front of `buffer`, if present.
///
/// Returns `Ok(None)` when more bytes are needed. Leading noise between
/// frames (stray whitespace, newline keepalives) is skipped.
pub fn extract_frame(
    buffer: &mut BytesMut,
    max_frame_size: usize,
) -> Result<Option<Bytes>, TransportError> {
    // Skip inter-frame whitespace so newline-delimited senders work too.
    // A whitespace byte read as a varint would declare a frame under 33
    // bytes, smaller than any real TakMessage, so nothing is lost.
    while buffer.first().is_some_and(|b| b.is_ascii_whitespace()) {
        buffer.advance(1);
    }
    if buffer.is_empty() {
        return Ok(None);
    }

    if buffer[0] == b'<' {
        return extract_xml_frame(buffer, max_frame_size);
    }

    match read_varint(buffer) {
        Ok((len, consumed)) => {
            let len = len as usize;
            if len > max_frame_size {
                return Err(TransportError::FrameTooLarge {
                    size: len,
                    max: max_frame_size,
                });
            }
            let total = consumed + len;
            if buffer.len() < total {
                return Ok(None);
            }
            Ok(Some(buffer.split_to(total).freeze()))
        }
        // A varint never spans more than ten bytes; fewer than ten in
        // the buffer may just be a partial prefix.
        Err(DecodeError::InvalidVarint) if buffer.len() < 10 => Ok(None),
        Err(_) => Err(TransportError::BadFrame),
    }
}

fn extract_xml_frame(
    buffer: &mut BytesMut,
    max_frame_size: usize,
) -> Result<Option<Bytes>, TransportError> {
    if let Some(pos) = buffer
        .windows(EVENT_CLOSE_TAG.len())
        .position(|w| w == EVENT_CLOSE_TAG)
    {
        let end = pos + EVENT_CLOSE_TAG.len();
        return Ok(Some(buffer.split_to(end).freeze()));
    }
    // Pings like <event .../> carry no close tag; take a self-closed
    // document if the buffer holds exactly one element.
    if let Some(pos) = buffer
        .windows(SELF_CLOSED_EVENT.len())
        .position(|w| w == SELF_CLOSED_EVENT)
    {
        let end = pos + SELF_CLOSED_EVENT.len();
        if !buffer[..pos].contains(&b'>') && buffer[..pos].starts_with(b"<event") {
            return Ok(Some(buffer.split_to(end).freeze()));
        }
    }
    if buffer.len() > max_frame_size {
        return Err(TransportError::FrameTooLarge {
            size: buffer.len(),
            max: max_frame_size,
        });
    }
    Ok(None)
}

/// Runs the receive side of a stream link: reads into a buffer, splits
/// out frames and forwards them on the inbound channel. Exits when the
/// peer closes, the link misbehaves or the channel is dropped.
///
/// The read timeout is an idle tick, not an error: a quiet link is
/// normal, and the tick is what lets the task notice shutdown.
pub(crate) fn spawn_read_loop<R>(
    mut reader: R,
    link: String,
    read_timeout: Duration,
    inbound: flume::Sender<InboundFrame>,
    stats: Arc<TransportStats>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = BytesMut::with_capacity(8 * 1024);
        loop {
            loop {
                match extract_frame(&mut buffer, MAX_FRAME_SIZE) {
                    Ok(Some(frame)) => {
                        stats.record_receive(frame.len());
                        let msg = InboundFrame {
                            link: link.clone(),
                            payload: frame,
                        };
                        if inbound.send_async(msg).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(link = %link, error = %e, "unreadable framing, closing receive side");
                        return;
                    }
                }
            }

            match timeout(read_timeout, reader.read_buf(&mut buffer)).await {
                Ok(Ok(0)) => {
                    debug!(link = %link, "peer closed connection");
                    return;
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    warn!(link = %link, error = %e, "read error, closing receive side");
                    return;
                }
                Err(_) => {
                    if inbound.is_disconnected() {
                        return;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(bytes: &[u8]) -> BytesMut {
        BytesMut::from(bytes)
    }

    const EVENT: &[u8] = br#"<event version="2.0" uid="A"><point lat="1" lon="2"/></event>"#;

    #[test]
    fn splits_one_xml_event() {
        let mut b = buf(EVENT);
        let frame = extract_frame(&mut b, MAX_FRAME_SIZE).unwrap().unwrap();
        assert_eq!(&frame[..], EVENT);
        assert!(b.is_empty());
    }

    #[test]
    fn splits_back_to_back_xml_events() {
        let mut b = buf(&[EVENT, b"\n", EVENT].concat());
        assert!(extract_frame(&mut b, MAX_FRAME_SIZE).unwrap().is_some());
        assert!(extract_frame(&mut b, MAX_FRAME_SIZE).unwrap().is_some());
        assert!(extract_frame(&mut b, MAX_FRAME_SIZE).unwrap().is_none());
        assert!(b.is_empty());
    }

    #[test]
    fn partial_xml_waits_for_more() {
        let mut b = buf(&EVENT[..20]);
        assert!(extract_frame(&mut b, MAX_FRAME_SIZE).unwrap().is_none());
        assert_eq!(b.len(), 20);
    }

    #[test]
    fn self_closed_ping_is_a_frame() {
        let mut b = buf(br#"<event uid="ping"/>"#);
        let frame = extract_frame(&mut b, MAX_FRAME_SIZE).unwrap().unwrap();
        assert!(frame.ends_with(b"/>"));
    }

    #[test]
    fn splits_varint_prefixed_frame() {
        let mut b = BytesMut::new();
        b.extend_from_slice(&[0x05]);
        b.extend_from_slice(&[1, 2, 3, 4, 5]);
        b.extend_from_slice(&[0x02, 9, 9]);
        let first = extract_frame(&mut b, MAX_FRAME_SIZE).unwrap().unwrap();
        assert_eq!(&first[..], &[0x05, 1, 2, 3, 4, 5]);
        let second = extract_frame(&mut b, MAX_FRAME_SIZE).unwrap().unwrap();
        assert_eq!(&second[..], &[0x02, 9, 9]);
    }

    #[test]
    fn incomplete_varint_body_waits() {
        let mut b = buf(&[0x05, 1, 2]);
        assert!(extract_frame(&mut b, MAX_FRAME_SIZE).unwrap().is_none());
        assert_eq!(b.len(), 3);
    }

    #[test]
    fn oversized_declared_length_is_rejected() {
        let mut b = BytesMut::new();
        // 20 MiB declared.
        let mut prefix = Vec::new();
        let mut v = 20u64 * 1024 * 1024;
        while v >= 0x80 {
            prefix.push((v as u8 & 0x7F) | 0x80);
            v >>= 7;
        }
        prefix.push(v as u8);
        b.extend_from_slice(&prefix);
        assert!(matches!(
            extract_frame(&mut b, MAX_FRAME_SIZE),
            Err(TransportError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn empty_buffer_yields_nothing() {
        let mut b = BytesMut::new();
        assert!(extract_frame(&mut b, MAX_FRAME_SIZE).unwrap().is_none());
    }
}
