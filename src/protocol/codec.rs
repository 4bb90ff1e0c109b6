//! Framing codec
//!
//! Every frame on the wire is `base64(payload) ++ "\r\n"`. The base64
//! alphabet never contains `\r` or `\n`, so splitting on the delimiter
//! always recovers exact message boundaries.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::ProtocolError;

/// Marks the end of every frame
pub const DELIMITER: &[u8] = b"\r\n";

/// Encode a payload into a single delimited frame
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut frame = BASE64.encode(payload).into_bytes();
    frame.extend_from_slice(DELIMITER);
    frame
}

/// Decode the body of one frame (delimiter already stripped)
pub fn decode(body: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    BASE64.decode(body).map_err(ProtocolError::InvalidBase64)
}

/// Split a buffer of frames into payloads.
///
/// The empty fragment after the final delimiter is discarded; an
/// unterminated tail is decoded as a last frame. Use [`FrameDecoder`] when
/// reading from a stream, since a read can end in the middle of a frame.
pub fn decode_stream(buffer: &[u8]) -> Result<Vec<Vec<u8>>, ProtocolError> {
    let mut payloads = Vec::new();
    let mut rest = buffer;
    while let Some(pos) = find_delimiter(rest) {
        payloads.push(decode(&rest[..pos])?);
        rest = &rest[pos + DELIMITER.len()..];
    }
    if !rest.is_empty() {
        payloads.push(decode(rest)?);
    }
    Ok(payloads)
}

fn find_delimiter(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(DELIMITER.len())
        .position(|window| window == DELIMITER)
}

/// Per-connection accumulator.
///
/// Bytes from each receive are appended; only complete frames are decoded
/// and any partial tail is carried into the next call.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_frame_len: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_len,
        }
    }

    /// Append received bytes and return every payload completed by them
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>, ProtocolError> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        let mut consumed = 0;
        while let Some(pos) = find_delimiter(&self.buffer[consumed..]) {
            payloads.push(decode(&self.buffer[consumed..consumed + pos])?);
            consumed += pos + DELIMITER.len();
        }
        self.buffer.drain(..consumed);

        if self.buffer.len() > self.max_frame_len {
            return Err(ProtocolError::FrameTooLarge {
                limit: self.max_frame_len,
            });
        }
        Ok(payloads)
    }

    /// Bytes of an incomplete frame waiting for more input
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(1 << 20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_frame_has_single_trailing_delimiter() {
        // Payload full of delimiter bytes must not leak them into the frame
        let payload = b"\r\n\r\nline\r\n\x00\xff";
        let frame = encode(payload);

        assert!(frame.ends_with(DELIMITER));
        let body = &frame[..frame.len() - DELIMITER.len()];
        assert!(!body.contains(&b'\r'));
        assert!(!body.contains(&b'\n'));
        assert_eq!(decode(body).unwrap(), payload.to_vec());
    }

    #[test]
    fn test_no_byte_value_produces_delimiter() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let frame = encode(&payload);
        assert_eq!(find_delimiter(&frame), Some(frame.len() - 2));
    }

    #[test]
    fn test_decode_stream_multiple_frames() {
        let mut buffer = encode(b"first");
        buffer.extend(encode(b""));
        buffer.extend(encode(b"third"));

        // The empty payload encodes to a bare delimiter and still counts
        let payloads = decode_stream(&buffer).unwrap();
        assert_eq!(payloads, vec![b"first".to_vec(), Vec::new(), b"third".to_vec()]);
    }

    #[test]
    fn test_decode_stream_unterminated_tail() {
        let mut buffer = encode(b"one");
        buffer.extend_from_slice(b"dHdv");
        assert_eq!(
            decode_stream(&buffer).unwrap(),
            vec![b"one".to_vec(), b"two".to_vec()]
        );
    }

    #[test]
    fn test_decode_stream_rejects_garbage() {
        assert!(matches!(
            decode_stream(b"not base64!\r\n"),
            Err(ProtocolError::InvalidBase64(_))
        ));
    }

    #[test]
    fn test_decoder_carries_partial_frame() {
        let frame = encode(b"hello world");
        let (head, tail) = frame.split_at(5);
        let mut decoder = FrameDecoder::default();

        assert!(decoder.feed(head).unwrap().is_empty());
        assert_eq!(decoder.pending(), 5);

        let mut rest = tail.to_vec();
        rest.extend(encode(b"again"));
        rest.extend_from_slice(&encode(b"partial")[..3]);

        let payloads = decoder.feed(&rest).unwrap();
        assert_eq!(payloads, vec![b"hello world".to_vec(), b"again".to_vec()]);
        assert_eq!(decoder.pending(), 3);
    }

    #[test]
    fn test_decoder_split_inside_delimiter() {
        let frame = encode(b"x");
        let mut decoder = FrameDecoder::default();

        assert!(decoder.feed(&frame[..frame.len() - 1]).unwrap().is_empty());
        assert_eq!(decoder.feed(b"\n").unwrap(), vec![b"x".to_vec()]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_decoder_limits_unterminated_frames() {
        let mut decoder = FrameDecoder::new(8);
        assert!(decoder.feed(b"QUJD").is_ok());
        assert!(matches!(
            decoder.feed(b"REVGR0hJ"),
            Err(ProtocolError::FrameTooLarge { limit: 8 })
        ));
    }
}
