use base64::{Engine as _, engine::general_purpose};
use embedded_io_async::Write;

use crate::{OpCode, error::EncodeError, frame::FrameHead};

/// Largest header an outgoing frame can need.
const MAX_FRAME_HEAD: usize = 10;

/// Payload encoding negotiated during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Text frames carrying the Base64 coding of the payload; the legacy
    /// mode for clients that cannot handle binary frames.
    Base64,
    /// Binary frames carrying the payload verbatim.
    Binary,
}

/// Encoder of outgoing byte runs into unmasked server frames.
///
/// Chunks are sized to the scratch buffer; every emitted frame is final.
/// Outgoing messages are never fragmented.
#[derive(Debug)]
pub struct Encoder<'buf> {
    buf: &'buf mut [u8],
    encoding: Encoding,
}

impl<'buf> Encoder<'buf> {
    /// Creates an encoder over a scratch buffer.
    ///
    /// [`MIN_ENCODE_BUFFER`](crate::options::MIN_ENCODE_BUFFER) is the
    /// recommended minimum size.
    pub const fn new(encoding: Encoding, buf: &'buf mut [u8]) -> Self {
        Self { buf, encoding }
    }

    /// Returns the payload encoding.
    #[inline]
    pub const fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Frames `src` and writes it out, splitting into multiple frames when
    /// it does not fit the scratch buffer. An empty `src` emits one empty
    /// frame.
    pub async fn encode<T: Write>(
        &mut self,
        transport: &mut T,
        src: &[u8],
    ) -> Result<usize, EncodeError<T::Error>> {
        let space = self.buf.len().saturating_sub(MAX_FRAME_HEAD);
        let max_chunk = match self.encoding {
            Encoding::Binary => space,
            Encoding::Base64 => space / 4 * 3,
        };
        if max_chunk < 3 {
            return Err(EncodeError::BufferTooSmall);
        }

        let mut sent = 0;
        loop {
            let mut end = (sent + max_chunk).min(src.len());
            if end < src.len() && self.encoding == Encoding::Base64 {
                // Only the final chunk of a run may need Base64 padding.
                end = sent + (end - sent) / 3 * 3;
            }

            self.emit(transport, &src[sent..end]).await?;
            sent = end;

            if sent == src.len() {
                break;
            }
        }

        transport.flush().await.map_err(EncodeError::Transport)?;

        Ok(src.len())
    }

    async fn emit<T: Write>(
        &mut self,
        transport: &mut T,
        payload: &[u8],
    ) -> Result<(), EncodeError<T::Error>> {
        let (opcode, frame_len) = match self.encoding {
            Encoding::Binary => (OpCode::Binary, payload.len()),
            Encoding::Base64 => (OpCode::Text, payload.len().div_ceil(3) * 4),
        };

        let head_len = FrameHead::new(true, opcode, frame_len)
            .write(self.buf)
            .ok_or(EncodeError::BufferTooSmall)?;

        let total = match self.encoding {
            Encoding::Binary => {
                self.buf[head_len..head_len + payload.len()].copy_from_slice(payload);
                head_len + payload.len()
            }
            Encoding::Base64 => {
                let encoded = general_purpose::STANDARD
                    .encode_slice(payload, &mut self.buf[head_len..])
                    .map_err(|_| EncodeError::BufferTooSmall)?;
                head_len + encoded
            }
        };

        transport
            .write_all(&self.buf[..total])
            .await
            .map_err(EncodeError::Transport)
    }
}

#[cfg(test)]
mod tests {
    use std::{vec, vec::Vec};

    use base64::{Engine as _, engine::general_purpose};
    use futures::executor::block_on;

    use super::*;
    use crate::tests::support::{Sink, parse_unmasked_frames};

    fn encode(encoding: Encoding, buf_size: usize, src: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; buf_size];
        let mut encoder = Encoder::new(encoding, &mut buf);
        let mut sink = Sink::default();

        let sent = block_on(encoder.encode(&mut sink, src)).unwrap();
        assert_eq!(sent, src.len());

        sink.data
    }

    #[test]
    fn small_binary_frame() {
        let wire = encode(Encoding::Binary, 256, b"Hello");

        assert_eq!(wire[0], 0x82);
        assert_eq!(wire[1], 5);
        assert_eq!(&wire[2..], b"Hello");
    }

    #[test]
    fn base64_text_frame() {
        let wire = encode(Encoding::Base64, 256, b"Hi");

        assert_eq!(wire[0], 0x81);
        assert_eq!(wire[1], 4);
        assert_eq!(&wire[2..], b"SGk=");
    }

    #[test]
    fn empty_run_emits_one_empty_frame() {
        assert_eq!(encode(Encoding::Binary, 256, b""), [0x82, 0]);
        assert_eq!(encode(Encoding::Base64, 256, b""), [0x81, 0]);
    }

    #[test]
    fn extended_length_header() {
        let payload = vec![0xAB; 300];
        let wire = encode(Encoding::Binary, 1024, &payload);

        assert_eq!(&wire[..4], &[0x82, 126, 0x01, 0x2C]);
        assert_eq!(&wire[4..], &payload[..]);
    }

    #[test]
    fn long_length_header() {
        let payload = vec![0x5A; 65600];
        let wire = encode(Encoding::Binary, 70_000, &payload);

        assert_eq!(wire[0], 0x82);
        assert_eq!(wire[1], 127);
        assert_eq!(&wire[2..10], &65600u64.to_be_bytes());
        assert_eq!(&wire[10..], &payload[..]);
    }

    #[test]
    fn oversized_run_splits_into_final_frames() {
        let payload: Vec<u8> = (0..200u8).collect();
        let wire = encode(Encoding::Binary, 74, &payload);

        let frames = parse_unmasked_frames(&wire);

        assert!(frames.len() > 1);
        for (fin, opcode, _) in &frames {
            assert!(fin);
            assert_eq!(*opcode, 0x2);
        }

        let rejoined: Vec<u8> = frames.into_iter().flat_map(|(_, _, p)| p).collect();
        assert_eq!(rejoined, payload);
    }

    #[test]
    fn base64_chunks_split_on_quantum_boundaries() {
        let payload: Vec<u8> = (0..100u8).collect();
        let wire = encode(Encoding::Base64, 58, &payload);

        let frames = parse_unmasked_frames(&wire);
        assert!(frames.len() > 1);

        let mut rejoined = Vec::new();
        for (fin, opcode, encoded) in frames {
            assert!(fin);
            assert_eq!(opcode, 0x1);

            let mut decoded = vec![0u8; encoded.len()];
            let n = general_purpose::STANDARD
                .decode_slice(&encoded, &mut decoded)
                .unwrap();
            rejoined.extend_from_slice(&decoded[..n]);
        }
        assert_eq!(rejoined, payload);
    }

    #[test]
    fn buffer_too_small() {
        let mut buf = [0u8; 8];
        let mut encoder = Encoder::new(Encoding::Binary, &mut buf);
        let mut sink = Sink::default();

        let err = block_on(encoder.encode(&mut sink, b"payload")).unwrap_err();

        assert!(matches!(err, EncodeError::BufferTooSmall));
    }
}
