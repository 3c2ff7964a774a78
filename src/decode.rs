use base64::{Engine as _, engine::general_purpose};
use embedded_io_async::Read;

use crate::{
    OpCode,
    error::{DecodeError, ProtocolError},
    frame::FrameHeader,
    mask,
};

/// Largest frame header this crate accepts: 2 bytes of flags and length,
/// 8 bytes of extended length, 4 bytes of masking key.
const MAX_HEADER_LEN: usize = 14;

const SHORT_HEADER_LEN: usize = 6;
const EXTENDED_HEADER_LEN: usize = 8;
const LONG_HEADER_LEN: usize = 14;

/// Outcome of a single [`Decoder::decode`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Payload bytes were copied into the destination buffer.
    Data(usize),
    /// A step was taken but no payload byte is deliverable yet; call again
    /// once the transport has more bytes.
    Pending,
    /// A close frame was received in full. The connection should be dropped;
    /// the close payload is not delivered.
    Close,
    /// The transport reported end of stream.
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Between frames, or mid-header.
    HeaderPending,
    /// Header parsed, payload bytes still on the wire.
    DataNeeded,
    /// Decoded payload is waiting to be copied out.
    DataAvailable,
    /// A close opcode was seen; its payload is still on the wire.
    CloseReasonPending,
    /// Transient: the frame (and its delivery) finished, cleanup runs at the
    /// single point of return.
    FrameComplete,
}

/// Incremental decoder of client frames into a raw byte stream.
///
/// Bytes arrive in arbitrary-sized chunks from the transport and leave
/// through a caller-supplied destination buffer of arbitrary size; the
/// scratch buffer in between bounds the per-cycle chunk, not the frame size.
/// One `decode` call performs at most one payload read cycle, so state is
/// preserved exactly across short reads.
#[derive(Debug)]
pub struct Decoder<'buf> {
    state: DecodeState,
    header: FrameHeader,
    /// Opcode of the fragmented message in progress; survives interleaved
    /// control frames, cleared by a final data frame.
    continuation_opcode: Option<OpCode>,
    buf: &'buf mut [u8],
    /// Next landing offset for still-masked wire bytes.
    write_pos: usize,
    /// Window of decoded payload awaiting copy-out.
    read_pos: usize,
    read_len: usize,
    /// Payload bytes consumed from the wire, out of `header.payload_len`.
    n_read_payload: u64,
    /// Still-masked residue that does not fill a 4-byte mask stride,
    /// deferred to the next read cycle.
    carry: [u8; 3],
    carry_len: usize,
    /// Bytes of a pipelined next frame that arrived in the same read as this
    /// frame's header; moved to the front of the buffer on cleanup.
    pending_next: usize,
}

enum HeaderStep {
    Complete { n_in_buf: usize },
    Pending,
    Eof,
}

impl<'buf> Decoder<'buf> {
    /// Creates a decoder over a scratch buffer.
    ///
    /// The buffer must hold at least a full header plus a payload chunk;
    /// [`MIN_DECODE_BUFFER`](crate::options::MIN_DECODE_BUFFER) is the
    /// recommended minimum.
    pub const fn new(buf: &'buf mut [u8]) -> Self {
        Self {
            state: DecodeState::HeaderPending,
            header: FrameHeader::EMPTY,
            continuation_opcode: None,
            buf,
            write_pos: 0,
            read_pos: 0,
            read_len: 0,
            n_read_payload: 0,
            carry: [0; 3],
            carry_len: 0,
            pending_next: 0,
        }
    }

    /// Number of decoded bytes buffered and ready for copy-out.
    #[inline]
    pub const fn available(&self) -> usize {
        self.read_len
    }

    /// Marks the first `n` buffer bytes as already-received wire data, used
    /// to hand over bytes that arrived together with the handshake.
    pub(crate) fn preload(&mut self, n: usize) {
        debug_assert!(n <= self.buf.len());
        self.header.n_done = n;
    }

    /// Takes one step of the decoding state machine.
    ///
    /// Emulates a `recv` call: `Data(n)` delivers `1..=dst.len()` payload
    /// bytes in wire order, [`Progress::Pending`] asks the caller to call
    /// again (the `EAGAIN` of the state machine), [`Progress::Close`]
    /// reports a completed close frame and [`Progress::Eof`] a transport
    /// end of stream. Errors and `Eof` reset the decoder completely; frame
    /// completion resets it for the next frame, keeping the continuation
    /// opcode alive unless a final data frame just ended its message.
    pub async fn decode<T: Read>(
        &mut self,
        transport: &mut T,
        dst: &mut [u8],
    ) -> Result<Progress, DecodeError<T::Error>> {
        let result = self.step(transport, dst).await;

        match &result {
            Ok(Progress::Eof) | Err(_) => self.reset(false),
            Ok(_) => {
                if self.state == DecodeState::FrameComplete {
                    let keep = !self.header.fin
                        || self.header.opcode.is_some_and(|opcode| opcode.is_control());
                    self.reset(keep);
                }
            }
        }

        result
    }

    async fn step<T: Read>(
        &mut self,
        transport: &mut T,
        dst: &mut [u8],
    ) -> Result<Progress, DecodeError<T::Error>> {
        match self.state {
            DecodeState::HeaderPending => match self.read_header(transport).await? {
                HeaderStep::Pending => Ok(Progress::Pending),
                HeaderStep::Eof => Ok(Progress::Eof),
                HeaderStep::Complete { n_in_buf } => {
                    // The header is in; fall through and try to read payload
                    // in the same call.
                    self.state = DecodeState::DataNeeded;
                    self.read_and_decode(transport, dst, n_in_buf).await
                }
            },
            DecodeState::DataAvailable => Ok(self.return_data(dst)),
            DecodeState::DataNeeded | DecodeState::CloseReasonPending => {
                self.read_and_decode(transport, dst, 0).await
            }
            DecodeState::FrameComplete => Err(DecodeError::InvalidState),
        }
    }

    /// Accumulates and parses the frame header.
    async fn read_header<T: Read>(
        &mut self,
        transport: &mut T,
    ) -> Result<HeaderStep, DecodeError<T::Error>> {
        if self.header.n_done >= 2 {
            // Bytes handed over from the handshake or a pipelined previous
            // frame may already hold a complete header.
            if let step @ HeaderStep::Complete { .. } =
                self.parse_header().map_err(DecodeError::Protocol)?
            {
                return Ok(step);
            }
        }

        debug_assert!(self.header.n_done < MAX_HEADER_LEN);

        let n = transport
            .read(&mut self.buf[self.header.n_done..MAX_HEADER_LEN])
            .await
            .map_err(DecodeError::Transport)?;
        if n == 0 {
            return Ok(HeaderStep::Eof);
        }

        self.header.n_done += n;

        if self.header.n_done < 2 {
            // Cannot interpret a header with less than two bytes.
            return Ok(HeaderStep::Pending);
        }

        self.parse_header().map_err(DecodeError::Protocol)
    }

    fn parse_header(&mut self) -> Result<HeaderStep, ProtocolError> {
        let b0 = self.buf[0];
        let b1 = self.buf[1];

        let raw = b0 & 0x0f;
        let fin = b0 & 0x80 != 0;
        let opcode = OpCode::from_wire(raw);

        // 4.3. Client-to-Server Masking: a server MUST close the connection
        // upon receiving a frame with the MASK bit set to 0.
        if b1 & 0x80 == 0 {
            return Err(ProtocolError::UnmaskedFrame);
        }

        let len7 = b1 & 0x7f;

        let effective = if opcode.is_control() {
            // Control frames may be injected in the middle of a fragmented
            // message but must not themselves be fragmented, and carry at
            // most 125 payload bytes.
            if !fin {
                return Err(ProtocolError::FragmentedControlFrame);
            }
            if len7 > 125 {
                return Err(ProtocolError::ControlFrameTooLarge);
            }
            opcode
        } else if opcode == OpCode::Continuation {
            match self.continuation_opcode {
                Some(opener) => opener,
                None => return Err(ProtocolError::UnexpectedContinuation),
            }
        } else {
            // A data frame opens (or replaces) the fragmentation series when
            // FIN is clear, and closes it when FIN is set.
            self.continuation_opcode = if fin { None } else { Some(opcode) };
            opcode
        };

        let (header_len, payload_len) = match len7 {
            0..=125 => (SHORT_HEADER_LEN, u64::from(len7)),
            126 => {
                if self.header.n_done < EXTENDED_HEADER_LEN {
                    return Ok(HeaderStep::Pending);
                }
                (
                    EXTENDED_HEADER_LEN,
                    u64::from(u16::from_be_bytes([self.buf[2], self.buf[3]])),
                )
            }
            _ => {
                if self.header.n_done < LONG_HEADER_LEN {
                    return Ok(HeaderStep::Pending);
                }
                (
                    LONG_HEADER_LEN,
                    u64::from_be_bytes([
                        self.buf[2],
                        self.buf[3],
                        self.buf[4],
                        self.buf[5],
                        self.buf[6],
                        self.buf[7],
                        self.buf[8],
                        self.buf[9],
                    ]),
                )
            }
        };

        if self.header.n_done < header_len {
            return Ok(HeaderStep::Pending);
        }

        // RFC 6455 mandates minimal length encoding but leaves the server
        // reaction to wrongly encoded frames open; they are rejected here.
        if (header_len > SHORT_HEADER_LEN && payload_len < 126)
            || (header_len > EXTENDED_HEADER_LEN && payload_len < 65536)
        {
            return Err(ProtocolError::NonMinimalLength);
        }

        let mask_off = header_len - 4;
        let mask = [
            self.buf[mask_off],
            self.buf[mask_off + 1],
            self.buf[mask_off + 2],
            self.buf[mask_off + 3],
        ];

        // Payload bytes that arrived together with the header. Anything
        // beyond this frame's payload belongs to a pipelined next frame and
        // is kept aside until cleanup.
        let buffered = self.header.n_done - header_len;
        let in_frame = (buffered as u64).min(payload_len) as usize;
        self.pending_next = buffered - in_frame;

        self.header.fin = fin;
        self.header.raw_opcode = raw;
        self.header.opcode = Some(effective);
        self.header.payload_len = payload_len;
        self.header.mask = mask;
        self.header.header_len = header_len;

        self.n_read_payload = in_frame as u64;
        self.write_pos = header_len + in_frame;
        self.read_pos = header_len;

        Ok(HeaderStep::Complete { n_in_buf: in_frame })
    }

    /// Reads the next payload chunk, unmasks it and dispatches on the
    /// opcode.
    async fn read_and_decode<T: Read>(
        &mut self,
        transport: &mut T,
        dst: &mut [u8],
        n_in_buf: usize,
    ) -> Result<Progress, DecodeError<T::Error>> {
        // Carried-over bytes go back in front of the incoming ones so
        // unmasking always starts on a fresh 4-byte stride.
        self.buf[self.write_pos..self.write_pos + self.carry_len]
            .copy_from_slice(&self.carry[..self.carry_len]);
        self.write_pos += self.carry_len;

        let space = self.buf.len() - self.write_pos;
        let next_read = self.remaining().min(space as u64) as usize;

        let n = if next_read > 0 {
            let n = transport
                .read(&mut self.buf[self.write_pos..self.write_pos + next_read])
                .await
                .map_err(DecodeError::Transport)?;
            if n == 0 {
                return Ok(Progress::Eof);
            }
            n
        } else {
            0
        };

        self.n_read_payload += n as u64;
        self.write_pos += n;

        if self.remaining() == 0 {
            self.state = DecodeState::FrameComplete;
        }

        // Not yet unmasked: what was just read, what was carried over, and
        // what arrived together with the header.
        let to_decode = n + self.carry_len + n_in_buf;
        let start = self.write_pos - to_decode;

        if self.state == DecodeState::FrameComplete {
            mask::apply_mask(&mut self.buf[start..self.write_pos], self.header.mask);
            self.carry_len = 0;
        } else {
            let full = to_decode / 4 * 4;
            mask::apply_mask(&mut self.buf[start..start + full], self.header.mask);

            let tail = to_decode - full;
            debug_assert!(tail <= self.carry.len());
            self.carry[..tail].copy_from_slice(&self.buf[start + full..self.write_pos]);
            self.carry_len = tail;
            self.write_pos -= tail;
        }

        let to_return = to_decode - self.carry_len;
        let opcode = self.header.opcode.ok_or(DecodeError::InvalidState)?;

        match opcode {
            OpCode::Close => {
                // The close payload is not delivered upstream.
                if self.remaining() == 0 {
                    self.log_close();
                    return Ok(Progress::Close);
                }

                self.state = DecodeState::CloseReasonPending;
                return Ok(Progress::Pending);
            }
            OpCode::Text => {
                match base64_decode_in_place(self.buf, start, to_return) {
                    Ok(decoded) => self.read_len = decoded,
                    Err(err) => {
                        // Not fatal; the frame yields no data and decoding
                        // continues with the next chunk.
                        log::error!("base64 decode error in text frame: {err}");
                        self.read_len = 0;
                    }
                }
                self.write_pos = self.header.header_len;
            }
            OpCode::Binary => {
                self.read_len = to_return;
                self.write_pos = self.header.header_len;
            }
            _ => {
                // Pings, pongs and reserved opcodes produce no caller-visible
                // payload; their bytes are consumed and dropped.
                log::debug!(
                    "discarding {} payload bytes of opcode {:#03x}",
                    to_return,
                    self.header.raw_opcode
                );
                self.write_pos = self.header.header_len;
            }
        }

        self.read_pos = start;

        Ok(self.return_data(dst))
    }

    /// Copies decoded payload out to the caller.
    fn return_data(&mut self, dst: &mut [u8]) -> Progress {
        if self.read_len == 0 {
            // Bytes were read but nothing is deliverable yet.
            return Progress::Pending;
        }

        let n = self.read_len.min(dst.len());
        dst[..n].copy_from_slice(&self.buf[self.read_pos..self.read_pos + n]);
        self.read_pos += n;
        self.read_len -= n;

        self.state = if self.read_len > 0 {
            DecodeState::DataAvailable
        } else if self.remaining() == 0 {
            DecodeState::FrameComplete
        } else {
            DecodeState::DataNeeded
        };

        Progress::Data(n)
    }

    fn remaining(&self) -> u64 {
        self.header.payload_len - self.n_read_payload
    }

    fn log_close(&self) {
        let start = self.header.header_len;
        let payload = &self.buf[start..start + self.header.payload_len as usize];

        if payload.len() >= 2 {
            let code = u16::from_be_bytes([payload[0], payload[1]]);
            match core::str::from_utf8(&payload[2..]) {
                Ok(reason) => log::debug!("close frame received; code={code} reason={reason:?}"),
                Err(_) => log::debug!("close frame received; code={code} (non-utf8 reason)"),
            }
        } else {
            log::debug!("close frame received without status code");
        }
    }

    /// Resets all per-frame state; keeps the continuation opcode for control
    /// frames and unfinished fragmented messages. Pipelined bytes of the
    /// next frame move to the front of the buffer.
    fn reset(&mut self, keep_continuation: bool) {
        let surplus = self.pending_next;
        if surplus > 0 {
            let next = self.header.header_len + self.header.payload_len as usize;
            self.buf.copy_within(next..next + surplus, 0);
        }

        if !keep_continuation {
            self.continuation_opcode = None;
        }

        self.header = FrameHeader::EMPTY;
        self.header.n_done = surplus;
        self.pending_next = 0;
        self.n_read_payload = 0;
        self.carry_len = 0;
        self.write_pos = 0;
        self.read_pos = 0;
        self.read_len = 0;
        self.state = DecodeState::HeaderPending;
    }
}

/// Decodes a Base64 region of `buf` in place, through a bounded stack
/// window, returning the decoded length.
///
/// Mid-frame chunks are always whole 4-byte quanta (the mask-stride carry
/// guarantees it), so padding can only appear in a frame's final chunk.
fn base64_decode_in_place(
    buf: &mut [u8],
    start: usize,
    len: usize,
) -> Result<usize, base64::DecodeSliceError> {
    const WINDOW: usize = 64;

    let mut window = [0u8; WINDOW / 4 * 3];
    let mut out = start;
    let mut pos = start;
    let end = start + len;

    while pos < end {
        let take = WINDOW.min(end - pos);
        let decoded = general_purpose::STANDARD.decode_slice(&buf[pos..pos + take], &mut window)?;

        buf[out..out + decoded].copy_from_slice(&window[..decoded]);
        out += decoded;
        pos += take;
    }

    Ok(out - start)
}
