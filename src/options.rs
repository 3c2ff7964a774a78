//! Handshake options and protocol constants.

use httparse::Header;

/// Upper bound on the size of the client's upgrade request.
pub const MAX_HANDSHAKE_LEN: usize = 4096;

/// Conventional timeout, in milliseconds, for the caller's pre-handshake
/// peek of the first four client bytes. A peek that times out means the
/// client is not speaking WebSocket and the caller should continue with its
/// fallback protocol.
pub const HANDSHAKE_PEEK_TIMEOUT_MS: u32 = 100;

/// Recommended minimum size of the read buffer. Frames larger than the
/// buffer are streamed through it, so this bounds the per-cycle chunk, not
/// the frame size.
pub const MIN_DECODE_BUFFER: usize = 8192;

/// Recommended minimum size of the write buffer; outgoing byte runs that do
/// not fit are split into multiple frames.
pub const MIN_ENCODE_BUFFER: usize = 4096;

/// Options for accepting a client connection.
#[derive(Debug, Default)]
pub struct AcceptOptions<'a, 'b> {
    /// Additional headers to send with the 101 response.
    pub headers: &'a [Header<'b>],
}

impl<'a, 'b> AcceptOptions<'a, 'b> {
    /// Sets additional response headers.
    pub const fn with_headers(mut self, headers: &'a [Header<'b>]) -> Self {
        self.headers = headers;
        self
    }

    /// Returns the additional response headers.
    pub const fn headers(&self) -> &[Header<'b>] {
        self.headers
    }
}
