use embedded_io_async::{Read, Write};

use crate::{
    Decoder, Encoder, Encoding, Progress,
    error::{DecodeError, EncodeError, Error, HandshakeError},
    http::{self, Request},
    options::{AcceptOptions, MAX_HANDSHAKE_LEN},
};

/// A server-side WebSocket connection presenting a raw byte stream.
///
/// The transport is owned by the connection and re-bound into the decoder
/// and encoder on every call; [`into_inner`](Self::into_inner) releases it
/// again, which is how a caller swaps the transport (e.g. to wrap it in
/// TLS) between calls.
pub struct WebSocket<'buf, RW> {
    inner: RW,
    decoder: Decoder<'buf>,
    encoder: Encoder<'buf>,
}

impl<'buf, RW> core::fmt::Debug for WebSocket<'buf, RW> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WebSocket")
            .field("inner", &core::any::type_name::<RW>())
            .field("decoder", &self.decoder)
            .field("encoder", &self.encoder)
            .finish()
    }
}

impl<'buf, RW> WebSocket<'buf, RW> {
    /// Creates a new [`WebSocket`] after a successful handshake.
    pub const fn new(
        encoding: Encoding,
        inner: RW,
        read_buffer: &'buf mut [u8],
        write_buffer: &'buf mut [u8],
    ) -> Self {
        Self {
            inner,
            decoder: Decoder::new(read_buffer),
            encoder: Encoder::new(encoding, write_buffer),
        }
    }

    /// Accepts a client connection: performs the server side of the
    /// handshake and starts framing.
    ///
    /// `N` is the max number of request headers to allocate space for.
    pub async fn accept<const N: usize>(
        options: AcceptOptions<'_, '_>,
        inner: RW,
        read_buffer: &'buf mut [u8],
        write_buffer: &'buf mut [u8],
    ) -> Result<Self, Error<RW::Error>>
    where
        RW: Read + Write,
    {
        Ok(
            Self::accept_with::<N, _, _, _>(options, inner, read_buffer, write_buffer, |_| Ok(()))
                .await?
                .0,
        )
    }

    /// Accepts a client connection with a custom request callback.
    ///
    /// The callback sees the parsed upgrade request before the response is
    /// written; its return value (typically data copied out of the request,
    /// such as the path) is handed back alongside the connection, and its
    /// error aborts the handshake without writing anything.
    pub async fn accept_with<const N: usize, F, T, E>(
        options: AcceptOptions<'_, '_>,
        mut inner: RW,
        read_buffer: &'buf mut [u8],
        write_buffer: &'buf mut [u8],
        on_request: F,
    ) -> Result<(Self, T), Error<RW::Error, E>>
    where
        F: for<'a> Fn(&Request<'a, N>) -> Result<T, E>,
        RW: Read + Write,
    {
        let limit = read_buffer.len().min(MAX_HANDSHAKE_LEN);
        let mut filled = 0;

        let (encoding, protocol, accept, custom, consumed) = loop {
            if filled == limit {
                return Err(Error::Handshake(HandshakeError::RequestTooLarge));
            }

            let n = inner
                .read(&mut read_buffer[filled..limit])
                .await
                .map_err(|err| Error::Read(DecodeError::Transport(err)))?;
            if n == 0 {
                return Err(Error::Handshake(HandshakeError::ConnectionClosed));
            }
            filled += n;

            let Some((request, consumed)) = http::parse::<N>(&read_buffer[..filled])
                .map_err(|err| Error::Handshake(HandshakeError::Parse(err)))?
            else {
                continue;
            };

            let custom = on_request(&request)
                .map_err(|err| Error::Handshake(HandshakeError::Rejected(err)))?;

            if request.method() != Some("GET") {
                return Err(Error::Handshake(HandshakeError::WrongHttpMethod));
            }

            // http version must be 1.1 or higher
            if !request.version().is_some_and(|version| version >= 1) {
                return Err(Error::Handshake(HandshakeError::WrongHttpVersion));
            }

            // An absent or zero Sec-WebSocket-Version means the pre-IETF
            // Hixie handshake, which is rejected outright.
            let version = request
                .header_value_str("sec-websocket-version")
                .and_then(|v| v.trim().parse::<u32>().ok())
                .unwrap_or(0);
            if version == 0 {
                return Err(Error::Handshake(HandshakeError::HixieNotSupported));
            }

            let key = request
                .header_value("sec-websocket-key")
                .ok_or(Error::Handshake(HandshakeError::MissingSecKey))?;

            if request.header("host").is_none() {
                return Err(Error::Handshake(HandshakeError::MissingHost));
            }

            if request.header("origin").is_none() && request.header("sec-websocket-origin").is_none()
            {
                return Err(Error::Handshake(HandshakeError::MissingOrigin));
            }

            let (encoding, protocol) =
                http::select_encoding(request.header_value("sec-websocket-protocol"));

            break (encoding, protocol, http::sec_accept(key), custom, consumed);
        };

        let response_len = http::write_response(write_buffer, &accept, protocol, options.headers())
            .ok_or(Error::Handshake(HandshakeError::ResponseTooLarge))?;

        inner
            .write_all(&write_buffer[..response_len])
            .await
            .map_err(|err| Error::Write(EncodeError::Transport(err)))?;
        inner
            .flush()
            .await
            .map_err(|err| Error::Write(EncodeError::Transport(err)))?;

        // Frame bytes pipelined behind the request stay with the decoder.
        let surplus = filled - consumed;
        read_buffer.copy_within(consumed..filled, 0);

        let mut websocket = Self::new(encoding, inner, read_buffer, write_buffer);
        websocket.decoder.preload(surplus);

        Ok((websocket, custom))
    }

    /// Returns the negotiated payload encoding.
    #[inline]
    pub const fn encoding(&self) -> Encoding {
        self.encoder.encoding()
    }

    /// Whether decoded payload is buffered and a [`read`](Self::read) would
    /// deliver without touching the transport.
    #[inline]
    pub const fn has_buffered(&self) -> bool {
        self.decoder.available() > 0
    }

    /// Returns reference to the reader/writer.
    #[inline]
    pub const fn inner(&self) -> &RW {
        &self.inner
    }

    /// Returns mutable reference to the reader/writer.
    #[inline]
    pub const fn inner_mut(&mut self) -> &mut RW {
        &mut self.inner
    }

    /// Consumes the [`WebSocket`] and returns the reader/writer.
    #[inline]
    pub fn into_inner(self) -> RW {
        self.inner
    }

    /// Reads decoded payload bytes, like a `recv` on a plain socket.
    ///
    /// Returns the number of bytes copied into `dst` (at least 1 for a
    /// non-empty `dst`), `Ok(0)` on transport end of stream, or
    /// [`Error::ConnectionReset`] once the peer's close frame has been
    /// received in full.
    pub async fn read(&mut self, dst: &mut [u8]) -> Result<usize, Error<RW::Error>>
    where
        RW: Read,
    {
        if dst.is_empty() {
            return Ok(0);
        }

        loop {
            match self.decoder.decode(&mut self.inner, dst).await? {
                Progress::Data(n) => return Ok(n),
                Progress::Pending => continue,
                Progress::Close => return Err(Error::ConnectionReset),
                Progress::Eof => return Ok(0),
            }
        }
    }

    /// Frames and writes `src`, returning its length.
    pub async fn write(&mut self, src: &[u8]) -> Result<usize, Error<RW::Error>>
    where
        RW: Write,
    {
        Ok(self.encoder.encode(&mut self.inner, src).await?)
    }
}
