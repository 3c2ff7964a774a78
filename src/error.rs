//! Error types.

use core::convert::Infallible;

/// Violations of the RFC 6455 framing rules.
///
/// Any of these resets the decoder completely; the caller is expected to
/// drop the connection.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A client frame arrived with the MASK bit clear.
    #[error("Frame without mask")]
    UnmaskedFrame,
    /// A control frame arrived with the FIN bit clear.
    #[error("Control frame fragmented")]
    FragmentedControlFrame,
    /// A control frame announced a payload longer than 125 bytes.
    #[error("Control frame payload longer than 125 bytes")]
    ControlFrameTooLarge,
    /// A continuation frame arrived without an open fragmentation series.
    #[error("Continuation frame without an open fragmentation series")]
    UnexpectedContinuation,
    /// A payload length was encoded with more bytes than necessary.
    #[error("Payload length not minimally encoded")]
    NonMinimalLength,
}

/// Errors surfaced by [`Decoder::decode`](crate::Decoder::decode).
#[derive(Debug, thiserror::Error)]
pub enum DecodeError<T> {
    /// The peer violated the framing rules.
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolError),
    /// The transport read failed.
    #[error("Transport error: {0:?}")]
    Transport(T),
    /// The decoder was driven from a state it can never be observed in; an
    /// internal invariant was broken.
    #[error("Decoder called in an invalid state")]
    InvalidState,
}

/// Errors surfaced by [`Encoder::encode`](crate::Encoder::encode).
#[derive(Debug, thiserror::Error)]
pub enum EncodeError<T> {
    /// The transport write failed.
    #[error("Transport error: {0:?}")]
    Transport(T),
    /// The write buffer cannot hold a frame header plus any payload.
    #[error("Write buffer too small")]
    BufferTooSmall,
}

/// Errors surfaced while accepting the upgrade request.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError<E = Infallible> {
    /// The client went away before the request was complete.
    #[error("Connection closed during handshake")]
    ConnectionClosed,
    /// The request did not fit the handshake limit.
    #[error("Upgrade request larger than the handshake limit")]
    RequestTooLarge,
    /// The request is not parseable HTTP.
    #[error("Malformed upgrade request: {0}")]
    Parse(httparse::Error),
    /// The request method is not `GET`.
    #[error("Upgrade request method is not GET")]
    WrongHttpMethod,
    /// The request HTTP version is below 1.1.
    #[error("Upgrade request HTTP version below 1.1")]
    WrongHttpVersion,
    /// `Sec-WebSocket-Version` is absent or zero; the pre-IETF Hixie
    /// handshake is not supported.
    #[error("Hixie handshake no longer supported")]
    HixieNotSupported,
    /// The request carries no `Sec-WebSocket-Key` header.
    #[error("Missing Sec-WebSocket-Key header")]
    MissingSecKey,
    /// The request carries no `Host` header.
    #[error("Missing Host header")]
    MissingHost,
    /// The request carries neither `Origin` nor `Sec-WebSocket-Origin`.
    #[error("Missing Origin header")]
    MissingOrigin,
    /// The 101 response does not fit the write buffer.
    #[error("Response larger than the write buffer")]
    ResponseTooLarge,
    /// The caller's request callback rejected the connection.
    #[error("Rejected by the request callback: {0:?}")]
    Rejected(E),
}

/// Top-level error of a [`WebSocket`](crate::WebSocket) connection.
#[derive(Debug, thiserror::Error)]
pub enum Error<T, E = Infallible> {
    /// Reading or decoding failed.
    #[error("Read error: {0}")]
    Read(#[from] DecodeError<T>),
    /// Encoding or writing failed.
    #[error("Write error: {0}")]
    Write(#[from] EncodeError<T>),
    /// The handshake failed.
    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError<E>),
    /// The peer sent a close frame; the connection should be dropped.
    #[error("Connection reset by close frame")]
    ConnectionReset,
}
