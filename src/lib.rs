//! Server-side `WebSocket` (RFC 6455) framing that presents a raw byte
//! stream over an upgraded connection.
//!
//! The crate sits between a byte transport (anything implementing
//! [`embedded_io_async::Read`] + [`embedded_io_async::Write`], plain or TLS)
//! and a higher-level protocol that wants to keep talking plain bytes:
//! incoming frames are unmasked, defragmented and, for legacy Base64 text
//! sessions, decoded before the payload is copied into the caller's buffer,
//! and outgoing byte runs are wrapped into unmasked server frames.
//!
//! This library allocates nothing. All working memory is caller-supplied
//! scratch buffers; frames larger than the read buffer are streamed through
//! it over multiple read cycles.
//!
//! # Accepting a connection
//!
//! ```no_run
//! # async fn serve() {
//! # use wstream::mock::Noop;
//! use wstream::{WebSocket, options::AcceptOptions};
//!
//! // An already connected stream.
//! // Impl embedded_io_async Read + Write.
//! let stream = Noop;
//!
//! let read_buffer = &mut [0u8; 8192];
//! let write_buffer = &mut [0u8; 8192];
//!
//! // Perform the server side of the WebSocket handshake.
//! // 16 is the max number of request headers to allocate space for.
//! let mut websocket = WebSocket::accept::<16>(
//!     AcceptOptions::default(),
//!     stream,
//!     read_buffer,
//!     write_buffer,
//! )
//! .await
//! .expect("Handshake failed");
//!
//! // Read the decoded byte stream like a socket.
//! let mut payload = [0u8; 1024];
//! loop {
//!     match websocket.read(&mut payload).await {
//!         Ok(0) => break,
//!         Ok(n) => {
//!             // Handle payload bytes.
//!             let _ = &payload[..n];
//!         }
//!         Err(err) => {
//!             // Handle error.
//!             let _ = err;
//!
//!             break;
//!         }
//!     }
//! }
//! # }
//! ```
//!
//! # Scheme probing
//!
//! Before the handshake, a caller that also serves non-WebSocket clients can
//! peek the first four bytes of the connection (with a short timeout,
//! [`options::HANDSHAKE_PEEK_TIMEOUT_MS`] is conventional) and
//! classify them with [`probe`]: TLS client hellos are reported so the
//! transport can be wrapped before probing again, legacy Flash policy
//! requests are answered with [`write_flash_policy`], and anything that is
//! not a `GET` falls through to the caller's native protocol.

#![no_std]
#![deny(missing_debug_implementations)]
#![deny(missing_docs)]

mod decode;
pub use decode::{Decoder, Progress};

mod encode;
pub use encode::{Encoder, Encoding};

pub mod error;

mod frame;

pub mod http;

mod mask;

#[doc(hidden)]
pub mod mock;

mod opcode;
pub use opcode::OpCode;

pub mod options;

mod probe;
pub use probe::{FLASH_POLICY_RESPONSE, Probe, probe, write_flash_policy};

mod websocket;
pub use websocket::WebSocket;


#[cfg(test)]
extern crate std;
