//! Upgrade request parsing and 101 response emission.

use base64::{Engine as _, engine::general_purpose};
use httparse::{Header, Status};
use sha1::{Digest, Sha1};

use crate::Encoding;

/// GUID appended to the client key before hashing (RFC 6455 section 4.2.2).
const GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// A parsed client upgrade request.
///
/// Borrowed views into the handshake buffer; whatever the caller wants to
/// keep (typically the request path) must be copied out inside the
/// [`accept_with`](crate::WebSocket::accept_with) callback.
#[derive(Debug)]
pub struct Request<'buf, const N: usize> {
    method: Option<&'buf str>,
    path: Option<&'buf str>,
    version: Option<u8>,
    headers: [Header<'buf>; N],
}

impl<'buf, const N: usize> Request<'buf, N> {
    const fn new(
        method: Option<&'buf str>,
        path: Option<&'buf str>,
        version: Option<u8>,
        headers: [Header<'buf>; N],
    ) -> Self {
        Request {
            method,
            path,
            version,
            headers,
        }
    }

    /// Returns the request method.
    pub const fn method(&self) -> Option<&'buf str> {
        self.method
    }

    /// Returns the request path.
    pub const fn path(&self) -> Option<&'buf str> {
        self.path
    }

    /// Returns the minor HTTP version (`1` for HTTP/1.1).
    pub const fn version(&self) -> Option<u8> {
        self.version
    }

    /// Returns the header with the given name, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&Header<'buf>> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
    }

    /// Returns the value of the header with the given name.
    pub fn header_value(&self, name: &str) -> Option<&'buf [u8]> {
        self.header(name).map(|h| h.value)
    }

    /// Returns the value of the header with the given name as a string.
    pub fn header_value_str(&self, name: &str) -> Option<&'buf str> {
        self.header_value(name)
            .and_then(|v| core::str::from_utf8(v).ok())
    }
}

/// Parses an upgrade request out of `src`.
///
/// Returns the request and the number of bytes it occupies, or `None` while
/// the request is still incomplete.
pub(crate) fn parse<const N: usize>(
    src: &[u8],
) -> Result<Option<(Request<'_, N>, usize)>, httparse::Error> {
    let mut headers = [httparse::EMPTY_HEADER; N];
    let mut request = httparse::Request::new(&mut headers);

    match request.parse(src)? {
        Status::Complete(len) => Ok(Some((
            Request::new(request.method, request.path, request.version, headers),
            len,
        ))),
        Status::Partial => Ok(None),
    }
}

/// Computes the `Sec-WebSocket-Accept` token for a client key.
pub(crate) fn sec_accept(sec_key: &[u8]) -> [u8; 28] {
    let mut sha1 = Sha1::new();

    sha1.update(sec_key);
    sha1.update(GUID);

    let hash = sha1.finalize();

    debug_assert!(hash.len() == 20, "SHA1 hash should be 20 bytes long");

    // 28 = ((4 * hash.len() + 2) / 3 + 3) & !3 = ((4 * 20 + 2) / 3 + 3) & !3
    let mut encoded: [u8; 28] = [0; 28];

    general_purpose::STANDARD
        .encode_slice(hash, &mut encoded)
        .expect("Bug: sec_accept encoding failed");

    encoded
}

/// Picks the payload encoding from the client's `Sec-WebSocket-Protocol`
/// offer, and the sub-protocol name to echo back, if any.
///
/// `binary` wins over `base64`; a client that offers neither gets Base64
/// framing with no echoed protocol.
pub(crate) fn select_encoding(offer: Option<&[u8]>) -> (Encoding, Option<&'static str>) {
    match offer {
        Some(list) if contains(list, b"binary") => (Encoding::Binary, Some("binary")),
        Some(list) if contains(list, b"base64") => (Encoding::Base64, Some("base64")),
        _ => (Encoding::Base64, None),
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Writes the `101 Switching Protocols` response into `dst`, returning its
/// length, or `None` if it does not fit.
pub(crate) fn write_response(
    dst: &mut [u8],
    accept: &[u8; 28],
    protocol: Option<&str>,
    additional_headers: &[Header<'_>],
) -> Option<usize> {
    let mut pos = 0;

    fn write_bytes(dst: &mut [u8], pos: &mut usize, data: &[u8]) -> Option<()> {
        if *pos + data.len() > dst.len() {
            return None;
        }

        dst[*pos..*pos + data.len()].copy_from_slice(data);

        *pos += data.len();

        Some(())
    }

    write_bytes(dst, &mut pos, b"HTTP/1.1 101 Switching Protocols\r\n")?;
    write_bytes(dst, &mut pos, b"Upgrade: websocket\r\n")?;
    write_bytes(dst, &mut pos, b"Connection: Upgrade\r\n")?;
    write_bytes(dst, &mut pos, b"Sec-WebSocket-Accept: ")?;
    write_bytes(dst, &mut pos, accept)?;
    write_bytes(dst, &mut pos, b"\r\n")?;

    if let Some(protocol) = protocol {
        write_bytes(dst, &mut pos, b"Sec-WebSocket-Protocol: ")?;
        write_bytes(dst, &mut pos, protocol.as_bytes())?;
        write_bytes(dst, &mut pos, b"\r\n")?;
    }

    for header in additional_headers {
        write_bytes(dst, &mut pos, header.name.as_bytes())?;
        write_bytes(dst, &mut pos, b": ")?;
        write_bytes(dst, &mut pos, header.value)?;
        write_bytes(dst, &mut pos, b"\r\n")?;
    }

    write_bytes(dst, &mut pos, b"\r\n")?;

    Some(pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_token() {
        // The worked example from RFC 6455 section 1.3.
        let accept = sec_accept(b"dGhlIHNhbXBsZSBub25jZQ==");

        assert_eq!(&accept, b"s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn encoding_selection() {
        assert_eq!(
            select_encoding(Some(b"binary")),
            (Encoding::Binary, Some("binary"))
        );
        assert_eq!(
            select_encoding(Some(b"base64, binary")),
            (Encoding::Binary, Some("binary"))
        );
        assert_eq!(
            select_encoding(Some(b"base64")),
            (Encoding::Base64, Some("base64"))
        );
        assert_eq!(select_encoding(Some(b"chat")), (Encoding::Base64, None));
        assert_eq!(select_encoding(None), (Encoding::Base64, None));
    }

    #[test]
    fn parse_partial_then_complete() {
        let request = b"GET /stream HTTP/1.1\r\nHost: example.com\r\n\r\n";

        assert!(matches!(parse::<4>(&request[..10]), Ok(None)));

        let (parsed, consumed) = parse::<4>(request).unwrap().unwrap();

        assert_eq!(consumed, request.len());
        assert_eq!(parsed.method(), Some("GET"));
        assert_eq!(parsed.path(), Some("/stream"));
        assert_eq!(parsed.version(), Some(1));
        assert_eq!(parsed.header_value_str("HOST"), Some("example.com"));
    }

    #[test]
    fn response_layout() {
        let mut dst = [0u8; 256];
        let accept = sec_accept(b"dGhlIHNhbXBsZSBub25jZQ==");

        let len = write_response(&mut dst, &accept, Some("binary"), &[]).unwrap();
        let response = core::str::from_utf8(&dst[..len]).unwrap();

        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Upgrade: websocket\r\n"));
        assert!(response.contains("Connection: Upgrade\r\n"));
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(response.contains("Sec-WebSocket-Protocol: binary\r\n"));
        assert!(response.ends_with("\r\n\r\n"));
    }

    #[test]
    fn response_without_protocol() {
        let mut dst = [0u8; 256];
        let accept = sec_accept(b"dGhlIHNhbXBsZSBub25jZQ==");

        let len = write_response(&mut dst, &accept, None, &[]).unwrap();
        let response = core::str::from_utf8(&dst[..len]).unwrap();

        assert!(!response.contains("Sec-WebSocket-Protocol"));
    }

    #[test]
    fn response_too_large() {
        let mut dst = [0u8; 32];
        let accept = sec_accept(b"dGhlIHNhbXBsZSBub25jZQ==");

        assert_eq!(write_response(&mut dst, &accept, None, &[]), None);
    }
}
