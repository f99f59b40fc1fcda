//! Embedding font binaries as `data:` URIs.

use data_encoding::BASE64;

use crate::Error;

/// MIME type of the WOFF2 transport flavor used for embedding.
pub const WOFF2_MIME: &str = "font/woff2";

const SCHEME: &str = "data:";
const ENCODING: &str = ";base64,";

/// Encode `bytes` as a self-describing `data:` URI.
pub fn encode(bytes: &[u8], mime_type: &str) -> String {
    format!("{SCHEME}{mime_type}{ENCODING}{}", BASE64.encode(bytes))
}

/// Decode an embedded font URI.
///
/// The scheme, MIME, and encoding tokens must match
/// `data:font/woff2;base64,` exactly; anything else is a
/// [`MalformedDataUri`](Error::MalformedDataUri) naming the first token that
/// did not match.
pub fn decode(uri: &str) -> Result<Vec<u8>, Error> {
    let rest = uri
        .strip_prefix(SCHEME)
        .ok_or(Error::MalformedDataUri("scheme"))?;
    let rest = rest
        .strip_prefix(WOFF2_MIME)
        .ok_or(Error::MalformedDataUri("mime"))?;
    let payload = rest
        .strip_prefix(ENCODING)
        .ok_or(Error::MalformedDataUri("encoding"))?;
    BASE64
        .decode(payload.as_bytes())
        .map_err(|_| Error::MalformedDataUri("payload"))
}
