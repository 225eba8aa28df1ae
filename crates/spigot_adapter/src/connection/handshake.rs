//! Identity extraction from the WebSocket upgrade request.
//!
//! Peers announce themselves with an identity header (`X-Self-Name` by
//! default). Header values are restricted to visible ASCII in practice, so
//! plugins send non-ASCII server names backslash-escaped (`\u4e2d`). With
//! [`IdentityEncoding::UnicodeEscape`] those escapes are decoded before the
//! name is used; [`IdentityEncoding::Raw`] takes the header bytes as they are.

use crate::config::AdapterConfig;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::debug;

/// How the identity header value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityEncoding {
    /// Header bytes as UTF-8, unchanged
    Raw,
    /// Backslash escapes (`\uXXXX`, `\xHH`, `\n`, ...) are decoded
    #[default]
    UnicodeEscape,
}

/// Decodes a raw header value into a peer identity.
///
/// Returns `None` when the decoded identity is empty.
pub fn decode_identity(raw: &[u8], encoding: IdentityEncoding) -> Option<String> {
    let value = String::from_utf8_lossy(raw);
    let identity = match encoding {
        IdentityEncoding::Raw => value.into_owned(),
        IdentityEncoding::UnicodeEscape => unescape(&value),
    };
    (!identity.is_empty()).then_some(identity)
}

/// Validates the upgrade request and pulls out the peer identity.
///
/// Requests for any path other than the configured endpoint are refused with
/// 404 before the upgrade. A missing identity is not refused here: the
/// connection manager completes the upgrade and closes with a policy
/// violation so the peer receives a proper close reason.
pub(crate) fn inspect_request(
    request: &Request,
    config: &AdapterConfig,
) -> Result<Option<String>, ErrorResponse> {
    let path = request.uri().path();
    if path != config.ws_path {
        debug!("Refusing upgrade for unknown path {}", path);
        let mut response = ErrorResponse::new(Some(format!("no endpoint at {path}")));
        *response.status_mut() = StatusCode::NOT_FOUND;
        return Err(response);
    }

    Ok(request
        .headers()
        .get(config.identity_header.as_str())
        .and_then(|value| decode_identity(value.as_bytes(), config.identity_encoding)))
}

/// Decodes backslash escapes.
///
/// Covers the single-character escapes, octal `\NNN`, `\xHH`, `\uXXXX`
/// (with surrogate pairs) and `\UXXXXXXXX`. Named escapes (`\N{...}`) are
/// not supported. Malformed or truncated escapes are kept literally rather
/// than rejecting the identity.
fn unescape(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '\\' || i + 1 >= chars.len() {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        let (decoded, consumed) = match chars[i + 1] {
            'n' => (Some('\n'), 2),
            't' => (Some('\t'), 2),
            'r' => (Some('\r'), 2),
            '\\' => (Some('\\'), 2),
            '\'' => (Some('\''), 2),
            '"' => (Some('"'), 2),
            'a' => (Some('\u{07}'), 2),
            'b' => (Some('\u{08}'), 2),
            'f' => (Some('\u{0C}'), 2),
            'v' => (Some('\u{0B}'), 2),
            '0'..='7' => {
                let digits = chars[i + 1..]
                    .iter()
                    .take(3)
                    .take_while(|c| c.is_digit(8))
                    .count();
                let code = chars[i + 1..i + 1 + digits]
                    .iter()
                    .fold(0, |acc, c| acc * 8 + c.to_digit(8).unwrap_or_default());
                (char::from_u32(code), 1 + digits)
            }
            'x' => (read_hex(&chars, i + 2, 2).and_then(char::from_u32), 4),
            'U' => (read_hex(&chars, i + 2, 8).and_then(char::from_u32), 10),
            'u' => match read_hex(&chars, i + 2, 4) {
                Some(high @ 0xD800..=0xDBFF) => {
                    let low = (chars.get(i + 6) == Some(&'\\') && chars.get(i + 7) == Some(&'u'))
                        .then(|| read_hex(&chars, i + 8, 4))
                        .flatten();
                    match low {
                        Some(low @ 0xDC00..=0xDFFF) => (
                            char::from_u32(0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)),
                            12,
                        ),
                        _ => (None, 6),
                    }
                }
                Some(code) => (char::from_u32(code), 6),
                None => (None, 6),
            },
            _ => (None, 2),
        };

        match decoded {
            Some(c) => {
                out.push(c);
                i += consumed;
            }
            None => {
                out.push('\\');
                i += 1;
            }
        }
    }

    out
}

fn read_hex(chars: &[char], start: usize, len: usize) -> Option<u32> {
    let digits = chars.get(start..start + len)?;
    if !digits.iter().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let digits: String = digits.iter().collect();
    u32::from_str_radix(&digits, 16).ok()
}
