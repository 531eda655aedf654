//! Invisible token codec
//!
//! A token is hidden inside visible text as a run of zero-width characters:
//! two INVISIBLE SEPARATOR (U+2063) delimiters, one ZERO WIDTH SPACE (bit 0)
//! or ZERO WIDTH NON-JOINER (bit 1) per bit of the token's bytes (most
//! significant bit first), and the same two delimiters again.
//!
//! Live tokens have the shape `gaw:<kind>:<update id>` and mark the text
//! blocks that a live update is allowed to rewrite.

use std::fmt;

/// Character used for both the start and the end fence
pub const DELIMITER: char = '\u{2063}';

const FENCE: &str = "\u{2063}\u{2063}";
const ZERO: char = '\u{200b}';
const ONE: char = '\u{200c}';

/// Namespace shared by every live-update token
pub const NAMESPACE: &str = "gaw";

/// Encode a token as an invisible character sequence.
#[must_use]
pub fn encode(token: &str) -> String {
    // Each bit marker is 3 bytes in UTF-8, as is each delimiter.
    let mut out = String::with_capacity(token.len() * 8 * 3 + FENCE.len() * 2);
    out.push_str(FENCE);
    for byte in token.bytes() {
        for shift in (0..8).rev() {
            out.push(if (byte >> shift) & 1 == 1 { ONE } else { ZERO });
        }
    }
    out.push_str(FENCE);
    out
}

/// A token found inside a larger text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// The decoded token string
    pub token: String,
    /// The exact invisible run, both fences included
    pub span: String,
}

/// Find and decode the first token embedded in `text`.
///
/// Returns `None` when no fenced run exists or when the run is not a valid
/// encoding. Never panics on arbitrary input.
#[must_use]
pub fn decode(text: &str) -> Option<Decoded> {
    let start = text.find(FENCE)?;
    let payload_start = start + FENCE.len();
    let payload_len = text[payload_start..].find(FENCE)?;
    let payload = &text[payload_start..payload_start + payload_len];

    let mut bytes = Vec::with_capacity(payload_len / 24);
    let mut current = 0u8;
    let mut bits = 0u8;
    for ch in payload.chars() {
        let bit = match ch {
            ZERO => 0,
            ONE => 1,
            _ => return None,
        };
        current = (current << 1) | bit;
        bits += 1;
        if bits == 8 {
            bytes.push(current);
            current = 0;
            bits = 0;
        }
    }
    if bits != 0 {
        return None;
    }

    let token = String::from_utf8(bytes).ok()?;
    let end = payload_start + payload_len + FENCE.len();
    Some(Decoded {
        token,
        span: text[start..end].to_string(),
    })
}

/// Kind of live value a token stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Participant counter, rendered as `Label: 12`
    Count,
    /// Countdown to a deadline, rendered as `Label: <t:UNIX:R>`
    Time,
}

impl TokenKind {
    /// Wire name used inside the token
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Time => "time",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "count" => Some(Self::Count),
            "time" => Some(Self::Time),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `gaw:<kind>:<id>` token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LiveToken {
    /// What the marked block displays
    pub kind: TokenKind,
    /// Logical update the block belongs to
    pub update_id: String,
}

impl LiveToken {
    /// Create a token for the given kind and update id
    pub fn new(kind: TokenKind, update_id: impl Into<String>) -> Self {
        Self {
            kind,
            update_id: update_id.into(),
        }
    }

    /// Parse a decoded token string. The id may itself contain `:`.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let mut parts = token.splitn(3, ':');
        if parts.next()? != NAMESPACE {
            return None;
        }
        let kind = TokenKind::parse(parts.next()?)?;
        let update_id = parts.next()?;
        Some(Self::new(kind, update_id))
    }

    /// Whether this token addresses the given update
    #[must_use]
    pub fn matches(&self, kind: TokenKind, update_id: &str) -> bool {
        self.kind == kind && self.update_id == update_id
    }

    /// Invisible marker carrying this token
    #[must_use]
    pub fn marker(&self) -> String {
        encode(&self.to_string())
    }
}

impl fmt::Display for LiveToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", NAMESPACE, self.kind, self.update_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_printable_ascii() {
        let tokens = ["gaw:count:abc", "", "~!@#$%^&*() {}[]", "gaw:time:gaw-1-deadbeef"];
        for token in tokens {
            let decoded = decode(&encode(token)).unwrap();
            assert_eq!(decoded.token, token);
        }
    }

    #[test]
    fn test_round_trip_inside_text() {
        let marker = encode("gaw:count:abc");
        let text = format!("Joined: 3{} trailing", marker);

        let decoded = decode(&text).unwrap();
        assert_eq!(decoded.token, "gaw:count:abc");
        assert_eq!(decoded.span, marker);
    }

    #[test]
    fn test_encoding_is_invisible() {
        let marker = encode("A");
        // 'A' = 0b0100_0001
        let expected: String = [
            DELIMITER, DELIMITER, ZERO, ONE, ZERO, ZERO, ZERO, ZERO, ZERO, ONE, DELIMITER,
            DELIMITER,
        ]
        .iter()
        .collect();
        assert_eq!(marker, expected);
    }

    #[test]
    fn test_plain_text_has_no_token() {
        assert!(decode("").is_none());
        assert!(decode("Joined: 3").is_none());
        assert!(decode("emoji 🎉 and ünïcödé").is_none());
        assert!(decode("\u{200b}\u{200c}\u{200b}").is_none());
    }

    #[test]
    fn test_unterminated_run() {
        let marker = encode("abc");
        let cut = &marker[..marker.len() - FENCE.len()];
        assert!(decode(cut).is_none());
    }

    #[test]
    fn test_invalid_payload_character() {
        let text = format!("{}{}x{}{}", FENCE, ZERO, ONE, FENCE);
        assert!(decode(&text).is_none());
    }

    #[test]
    fn test_payload_not_multiple_of_eight() {
        let text = format!("{}{}{}{}{}", FENCE, ZERO, ONE, ZERO, FENCE);
        assert!(decode(&text).is_none());
    }

    #[test]
    fn test_first_token_wins() {
        let text = format!("{}{}", encode("first"), encode("second"));
        assert_eq!(decode(&text).unwrap().token, "first");
    }

    #[test]
    fn test_live_token_parse() {
        let token = LiveToken::parse("gaw:count:abc").unwrap();
        assert_eq!(token.kind, TokenKind::Count);
        assert_eq!(token.update_id, "abc");
        assert!(token.matches(TokenKind::Count, "abc"));
        assert!(!token.matches(TokenKind::Time, "abc"));

        let with_colon = LiveToken::parse("gaw:time:a:b").unwrap();
        assert_eq!(with_colon.update_id, "a:b");

        assert!(LiveToken::parse("other:count:abc").is_none());
        assert!(LiveToken::parse("gaw:votes:abc").is_none());
        assert!(LiveToken::parse("gaw:count").is_none());
    }

    #[test]
    fn test_live_token_marker() {
        let token = LiveToken::new(TokenKind::Time, "xyz");
        assert_eq!(token.to_string(), "gaw:time:xyz");
        assert_eq!(decode(&token.marker()).unwrap().token, "gaw:time:xyz");
    }
}
