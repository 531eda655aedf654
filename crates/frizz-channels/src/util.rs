//! Common utilities for the Discord adapter

/// Maximum length of text to log (to prevent sensitive data exposure)
pub const MAX_LOG_TEXT_LENGTH: usize = 50;

/// Discord message character limit
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

/// Patterns that indicate potentially sensitive content
pub const SENSITIVE_PATTERNS: &[&str] = &[
    "password",
    "secret",
    "token",
    "api_key",
    "bearer",
    "authorization",
    "/api/webhooks/",
];

/// Mask potentially sensitive text for logging
///
/// Operator lines may carry webhook URLs or credentials; those are redacted
/// and long lines are truncated.
///
/// # Examples
/// ```
/// use frizz_channels::util::mask_for_logging;
///
/// assert!(mask_for_logging("https://discord.com/api/webhooks/1/abc").contains("REDACTED"));
/// assert_eq!(mask_for_logging("TEXT: hello"), "TEXT: hello");
/// ```
#[must_use]
pub fn mask_for_logging(text: &str) -> String {
    let lower = text.to_lowercase();

    if SENSITIVE_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
        return "[REDACTED - potentially sensitive content]".to_string();
    }

    if text.chars().count() > MAX_LOG_TEXT_LENGTH {
        let head: String = text.chars().take(MAX_LOG_TEXT_LENGTH).collect();
        format!("{}...[truncated]", head)
    } else {
        text.to_string()
    }
}

/// Webhook URL with its secret token cut off, for logs
#[must_use]
pub fn redact_webhook_url(url: &str) -> String {
    match url.rsplit_once('/') {
        Some((head, _token)) => format!("{}/***", head),
        None => "***".to_string(),
    }
}

/// Split a reply into chunks Discord accepts, never inside a character
#[must_use]
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        if count == limit {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(ch);
        count += 1;
    }
    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Parse `<#123>` or a bare id
#[must_use]
pub fn parse_channel_ref(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let id = raw
        .strip_prefix("<#")
        .and_then(|rest| rest.strip_suffix('>'))
        .unwrap_or(raw);
    id.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_for_logging_sensitive() {
        assert!(mask_for_logging("my password is secret123").contains("REDACTED"));
        assert!(mask_for_logging("Bearer eyJhbGciOiJ").contains("REDACTED"));
        assert!(
            mask_for_logging("LINK_BUTTON https://discord.com/api/webhooks/1/x Go")
                .contains("REDACTED")
        );
    }

    #[test]
    fn test_mask_for_logging_truncate() {
        let long_msg = "é".repeat(100);
        let masked = mask_for_logging(&long_msg);
        assert!(masked.contains("truncated"));
        assert!(masked.starts_with(&"é".repeat(MAX_LOG_TEXT_LENGTH)));
    }

    #[test]
    fn test_mask_for_logging_pass_through() {
        assert_eq!(mask_for_logging("DIVIDER"), "DIVIDER");
        assert_eq!(mask_for_logging("TEXT: olá"), "TEXT: olá");
    }

    #[test]
    fn test_redact_webhook_url() {
        assert_eq!(
            redact_webhook_url("https://discord.com/api/webhooks/123/s3cr3t"),
            "https://discord.com/api/webhooks/123/***"
        );
    }

    #[test]
    fn test_split_message() {
        assert_eq!(split_message("", 5), vec![String::new()]);
        assert_eq!(split_message("abcdefg", 3), vec!["abc", "def", "g"]);
        assert_eq!(split_message("ééé", 2), vec!["éé", "é"]);
    }

    #[test]
    fn test_parse_channel_ref() {
        assert_eq!(parse_channel_ref("<#123>"), Some(123));
        assert_eq!(parse_channel_ref("456"), Some(456));
        assert_eq!(parse_channel_ref("<@123>"), None);
        assert_eq!(parse_channel_ref("general"), None);
    }
}
