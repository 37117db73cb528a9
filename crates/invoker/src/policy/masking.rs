use converse_core::Message;
use regex::Regex;
use tracing::warn;

pub const EMAIL_PLACEHOLDER: &str = "[EMAIL]";
pub const PHONE_PLACEHOLDER: &str = "[PHONE]";
pub const SSN_PLACEHOLDER: &str = "[SSN]";
pub const CARD_PLACEHOLDER: &str = "[CREDIT_CARD]";

struct MaskPattern {
    name: &'static str,
    regex: Regex,
    placeholder: &'static str,
}

/// Replaces personal data in message text with fixed placeholder tokens.
///
/// Patterns run longest-digit-group first so a card number is never partly
/// consumed as a phone number. Placeholders contain no digits or `@`, which
/// keeps masking idempotent.
pub struct PiiMasker {
    patterns: Vec<MaskPattern>,
}

impl Default for PiiMasker {
    fn default() -> Self {
        Self::new()
    }
}

impl PiiMasker {
    pub fn new() -> Self {
        let raw_patterns = [
            ("credit_card", r"\b(?:\d{4}[-\s]?){3}\d{4}\b", CARD_PLACEHOLDER),
            ("ssn", r"\b\d{3}-\d{2}-\d{4}\b", SSN_PLACEHOLDER),
            (
                "email",
                r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
                EMAIL_PLACEHOLDER,
            ),
            (
                "phone",
                r"(?:\+?1[-.\s]?)?(?:\(\d{3}\)|\b\d{3})[-.\s]?\d{3}[-.\s]?\d{4}\b",
                PHONE_PLACEHOLDER,
            ),
        ];
        let patterns = raw_patterns
            .into_iter()
            .filter_map(|(name, pattern, placeholder)| match Regex::new(pattern) {
                Ok(regex) => Some(MaskPattern {
                    name,
                    regex,
                    placeholder,
                }),
                Err(e) => {
                    warn!("Failed to compile masking pattern '{}': {}", name, e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn mask_text(&self, text: &str) -> String {
        let mut masked = text.to_string();
        for pattern in &self.patterns {
            if pattern.regex.is_match(&masked) {
                masked = pattern
                    .regex
                    .replace_all(&masked, pattern.placeholder)
                    .into_owned();
            }
        }
        masked
    }

    pub fn mask_messages(&self, messages: &mut [Message]) {
        for message in messages.iter_mut() {
            message.map_texts(|text| self.mask_text(text));
        }
    }

    pub fn pattern_names(&self) -> Vec<&'static str> {
        self.patterns.iter().map(|p| p.name).collect()
    }
}
