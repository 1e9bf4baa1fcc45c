use std::sync::LazyLock;

use regex::Regex;

/// Rewrites a legacy message body before it is stored.
pub trait ContentNormalizer {
    fn normalize(&self, raw: &str) -> String;
}

/// Stores content exactly as read.
pub struct Verbatim;

impl ContentNormalizer for Verbatim {
    fn normalize(&self, raw: &str) -> String {
        raw.to_string()
    }
}

static ATTRIBUTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*on\s.+\swrote:\s*$").expect("attribution regex is valid")
});

static ORIGINAL_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*-{2,}\s*original message\s*-{2,}\s*$")
        .expect("separator regex is valid")
});

/// Keeps only the new part of an email reply.
pub struct QuotedReplyStripper;

impl ContentNormalizer for QuotedReplyStripper {
    fn normalize(&self, raw: &str) -> String {
        let mut kept = Vec::new();
        for line in raw.lines() {
            if ATTRIBUTION.is_match(line) || ORIGINAL_MESSAGE.is_match(line) {
                break;
            }
            // Signature delimiter.
            if line == "-- " || line == "--" {
                break;
            }
            if line.trim_start().starts_with('>') {
                continue;
            }
            kept.push(line);
        }

        let stripped = kept.join("\n").trim().to_string();
        if stripped.is_empty() {
            raw.to_string()
        } else {
            stripped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ContentNormalizer, QuotedReplyStripper, Verbatim};

    #[test]
    fn verbatim_keeps_everything() {
        let body = "Hi\n> quoted\n";
        assert_eq!(Verbatim.normalize(body), body);
    }

    #[test]
    fn strips_attribution_and_history() {
        let body = "Thanks, that fixed it.\n\nOn Tue, Mar 6, 2012 at 10:00 AM, Support <help@example.com> wrote:\n> Did you try restarting?\n";
        assert_eq!(QuotedReplyStripper.normalize(body), "Thanks, that fixed it.");
    }

    #[test]
    fn strips_outlook_separator_and_signature() {
        let body = "Still broken.\n-- \nJane\n-----Original Message-----\nFrom: help";
        assert_eq!(QuotedReplyStripper.normalize(body), "Still broken.");

        let outlook = "Works now\n\n-----Original Message-----\nFrom: help";
        assert_eq!(QuotedReplyStripper.normalize(outlook), "Works now");
    }

    #[test]
    fn drops_inline_quotes() {
        let body = "> question one\nanswer one\n> question two\nanswer two";
        assert_eq!(
            QuotedReplyStripper.normalize(body),
            "answer one\nanswer two"
        );
    }

    #[test]
    fn keeps_original_when_everything_is_quoted() {
        let body = "> only quoted text";
        assert_eq!(QuotedReplyStripper.normalize(body), body);
    }
}
