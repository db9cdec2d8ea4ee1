//! Memory-text sanitization: strip markdown emphasis, emoji, and anything
//! outside an English/Korean/punctuation allowlist before a turn or memory
//! is persisted.

use regex::Regex;

pub struct TextSanitizer {
    bold_re: Regex,
    code_re: Regex,
    emoji_re_wide: Regex,
    emoji_re_symbols: Regex,
    allowlist_re: Regex,
    spaces_re: Regex,
}

impl TextSanitizer {
    pub fn new() -> Self {
        Self {
            bold_re: Regex::new(r"\*\*([^*]+)\*\*").expect("valid regex"),
            code_re: Regex::new(r"`([^`]+)`").expect("valid regex"),
            emoji_re_wide: Regex::new(r"[\x{1F000}-\x{1FFFF}]").expect("valid regex"),
            emoji_re_symbols: Regex::new(r"[\x{2600}-\x{27BF}]").expect("valid regex"),
            allowlist_re: Regex::new(r#"[^a-zA-Z0-9가-힣\s.,!?:;\-()"'\[\]\n/]"#)
                .expect("valid regex"),
            spaces_re: Regex::new(r" +").expect("valid regex"),
        }
    }

    /// Sanitize text before it is stored as a turn or memory. Idempotent:
    /// sanitizing already-sanitized text is a no-op.
    pub fn sanitize(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let mut out = self.bold_re.replace_all(text, "$1").into_owned();
        out = self.code_re.replace_all(&out, "$1").into_owned();
        out = self.emoji_re_wide.replace_all(&out, "").into_owned();
        out = self.emoji_re_symbols.replace_all(&out, "").into_owned();
        out = self.allowlist_re.replace_all(&out, "").into_owned();
        out = self.spaces_re.replace_all(&out, " ").into_owned();
        out.trim().to_string()
    }
}

impl Default for TextSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_unchanged() {
        let s = TextSanitizer::new();
        assert_eq!(s.sanitize(""), "");
    }

    #[test]
    fn strips_bold_and_code() {
        let s = TextSanitizer::new();
        assert_eq!(s.sanitize("**bold** and `code`"), "bold and code");
    }

    #[test]
    fn strips_emoji() {
        let s = TextSanitizer::new();
        assert_eq!(s.sanitize("hello 😀 world"), "hello world");
    }

    #[test]
    fn keeps_korean_and_punctuation() {
        let s = TextSanitizer::new();
        assert_eq!(s.sanitize("안녕하세요, 반갑습니다!"), "안녕하세요, 반갑습니다!");
    }

    #[test]
    fn strips_disallowed_symbols() {
        let s = TextSanitizer::new();
        assert_eq!(s.sanitize("cost: $5 @home #tag"), "cost: 5 home tag");
    }

    #[test]
    fn collapses_runs_of_spaces() {
        let s = TextSanitizer::new();
        assert_eq!(s.sanitize("a    b"), "a b");
    }

    #[test]
    fn is_idempotent() {
        let s = TextSanitizer::new();
        let once = s.sanitize("**bold** 😀 text!!");
        let twice = s.sanitize(&once);
        assert_eq!(once, twice);
    }
}
