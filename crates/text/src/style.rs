//! Pure-function style metrics computed over an assistant response, used by
//! the interaction logger.

/// Hedge phrases checked against each sentence, case-insensitive. English
/// and Korean phrases both present since the subsystem serves both.
const HEDGE_PHRASES: &[&str] = &[
    "i think",
    "maybe",
    "perhaps",
    "it seems",
    "probably",
    "i guess",
    "might be",
    "could be",
    "아마",
    "것 같아",
    "인 것 같다",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StyleMetrics {
    pub hedge_ratio: f64,
    pub avg_sentence_len: f64,
}

/// Split `response` into sentences on `.`, `!`, `?`, `。`, then compute the
/// share of non-empty sentences containing a hedge phrase and the average
/// sentence length. Responses under 10 characters return `{0.0, 0.0}`.
pub fn calculate_style_metrics(response: &str) -> StyleMetrics {
    if response.chars().count() < 10 {
        return StyleMetrics {
            hedge_ratio: 0.0,
            avg_sentence_len: 0.0,
        };
    }

    let sentences: Vec<&str> = response
        .split(['.', '!', '?', '。'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if sentences.is_empty() {
        return StyleMetrics {
            hedge_ratio: 0.0,
            avg_sentence_len: 0.0,
        };
    }

    let hedged = sentences
        .iter()
        .filter(|sentence| {
            let lower = sentence.to_lowercase();
            HEDGE_PHRASES.iter().any(|phrase| lower.contains(phrase))
        })
        .count();

    let hedge_ratio = round_to(hedged as f64 / sentences.len() as f64, 100.0);
    let avg_sentence_len = round_to(
        response.chars().count() as f64 / sentences.len() as f64,
        10.0,
    );

    StyleMetrics {
        hedge_ratio,
        avg_sentence_len,
    }
}

fn round_to(value: f64, scale: f64) -> f64 {
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_response_is_zeroed() {
        let m = calculate_style_metrics("ok");
        assert_eq!(m, StyleMetrics { hedge_ratio: 0.0, avg_sentence_len: 0.0 });
    }

    #[test]
    fn counts_hedge_phrases_per_sentence() {
        let m = calculate_style_metrics("I think this works. It definitely does.");
        assert_eq!(m.hedge_ratio, 0.5);
    }

    #[test]
    fn no_hedges_gives_zero_ratio() {
        let m = calculate_style_metrics("This is correct. The tests pass.");
        assert_eq!(m.hedge_ratio, 0.0);
    }

    #[test]
    fn korean_hedge_phrase_is_detected() {
        let m = calculate_style_metrics("이건 아마 맞을 것 같습니다. 확인해보겠습니다.");
        assert!(m.hedge_ratio > 0.0);
    }

    #[test]
    fn avg_sentence_len_is_rounded_to_one_decimal() {
        let m = calculate_style_metrics("Hello there. Short.");
        assert_eq!(m.avg_sentence_len, (m.avg_sentence_len * 10.0).round() / 10.0);
    }
}
