//! Text scanning helpers shared by the clinical and monitoring agents.

/// Tokens that negate a symptom mention when they appear shortly before it.
const NEGATION_TOKENS: &[&str] = &["no", "not", "don't", "dont", "without", "denies", "never"];

/// How many words back a negation token suppresses a match.
const NEGATION_WINDOW: usize = 3;

/// Find `phrase` in `text`, ignoring negated mentions.
///
/// "my skin is yellowing" matches "yellowing"; "no yellowing of the skin"
/// does not. Matching is case-insensitive and phrase-aware: a multi-word
/// phrase is negated if a negation token appears within the window before
/// its first word.
pub fn contains_symptom(text: &str, phrase: &str) -> bool {
    let lowered = text.to_lowercase();
    let phrase = phrase.to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();
    let phrase_words: Vec<&str> = phrase.split_whitespace().collect();

    if phrase_words.is_empty() || words.len() < phrase_words.len() {
        return false;
    }

    'outer: for start in 0..=(words.len() - phrase_words.len()) {
        for (offset, phrase_word) in phrase_words.iter().enumerate() {
            if !word_matches(words[start + offset], phrase_word) {
                continue 'outer;
            }
        }

        let window_start = start.saturating_sub(NEGATION_WINDOW);
        let negated = words[window_start..start]
            .iter()
            .any(|w| NEGATION_TOKENS.contains(&trim_punctuation(w)));
        if !negated {
            return true;
        }
    }

    false
}

/// Compare a text word against a phrase word, ignoring surrounding
/// punctuation.
fn word_matches(word: &str, phrase_word: &str) -> bool {
    trim_punctuation(word) == phrase_word
}

fn trim_punctuation(word: &str) -> &str {
    word.trim_matches(|c: char| !c.is_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_match() {
        assert!(contains_symptom("my skin is yellowing badly", "yellowing"));
        assert!(contains_symptom("I keep vomiting blood.", "vomiting blood"));
    }

    #[test]
    fn test_negated_mention_suppressed() {
        assert!(!contains_symptom("no yellowing of the skin", "yellowing"));
        assert!(!contains_symptom("I am not vomiting blood", "vomiting blood"));
        assert!(!contains_symptom("patient denies confusion", "confusion"));
    }

    #[test]
    fn test_negation_window_is_bounded() {
        // Negation four words back no longer applies.
        assert!(contains_symptom(
            "no pain but my skin is yellowing",
            "yellowing"
        ));
    }

    #[test]
    fn test_case_and_punctuation() {
        assert!(contains_symptom("Swelling, in my abdomen", "swelling"));
        assert!(!contains_symptom("No swelling, feeling fine", "swelling"));
    }
}
