//! Language-aware sentence segmentation.
//!
//! Splits request text into speakable sentences so the synthesizer can run
//! once per sentence and the transport can start streaming before the whole
//! request is synthesized.  Scanning is lazy: each call to [`sentences`]
//! returns a fresh iterator and no work happens until it is polled.

use crate::Language;

/// Abbreviations that end in a period without ending a sentence,
/// independent of language.
const COMMON_ABBREVIATIONS: &[&str] = &[
    "Dr.", "Prof.", "St.", "etc.", "vs.", "e.g.", "i.e.", "ca.", "No.",
];

fn abbreviations(language: Language) -> &'static [&'static str] {
    match language {
        Language::En => &[
            "Mr.", "Mrs.", "Ms.", "Jr.", "Sr.", "a.m.", "p.m.", "Inc.", "Ltd.", "Corp.",
        ],
        Language::Es => &["Sr.", "Sra.", "Srta.", "Dra.", "Ud.", "Uds.", "pág."],
        Language::Fr => &["M.", "Mme.", "Mlle.", "av.", "env."],
        Language::De => &["z.B.", "bzw.", "usw.", "Nr.", "Hr.", "Fr.", "ggf."],
        Language::It => &["Sig.", "Sig.ra", "Dott.", "ecc.", "pag."],
        Language::Nl => &["dhr.", "mevr.", "bijv.", "enz.", "nl."],
        Language::Ru => &["т.д.", "т.п.", "гг.", "др."],
        Language::Tr => &["vb.", "vs.", "Sn.", "Doç."],
    }
}

/// Iterate over the sentences of `text`.
///
/// Every yielded item is non-empty after trimming; whitespace-only input
/// yields nothing; text without a detected boundary yields exactly one item
/// equal to the trimmed input.  Deterministic for the same input+language.
pub fn sentences(text: &str, language: Language) -> Sentences<'_> {
    Sentences { rest: text, language }
}

pub struct Sentences<'a> {
    rest: &'a str,
    language: Language,
}

impl<'a> Iterator for Sentences<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let text = self.rest.trim_start();
        if text.is_empty() {
            self.rest = "";
            return None;
        }

        let mut chars = text.char_indices().peekable();
        let mut prev = '\0';
        while let Some((i, c)) = chars.next() {
            let before = prev;
            prev = c;
            if !matches!(c, '.' | '!' | '?') {
                continue;
            }
            // An ellipsis marks a pause, not a sentence boundary.
            if c == '.' && before == '.' {
                continue;
            }
            // Only break where the terminator is followed by whitespace,
            // a closing quote/bracket, or the end of input.  This keeps
            // decimals ("3.14") and dotted tokens intact.
            let follows_ok = match chars.peek() {
                None => true,
                Some(&(_, n)) => n.is_whitespace() || is_closer(n),
            };
            if !follows_ok {
                continue;
            }
            if c == '.' && ends_with_abbreviation(&text[..=i], self.language) {
                continue;
            }
            // Pull trailing terminators and closing punctuation into the
            // sentence ("he left!?", quoted speech).
            let mut end = i + c.len_utf8();
            while let Some(&(j, n)) = chars.peek() {
                if matches!(n, '.' | '!' | '?') || is_closer(n) {
                    end = j + n.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let (sentence, rest) = text.split_at(end);
            self.rest = rest;
            return Some(sentence.trim_end());
        }

        // Run-on input: one segment, the trimmed remainder.
        self.rest = "";
        Some(text.trim_end())
    }
}

fn is_closer(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '\u{201d}' | '\u{2019}' | '»')
}

/// Does the text up to and including a period end in an abbreviation?
fn ends_with_abbreviation(prefix: &str, language: Language) -> bool {
    let token = prefix
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or_default();
    // Single initials ("J. Smith") never end a sentence.
    let stem = token.trim_end_matches('.');
    if stem.chars().count() == 1 && stem.chars().all(char::is_alphabetic) {
        return true;
    }
    COMMON_ABBREVIATIONS.contains(&token) || abbreviations(language).contains(&token)
}
