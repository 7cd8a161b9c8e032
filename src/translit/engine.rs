//! Letter-level transliteration engine.
//!
//! Maps Ukrainian Cyrillic text to a Latin, phoneme-approximating form.
//! The mapping is context-sensitive for the glide vowels (є, ю, я, ї):
//! at the start of a word they carry a leading glide ("ye", "yu", "ya",
//! "yi"), inside a word they soften to a plain vowel pair ("ie", "iu",
//! "ia", "i"). This is an approximate mapping for singing/karaoke use,
//! not a phonetic transcription.

use std::collections::HashMap;

/// Checks whether a character falls in the Cyrillic Unicode block (U+0400..U+04FF).
pub fn is_cyrillic(c: char) -> bool {
    ('\u{0400}'..='\u{04FF}').contains(&c)
}

/// Checks whether any character of `text` is Cyrillic.
pub fn contains_cyrillic(text: &str) -> bool {
    text.chars().any(is_cyrillic)
}

/// Apostrophe variants that occur inside Ukrainian words (сім'я, м’яч).
/// All normalize to the plain ASCII apostrophe.
const APOSTROPHES: [char; 3] = ['\'', '\u{02BC}', '\u{2019}'];

fn is_apostrophe(c: char) -> bool {
    APOSTROPHES.contains(&c)
}

/// A word character for tokenization purposes: alphanumerics, underscore,
/// and the in-word apostrophes. Everything else is a separator and is
/// preserved verbatim in the output.
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || is_apostrophe(c)
}

/// Immutable transliteration table: a base single-letter mapping plus the
/// `initial`/`inside` sub-tables for the context-sensitive glide vowels.
///
/// Constructed once and owned by a [`Transliterator`]; there is no
/// process-wide mapping state.
pub struct LetterTable {
    base: HashMap<char, &'static str>,
    initial: HashMap<char, &'static str>,
    inside: HashMap<char, &'static str>,
}

impl LetterTable {
    /// Builds the Ukrainian Cyrillic table.
    ///
    /// Characters not present in any table (Latin letters, digits,
    /// punctuation) pass through unchanged during transliteration.
    pub fn ukrainian() -> Self {
        let base: HashMap<char, &'static str> = [
            ('а', "a"),
            ('б', "b"),
            ('в', "v"),
            ('г', "h"),
            ('ґ', "g"),
            ('д', "d"),
            ('е', "e"),
            ('ж', "zh"),
            ('з', "z"),
            ('и', "y"),
            ('і', "i"),
            ('й', "y"),
            ('к', "k"),
            ('л', "l"),
            ('м', "m"),
            ('н', "n"),
            ('о', "o"),
            ('п', "p"),
            ('р', "r"),
            ('с', "s"),
            ('т', "t"),
            ('у', "u"),
            ('ф', "f"),
            ('х', "kh"),
            ('ц', "ts"),
            ('ч', "ch"),
            ('ш', "sh"),
            ('щ', "shch"),
            ('ь', "'"),
            ('\'', "'"),
            ('\u{02BC}', "'"),
            ('\u{2019}', "'"),
        ]
        .into_iter()
        .collect();

        let initial: HashMap<char, &'static str> =
            [('є', "ye"), ('ю', "yu"), ('я', "ya"), ('ї', "yi")]
                .into_iter()
                .collect();

        let inside: HashMap<char, &'static str> =
            [('є', "ie"), ('ю', "iu"), ('я', "ia"), ('ї', "i")]
                .into_iter()
                .collect();

        Self {
            base,
            initial,
            inside,
        }
    }
}

/// Pure Cyrillic-to-Latin transliterator.
///
/// Both entry points are total functions with no side effects: any input
/// yields an output, already-Latin text passes through unchanged, and
/// running the engine over its own output is a no-op.
pub struct Transliterator {
    table: LetterTable,
}

impl Transliterator {
    /// Creates a transliterator over the given letter table.
    pub fn new(table: LetterTable) -> Self {
        Self { table }
    }

    /// Creates a transliterator with the Ukrainian table.
    pub fn ukrainian() -> Self {
        Self::new(LetterTable::ukrainian())
    }

    /// Transliterates a single word.
    ///
    /// The glide vowels (є, ю, я, ї) use the initial form when they start
    /// the word or follow a character that is not part of the Cyrillic
    /// word (a Cyrillic letter or an in-word apostrophe), and the inside
    /// form otherwise. An uppercase source letter capitalizes only the
    /// first character of its replacement.
    ///
    /// # Examples
    ///
    /// ```
    /// use lyrika::translit::Transliterator;
    ///
    /// let tr = Transliterator::ukrainian();
    /// assert_eq!(tr.transliterate_word("Ярина"), "Yaryna");
    /// assert_eq!(tr.transliterate_word("сім'я"), "sim'ia");
    /// ```
    pub fn transliterate_word(&self, word: &str) -> String {
        let mut out = String::with_capacity(word.len());
        let mut prev_in_word = false;

        for (i, ch) in word.chars().enumerate() {
            let lower = ch.to_lowercase().next().unwrap_or(ch);

            let mapped = if self.table.initial.contains_key(&lower) {
                let sub = if i == 0 || !prev_in_word {
                    &self.table.initial
                } else {
                    &self.table.inside
                };
                sub.get(&lower).copied()
            } else {
                self.table.base.get(&lower).copied()
            };

            match mapped {
                Some(rep) if ch.is_uppercase() => push_capitalized(&mut out, rep),
                Some(rep) => out.push_str(rep),
                None => out.push(ch),
            }

            prev_in_word = is_cyrillic(ch) || is_apostrophe(ch);
        }

        out
    }

    /// Transliterates free text that may contain several words and
    /// punctuation.
    ///
    /// The text is split into word and separator runs; separators are
    /// preserved verbatim, and only word tokens that actually contain
    /// Cyrillic characters are transliterated.
    pub fn transliterate_text(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut start = 0;
        let mut in_word: Option<bool> = None;

        for (idx, ch) in text.char_indices() {
            let w = is_word_char(ch);
            match in_word {
                None => in_word = Some(w),
                Some(k) if k == w => {}
                Some(k) => {
                    self.push_token(&mut out, &text[start..idx], k);
                    start = idx;
                    in_word = Some(w);
                }
            }
        }
        if let Some(k) = in_word {
            self.push_token(&mut out, &text[start..], k);
        }

        out
    }

    fn push_token(&self, out: &mut String, token: &str, is_word: bool) {
        if is_word && contains_cyrillic(token) {
            out.push_str(&self.transliterate_word(token));
        } else {
            out.push_str(token);
        }
    }
}

impl Default for Transliterator {
    fn default() -> Self {
        Self::ukrainian()
    }
}

/// Appends `rep` to `out`, uppercasing only its first character.
fn push_capitalized(out: &mut String, rep: &str) {
    let mut chars = rep.chars();
    if let Some(first) = chars.next() {
        out.extend(first.to_uppercase());
        out.push_str(chars.as_str());
    }
}

/// A text-mapping capability: something that can rewrite lyric text.
///
/// There are two implementations: the real [`Transliterator`] and the
/// identity [`PassThrough`] used when a source's lyrics are already in
/// Latin form. Callers choose one explicitly via configuration.
pub trait TextMapper {
    /// Maps a piece of lyric text. Must be pure and total.
    fn map_text(&self, text: &str) -> String;
}

impl TextMapper for Transliterator {
    fn map_text(&self, text: &str) -> String {
        self.transliterate_text(text)
    }
}

/// Identity mapper for sources whose lyric text needs no rewriting.
pub struct PassThrough;

impl TextMapper for PassThrough {
    fn map_text(&self, text: &str) -> String {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin_text_passes_through() {
        let tr = Transliterator::ukrainian();
        let text = "Hello, world! 123 (unchanged)";
        assert_eq!(tr.transliterate_text(text), text);
    }

    #[test]
    fn test_basic_word() {
        let tr = Transliterator::ukrainian();
        assert_eq!(tr.transliterate_word("Привіт"), "Pryvit");
    }

    #[test]
    fn test_word_initial_glide() {
        let tr = Transliterator::ukrainian();
        // Word-initial я uses the glide form, capitalized from the source.
        assert_eq!(tr.transliterate_word("Ярина"), "Yaryna");
        assert_eq!(tr.transliterate_word("єдність"), "yednist'");
    }

    #[test]
    fn test_mid_word_glide_softens() {
        let tr = Transliterator::ukrainian();
        // The same letter mid-word maps to the plain vowel pair.
        assert_eq!(tr.transliterate_word("моя"), "moia");
        assert_eq!(tr.transliterate_word("сім'я"), "sim'ia");
    }

    #[test]
    fn test_apostrophe_variants_normalize() {
        let tr = Transliterator::ukrainian();
        assert_eq!(tr.transliterate_word("сім\u{2019}я"), "sim'ia");
        assert_eq!(tr.transliterate_word("сім\u{02BC}я"), "sim'ia");
    }

    #[test]
    fn test_multichar_capitalization() {
        let tr = Transliterator::ukrainian();
        // Only the first character of a multi-letter replacement is uppercased.
        assert_eq!(tr.transliterate_word("Щука"), "Shchuka");
        assert_eq!(tr.transliterate_word("Хмара"), "Khmara");
    }

    #[test]
    fn test_text_preserves_separators() {
        let tr = Transliterator::ukrainian();
        assert_eq!(
            tr.transliterate_text("Ой, у лузі!  (двічі)"),
            "Oy, u luzi!  (dvichi)"
        );
    }

    #[test]
    fn test_mixed_script_token() {
        let tr = Transliterator::ukrainian();
        // Digits and Latin letters inside a Cyrillic token pass through.
        assert_eq!(tr.transliterate_text("так2go"), "tak2go");
    }

    #[test]
    fn test_idempotent_on_own_output() {
        let tr = Transliterator::ukrainian();
        let once = tr.transliterate_text("Ярино, серце моє, сім'я жде!");
        let twice = tr.transliterate_text(&once);
        assert_eq!(once, twice);
        assert!(!contains_cyrillic(&once));
    }

    #[test]
    fn test_soft_sign() {
        let tr = Transliterator::ukrainian();
        assert_eq!(tr.transliterate_word("пісень"), "pisen'");
    }

    #[test]
    fn test_pass_through_mapper() {
        let text = "Привіт";
        assert_eq!(PassThrough.map_text(text), text);
    }
}
