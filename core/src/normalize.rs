//! Free-text ingredient names arrive from image recognition and LLM output in
//! mixed scripts: full-width digits, hiragana or katakana spellings of the
//! same word, stray punctuation. `normalize` collapses all of those into one
//! comparison key so the catalog can be queried consistently.

/// Normalize a raw ingredient name into its canonical comparison key.
///
/// Pipeline, in fixed order: trim, fold full-width ASCII to half-width, map
/// hiragana to katakana, drop punctuation and whitespace, lowercase Latin.
/// Total and idempotent: `normalize(normalize(s)) == normalize(s)` for any
/// input, and blank input yields the empty string.
#[must_use]
pub fn normalize(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(fold_width)
        .map(hiragana_to_katakana)
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Fold full-width ASCII variants (U+FF01–U+FF5E) and the ideographic space
/// to their half-width equivalents. Other characters pass through.
fn fold_width(c: char) -> char {
    match c {
        '\u{FF01}'..='\u{FF5E}' => {
            char::from_u32(c as u32 - 0xFEE0).unwrap_or(c)
        }
        '\u{3000}' => ' ',
        _ => c,
    }
}

/// Map a hiragana code point to its katakana counterpart one-for-one.
///
/// The two kana blocks are parallel with a fixed offset of 0x60, which covers
/// the whole table including small-tsu (っ→ッ) and the palatalizing y-kana
/// (ゃゅょ→ャュョ), plus the iteration marks ゝゞ.
fn hiragana_to_katakana(c: char) -> char {
    match c {
        '\u{3041}'..='\u{3096}' | '\u{309D}' | '\u{309E}' => {
            char::from_u32(c as u32 + 0x60).unwrap_or(c)
        }
        _ => c,
    }
}
