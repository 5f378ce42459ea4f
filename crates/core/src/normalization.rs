use unicode_normalization::UnicodeNormalization;

/// Collapses runs of whitespace and strips control characters so header
/// cells read the same regardless of how the CSV was exported.
pub fn normalize_header(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut prev_space = false;
    for ch in raw.trim().chars() {
        if ch.is_control() {
            continue;
        }
        if ch.is_whitespace() {
            if !prev_space {
                result.push(' ');
                prev_space = true;
            }
        } else {
            result.push(ch);
            prev_space = false;
        }
    }
    result.trim().to_string()
}

/// Folds locale-specific letters to their base Latin equivalents.
///
/// Turkish dotless/dotted i pairs do not decompose under NFKD, so they are
/// mapped explicitly; everything else goes through NFKD with combining
/// marks stripped (ğ -> g, é -> e, ü -> u, ...).
pub fn fold_diacritics(raw: &str) -> String {
    raw.chars()
        .map(|ch| match ch {
            'ı' | 'İ' => 'i',
            other => other,
        })
        .nfkd()
        .filter(|ch| !is_combining_mark(*ch))
        .collect()
}

/// Full folding pass used for the most lenient column-matching stage:
/// diacritics folded, lowercased, whitespace collapsed.
pub fn fold_key(raw: &str) -> String {
    normalize_header(&fold_diacritics(raw)).to_lowercase()
}

fn is_combining_mark(ch: char) -> bool {
    matches!(ch, '\u{0300}'..='\u{036f}' | '\u{1ab0}'..='\u{1aff}' | '\u{20d0}'..='\u{20ff}')
}
