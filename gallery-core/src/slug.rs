//! Slug derivation. Pure functions, no I/O.

use crate::item::PAINTINGS;

/// ASCII replacement for Latin letters with diacritics.
fn fold(c: char) -> Option<&'static str> {
    let s = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => "c",
        'ď' | 'đ' | 'ð' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => "e",
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => "g",
        'ĥ' | 'ħ' => "h",
        'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => "i",
        'ĳ' => "ij",
        'ĵ' => "j",
        'ķ' | 'ĸ' => "k",
        'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => "l",
        'ñ' | 'ń' | 'ņ' | 'ň' | 'ŉ' | 'ŋ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => "o",
        'œ' => "oe",
        'ŕ' | 'ŗ' | 'ř' => "r",
        'ś' | 'ŝ' | 'ş' | 'š' | 'ſ' => "s",
        'ß' => "ss",
        'ţ' | 'ť' | 'ŧ' => "t",
        'þ' => "th",
        'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => "u",
        'ŵ' => "w",
        'ý' | 'ÿ' | 'ŷ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        _ => return None,
    };
    Some(s)
}

/// Combining marks; decomposed input carries its accents in these.
fn is_combining_mark(c: char) -> bool {
    matches!(
        c,
        '\u{0300}'..='\u{036F}'
            | '\u{1AB0}'..='\u{1AFF}'
            | '\u{1DC0}'..='\u{1DFF}'
            | '\u{20D0}'..='\u{20FF}'
            | '\u{FE20}'..='\u{FE2F}'
    )
}

/// Lowercase, fold diacritics, keep `[a-z0-9]`, collapse everything else to single `-`.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        let mut buf = [0u8; 4];
        if is_combining_mark(c) {
            continue;
        }
        let piece = if c.is_ascii_alphanumeric() {
            &*c.encode_utf8(&mut buf)
        } else if let Some(folded) = fold(c) {
            folded
        } else {
            pending_dash = true;
            continue;
        };

        if pending_dash && !out.is_empty() {
            out.push('-');
        }
        pending_dash = false;
        out.push_str(piece);
    }

    out
}

/// Final path component of `name` without its last extension.
pub fn filename_stem(name: &str) -> &str {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base.rfind('.') {
        Some(0) | None => base,
        Some(idx) => &base[..idx],
    }
}

/// The public slug of an item.
///
/// Paintings combine title and file stem so same-titled works stay distinct;
/// other sections use the title alone and fall back to `section-stem`.
pub fn slug_for(section: &str, title: &str, original_name: &str) -> String {
    let title_slug = slugify(title);
    let stem = filename_stem(original_name);

    if section == PAINTINGS {
        let stem_slug = slugify(stem);
        match (title_slug.is_empty(), stem_slug.is_empty()) {
            (false, false) => return format!("{title_slug}-{stem_slug}"),
            (false, true) => return title_slug,
            (true, false) => return stem_slug,
            (true, true) => {}
        }
    } else if !title_slug.is_empty() {
        return title_slug;
    }

    slugify(&format!("{section}-{stem}"))
}
