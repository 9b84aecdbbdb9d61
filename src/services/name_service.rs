use std::collections::HashSet;

pub const FALLBACK_NAME: &str = "Untitled";

const SUFFIX_ALPHABET: &[u8; 26] = b"abcdefghijklmnopqrstuvwxyz";

/// Keeps ASCII letters only. Never returns an empty string.
pub fn sanitize(raw: &str) -> String {
    let letters: String = raw.chars().filter(char::is_ascii_alphabetic).collect();
    if letters.is_empty() {
        return FALLBACK_NAME.to_string();
    }
    letters
}

pub fn is_token(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphabetic())
}

/// Bijective base-26 numbering: 0 -> "a", 25 -> "z", 26 -> "aa", 27 -> "ab".
pub fn letter_suffix(index: usize) -> String {
    let mut n = index;
    let mut out = Vec::new();
    loop {
        out.push(SUFFIX_ALPHABET[n % 26]);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Returns `base` or the first `base + suffix` not yet in `used`, and reserves it.
pub fn uniquify(base: &str, used: &mut HashSet<String>) -> String {
    if used.insert(base.to_string()) {
        return base.to_string();
    }

    let mut idx = 0usize;
    loop {
        let candidate = format!("{base}{}", letter_suffix(idx));
        if !used.contains(&candidate) {
            used.insert(candidate.clone());
            return candidate;
        }
        idx += 1;
    }
}
