//! Glob matching for scan patterns.
//!
//! Supports the pattern language of key-value store scans: `*` matches any
//! run of characters, `?` a single character, `[abc]`, `[^abc]` and `[a-z]`
//! character classes, and `\` escapes the next character.

/// Returns true if `key` matches the glob `pattern`.
#[must_use]
pub fn matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();
    match_from(&pattern, &key)
}

fn match_from(pattern: &[char], key: &[char]) -> bool {
    let (mut p, mut k) = (0, 0);
    // Position to resume from after the last `*`: (pattern index, key index).
    let mut backtrack: Option<(usize, usize)> = None;

    while k < key.len() {
        let step = match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p + 1, k));
                p += 1;
                continue;
            }
            Some('?') => Some(1),
            Some('[') => match_class(&pattern[p..], key[k]),
            Some('\\') if p + 1 < pattern.len() => (pattern[p + 1] == key[k]).then_some(2),
            Some(c) => (*c == key[k]).then_some(1),
            None => None,
        };

        match step {
            Some(width) => {
                p += width;
                k += 1;
            }
            None => match backtrack {
                Some((bp, bk)) => {
                    p = bp;
                    k = bk + 1;
                    backtrack = Some((bp, bk + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p.min(pattern.len())..].iter().all(|c| *c == '*')
}

/// Matches `c` against the class at the start of `pattern`, returning the
/// pattern width consumed on success.
fn match_class(pattern: &[char], c: char) -> Option<usize> {
    let mut i = 1;
    let negate = pattern.get(i) == Some(&'^');
    if negate {
        i += 1;
    }

    let mut found = false;
    loop {
        match pattern.get(i) {
            // Unterminated class: treat the rest as the class body.
            None => break,
            Some(']') => {
                i += 1;
                break;
            }
            Some('\\') if i + 1 < pattern.len() => {
                found |= pattern[i + 1] == c;
                i += 2;
            }
            Some(&start) if pattern.get(i + 1) == Some(&'-') && i + 2 < pattern.len() => {
                let end = pattern[i + 2];
                let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
                found |= (lo..=hi).contains(&c);
                i += 3;
            }
            Some(&other) => {
                found |= other == c;
                i += 1;
            }
        }
    }

    (found != negate).then_some(i)
}

/// The literal text a pattern's matches must start with.
///
/// Stores with ordered keys use this to bound their scans.
#[must_use]
pub fn literal_prefix(pattern: &str) -> String {
    let mut prefix = String::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' | '?' | '[' => break,
            '\\' => match chars.next() {
                Some(escaped) => prefix.push(escaped),
                None => break,
            },
            _ => prefix.push(c),
        }
    }
    prefix
}
