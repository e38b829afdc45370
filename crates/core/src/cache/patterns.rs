//! Glob matching for cache keys, mirroring the subset of Redis `MATCH`
//! syntax the key builder emits.
//!
//! Supported: `*` (any run of characters, including none), `?` (exactly one
//! character) and `\` to escape the next character. Character classes are
//! not supported: keys never contain `[` since ids are percent-encoded, and
//! raw patterns holding one are refused via [`has_char_class`] before they
//! reach a backend that would interpret them.

/// Checks if a cache key matches a glob pattern.
///
/// # Examples
///
/// ```
/// use cacheward_core::cache::pattern_matches;
///
/// assert!(pattern_matches("app:cache:job:*", "app:cache:job:id_7:user_3"));
/// assert!(pattern_matches("app:cache:job:id_?", "app:cache:job:id_7"));
/// assert!(!pattern_matches("app:cache:job:*", "app:cache:team:id_1"));
/// ```
pub fn pattern_matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();

    let (mut p, mut k) = (0, 0);
    // Position of the last `*` seen and the key index it was tried against.
    let mut backtrack: Option<(usize, usize)> = None;

    while k < key.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, k));
                p += 1;
                continue;
            }
            Some('?') => {
                p += 1;
                k += 1;
                continue;
            }
            Some('\\') if p + 1 < pattern.len() => {
                if pattern[p + 1] == key[k] {
                    p += 2;
                    k += 1;
                    continue;
                }
            }
            Some(&c) if c == key[k] => {
                p += 1;
                k += 1;
                continue;
            }
            _ => {}
        }

        // Mismatch: let the last `*` swallow one more character, or fail.
        match backtrack {
            Some((star, tried)) => {
                p = star + 1;
                k = tried + 1;
                backtrack = Some((star, tried + 1));
            }
            None => return false,
        }
    }

    // Key exhausted: only trailing stars may remain.
    pattern[p..].iter().all(|&c| c == '*')
}

/// Returns true if the string contains unescaped glob metacharacters.
pub fn has_wildcards(pattern: &str) -> bool {
    let mut escaped = false;
    for c in pattern.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '*' | '?' => return true,
            _ => {}
        }
    }
    false
}

/// Returns true if the pattern opens an unescaped `[...]` character class.
pub fn has_char_class(pattern: &str) -> bool {
    let mut escaped = false;
    for c in pattern.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '[' => return true,
            _ => {}
        }
    }
    false
}
