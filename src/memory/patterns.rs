//! Trigger pattern validation.
//!
//! Patterns are checked once, when an item is saved. Accepted patterns are
//! stored verbatim and compiled at recall time without being re-checked.
//!
//! The nested-quantifier check is a static heuristic, not a full ReDoS
//! analysis: any group that contains an unbounded or counted quantifier and
//! is itself followed by one is rejected.

use regex::{Regex, RegexBuilder};

use crate::error::ValidationError;

/// Default length limit for a trigger pattern, in characters.
pub const MAX_PATTERN_LEN: usize = 200;

/// Compiled program size limit for trigger patterns.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Validate `pattern` against the default length limit.
pub fn validate_pattern(pattern: &str) -> Result<(), ValidationError> {
    validate_pattern_with_limit(pattern, MAX_PATTERN_LEN)
}

/// Validate `pattern`: length, compilation, then nested quantifiers.
pub fn validate_pattern_with_limit(pattern: &str, max_len: usize) -> Result<(), ValidationError> {
    let len = pattern.chars().count();
    if len > max_len {
        return Err(ValidationError::PatternTooLong { len, max: max_len });
    }

    build(pattern).map_err(|e| ValidationError::PatternInvalid(e.to_string()))?;

    if has_nested_quantifier(pattern) {
        return Err(ValidationError::NestedQuantifier(pattern.to_string()));
    }

    Ok(())
}

/// Compile a stored trigger pattern for matching (case-insensitive).
///
/// Returns `None` if the stored pattern no longer compiles.
pub fn compile_trigger(pattern: &str) -> Option<Regex> {
    match build(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "stored trigger pattern does not compile");
            None
        }
    }
}

fn build(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
}

/// Scan for a quantified group whose contents are themselves quantified.
fn has_nested_quantifier(pattern: &str) -> bool {
    let chars: Vec<char> = pattern.chars().collect();
    // One flag per open group: does it contain a quantifier?
    let mut groups: Vec<bool> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                i += 2;
                continue;
            }
            '[' => {
                i = skip_class(&chars, i);
                if let Some(len) = quantifier_at(&chars, i) {
                    mark_quantified(&mut groups);
                    i += len;
                }
                continue;
            }
            '(' => groups.push(false),
            ')' => {
                let inner_quantified = groups.pop().unwrap_or(false);
                if let Some(len) = quantifier_at(&chars, i + 1) {
                    if inner_quantified {
                        return true;
                    }
                    mark_quantified(&mut groups);
                    i += 1 + len;
                    continue;
                }
                if inner_quantified {
                    mark_quantified(&mut groups);
                }
            }
            _ => {
                if let Some(len) = quantifier_at(&chars, i) {
                    mark_quantified(&mut groups);
                    i += len;
                    continue;
                }
            }
        }
        i += 1;
    }

    false
}

fn mark_quantified(groups: &mut [bool]) {
    if let Some(top) = groups.last_mut() {
        *top = true;
    }
}

/// Length of the repeating quantifier starting at `i` (`+`, `*`, `{n}`,
/// `{n,}`, `{n,m}`), including a trailing lazy `?`. `?` alone is bounded and
/// does not count.
fn quantifier_at(chars: &[char], i: usize) -> Option<usize> {
    let len = match *chars.get(i)? {
        '+' | '*' => 1,
        '{' => {
            let mut j = i + 1;
            let mut digits = 0;
            while chars.get(j).is_some_and(|c| c.is_ascii_digit()) {
                j += 1;
                digits += 1;
            }
            if digits == 0 {
                return None;
            }
            if chars.get(j) == Some(&',') {
                j += 1;
                while chars.get(j).is_some_and(|c| c.is_ascii_digit()) {
                    j += 1;
                }
            }
            if chars.get(j) != Some(&'}') {
                return None;
            }
            j + 1 - i
        }
        _ => return None,
    };
    let lazy = usize::from(chars.get(i + len) == Some(&'?'));
    Some(len + lazy)
}

/// Index just past the character class opening at `start`.
fn skip_class(chars: &[char], start: usize) -> usize {
    let mut i = start + 1;
    if chars.get(i) == Some(&'^') {
        i += 1;
    }
    // A leading `]` is literal.
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            ']' => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}
