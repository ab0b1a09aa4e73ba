//! Deterministic rewrite of near-JSON into strict JSON.
//!
//! Rewrites applied, in one left-to-right pass after escape collapsing:
//!
//! - single-quoted strings become double-quoted (inner `"` escaped, `\'`
//!   unescaped);
//! - bare identifier keys (`{name: ...}`) are quoted;
//! - trailing commas before `}` or `]` are removed;
//! - raw newlines, carriage returns and tabs inside strings are escaped.
//!
//! Escape collapsing runs first: a span whose quotes are all escaped
//! (`{\"name\": \"Soup\"}`, i.e. JSON encoded twice) is unescaped once, and a
//! doubled escape before a quote inside a string (`\\"`) collapses to `\"`.

/// Rewrites `span`. The output is not guaranteed to be valid JSON; callers
/// retry the strict parser on it.
pub fn sanitize(span: &str) -> String {
    let collapsed = collapse_double_encoding(span);
    rewrite(&collapsed)
}

fn collapse_double_encoding(span: &str) -> String {
    let bytes = span.as_bytes();
    let has_bare_quote = bytes
        .iter()
        .enumerate()
        .any(|(i, b)| *b == b'"' && (i == 0 || bytes[i - 1] != b'\\'));
    if !has_bare_quote && span.contains("\\\"") {
        span.replace("\\\"", "\"")
    } else {
        span.to_owned()
    }
}

fn rewrite(src: &str) -> String {
    let chars: Vec<char> = src.chars().collect();
    let mut out = String::with_capacity(src.len() + 16);
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            '"' | '\'' => {
                i = copy_string(&chars, i, &mut out);
            }
            ',' => {
                let next = next_significant(&chars, i + 1);
                if !matches!(next.map(|n| chars[n]), Some('}') | Some(']')) {
                    out.push(',');
                }
                i += 1;
            }
            c if is_ident_start(c) => {
                let start = i;
                while i < chars.len() && is_ident_continue(chars[i]) {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                let in_key_position = matches!(
                    prev_significant(&out),
                    Some('{') | Some(',')
                );
                let followed_by_colon =
                    next_significant(&chars, i).is_some_and(|n| chars[n] == ':');
                if in_key_position && followed_by_colon {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else {
                    out.push_str(&ident);
                }
            }
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }
    out
}

/// Copies the string literal starting at `chars[start]` into `out` as a
/// double-quoted JSON string. Returns the index after the closing quote.
fn copy_string(chars: &[char], start: usize, out: &mut String) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    out.push('"');

    while i < chars.len() {
        let ch = chars[i];
        if ch == '\\' {
            let Some(&next) = chars.get(i + 1) else {
                out.push_str("\\\\");
                return i + 1;
            };
            // `\\"` where the quote does not end the string: over-escaped quote.
            if next == '\\'
                && chars.get(i + 2) == Some(&'"')
                && quote == '"'
                && !closes_string(chars, i + 3)
            {
                out.push_str("\\\"");
                i += 3;
                continue;
            }
            if next == '\'' {
                out.push('\'');
            } else {
                out.push('\\');
                out.push(next);
            }
            i += 2;
            continue;
        }
        if ch == quote {
            out.push('"');
            return i + 1;
        }
        match ch {
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
        i += 1;
    }
    // Unterminated literal: close it so the parser sees a complete token.
    out.push('"');
    i
}

/// Heuristic: a quote at `idx - 1` closed its string if the next significant
/// character is structural.
fn closes_string(chars: &[char], idx: usize) -> bool {
    match next_significant(chars, idx) {
        None => true,
        Some(n) => matches!(chars[n], ',' | '}' | ']' | ':'),
    }
}

fn next_significant(chars: &[char], from: usize) -> Option<usize> {
    (from..chars.len()).find(|&i| !chars[i].is_whitespace())
}

fn prev_significant(out: &str) -> Option<char> {
    out.chars().rev().find(|c| !c.is_whitespace())
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '-'
}
