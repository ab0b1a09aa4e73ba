//! Locating the structured span inside free-form model output.

/// Returns the candidate spans for structured parsing, best first.
///
/// Order:
/// 1. top-level brace- or bracket-delimited spans inside fenced code blocks
///    (```` ``` ```` or ```` ```json ````);
/// 2. top-level spans of the whole text, left to right.
///
/// Prose such as "Here are [2] meals: {...}" yields both `[2]` and the
/// object, so a later stage can skip spans that do not hold items. Empty when
/// the text contains no opening `{` or `[`.
pub fn candidate_spans(text: &str) -> Vec<&str> {
    let mut spans: Vec<&str> = fenced_blocks(text).flat_map(top_level_spans).collect();
    for span in top_level_spans(text) {
        if !spans.contains(&span) {
            spans.push(span);
        }
    }
    spans
}

/// Iterates over the bodies of fenced code blocks, skipping the info string.
fn fenced_blocks(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        let open = rest.find("```")?;
        let after_fence = &rest[open + 3..];
        // The info string (e.g. `json`) runs to the end of the opening line.
        let body_start = after_fence.find('\n').map_or(after_fence.len(), |i| i + 1);
        let body = &after_fence[body_start..];
        match body.find("```") {
            Some(close) => {
                rest = &body[close + 3..];
                Some(&body[..close])
            }
            None => {
                // Unterminated fence: treat the remainder as the body.
                rest = "";
                Some(body)
            }
        }
    })
}

/// Successive top-level `{...}` or `[...]` spans, scanning past each one.
///
/// Brackets inside string literals (single- or double-quoted) are ignored.
/// An opener that is never balanced (truncated output) ends the scan: its span
/// extends to the last matching closer in the text, or to the end of the text.
fn top_level_spans(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        let start = rest.find(['{', '['])?;
        let body = &rest[start..];
        if let Some(end) = balanced_end(body) {
            rest = &body[end..];
            return Some(&body[..end]);
        }
        rest = "";
        let closer = if body.starts_with('{') { '}' } else { ']' };
        match body.rfind(closer) {
            Some(end) if end > 0 => Some(&body[..=end]),
            _ => Some(body),
        }
    })
}

/// Byte offset one past the closer that balances the opener at `body[0]`.
pub(super) fn balanced_end(body: &str) -> Option<usize> {
    let mut depth = 0_usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (idx, ch) in body.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_block_comes_first() {
        let text = "Sure! {not this}\n```json\n{\"meals\": []}\n```\nEnjoy.";
        assert_eq!(candidate_spans(text), vec!["{\"meals\": []}", "{not this}"]);
    }

    #[test]
    fn nested_braces_stay_in_one_span() {
        let text = "Here is your plan: {\"name\": \"Soup\", \"tags\": {\"a\": 1}} Bon appetit {x}";
        assert_eq!(
            candidate_spans(text),
            vec!["{\"name\": \"Soup\", \"tags\": {\"a\": 1}}", "{x}"]
        );
    }

    #[test]
    fn prose_brackets_do_not_hide_later_object() {
        let text = "Here are [2] meals: {\"meals\": []}";
        assert_eq!(candidate_spans(text), vec!["[2]", "{\"meals\": []}"]);
    }

    #[test]
    fn brackets_inside_strings_are_ignored() {
        let text = r#"[{"name": "Curly } fries"}] trailing"#;
        assert_eq!(candidate_spans(text), vec![r#"[{"name": "Curly } fries"}]"#]);
    }

    #[test]
    fn fence_without_braces_is_skipped() {
        let text = "```\nplain text\n```\n{\"a\": 1}";
        assert_eq!(candidate_spans(text), vec!["{\"a\": 1}"]);
    }

    #[test]
    fn truncated_output_extends_to_last_closer() {
        let text = "{\"meals\": [{\"name\": \"A\"}";
        assert_eq!(candidate_spans(text), vec!["{\"meals\": [{\"name\": \"A\"}"]);
    }

    #[test]
    fn text_without_openers_has_no_candidate() {
        assert!(candidate_spans("I could not see any food.").is_empty());
    }
}
