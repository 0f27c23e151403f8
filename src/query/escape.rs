//! Escaping of text for quoted SQL literals.

/// Escapes NUL, line breaks, backslashes, quotes and Ctrl-Z with a backslash.
pub fn escape_str(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        push_escaped(&mut escaped, c);
    }
    escaped
}

/// Like [`escape_str`], and also escapes the LIKE wildcards `%` and `_`.
pub fn escape_for_like_str(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '%' => escaped.push_str("\\%"),
            '_' => escaped.push_str("\\_"),
            _ => push_escaped(&mut escaped, c),
        }
    }
    escaped
}

/// Escapes LIKE wildcards in text that has already been escaped.
pub fn escape_wildcards(text: &str) -> String {
    text.replace('%', "\\%").replace('_', "\\_")
}

/// Escapes every item of a slice.
pub fn escape_all<S: AsRef<str>>(items: &[S], escape: impl Fn(&str) -> String) -> Vec<String> {
    items.iter().map(|item| escape(item.as_ref())).collect()
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '\0' => out.push_str("\\0"),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\\' => out.push_str("\\\\"),
        '\'' => out.push_str("\\'"),
        '"' => out.push_str("\\\""),
        '\x1a' => out.push_str("\\Z"),
        _ => out.push(c),
    }
}
