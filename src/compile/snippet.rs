//! Snippet text handling: escaping, variable expansion and plain-text rendering.
//!
//! Bodies use TextMate snippet syntax (`$1`, `${1:default}`, `${1|a,b|}`,
//! `$VAR`, `${VAR:default}`, `\` escapes). Hosts without snippet support get
//! the text from [`render_plain`].

/// Escape `text` so it is inserted literally by a snippet engine.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '$' | '}') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn is_var_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_var_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Replace `$<name>` tokens with escaped captures; unknown names become empty.
pub fn substitute_captures(text: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                out.push(chars[i]);
                out.push(chars[i + 1]);
                i += 2;
            }
            '$' if chars.get(i + 1) == Some(&'<') => {
                let close = chars[i + 2..].iter().position(|&c| c == '>').map(|p| p + i + 2);
                match close {
                    Some(end) => {
                        let name: String = chars[i + 2..end].iter().collect();
                        out.push_str(&escape(&lookup(&name).unwrap_or_default()));
                        i = end + 1;
                    }
                    None => {
                        out.push('$');
                        i += 1;
                    }
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Replace variables `resolve` knows with their escaped values, keeping all other syntax.
pub fn expand_variables(text: &str, resolve: impl Fn(&str) -> Option<String>) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            out.push(c);
            out.push(chars[i + 1]);
            i += 2;
            continue;
        }
        if c != '$' {
            out.push(c);
            i += 1;
            continue;
        }

        let braced = chars.get(i + 1) == Some(&'{');
        let name_start = if braced { i + 2 } else { i + 1 };
        if !chars.get(name_start).is_some_and(|&c| is_var_start(c)) {
            out.push(c);
            i += 1;
            continue;
        }
        let mut name_end = name_start;
        while chars.get(name_end).is_some_and(|&c| is_var_char(c)) {
            name_end += 1;
        }
        let name: String = chars[name_start..name_end].iter().collect();
        let end = if braced { matching_brace(&chars, i + 1) } else { Some(name_end - 1) };

        match (resolve(&name), end) {
            (Some(value), Some(end)) => {
                out.push_str(&escape(&value));
                i = end + 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Index of the `}` closing the `{` at `open`, honouring escapes and nesting.
fn matching_brace(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Render snippet syntax to the text a user would see with every field at its default.
pub fn render_plain(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    render_nodes(&chars, &mut pos, &mut out, false);
    out
}

fn render_nodes(chars: &[char], pos: &mut usize, out: &mut String, nested: bool) {
    while *pos < chars.len() {
        let c = chars[*pos];
        match c {
            '\\' if *pos + 1 < chars.len() => {
                out.push(chars[*pos + 1]);
                *pos += 2;
            }
            '}' if nested => return,
            '$' => render_dollar(chars, pos, out),
            _ => {
                out.push(c);
                *pos += 1;
            }
        }
    }
}

fn render_dollar(chars: &[char], pos: &mut usize, out: &mut String) {
    let start = *pos;
    *pos += 1;
    let braced = chars.get(*pos) == Some(&'{');
    if braced {
        *pos += 1;
    }

    let ident_start = *pos;
    let numeric = chars.get(*pos).is_some_and(|c| c.is_ascii_digit());
    if numeric {
        while chars.get(*pos).is_some_and(|c| c.is_ascii_digit()) {
            *pos += 1;
        }
    } else if chars.get(*pos).is_some_and(|&c| is_var_start(c)) {
        while chars.get(*pos).is_some_and(|&c| is_var_char(c)) {
            *pos += 1;
        }
    }
    if *pos == ident_start {
        // Not a field; keep the literal dollar
        *pos = start + 1;
        out.push('$');
        return;
    }
    if !braced {
        return;
    }

    match chars.get(*pos) {
        Some('}') => *pos += 1,
        Some(':') => {
            *pos += 1;
            render_nodes(chars, pos, out, true);
            if chars.get(*pos) == Some(&'}') {
                *pos += 1;
            }
        }
        Some('|') => {
            *pos += 1;
            let mut first = String::new();
            let mut in_first = true;
            while let Some(&c) = chars.get(*pos) {
                *pos += 1;
                match c {
                    '\\' => {
                        if let Some(&escaped) = chars.get(*pos) {
                            if in_first {
                                first.push(escaped);
                            }
                            *pos += 1;
                        }
                    }
                    ',' => in_first = false,
                    '|' if chars.get(*pos) == Some(&'}') => {
                        *pos += 1;
                        break;
                    }
                    _ if in_first => first.push(c),
                    _ => {}
                }
            }
            out.push_str(&first);
        }
        _ => {
            // Transforms and malformed fields render as nothing
            if let Some(end) = matching_brace(chars, ident_start - 1) {
                *pos = end + 1;
            } else {
                *pos = chars.len();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_plain() {
        assert_eq!(render_plain("foo $1 bar $0"), "foo  bar ");
        assert_eq!(render_plain("let ${1:name} = ${2:val};"), "let name = val;");
        assert_eq!(render_plain("${1:foo ${2:bar}} baz"), "foo bar baz");
        assert_eq!(render_plain(r"\$1 \} $"), "$1 } $");
        assert_eq!(render_plain("${1|let,const|} x"), "let x");
        assert_eq!(render_plain("${TM_FILENAME:untitled}"), "untitled");
        assert_eq!(render_plain("$UNKNOWN!"), "!");
        assert_eq!(render_plain("${1/(.*)/$1/} done"), " done");
    }

    #[test]
    fn test_capture_substitution_escapes() {
        let lookup = |name: &str| (name == "v").then(|| "a$b}".to_string());
        assert_eq!(substitute_captures("x($<v>)$<w>", lookup), r"x(a\$b\})");
        assert_eq!(substitute_captures(r"\$<v> $<unterminated", lookup), r"\$<v> $<unterminated");
    }

    #[test]
    fn test_expand_variables_keeps_unknown_syntax() {
        let resolve = |name: &str| match name {
            "TM_FILENAME" => Some("a$.ts".to_string()),
            _ => None,
        };
        assert_eq!(
            expand_variables("$TM_FILENAME ${TM_FILENAME:x} ${1:$OTHER} \\$TM_FILENAME", resolve),
            r"a\$.ts a\$.ts ${1:$OTHER} \$TM_FILENAME"
        );
    }
}
