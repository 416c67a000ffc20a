use crate::foundation::error::{TelecastError, TelecastResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

/// Split one schedule line into `;`-separated statements of shell-style tokens.
///
/// Quoting follows POSIX shell words: single quotes are literal, double quotes honor `\"`, `\\`
/// and `\$`, a bare backslash escapes the next character. A `;` inside quotes is part of the token.
/// Empty statements are dropped.
pub(crate) fn lex_line(input: &str, line: usize) -> TelecastResult<Vec<Vec<String>>> {
    let mut statements = Vec::new();
    let mut tokens: Vec<String> = Vec::new();
    let mut cur = String::new();
    // Distinguishes `''` (an empty token) from no token at all.
    let mut in_token = false;
    let mut quote = Quote::None;
    let mut quote_start = 0usize;

    let mut chars = input.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match quote {
            Quote::Single => {
                if c == '\'' {
                    quote = Quote::None;
                } else {
                    cur.push(c);
                }
            }
            Quote::Double => match c {
                '"' => quote = Quote::None,
                '\\' => match chars.peek() {
                    Some(&(_, n @ ('"' | '\\' | '$' | '`'))) => {
                        cur.push(n);
                        chars.next();
                    }
                    _ => cur.push('\\'),
                },
                _ => cur.push(c),
            },
            Quote::None => match c {
                '\'' => {
                    quote = Quote::Single;
                    quote_start = i;
                    in_token = true;
                }
                '"' => {
                    quote = Quote::Double;
                    quote_start = i;
                    in_token = true;
                }
                '\\' => {
                    let Some((_, n)) = chars.next() else {
                        return Err(TelecastError::parse(
                            line,
                            format!("dangling escape at byte {i}"),
                        ));
                    };
                    cur.push(n);
                    in_token = true;
                }
                ';' => {
                    flush_token(&mut tokens, &mut cur, &mut in_token);
                    if !tokens.is_empty() {
                        statements.push(std::mem::take(&mut tokens));
                    }
                }
                c if c.is_whitespace() => flush_token(&mut tokens, &mut cur, &mut in_token),
                _ => {
                    cur.push(c);
                    in_token = true;
                }
            },
        }
    }

    if quote != Quote::None {
        return Err(TelecastError::parse(
            line,
            format!("unterminated quote starting at byte {quote_start}"),
        ));
    }
    flush_token(&mut tokens, &mut cur, &mut in_token);
    if !tokens.is_empty() {
        statements.push(tokens);
    }
    Ok(statements)
}

fn flush_token(tokens: &mut Vec<String>, cur: &mut String, in_token: &mut bool) {
    if *in_token {
        tokens.push(std::mem::take(cur));
        *in_token = false;
    }
}

/// Replace `$N` placeholders with positional arguments.
///
/// Returns `None` when the token references an argument that was not supplied; callers drop such
/// tokens, which is how macros take optional trailing arguments.
pub(crate) fn substitute(token: &str, args: &[String]) -> Option<String> {
    if !token.contains('$') {
        return Some(token.to_owned());
    }
    let bytes = token.as_bytes();
    let mut out = String::with_capacity(token.len());
    let mut last = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit() {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            let idx: usize = token[start..end].parse().ok()?;
            let arg = args.get(idx)?;
            out.push_str(&token[last..i]);
            out.push_str(arg);
            last = end;
            i = end;
        } else {
            i += 1;
        }
    }
    out.push_str(&token[last..]);
    Some(out)
}

pub(crate) fn has_placeholder(token: &str) -> bool {
    token
        .as_bytes()
        .windows(2)
        .any(|w| w[0] == b'$' && w[1].is_ascii_digit())
}
