//! Admin command line tokenizer.
//!
//! The first line is split with POSIX shell rules (whitespace separation,
//! single quotes, double quotes with backslash escapes, backslash outside
//! quotes). Following lines starting with `"> "` are quoted text: a run of
//! them becomes one token, lines joined with `\n`. Any other line ends the
//! run and is split like the first one.

/// Marker opening a quoted-text line.
pub const QUOTE_MARKER: &str = "> ";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenizeError {
    #[error("No closing quotation")]
    UnterminatedQuote,

    #[error("No escaped character")]
    TrailingEscape,
}

/// Split one line with shell quoting rules.
pub fn split_line(line: &str) -> Result<Vec<String>, TokenizeError> {
    #[derive(PartialEq)]
    enum Mode {
        Plain,
        Single,
        Double,
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    // A token exists once any of its characters or quotes were seen, so
    // `""` yields an empty token.
    let mut in_token = false;
    let mut mode = Mode::Plain;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match mode {
            Mode::Plain => match c {
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                '\'' => {
                    mode = Mode::Single;
                    in_token = true;
                }
                '"' => {
                    mode = Mode::Double;
                    in_token = true;
                }
                '\\' => {
                    let escaped = chars.next().ok_or(TokenizeError::TrailingEscape)?;
                    current.push(escaped);
                    in_token = true;
                }
                c => {
                    current.push(c);
                    in_token = true;
                }
            },
            Mode::Single => match c {
                '\'' => mode = Mode::Plain,
                c => current.push(c),
            },
            Mode::Double => match c {
                '"' => mode = Mode::Plain,
                '\\' => {
                    let escaped = chars.next().ok_or(TokenizeError::UnterminatedQuote)?;
                    if !matches!(escaped, '\\' | '"') {
                        current.push('\\');
                    }
                    current.push(escaped);
                }
                c => current.push(c),
            },
        }
    }

    if mode != Mode::Plain {
        return Err(TokenizeError::UnterminatedQuote);
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Tokenize a whole command body (prefix already removed).
pub fn tokenize(body: &str) -> Result<Vec<String>, TokenizeError> {
    let mut lines = body.lines().map(str::trim);
    let mut tokens = match lines.next() {
        Some(first) => split_line(first)?,
        None => return Ok(Vec::new()),
    };

    let mut quoted: Option<String> = None;
    for line in lines {
        if let Some(text) = line.strip_prefix(QUOTE_MARKER) {
            match quoted.as_mut() {
                Some(acc) => {
                    acc.push('\n');
                    acc.push_str(text);
                }
                None => quoted = Some(text.to_string()),
            }
            continue;
        }
        if let Some(acc) = quoted.take() {
            tokens.push(acc);
        }
        tokens.extend(split_line(line)?);
    }
    tokens.extend(quoted);
    Ok(tokens)
}

/// Tokenize `content` if it is a command for `prefix`.
///
/// Returns `None` when the message does not start with the prefix or has
/// nothing after it.
pub fn parse_command(prefix: &str, content: &str) -> Option<Result<Vec<String>, TokenizeError>> {
    let body = content.trim().strip_prefix(prefix)?;
    if body.is_empty() {
        return None;
    }
    Some(tokenize(body))
}
