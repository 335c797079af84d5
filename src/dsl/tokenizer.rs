//! Quote-aware splitting of a command line into tokens.

const QUOTES: [char; 2] = ['"', '\''];

/// Split `line` on whitespace, honouring quotes.
///
/// A quote only opens or closes a quoted run when it sits on a word boundary:
/// at the start of the line, after whitespace or `=`, or before whitespace or
/// the end of the line. Anywhere else (`Goblin's`) it is an ordinary
/// character. `\"` and `\'` are kept as written, backslash included.
/// Comment (`#`) and blank lines produce no tokens.
pub fn tokenize(line: &str) -> Vec<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Vec::new();
    }

    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut open: Option<char> = None;

    for (i, &c) in chars.iter().enumerate() {
        if QUOTES.contains(&c) {
            let prev = if i > 0 { Some(chars[i - 1]) } else { None };
            if prev == Some('\\') {
                current.push(c);
                continue;
            }
            let at_boundary = prev.is_none_or(|p| p.is_whitespace() || p == '=')
                || chars.get(i + 1).is_none_or(|n| n.is_whitespace());
            match open {
                None if at_boundary => open = Some(c),
                Some(q) if q == c && at_boundary => open = None,
                _ => current.push(c),
            }
            continue;
        }
        if c.is_whitespace() && open.is_none() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push(c);
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
        .into_iter()
        .map(|t| t.trim_matches(&QUOTES[..]).to_string())
        .filter(|t| !t.trim().is_empty())
        .collect()
}
