use serde::Deserialize;

/// What the consent classifier concluded about one utterance.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ConsentVerdict {
    pub consented: bool,
    #[serde(default)]
    pub name: Option<String>,
}

impl ConsentVerdict {
    pub fn negative() -> Self {
        Self {
            consented: false,
            name: None,
        }
    }

    /// The verdict with its name normalized to a filename-safe token.
    pub fn normalized(self) -> Self {
        Self {
            consented: self.consented,
            name: self.name.as_deref().and_then(normalize_name),
        }
    }
}

/// Normalize a spoken name to the capture filename alphabet `[a-z0-9_]`.
///
/// Spaces become underscores, letters are lowercased, anything else is
/// dropped. Returns `None` when nothing usable remains, which the capture
/// path maps to "unknown".
pub fn normalize_name(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        match c {
            'a'..='z' | '0'..='9' | '_' => out.push(c),
            'A'..='Z' => out.push(c.to_ascii_lowercase()),
            ' ' | '\t' | '-' => out.push('_'),
            _ => {}
        }
    }
    // Collapse underscore runs and trim the ends
    let mut collapsed = String::with_capacity(out.len());
    let mut prev_underscore = true;
    for c in out.chars() {
        if c == '_' {
            if !prev_underscore {
                collapsed.push('_');
            }
            prev_underscore = true;
        } else {
            collapsed.push(c);
            prev_underscore = false;
        }
    }
    let collapsed = collapsed.trim_end_matches('_').to_string();

    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}
