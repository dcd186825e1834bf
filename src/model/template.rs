//! Column expressions: text with `{column}` and `{index}` placeholders.
//!
//! `{{` and `}}` produce literal braces.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Text(String),
    Column(String),
    Index,
}

/// A parsed column expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    parts: Vec<Part>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, String> {
        let mut parts = Vec::new();
        let mut text = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    text.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    text.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(format!("unclosed placeholder '{{{}'", name));
                    }
                    let name = name.trim();
                    if name.is_empty() {
                        return Err("empty placeholder '{}'".to_string());
                    }
                    if !text.is_empty() {
                        parts.push(Part::Text(std::mem::take(&mut text)));
                    }
                    if name == "index" {
                        parts.push(Part::Index);
                    } else {
                        parts.push(Part::Column(name.to_string()));
                    }
                }
                '}' => return Err("unmatched '}'".to_string()),
                c => text.push(c),
            }
        }
        if !text.is_empty() {
            parts.push(Part::Text(text));
        }

        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    /// Column names referenced by the expression, in order of appearance
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            Part::Column(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render for row `index`, resolving column placeholders via `lookup`.
    ///
    /// Returns the name of the first placeholder `lookup` cannot resolve.
    pub fn render<F, V>(&self, index: u64, lookup: F) -> Result<String, String>
    where
        F: Fn(&str) -> Option<V>,
        V: fmt::Display,
    {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Index => out.push_str(&index.to_string()),
                Part::Column(name) => match lookup(name) {
                    Some(value) => out.push_str(&value.to_string()),
                    None => return Err(name.clone()),
                },
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
