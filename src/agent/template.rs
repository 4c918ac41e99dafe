//! Placeholder substitution for agent and task templates.
//!
//! Templates reference crew inputs as `{name}`. `{{` and `}}` render literal
//! braces and a lone `}` is kept as-is. Substitution is total: every
//! referenced name must be supplied, otherwise rendering fails and nothing is
//! produced.

use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Template rendering failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("undefined variable '{name}' at position {position} in template")]
    UndefinedVariable { name: String, position: usize },

    #[error("unmatched '{{' at position {position} in template")]
    UnmatchedBrace { position: usize },

    #[error("empty variable name '{{}}' at position {position} in template")]
    EmptyVariableName { position: usize },
}

/// One lexical piece of a template.
enum Segment<'a> {
    Literal(char),
    Placeholder { name: &'a str, position: usize },
}

/// Walk the template once, yielding literals and placeholders in order.
fn scan(template: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let mut segments = Vec::new();
    let mut chars = template.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        match ch {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                segments.push(Segment::Literal('{'));
            }
            '{' => {
                let body_start = pos + 1;
                let mut body_end = None;
                for (inner_pos, inner) in chars.by_ref() {
                    match inner {
                        '}' => {
                            body_end = Some(inner_pos);
                            break;
                        }
                        '{' => return Err(TemplateError::UnmatchedBrace { position: pos }),
                        _ => {}
                    }
                }
                let body_end = body_end.ok_or(TemplateError::UnmatchedBrace { position: pos })?;
                let name = template[body_start..body_end].trim();
                if name.is_empty() {
                    return Err(TemplateError::EmptyVariableName { position: pos });
                }
                segments.push(Segment::Placeholder {
                    name,
                    position: pos,
                });
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                }
                segments.push(Segment::Literal('}'));
            }
            other => segments.push(Segment::Literal(other)),
        }
    }

    Ok(segments)
}

/// Render `template`, substituting every `{name}` from `variables`.
///
/// ```
/// use std::collections::HashMap;
/// use nextvuln::agent::template::render_template;
///
/// let mut vars = HashMap::new();
/// vars.insert("platform".to_string(), "Defect Dojo".to_string());
/// let rendered = render_template("Retrieve findings from {platform}", &vars).unwrap();
/// assert_eq!(rendered, "Retrieve findings from Defect Dojo");
/// ```
pub fn render_template(
    template: &str,
    variables: &HashMap<String, String>,
) -> Result<String, TemplateError> {
    let mut rendered = String::with_capacity(template.len());
    for segment in scan(template)? {
        match segment {
            Segment::Literal(ch) => rendered.push(ch),
            Segment::Placeholder { name, position } => match variables.get(name) {
                Some(value) => rendered.push_str(value),
                None => {
                    return Err(TemplateError::UndefinedVariable {
                        name: name.to_string(),
                        position,
                    })
                }
            },
        }
    }
    Ok(rendered)
}

/// Names referenced by `template`, sorted and deduplicated.
pub fn placeholders(template: &str) -> Result<BTreeSet<String>, TemplateError> {
    Ok(scan(template)?
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Placeholder { name, .. } => Some(name.to_string()),
            Segment::Literal(_) => None,
        })
        .collect())
}

/// Build a variables map from key/value pairs.
pub fn vars<I, K, V>(pairs: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
