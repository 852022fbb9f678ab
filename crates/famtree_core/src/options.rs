//! Action options strings.
//!
//! `-p/--options` takes a string such as
//! `name=family_group,title="Smith, John",columns=[id,"birth date"]`:
//!
//! * entries are `name=value`, separated by commas;
//! * a value may be quoted with `'` or `"`; the other quote character may
//!   appear inside, a single value cannot use both;
//! * a value starting with `[` is a list up to the matching `]`; list items
//!   are comma separated and may be quoted; lists do not nest.
//!
//! Quotes and brackets are kept in the value. [`unquote`] and [`parse_list`]
//! take them apart where a consumer needs the inner text.

use crate::error::{FamError, Result};
use std::collections::BTreeMap;
use tracing::warn;

/// Parsed options, by name.
pub type OptionMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Name,
    Value,
    Quote { quote: char, in_list: bool },
    List,
}

fn syntax_error(input: &str, detail: impl Into<String>) -> FamError {
    FamError::OptionSyntax {
        summary: "Invalid options string".to_string(),
        detail: format!("{} in '{}'", detail.into(), input),
    }
}

/// Scans `input`, calling `emit` for every complete entry.
fn scan(input: &str, mut emit: impl FnMut(String, String)) -> Result<()> {
    let mut state = State::Name;
    let mut name = String::new();
    let mut value = String::new();
    let mut value_quote: Option<char> = None;

    let mut finish = |name: &mut String, value: &mut String| -> Result<()> {
        if name.is_empty() {
            return Err(syntax_error(input, "option name missing"));
        }
        emit(std::mem::take(name), std::mem::take(value));
        Ok(())
    };

    for c in input.chars() {
        state = match state {
            State::Name => match c {
                '=' => {
                    value_quote = None;
                    State::Value
                }
                ',' => {
                    return Err(syntax_error(input, format!("option '{}' has no value", name)))
                }
                _ => {
                    name.push(c);
                    State::Name
                }
            },
            State::Value => match c {
                '[' if value.is_empty() => {
                    value.push(c);
                    State::List
                }
                '"' | '\'' => {
                    if value_quote.is_some_and(|q| q != c) {
                        return Err(syntax_error(input, "a value cannot mix quote types"));
                    }
                    value_quote = Some(c);
                    value.push(c);
                    State::Quote {
                        quote: c,
                        in_list: false,
                    }
                }
                ',' => {
                    finish(&mut name, &mut value)?;
                    State::Name
                }
                _ => {
                    value.push(c);
                    State::Value
                }
            },
            State::Quote { quote, in_list } => {
                value.push(c);
                if c == quote {
                    if in_list {
                        State::List
                    } else {
                        State::Value
                    }
                } else {
                    state
                }
            }
            State::List => match c {
                ']' => {
                    value.push(c);
                    State::Value
                }
                '[' => return Err(syntax_error(input, "lists cannot be nested")),
                '"' | '\'' => {
                    if value_quote.is_some_and(|q| q != c) {
                        return Err(syntax_error(input, "a value cannot mix quote types"));
                    }
                    value_quote = Some(c);
                    value.push(c);
                    State::Quote {
                        quote: c,
                        in_list: true,
                    }
                }
                _ => {
                    value.push(c);
                    State::List
                }
            },
        };
    }

    match state {
        State::Name if name.is_empty() => Ok(()),
        State::Name => Err(syntax_error(input, format!("option '{}' has no value", name))),
        State::Value => finish(&mut name, &mut value),
        State::Quote { .. } => Err(syntax_error(input, "unterminated quoted text")),
        State::List => Err(syntax_error(input, "unterminated list")),
    }
}

/// Parses an options string, failing on any syntax problem.
///
/// # Examples
///
/// ```
/// use famtree_core::options::parse_options;
///
/// let opts = parse_options(r#"name=foo,title=["a, b","c"]"#).unwrap();
/// assert_eq!(opts["name"], "foo");
/// assert_eq!(opts["title"], r#"["a, b","c"]"#);
/// ```
pub fn parse_options(input: &str) -> Result<OptionMap> {
    let mut map = OptionMap::new();
    scan(input, |name, value| {
        map.insert(name, value);
    })?;
    Ok(map)
}

/// Parses an options string, keeping what was read before a syntax error.
///
/// Errors are logged as warnings and never returned: a bad options string
/// must not stop the action from running with its defaults.
pub fn split_options(input: &str) -> OptionMap {
    let mut map = OptionMap::new();
    if let Err(e) = scan(input, |name, value| {
        map.insert(name, value);
    }) {
        warn!(error = %e, kept = map.len(), "Ignoring invalid options string.");
    }
    map
}

/// Serializes options as `name=value` pairs in name order.
pub fn render_options(options: &OptionMap) -> String {
    options
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Strips one pair of matching surrounding quotes.
pub fn unquote(value: &str) -> &str {
    for q in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Splits a `[a,"b, c"]` list value into unquoted items.
///
/// Returns `None` if `value` is not a bracketed list.
pub fn parse_list(value: &str) -> Option<Vec<String>> {
    let inner = value.strip_prefix('[')?.strip_suffix(']')?;
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in inner.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    current.push(c);
                }
                ',' => {
                    items.push(unquote(current.trim()).to_string());
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }
    if !inner.is_empty() {
        items.push(unquote(current.trim()).to_string());
    }
    Some(items)
}
