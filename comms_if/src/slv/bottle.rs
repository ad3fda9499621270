//! Bottle values and their textual form

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::fmt;
use serde::{Serialize, Deserialize};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A single element of a bottle.
///
/// Serialised untagged so that a bottle is a plain JSON array, e.g. `["set", "dof", [1, 1, 0]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Double(f64),
    Str(String),
    List(Vec<Value>),
}

/// Errors raised while parsing the textual form of a bottle.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BottleParseError {
    #[error("Unexpected `)` at character {0}")]
    UnexpectedClose(usize),

    #[error("{0} list(s) were not closed")]
    UnclosedList(usize),

    #[error("Unterminated string starting at character {0}")]
    UnterminatedString(usize),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Value {
    /// Numeric view of the value, ints are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Integer view of the value, doubles only if they have no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Double(d) if d.is_finite() && d.fract() == 0.0 => Some(*d as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l.as_slice()),
            _ => None,
        }
    }

    /// Convert a list of numbers into a vector, `None` if any element is not a number.
    pub fn as_f64_vec(&self) -> Option<Vec<f64>> {
        self.as_list()?.iter().map(Value::as_f64).collect()
    }

    /// Build a list value out of a slice of doubles.
    pub fn from_f64_slice(values: &[f64]) -> Self {
        Value::List(values.iter().map(|v| Value::Double(*v)).collect())
    }

    /// Build a `(key (values...))` option list.
    pub fn vector_option(key: &str, values: &[f64]) -> Self {
        Value::List(vec![Value::Str(key.into()), Value::from_f64_slice(values)])
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Double(d) => {
                if d.fract() == 0.0 && d.is_finite() {
                    write!(f, "{:.1}", d)
                } else {
                    write!(f, "{}", d)
                }
            },
            Value::Str(s) => {
                if s.is_empty() || s.chars().any(|c| c.is_whitespace() || c == '(' || c == ')') {
                    write!(f, "\"{}\"", s)
                } else {
                    write!(f, "{}", s)
                }
            },
            Value::List(l) => write!(f, "({})", format_bottle(l)),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Parse the textual form of a bottle, e.g. `set dof (1 1 1 0 0 0 1)`.
///
/// Tokens are separated by whitespace, parentheses delimit nested lists and double quotes
/// delimit strings containing whitespace. A token is an integer if it parses as one, then a
/// double, otherwise a string.
pub fn parse_bottle(text: &str) -> Result<Vec<Value>, BottleParseError> {
    // Stack of lists being built, the bottom one is the bottle itself
    let mut stack: Vec<Vec<Value>> = vec![Vec::new()];
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => (),
            '(' => stack.push(Vec::new()),
            ')' => {
                if stack.len() < 2 {
                    return Err(BottleParseError::UnexpectedClose(i));
                }
                let list = stack.pop().unwrap_or_default();
                if let Some(parent) = stack.last_mut() {
                    parent.push(Value::List(list));
                }
            },
            '"' => {
                let mut s = String::new();
                let mut terminated = false;
                for (_, c) in chars.by_ref() {
                    if c == '"' {
                        terminated = true;
                        break;
                    }
                    s.push(c);
                }
                if !terminated {
                    return Err(BottleParseError::UnterminatedString(i));
                }
                if let Some(top) = stack.last_mut() {
                    top.push(Value::Str(s));
                }
            },
            _ => {
                let mut token = String::new();
                token.push(c);
                while let Some(&(_, n)) = chars.peek() {
                    if n.is_whitespace() || n == '(' || n == ')' || n == '"' {
                        break;
                    }
                    token.push(n);
                    chars.next();
                }
                if let Some(top) = stack.last_mut() {
                    top.push(parse_token(&token));
                }
            }
        }
    }

    if stack.len() > 1 {
        return Err(BottleParseError::UnclosedList(stack.len() - 1));
    }

    Ok(stack.pop().unwrap_or_default())
}

/// Format a bottle back into its textual form.
pub fn format_bottle(values: &[Value]) -> String {
    values.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Look up an option in a bottle.
///
/// Options are either nested `(key value...)` lists or flat `key value` pairs. If the option has
/// a single value that value is returned, otherwise the remaining values are returned as a list.
pub fn find_option<'a>(values: &'a [Value], key: &str) -> Option<Value> {
    // Nested options first
    for v in values {
        if let Some(l) = v.as_list() {
            if l.first().and_then(Value::as_str) == Some(key) {
                return match l.len() {
                    1 => None,
                    2 => Some(l[1].clone()),
                    _ => Some(Value::List(l[1..].to_vec()))
                };
            }
        }
    }

    // Then flat pairs
    values.iter()
        .position(|v| v.as_str() == Some(key))
        .and_then(|i| values.get(i + 1))
        .cloned()
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn parse_token(token: &str) -> Value {
    if let Ok(i) = token.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(d) = token.parse::<f64>() {
        Value::Double(d)
    } else {
        Value::Str(token.into())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_nested() {
        let b = parse_bottle("set dof (1 1 1 0 0 0 1)").unwrap();
        assert_eq!(b.len(), 3);
        assert_eq!(b[0], Value::Str("set".into()));
        assert_eq!(b[2].as_f64_vec().unwrap(), vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0]);

        let b = parse_bottle("ask (xd (-0.3 0.1 0.1)) (pose xyz)").unwrap();
        assert_eq!(b.len(), 3);
        assert_eq!(
            find_option(&b, "xd").unwrap().as_f64_vec().unwrap(),
            vec![-0.3, 0.1, 0.1]
        );
        assert_eq!(find_option(&b, "pose"), Some(Value::Str("xyz".into())));
        assert_eq!(find_option(&b, "q"), None);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_bottle("get dof)"), Err(BottleParseError::UnexpectedClose(7)));
        assert_eq!(parse_bottle("(get (dof)"), Err(BottleParseError::UnclosedList(1)));
        assert_eq!(parse_bottle("\"abc"), Err(BottleParseError::UnterminatedString(0)));
    }

    #[test]
    fn test_find_flat_option() {
        let b = parse_bottle("robot icub type left").unwrap();
        assert_eq!(find_option(&b, "type"), Some(Value::Str("left".into())));
        assert_eq!(find_option(&b, "left"), None);
    }

    #[test]
    fn test_json_form() {
        let b = parse_bottle("set rest_weights (1 0 2.5)").unwrap();
        let json = serde_json::to_string(&b).unwrap();
        assert_eq!(json, r#"["set","rest_weights",[1,0,2.5]]"#);

        let back: Vec<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn test_integer_view() {
        assert_eq!(Value::Int(3).as_i64(), Some(3));
        assert_eq!(Value::Double(4.0).as_i64(), Some(4));
        assert_eq!(Value::Double(3.7).as_i64(), None);
        assert_eq!(Value::Double(f64::NAN).as_i64(), None);
        assert_eq!(Value::from("3").as_i64(), None);
    }

    #[test]
    fn test_display() {
        let b = vec![
            Value::from("ack"),
            Value::vector_option("x", &[1.0, -0.25]),
            Value::from("two words"),
        ];
        assert_eq!(format_bottle(&b), "ack (x (1.0 -0.25)) \"two words\"");
    }
}
