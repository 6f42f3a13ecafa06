//! Compact text grammar used when a backend lacks native structured
//! serialization.
//!
//! | Value                  | Form                      |
//! |------------------------|---------------------------|
//! | number / bool / null   | `:value`                  |
//! | string                 | `=escaped-text`           |
//! | array                  | `@item&item&...;`         |
//! | object                 | `_key=text&key:1&...;`    |
//!
//! Inside strings and keys, the delimiters `= : & @ _ ; /` are escaped with a
//! leading `/`. Trailing `;` terminators are trimmed from the whole payload,
//! which is then percent-encoded with [`encode_uri`]. A dangling `/` at the
//! very end of the payload stands for an escaped `;` whose terminator was
//! trimmed.

use serde_json::{Map, Number, Value};

use crate::error::{CodecError, CodecResult};
use crate::percent::{decode_uri, encode_uri};

/// Returns `true` for the characters that end a token.
fn is_delimiter(c: char) -> bool {
    matches!(c, '=' | ':' | '&' | '@' | '_' | ';')
}

fn push_escaped(text: &str, out: &mut String) {
    for c in text.chars() {
        if is_delimiter(c) || c == '/' {
            out.push('/');
        }
        out.push(c);
    }
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str(":null"),
        Value::Bool(b) => {
            out.push(':');
            out.push_str(if *b { "true" } else { "false" });
        }
        Value::Number(n) => {
            out.push(':');
            out.push_str(&n.to_string());
        }
        Value::String(s) => {
            out.push('=');
            push_escaped(s, out);
        }
        Value::Array(items) => {
            out.push('@');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push('&');
                }
                write_value(item, out);
            }
            out.push(';');
        }
        Value::Object(map) => {
            out.push('_');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push('&');
                }
                push_escaped(key, out);
                write_value(item, out);
            }
            out.push(';');
        }
    }
}

/// Serializes a value into the compact grammar.
#[must_use]
pub fn stringify(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    encode_uri(out.trim_end_matches(';'))
}

/// Parses a payload produced by [`stringify`].
///
/// # Errors
///
/// Returns a [`CodecError`] if the payload is not valid percent-encoding or
/// does not follow the grammar.
pub fn parse(payload: &str) -> CodecResult<Value> {
    let decoded = decode_uri(payload)?;
    let mut parser = Parser {
        chars: decoded.chars().collect(),
        pos: 0,
    };
    let value = parser.parse_value()?;
    if let Some(&found) = parser.chars.get(parser.pos) {
        // Only trailing terminators may follow the top-level value.
        if parser.chars[parser.pos..].iter().any(|&c| c != ';') {
            return Err(CodecError::UnexpectedChar {
                pos: parser.pos,
                found,
            });
        }
    }
    Ok(value)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn at_end_of_container(&self) -> bool {
        matches!(self.peek(), None | Some(';'))
    }

    fn read_token(&mut self) -> String {
        let mut token = String::new();
        while let Some(c) = self.peek() {
            if c == '/' {
                self.pos += 1;
                match self.peek() {
                    Some(escaped) => token.push(escaped),
                    None => {
                        token.push(';');
                        break;
                    }
                }
            } else if is_delimiter(c) {
                break;
            } else {
                token.push(c);
            }
            self.pos += 1;
        }
        token
    }

    fn parse_value(&mut self) -> CodecResult<Value> {
        let Some(kind) = self.peek() else {
            return Err(CodecError::UnexpectedEnd { pos: self.pos });
        };
        self.pos += 1;
        match kind {
            '=' => Ok(Value::String(self.read_token())),
            ':' => Ok(scalar(&self.read_token())),
            '@' => {
                let mut items = Vec::new();
                if !self.at_end_of_container() {
                    loop {
                        items.push(self.parse_value()?);
                        if self.at_end_of_container() {
                            break;
                        }
                        self.expect_separator()?;
                    }
                }
                self.pos += 1;
                Ok(Value::Array(items))
            }
            '_' => {
                let mut map = Map::new();
                if !self.at_end_of_container() {
                    loop {
                        let key = self.read_token();
                        let item = self.parse_value()?;
                        map.insert(key, item);
                        if self.at_end_of_container() {
                            break;
                        }
                        self.expect_separator()?;
                    }
                }
                self.pos += 1;
                Ok(Value::Object(map))
            }
            found => Err(CodecError::UnexpectedChar {
                pos: self.pos - 1,
                found,
            }),
        }
    }

    fn expect_separator(&mut self) -> CodecResult<()> {
        match self.peek() {
            Some('&') => {
                self.pos += 1;
                Ok(())
            }
            Some(found) => Err(CodecError::UnexpectedChar {
                pos: self.pos,
                found,
            }),
            None => Err(CodecError::UnexpectedEnd { pos: self.pos }),
        }
    }
}

/// Decodes the payload of a `:` token. Unparseable numbers become `null`.
fn scalar(token: &str) -> Value {
    match token {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(int) = token.parse::<i64>() {
                Value::from(int)
            } else if let Ok(uint) = token.parse::<u64>() {
                Value::from(uint)
            } else {
                token
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map_or(Value::Null, Value::Number)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn scalars_use_colon_form() {
        assert_eq!(stringify(&json!(1)), ":1");
        assert_eq!(stringify(&json!(true)), ":true");
        assert_eq!(stringify(&json!(null)), ":null");
        assert_eq!(stringify(&json!(-2.5)), ":-2.5");
    }

    #[test]
    fn containers_drop_trailing_terminators() {
        assert_eq!(stringify(&json!([1, 2, [3]])), "@:1&:2&@:3");
        assert_eq!(stringify(&json!({"a": 1, "b": "x"})), "_a:1&b=x");
        assert_eq!(stringify(&json!([])), "@");
        assert_eq!(stringify(&json!({})), "_");
    }

    #[test]
    fn delimiters_inside_strings_are_escaped() {
        assert_eq!(stringify(&json!("a=b&c")), "=a/=b/&c");
        assert_eq!(stringify(&json!("x/y")), "=x//y");
    }

    #[test]
    fn escaped_terminator_survives_trimming() {
        let encoded = stringify(&json!("a;"));
        assert_eq!(encoded, "=a/");
        assert_eq!(parse(&encoded).unwrap(), json!("a;"));

        let nested = json!({"k": ["x;;"]});
        assert_eq!(parse(&stringify(&nested)).unwrap(), nested);
    }

    #[test]
    fn nested_structures_parse_back() {
        let value = json!({
            "name": "disk store",
            "tags": ["a", "", "_b"],
            "inner": {"empty": {}, "list": [], "n": 0, "f": false, "z": null},
            "": 3
        });
        assert_eq!(parse(&stringify(&value)).unwrap(), value);
    }

    #[test]
    fn unparseable_numbers_become_null() {
        assert_eq!(parse(":NaN").unwrap(), Value::Null);
        assert_eq!(parse(":").unwrap(), Value::Null);
    }

    #[test]
    fn large_and_fractional_numbers_keep_their_kind() {
        assert_eq!(parse(":18446744073709551615").unwrap(), json!(u64::MAX));
        assert_eq!(parse(":3.0").unwrap(), json!(3.0));
        assert_eq!(parse(":-7").unwrap(), json!(-7));
    }

    #[test]
    fn unknown_type_marker_is_rejected() {
        assert!(matches!(
            parse("!x"),
            Err(CodecError::UnexpectedChar { pos: 0, found: '!' })
        ));
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert!(matches!(parse(""), Err(CodecError::UnexpectedEnd { pos: 0 })));
    }

    #[test]
    fn missing_separator_is_rejected() {
        assert!(matches!(
            parse("@:1=a"),
            Err(CodecError::UnexpectedChar { found: '=', .. })
        ));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(parse("=a;;").is_ok());
        assert!(matches!(
            parse("@:1;=x"),
            Err(CodecError::UnexpectedChar { found: '=', .. })
        ));
    }
}
