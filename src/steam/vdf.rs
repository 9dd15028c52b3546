//! Hand-rolled VDF (Valve Data Format) parser
//!
//! Enough of the text format to read `config/loginusers.vdf`.

use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

/// A VDF value - either a string or a nested object
#[derive(Debug, Clone)]
pub enum VdfValue {
    String(String),
    Object(HashMap<String, VdfValue>),
}

impl VdfValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            VdfValue::String(s) => Some(s),
            VdfValue::Object(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&HashMap<String, VdfValue>> {
        match self {
            VdfValue::String(_) => None,
            VdfValue::Object(o) => Some(o),
        }
    }

    /// Get a nested value by key
    pub fn get(&self, key: &str) -> Option<&VdfValue> {
        self.as_object()?.get(key)
    }

    /// Get a string value by key
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }
}

/// Parse VDF text into a root object
pub fn parse_vdf(content: &str) -> Option<VdfValue> {
    let mut cursor = Cursor {
        chars: content.chars().peekable(),
    };
    cursor.object(false)
}

struct Cursor<'a> {
    chars: Peekable<Chars<'a>>,
}

impl Cursor<'_> {
    /// Entries up to the matching `}` (nested) or end of input (top level).
    fn object(&mut self, nested: bool) -> Option<VdfValue> {
        let mut entries = HashMap::new();
        loop {
            self.skip_blank();
            match self.chars.next() {
                None if nested => return None,
                None => break,
                Some('}') if nested => break,
                Some('"') => {
                    let key = self.quoted()?;
                    self.skip_blank();
                    let value = match self.chars.next()? {
                        '"' => VdfValue::String(self.quoted()?),
                        '{' => self.object(true)?,
                        _ => return None,
                    };
                    entries.insert(key, value);
                }
                // unquoted tokens (conditionals) are not used by Steam's config files
                Some(_) => {}
            }
        }
        Some(VdfValue::Object(entries))
    }

    /// Rest of a quoted string, the opening quote already consumed.
    fn quoted(&mut self) -> Option<String> {
        let mut text = String::new();
        loop {
            let c = self.chars.next()?;
            match c {
                '"' => return Some(text),
                '\\' => {
                    let escaped = self.chars.next()?;
                    match escaped {
                        'n' => text.push('\n'),
                        't' => text.push('\t'),
                        '\\' | '"' => text.push(escaped),
                        other => {
                            text.push('\\');
                            text.push(other);
                        }
                    }
                }
                _ => text.push(c),
            }
        }
    }

    /// Whitespace and `//` line comments.
    fn skip_blank(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
            } else if c == '/' {
                self.chars.next();
                while self.chars.next_if(|&c| c != '\n').is_some() {}
            } else {
                break;
            }
        }
    }
}

/// One entry of `loginusers.vdf`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginUser {
    pub account_name: String,
    pub remember_password: bool,
    pub most_recent: bool,
}

/// Parse `loginusers.vdf` content into its users
pub fn parse_login_users(content: &str) -> Vec<LoginUser> {
    let Some(root) = parse_vdf(content) else {
        return Vec::new();
    };
    let Some(users) = root.get("users").and_then(|v| v.as_object()) else {
        return Vec::new();
    };

    let flag = |info: &VdfValue, key: &str| info.get_str(key) == Some("1");

    users
        .values()
        .filter_map(|info| {
            Some(LoginUser {
                account_name: info.get_str("AccountName")?.to_string(),
                remember_password: flag(info, "RememberPassword"),
                // older clients write "mostrecent"
                most_recent: flag(info, "MostRecent") || flag(info, "mostrecent"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGINUSERS: &str = r#"
"users"
{
    "76561198000000001"
    {
        "AccountName"       "trucker"
        "PersonaName"       "Trucker"
        "RememberPassword"  "1"
        "MostRecent"        "1"
        "Timestamp"         "1600000000"
    }
    "76561198000000002"
    {
        "AccountName"       "other"
        "RememberPassword"  "0"
        "mostrecent"        "0"
    }
}
"#;

    #[test]
    fn test_parse_login_users() {
        let mut users = parse_login_users(LOGINUSERS);
        users.sort_by(|a, b| a.account_name.cmp(&b.account_name));
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].account_name, "other");
        assert!(!users[0].most_recent);
        assert_eq!(
            users[1],
            LoginUser {
                account_name: "trucker".to_string(),
                remember_password: true,
                most_recent: true,
            }
        );
    }

    #[test]
    fn test_parse_escapes_and_comments() {
        let root = parse_vdf("// comment\n\"a\" { \"b\" \"x\\\"y\" }").unwrap();
        assert_eq!(root.get("a").and_then(|a| a.get_str("b")), Some("x\"y"));
    }

    #[test]
    fn test_unterminated_input() {
        assert!(parse_vdf("\"users\" { \"broken").is_none());
        assert!(parse_login_users("\"users\" { \"broken").is_empty());
    }
}
