//! Jail records.
//!
//! A jail is persisted as one jail.conf(5) block in `<config dir>/<name>.conf`:
//!
//! ```text
//! www {
//!     exec.start = "/bin/sh /etc/rc";
//!     mount.devfs;
//! }
//! ```
//!
//! Parameters with an empty value are written as bare flags.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::distribution::parse_base_image_leaf;
use crate::error::{JailError, Result};
use crate::parameter::JailParameter;

/// A named, configured jail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jail {
    pub name: String,
    #[serde(default)]
    pub options: BTreeMap<JailParameter, String>,
}

impl Jail {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: BTreeMap::new(),
        }
    }

    pub fn with_option(mut self, parameter: JailParameter, value: impl Into<String>) -> Self {
        self.options.insert(parameter, value.into());
        self
    }

    /// Check that `name` can be used as a dataset leaf and a file stem.
    pub fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(JailError::Parse("jail name must not be empty".to_string()));
        }
        if let Some(c) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(JailError::Parse(format!(
                "invalid character '{}' in jail name '{}'",
                c, name
            )));
        }
        if name.starts_with('.') || parse_base_image_leaf(name).is_ok() {
            return Err(JailError::Parse(format!(
                "'{}' cannot be used as a jail name",
                name
            )));
        }
        Ok(())
    }

    /// Render as a jail.conf block.
    pub fn to_config(&self) -> String {
        let mut out = format!("{} {{\n", self.name);
        for (parameter, value) in &self.options {
            if value.is_empty() {
                out.push_str(&format!("    {};\n", parameter));
            } else {
                out.push_str(&format!("    {} = \"{}\";\n", parameter, escape(value)));
            }
        }
        out.push_str("}\n");
        out
    }

    /// Parse a single jail.conf block.
    pub fn from_config(text: &str) -> Result<Self> {
        let tokens = tokenize(text)?;
        let mut tokens = tokens.into_iter();

        let name = match tokens.next() {
            Some(Token::Word(name)) => name,
            other => return Err(unexpected(other, "jail name")),
        };
        Self::validate_name(&name)?;
        match tokens.next() {
            Some(Token::Open) => {}
            other => return Err(unexpected(other, "'{'")),
        }

        let mut jail = Jail::new(name);
        loop {
            let key = match tokens.next() {
                Some(Token::Close) => break,
                Some(Token::Word(key)) => key,
                other => return Err(unexpected(other, "parameter or '}'")),
            };
            let parameter: JailParameter = key.parse()?;

            let value = match tokens.next() {
                Some(Token::Semicolon) => String::new(),
                Some(Token::Equals) => {
                    let value = match tokens.next() {
                        Some(Token::Word(value)) | Some(Token::Quoted(value)) => value,
                        other => return Err(unexpected(other, "parameter value")),
                    };
                    match tokens.next() {
                        Some(Token::Semicolon) => value,
                        other => return Err(unexpected(other, "';'")),
                    }
                }
                other => return Err(unexpected(other, "'=' or ';'")),
            };
            jail.options.insert(parameter, value);
        }

        if let Some(extra) = tokens.next() {
            return Err(unexpected(Some(extra), "end of file"));
        }
        Ok(jail)
    }

    /// Write the record atomically (tmp file, then rename).
    pub fn write_config_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("conf.tmp");
        std::fs::write(&tmp_path, self.to_config())?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn read_config_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                JailError::NotFound(format!("jail config {}", path.display()))
            } else {
                JailError::Io(e)
            }
        })?;
        Self::from_config(&text)
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Open,
    Close,
    Equals,
    Semicolon,
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                while let Some(c) = chars.next() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '{' | '}' | '=' | ';' => {
                chars.next();
                tokens.push(match c {
                    '{' => Token::Open,
                    '}' => Token::Close,
                    '=' => Token::Equals,
                    _ => Token::Semicolon,
                });
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => value.push('\n'),
                            Some(escaped) => value.push(escaped),
                            None => {
                                return Err(JailError::Parse(
                                    "unterminated escape in jail config".to_string(),
                                ))
                            }
                        },
                        Some(c) => value.push(c),
                        None => {
                            return Err(JailError::Parse(
                                "unterminated string in jail config".to_string(),
                            ))
                        }
                    }
                }
                tokens.push(Token::Quoted(value));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '{' | '}' | '=' | ';' | '"' | '#') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }

    Ok(tokens)
}

fn unexpected(token: Option<Token>, expected: &str) -> JailError {
    match token {
        Some(token) => JailError::Parse(format!(
            "malformed jail config: expected {}, found {:?}",
            expected, token
        )),
        None => JailError::Parse(format!(
            "malformed jail config: expected {}, found end of file",
            expected
        )),
    }
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_to_config_renders_flags_and_values() {
        let jail = Jail::new("www")
            .with_option(JailParameter::ExecStart, "/bin/sh /etc/rc")
            .with_option(JailParameter::MountDevfs, "");
        assert_eq!(
            jail.to_config(),
            "www {\n    exec.start = \"/bin/sh /etc/rc\";\n    mount.devfs;\n}\n"
        );
    }

    #[test]
    fn test_config_round_trip_with_escapes() {
        let jail = Jail::new("db-1")
            .with_option(JailParameter::ExecStart, "echo \"hi\" \\ there")
            .with_option(JailParameter::Ip4Addr, "10.0.0.2")
            .with_option(JailParameter::Persist, "");
        let parsed = Jail::from_config(&jail.to_config()).unwrap();
        assert_eq!(parsed, jail);
    }

    #[test]
    fn test_from_config_accepts_comments_and_bare_values() {
        let text = "# managed by jmanager\nweb {\n  securelevel = 3; # strict\n  persist;\n}\n";
        let jail = Jail::from_config(text).unwrap();
        assert_eq!(jail.name, "web");
        assert_eq!(jail.options[&JailParameter::Securelevel], "3");
        assert_eq!(jail.options[&JailParameter::Persist], "");
    }

    #[test]
    fn test_from_config_rejects_unknown_parameter() {
        let err = Jail::from_config("web {\n  allow.everything;\n}\n").unwrap_err();
        assert!(matches!(err, JailError::Parse(_)));
    }

    #[test]
    fn test_from_config_rejects_malformed_blocks() {
        for text in [
            "",
            "web",
            "web {",
            "web { persist }",
            "web { securelevel = ; }",
            "web { securelevel = \"3 }",
            "web { persist; } other { }",
        ] {
            let err = Jail::from_config(text).unwrap_err();
            assert!(matches!(err, JailError::Parse(_)), "{text}");
        }
    }

    #[test]
    fn test_validate_name() {
        assert!(Jail::validate_name("test_no_options").is_ok());
        assert!(Jail::validate_name("web-01.example").is_ok());
        assert!(Jail::validate_name("").is_err());
        assert!(Jail::validate_name("a/b").is_err());
        assert!(Jail::validate_name("a@b").is_err());
        assert!(Jail::validate_name(".hidden").is_err());
        assert!(Jail::validate_name("12.0-RELEASE_amd64").is_err());
    }

    #[test]
    fn test_write_and_read_config_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("conf").join("www.conf");
        let jail = Jail::new("www").with_option(JailParameter::Hostname, "www");

        jail.write_config_file(&path).unwrap();
        assert!(!path.with_extension("conf.tmp").exists());
        assert_eq!(Jail::read_config_file(&path).unwrap(), jail);
    }

    #[test]
    fn test_read_missing_config_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = Jail::read_config_file(&tmp.path().join("nope.conf")).unwrap_err();
        assert!(matches!(err, JailError::NotFound(_)));
    }
}
