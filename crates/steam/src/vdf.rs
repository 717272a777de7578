//! Text KeyValues ("VDF") parser for libraryfolders.vdf, loginusers.vdf and
//! appmanifest_*.acf.

use std::fs;
use std::path::Path;

use crate::SteamError;

/// A node in a parsed KeyValues document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VdfNode {
    Str(String),
    /// Ordered children; duplicate keys are kept.
    Map(Vec<(String, VdfNode)>),
}

impl VdfNode {
    /// Returns the first child with `key`, compared case-insensitively.
    pub fn get(&self, key: &str) -> Option<&VdfNode> {
        match self {
            VdfNode::Map(entries) => entries
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v),
            VdfNode::Str(_) => None,
        }
    }

    /// Returns the string value of child `key`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(VdfNode::as_str)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            VdfNode::Str(s) => Some(s),
            VdfNode::Map(_) => None,
        }
    }

    /// Iterates over child entries (empty for strings).
    pub fn entries(&self) -> impl Iterator<Item = (&str, &VdfNode)> {
        let slice: &[(String, VdfNode)] = match self {
            VdfNode::Map(entries) => entries,
            VdfNode::Str(_) => &[],
        };
        slice.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Reads and parses a text VDF file.
pub fn load_vdf(path: &Path) -> Result<VdfNode, SteamError> {
    let text = fs::read_to_string(path)
        .map_err(|e| SteamError::Io(format!("failed to read {}: {e}", path.display())))?;
    parse_vdf(&text)
}

/// Parses a text VDF document into a root map.
pub fn parse_vdf(text: &str) -> Result<VdfNode, SteamError> {
    let mut lexer = Lexer::new(text);
    let entries = parse_entries(&mut lexer, false)?;
    Ok(VdfNode::Map(entries))
}

#[derive(Debug, PartialEq)]
enum Token {
    Str(String),
    Open,
    Close,
}

fn parse_entries(lexer: &mut Lexer<'_>, nested: bool) -> Result<Vec<(String, VdfNode)>, SteamError> {
    let mut entries = Vec::new();

    loop {
        let key = match lexer.next_token()? {
            Some(Token::Str(key)) => key,
            Some(Token::Close) if nested => return Ok(entries),
            Some(Token::Close) => {
                return Err(SteamError::Vdf(format!(
                    "unexpected '}}' at line {}",
                    lexer.line
                )));
            }
            Some(Token::Open) => {
                return Err(SteamError::Vdf(format!(
                    "expected key, found '{{' at line {}",
                    lexer.line
                )));
            }
            None if nested => {
                return Err(SteamError::Vdf("unexpected end of input inside block".into()));
            }
            None => return Ok(entries),
        };

        let value = match lexer.next_token()? {
            Some(Token::Str(value)) => VdfNode::Str(value),
            Some(Token::Open) => VdfNode::Map(parse_entries(lexer, true)?),
            Some(Token::Close) | None => {
                return Err(SteamError::Vdf(format!(
                    "missing value for key '{key}' at line {}",
                    lexer.line
                )));
            }
        };

        lexer.skip_conditional();
        entries.push((key, value));
    }
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || c == '\u{feff}' {
                self.bump();
            } else if c == '/' {
                // `//` comment to end of line; a lone slash is left for the
                // token reader.
                let mut ahead = self.chars.clone();
                ahead.next();
                if ahead.peek() != Some(&'/') {
                    break;
                }
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    /// Skips a platform conditional such as `[$WIN32]` after a value.
    fn skip_conditional(&mut self) {
        // Only look on the same line.
        while let Some(&c) = self.chars.peek() {
            if c == ' ' || c == '\t' {
                self.bump();
            } else {
                break;
            }
        }
        if self.chars.peek() == Some(&'[') {
            while let Some(c) = self.bump() {
                if c == ']' {
                    break;
                }
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, SteamError> {
        self.skip_trivia();
        let Some(&c) = self.chars.peek() else {
            return Ok(None);
        };

        match c {
            '{' => {
                self.bump();
                Ok(Some(Token::Open))
            }
            '}' => {
                self.bump();
                Ok(Some(Token::Close))
            }
            '"' => {
                self.bump();
                self.quoted().map(|s| Some(Token::Str(s)))
            }
            _ => Ok(Some(Token::Str(self.bare()))),
        }
    }

    fn quoted(&mut self) -> Result<String, SteamError> {
        let start = self.line;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => break,
                },
                Some(c) => out.push(c),
                None => break,
            }
        }
        Err(SteamError::Vdf(format!(
            "unterminated string starting at line {start}"
        )))
    }

    fn bare(&mut self) -> String {
        let mut out = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || c == '{' || c == '}' || c == '"' {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIBRARY_FOLDERS: &str = r#"
"libraryfolders"
{
	"0"
	{
		"path"		"/home/deck/.local/share/Steam"
		"label"		""
		"apps"
		{
			"228980"		"29212173"
			"1145360"		"14474064187"
		}
	}
	"1"
	{
		"path"		"/run/media/mmcblk0p1"
		"apps"
		{
			"1091500"		"70000000000"
		}
	}
}
"#;

    #[test]
    fn parses_nested_blocks() {
        let root = parse_vdf(LIBRARY_FOLDERS).unwrap();
        let folders = root.get("libraryfolders").unwrap();
        let first = folders.get("0").unwrap();
        assert_eq!(first.get_str("path"), Some("/home/deck/.local/share/Steam"));
        assert_eq!(first.get_str("label"), Some(""));

        let apps: Vec<&str> = first.get("apps").unwrap().entries().map(|(k, _)| k).collect();
        assert_eq!(apps, vec!["228980", "1145360"]);

        assert_eq!(
            folders.get("1").and_then(|f| f.get_str("path")),
            Some("/run/media/mmcblk0p1")
        );
    }

    #[test]
    fn keys_are_case_insensitive() {
        let root = parse_vdf(r#""AppState" { "appid" "570" "Name" "Dota 2" }"#).unwrap();
        let state = root.get("appstate").unwrap();
        assert_eq!(state.get_str("AppID"), Some("570"));
        assert_eq!(state.get_str("name"), Some("Dota 2"));
    }

    #[test]
    fn handles_comments_escapes_and_conditionals() {
        let text = r#"
// header comment
"root"
{
	"path"	"C:\\Games\\Steam"	[$WIN32]
	"quote"	"say \"hi\""
	bare	value // trailing
}
"#;
        let root = parse_vdf(text).unwrap();
        let node = root.get("root").unwrap();
        assert_eq!(node.get_str("path"), Some("C:\\Games\\Steam"));
        assert_eq!(node.get_str("quote"), Some("say \"hi\""));
        assert_eq!(node.get_str("bare"), Some("value"));
    }

    #[test]
    fn rejects_unbalanced_input() {
        assert!(matches!(
            parse_vdf(r#""root" { "a" "b" "#),
            Err(SteamError::Vdf(_))
        ));
        assert!(matches!(parse_vdf("}"), Err(SteamError::Vdf(_))));
        assert!(matches!(parse_vdf(r#""key""#), Err(SteamError::Vdf(_))));
        assert!(matches!(
            parse_vdf(r#""key" "unterminated"#),
            Err(SteamError::Vdf(_))
        ));
    }

    #[test]
    fn empty_document_is_empty_map() {
        assert_eq!(parse_vdf("").unwrap(), VdfNode::Map(vec![]));
    }
}
