//! Path utilities for shell-like path expansion.

use std::path::PathBuf;

/// Expands a leading `~` to the user's home directory.
///
/// Absolute and relative paths are returned unchanged; blank input yields an
/// empty path.
#[must_use]
pub fn expand(path: &str) -> PathBuf {
    let path = path.trim();

    if path.is_empty() {
        return PathBuf::new();
    }

    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Quotes a value for a POSIX shell word using double quotes.
///
/// `"`, `\`, `$` and `` ` `` are escaped so the shell passes the value
/// through literally.
#[must_use]
pub fn double_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        if matches!(ch, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_empty_and_whitespace() {
        assert_eq!(expand(""), PathBuf::new());
        assert_eq!(expand("   "), PathBuf::new());
    }

    #[test]
    fn test_expand_absolute_path() {
        assert_eq!(expand("/opt/renderer"), PathBuf::from("/opt/renderer"));
    }

    #[test]
    fn test_expand_tilde_path() {
        let result = expand("~/wallpapers/1234");
        assert!(!result.to_string_lossy().starts_with('~'));
        assert!(result.to_string_lossy().ends_with("wallpapers/1234"));
    }

    #[test]
    fn test_double_quote_plain() {
        assert_eq!(double_quote("/home/me/Screen Shots/a.png"), "\"/home/me/Screen Shots/a.png\"");
    }

    #[test]
    fn test_double_quote_escapes_shell_specials() {
        assert_eq!(double_quote(r#"a"b"#), r#""a\"b""#);
        assert_eq!(double_quote("$HOME"), "\"\\$HOME\"");
        assert_eq!(double_quote("`id`"), "\"\\`id\\`\"");
        assert_eq!(double_quote(r"c:\x"), r#""c:\\x""#);
    }
}
