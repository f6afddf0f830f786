//! CLI output formatting utilities.
//!
//! - JSON syntax highlighting for structured output
//! - Small helpers for table cells

use colored::Colorize;

/// Prints JSON with syntax highlighting.
///
/// Keys are cyan, strings green, numbers yellow, booleans and null magenta.
pub fn print_highlighted_json(value: &serde_json::Value) {
    let json = serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string());
    println!("{}", highlight_json(&json));
}

/// Prints compact JSON for scripting.
pub fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string(value).unwrap_or_else(|_| "null".to_string()));
}

/// Returns `json` with ANSI colours applied token by token.
fn highlight_json(json: &str) -> String {
    let mut out = String::with_capacity(json.len() * 2);
    let mut in_string = false;
    let mut is_key = false;
    let mut escape_next = false;
    let mut after_colon = false;
    let mut token = String::new();

    for ch in json.chars() {
        if escape_next {
            token.push(ch);
            escape_next = false;
            continue;
        }

        if ch == '\\' && in_string {
            token.push(ch);
            escape_next = true;
            continue;
        }

        match ch {
            '"' if in_string => {
                token.push(ch);
                let painted = if is_key { token.cyan() } else { token.green() };
                out.push_str(&painted.to_string());
                token.clear();
                in_string = false;
                is_key = false;
            }
            '"' => {
                flush_scalar(&mut out, &mut token, after_colon);
                token.push(ch);
                in_string = true;
                is_key = !after_colon;
                after_colon = false;
            }
            ':' if !in_string => {
                flush_scalar(&mut out, &mut token, false);
                out.push(':');
                after_colon = true;
            }
            ',' if !in_string => {
                flush_scalar(&mut out, &mut token, after_colon);
                out.push(',');
                after_colon = false;
            }
            '{' | '}' | '[' | ']' if !in_string => {
                flush_scalar(&mut out, &mut token, after_colon);
                out.push_str(&ch.to_string().bold().to_string());
                after_colon = false;
            }
            _ => token.push(ch),
        }
    }

    flush_scalar(&mut out, &mut token, after_colon);
    out
}

/// Appends a pending non-string token, colouring literals in value position.
fn flush_scalar(out: &mut String, token: &mut String, is_value: bool) {
    if token.is_empty() {
        return;
    }

    let value = token.trim();
    if !is_value || value.is_empty() {
        out.push_str(token);
        token.clear();
        return;
    }

    let start = token.find(value).unwrap_or(0);
    let (prefix, rest) = token.split_at(start);
    let (value, suffix) = rest.split_at(value.len());

    out.push_str(prefix);
    if matches!(value, "true" | "false" | "null") {
        out.push_str(&value.magenta().to_string());
    } else if value.parse::<f64>().is_ok() {
        out.push_str(&value.yellow().to_string());
    } else {
        out.push_str(value);
    }
    out.push_str(suffix);
    token.clear();
}

/// Truncates a string to `max_chars` characters, ending with an ellipsis when
/// shortened.
#[must_use]
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars <= 1 {
        return "…".to_string();
    }
    let cut = s.char_indices().nth(max_chars - 1).map_or(s.len(), |(idx, _)| idx);
    format!("{}…", &s[..cut])
}

/// Formats a boolean as a coloured check mark.
#[must_use]
pub fn format_bool(value: bool) -> String {
    if value { "✓".green().to_string() } else { "✗".red().to_string() }
}

/// Formats a duration in seconds as `1h 2m 3s`.
#[must_use]
pub fn format_uptime(secs: u64) -> String {
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight_keeps_every_token() {
        let json = "{\n  \"display\": \"DP-1\",\n  \"pid\": 42,\n  \"ok\": true\n}";
        let out = highlight_json(json);
        for token in ["\"display\"", "\"DP-1\"", "42", "true", "{", "}"] {
            assert!(out.contains(token), "missing {token} in {out}");
        }
    }

    #[test]
    fn test_highlight_keeps_escaped_quotes() {
        let out = highlight_json(r#"{"args": "say \"hi\""}"#);
        assert!(out.contains(r#""say \"hi\"""#));
    }

    #[test]
    fn test_truncate_short_string() {
        assert_eq!(truncate("DP-1", 10), "DP-1");
    }

    #[test]
    fn test_truncate_long_string() {
        assert_eq!(truncate("linux-wallpaperengine", 8), "linux-w…");
    }

    #[test]
    fn test_truncate_min_length() {
        assert_eq!(truncate("hello", 1), "…");
    }

    #[test]
    fn test_truncate_multibyte_utf8() {
        let s = "écran über";
        assert_eq!(truncate(s, 4), "écr…");
        assert_eq!(truncate(s, 20), s);
    }

    #[test]
    fn test_format_bool() {
        assert!(format_bool(true).contains('✓'));
        assert!(format_bool(false).contains('✗'));
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(5), "5s");
        assert_eq!(format_uptime(125), "2m 5s");
        assert_eq!(format_uptime(3_725), "1h 2m 5s");
    }
}
