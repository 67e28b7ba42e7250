//! dotenv-style env file parsing

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Parse `KEY=value` lines. Supports `export` prefixes, `#` comments,
/// and single or double quoted values (double quotes honor `\n`, `\"`, `\\`).
pub fn parse_env_file(source_name: &str, content: &str) -> Result<BTreeMap<String, String>> {
    let mut vars = BTreeMap::new();

    for (index, raw_line) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

        let (key, value) = line.split_once('=').ok_or_else(|| {
            Error::config(source_name, format!("line {}: expected KEY=value", line_no))
        })?;
        let key = key.trim();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::config(
                source_name,
                format!("line {}: invalid variable name '{}'", line_no, key),
            ));
        }

        let value = parse_value(value.trim()).ok_or_else(|| {
            Error::config(source_name, format!("line {}: unterminated quote", line_no))
        })?;
        vars.insert(key.to_string(), value);
    }

    Ok(vars)
}

fn parse_value(value: &str) -> Option<String> {
    if let Some(rest) = value.strip_prefix('"') {
        let mut out = String::new();
        let mut chars = rest.chars();
        while let Some(c) = chars.next() {
            match c {
                '"' => return Some(out),
                '\\' => match chars.next()? {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    other => out.push(other),
                },
                c => out.push(c),
            }
        }
        return None;
    }
    if let Some(rest) = value.strip_prefix('\'') {
        return rest.find('\'').map(|end| rest[..end].to_string());
    }
    // Unquoted: an inline comment starts at " #"
    let unquoted = match value.find(" #") {
        Some(pos) => &value[..pos],
        None => value,
    };
    Some(unquoted.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_lines() {
        let vars = parse_env_file(
            ".env",
            "# comment\n\nAPI_KEY=abc123\nexport REGION=us-west-2\nEMPTY=\n",
        )
        .unwrap();
        assert_eq!(vars["API_KEY"], "abc123");
        assert_eq!(vars["REGION"], "us-west-2");
        assert_eq!(vars["EMPTY"], "");
    }

    #[test]
    fn test_quoted_values() {
        let vars = parse_env_file(
            ".env",
            "A=\"line1\\nline2\"\nB='raw \\n # kept'\nC=value # trailing comment\nD=\"has = sign\"",
        )
        .unwrap();
        assert_eq!(vars["A"], "line1\nline2");
        assert_eq!(vars["B"], "raw \\n # kept");
        assert_eq!(vars["C"], "value");
        assert_eq!(vars["D"], "has = sign");
    }

    #[test]
    fn test_malformed_lines_report_line_number() {
        let err = parse_env_file(".env", "OK=1\nnot a pair\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let err = parse_env_file(".env", "BAD-NAME=1").unwrap_err();
        assert!(err.to_string().contains("invalid variable name"));

        let err = parse_env_file(".env", "Q=\"open").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }
}
