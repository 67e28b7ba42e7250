//! Template tokenizer
//!
//! Splits template text into literal text, `{{ output }}` tags and
//! `{% block %}` tags. `{# comments #}` are dropped here. A block or comment
//! tag that is the only thing on its line takes the whole line with it,
//! newline included.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Text(String),
    Output { body: String, line: usize },
    Block { body: String, line: usize },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Output,
    Block,
    Comment,
}

impl TagKind {
    fn close(&self) -> &'static str {
        match self {
            TagKind::Output => "}}",
            TagKind::Block => "%}",
            TagKind::Comment => "#}",
        }
    }
}

pub fn tokenize(template: &str, source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut rest = source;
    let mut line = 1;
    // whether `text` began at the start of a line
    let mut line_start = true;

    while let Some((start, kind)) = next_tag(rest) {
        text.push_str(&rest[..start]);
        line += rest[..start].matches('\n').count();
        let tag_line = line;

        let after_open = &rest[start + 2..];
        let close = after_open.find(kind.close()).ok_or_else(|| Error::TemplateSyntax {
            template: template.to_string(),
            line: tag_line,
            message: format!("unterminated tag, expected '{}'", kind.close()),
        })?;
        let body = after_open[..close].trim().to_string();
        line += after_open[..close].matches('\n').count();
        rest = &after_open[close + 2..];

        let removes_line = kind != TagKind::Output && standalone(&text, rest, line_start);
        if removes_line {
            trim_line_tail(&mut text);
            rest = match rest.find('\n') {
                Some(nl) => {
                    line += 1;
                    &rest[nl + 1..]
                }
                None => "",
            };
        }

        match kind {
            TagKind::Comment => {}
            TagKind::Output | TagKind::Block => {
                if !text.is_empty() {
                    tokens.push(Token::Text(std::mem::take(&mut text)));
                }
                if body.is_empty() {
                    return Err(Error::TemplateSyntax {
                        template: template.to_string(),
                        line: tag_line,
                        message: "empty tag".to_string(),
                    });
                }
                line_start = removes_line;
                tokens.push(if kind == TagKind::Output {
                    Token::Output {
                        body,
                        line: tag_line,
                    }
                } else {
                    Token::Block {
                        body,
                        line: tag_line,
                    }
                });
            }
        }
    }

    text.push_str(rest);
    if !text.is_empty() {
        tokens.push(Token::Text(text));
    }
    Ok(tokens)
}

fn next_tag(s: &str) -> Option<(usize, TagKind)> {
    let bytes = s.as_bytes();
    (0..bytes.len().saturating_sub(1)).find_map(|i| {
        if bytes[i] != b'{' {
            return None;
        }
        match bytes[i + 1] {
            b'{' => Some((i, TagKind::Output)),
            b'%' => Some((i, TagKind::Block)),
            b'#' => Some((i, TagKind::Comment)),
            _ => None,
        }
    })
}

/// The tag is alone on its line: only spaces/tabs between the previous
/// newline and the tag, and between the tag and the next newline.
fn standalone(before: &str, after: &str, line_start: bool) -> bool {
    let line_head = match before.rfind('\n') {
        Some(nl) => &before[nl + 1..],
        None if line_start => before,
        None => return false,
    };
    let line_tail = match after.find('\n') {
        Some(nl) => &after[..nl],
        None => after,
    };
    is_blank(line_head) && is_blank(line_tail.trim_end_matches('\r'))
}

fn is_blank(s: &str) -> bool {
    s.chars().all(|c| c == ' ' || c == '\t')
}

fn trim_line_tail(text: &mut String) {
    let keep = text.trim_end_matches([' ', '\t']).len();
    text.truncate(keep);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text() {
        let tokens = tokenize("t", "Resources: {}\n").unwrap();
        assert_eq!(tokens, vec![Token::Text("Resources: {}\n".into())]);
    }

    #[test]
    fn test_inline_tags() {
        let tokens = tokenize("t", "Name: {{ stackName }}-{% if x %}a{% endif %}").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Text("Name: ".into()),
                Token::Output {
                    body: "stackName".into(),
                    line: 1
                },
                Token::Text("-".into()),
                Token::Block {
                    body: "if x".into(),
                    line: 1
                },
                Token::Text("a".into()),
                Token::Block {
                    body: "endif".into(),
                    line: 1
                },
            ]
        );
    }

    #[test]
    fn test_standalone_block_lines_removed() {
        let source = "a:\n  {% if x %}\n  b: 1\n  {% endif %}\nc: 2\n";
        let tokens = tokenize("t", source).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Text("a:\n".into()),
                Token::Block {
                    body: "if x".into(),
                    line: 2
                },
                Token::Text("  b: 1\n".into()),
                Token::Block {
                    body: "endif".into(),
                    line: 4
                },
                Token::Text("c: 2\n".into()),
            ]
        );
    }

    #[test]
    fn test_comments_dropped() {
        let tokens = tokenize("t", "{# header #}\nkey: {# inline #}value\n").unwrap();
        assert_eq!(tokens, vec![Token::Text("key: value\n".into())]);
    }

    #[test]
    fn test_unterminated_tag_reports_line() {
        let err = tokenize("tpl.yml", "a\nb {{ open\n").unwrap_err();
        match err {
            Error::TemplateSyntax { line, template, .. } => {
                assert_eq!(line, 2);
                assert_eq!(template, "tpl.yml");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_block_after_output_on_same_line_is_kept_inline() {
        let tokens = tokenize("t", "{{ a }} {% if b %}\nx{% endif %}").unwrap();
        assert_eq!(tokens[1], Token::Text(" ".into()));
        assert_eq!(tokens[3], Token::Text("\nx".into()));
    }

    #[test]
    fn test_single_brace_is_text() {
        let tokens = tokenize("t", "{\"a\": 1}").unwrap();
        assert_eq!(tokens, vec![Token::Text("{\"a\": 1}".into())]);
    }

    #[test]
    fn test_line_numbers_advance_past_removed_lines() {
        let tokens = tokenize("t", "{% if a %}\nx\n{% endif %}\n{{ y }}").unwrap();
        assert!(tokens.contains(&Token::Output {
            body: "y".into(),
            line: 4
        }));
    }
}
