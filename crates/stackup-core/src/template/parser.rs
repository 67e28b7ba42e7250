//! Builds the directive tree from the token stream

use super::lexer::Token;
use crate::config::keypath::KeyPath;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Output(Output),
    If(IfBlock),
    For(ForBlock),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Compact JSON encoding of the value
    Json,
    Upper,
    Lower,
    Trim,
}

impl Filter {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "json" => Some(Self::Json),
            "upper" => Some(Self::Upper),
            "lower" => Some(Self::Lower),
            "trim" => Some(Self::Trim),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub path: KeyPath,
    pub filters: Vec<Filter>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub path: KeyPath,
    pub negated: bool,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfBlock {
    /// `if` and every `elif`, in order
    pub branches: Vec<(Condition, Vec<Node>)>,
    pub otherwise: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForBlock {
    /// First name in `for k, v in ...`
    pub key_var: Option<String>,
    pub value_var: String,
    pub source: KeyPath,
    pub body: Vec<Node>,
    /// Rendered when the collection is empty
    pub otherwise: Vec<Node>,
    pub line: usize,
}

/// Name bound to per-iteration metadata inside `for` blocks
pub const LOOP_VAR: &str = "loop";

pub fn parse(template: &str, tokens: Vec<Token>) -> Result<Vec<Node>> {
    let mut parser = Parser {
        template,
        tokens: tokens.into_iter(),
    };
    let (nodes, end) = parser.parse_until(&[])?;
    match end {
        None => Ok(nodes),
        Some((tag, line)) => Err(parser.error(line, format!("unexpected '{}'", tag))),
    }
}

struct Parser<'a> {
    template: &'a str,
    tokens: std::vec::IntoIter<Token>,
}

impl Parser<'_> {
    fn error(&self, line: usize, message: impl Into<String>) -> Error {
        Error::TemplateSyntax {
            template: self.template.to_string(),
            line,
            message: message.into(),
        }
    }

    /// Parse nodes until one of `terminators` (or end of input).
    /// Returns the terminating tag body and its line.
    fn parse_until(&mut self, terminators: &[&str]) -> Result<(Vec<Node>, Option<(String, usize)>)> {
        let mut nodes = Vec::new();

        while let Some(token) = self.tokens.next() {
            match token {
                Token::Text(text) => nodes.push(Node::Text(text)),
                Token::Output { body, line } => nodes.push(Node::Output(self.parse_output(&body, line)?)),
                Token::Block { body, line } => {
                    let keyword = body.split_whitespace().next().unwrap_or_default();
                    if terminators.contains(&keyword) {
                        return Ok((nodes, Some((body, line))));
                    }
                    match keyword {
                        "if" => nodes.push(self.parse_if(&body, line)?),
                        "for" => nodes.push(self.parse_for(&body, line)?),
                        "elif" | "else" | "endif" | "endfor" => {
                            return Ok((nodes, Some((body, line))));
                        }
                        other => {
                            return Err(self.error(line, format!("unknown directive '{}'", other)))
                        }
                    }
                }
            }
        }

        Ok((nodes, None))
    }

    fn parse_path(&self, text: &str, line: usize) -> Result<KeyPath> {
        KeyPath::parse(text).map_err(|e| self.error(line, e.to_string()))
    }

    fn parse_output(&self, body: &str, line: usize) -> Result<Output> {
        let mut parts = body.split('|').map(str::trim);
        let path = self.parse_path(parts.next().unwrap_or_default(), line)?;
        let filters = parts
            .map(|name| {
                Filter::parse(name).ok_or_else(|| self.error(line, format!("unknown filter '{}'", name)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Output {
            path,
            filters,
            line,
        })
    }

    fn parse_condition(&self, expr: &str, line: usize) -> Result<Condition> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(self.error(line, "missing condition"));
        }
        let (negated, path) = match expr.strip_prefix("not ") {
            Some(rest) => (true, rest.trim()),
            None => (false, expr),
        };
        Ok(Condition {
            path: self.parse_path(path, line)?,
            negated,
            line,
        })
    }

    fn parse_if(&mut self, body: &str, line: usize) -> Result<Node> {
        let mut branches = Vec::new();
        let mut condition = self.parse_condition(&body["if".len()..], line)?;

        loop {
            let (nodes, end) = self.parse_until(&["elif", "else", "endif"])?;
            branches.push((condition, nodes));
            let Some((tag, tag_line)) = end else {
                return Err(self.error(line, "'if' block is never closed"));
            };
            let keyword = tag.split_whitespace().next().unwrap_or_default();
            match keyword {
                "elif" => condition = self.parse_condition(&tag["elif".len()..], tag_line)?,
                "else" => {
                    self.expect_bare(&tag, tag_line)?;
                    let (otherwise, end) = self.parse_until(&["endif"])?;
                    self.expect_end(end, "endif", "if", line)?;
                    return Ok(Node::If(IfBlock {
                        branches,
                        otherwise,
                    }));
                }
                "endif" => {
                    self.expect_bare(&tag, tag_line)?;
                    return Ok(Node::If(IfBlock {
                        branches,
                        otherwise: Vec::new(),
                    }));
                }
                _ => return Err(self.error(tag_line, format!("unexpected '{}' inside 'if'", tag))),
            }
        }
    }

    fn parse_for(&mut self, body: &str, line: usize) -> Result<Node> {
        let spec = body["for".len()..].trim();
        let (vars, source) = spec
            .split_once(" in ")
            .ok_or_else(|| self.error(line, "expected 'for <name> in <path>'"))?;

        let names: Vec<&str> = vars.split(',').map(str::trim).collect();
        let (key_var, value_var) = match names.as_slice() {
            [value] => (None, *value),
            [key, value] => (Some(key.to_string()), *value),
            _ => return Err(self.error(line, "expected one or two loop variables")),
        };
        for name in key_var.as_deref().into_iter().chain([value_var]) {
            if !is_identifier(name) || name == LOOP_VAR {
                return Err(self.error(line, format!("invalid loop variable '{}'", name)));
            }
        }
        let source = self.parse_path(source, line)?;

        let (body_nodes, end) = self.parse_until(&["else", "endfor"])?;
        let Some((tag, tag_line)) = end else {
            return Err(self.error(line, "'for' block is never closed"));
        };
        self.expect_bare(&tag, tag_line)?;
        let otherwise = match tag.as_str() {
            "else" => {
                let (nodes, end) = self.parse_until(&["endfor"])?;
                self.expect_end(end, "endfor", "for", line)?;
                nodes
            }
            "endfor" => Vec::new(),
            other => return Err(self.error(tag_line, format!("unexpected '{}' inside 'for'", other))),
        };

        Ok(Node::For(ForBlock {
            key_var,
            value_var: value_var.to_string(),
            source,
            body: body_nodes,
            otherwise,
            line,
        }))
    }

    fn expect_bare(&self, tag: &str, line: usize) -> Result<()> {
        if tag.split_whitespace().count() == 1 {
            Ok(())
        } else {
            Err(self.error(line, format!("'{}' takes no arguments", tag)))
        }
    }

    fn expect_end(
        &self,
        end: Option<(String, usize)>,
        expected: &str,
        opener: &str,
        open_line: usize,
    ) -> Result<()> {
        match end {
            Some((tag, line)) if tag == expected => self.expect_bare(&tag, line),
            Some((tag, line)) => Err(self.error(line, format!("unexpected '{}', expected '{}'", tag, expected))),
            None => Err(self.error(open_line, format!("'{}' block is never closed", opener))),
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::lexer::tokenize;

    fn parse_str(source: &str) -> Result<Vec<Node>> {
        parse("t", tokenize("t", source)?)
    }

    #[test]
    fn test_output_with_filters() {
        let nodes = parse_str("{{ tags | json }}").unwrap();
        match &nodes[0] {
            Node::Output(out) => {
                assert_eq!(out.path.as_str(), "tags");
                assert_eq!(out.filters, vec![Filter::Json]);
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_if_elif_else() {
        let nodes = parse_str("{% if a %}A{% elif not b %}B{% else %}C{% endif %}").unwrap();
        let Node::If(block) = &nodes[0] else {
            panic!("expected if");
        };
        assert_eq!(block.branches.len(), 2);
        assert!(block.branches[1].0.negated);
        assert_eq!(block.otherwise, vec![Node::Text("C".into())]);
    }

    #[test]
    fn test_for_forms() {
        let nodes = parse_str("{% for k, v in lambdas %}{{ k }}{% else %}none{% endfor %}").unwrap();
        let Node::For(block) = &nodes[0] else {
            panic!("expected for");
        };
        assert_eq!(block.key_var.as_deref(), Some("k"));
        assert_eq!(block.value_var, "v");
        assert_eq!(block.source.as_str(), "lambdas");
        assert_eq!(block.otherwise, vec![Node::Text("none".into())]);
    }

    #[test]
    fn test_nested_blocks() {
        let nodes =
            parse_str("{% for s in items %}{% if s.on %}{{ s.name }}{% endif %}{% endfor %}").unwrap();
        let Node::For(block) = &nodes[0] else {
            panic!("expected for");
        };
        assert!(matches!(block.body[0], Node::If(_)));
    }

    #[test]
    fn test_structure_errors() {
        let cases = [
            "{% if a %}never closed",
            "{% endif %}",
            "{% for x in items %}{% endif %}",
            "{% for x items %}{% endfor %}",
            "{% for loop in items %}{% endfor %}",
            "{% unless a %}{% endunless %}",
            "{{ a | shout }}",
            "{{ a..b }}",
            "{% if %}{% endif %}",
            "{% if a %}{% else %}{% else %}{% endif %}",
            "{% if a %}{% endif extra %}",
        ];
        for case in cases {
            assert!(
                matches!(parse_str(case), Err(Error::TemplateSyntax { .. })),
                "expected syntax error for {case}"
            );
        }
    }
}
