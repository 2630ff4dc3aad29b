//! GCP list filter expressions
//!
//! Supports the subset Compute list calls accept in practice:
//!
//! ```text
//! name = "web-1"
//! status != TERMINATED
//! name eq "web-.*"          (anchored RE2-style match)
//! (labels.env = prod) (zone ne ".*-b") AND name = x
//! ```
//!
//! Terms are joined by whitespace or `AND`. `OR` is rejected rather than
//! silently treated as `AND`.

use crate::core::{Dialect, ErrorEnvelope, FilterClause, Operator, Outcome};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Op(Operator),
    Word(String),
    Quoted(String),
}

fn invalid(filter: &str, reason: &str) -> ErrorEnvelope {
    ErrorEnvelope::invalid_value(
        Dialect::Gcp,
        format!(
            "Invalid value for field 'filter': '{}'. Invalid list filter expression: {}.",
            filter, reason
        ),
    )
}

fn tokenize(filter: &str) -> Outcome<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = filter.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Op(Operator::Eq));
            }
            '!' => {
                chars.next();
                if chars.next() != Some('=') {
                    return Err(invalid(filter, "expected '!='"));
                }
                tokens.push(Token::Op(Operator::Ne));
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                if escaped != '"' && escaped != '\\' {
                                    value.push('\\');
                                }
                                value.push(escaped);
                            }
                        }
                        '"' => {
                            closed = true;
                            break;
                        }
                        other => value.push(other),
                    }
                }
                if !closed {
                    return Err(invalid(filter, "unterminated string"));
                }
                tokens.push(Token::Quoted(value));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | '=' | '!' | '"') {
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

/// Parse a filter string into clauses; empty input yields no clauses
pub fn parse(filter: &str) -> Outcome<Vec<FilterClause>> {
    let tokens = tokenize(filter)?;
    let mut clauses = Vec::new();
    let mut depth: i32 = 0;
    let mut iter = tokens.into_iter();

    while let Some(token) = iter.next() {
        match token {
            Token::Open => depth += 1,
            Token::Close => {
                depth -= 1;
                if depth < 0 {
                    return Err(invalid(filter, "unbalanced parentheses"));
                }
            }
            Token::Word(word) if word == "AND" => {}
            Token::Word(word) if word == "OR" => {
                return Err(invalid(filter, "OR is not supported"));
            }
            Token::Word(key) => {
                let operator = match iter.next() {
                    Some(Token::Op(op)) => op,
                    Some(Token::Word(w)) if w == "eq" => Operator::Match,
                    Some(Token::Word(w)) if w == "ne" => Operator::NotMatch,
                    _ => return Err(invalid(filter, "expected an operator")),
                };
                let value = match iter.next() {
                    Some(Token::Word(v)) | Some(Token::Quoted(v)) => v,
                    _ => return Err(invalid(filter, "expected a value")),
                };
                clauses.push(FilterClause::new(key, vec![value], operator));
            }
            Token::Op(_) | Token::Quoted(_) => {
                return Err(invalid(filter, "expected a field name"));
            }
        }
    }

    if depth != 0 {
        return Err(invalid(filter, "unbalanced parentheses"));
    }
    Ok(clauses)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clause(key: &str, value: &str, operator: Operator) -> FilterClause {
        FilterClause::new(key, vec![value.to_string()], operator)
    }

    #[test]
    fn test_empty() {
        assert!(parse("").expect("empty").is_empty());
        assert!(parse("   ").expect("blank").is_empty());
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            parse(r#"name = "web-1""#).expect("eq"),
            vec![clause("name", "web-1", Operator::Eq)]
        );
        assert_eq!(
            parse("status != TERMINATED").expect("ne"),
            vec![clause("status", "TERMINATED", Operator::Ne)]
        );
        assert_eq!(
            parse(r#"name eq "web-.*""#).expect("regex"),
            vec![clause("name", "web-.*", Operator::Match)]
        );
        assert_eq!(
            parse("zone ne .*-b").expect("not regex"),
            vec![clause("zone", ".*-b", Operator::NotMatch)]
        );
    }

    #[test]
    fn test_conjunctions() {
        let clauses = parse(r#"(labels.env = prod) (status = RUNNING) AND name="x""#).expect("and");
        assert_eq!(
            clauses,
            vec![
                clause("labels.env", "prod", Operator::Eq),
                clause("status", "RUNNING", Operator::Eq),
                clause("name", "x", Operator::Eq),
            ]
        );
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(parse("name = a OR name = b").is_err());
        assert!(parse("(name = a").is_err());
        assert!(parse("name = a)").is_err());
        assert!(parse("name").is_err());
        assert!(parse("name =").is_err());
        assert!(parse(r#"name = "open"#).is_err());
        assert!(parse("= value").is_err());
    }

    #[test]
    fn test_escaped_quote() {
        assert_eq!(
            parse(r#"description = "say \"hi\"""#).expect("escaped"),
            vec![clause("description", r#"say "hi""#, Operator::Eq)]
        );
    }
}
