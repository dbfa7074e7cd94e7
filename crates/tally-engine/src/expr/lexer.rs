//! Tokenizer for formula source strings.

use super::error::FormulaError;

/// A lexical token, carrying no position of its own.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// Numeric literal (`12`, `3.5`, `.5`, `5.`).
    Number(f64),
    /// Placeholder variable, already stripped of its braces.
    Var(String),
    Plus,
    Minus,
    Star,
    Slash,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    NotEq,
    Question,
    Colon,
    LParen,
    RParen,
}

/// A token plus the character offset where it started.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub position: usize,
}

/// Check the placeholder identifier rule: `[A-Za-z][A-Za-z0-9_]*`.
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Tokenize a formula source string.
///
/// Characters that pass the whitelist but form no documented operator
/// (`&`, `|`, lone `=`, lone `!`) are rejected here with a syntax error.
pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, FormulaError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let position = i;
        match chars[i] {
            c if c.is_whitespace() => i += 1,

            '0'..='9' | '.' => {
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[position..i].iter().collect();
                let value = text.parse::<f64>().map_err(|_| FormulaError::Syntax {
                    position,
                    message: format!("invalid number '{text}'"),
                })?;
                tokens.push(Spanned {
                    token: Token::Number(value),
                    position,
                });
            }

            '{' => {
                i += 1;
                let ident_start = i;
                while i < chars.len() && chars[i] != '}' {
                    i += 1;
                }
                if i == chars.len() {
                    return Err(FormulaError::Unbalanced { delimiter: '{' });
                }
                let ident: String = chars[ident_start..i].iter().collect();
                i += 1;
                if !is_identifier(&ident) {
                    return Err(FormulaError::InvalidPlaceholder { placeholder: ident });
                }
                tokens.push(Spanned {
                    token: Token::Var(ident),
                    position,
                });
            }

            '<' | '>' => {
                let token = if chars.get(i + 1) == Some(&'=') {
                    i += 2;
                    if chars[position] == '<' {
                        Token::Le
                    } else {
                        Token::Ge
                    }
                } else {
                    i += 1;
                    if chars[position] == '<' {
                        Token::Lt
                    } else {
                        Token::Gt
                    }
                };
                tokens.push(Spanned { token, position });
            }

            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    i += 2;
                    tokens.push(Spanned {
                        token: Token::EqEq,
                        position,
                    });
                } else {
                    return Err(FormulaError::Syntax {
                        position,
                        message: "'=' is not an operator, did you mean '=='?".into(),
                    });
                }
            }

            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    i += 2;
                    tokens.push(Spanned {
                        token: Token::NotEq,
                        position,
                    });
                } else {
                    return Err(FormulaError::Syntax {
                        position,
                        message: "'!' is not an operator, did you mean '!='?".into(),
                    });
                }
            }

            ch => {
                let token = match ch {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '?' => Token::Question,
                    ':' => Token::Colon,
                    other => {
                        return Err(FormulaError::Syntax {
                            position,
                            message: format!("unexpected character '{other}'"),
                        })
                    }
                };
                i += 1;
                tokens.push(Spanned { token, position });
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn numbers_and_operators() {
        assert_eq!(
            kinds("12 + 3.5 * .5"),
            vec![
                Token::Number(12.0),
                Token::Plus,
                Token::Number(3.5),
                Token::Star,
                Token::Number(0.5),
            ]
        );
        assert_eq!(kinds("5."), vec![Token::Number(5.0)]);
    }

    #[test]
    fn placeholders() {
        assert_eq!(
            kinds("{token_count}*0.001"),
            vec![
                Token::Var("token_count".into()),
                Token::Star,
                Token::Number(0.001),
            ]
        );
    }

    #[test]
    fn comparison_operators() {
        assert_eq!(
            kinds("{a}<={b} != 1"),
            vec![
                Token::Var("a".into()),
                Token::Le,
                Token::Var("b".into()),
                Token::NotEq,
                Token::Number(1.0),
            ]
        );
    }

    #[test]
    fn rejects_lone_equals_and_bang() {
        assert!(matches!(
            tokenize("{a} = 1"),
            Err(FormulaError::Syntax { .. })
        ));
        assert!(matches!(tokenize("!{a}"), Err(FormulaError::Syntax { .. })));
    }

    #[test]
    fn rejects_unsupported_whitelist_characters() {
        // '&' and '|' pass the character whitelist but form no operator
        assert!(matches!(
            tokenize("{a} & {b}"),
            Err(FormulaError::Syntax { .. })
        ));
    }

    #[test]
    fn rejects_malformed_number() {
        assert!(matches!(
            tokenize("1.2.3"),
            Err(FormulaError::Syntax { .. })
        ));
    }

    #[test]
    fn identifier_rule() {
        assert!(is_identifier("a"));
        assert!(is_identifier("token_count2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("_hidden"));
        assert!(!is_identifier("a-b"));
    }
}
