//! Tokenizer for the expression grammar.

use crate::error::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Symbol(String),
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| Error::ParseError(format!("invalid number literal {text}")))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() => {
                // A symbol token: NAMESPACE:BODY, where BODY may contain
                // letters, digits, '.', and ':' is the single separator.
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == ':' || chars[i] == '.')
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                if !text.contains(':') {
                    return Err(Error::ParseError(format!("expected a symbol token, got {text}")));
                }
                tokens.push(Token::Symbol(text));
            }
            other => return Err(Error::ParseError(format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_symbols_and_operators() {
        let tokens = tokenize("EQ:AAPL+EQ:MSFT").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Symbol("EQ:AAPL".into()),
                Token::Plus,
                Token::Symbol("EQ:MSFT".into()),
            ]
        );
    }

    #[test]
    fn tokenizes_numbers_and_parens() {
        let tokens = tokenize("(EQ:SPY+2)/2.5").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::LParen,
                Token::Symbol("EQ:SPY".into()),
                Token::Plus,
                Token::Number(2.0),
                Token::RParen,
                Token::Slash,
                Token::Number(2.5),
            ]
        );
    }

    #[test]
    fn rejects_bare_word_without_namespace() {
        assert!(tokenize("SPY+EQ:AAPL").is_err());
    }
}
