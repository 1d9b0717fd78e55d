//! Tokenizer: splits infix formula text into lexemes.

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit0, digit1, one_of},
    combinator::{map, opt, recognize},
    sequence::pair,
    IResult, Parser,
};

use crate::error::{FormulaError, FormulaResult};

/// Delimiter of text literals. A doubled delimiter inside a literal stands for one.
pub const TEXT_DELIMITER: char = '\'';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexemeKind {
    Number,
    /// Text literal; the lexeme text holds the unescaped content
    Text,
    Boolean,
    /// Keyword or variable, decided later
    Name,
    Operator,
    OpenParen,
    CloseParen,
    Comma,
}

/// One lexical token with its byte offset into the formula text.
#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme {
    pub kind: LexemeKind,
    pub text: String,
    pub position: usize,
}

impl Lexeme {
    pub fn new(kind: LexemeKind, text: impl Into<String>, position: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            position,
        }
    }
}

impl fmt::Display for Lexeme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LexemeKind::Text => {
                let escaped = self
                    .text
                    .replace(TEXT_DELIMITER, &TEXT_DELIMITER.to_string().repeat(2));
                write!(f, "{}{}{}", TEXT_DELIMITER, escaped, TEXT_DELIMITER)
            }
            _ => f.write_str(&self.text),
        }
    }
}

/// Joins lexemes with single spaces.
pub fn render(lexemes: &[Lexeme]) -> String {
    lexemes
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tokenize a formula.
///
/// Fails on empty input, unterminated text literals, unbalanced parentheses
/// and characters that start no token.
pub fn tokenize(input: &str) -> FormulaResult<Vec<Lexeme>> {
    if input.trim().is_empty() {
        return Err(FormulaError::EmptyExpression);
    }

    let mut lexemes = Vec::new();
    let mut open_parens: Vec<usize> = Vec::new();
    let mut rest = input.trim_start();

    while !rest.is_empty() {
        let position = input.len() - rest.len();

        if rest.starts_with(TEXT_DELIMITER) {
            let (remaining, content) = text_literal(rest, position)?;
            lexemes.push(Lexeme::new(LexemeKind::Text, content, position));
            rest = remaining.trim_start();
            continue;
        }

        let (remaining, (kind, text)) = match lexeme(rest) {
            Ok(parsed) => parsed,
            Err(_) => {
                let found = rest.chars().next().unwrap_or_default();
                return Err(FormulaError::parse(
                    position,
                    format!("unexpected character '{}'", found),
                ));
            }
        };

        match kind {
            LexemeKind::OpenParen => open_parens.push(position),
            LexemeKind::CloseParen => {
                if open_parens.pop().is_none() {
                    return Err(FormulaError::UnbalancedParentheses(position));
                }
            }
            _ => {}
        }

        lexemes.push(Lexeme::new(kind, text, position));
        rest = remaining.trim_start();
    }

    if let Some(position) = open_parens.pop() {
        return Err(FormulaError::UnbalancedParentheses(position));
    }

    Ok(lexemes)
}

fn lexeme(input: &str) -> IResult<&str, (LexemeKind, &str)> {
    alt((
        map(number, |s| (LexemeKind::Number, s)),
        map(operator, |s| (LexemeKind::Operator, s)),
        map(identifier, |s| match s {
            "true" | "false" => (LexemeKind::Boolean, s),
            _ => (LexemeKind::Name, s),
        }),
        map(tag("("), |s| (LexemeKind::OpenParen, s)),
        map(tag(")"), |s| (LexemeKind::CloseParen, s)),
        map(tag(","), |s| (LexemeKind::Comma, s)),
    ))
    .parse(input)
}

/// Unsigned decimal floating-point: `12`, `1.5`, `.5`, `3.`, `2e-3`.
fn number(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
        opt((one_of("eE"), opt(one_of("+-")), digit1)),
    ))
    .parse(input)
}

// Two-character operators come first so `<=` never lexes as `<` `=`.
fn operator(input: &str) -> IResult<&str, &str> {
    alt((
        tag("=="),
        tag("!="),
        tag("<="),
        tag(">="),
        tag("&&"),
        tag("||"),
        recognize(one_of("+-*/^<>")),
    ))
    .parse(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))
    .parse(input)
}

/// Reads a delimited text literal starting at the opening delimiter.
fn text_literal(input: &str, position: usize) -> FormulaResult<(&str, String)> {
    let mut content = String::new();
    let mut chars = input.char_indices().skip(1).peekable();

    while let Some((i, c)) = chars.next() {
        if c != TEXT_DELIMITER {
            content.push(c);
            continue;
        }
        if let Some(&(_, TEXT_DELIMITER)) = chars.peek() {
            content.push(TEXT_DELIMITER);
            chars.next();
            continue;
        }
        return Ok((&input[i + c.len_utf8()..], content));
    }

    Err(FormulaError::UnterminatedText(position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn texts(input: &str) -> Vec<String> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|l| l.text)
            .collect()
    }

    fn kinds(input: &str) -> Vec<LexemeKind> {
        tokenize(input).unwrap().into_iter().map(|l| l.kind).collect()
    }

    #[test]
    fn test_tokenize_arithmetic() {
        assert_eq!(texts("1 + 2 * 3"), vec!["1", "+", "2", "*", "3"]);
        assert_eq!(texts("(a+b)/2"), vec!["(", "a", "+", "b", ")", "/", "2"]);
    }

    #[test]
    fn test_multi_character_operators_are_greedy() {
        assert_eq!(
            texts("a<=b>=c==d!=e&&f||g"),
            vec!["a", "<=", "b", ">=", "c", "==", "d", "!=", "e", "&&", "f", "||", "g"]
        );
        assert_eq!(texts("a<b"), vec!["a", "<", "b"]);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(texts("3.5 .5 2. 1e3 2.5E-2"), vec!["3.5", ".5", "2.", "1e3", "2.5E-2"]);
        // the sign is an operator, never part of the literal
        assert_eq!(texts("1-2"), vec!["1", "-", "2"]);
    }

    #[test]
    fn test_booleans_and_names() {
        use LexemeKind::*;
        assert_eq!(kinds("true && flag_2"), vec![Boolean, Operator, Name]);
        assert_eq!(kinds("True"), vec![Name]);
    }

    #[test]
    fn test_function_call() {
        use LexemeKind::*;
        assert_eq!(
            kinds("min(a, 2)"),
            vec![Name, OpenParen, Name, Comma, Number, CloseParen]
        );
    }

    #[test]
    fn test_text_literal() {
        let lexemes = tokenize("contains('abc', 'it''s')").unwrap();
        assert_eq!(lexemes[2].kind, LexemeKind::Text);
        assert_eq!(lexemes[2].text, "abc");
        assert_eq!(lexemes[4].text, "it's");
        assert_eq!(lexemes[4].to_string(), "'it''s'");
    }

    #[test]
    fn test_text_literal_keeps_spaces() {
        let lexemes = tokenize("'  a b '").unwrap();
        assert_eq!(lexemes.len(), 1);
        assert_eq!(lexemes[0].text, "  a b ");
    }

    #[test]
    fn test_positions() {
        let lexemes = tokenize("  ab + 12").unwrap();
        let positions: Vec<usize> = lexemes.iter().map(|l| l.position).collect();
        assert_eq!(positions, vec![2, 5, 7]);
    }

    #[test]
    fn test_empty() {
        assert_eq!(tokenize(""), Err(FormulaError::EmptyExpression));
        assert_eq!(tokenize("  \t "), Err(FormulaError::EmptyExpression));
    }

    #[test]
    fn test_unterminated_text() {
        assert_eq!(
            tokenize("contains(a, 'abc)"),
            Err(FormulaError::UnterminatedText(12))
        );
        assert_eq!(tokenize("'it''"), Err(FormulaError::UnterminatedText(0)));
    }

    #[test]
    fn test_unbalanced_parentheses() {
        assert_eq!(
            tokenize("((1 + 2)"),
            Err(FormulaError::UnbalancedParentheses(0))
        );
        assert_eq!(
            tokenize("(1 + 2))"),
            Err(FormulaError::UnbalancedParentheses(7))
        );
    }

    #[test]
    fn test_unexpected_character() {
        let result = tokenize("1 + 2 @");
        assert!(matches!(
            result,
            Err(FormulaError::ParseError { position: 6, .. })
        ));
        assert!(tokenize("a = b").is_err());
        assert!(tokenize("!a").is_err());
    }

    #[test]
    fn test_render() {
        let lexemes = tokenize("contains( 'x' ,y)").unwrap();
        assert_eq!(render(&lexemes), "contains ( 'x' , y )");
    }
}
