//! Infix to postfix conversion with the shunting-yard algorithm.
//!
//! Function calls and conditional links are emitted after their arguments,
//! so an `if(..) elseif(..) else(..)` chain becomes a flat keyword sequence
//! with no branching structure left in it.

use crate::error::{FormulaError, FormulaResult};
use crate::formula::catalog::{Associativity, Branch, Catalog, Keyword, KeywordKind};
use crate::formula::lexer::{Lexeme, LexemeKind};

/// Entries of the operator working stack.
#[derive(Debug)]
enum Pending<'c> {
    /// Infix operator, or prefix negation carrying the `neg` name
    Operator {
        lexeme: Lexeme,
        keyword: &'c Keyword,
    },
    Group,
    Call {
        lexeme: Lexeme,
        keyword: &'c Keyword,
        args: usize,
    },
}

struct Converter<'c> {
    catalog: &'c Catalog,
    output: Vec<Lexeme>,
    stack: Vec<Pending<'c>>,
    /// True when the next lexeme must start an operand
    expect_operand: bool,
    /// True right after the `(` of a call, where `)` closes an empty list
    call_opened: bool,
    /// True right after the `)` of an `if` or `elseif` link
    chain_open: bool,
}

/// Reorder infix lexemes into postfix order.
pub fn to_postfix(infix: &[Lexeme], catalog: &Catalog) -> FormulaResult<Vec<Lexeme>> {
    let mut converter = Converter {
        catalog,
        output: Vec::with_capacity(infix.len()),
        stack: Vec::new(),
        expect_operand: true,
        call_opened: false,
        chain_open: false,
    };

    let mut lexemes = infix.iter().peekable();
    while let Some(lexeme) = lexemes.next() {
        let opens_call = lexeme.kind == LexemeKind::Name
            && matches!(lexemes.peek(), Some(next) if next.kind == LexemeKind::OpenParen);
        if opens_call {
            lexemes.next();
            converter.open_call(lexeme)?;
            continue;
        }
        converter.push(lexeme)?;
    }

    let end = infix.last().map(|l| l.position + l.text.len()).unwrap_or(0);
    converter.finish(end)
}

impl<'c> Converter<'c> {
    fn push(&mut self, lexeme: &Lexeme) -> FormulaResult<()> {
        let opened = std::mem::replace(&mut self.call_opened, false);
        self.chain_open = false;
        match lexeme.kind {
            LexemeKind::Number | LexemeKind::Text | LexemeKind::Boolean => {
                self.operand(lexeme)
            }
            LexemeKind::Name => match self.catalog.lookup(&lexeme.text) {
                Some((_, keyword)) if keyword.kind == KeywordKind::Operator => {
                    self.operator(lexeme, keyword)
                }
                Some(_) => Err(FormulaError::parse(
                    lexeme.position,
                    format!("'{}' must be called with arguments", lexeme.text),
                )),
                None => self.operand(lexeme),
            },
            LexemeKind::Operator => self.infix_or_prefix(lexeme),
            LexemeKind::OpenParen => {
                if !self.expect_operand {
                    return Err(unexpected(lexeme));
                }
                self.stack.push(Pending::Group);
                Ok(())
            }
            LexemeKind::Comma => self.comma(lexeme),
            LexemeKind::CloseParen => self.close(lexeme, opened),
        }
    }

    fn operand(&mut self, lexeme: &Lexeme) -> FormulaResult<()> {
        if !self.expect_operand {
            return Err(unexpected(lexeme));
        }
        self.output.push(lexeme.clone());
        self.expect_operand = false;
        Ok(())
    }

    fn open_call(&mut self, lexeme: &Lexeme) -> FormulaResult<()> {
        let keyword = match self.catalog.lookup(&lexeme.text) {
            Some((_, keyword)) if keyword.kind != KeywordKind::Operator => keyword,
            Some(_) => {
                return Err(FormulaError::parse(
                    lexeme.position,
                    format!("operator '{}' cannot be called", lexeme.text),
                ))
            }
            None => return Err(FormulaError::UnknownFunction(lexeme.text.clone())),
        };

        let chain_open = std::mem::replace(&mut self.chain_open, false);
        let continues_chain = keyword.branch().is_some_and(|b| b.continues_chain());
        let accepted = if continues_chain {
            chain_open
        } else {
            self.expect_operand
        };
        if !accepted {
            return Err(unexpected(lexeme));
        }

        self.stack.push(Pending::Call {
            lexeme: lexeme.clone(),
            keyword,
            args: 0,
        });
        self.expect_operand = true;
        self.call_opened = true;
        Ok(())
    }

    fn infix_or_prefix(&mut self, lexeme: &Lexeme) -> FormulaResult<()> {
        if !self.expect_operand {
            let keyword = match self.catalog.lookup(&lexeme.text) {
                Some((_, keyword)) if keyword.kind == KeywordKind::Operator => keyword,
                _ => {
                    return Err(FormulaError::parse(
                        lexeme.position,
                        format!("unknown operator '{}'", lexeme.text),
                    ))
                }
            };
            return self.operator(lexeme, keyword);
        }

        match lexeme.text.as_str() {
            "+" => Ok(()),
            "-" => {
                let (_, keyword) = self.catalog.lookup("neg").ok_or_else(|| {
                    FormulaError::parse(lexeme.position, "negation is not available")
                })?;
                self.stack.push(Pending::Operator {
                    lexeme: Lexeme::new(LexemeKind::Name, keyword.name, lexeme.position),
                    keyword,
                });
                Ok(())
            }
            _ => Err(unexpected(lexeme)),
        }
    }

    fn operator(&mut self, lexeme: &Lexeme, keyword: &'c Keyword) -> FormulaResult<()> {
        if self.expect_operand {
            return Err(unexpected(lexeme));
        }

        while let Some(Pending::Operator { keyword: top, .. }) = self.stack.last() {
            let outranks = top.precedence > keyword.precedence
                || (top.precedence == keyword.precedence
                    && keyword.associativity == Associativity::Left);
            if !outranks {
                break;
            }
            self.pop_to_output();
        }

        self.stack.push(Pending::Operator {
            lexeme: lexeme.clone(),
            keyword,
        });
        self.expect_operand = true;
        Ok(())
    }

    fn comma(&mut self, lexeme: &Lexeme) -> FormulaResult<()> {
        if self.expect_operand {
            return Err(FormulaError::parse(lexeme.position, "missing argument"));
        }
        self.drain_operators();
        match self.stack.last_mut() {
            Some(Pending::Call { args, .. }) => {
                *args += 1;
                self.expect_operand = true;
                Ok(())
            }
            _ => Err(FormulaError::parse(
                lexeme.position,
                "comma outside of a function call",
            )),
        }
    }

    fn close(&mut self, lexeme: &Lexeme, call_opened: bool) -> FormulaResult<()> {
        if self.expect_operand && !call_opened {
            return Err(FormulaError::parse(lexeme.position, "missing operand"));
        }
        self.drain_operators();

        match self.stack.pop() {
            Some(Pending::Group) => {}
            Some(Pending::Call {
                lexeme: name,
                keyword,
                args,
            }) => {
                let got = if call_opened { 0 } else { args + 1 };
                if got != keyword.arity {
                    return Err(FormulaError::InvalidArgCount {
                        function: name.text,
                        expected: keyword.arity,
                        got,
                    });
                }
                self.chain_open = matches!(keyword.branch(), Some(Branch::If | Branch::ElseIf));
                self.output.push(name);
            }
            Some(Pending::Operator { .. }) | None => {
                return Err(FormulaError::UnbalancedParentheses(lexeme.position))
            }
        }
        self.expect_operand = false;
        Ok(())
    }

    fn finish(mut self, end: usize) -> FormulaResult<Vec<Lexeme>> {
        if self.expect_operand {
            return Err(FormulaError::parse(end, "unexpected end of formula"));
        }
        self.drain_operators();
        match self.stack.pop() {
            None => Ok(self.output),
            Some(_) => Err(FormulaError::UnbalancedParentheses(end)),
        }
    }

    /// Move operators to the output down to the nearest group or call.
    fn drain_operators(&mut self) {
        while let Some(Pending::Operator { .. }) = self.stack.last() {
            self.pop_to_output();
        }
    }

    fn pop_to_output(&mut self) {
        if let Some(Pending::Operator { lexeme, .. }) = self.stack.pop() {
            self.output.push(lexeme);
        }
    }
}

fn unexpected(lexeme: &Lexeme) -> FormulaError {
    FormulaError::parse(
        lexeme.position,
        format!("unexpected '{}'", lexeme.text),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::lexer::{render, tokenize};
    use pretty_assertions::assert_eq;

    fn postfix(input: &str) -> FormulaResult<String> {
        let catalog = Catalog::standard();
        let infix = tokenize(input)?;
        to_postfix(&infix, &catalog).map(|out| render(&out))
    }

    #[test]
    fn test_precedence() {
        assert_eq!(postfix("1 + 2 * 3").unwrap(), "1 2 3 * +");
        assert_eq!(postfix("1 * 2 + 3").unwrap(), "1 2 * 3 +");
        assert_eq!(postfix("a || b && c").unwrap(), "a b c && ||");
        assert_eq!(postfix("a + 1 > b * 2").unwrap(), "a 1 + b 2 * >");
        assert_eq!(postfix("a == b && c != d").unwrap(), "a b == c d != &&");
    }

    #[test]
    fn test_parentheses() {
        assert_eq!(postfix("(1 + 2) * 3").unwrap(), "1 2 + 3 *");
        assert_eq!(postfix("((a))").unwrap(), "a");
    }

    #[test]
    fn test_associativity() {
        assert_eq!(postfix("8 - 3 - 2").unwrap(), "8 3 - 2 -");
        assert_eq!(postfix("2 ^ 3 ^ 2").unwrap(), "2 3 2 ^ ^");
    }

    #[test]
    fn test_prefix_negation() {
        assert_eq!(postfix("-a").unwrap(), "a neg");
        assert_eq!(postfix("-a * b").unwrap(), "a neg b *");
        assert_eq!(postfix("-2 ^ 2").unwrap(), "2 2 ^ neg");
        assert_eq!(postfix("2 ^ -1").unwrap(), "2 1 neg ^");
        assert_eq!(postfix("1 - -1").unwrap(), "1 1 neg -");
        assert_eq!(postfix("+4").unwrap(), "4");
    }

    #[test]
    fn test_function_arguments_precede_keyword() {
        assert_eq!(postfix("min(a, b + 1)").unwrap(), "a b 1 + min");
        assert_eq!(postfix("max(min(a, b), c)").unwrap(), "a b min c max");
        assert_eq!(postfix("abs(x) * 2").unwrap(), "x abs 2 *");
        assert_eq!(postfix("2 * abs(x - 1)").unwrap(), "2 x 1 - abs *");
    }

    #[test]
    fn test_conditional_chain_is_flat() {
        assert_eq!(
            postfix("if(a > 1, 10) elseif(b, 20) else(30)").unwrap(),
            "a 1 > 10 if b 20 elseif 30 else"
        );
        assert_eq!(
            postfix("x + if(c, 1) else(2)").unwrap(),
            "x c 1 if 2 else +"
        );
    }

    #[test]
    fn test_text_literals_are_requoted() {
        assert_eq!(
            postfix("Contains('abCd', 'cd')").unwrap(),
            "'abCd' 'cd' Contains"
        );
    }

    #[test]
    fn test_unknown_function() {
        assert_eq!(
            postfix("frobnicate(1)"),
            Err(FormulaError::UnknownFunction("frobnicate".to_string()))
        );
    }

    #[test]
    fn test_arity_mismatch() {
        assert_eq!(
            postfix("min(1)"),
            Err(FormulaError::InvalidArgCount {
                function: "min".to_string(),
                expected: 2,
                got: 1,
            })
        );
        assert!(matches!(
            postfix("abs()"),
            Err(FormulaError::InvalidArgCount { got: 0, .. })
        ));
        assert!(matches!(
            postfix("if(a, 1) else(1, 2)"),
            Err(FormulaError::InvalidArgCount { got: 2, .. })
        ));
    }

    #[test]
    fn test_malformed() {
        assert!(postfix("1 +").is_err());
        assert!(postfix("1 2").is_err());
        assert!(postfix("* 2").is_err());
        assert!(postfix("()").is_err());
        assert!(postfix("1, 2").is_err());
        assert!(postfix("min(1,)").is_err());
        assert!(postfix("abs").is_err());
        assert!(postfix("2 (3)").is_err());
        assert!(postfix("if(a, 1) if(b, 2)").is_err());
    }

    #[test]
    fn test_chain_links_must_follow_a_chain() {
        assert!(postfix("1 else(2)").is_err());
        assert!(postfix("x elseif(true, 3)").is_err());
        assert!(postfix("else(1) else(2)").is_err());
        assert!(postfix("if(a, 1) + 2 else(3)").is_err());
        assert!(postfix("if(a, 1) else(2) else(3)").is_err());
        assert!(postfix("else(1)").is_err());
        assert!(postfix("(if(a, 1)) else(2)").is_err());

        assert_eq!(
            postfix("if(a, if(b, 1) else(2)) else(3)").unwrap(),
            "a b 1 if 2 else if 3 else"
        );
        assert_eq!(
            postfix("if(a, 1) elseif(b, 2) elseif(c, 3) else(4) * 2").unwrap(),
            "a 1 if b 2 elseif c 3 elseif 4 else 2 *"
        );
    }

    #[test]
    fn test_unbalanced_lexemes() {
        let catalog = Catalog::standard();
        let infix = vec![
            Lexeme::new(LexemeKind::OpenParen, "(", 0),
            Lexeme::new(LexemeKind::Number, "1", 1),
        ];
        assert_eq!(
            to_postfix(&infix, &catalog),
            Err(FormulaError::UnbalancedParentheses(2))
        );

        let infix = vec![
            Lexeme::new(LexemeKind::Number, "1", 0),
            Lexeme::new(LexemeKind::CloseParen, ")", 1),
        ];
        assert_eq!(
            to_postfix(&infix, &catalog),
            Err(FormulaError::UnbalancedParentheses(1))
        );
    }
}
