//! Postfix stack machine.
//!
//! One left-to-right pass over the resolved tokens with a single value stack.
//! Keywords pop exactly their arity and push at most one value. Conditional
//! chains are selected with a depth counter instead of jumps:
//!
//! - `if` pushes its value and increments the depth when the condition holds,
//!   and pushes nothing otherwise.
//! - `elseif` is skipped outright while the depth is positive, else acts like `if`.
//! - `else` decrements a positive depth and drops its value, otherwise pushes it.

use crate::error::{FormulaError, FormulaResult};
use crate::formula::catalog::{Behavior, Branch, Catalog, Keyword};
use crate::formula::dispatch::Rule;
use crate::formula::resolver::{Token, VariableTable};
use crate::formula::value::Value;

/// Evaluate resolved postfix tokens against the current variable values.
pub fn evaluate(
    tokens: &[Token],
    catalog: &Catalog,
    variables: &VariableTable,
) -> FormulaResult<Value> {
    let mut machine = Machine {
        stack: Vec::with_capacity(tokens.len()),
        depth: 0,
    };

    for token in tokens {
        match token {
            Token::Literal(value) => machine.stack.push(value.clone()),
            Token::Variable(slot) => machine.stack.push(variables.value(*slot).clone()),
            Token::Keyword(id) => machine.apply(catalog.get(*id))?,
        }
    }

    machine.finish()
}

struct Machine {
    stack: Vec<Value>,
    /// Conditional depth: chains with a taken branch still open
    depth: usize,
}

impl Machine {
    fn apply(&mut self, keyword: &Keyword) -> FormulaResult<()> {
        let args = self.pop(keyword)?;
        match &keyword.behavior {
            Behavior::Dispatch(rules) => {
                let result = dispatch(keyword, rules, &args)?;
                self.stack.push(result);
            }
            Behavior::Branch(branch) => self.branch(keyword, *branch, args)?,
        }
        Ok(())
    }

    fn pop(&mut self, keyword: &Keyword) -> FormulaResult<Vec<Value>> {
        let len = self.stack.len();
        if len < keyword.arity {
            return Err(FormulaError::MalformedExpression(format!(
                "'{}' needs {} operands but the stack holds {}",
                keyword.name, keyword.arity, len
            )));
        }
        Ok(self.stack.split_off(len - keyword.arity))
    }

    fn branch(&mut self, keyword: &Keyword, branch: Branch, args: Vec<Value>) -> FormulaResult<()> {
        let mut args = args.into_iter();
        match branch {
            Branch::If | Branch::ElseIf => {
                let (Some(condition), Some(value)) = (args.next(), args.next()) else {
                    return Err(arity_error(keyword));
                };
                if branch == Branch::ElseIf && self.depth > 0 {
                    tracing::trace!(depth = self.depth, "elseif skipped");
                    return Ok(());
                }
                match condition.as_bool() {
                    Some(true) => {
                        self.stack.push(value);
                        self.depth += 1;
                        tracing::trace!(keyword = keyword.name, depth = self.depth, "branch taken");
                    }
                    Some(false) => {}
                    None => {
                        return Err(FormulaError::TypeError(format!(
                            "condition of '{}' is not a boolean: {}",
                            keyword.name, condition
                        )))
                    }
                }
            }
            Branch::Else => {
                let Some(value) = args.next() else {
                    return Err(arity_error(keyword));
                };
                if self.depth > 0 {
                    self.depth -= 1;
                    tracing::trace!(depth = self.depth, "else skipped");
                } else {
                    self.stack.push(value);
                    tracing::trace!("else taken");
                }
            }
        }
        Ok(())
    }

    fn finish(mut self) -> FormulaResult<Value> {
        match (self.stack.pop(), self.stack.len()) {
            (Some(value), 0) => Ok(value),
            (None, _) => Err(FormulaError::MalformedExpression(
                "evaluation left no value".to_string(),
            )),
            (Some(_), rest) => Err(FormulaError::MalformedExpression(format!(
                "evaluation left {} values on the stack",
                rest + 1
            ))),
        }
    }
}

/// Run the first rule matching the operands, preferring exact kinds over coercions.
fn dispatch(keyword: &Keyword, rules: &[Rule], args: &[Value]) -> FormulaResult<Value> {
    rules
        .iter()
        .find_map(|rule| rule.apply(args, false))
        .or_else(|| rules.iter().find_map(|rule| rule.apply(args, true)))
        .ok_or_else(|| FormulaError::NoMatchingRule {
            keyword: keyword.name.to_string(),
            operands: args
                .iter()
                .map(|a| a.kind().label())
                .collect::<Vec<_>>()
                .join(", "),
        })
}

fn arity_error(keyword: &Keyword) -> FormulaError {
    FormulaError::MalformedExpression(format!(
        "'{}' is declared with arity {}",
        keyword.name, keyword.arity
    ))
}
