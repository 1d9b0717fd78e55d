//! Symbol resolution: turns postfix lexemes into evaluator tokens.

use std::collections::HashMap;

use crate::error::{FormulaError, FormulaResult};
use crate::formula::catalog::{Catalog, KeywordId};
use crate::formula::lexer::{Lexeme, LexemeKind};
use crate::formula::value::Value;

/// Index of a variable slot in a [`VariableTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

/// A resolved postfix token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Literal(Value),
    Variable(SlotId),
    Keyword(KeywordId),
}

/// Named, externally bound value slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value: Value,
}

/// Variable slots of one expression.
///
/// Tokens refer to slots by index, so rebinding a name updates the value every
/// resolved token sees without touching the token list.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    slots: Vec<Variable>,
    by_name: HashMap<String, SlotId>,
}

impl VariableTable {
    /// Slot for `name`, created with the undefined value if missing.
    pub fn slot(&mut self, name: &str) -> SlotId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = SlotId(self.slots.len());
        self.slots.push(Variable {
            name: name.to_string(),
            value: Value::undefined(),
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Bind `name`, creating the slot on first use and replacing its value otherwise.
    pub fn bind(&mut self, name: &str, value: Value) -> SlotId {
        let id = self.slot(name);
        self.slots[id.0].value = value;
        id
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.by_name.get(name).map(|&id| &self.slots[id.0].value)
    }

    /// Value of a slot issued by this table.
    pub fn value(&self, id: SlotId) -> &Value {
        &self.slots[id.0].value
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Keep the first `keep` slots with undefined values and drop the rest.
    pub fn reset(&mut self, keep: usize) {
        self.slots.truncate(keep);
        for slot in &mut self.slots {
            slot.value = Value::undefined();
        }
        self.by_name.retain(|_, id| id.0 < keep);
    }
}

/// Resolve postfix lexemes against the catalog, creating variable slots as needed.
pub fn resolve(
    postfix: &[Lexeme],
    catalog: &Catalog,
    variables: &mut VariableTable,
) -> FormulaResult<Vec<Token>> {
    postfix
        .iter()
        .map(|lexeme| resolve_one(lexeme, catalog, variables))
        .collect()
}

fn resolve_one(
    lexeme: &Lexeme,
    catalog: &Catalog,
    variables: &mut VariableTable,
) -> FormulaResult<Token> {
    match lexeme.kind {
        LexemeKind::Number => lexeme
            .text
            .parse::<f64>()
            .map(|n| Token::Literal(Value::Number(n)))
            .map_err(|_| {
                FormulaError::parse(
                    lexeme.position,
                    format!("invalid number '{}'", lexeme.text),
                )
            }),
        LexemeKind::Boolean => match lexeme.text.as_str() {
            "true" => Ok(Token::Literal(Value::Boolean(true))),
            "false" => Ok(Token::Literal(Value::Boolean(false))),
            other => Err(FormulaError::parse(
                lexeme.position,
                format!("invalid boolean '{}'", other),
            )),
        },
        LexemeKind::Text => Ok(Token::Literal(Value::Text(lexeme.text.clone()))),
        LexemeKind::Name | LexemeKind::Operator => match catalog.lookup(&lexeme.text) {
            Some((id, _)) => Ok(Token::Keyword(id)),
            None if lexeme.kind == LexemeKind::Name => {
                Ok(Token::Variable(variables.slot(&lexeme.text)))
            }
            None => Err(FormulaError::parse(
                lexeme.position,
                format!("unknown operator '{}'", lexeme.text),
            )),
        },
        LexemeKind::OpenParen | LexemeKind::CloseParen | LexemeKind::Comma => {
            Err(FormulaError::parse(
                lexeme.position,
                format!("unexpected '{}' in postfix sequence", lexeme.text),
            ))
        }
    }
}
