//! Formula engine for host-configured calculated values.
//!
//! Formula text is compiled once into a postfix token sequence and evaluated
//! repeatedly against externally bound variables. Compilation runs in three
//! stages: [`lexer`] splits the text into lexemes, [`postfix`] reorders them with
//! the shunting-yard algorithm, and [`resolver`] maps each lexeme to a literal,
//! a variable slot or a catalog keyword. [`evaluator`] then runs the tokens on a
//! value stack, picking the first matching rule of each keyword.
//!
//! # Supported Grammar
//!
//! - Literals: numbers (`12`, `1.5`, `2e-3`), `true`/`false`, text in single quotes (`'it''s'`)
//! - Arithmetic: `+ - * / ^ ( )`, unary `-` and `+`
//! - Comparison: `> < >= <= == !=`
//! - Boolean: `&& ||`
//! - Functions: `abs`, `neg`, `ln`, `sign`, `sqrt`, `floor`, `ceil`, `min`, `max`, `round`
//! - Text: `contains`, `startswith`, `endswith` (case-insensitive)
//! - Time: `seconds`, `minutes`, `hours`, `days`, `totalminutes`
//! - Conditionals: `if(cond, a) elseif(cond, b) else(c)`
//!
//! # Example
//!
//! ```
//! use formulary::formula::{compute, validate, Expression, Value};
//!
//! let formula = "if(depth > 40, 2) elseif(depth > 18, 1) else(0)";
//! validate(formula).expect("Formula should be valid");
//!
//! let mut expr = Expression::parse(formula).unwrap();
//! expr.bind("depth", 25.0);
//! assert!((expr.evaluate_number().unwrap() - 1.0).abs() < f64::EPSILON);
//!
//! // One-shot evaluation with a variable provider
//! let vars = |name: &str| match name {
//!     "deco" => Some(Value::Number(10.0)),
//!     "bottom" => Some(Value::Number(50.0)),
//!     _ => None,
//! };
//! let result = compute("deco / bottom", &vars).unwrap();
//! assert!((result - 0.2).abs() < f64::EPSILON);
//! ```

pub mod catalog;
pub mod dispatch;
pub mod evaluator;
pub mod expression;
pub mod lexer;
pub mod postfix;
pub mod resolver;
pub mod value;

pub use catalog::{Catalog, CatalogBuilder, Keyword, KeywordInfo, KeywordKind};
pub use dispatch::Rule;
pub use expression::Expression;
pub use value::{Value, ValueKind, FALSE, TRUE};

use crate::error::FormulaResult;

/// Provides variable values during one-shot evaluation.
pub trait VariableProvider {
    fn get(&self, name: &str) -> Option<Value>;
}

impl<F> VariableProvider for F
where
    F: Fn(&str) -> Option<Value>,
{
    fn get(&self, name: &str) -> Option<Value> {
        self(name)
    }
}

/// Validate a formula against the standard catalog without evaluating it.
///
/// Variables are not checked; any name that is not a keyword is one.
pub fn validate(formula: &str) -> FormulaResult<()> {
    Expression::parse(formula).map(|_| ())
}

/// Compile and evaluate a formula once, pulling variables from `vars`.
///
/// Variables the provider does not know stay undefined and read as NaN.
pub fn compute<V: VariableProvider>(formula: &str, vars: &V) -> FormulaResult<f64> {
    let mut expr = Expression::parse(formula)?;
    let bindings: Vec<(String, Value)> = expr
        .variables()?
        .into_iter()
        .filter_map(|name| vars.get(name).map(|value| (name.to_string(), value)))
        .collect();
    for (name, value) in bindings {
        expr.bind(&name, value);
    }
    expr.evaluate_number()
}

/// Describe every keyword of the standard catalog.
pub fn supported_keywords() -> Vec<KeywordInfo> {
    Catalog::standard()
        .keywords()
        .map(KeywordInfo::from)
        .collect()
}
