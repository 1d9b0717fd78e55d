//! Compiled formula with its variable bindings.

use std::fmt;
use std::sync::Arc;

use crate::error::{FormulaError, FormulaResult};
use crate::formula::catalog::Catalog;
use crate::formula::evaluator;
use crate::formula::lexer::{self, Lexeme, LexemeKind};
use crate::formula::postfix::to_postfix;
use crate::formula::resolver::{resolve, Token, VariableTable};
use crate::formula::value::{Value, TRUE};

#[derive(Debug, Clone)]
struct Compiled {
    text: String,
    infix: Vec<Lexeme>,
    postfix: Vec<Lexeme>,
    tokens: Vec<Token>,
    /// Slots created by resolution; later bindings are appended after them.
    referenced: usize,
}

/// A formula compiled once and evaluated any number of times.
///
/// Setting the formula text tokenizes, converts and resolves it, and discards
/// every previous binding. Binding a variable updates its slot in place, so the
/// next evaluation reads the new value without recompiling.
#[derive(Debug, Clone)]
pub struct Expression {
    catalog: Arc<Catalog>,
    compiled: Option<Compiled>,
    variables: VariableTable,
}

impl Default for Expression {
    fn default() -> Self {
        Self::with_catalog(Catalog::standard())
    }
}

impl Expression {
    /// An expression without a formula, using the standard catalog.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            compiled: None,
            variables: VariableTable::default(),
        }
    }

    /// Compile `text` with the standard catalog.
    pub fn parse(text: &str) -> FormulaResult<Self> {
        let mut expression = Self::new();
        expression.set_formula(text)?;
        Ok(expression)
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Replace the formula text.
    ///
    /// On failure the previous formula and its bindings are left untouched.
    pub fn set_formula(&mut self, text: &str) -> FormulaResult<()> {
        let mut variables = VariableTable::default();
        let compiled = compile(text, &self.catalog, &mut variables).inspect_err(|e| {
            tracing::debug!(formula = text, error = %e, "formula rejected");
        })?;

        tracing::debug!(
            formula = text,
            postfix = %lexer::render(&compiled.postfix),
            variables = variables.len(),
            "formula compiled"
        );
        self.compiled = Some(compiled);
        self.variables = variables;
        Ok(())
    }

    /// The formula text as it was set.
    pub fn formula(&self) -> Option<&str> {
        self.compiled.as_ref().map(|c| c.text.as_str())
    }

    /// Normalised infix text, one space between lexemes.
    pub fn infix(&self) -> Option<String> {
        self.compiled.as_ref().map(|c| lexer::render(&c.infix))
    }

    /// Postfix text, one space between lexemes.
    pub fn postfix(&self) -> Option<String> {
        self.compiled.as_ref().map(|c| lexer::render(&c.postfix))
    }

    /// Bind `name` to `value`, creating the variable on first use.
    ///
    /// Booleans are stored as booleans; they read as the 1.0/0.0 sentinels
    /// wherever a number is expected.
    pub fn bind(&mut self, name: &str, value: impl Into<Value>) {
        self.variables.bind(name, value.into());
    }

    /// Free variable names of the formula, each once, in order of first occurrence.
    pub fn variables(&self) -> FormulaResult<Vec<&str>> {
        let compiled = self.compiled.as_ref().ok_or(FormulaError::NoFormula)?;
        let mut names: Vec<&str> = Vec::new();
        for lexeme in &compiled.infix {
            let is_variable =
                lexeme.kind == LexemeKind::Name && self.catalog.is_operand(&lexeme.text);
            if is_variable && !names.contains(&lexeme.text.as_str()) {
                names.push(&lexeme.text);
            }
        }
        Ok(names)
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Numeric value of a variable, or NaN when it is unknown or not numeric.
    pub fn variable_value(&self, name: &str) -> f64 {
        self.variables
            .get(name)
            .and_then(Value::as_number)
            .unwrap_or(f64::NAN)
    }

    /// Numeric value of a variable, reporting unknown names and kind mismatches.
    pub fn try_variable_number(&self, name: &str) -> FormulaResult<f64> {
        let value = self
            .variables
            .get(name)
            .ok_or_else(|| FormulaError::UnknownVariable(name.to_string()))?;
        value.as_number().ok_or_else(|| {
            FormulaError::TypeError(format!("variable '{}' holds a {}", name, value.kind()))
        })
    }

    /// Evaluate to the raw result value.
    pub fn evaluate(&self) -> FormulaResult<Value> {
        let compiled = self.compiled.as_ref().ok_or(FormulaError::NoFormula)?;
        evaluator::evaluate(&compiled.tokens, &self.catalog, &self.variables).inspect_err(|e| {
            tracing::debug!(formula = %compiled.text, error = %e, "evaluation failed");
        })
    }

    /// Evaluate to a number; boolean results read as their sentinels.
    pub fn evaluate_number(&self) -> FormulaResult<f64> {
        let value = self.evaluate()?;
        value.as_number().ok_or_else(|| {
            FormulaError::TypeError(format!("result is a {}, not a number", value.kind()))
        })
    }

    /// Evaluate and compare the numeric result with the TRUE sentinel.
    pub fn evaluate_bool(&self) -> FormulaResult<bool> {
        Ok(self.evaluate_number()? == TRUE)
    }

    /// Drop every binding; the formula's variables become undefined again.
    pub fn clear_variables(&mut self) {
        let keep = self.compiled.as_ref().map_or(0, |c| c.referenced);
        self.variables.reset(keep);
    }

    /// Drop the formula and every binding.
    pub fn clear(&mut self) {
        self.compiled = None;
        self.variables = VariableTable::default();
    }
}

fn compile(
    text: &str,
    catalog: &Catalog,
    variables: &mut VariableTable,
) -> FormulaResult<Compiled> {
    let infix = lexer::tokenize(text)?;
    let postfix = to_postfix(&infix, catalog)?;
    let tokens = resolve(&postfix, catalog, variables)?;
    Ok(Compiled {
        text: text.to_string(),
        infix,
        postfix,
        tokens,
        referenced: variables.len(),
    })
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.formula().unwrap_or_default())?;
        for (i, variable) in self.variables.iter().enumerate() {
            f.write_str(if i == 0 { "; " } else { ", " })?;
            write!(f, "{} = {}", variable.name, variable.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::catalog::Keyword;
    use crate::formula::dispatch::Rule;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_precedence_examples() {
        let expr = Expression::parse("1 + 2 * 3").unwrap();
        assert!((expr.evaluate_number().unwrap() - 7.0).abs() < f64::EPSILON);

        let expr = Expression::parse("(1 + 2) * 3").unwrap();
        assert!((expr.evaluate_number().unwrap() - 9.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_division_by_zero() {
        let expr = Expression::parse("5 / 0").unwrap();
        assert!(expr.evaluate_number().unwrap().is_nan());
    }

    #[test]
    fn test_formula_and_postfix_text() {
        let expr = Expression::parse("a+b *2").unwrap();
        assert_eq!(expr.formula(), Some("a+b *2"));
        assert_eq!(expr.infix().as_deref(), Some("a + b * 2"));
        assert_eq!(expr.postfix().as_deref(), Some("a b 2 * +"));
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let expr = Expression::parse("contains('abCd','cd')").unwrap();
        assert!(expr.evaluate_bool().unwrap());

        let mut expr = Expression::parse("contains('abcd', a)").unwrap();
        expr.bind("a", "Cd");
        assert!(expr.evaluate_bool().unwrap());

        let mut expr = Expression::parse("Contains('abCd', a)").unwrap();
        expr.bind("a", "Ab");
        assert!(expr.evaluate_bool().unwrap());
    }

    #[test]
    fn test_variables_in_first_occurrence_order() {
        let expr = Expression::parse("b * a + abs(a) - b / c").unwrap();
        assert_eq!(expr.variables().unwrap(), vec!["b", "a", "c"]);

        let expr = Expression::parse("a + a * b").unwrap();
        assert_eq!(expr.variables().unwrap(), vec!["a", "b"]);

        let expr = Expression::parse("if(x > 1, 2) else(true)").unwrap();
        assert_eq!(expr.variables().unwrap(), vec!["x"]);
    }

    #[test]
    fn test_variables_without_formula() {
        assert_eq!(Expression::new().variables(), Err(FormulaError::NoFormula));
        assert_eq!(Expression::new().evaluate(), Err(FormulaError::NoFormula));
    }

    #[test]
    fn test_rebinding_reads_new_value() {
        let mut expr = Expression::parse("x * 2").unwrap();
        expr.bind("x", 3.0);
        let first = expr.evaluate_number().unwrap();

        expr.bind("x", 5.0);
        let second = expr.evaluate_number().unwrap();

        assert!((first - 6.0).abs() < f64::EPSILON);
        assert!((second - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unbound_variable_is_nan() {
        let expr = Expression::parse("x + 1").unwrap();
        assert!(expr.evaluate_number().unwrap().is_nan());
        assert!(expr.variable_value("x").is_nan());
    }

    #[test]
    fn test_chain_elseif_branch() {
        let mut expr = Expression::parse("if(a, 0) elseif(b, 1) else(0)").unwrap();
        expr.bind("a", false);
        expr.bind("b", true);
        assert!((expr.evaluate_number().unwrap() - 1.0).abs() < f64::EPSILON);
        assert!(expr.evaluate_bool().unwrap());

        let mut expr = Expression::parse("if(a, 1) elseif(b, 7) else(0)").unwrap();
        expr.bind("a", false);
        expr.bind("b", true);
        assert!((expr.evaluate_number().unwrap() - 7.0).abs() < f64::EPSILON);
        assert!(!expr.evaluate_bool().unwrap());
    }

    #[test]
    fn test_new_formula_clears_bindings() {
        let mut expr = Expression::parse("a + 1").unwrap();
        expr.bind("a", 4.0);
        expr.bind("extra", 1.0);

        expr.set_formula("a * 2").unwrap();
        assert!(expr.variable_value("a").is_nan());
        assert_eq!(expr.variable("extra"), None);
        assert!(expr.evaluate_number().unwrap().is_nan());
    }

    #[test]
    fn test_failed_compile_keeps_previous_state() {
        let mut expr = Expression::parse("a + 1").unwrap();
        expr.bind("a", 4.0);

        let result = expr.set_formula("a +");
        assert!(result.is_err());
        assert_eq!(expr.formula(), Some("a + 1"));
        assert!((expr.evaluate_number().unwrap() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_compilation_errors() {
        assert_eq!(
            Expression::parse("").unwrap_err(),
            FormulaError::EmptyExpression
        );
        assert!(matches!(
            Expression::parse("contains('abc, x)"),
            Err(FormulaError::UnterminatedText(_))
        ));
        assert!(matches!(
            Expression::parse("(1 + 2"),
            Err(FormulaError::UnbalancedParentheses(_))
        ));
        assert!(matches!(
            Expression::parse("nosuch(1)"),
            Err(FormulaError::UnknownFunction(_))
        ));
        assert!(Expression::parse("1 + 2 @").unwrap_err().is_compilation());
    }

    #[test]
    fn test_variable_lookup() {
        let mut expr = Expression::parse("a + b").unwrap();
        expr.bind("a", 2.5);
        expr.bind("b", "text");
        expr.bind("flag", true);

        assert!((expr.variable_value("a") - 2.5).abs() < f64::EPSILON);
        assert!(expr.variable_value("b").is_nan());
        assert!(expr.variable_value("missing").is_nan());
        assert!((expr.variable_value("flag") - 1.0).abs() < f64::EPSILON);

        assert!((expr.try_variable_number("a").unwrap() - 2.5).abs() < f64::EPSILON);
        assert!(matches!(
            expr.try_variable_number("b"),
            Err(FormulaError::TypeError(_))
        ));
        assert_eq!(
            expr.try_variable_number("missing"),
            Err(FormulaError::UnknownVariable("missing".to_string()))
        );
    }

    #[test]
    fn test_result_kind() {
        let expr = Expression::parse("'a' + 'b'").unwrap();
        assert!(matches!(
            expr.evaluate_number(),
            Err(FormulaError::TypeError(_))
        ));
        assert_eq!(expr.evaluate().unwrap(), Value::from("ab"));

        let expr = Expression::parse("2 > 1").unwrap();
        assert!((expr.evaluate_number().unwrap() - TRUE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rebinding_with_new_kind() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let mut expr = Expression::parse("t + minutes(1) > t").unwrap();
        expr.bind("t", 1.0);
        assert!(matches!(
            expr.evaluate(),
            Err(FormulaError::NoMatchingRule { .. })
        ));

        expr.bind("t", start);
        assert!(expr.evaluate_bool().unwrap());
    }

    #[test]
    fn test_clear_variables() {
        let mut expr = Expression::parse("a + 1").unwrap();
        expr.bind("a", 1.0);
        expr.bind("other", 2.0);
        expr.clear_variables();

        assert!(expr.variable_value("a").is_nan());
        assert_eq!(expr.variable("other"), None);
        expr.bind("a", 2.0);
        assert!((expr.evaluate_number().unwrap() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clear() {
        let mut expr = Expression::parse("a + 1").unwrap();
        expr.bind("a", 1.0);
        expr.clear();

        assert_eq!(expr.formula(), None);
        assert_eq!(expr.postfix(), None);
        assert_eq!(expr.variable("a"), None);
        assert_eq!(expr.evaluate(), Err(FormulaError::NoFormula));
    }

    #[test]
    fn test_display() {
        let mut expr = Expression::parse("a + b").unwrap();
        expr.bind("a", 1.0);
        expr.bind("b", "x");
        assert_eq!(expr.to_string(), "a + b; a = 1, b = 'x'");
    }

    #[test]
    fn test_custom_catalog() {
        let catalog = Catalog::builder()
            .with_standard_keywords()
            .register(Keyword::function(
                "cube",
                1,
                vec![Rule::NumberToNumber(|x| x * x * x)],
                "Third power",
            ))
            .build()
            .unwrap();
        let mut expr = Expression::with_catalog(Arc::new(catalog));
        expr.set_formula("cube(x) + 1").unwrap();
        expr.bind("x", 2.0);
        assert!((expr.evaluate_number().unwrap() - 9.0).abs() < f64::EPSILON);

        // the standard catalog does not know it
        assert!(matches!(
            Expression::parse("cube(2)"),
            Err(FormulaError::UnknownFunction(_))
        ));
    }
}
