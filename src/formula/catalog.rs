//! Operator and function catalog.
//!
//! The catalog is the immutable configuration every compiled expression
//! consults: the tokenizer-to-postfix step reads precedence, associativity and
//! arity, the resolver reads keyword identity and the evaluator reads dispatch
//! rules. It is built once and shared through an `Arc`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::TimeDelta;
use once_cell::sync::Lazy;

use crate::error::{FormulaError, FormulaResult};
use crate::formula::dispatch::{duration_from_units, Rule};
use crate::formula::value::TRUE;

const MS_PER_SECOND: f64 = 1_000.0;
const MS_PER_MINUTE: f64 = 60.0 * MS_PER_SECOND;
const MS_PER_HOUR: f64 = 60.0 * MS_PER_MINUTE;
const MS_PER_DAY: f64 = 24.0 * MS_PER_HOUR;

/// Precedence of the prefix negation operator (`-x` compiles to `neg`).
pub const NEGATION_PRECEDENCE: u8 = 7;

/// Keyword category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeywordKind {
    /// Infix operator such as `+` or `&&`.
    Operator,
    /// Function called with `name(arg, ...)`.
    Function,
    /// One link of an `if`/`elseif`/`else` chain, called like a function.
    Conditional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

/// Role of a conditional keyword in a flattened branch chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    If,
    ElseIf,
    Else,
}

impl Branch {
    /// Whether this link may directly follow the previous link of a chain.
    pub fn continues_chain(&self) -> bool {
        matches!(self, Branch::ElseIf | Branch::Else)
    }
}

/// What the evaluator does when it reaches the keyword.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Pick the first rule matching the operand kinds.
    Dispatch(Vec<Rule>),
    /// Branch selection with the conditional-depth counter.
    Branch(Branch),
}

/// Identifier of a keyword inside one catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeywordId(usize);

/// Keyword definition.
#[derive(Debug, Clone)]
pub struct Keyword {
    /// Canonical name
    pub name: &'static str,
    /// Alternative spellings, matched exactly like the name
    pub aliases: &'static [&'static str],
    pub kind: KeywordKind,
    /// Number of operands popped at evaluation time
    pub arity: usize,
    /// Binding strength; only meaningful for operators
    pub precedence: u8,
    pub associativity: Associativity,
    pub behavior: Behavior,
    pub description: &'static str,
}

impl Keyword {
    pub fn operator(
        name: &'static str,
        precedence: u8,
        associativity: Associativity,
        rules: Vec<Rule>,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            aliases: &[],
            kind: KeywordKind::Operator,
            arity: 2,
            precedence,
            associativity,
            behavior: Behavior::Dispatch(rules),
            description,
        }
    }

    pub fn function(
        name: &'static str,
        arity: usize,
        rules: Vec<Rule>,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            aliases: &[],
            kind: KeywordKind::Function,
            arity,
            precedence: 0,
            associativity: Associativity::Left,
            behavior: Behavior::Dispatch(rules),
            description,
        }
    }

    pub fn conditional(name: &'static str, branch: Branch, description: &'static str) -> Self {
        let arity = match branch {
            Branch::If | Branch::ElseIf => 2,
            Branch::Else => 1,
        };
        Self {
            name,
            aliases: &[],
            kind: KeywordKind::Conditional,
            arity,
            precedence: 0,
            associativity: Associativity::Left,
            behavior: Behavior::Branch(branch),
            description,
        }
    }

    pub fn with_aliases(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_precedence(mut self, precedence: u8) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn branch(&self) -> Option<Branch> {
        match self.behavior {
            Behavior::Branch(branch) => Some(branch),
            Behavior::Dispatch(_) => None,
        }
    }

    pub fn rules(&self) -> &[Rule] {
        match &self.behavior {
            Behavior::Dispatch(rules) => rules,
            Behavior::Branch(_) => &[],
        }
    }

    /// Human-readable call shape, e.g. `contains(a, b)` or `a + b`.
    pub fn signature(&self) -> String {
        const PARAMS: [&str; 4] = ["a", "b", "c", "d"];
        match self.kind {
            KeywordKind::Operator => format!("a {} b", self.name),
            KeywordKind::Function | KeywordKind::Conditional => {
                let params: Vec<&str> = PARAMS.iter().copied().cycle().take(self.arity).collect();
                format!("{}({})", self.name, params.join(", "))
            }
        }
    }

    fn validate(&self) -> FormulaResult<()> {
        let invalid = |message: String| FormulaError::InvalidKeyword {
            name: self.name.to_string(),
            message,
        };

        if self.arity == 0 {
            return Err(invalid("arity must be at least 1".to_string()));
        }
        if self.kind == KeywordKind::Operator && self.arity != 2 {
            return Err(invalid("operators take exactly two operands".to_string()));
        }
        match &self.behavior {
            Behavior::Dispatch(rules) => {
                if rules.is_empty() {
                    return Err(invalid("no dispatch rules".to_string()));
                }
                if let Some(rule) = rules.iter().find(|r| r.inputs().len() != self.arity) {
                    return Err(invalid(format!(
                        "rule takes {} operands but arity is {}",
                        rule.inputs().len(),
                        self.arity
                    )));
                }
            }
            Behavior::Branch(branch) => {
                let expected = if *branch == Branch::Else { 1 } else { 2 };
                if self.kind != KeywordKind::Conditional || self.arity != expected {
                    return Err(invalid("inconsistent conditional definition".to_string()));
                }
            }
        }
        Ok(())
    }
}

/// Public description of a keyword.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordInfo {
    pub name: String,
    pub aliases: Vec<String>,
    pub kind: KeywordKind,
    pub arity: u32,
    pub signature: String,
    pub description: String,
}

impl From<&Keyword> for KeywordInfo {
    fn from(keyword: &Keyword) -> Self {
        Self {
            name: keyword.name.to_string(),
            aliases: keyword.aliases.iter().map(|a| a.to_string()).collect(),
            kind: keyword.kind,
            arity: keyword.arity as u32,
            signature: keyword.signature(),
            description: keyword.description.to_string(),
        }
    }
}

/// Immutable keyword registry.
#[derive(Debug)]
pub struct Catalog {
    keywords: Vec<Keyword>,
    by_name: HashMap<&'static str, KeywordId>,
}

static STANDARD: Lazy<Arc<Catalog>> = Lazy::new(|| {
    let mut catalog = Catalog {
        keywords: Vec::new(),
        by_name: HashMap::new(),
    };
    for keyword in standard_keywords() {
        catalog.insert(keyword);
    }
    Arc::new(catalog)
});

impl Catalog {
    /// The shared standard catalog.
    pub fn standard() -> Arc<Catalog> {
        Arc::clone(&STANDARD)
    }

    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    pub fn lookup(&self, name: &str) -> Option<(KeywordId, &Keyword)> {
        self.by_name
            .get(name)
            .map(|&id| (id, &self.keywords[id.0]))
    }

    /// Keyword by id. Ids are only valid for the catalog that issued them.
    pub fn get(&self, id: KeywordId) -> &Keyword {
        &self.keywords[id.0]
    }

    pub fn is_keyword(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Whether a bare name stands for a value (a variable) rather than a keyword.
    pub fn is_operand(&self, name: &str) -> bool {
        !self.is_keyword(name)
    }

    pub fn keywords(&self) -> impl Iterator<Item = &Keyword> {
        self.keywords.iter()
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    // Callers have already checked names for uniqueness.
    fn insert(&mut self, keyword: Keyword) {
        let id = KeywordId(self.keywords.len());
        self.by_name.insert(keyword.name, id);
        for &alias in keyword.aliases {
            self.by_name.insert(alias, id);
        }
        self.keywords.push(keyword);
    }
}

/// Assembles a [`Catalog`], checking definitions when built.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    keywords: Vec<Keyword>,
}

impl CatalogBuilder {
    /// Add every keyword of the standard catalog.
    pub fn with_standard_keywords(mut self) -> Self {
        self.keywords.extend(standard_keywords());
        self
    }

    pub fn register(mut self, keyword: Keyword) -> Self {
        self.keywords.push(keyword);
        self
    }

    pub fn build(self) -> FormulaResult<Catalog> {
        let mut catalog = Catalog {
            keywords: Vec::with_capacity(self.keywords.len()),
            by_name: HashMap::new(),
        };
        for keyword in self.keywords {
            keyword.validate()?;
            let mut own = HashSet::new();
            let names = std::iter::once(keyword.name).chain(keyword.aliases.iter().copied());
            for name in names {
                if catalog.is_keyword(name) || !own.insert(name) {
                    return Err(FormulaError::DuplicateKeyword(name.to_string()));
                }
            }
            catalog.insert(keyword);
        }
        Ok(catalog)
    }
}

// ============================================================================
// Standard keywords
// ============================================================================

fn standard_keywords() -> Vec<Keyword> {
    let mut keywords = Vec::new();
    keywords.extend(arithmetic_operators());
    keywords.extend(comparison_operators());
    keywords.extend(logical_operators());
    keywords.extend(math_functions());
    keywords.extend(text_functions());
    keywords.extend(time_functions());
    keywords.extend(conditionals());
    keywords
}

fn arithmetic_operators() -> Vec<Keyword> {
    use Associativity::{Left, Right};
    vec![
        Keyword::operator(
            "+",
            5,
            Left,
            vec![
                Rule::NumberNumberToNumber(|a, b| a + b),
                Rule::TimeDurationToTime(|t, d| t.checked_add_signed(d)),
                Rule::DurationDurationToDuration(|a, b| a.checked_add(&b)),
                Rule::TextTextToText(|a, b| format!("{}{}", a, b)),
            ],
            "Addition, time shifting and text concatenation",
        ),
        Keyword::operator(
            "-",
            5,
            Left,
            vec![
                Rule::NumberNumberToNumber(|a, b| a - b),
                Rule::TimeTimeToDuration(|a, b| a.signed_duration_since(b)),
                Rule::TimeDurationToTime(|t, d| t.checked_sub_signed(d)),
                Rule::DurationDurationToDuration(|a, b| a.checked_sub(&b)),
            ],
            "Subtraction; the difference of two times is a duration",
        ),
        Keyword::operator(
            "*",
            6,
            Left,
            vec![
                Rule::NumberNumberToNumber(|a, b| a * b),
                Rule::DurationNumberToDuration(|d, factor| {
                    duration_from_units(d.num_milliseconds() as f64, factor)
                }),
                Rule::NumberDurationToDuration(|factor, d| {
                    duration_from_units(d.num_milliseconds() as f64, factor)
                }),
            ],
            "Multiplication",
        ),
        Keyword::operator(
            "/",
            6,
            Left,
            vec![Rule::NumberNumberToNumber(|a, b| {
                if b == 0.0 {
                    f64::NAN
                } else {
                    a / b
                }
            })],
            "Division; dividing by zero yields NaN",
        ),
        Keyword::operator(
            "^",
            8,
            Right,
            vec![Rule::NumberNumberToNumber(f64::powf)],
            "Exponentiation",
        ),
    ]
}

fn comparison_operators() -> Vec<Keyword> {
    use Associativity::Left;
    vec![
        Keyword::operator(
            "==",
            3,
            Left,
            vec![
                Rule::NumberNumberToBool(|a, b| a == b),
                Rule::BoolBoolToBool(|a, b| a == b),
                Rule::TextTextToBool(|a, b| a == b),
                Rule::TimeTimeToBool(|a, b| a == b),
                Rule::DurationDurationToBool(|a, b| a == b),
            ],
            "Equality",
        ),
        Keyword::operator(
            "!=",
            3,
            Left,
            vec![
                Rule::NumberNumberToBool(|a, b| a != b),
                Rule::BoolBoolToBool(|a, b| a != b),
                Rule::TextTextToBool(|a, b| a != b),
                Rule::TimeTimeToBool(|a, b| a != b),
                Rule::DurationDurationToBool(|a, b| a != b),
            ],
            "Inequality",
        ),
        Keyword::operator(
            "<",
            4,
            Left,
            vec![
                Rule::NumberNumberToBool(|a, b| a < b),
                Rule::TimeTimeToBool(|a, b| a < b),
                Rule::DurationDurationToBool(|a, b| a < b),
            ],
            "Less than",
        ),
        Keyword::operator(
            "<=",
            4,
            Left,
            vec![
                Rule::NumberNumberToBool(|a, b| a <= b),
                Rule::TimeTimeToBool(|a, b| a <= b),
                Rule::DurationDurationToBool(|a, b| a <= b),
            ],
            "Less than or equal",
        ),
        Keyword::operator(
            ">",
            4,
            Left,
            vec![
                Rule::NumberNumberToBool(|a, b| a > b),
                Rule::TimeTimeToBool(|a, b| a > b),
                Rule::DurationDurationToBool(|a, b| a > b),
            ],
            "Greater than",
        ),
        Keyword::operator(
            ">=",
            4,
            Left,
            vec![
                Rule::NumberNumberToBool(|a, b| a >= b),
                Rule::TimeTimeToBool(|a, b| a >= b),
                Rule::DurationDurationToBool(|a, b| a >= b),
            ],
            "Greater than or equal",
        ),
    ]
}

fn logical_operators() -> Vec<Keyword> {
    use Associativity::Left;
    vec![
        Keyword::operator(
            "&&",
            2,
            Left,
            vec![
                Rule::BoolBoolToBool(|a, b| a && b),
                Rule::NumberNumberToBool(|a, b| a == TRUE && b == TRUE),
            ],
            "Logical and",
        ),
        Keyword::operator(
            "||",
            1,
            Left,
            vec![
                Rule::BoolBoolToBool(|a, b| a || b),
                Rule::NumberNumberToBool(|a, b| a == TRUE || b == TRUE),
            ],
            "Logical or",
        ),
    ]
}

fn math_functions() -> Vec<Keyword> {
    vec![
        Keyword::function(
            "abs",
            1,
            vec![Rule::NumberToNumber(f64::abs)],
            "Absolute value",
        ),
        Keyword::function(
            "neg",
            1,
            vec![
                Rule::NumberToNumber(|x| -x),
                Rule::DurationToDuration(|d| Some(-d)),
            ],
            "Negation; `-x` is shorthand",
        )
        .with_precedence(NEGATION_PRECEDENCE),
        Keyword::function(
            "ln",
            1,
            vec![Rule::NumberToNumber(|x| if x <= 0.0 { f64::NAN } else { x.ln() })],
            "Natural logarithm; non-positive input yields NaN",
        ),
        Keyword::function(
            "sign",
            1,
            vec![Rule::NumberToNumber(|x| {
                if x.is_nan() {
                    f64::NAN
                } else if x >= 0.0 {
                    1.0
                } else {
                    -1.0
                }
            })],
            "1 for non-negative input, -1 otherwise",
        ),
        Keyword::function(
            "sqrt",
            1,
            vec![Rule::NumberToNumber(f64::sqrt)],
            "Square root",
        ),
        Keyword::function(
            "floor",
            1,
            vec![Rule::NumberToNumber(f64::floor)],
            "Rounds down to the nearest integer",
        ),
        Keyword::function(
            "ceil",
            1,
            vec![Rule::NumberToNumber(f64::ceil)],
            "Rounds up to the nearest integer",
        ),
        Keyword::function(
            "min",
            2,
            vec![Rule::NumberNumberToNumber(f64::min)],
            "The smaller of two values",
        ),
        Keyword::function(
            "max",
            2,
            vec![Rule::NumberNumberToNumber(f64::max)],
            "The larger of two values",
        ),
        Keyword::function(
            "round",
            2,
            vec![Rule::NumberNumberToNumber(round_to_digits)],
            "Rounds x to n decimal places",
        ),
    ]
}

/// Largest magnitude below which an f64 can still hold a fraction.
const FRACTION_LIMIT: f64 = 4_503_599_627_370_496.0;

fn round_to_digits(x: f64, digits: f64) -> f64 {
    let factor = 10_f64.powi(digits.clamp(-308.0, 308.0) as i32);
    let scaled = x * factor;
    // already an integer at this scale
    if !scaled.is_finite() || scaled.abs() >= FRACTION_LIMIT {
        return x;
    }
    scaled.round() / factor
}

fn text_functions() -> Vec<Keyword> {
    vec![
        Keyword::function(
            "contains",
            2,
            vec![Rule::TextTextToBool(|haystack, needle| {
                haystack.to_lowercase().contains(&needle.to_lowercase())
            })],
            "Case-insensitive substring test",
        )
        .with_aliases(&["Contains"]),
        Keyword::function(
            "startswith",
            2,
            vec![Rule::TextTextToBool(|text, prefix| {
                text.to_lowercase().starts_with(&prefix.to_lowercase())
            })],
            "Case-insensitive prefix test",
        )
        .with_aliases(&["StartsWith"]),
        Keyword::function(
            "endswith",
            2,
            vec![Rule::TextTextToBool(|text, suffix| {
                text.to_lowercase().ends_with(&suffix.to_lowercase())
            })],
            "Case-insensitive suffix test",
        )
        .with_aliases(&["EndsWith"]),
    ]
}

fn time_functions() -> Vec<Keyword> {
    vec![
        Keyword::function(
            "seconds",
            1,
            vec![Rule::NumberToDuration(|x| duration_from_units(x, MS_PER_SECOND))],
            "Duration of x seconds",
        )
        .with_aliases(&["Seconds"]),
        Keyword::function(
            "minutes",
            1,
            vec![Rule::NumberToDuration(|x| duration_from_units(x, MS_PER_MINUTE))],
            "Duration of x minutes",
        )
        .with_aliases(&["Minutes"]),
        Keyword::function(
            "hours",
            1,
            vec![Rule::NumberToDuration(|x| duration_from_units(x, MS_PER_HOUR))],
            "Duration of x hours",
        )
        .with_aliases(&["Hours"]),
        Keyword::function(
            "days",
            1,
            vec![Rule::NumberToDuration(|x| duration_from_units(x, MS_PER_DAY))],
            "Duration of x days",
        )
        .with_aliases(&["Days"]),
        Keyword::function(
            "totalminutes",
            1,
            vec![Rule::DurationToNumber(|d: TimeDelta| {
                d.num_milliseconds() as f64 / MS_PER_MINUTE
            })],
            "Length of a duration in minutes",
        )
        .with_aliases(&["TotalMinutes"]),
    ]
}

fn conditionals() -> Vec<Keyword> {
    vec![
        Keyword::conditional("if", Branch::If, "Yields the value when the condition holds"),
        Keyword::conditional(
            "elseif",
            Branch::ElseIf,
            "Yields the value when no earlier branch was taken and the condition holds",
        ),
        Keyword::conditional("else", Branch::Else, "Yields the value when no branch was taken"),
    ]
}
