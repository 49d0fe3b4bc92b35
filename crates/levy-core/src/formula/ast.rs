//! Typed formula AST and its lowering from `evalexpr`'s operator tree.
//!
//! ```text
//!   "IF(subTotal > 10700, escala, 0.06)"
//!        │ evalexpr::build_operator_tree
//!        ▼
//!   RootNode ─ FunctionIdentifier(IF) ─ RootNode ─ Tuple[Gt, Var, Const]
//!        │ lower()
//!        ▼
//!   Call { If, [Binary{Gt, Variable, Number}, Variable, Number] }
//! ```
//!
//! The grammar is borrowed; the semantics are not. Only constructs listed in
//! [`Expr`] survive lowering, everything else becomes
//! [`FormulaError::Unsupported`].

use evalexpr::{Node, Operator};
use rust_decimal::Decimal;
use std::fmt;

use crate::error::{FormulaError, FormulaResult};
use crate::money::decimal_from_f64;
use crate::MAX_FORMULA_LENGTH;

/// A compiled formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(Decimal),
    Bool(bool),
    Variable(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Gt,
    Lt,
    Geq,
    Leq,
}

/// Built-in functions. Names are matched case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    If,
    And,
    Or,
    Not,
    Min,
    Max,
    Round,
    Abs,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        let function = match name.to_ascii_uppercase().as_str() {
            "IF" => Function::If,
            "AND" => Function::And,
            "OR" => Function::Or,
            "NOT" => Function::Not,
            "MIN" => Function::Min,
            "MAX" => Function::Max,
            "ROUND" => Function::Round,
            "ABS" => Function::Abs,
            _ => return None,
        };
        Some(function)
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Function::If => "IF",
            Function::And => "AND",
            Function::Or => "OR",
            Function::Not => "NOT",
            Function::Min => "MIN",
            Function::Max => "MAX",
            Function::Round => "ROUND",
            Function::Abs => "ABS",
        }
    }

    /// Accepted argument counts as `(min, max)`; `None` means variadic.
    pub const fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Function::If => (3, Some(3)),
            Function::And | Function::Or | Function::Min | Function::Max => (1, None),
            Function::Not | Function::Abs => (1, Some(1)),
            Function::Round => (1, Some(2)),
        }
    }

    fn check_arity(&self, found: usize) -> FormulaResult<()> {
        let (min, max) = self.arity();
        let fits = found >= min && max.map_or(true, |max| found <= max);
        if fits {
            return Ok(());
        }
        let expected = match max {
            Some(max) if max == min => min.to_string(),
            Some(max) => format!("{}-{}", min, max),
            None => format!("at least {}", min),
        };
        Err(FormulaError::Arity {
            function: self.name().to_string(),
            expected,
            found,
        })
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Expr {
    /// Nesting depth of the tree (a leaf is 1).
    pub fn depth(&self) -> usize {
        match self {
            Expr::Number(_) | Expr::Bool(_) | Expr::Variable(_) => 1,
            Expr::Neg(operand) => 1 + operand.depth(),
            Expr::Binary { lhs, rhs, .. } => 1 + lhs.depth().max(rhs.depth()),
            Expr::Call { args, .. } => 1 + args.iter().map(Expr::depth).max().unwrap_or(0),
        }
    }

    /// Variable names referenced anywhere in the tree, in first-use order.
    pub fn variables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expr::Variable(name) => {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
            Expr::Neg(operand) => operand.collect_variables(names),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_variables(names);
                rhs.collect_variables(names);
            }
            Expr::Call { args, .. } => args.iter().for_each(|arg| arg.collect_variables(names)),
            Expr::Number(_) | Expr::Bool(_) => {}
        }
    }
}

// =============================================================================
// Compilation
// =============================================================================

/// Parses and lowers formula text into an [`Expr`].
///
/// Fails with `Syntax` for unparsable or over-long text, `DepthExceeded`
/// when the tree nests deeper than `max_depth`, and `UnknownFunction` /
/// `Arity` / `Unsupported` for constructs outside the formula language.
pub fn compile(text: &str, max_depth: usize) -> FormulaResult<Expr> {
    let length = text.chars().count();
    if length > MAX_FORMULA_LENGTH {
        return Err(FormulaError::Syntax {
            formula: text.chars().take(32).chain("...".chars()).collect(),
            message: format!(
                "formula is {} characters long, the limit is {}",
                length, MAX_FORMULA_LENGTH
            ),
        });
    }

    check_float_literals(text)?;

    let tree = evalexpr::build_operator_tree(text).map_err(|e| FormulaError::Syntax {
        formula: text.to_string(),
        message: e.to_string(),
    })?;

    Lowering { text, max_depth }.lower(&tree, 0)
}

/// Significant digits a decimal-point literal keeps through the grammar's `f64`.
pub const MAX_FLOAT_LITERAL_DIGITS: usize = 15;

/// Rejects decimal-point literals the grammar would round. Integer literals
/// are parsed as `i64` and stay exact.
fn check_float_literals(text: &str) -> FormulaResult<()> {
    let bytes = text.as_bytes();
    let is_literal_byte = |b: u8| b.is_ascii_digit() || b == b'.';
    let mut start = 0;

    while start < bytes.len() {
        let inside_identifier =
            start > 0 && (bytes[start - 1].is_ascii_alphanumeric() || bytes[start - 1] == b'_');
        if !is_literal_byte(bytes[start]) || inside_identifier {
            start += 1;
            continue;
        }

        let end = bytes[start..]
            .iter()
            .position(|b| !is_literal_byte(*b))
            .map_or(bytes.len(), |offset| start + offset);
        let literal = &text[start..end];

        if literal.contains('.') {
            let digits = literal
                .trim_start_matches(&['0', '.'][..])
                .trim_end_matches('0')
                .bytes()
                .filter(u8::is_ascii_digit)
                .count();
            if digits > MAX_FLOAT_LITERAL_DIGITS {
                return Err(FormulaError::Syntax {
                    formula: text.to_string(),
                    message: format!(
                        "literal {} has more than {} significant digits",
                        literal, MAX_FLOAT_LITERAL_DIGITS
                    ),
                });
            }
        }
        start = end;
    }

    Ok(())
}

struct Lowering<'a> {
    text: &'a str,
    max_depth: usize,
}

impl Lowering<'_> {
    fn lower(&self, node: &Node, depth: usize) -> FormulaResult<Expr> {
        // Parentheses do not count towards nesting; unwrap them without
        // recursing so a long run of them cannot exhaust the stack.
        let mut node = node;
        while matches!(node.operator(), Operator::RootNode) {
            node = match node.children() {
                [] => return Err(self.syntax("empty expression")),
                [inner] => inner,
                _ => return Err(self.syntax("unexpected sequence of expressions")),
            };
        }

        let depth = depth + 1;
        if depth > self.max_depth {
            return Err(FormulaError::DepthExceeded {
                max: self.max_depth,
            });
        }

        match node.operator() {
            Operator::Add => self.binary(BinaryOp::Add, node, depth),
            Operator::Sub => self.binary(BinaryOp::Sub, node, depth),
            Operator::Mul => self.binary(BinaryOp::Mul, node, depth),
            Operator::Div => self.binary(BinaryOp::Div, node, depth),
            Operator::Mod => self.binary(BinaryOp::Mod, node, depth),
            Operator::Eq => self.binary(BinaryOp::Eq, node, depth),
            Operator::Neq => self.binary(BinaryOp::Neq, node, depth),
            Operator::Gt => self.binary(BinaryOp::Gt, node, depth),
            Operator::Lt => self.binary(BinaryOp::Lt, node, depth),
            Operator::Geq => self.binary(BinaryOp::Geq, node, depth),
            Operator::Leq => self.binary(BinaryOp::Leq, node, depth),

            Operator::And => self.operator_call(Function::And, node, depth),
            Operator::Or => self.operator_call(Function::Or, node, depth),
            Operator::Not => self.operator_call(Function::Not, node, depth),

            Operator::Neg => match node.children() {
                [operand] => Ok(Expr::Neg(Box::new(self.lower(operand, depth)?))),
                _ => Err(self.syntax("negation needs one operand")),
            },

            Operator::Const { value } => self.constant(value),

            Operator::VariableIdentifierRead { identifier } => {
                Ok(Expr::Variable(identifier.clone()))
            }

            Operator::FunctionIdentifier { identifier } => {
                let function =
                    Function::from_name(identifier).ok_or_else(|| FormulaError::UnknownFunction {
                        name: identifier.clone(),
                    })?;
                let arg_nodes = call_arguments(node);
                function.check_arity(arg_nodes.len())?;
                let args = arg_nodes
                    .into_iter()
                    .map(|arg| self.lower(arg, depth))
                    .collect::<FormulaResult<Vec<_>>>()?;
                Ok(Expr::Call { function, args })
            }

            Operator::Exp => Err(unsupported("exponentiation")),
            Operator::Tuple => Err(unsupported("tuple outside a function call")),
            Operator::Chain => Err(unsupported("expression chain")),
            _ => Err(unsupported("assignment")),
        }
    }

    fn binary(&self, op: BinaryOp, node: &Node, depth: usize) -> FormulaResult<Expr> {
        match node.children() {
            [lhs, rhs] => Ok(Expr::Binary {
                op,
                lhs: Box::new(self.lower(lhs, depth)?),
                rhs: Box::new(self.lower(rhs, depth)?),
            }),
            _ => Err(self.syntax("binary operator needs two operands")),
        }
    }

    /// `&&`, `||` and `!` lower onto the AND / OR / NOT functions.
    fn operator_call(&self, function: Function, node: &Node, depth: usize) -> FormulaResult<Expr> {
        let args = node
            .children()
            .iter()
            .map(|child| self.lower(child, depth))
            .collect::<FormulaResult<Vec<_>>>()?;
        function.check_arity(args.len())?;
        Ok(Expr::Call { function, args })
    }

    fn constant(&self, value: &evalexpr::Value) -> FormulaResult<Expr> {
        match value {
            evalexpr::Value::Int(int) => Ok(Expr::Number(Decimal::from(*int))),
            evalexpr::Value::Float(float) => decimal_from_f64(*float)
                .map(Expr::Number)
                .ok_or(FormulaError::Overflow),
            evalexpr::Value::Boolean(flag) => Ok(Expr::Bool(*flag)),
            evalexpr::Value::String(_) => Err(unsupported("string literal")),
            _ => Err(unsupported("tuple or empty literal")),
        }
    }

    fn syntax(&self, message: &str) -> FormulaError {
        FormulaError::Syntax {
            formula: self.text.to_string(),
            message: message.to_string(),
        }
    }
}

/// Argument nodes of a function call: `f(a, b)` parses as
/// `f → RootNode → Tuple[a, b]`, `f(a)` as `f → RootNode → a`.
fn call_arguments(node: &Node) -> Vec<&Node> {
    let mut current = match node.children() {
        [argument] => argument,
        _ => return Vec::new(),
    };

    loop {
        match (current.operator(), current.children()) {
            (Operator::RootNode, []) => return Vec::new(),
            (Operator::RootNode, [inner]) => current = inner,
            (Operator::Tuple, items) => return items.iter().collect(),
            _ => return vec![current],
        }
    }
}

fn unsupported(construct: &str) -> FormulaError {
    FormulaError::Unsupported {
        construct: construct.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_MAX_FORMULA_DEPTH;

    fn compile_default(text: &str) -> FormulaResult<Expr> {
        compile(text, DEFAULT_MAX_FORMULA_DEPTH)
    }

    #[test]
    fn test_lowers_if_call() {
        let expr = compile_default("IF(unitPrice > 2000, 0.02, 0.05)").unwrap();
        match expr {
            Expr::Call { function, args } => {
                assert_eq!(function, Function::If);
                assert_eq!(args.len(), 3);
                assert!(matches!(args[0], Expr::Binary { op: BinaryOp::Gt, .. }));
                assert_eq!(args[1], Expr::Number("0.02".parse().unwrap()));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_function_names_are_case_insensitive() {
        assert!(compile_default("if(1, 2, 3)").is_ok());
        assert!(compile_default("And(1, 0)").is_ok());
        assert!(compile_default("max(1, 2, 3)").is_ok());
    }

    #[test]
    fn test_logical_operators_map_to_functions() {
        let expr = compile_default("a > 1 && !b").unwrap();
        match expr {
            Expr::Call { function: Function::And, args } => {
                assert!(matches!(args[1], Expr::Call { function: Function::Not, .. }));
            }
            other => panic!("expected AND, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_function_and_arity() {
        assert_eq!(
            compile_default("SQRT(4)"),
            Err(FormulaError::UnknownFunction { name: "SQRT".into() })
        );
        assert!(matches!(
            compile_default("IF(1, 2)"),
            Err(FormulaError::Arity { found: 2, .. })
        ));
        assert!(matches!(
            compile_default("ABS(1, 2)"),
            Err(FormulaError::Arity { .. })
        ));
    }

    #[test]
    fn test_unsupported_constructs() {
        assert!(matches!(compile_default("2 ^ 3"), Err(FormulaError::Unsupported { .. })));
        assert!(matches!(compile_default("\"text\""), Err(FormulaError::Unsupported { .. })));
        assert!(matches!(compile_default("a = 1"), Err(FormulaError::Unsupported { .. })));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(compile_default("(1 + 2"), Err(FormulaError::Syntax { .. })));
        assert!(matches!(compile_default(""), Err(FormulaError::Syntax { .. })));

        let long = format!("1{}", " + 1".repeat(MAX_FORMULA_LENGTH));
        assert!(matches!(compile_default(&long), Err(FormulaError::Syntax { .. })));
    }

    #[test]
    fn test_depth_limit() {
        let nested = format!("{}1{}", "ABS(".repeat(10), ")".repeat(10));
        assert_eq!(compile_default(&nested).unwrap().depth(), 11);
        assert_eq!(compile(&nested, 5), Err(FormulaError::DepthExceeded { max: 5 }));

        // Parentheses alone do not nest.
        assert!(compile("((((((1))))))", 1).is_ok());
    }

    #[test]
    fn test_long_parenthesis_runs_do_not_recurse() {
        let wrapped = format!("{}1{}", "(".repeat(2000), ")".repeat(2000));
        assert_eq!(compile_default(&wrapped), Ok(Expr::Number(Decimal::ONE)));

        let negated = format!("{}1{}", "-(".repeat(100), ")".repeat(100));
        assert_eq!(
            compile_default(&negated),
            Err(FormulaError::DepthExceeded { max: DEFAULT_MAX_FORMULA_DEPTH })
        );
    }

    #[test]
    fn test_float_literal_precision_limit() {
        assert!(compile_default("0.123456789012345").is_ok());
        assert!(compile_default("0.000000123456789012345").is_ok());
        assert!(compile_default("12345678901234567").is_ok());
        assert!(compile_default("rate2 * 1.5").is_ok());
        assert!(compile_default("0.16000000000000000000").is_ok());

        assert!(matches!(
            compile_default("subTotal * 0.1234567890123456"),
            Err(FormulaError::Syntax { .. })
        ));
        assert!(matches!(
            compile_default("1234567890.123456"),
            Err(FormulaError::Syntax { .. })
        ));
    }

    #[test]
    fn test_collects_variables_in_order() {
        let expr = compile_default("IF(subTotal > 10700, escala, subTotal * 0.06)").unwrap();
        assert_eq!(expr.variables(), vec!["subTotal", "escala"]);
    }
}
