use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use log::debug;

use crate::ast::{Expression, Function, Prototype};
use crate::codegen::Codegen;

/// Nested user-function calls allowed before evaluation gives up.
pub const MAX_CALL_DEPTH: usize = 256;

/// Expression nesting allowed in a definition, and across all active calls
/// while evaluating.
pub const MAX_EXPR_DEPTH: usize = 1024;

pub type NativeFn = fn(&[f64]) -> f64;

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum CodegenError {
    #[error("unknown variable referenced {0}")]
    UnknownVariable(String),
    #[error("unknown operator {0}")]
    UnknownOperator(char),
    #[error("unknown function {0}")]
    UnknownFunction(String),
    #[error("invalid number of args in call {0} expected {1} found {2}")]
    InvalidCall(String, usize, usize),
    #[error("no native function {0} for extern declaration")]
    UnknownExtern(String),
    #[error("extern {0} declared with {2} args but takes {1}")]
    InvalidExtern(String, usize, usize),
    #[error("can't redefine extern function {0}")]
    Redefinition(String),
    #[error("recursion deeper than {0} calls")]
    RecursionLimit(usize),
    #[error("expression nested deeper than {0} levels")]
    ExpressionTooDeep(usize),
}

#[derive(Clone)]
enum Callable {
    Native(usize, NativeFn),
    Defined(Rc<Function>),
}

impl Callable {
    fn arity(&self) -> usize {
        match self {
            Callable::Native(arity, _) => *arity,
            Callable::Defined(function) => function.prototype.args.len(),
        }
    }
}

fn native_functions() -> HashMap<&'static str, (usize, NativeFn)> {
    let natives: [(&'static str, usize, NativeFn); 15] = [
        ("sin", 1, |a| a[0].sin()),
        ("cos", 1, |a| a[0].cos()),
        ("tan", 1, |a| a[0].tan()),
        ("atan", 1, |a| a[0].atan()),
        ("sqrt", 1, |a| a[0].sqrt()),
        ("exp", 1, |a| a[0].exp()),
        ("log", 1, |a| a[0].ln()),
        ("fabs", 1, |a| a[0].abs()),
        ("floor", 1, |a| a[0].floor()),
        ("ceil", 1, |a| a[0].ceil()),
        ("pow", 2, |a| a[0].powf(a[1])),
        ("atan2", 2, |a| a[0].atan2(a[1])),
        ("fmod", 2, |a| a[0] % a[1]),
        ("putchard", 1, |a| {
            eprint!("{}", a[0] as u8 as char);
            0.0
        }),
        ("printd", 1, |a| {
            eprintln!("{}", a[0]);
            0.0
        }),
    ];

    natives
        .iter()
        .map(|&(name, arity, func)| (name, (arity, func)))
        .collect()
}

/// Tree-walking backend: every expression lowers to its `f64` value.
///
/// `extern` declarations bind to a fixed set of native math functions and
/// definitions are checked the way a compiling backend would check them,
/// before they can be called.
pub struct Evaluator {
    natives: HashMap<&'static str, (usize, NativeFn)>,
    functions: HashMap<String, Callable>,
    named_values: HashMap<String, f64>,
    call_depth: usize,
    expr_depth: usize,
}

impl std::default::Default for Evaluator {
    fn default() -> Self {
        Self {
            natives: native_functions(),
            functions: HashMap::new(),
            named_values: HashMap::new(),
            call_depth: 0,
            expr_depth: 0,
        }
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Checks names, arities and operators in `expr` against `params` and
    /// the functions known so far. `current` is the function being defined,
    /// which may call itself.
    fn check_expr(
        &self,
        expr: &Expression,
        params: &[String],
        current: &Prototype,
    ) -> Result<(), CodegenError> {
        match expr {
            Expression::Number(_) => Ok(()),
            Expression::Variable(name) => {
                if params.contains(name) {
                    Ok(())
                } else {
                    Err(CodegenError::UnknownVariable(name.clone()))
                }
            }
            Expression::Binary(op, left, right) => {
                if !matches!(*op, '+' | '-' | '*' | '/' | '<') {
                    return Err(CodegenError::UnknownOperator(*op));
                }
                self.check_expr(left, params, current)?;
                self.check_expr(right, params, current)
            }
            Expression::Call(callee, args) => {
                let arity = if *callee == current.name {
                    current.args.len()
                } else {
                    match self.functions.get(callee) {
                        Some(func) => func.arity(),
                        None => return Err(CodegenError::UnknownFunction(callee.clone())),
                    }
                };
                if arity != args.len() {
                    return Err(CodegenError::InvalidCall(callee.clone(), arity, args.len()));
                }
                for arg in args {
                    self.check_expr(arg, params, current)?;
                }
                Ok(())
            }
        }
    }

    fn eval(&mut self, expr: &Expression) -> Result<f64, CodegenError> {
        match expr {
            Expression::Number(value) => Ok(*value),
            Expression::Variable(name) => match self.named_values.get(name) {
                Some(&value) => Ok(value),
                None => Err(CodegenError::UnknownVariable(name.clone())),
            },
            Expression::Binary(op, left, right) => {
                let lhs = self.codegen_expr(left)?;
                let rhs = self.codegen_expr(right)?;

                match *op {
                    '+' => Ok(lhs + rhs),
                    '-' => Ok(lhs - rhs),
                    '*' => Ok(lhs * rhs),
                    '/' => Ok(lhs / rhs),
                    '<' => Ok(if lhs < rhs { 1.0 } else { 0.0 }),
                    _ => Err(CodegenError::UnknownOperator(*op)),
                }
            }
            Expression::Call(callee, args) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.codegen_expr(arg)?);
                }
                self.call(callee, &values)
            }
        }
    }

    /// Calls a declared or defined function by name.
    pub fn call(&mut self, name: &str, args: &[f64]) -> Result<f64, CodegenError> {
        let callable = match self.functions.get(name) {
            Some(callable) => callable.clone(),
            None => return Err(CodegenError::UnknownFunction(name.to_string())),
        };
        if callable.arity() != args.len() {
            return Err(CodegenError::InvalidCall(
                name.to_string(),
                callable.arity(),
                args.len(),
            ));
        }

        match callable {
            Callable::Native(_, func) => Ok(func(args)),
            Callable::Defined(function) => {
                if self.call_depth >= MAX_CALL_DEPTH {
                    return Err(CodegenError::RecursionLimit(MAX_CALL_DEPTH));
                }

                // later duplicates of a parameter name shadow earlier ones
                let frame = function
                    .prototype
                    .args
                    .iter()
                    .cloned()
                    .zip(args.iter().copied())
                    .collect();
                let saved = mem::replace(&mut self.named_values, frame);
                self.call_depth += 1;

                let res = self.codegen_expr(&function.body);

                self.call_depth -= 1;
                self.named_values = saved;
                res
            }
        }
    }

    /// Compiles a top-level expression wrapper, runs it and forgets it.
    pub fn run_anonymous(&mut self, function: &Function) -> Result<f64, CodegenError> {
        let name = self.compile_fn(function)?;
        let res = self.call(&name, &[]);
        self.functions.remove(&name);
        res
    }
}

impl Codegen for Evaluator {
    type Value = f64;
    type Function = String;
    type Error = CodegenError;

    fn codegen_expr(&mut self, expr: &Expression) -> Result<f64, CodegenError> {
        // the count carries through calls, so it bounds the whole evaluation
        if self.expr_depth >= MAX_EXPR_DEPTH {
            return Err(CodegenError::ExpressionTooDeep(MAX_EXPR_DEPTH));
        }
        self.expr_depth += 1;
        let res = self.eval(expr);
        self.expr_depth -= 1;
        res
    }

    fn compile_proto(&mut self, proto: &Prototype) -> Result<String, CodegenError> {
        let found = proto.args.len();

        if let Some(&(arity, func)) = self.natives.get(proto.name.as_str()) {
            // a definition already took the name, same as defining after the extern
            if let Some(Callable::Defined(_)) = self.functions.get(&proto.name) {
                return Err(CodegenError::Redefinition(proto.name.clone()));
            }
            if arity != found {
                return Err(CodegenError::InvalidExtern(proto.name.clone(), arity, found));
            }
            self.functions
                .insert(proto.name.clone(), Callable::Native(arity, func));
            debug!("bound extern {} to native function", proto.name);
            return Ok(proto.name.clone());
        }

        // redeclaring something already defined is fine as long as it agrees
        match self.functions.get(&proto.name) {
            Some(existing) if existing.arity() == found => Ok(proto.name.clone()),
            Some(existing) => Err(CodegenError::InvalidExtern(
                proto.name.clone(),
                existing.arity(),
                found,
            )),
            None => Err(CodegenError::UnknownExtern(proto.name.clone())),
        }
    }

    fn compile_fn(&mut self, function: &Function) -> Result<String, CodegenError> {
        let Function {
            prototype: proto,
            body,
        } = function;

        if let Some(Callable::Native(..)) = self.functions.get(&proto.name) {
            return Err(CodegenError::Redefinition(proto.name.clone()));
        }

        if body.depth() > MAX_EXPR_DEPTH {
            return Err(CodegenError::ExpressionTooDeep(MAX_EXPR_DEPTH));
        }
        self.check_expr(body, &proto.args, proto)?;

        self.functions.insert(
            proto.name.clone(),
            Callable::Defined(Rc::new(function.clone())),
        );
        debug!("defined function {}", proto.name);
        Ok(proto.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ASTNode;
    use crate::parser::parse_str;
    use crate::precedence::PrecedenceTable;
    use pretty_assertions::assert_eq;

    fn run(source: &str) -> Result<Vec<f64>, CodegenError> {
        let ast = parse_str(source, PrecedenceTable::default()).unwrap();
        let mut evaluator = Evaluator::new();
        let mut results = Vec::new();
        for node in &ast {
            match node {
                ASTNode::Function(func) if func.prototype.is_anonymous() => {
                    results.push(evaluator.run_anonymous(func)?)
                }
                node => {
                    evaluator.codegen(node)?;
                }
            }
        }
        Ok(results)
    }

    #[test]
    fn arithmetic_works() {
        assert_eq!(run("1 + 2 * 3; (1 + 2) * 3; 10 - 4 - 3").unwrap(), vec![7.0, 9.0, 3.0]);
    }

    #[test]
    fn less_than_yields_boolean_double() {
        assert_eq!(run("1 < 2; 2 < 1; 1 + 1 < 2").unwrap(), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn functions_and_externs() {
        assert_eq!(
            run("extern sqrt(x); def hyp(a b) sqrt(a*a + b*b); hyp(3, 4)").unwrap(),
            vec![5.0]
        );
    }

    #[test]
    fn functions_can_call_earlier_functions() {
        assert_eq!(
            run("def sq(x) x*x; def quad(x) sq(sq(x)); quad(2)").unwrap(),
            vec![16.0]
        );
    }

    #[test]
    fn duplicate_parameters_bind_last() {
        assert_eq!(run("def f(x x) x; f(1, 2)").unwrap(), vec![2.0]);
    }

    #[test]
    fn unknown_names_fail_at_definition() {
        assert_eq!(
            run("def f(x) y"),
            Err(CodegenError::UnknownVariable("y".to_string()))
        );
        assert_eq!(
            run("def f(x) g(x)"),
            Err(CodegenError::UnknownFunction("g".to_string()))
        );
        assert_eq!(
            run("extern nope(x)"),
            Err(CodegenError::UnknownExtern("nope".to_string()))
        );
    }

    #[test]
    fn arity_is_checked() {
        assert_eq!(
            run("def f(a b) a; f(1)"),
            Err(CodegenError::InvalidCall("f".to_string(), 2, 1))
        );
        assert_eq!(
            run("extern sin(a b)"),
            Err(CodegenError::InvalidExtern("sin".to_string(), 1, 2))
        );
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let mut table = PrecedenceTable::default();
        table.set('^', 30).unwrap();
        let ast = parse_str("2 ^ 3", table).unwrap();
        let mut evaluator = Evaluator::new();
        match &ast[0] {
            ASTNode::Function(func) => assert_eq!(
                evaluator.run_anonymous(func),
                Err(CodegenError::UnknownOperator('^'))
            ),
            node => panic!("unexpected node {:?}", node),
        }
    }

    #[test]
    fn natives_cannot_be_redefined() {
        assert_eq!(
            run("extern sin(x); def sin(x) x"),
            Err(CodegenError::Redefinition("sin".to_string()))
        );
    }

    #[test]
    fn natives_cannot_be_redefined_in_either_order() {
        let mut evaluator = Evaluator::new();
        let ast = parse_str("def sin(x) x; extern sin(x)", PrecedenceTable::default()).unwrap();
        assert_eq!(evaluator.codegen(&ast[0]), Ok("sin".to_string()));
        assert_eq!(
            evaluator.codegen(&ast[1]),
            Err(CodegenError::Redefinition("sin".to_string()))
        );
        // the definition is still the one that gets called
        assert_eq!(evaluator.call("sin", &[2.0]), Ok(2.0));
    }

    #[test]
    fn calls_share_the_stored_definition() {
        let mut evaluator = Evaluator::new();
        let ast = parse_str("def f(x) x * 2", PrecedenceTable::default()).unwrap();
        evaluator.codegen(&ast[0]).unwrap();
        let stored = match evaluator.functions.get("f") {
            Some(Callable::Defined(function)) => Rc::clone(function),
            _ => panic!("f is not a defined function"),
        };
        assert_eq!(Rc::strong_count(&stored), 2);

        assert_eq!(evaluator.call("f", &[3.0]), Ok(6.0));
        assert_eq!(Rc::strong_count(&stored), 2);
        match evaluator.functions.get("f") {
            Some(Callable::Defined(function)) => assert!(Rc::ptr_eq(function, &stored)),
            _ => panic!("f is not a defined function"),
        }
    }

    #[test]
    fn long_chains_evaluate_up_to_the_parse_bound() {
        let source = format!("1{}", "+1".repeat(255));
        assert_eq!(run(&source).unwrap(), vec![256.0]);
    }

    #[test]
    fn deep_expressions_are_rejected() {
        let mut expr = Expression::Number(1.0);
        for _ in 0..2 * MAX_EXPR_DEPTH {
            expr = Expression::binary('+', expr, Expression::Number(1.0));
        }

        let mut evaluator = Evaluator::new();
        assert_eq!(
            evaluator.codegen_expr(&expr),
            Err(CodegenError::ExpressionTooDeep(MAX_EXPR_DEPTH))
        );
        let function = Function::anonymous(expr);
        assert_eq!(
            evaluator.run_anonymous(&function),
            Err(CodegenError::ExpressionTooDeep(MAX_EXPR_DEPTH))
        );
        assert!(!evaluator.is_defined(&function.prototype.name));

        // the counter unwinds after a failure
        assert_eq!(
            evaluator.codegen_expr(&Expression::binary(
                '*',
                Expression::Number(3.0),
                Expression::Number(4.0),
            )),
            Ok(12.0)
        );
    }

    #[test]
    fn unbounded_recursion_is_stopped() {
        assert_eq!(
            run("def forever(x) forever(x + 1); forever(0)"),
            Err(CodegenError::RecursionLimit(MAX_CALL_DEPTH))
        );
    }

    #[test]
    fn anonymous_functions_are_forgotten() {
        let mut evaluator = Evaluator::new();
        let ast = parse_str("4 * 2", PrecedenceTable::default()).unwrap();
        if let ASTNode::Function(func) = &ast[0] {
            assert_eq!(evaluator.run_anonymous(func), Ok(8.0));
            assert!(!evaluator.is_defined(&func.prototype.name));
        }
    }
}
