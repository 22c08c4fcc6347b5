use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

/// Returned by the parser for any token that can't be used as an infix
/// operator. Below every valid precedence, including the minimum of 0.
pub const NOT_AN_OPERATOR: i32 = -1;

// structural characters that can never be rebound as binary operators
const RESERVED: &[char] = &['(', ')', ',', ';', '#', '.'];

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum PrecedenceError {
    #[error("`{0}` can't be used as a binary operator")]
    InvalidOperator(char),
    #[error("invalid operator binding `{0}`, expected OP=PRECEDENCE")]
    InvalidBinding(String),
}

lazy_static! {
    static ref BINDING_RE: Regex = Regex::new(r"^\s*(?P<op>\S)\s*=\s*(?P<prec>-?\d+)\s*$").unwrap();
}

/// Binary operator precedences; higher binds tighter.
#[derive(Debug, PartialEq, Clone)]
pub struct PrecedenceTable {
    operator_precedence: HashMap<char, i32>,
}

impl std::default::Default for PrecedenceTable {
    fn default() -> Self {
        let mut operator_precedence = HashMap::new();
        operator_precedence.insert('<', 10);
        operator_precedence.insert('+', 20);
        operator_precedence.insert('-', 20);
        operator_precedence.insert('*', 40);
        Self {
            operator_precedence,
        }
    }
}

impl PrecedenceTable {
    /// An empty table; nothing parses as an infix operator until bound.
    pub fn new() -> Self {
        Self {
            operator_precedence: HashMap::new(),
        }
    }

    /// The precedence of `op`, or `None` if it is unbound or bound to a
    /// non-positive value.
    pub fn lookup(&self, op: char) -> Option<i32> {
        match self.operator_precedence.get(&op) {
            Some(&prec) if prec > 0 => Some(prec),
            _ => None,
        }
    }

    /// Binds `op` to `precedence`, returning the previous binding.
    ///
    /// A non-positive precedence is stored but disables the operator, the
    /// same as leaving it unbound.
    pub fn set(&mut self, op: char, precedence: i32) -> Result<Option<i32>, PrecedenceError> {
        if !op.is_ascii_punctuation() || RESERVED.contains(&op) {
            return Err(PrecedenceError::InvalidOperator(op));
        }
        Ok(self.operator_precedence.insert(op, precedence))
    }

    pub fn remove(&mut self, op: char) -> Option<i32> {
        self.operator_precedence.remove(&op)
    }

    /// Operators currently usable as infix, tightest first.
    pub fn operators(&self) -> Vec<(char, i32)> {
        let mut ops: Vec<(char, i32)> = self
            .operator_precedence
            .iter()
            .filter(|&(_, &prec)| prec > 0)
            .map(|(&op, &prec)| (op, prec))
            .collect();
        ops.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ops
    }

    /// Applies a textual binding such as `^=30`.
    pub fn apply_binding(&mut self, binding: &str) -> Result<Option<i32>, PrecedenceError> {
        let (op, prec) = parse_binding(binding)?;
        self.set(op, prec)
    }
}

/// Parses `OP=PRECEDENCE`, e.g. `/=40` or `< = -1`.
pub fn parse_binding(binding: &str) -> Result<(char, i32), PrecedenceError> {
    let invalid = || PrecedenceError::InvalidBinding(binding.to_string());

    let cap = BINDING_RE.captures(binding).ok_or_else(invalid)?;
    let op = cap["op"].chars().next().ok_or_else(invalid)?;
    let prec = cap["prec"].parse().map_err(|_| invalid())?;
    Ok((op, prec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_table_has_baseline() {
        let table = PrecedenceTable::default();
        assert_eq!(table.lookup('<'), Some(10));
        assert_eq!(table.lookup('+'), Some(20));
        assert_eq!(table.lookup('-'), Some(20));
        assert_eq!(table.lookup('*'), Some(40));
        assert_eq!(table.lookup('/'), None);
    }

    #[test]
    fn non_positive_is_not_an_operator() {
        let mut table = PrecedenceTable::new();
        table.set('^', 0).unwrap();
        table.set('%', -5).unwrap();
        assert_eq!(table.lookup('^'), None);
        assert_eq!(table.lookup('%'), None);
        assert!(table.operators().is_empty());
    }

    #[test]
    fn rebinding_returns_previous() {
        let mut table = PrecedenceTable::default();
        assert_eq!(table.set('+', 50), Ok(Some(20)));
        assert_eq!(table.lookup('+'), Some(50));
        assert_eq!(table.remove('+'), Some(50));
        assert_eq!(table.lookup('+'), None);
    }

    #[test]
    fn structural_characters_are_rejected() {
        let mut table = PrecedenceTable::new();
        for &op in &['(', ')', ',', ';', 'a', '1', ' ', 'é'] {
            assert_eq!(table.set(op, 10), Err(PrecedenceError::InvalidOperator(op)));
        }
    }

    #[test]
    fn operators_sorted_tightest_first() {
        let table = PrecedenceTable::default();
        assert_eq!(
            table.operators(),
            vec![('*', 40), ('+', 20), ('-', 20), ('<', 10)]
        );
    }

    #[test]
    fn parse_binding_works() {
        assert_eq!(parse_binding("/=40"), Ok(('/', 40)));
        assert_eq!(parse_binding(" ^ = -3 "), Ok(('^', -3)));
        assert!(parse_binding("+=").is_err());
        assert!(parse_binding("++=3").is_err());

        let mut table = PrecedenceTable::default();
        table.apply_binding("/=40").unwrap();
        assert_eq!(table.lookup('/'), Some(40));
    }
}
