//! Script operators that can be bound on a native class.

use std::fmt;

/// An overloadable script operator and its metamethod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Subtract,
    Negate,
    Multiply,
    Divide,
    Modulus,
    Power,
    Concatenate,
    Equals,
    LessThan,
    LessOrEqual,
    Call,
    Length,
}

impl Operator {
    /// Every bindable operator.
    pub const ALL: [Operator; 13] = [
        Operator::Add,
        Operator::Subtract,
        Operator::Negate,
        Operator::Multiply,
        Operator::Divide,
        Operator::Modulus,
        Operator::Power,
        Operator::Concatenate,
        Operator::Equals,
        Operator::LessThan,
        Operator::LessOrEqual,
        Operator::Call,
        Operator::Length,
    ];

    /// The metamethod key this operator is stored under.
    pub const fn metamethod(self) -> &'static str {
        match self {
            Operator::Add => "__add",
            Operator::Subtract => "__sub",
            Operator::Negate => "__unm",
            Operator::Multiply => "__mul",
            Operator::Divide => "__div",
            Operator::Modulus => "__mod",
            Operator::Power => "__pow",
            Operator::Concatenate => "__concat",
            Operator::Equals => "__eq",
            Operator::LessThan => "__lt",
            Operator::LessOrEqual => "__le",
            Operator::Call => "__call",
            Operator::Length => "__len",
        }
    }

    /// Look up the operator stored under a metamethod key.
    pub fn from_metamethod(name: &str) -> Option<Operator> {
        Operator::ALL.into_iter().find(|op| op.metamethod() == name)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.metamethod())
    }
}
