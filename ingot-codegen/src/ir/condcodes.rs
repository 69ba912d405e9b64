//! Condition codes for conditional branches.

use core::fmt;

/// Comparison applied by a `cjmp` to its two operands.
///
/// The `Display` form is the operator symbol used by the textual IR.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum CondCode {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
}

impl CondCode {
    /// Get the inverse condition: the condition that is true exactly when
    /// this one is false.
    pub fn inverse(self) -> Self {
        match self {
            Self::Equal => Self::NotEqual,
            Self::NotEqual => Self::Equal,
            Self::LessThan => Self::GreaterThanOrEqual,
            Self::LessThanOrEqual => Self::GreaterThan,
            Self::GreaterThan => Self::LessThanOrEqual,
            Self::GreaterThanOrEqual => Self::LessThan,
        }
    }
}

impl fmt::Display for CondCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::CondCode;

    #[test]
    fn inverse_is_involution() {
        let all = [
            CondCode::Equal,
            CondCode::NotEqual,
            CondCode::LessThan,
            CondCode::LessThanOrEqual,
            CondCode::GreaterThan,
            CondCode::GreaterThanOrEqual,
        ];
        for cc in all {
            assert_eq!(cc.inverse().inverse(), cc);
        }
    }
}
