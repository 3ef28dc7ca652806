//! Evaluation support shared by WHERE and formula trees.

use std::cmp::Ordering;

use itemsql_storage::{ItemData, ItemDataPtr, ItemType, ITEM_ID_ANONY};

use crate::ast::{integer_item, ColumnBinding};
use crate::error::EvalError;
use crate::tree::NodeId;

/// Supplies column values (and EXISTS outcomes) for the row being evaluated.
pub trait EvalContext {
    fn column(&self, binding: ColumnBinding) -> Result<ItemDataPtr, EvalError>;

    /// Outcome of the EXISTS subquery held by WHERE node `node`.
    fn exists(&self, _node: NodeId) -> Result<bool, EvalError> {
        Err(EvalError::Subquery("EXISTS is not available here".to_string()))
    }
}

/// Context with no row; every column lookup fails. Used to fold constants.
pub struct ConstantContext;

impl EvalContext for ConstantContext {
    fn column(&self, binding: ColumnBinding) -> Result<ItemDataPtr, EvalError> {
        Err(EvalError::UnboundColumn(format!(
            "depth {} slot {}",
            binding.depth, binding.slot
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationKind {
    Unfixed,
    AlwaysConst,
    AlwaysTrue,
    AlwaysFalse,
}

/// What can be known about an expression before any row is read.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    pub kind: OptimizationKind,
    pub value: Option<ItemDataPtr>,
}

impl OptimizationResult {
    pub fn unfixed() -> Self {
        Self {
            kind: OptimizationKind::Unfixed,
            value: None,
        }
    }

    pub fn always(outcome: bool) -> Self {
        Self {
            kind: if outcome {
                OptimizationKind::AlwaysTrue
            } else {
                OptimizationKind::AlwaysFalse
            },
            value: None,
        }
    }

    /// A constant value. Boolean constants are reported as always true or
    /// always false.
    pub fn constant(value: ItemDataPtr) -> Self {
        let kind = match value.as_bool() {
            Some(true) => OptimizationKind::AlwaysTrue,
            Some(false) => OptimizationKind::AlwaysFalse,
            None => OptimizationKind::AlwaysConst,
        };
        Self {
            kind,
            value: Some(value),
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.kind != OptimizationKind::Unfixed
    }

    pub fn is_always_false(&self) -> bool {
        self.kind == OptimizationKind::AlwaysFalse
    }

    pub fn is_always_true(&self) -> bool {
        self.kind == OptimizationKind::AlwaysTrue
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOperator {
    Plus,
    Minus,
    Multiply,
    Divide,
}

impl ArithmeticOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithmeticOperator::Plus => "+",
            ArithmeticOperator::Minus => "-",
            ArithmeticOperator::Multiply => "*",
            ArithmeticOperator::Divide => "/",
        }
    }

    pub fn priority(self) -> u8 {
        match self {
            ArithmeticOperator::Plus | ArithmeticOperator::Minus => 15,
            ArithmeticOperator::Multiply | ArithmeticOperator::Divide => 20,
        }
    }

    /// Applies the operator. Integral operands stay integral (division
    /// truncates); any Double operand makes the result Double. A NULL
    /// operand yields NULL.
    pub fn apply(self, left: &ItemData, right: &ItemData) -> Result<ItemDataPtr, EvalError> {
        for operand in [left, right] {
            if !operand.item_type().is_numeric() {
                return Err(EvalError::NonNumeric {
                    operator: self.symbol(),
                    found: operand.item_type(),
                });
            }
        }
        if left.is_null() || right.is_null() {
            let item_type = if left.item_type() == ItemType::Double || right.item_type() == ItemType::Double {
                ItemType::Double
            } else {
                left.item_type()
            };
            return Ok(ItemData::null(ITEM_ID_ANONY, item_type));
        }

        if let (Some(a), Some(b)) = (left.as_integer(), right.as_integer()) {
            let value = match self {
                ArithmeticOperator::Plus => a + b,
                ArithmeticOperator::Minus => a - b,
                ArithmeticOperator::Multiply => a.saturating_mul(b),
                ArithmeticOperator::Divide => {
                    if b == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    a / b
                }
            };
            return Ok(integer_item(value));
        }

        let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
            return Ok(ItemData::null(ITEM_ID_ANONY, ItemType::Double));
        };
        let value = match self {
            ArithmeticOperator::Plus => a + b,
            ArithmeticOperator::Minus => a - b,
            ArithmeticOperator::Multiply => a * b,
            ArithmeticOperator::Divide => {
                if b == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                a / b
            }
        };
        Ok(ItemData::double(ITEM_ID_ANONY, value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOperator {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl CompareOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOperator::Equal => "=",
            CompareOperator::NotEqual => "<>",
            CompareOperator::Less => "<",
            CompareOperator::LessEqual => "<=",
            CompareOperator::Greater => ">",
            CompareOperator::GreaterEqual => ">=",
        }
    }

    /// Compares two items. NULL makes every comparison false. `=` and `<>`
    /// treat incomparable kinds as unequal; ordering them is an error.
    pub fn test(self, left: &ItemData, right: &ItemData) -> Result<bool, EvalError> {
        match self {
            CompareOperator::Equal => Ok(left.equals(right)),
            CompareOperator::NotEqual => Ok(match left.compare(right) {
                Ok(Some(ordering)) => ordering != Ordering::Equal,
                Ok(None) => false,
                Err(_) => !left.is_null() && !right.is_null(),
            }),
            _ => {
                let Some(ordering) = left.compare(right)? else {
                    return Ok(false);
                };
                Ok(match self {
                    CompareOperator::Less => ordering == Ordering::Less,
                    CompareOperator::LessEqual => ordering != Ordering::Greater,
                    CompareOperator::Greater => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemsql_storage::ItemValue;

    fn int(v: i32) -> ItemDataPtr {
        ItemData::int(ITEM_ID_ANONY, v)
    }

    #[test]
    fn integer_arithmetic_stays_integral() {
        let sum = ArithmeticOperator::Plus.apply(&int(2), &int(3)).unwrap();
        assert_eq!(sum.value(), &ItemValue::Int(5));
        let quotient = ArithmeticOperator::Divide.apply(&int(7), &int(2)).unwrap();
        assert_eq!(quotient.value(), &ItemValue::Int(3));
        let wide = ArithmeticOperator::Multiply
            .apply(&int(i32::MAX), &int(2))
            .unwrap();
        assert_eq!(wide.value(), &ItemValue::Uint64(2 * i32::MAX as u64));
    }

    #[test]
    fn double_operand_promotes() {
        let half = ItemData::double(ITEM_ID_ANONY, 0.5);
        let value = ArithmeticOperator::Multiply.apply(&int(3), &half).unwrap();
        assert_eq!(value.value(), &ItemValue::Double(1.5));
    }

    #[test]
    fn arithmetic_errors_and_nulls() {
        assert_eq!(
            ArithmeticOperator::Divide.apply(&int(1), &int(0)),
            Err(EvalError::DivisionByZero)
        );
        let text = ItemData::string(ITEM_ID_ANONY, "a");
        assert!(matches!(
            ArithmeticOperator::Plus.apply(&int(1), &text),
            Err(EvalError::NonNumeric { operator: "+", .. })
        ));
        let null = ItemData::null(ITEM_ID_ANONY, ItemType::Int);
        assert!(ArithmeticOperator::Plus.apply(&int(1), &null).unwrap().is_null());
    }

    #[test]
    fn comparisons() {
        assert!(CompareOperator::LessEqual.test(&int(3), &int(3)).unwrap());
        assert!(!CompareOperator::Greater.test(&int(3), &int(3)).unwrap());
        let text = ItemData::string(ITEM_ID_ANONY, "3");
        assert!(!CompareOperator::Equal.test(&int(3), &text).unwrap());
        assert!(CompareOperator::NotEqual.test(&int(3), &text).unwrap());
        assert!(CompareOperator::Less.test(&int(3), &text).is_err());
        let null = ItemData::null(ITEM_ID_ANONY, ItemType::Int);
        assert!(!CompareOperator::NotEqual.test(&int(3), &null).unwrap());
        assert!(!CompareOperator::Less.test(&int(3), &null).unwrap());
    }

    #[test]
    fn boolean_constants_fix_the_outcome() {
        assert!(OptimizationResult::constant(ItemData::bool(ITEM_ID_ANONY, false)).is_always_false());
        assert_eq!(
            OptimizationResult::constant(int(1)).kind,
            OptimizationKind::AlwaysConst
        );
        assert!(!OptimizationResult::unfixed().is_fixed());
    }
}
