//! Value model: the `ValueType` lattice (spec.md §4.1) and the runtime
//! `RuleValue` carried between AST nodes during evaluation.

use serde::{Deserialize, Serialize};

/// Element classification as exposed by the cube (spec.md §3 `Element`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementType {
    Numeric,
    String,
    Consolidated,
}

impl ElementType {
    pub fn is_base(self) -> bool {
        !matches!(self, ElementType::Consolidated)
    }
}

/// The value-type lattice every AST node carries (spec.md §4.1). `Stet` and
/// `Continue` are control-flow tokens, not data: "this cell's final value is
/// the base storage value, skip all remaining rules" / "this rule declines,
/// try the next rule".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Unknown,
    Numeric,
    String,
    Stet,
    Continue,
}

/// The value an AST node yields for one cell path (spec.md §4.1
/// `RuleValueType`). Arithmetic consumes `Stet`/`Continue` as numeric zero
/// (§4.1), but the evaluator (C5) detects them at the top before that
/// happens — see `evaluator.rs`.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleValue {
    pub value_type: ValueType,
    pub double_value: f64,
    pub string_value: String,
}

impl RuleValue {
    pub fn numeric(v: f64) -> Self {
        RuleValue {
            value_type: ValueType::Numeric,
            double_value: v,
            string_value: String::new(),
        }
    }

    pub fn string(v: impl Into<String>) -> Self {
        RuleValue {
            value_type: ValueType::String,
            double_value: 0.0,
            string_value: v.into(),
        }
    }

    pub fn stet() -> Self {
        RuleValue {
            value_type: ValueType::Stet,
            double_value: 0.0,
            string_value: String::new(),
        }
    }

    pub fn continue_() -> Self {
        RuleValue {
            value_type: ValueType::Continue,
            double_value: 0.0,
            string_value: String::new(),
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self.value_type, ValueType::Stet | ValueType::Continue)
    }

    /// Arithmetic operators never consume control tokens as numeric zero —
    /// design notes §9 — they propagate as-is. This helper is only used by
    /// leaf/scalar contexts that need a best-effort numeric reading
    /// (e.g. aggregate parameters), matching `FunctionNodeAggregate.h`'s
    /// "if v1.type == NUMERIC" guard which silently skips non-numeric
    /// parameters rather than coercing them.
    pub fn as_numeric(&self) -> Option<f64> {
        match self.value_type {
            ValueType::Numeric => Some(self.double_value),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self.value_type {
            ValueType::String => Some(&self.string_value),
            _ => None,
        }
    }
}

/// The raw value stored in a cube cell: a plain numeric/string pair with no
/// control-flow tokens, what `Cube::get_cell_value` (spec.md §6) returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Numeric(f64),
    String(String),
}

impl CellValue {
    pub fn as_rule_value(&self) -> RuleValue {
        match self {
            CellValue::Numeric(v) => RuleValue::numeric(*v),
            CellValue::String(s) => RuleValue::string(s.clone()),
        }
    }
}

/// The final projected result of a rule evaluation, tagged with the winning
/// rule's id (spec.md §4.5 step 4). `rule_id = None` is the `NO_RULE`
/// sentinel used for `STET`/`CONTINUE` short-circuits.
#[derive(Debug, Clone, PartialEq)]
pub struct CellResult {
    pub value_type: ValueType,
    pub double_value: f64,
    pub string_value: String,
    pub rule_id: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_tokens_are_control() {
        assert!(RuleValue::stet().is_control());
        assert!(RuleValue::continue_().is_control());
        assert!(!RuleValue::numeric(1.0).is_control());
    }

    #[test]
    fn as_numeric_only_for_numeric() {
        assert_eq!(RuleValue::numeric(4.0).as_numeric(), Some(4.0));
        assert_eq!(RuleValue::string("x").as_numeric(), None);
        assert_eq!(RuleValue::stet().as_numeric(), None);
    }
}
