//! Conversion between JSON values and typed cells.

use ledger_store::Cell;
use serde_json::{Number, Value};

/// Converts a JSON scalar to a cell.
///
/// Returns `None` for booleans, arrays, objects and numbers that fit
/// neither `i64` nor `f64`.
pub fn cell_from_value(value: &Value) -> Option<Cell> {
    match value {
        Value::Null => Some(Cell::Null),
        Value::Number(n) => n
            .as_i64()
            .map(Cell::Integer)
            .or_else(|| n.as_f64().map(Cell::Real)),
        Value::String(s) => Some(Cell::Text(s.clone())),
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Converts a cell to JSON. Non-finite reals become `null`.
pub fn cell_to_value(cell: &Cell) -> Value {
    match cell {
        Cell::Null => Value::Null,
        Cell::Integer(v) => Value::from(*v),
        Cell::Real(v) => Number::from_f64(*v).map_or(Value::Null, Value::Number),
        Cell::Text(s) => Value::String(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_convert() {
        assert_eq!(cell_from_value(&json!(null)), Some(Cell::Null));
        assert_eq!(cell_from_value(&json!(12)), Some(Cell::Integer(12)));
        assert_eq!(cell_from_value(&json!(1.5)), Some(Cell::Real(1.5)));
        assert_eq!(cell_from_value(&json!("a")), Some(Cell::from("a")));
    }

    #[test]
    fn composites_do_not_convert() {
        assert_eq!(cell_from_value(&json!(true)), None);
        assert_eq!(cell_from_value(&json!([1])), None);
        assert_eq!(cell_from_value(&json!({"a": 1})), None);
    }

    #[test]
    fn cells_to_json() {
        assert_eq!(cell_to_value(&Cell::Integer(-3)), json!(-3));
        assert_eq!(cell_to_value(&Cell::from("x")), json!("x"));
        assert_eq!(cell_to_value(&Cell::Real(f64::NAN)), Value::Null);
    }
}
