use std::cmp::Ordering;
use std::fmt::Display;

/// A single field value inside a tuple. Nulls are represented as
/// `Option<TupleValue>` everywhere, the same way the access layer
/// stores them, so there is no Null variant here.
#[derive(Debug, Clone, PartialEq)]
pub enum TupleValue {
    Int(i32),
    Float(f32),
    String(String),
}

impl PartialOrd for TupleValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        // Ints and floats compare against each other numerically
        match (self, other) {
            (TupleValue::Int(a), TupleValue::Int(b)) => a.partial_cmp(b),
            (TupleValue::Float(a), TupleValue::Float(b)) => a.partial_cmp(b),
            (TupleValue::Int(a), TupleValue::Float(b)) => (*a as f32).partial_cmp(b),
            (TupleValue::Float(a), TupleValue::Int(b)) => a.partial_cmp(&(*b as f32)),
            (TupleValue::String(a), TupleValue::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Total order over nullable values, used by the sort and dedup operators.
/// Null sorts before everything; incomparable pairs (string vs number,
/// NaN) fall back to Equal so sorting never panics.
pub fn compare_values(a: &Option<TupleValue>, b: &Option<TupleValue>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
    }
}

impl Display for TupleValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TupleValue::Int(i) => write!(f, "{}", i),
            TupleValue::Float(v) => write!(f, "{}", v),
            TupleValue::String(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tuple_value_eq() {
        assert_eq!(TupleValue::Int(10), TupleValue::Int(10));
        assert_ne!(TupleValue::Int(10), TupleValue::Int(20));
        assert_eq!(TupleValue::Float(1.5), TupleValue::Float(1.5));
        assert_eq!(
            TupleValue::String("hello".to_string()),
            TupleValue::String("hello".to_string())
        );
        assert_ne!(TupleValue::Int(1), TupleValue::String("1".to_string()));
    }

    #[test]
    fn test_cross_type_numeric_cmp() {
        assert_eq!(
            TupleValue::Int(2).partial_cmp(&TupleValue::Float(2.0)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            TupleValue::Float(1.5).partial_cmp(&TupleValue::Int(2)),
            Some(Ordering::Less)
        );
        assert_eq!(
            TupleValue::Int(3).partial_cmp(&TupleValue::Float(2.5)),
            Some(Ordering::Greater)
        );
        assert_eq!(
            TupleValue::Int(3).partial_cmp(&TupleValue::String("3".to_string())),
            None
        );
    }

    #[test]
    fn test_compare_values_null_ordering() {
        assert_eq!(compare_values(&None, &None), Ordering::Equal);
        assert_eq!(compare_values(&None, &Some(TupleValue::Int(0))), Ordering::Less);
        assert_eq!(
            compare_values(&Some(TupleValue::Int(0)), &None),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(&Some(TupleValue::Int(1)), &Some(TupleValue::Int(2))),
            Ordering::Less
        );
    }
}
