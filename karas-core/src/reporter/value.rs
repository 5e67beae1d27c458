//! Observation values.
//!
//! A [`Value`] always owns its data. Converting a collaborator's tensor into
//! an [`ArrayValue`] copies it to host memory, which is what keeps the
//! observation map free of compute-graph or device handles.

use serde::{Deserialize, Serialize};

use crate::error::{KarasError, Result};

/// An owned, host-side copy of an array or image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl ArrayValue {
    /// Build an array, checking that `data` fills `shape` exactly.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(KarasError::config(format!(
                "array of shape {shape:?} needs {expected} elements, got {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// A zero-dimensional array holding one element.
    pub fn scalar(value: f32) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Zero-dimensional arrays are treated as scalars by summaries.
    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty() && self.data.len() == 1
    }
}

/// A single reported observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Scalar(#[serde(with = "crate::persistence::float")] f64),
    Array(ArrayValue),
    /// A value with an explicit summary weight.
    Weighted {
        value: Box<Value>,
        weight: Box<Value>,
    },
}

impl Value {
    /// The scalar content of this value, if it has one.
    ///
    /// Weighted values are not scalars themselves; summaries unpack them.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(x) => Some(*x),
            Value::Array(a) if a.is_scalar() => Some(f64::from(a.data[0])),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.as_scalar().is_some()
    }

    pub fn weighted(value: impl Into<Value>, weight: impl Into<Value>) -> Self {
        Value::Weighted {
            value: Box::new(value.into()),
            weight: Box::new(weight.into()),
        }
    }
}

macro_rules! impl_from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(x: $t) -> Self {
                    Value::Scalar(x as f64)
                }
            }
        )*
    };
}

impl_from_number!(f64, f32, i32, i64, u32, u64, usize);

impl From<ArrayValue> for Value {
    fn from(a: ArrayValue) -> Self {
        Value::Array(a)
    }
}

impl From<&ArrayValue> for Value {
    fn from(a: &ArrayValue) -> Self {
        Value::Array(a.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_shape_check() {
        assert!(ArrayValue::new(vec![2, 3], vec![0.0; 6]).is_ok());
        let err = ArrayValue::new(vec![2, 3], vec![0.0; 5]).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_zero_dim_array_is_scalar() {
        let v = Value::from(ArrayValue::scalar(0.5));
        assert_eq!(v.as_scalar(), Some(0.5));

        let image = Value::from(ArrayValue::new(vec![1, 2, 2], vec![0.0; 4]).unwrap());
        assert_eq!(image.as_scalar(), None);
    }

    #[test]
    fn test_weighted_is_not_scalar() {
        let v = Value::weighted(2.0, 3);
        assert!(!v.is_scalar());
    }

    #[test]
    fn test_untagged_json_shape() {
        let json = serde_json::to_string(&Value::from(1.5)).unwrap();
        assert_eq!(json, "1.5");
        let back: Value = serde_json::from_str(r#"{"shape":[1],"data":[2.0]}"#).unwrap();
        assert!(matches!(back, Value::Array(_)));
    }

    #[test]
    fn test_non_finite_scalar_roundtrip() {
        let json = serde_json::to_string(&Value::from(f64::NAN)).unwrap();
        assert_eq!(json, r#""NaN""#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert!(back.as_scalar().is_some_and(f64::is_nan));

        let weighted = Value::weighted(f64::INFINITY, 2.0);
        let value = serde_json::to_value(&weighted).unwrap();
        let back: Value = serde_json::from_value(value).unwrap();
        assert_eq!(back, weighted);
    }
}
