//! Tagged numeric values
//!
//! Numbers cross the boundary as a tagged union of fixed integer and float
//! widths. Extraction is lossless or it fails: asking for a representation
//! that cannot hold the stored value exactly is a checked `NumericLoss`
//! error, never a silent truncation.

use crate::error::{ObjectError, ObjectResult};
use serde::Serialize;
use std::fmt;

/// Width/representation tag of a stored number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumberType {
    /// 8-bit signed integer
    I8,
    /// 16-bit signed integer
    I16,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
}

impl NumberType {
    /// Tag name (for diagnostics)
    pub const fn name(self) -> &'static str {
        match self {
            NumberType::I8 => "i8",
            NumberType::I16 => "i16",
            NumberType::I32 => "i32",
            NumberType::I64 => "i64",
            NumberType::F32 => "f32",
            NumberType::F64 => "f64",
        }
    }
}

impl fmt::Display for NumberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A number value with its representation tag
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NumberValue {
    /// 8-bit signed integer
    I8(i8),
    /// 16-bit signed integer
    I16(i16),
    /// 32-bit signed integer
    I32(i32),
    /// 64-bit signed integer
    I64(i64),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
}

impl NumberValue {
    /// Get the representation tag of this value
    pub const fn number_type(self) -> NumberType {
        match self {
            NumberValue::I8(_) => NumberType::I8,
            NumberValue::I16(_) => NumberType::I16,
            NumberValue::I32(_) => NumberType::I32,
            NumberValue::I64(_) => NumberType::I64,
            NumberValue::F32(_) => NumberType::F32,
            NumberValue::F64(_) => NumberType::F64,
        }
    }

    /// Extract as `i64`, failing on any loss
    pub fn to_i64(self) -> ObjectResult<i64> {
        match self {
            NumberValue::I8(v) => Ok(v as i64),
            NumberValue::I16(v) => Ok(v as i64),
            NumberValue::I32(v) => Ok(v as i64),
            NumberValue::I64(v) => Ok(v),
            NumberValue::F32(v) => integral_float(v as f64, self, NumberType::I64),
            NumberValue::F64(v) => integral_float(v, self, NumberType::I64),
        }
    }

    /// Extract as `i32`, failing on any loss
    pub fn to_i32(self) -> ObjectResult<i32> {
        let wide = self.to_i64().map_err(|_| self.loss(NumberType::I32))?;
        i32::try_from(wide).map_err(|_| self.loss(NumberType::I32))
    }

    /// Extract as `f64`, failing on any loss
    pub fn to_f64(self) -> ObjectResult<f64> {
        match self {
            NumberValue::I8(v) => Ok(v as f64),
            NumberValue::I16(v) => Ok(v as f64),
            NumberValue::I32(v) => Ok(v as f64),
            NumberValue::I64(v) => {
                let converted = v as f64;
                if converted as i64 == v {
                    Ok(converted)
                } else {
                    Err(self.loss(NumberType::F64))
                }
            }
            NumberValue::F32(v) => Ok(v as f64),
            NumberValue::F64(v) => Ok(v),
        }
    }

    /// Extract as `f32`, failing on any loss
    pub fn to_f32(self) -> ObjectResult<f32> {
        match self {
            NumberValue::F32(v) => Ok(v),
            other => {
                let wide = other.to_f64().map_err(|_| other.loss(NumberType::F32))?;
                let narrow = wide as f32;
                // NaN narrows to NaN without loss of meaning
                if narrow as f64 == wide || (wide.is_nan() && narrow.is_nan()) {
                    Ok(narrow)
                } else {
                    Err(other.loss(NumberType::F32))
                }
            }
        }
    }

    fn loss(self, requested: NumberType) -> ObjectError {
        ObjectError::NumericLoss {
            stored: self.number_type(),
            requested,
        }
    }
}

fn integral_float(value: f64, stored: NumberValue, requested: NumberType) -> ObjectResult<i64> {
    // i64::MAX is not exactly representable as f64; the exclusive upper
    // bound 2^63 is
    if value.fract() == 0.0 && value >= i64::MIN as f64 && value < (1u64 << 63) as f64 {
        Ok(value as i64)
    } else {
        Err(ObjectError::NumericLoss {
            stored: stored.number_type(),
            requested,
        })
    }
}

impl fmt::Display for NumberValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumberValue::I8(v) => write!(f, "{v}"),
            NumberValue::I16(v) => write!(f, "{v}"),
            NumberValue::I32(v) => write!(f, "{v}"),
            NumberValue::I64(v) => write!(f, "{v}"),
            NumberValue::F32(v) => write!(f, "{v}"),
            NumberValue::F64(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widening_is_lossless() {
        assert_eq!(NumberValue::I8(-5).to_i64().unwrap(), -5);
        assert_eq!(NumberValue::I16(300).to_i32().unwrap(), 300);
        assert_eq!(NumberValue::I32(i32::MAX).to_i64().unwrap(), i32::MAX as i64);
    }

    #[test]
    fn test_integer_narrowing_overflow_fails() {
        let err = NumberValue::I64(1 << 40).to_i32().unwrap_err();
        assert_eq!(
            err,
            ObjectError::NumericLoss {
                stored: NumberType::I64,
                requested: NumberType::I32,
            }
        );
    }

    #[test]
    fn test_integral_float_extracts_as_integer() {
        assert_eq!(NumberValue::F64(42.0).to_i64().unwrap(), 42);
        assert_eq!(NumberValue::F32(-8.0).to_i32().unwrap(), -8);
    }

    #[test]
    fn test_fractional_float_to_integer_fails() {
        assert!(NumberValue::F64(1.5).to_i64().is_err());
        assert!(NumberValue::F32(0.25).to_i32().is_err());
    }

    #[test]
    fn test_large_i64_to_f64_fails() {
        // 2^53 + 1 is the first integer f64 cannot hold
        let value = (1i64 << 53) + 1;
        assert!(NumberValue::I64(value).to_f64().is_err());
        assert!(NumberValue::I64(1 << 53).to_f64().is_ok());
    }

    #[test]
    fn test_f64_to_f32_checks_round_trip() {
        assert_eq!(NumberValue::F64(0.5).to_f32().unwrap(), 0.5);
        assert!(NumberValue::F64(std::f64::consts::PI).to_f32().is_err());
    }

    #[test]
    fn test_number_type_tags() {
        assert_eq!(NumberValue::I32(1).number_type(), NumberType::I32);
        assert_eq!(NumberValue::F64(1.0).number_type(), NumberType::F64);
        assert_eq!(NumberType::F32.to_string(), "f32");
    }
}
