//! Confidence values attached to facts and extraction candidates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A validated confidence score in `[0.0, 1.0]`.
///
/// # Examples
///
/// ```
/// use terrafact::Confidence;
///
/// let conf = Confidence::new(0.85).unwrap();
/// assert_eq!(conf.value(), 0.85);
/// assert!(Confidence::new(1.5).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Confidence(f64);

impl Confidence {
    /// Minimum valid confidence value.
    pub const MIN_VALUE: f64 = 0.0;

    /// Maximum valid confidence value.
    pub const MAX_VALUE: f64 = 1.0;

    /// Default confidence assigned to document-extract audit facts.
    pub const EXTRACTED: Self = Self(0.85);

    /// Creates a new confidence with validation.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::ConfidenceOutOfRange` if the value is
    /// not in [0.0, 1.0] or is not finite.
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() || !(Self::MIN_VALUE..=Self::MAX_VALUE).contains(&value) {
            return Err(ValidationError::ConfidenceOutOfRange { value });
        }
        Ok(Self(value))
    }

    /// Full confidence, used for user corrections.
    #[must_use]
    pub const fn certain() -> Self {
        Self(1.0)
    }

    /// Returns the confidence value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.0
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self(1.0)
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_valid_range() {
        assert!(Confidence::new(0.0).is_ok());
        assert!(Confidence::new(1.0).is_ok());
        assert!(Confidence::new(0.85).is_ok());
    }

    #[test]
    fn test_confidence_out_of_range() {
        assert!(Confidence::new(-0.1).is_err());
        assert!(Confidence::new(1.01).is_err());
        assert!(Confidence::new(f64::NAN).is_err());
    }

    #[test]
    fn test_confidence_certain() {
        assert_eq!(Confidence::certain().value(), 1.0);
    }

    #[test]
    fn test_confidence_display() {
        assert_eq!(format!("{}", Confidence::EXTRACTED), "0.85");
    }
}
