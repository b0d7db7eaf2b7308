//! Temporal validity for facts.
//!
//! A fact can be bounded in time (a tax rate that applies for one fiscal
//! year) or open-ended. Bounds are inclusive dates; a missing bound is
//! treated as unbounded on that side.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// The date window in which a fact holds. `[from, to]`, both inclusive,
/// either side optional.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use terrafact::ValidityWindow;
///
/// let window = ValidityWindow::unbounded();
/// assert!(window.is_valid_on(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidityWindow {
    /// First date the fact holds (inclusive). None = unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,

    /// Last date the fact holds (inclusive). None = unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
}

impl ValidityWindow {
    /// A window with no bounds: valid on every date.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self { from: None, to: None }
    }

    /// A window starting at `from`, open-ended.
    #[must_use]
    pub const fn starting(from: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: None,
        }
    }

    /// A bounded window.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidValidityWindow` if `from > to`.
    pub fn between(from: NaiveDate, to: NaiveDate) -> Result<Self, ValidationError> {
        if from > to {
            return Err(ValidationError::InvalidValidityWindow { from, to });
        }
        Ok(Self {
            from: Some(from),
            to: Some(to),
        })
    }

    /// Builds a window from optional bounds, validating their order.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidValidityWindow` if both bounds are
    /// present and `from > to`.
    pub fn from_bounds(
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Self, ValidationError> {
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(ValidationError::InvalidValidityWindow { from: f, to: t });
            }
        }
        Ok(Self { from, to })
    }

    /// Whether the window contains the given date.
    #[must_use]
    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |f| date >= f) && self.to.map_or(true, |t| date <= t)
    }

    /// Whether neither bound is set.
    pub const fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

impl std::fmt::Display for ValidityWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.from, self.to) {
            (None, None) => write!(f, "[.., ..]"),
            (Some(from), None) => write!(f, "[{from}, ..]"),
            (None, Some(to)) => write!(f, "[.., {to}]"),
            (Some(from), Some(to)) => write!(f, "[{from}, {to}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_unbounded_contains_everything() {
        let w = ValidityWindow::unbounded();
        assert!(w.is_valid_on(d(1990, 1, 1)));
        assert!(w.is_valid_on(d(2100, 12, 31)));
        assert!(w.is_unbounded());
    }

    #[test]
    fn test_bounded_window() {
        let w = ValidityWindow::between(d(2026, 1, 1), d(2026, 12, 31)).unwrap();
        assert!(w.is_valid_on(d(2026, 1, 1)));
        assert!(w.is_valid_on(d(2026, 6, 15)));
        assert!(w.is_valid_on(d(2026, 12, 31)));
        assert!(!w.is_valid_on(d(2027, 1, 1)));
        assert!(!w.is_valid_on(d(2025, 12, 31)));
    }

    #[test]
    fn test_between_rejects_inverted_bounds() {
        assert!(ValidityWindow::between(d(2026, 6, 1), d(2026, 1, 1)).is_err());
    }

    #[test]
    fn test_from_bounds() {
        let w = ValidityWindow::from_bounds(Some(d(2026, 1, 1)), None).unwrap();
        assert!(w.is_valid_on(d(2030, 1, 1)));
        assert!(!w.is_valid_on(d(2025, 1, 1)));

        assert!(ValidityWindow::from_bounds(Some(d(2026, 6, 1)), Some(d(2026, 1, 1))).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ValidityWindow::unbounded()), "[.., ..]");
        let w = ValidityWindow::starting(d(2026, 1, 1));
        assert_eq!(format!("{w}"), "[2026-01-01, ..]");
    }
}
