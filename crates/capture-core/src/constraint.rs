//! Parameter constraints.
//!
//! A device describes the legal values of a parameter either as a range
//! (`minimum`, `maximum`, `increment`) or as an explicit collection. Every
//! parameter exposes a *required* constraint (hard legality) and a
//! *recommended* one (guidance only, never used to reject a value).

use std::fmt;

/// Relative tolerance applied when comparing floating-point values against
/// constraint bounds and collection members.
const VALUE_TOLERANCE: f64 = 1e-9;

/// Tolerance, in units of the increment, for the on-increment test.
const INCREMENT_TOLERANCE: f64 = 1e-6;

/// Kind of constraint a device reports for a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintType {
    /// No constraint.
    None,
    /// Bounds with an increment.
    Range,
    /// Explicit list of values.
    Collection,
    /// Region-of-interest limits.
    Rois,
    /// Pulse generator limits. Not resolved by this crate.
    Pulse,
    /// Modulation sequence limits. Not resolved by this crate.
    Modulations,
}

impl fmt::Display for ConstraintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConstraintType::None => "None",
            ConstraintType::Range => "Range",
            ConstraintType::Collection => "Collection",
            ConstraintType::Rois => "Rois",
            ConstraintType::Pulse => "Pulse",
            ConstraintType::Modulations => "Modulations",
        };
        f.write_str(label)
    }
}

/// Constraint category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintCategory {
    /// Hard legality.
    Required,
    /// Advisory only.
    Recommended,
}

impl fmt::Display for ConstraintCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintCategory::Required => f.write_str("Required"),
            ConstraintCategory::Recommended => f.write_str("Recommended"),
        }
    }
}

fn tolerance_for(value: f64) -> f64 {
    VALUE_TOLERANCE * value.abs().max(1.0)
}

/// Range constraint: `minimum ≤ v ≤ maximum`, on an `increment` grid from `minimum`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeConstraint {
    /// Smallest legal value.
    pub minimum: f64,
    /// Largest legal value.
    pub maximum: f64,
    /// Grid spacing; `0.0` admits any value inside the bounds.
    pub increment: f64,
}

impl RangeConstraint {
    /// Range from `minimum` to `maximum` on an `increment` grid.
    pub fn new(minimum: f64, maximum: f64, increment: f64) -> Self {
        Self {
            minimum,
            maximum,
            increment,
        }
    }

    /// Whether `value` is legal under this constraint.
    pub fn admits(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        let tol = tolerance_for(value);
        if value < self.minimum - tol || value > self.maximum + tol {
            return false;
        }
        if self.increment <= 0.0 {
            return true;
        }
        let steps = (value - self.minimum) / self.increment;
        (steps - steps.round()).abs() <= INCREMENT_TOLERANCE
    }
}

impl fmt::Display for RangeConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}] step {}",
            self.minimum, self.maximum, self.increment
        )
    }
}

/// Collection constraint: an ordered set of explicitly legal values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CollectionConstraint {
    /// Legal values, in device order.
    pub values: Vec<f64>,
}

impl CollectionConstraint {
    /// Collection of `values`.
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Whether `value` is one of the listed values.
    pub fn admits(&self, value: f64) -> bool {
        value.is_finite()
            && self
                .values
                .iter()
                .any(|allowed| (allowed - value).abs() <= tolerance_for(value))
    }
}

impl fmt::Display for CollectionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, "}}")
    }
}

/// A constraint of one of the two supported shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintDescriptor {
    /// Range constraint.
    Range(RangeConstraint),
    /// Collection constraint.
    Collection(CollectionConstraint),
}

impl ConstraintDescriptor {
    /// Whether `value` is legal under this constraint.
    pub fn admits(&self, value: f64) -> bool {
        match self {
            ConstraintDescriptor::Range(range) => range.admits(value),
            ConstraintDescriptor::Collection(collection) => collection.admits(value),
        }
    }

    /// Shape of this constraint.
    pub fn constraint_type(&self) -> ConstraintType {
        match self {
            ConstraintDescriptor::Range(_) => ConstraintType::Range,
            ConstraintDescriptor::Collection(_) => ConstraintType::Collection,
        }
    }
}

impl fmt::Display for ConstraintDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintDescriptor::Range(range) => range.fmt(f),
            ConstraintDescriptor::Collection(collection) => collection.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_admits_on_grid_values_only() {
        let range = RangeConstraint::new(1.0, 10.0, 0.5);
        assert!(range.admits(1.0));
        assert!(range.admits(10.0));
        assert!(range.admits(4.5));
        assert!(!range.admits(4.25));
        assert!(!range.admits(0.5));
        assert!(!range.admits(10.5));
    }

    #[test]
    fn range_tolerates_float_noise() {
        let range = RangeConstraint::new(0.0, 100.0, 0.1);
        // 0.1 * 3 is not exactly 0.3 in binary
        assert!(range.admits(0.1 * 3.0));
        assert!(range.admits(100.0 + 1e-12));
    }

    #[test]
    fn zero_increment_admits_any_value_in_bounds() {
        let range = RangeConstraint::new(-80.0, 25.0, 0.0);
        assert!(range.admits(-70.3));
        assert!(!range.admits(-81.0));
    }

    #[test]
    fn range_rejects_non_finite_values() {
        let range = RangeConstraint::new(0.0, 1.0, 0.0);
        assert!(!range.admits(f64::NAN));
        assert!(!range.admits(f64::INFINITY));
    }

    #[test]
    fn every_grid_point_is_admitted() {
        let range = RangeConstraint::new(0.03, 50.0, 0.01);
        // (50.0 - 0.03) / 0.01 increments
        for k in (0..=4997u32).step_by(97) {
            let value = range.minimum + f64::from(k) * range.increment;
            assert!(range.admits(value), "{} should be on grid", value);
        }
    }

    #[test]
    fn collection_admits_listed_values() {
        let collection = CollectionConstraint::new(vec![0.1, 2.0]);
        assert!(collection.admits(2.0));
        assert!(collection.admits(0.1));
        assert!(!collection.admits(1.0));
        assert_eq!(collection.to_string(), "{0.1, 2}");
    }

    #[test]
    fn descriptor_dispatches_by_shape() {
        let range = ConstraintDescriptor::Range(RangeConstraint::new(0.0, 3.0, 1.0));
        let collection = ConstraintDescriptor::Collection(CollectionConstraint::new(vec![1.0]));
        assert!(range.admits(2.0));
        assert!(!collection.admits(2.0));
        assert_eq!(range.constraint_type(), ConstraintType::Range);
        assert_eq!(collection.constraint_type(), ConstraintType::Collection);
    }
}
