use crate::domain::{Interval, ParameterBox};

/// Represents a scalar function over a bounded parameter domain whose
/// simultaneous zeros are sought.
pub trait ConstraintFunction {
    /// Returns the number of parameters the function depends on.
    fn dimension(&self) -> usize;

    /// The box the function is defined over.
    fn domain(&self) -> &ParameterBox;

    /// Evaluates the function at a parameter vector (global coordinates).
    fn evaluate(&self, params: &[f64]) -> f64;

    /// Returns an interval that contains every value the function takes
    /// inside `region`. Must be conservative.
    fn bound(&self, region: &ParameterBox) -> Interval;

    /// Partial derivative with respect to parameter `axis`.
    fn derive(&self, axis: usize) -> Self
    where
        Self: Sized;
}
