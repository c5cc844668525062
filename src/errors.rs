//! Aggregation of independent failures.
//!
//! Triggering, skipping and aborting all attempt every item and report the
//! failures together, so one bad job never hides the outcome of the others.
//!
//! The rendered form is stable: a single error renders as its own message,
//! several render as `[first, second, ...]` in the order they were collected.

use std::error::Error as StdError;
use std::fmt;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Several errors reported as one.
#[derive(Debug)]
pub struct AggregateError {
    errors: Vec<BoxError>,
}

impl AggregateError {
    /// Wraps the given errors. Returns `None` when there are none, so callers
    /// can write `AggregateError::from_errors(errs).map_or(Ok(()), Err)`.
    pub fn from_errors<I, E>(errors: I) -> Option<Self>
    where
        I: IntoIterator<Item = E>,
        E: Into<BoxError>,
    {
        let errors: Vec<BoxError> = errors.into_iter().map(Into::into).collect();
        if errors.is_empty() {
            None
        } else {
            Some(AggregateError { errors })
        }
    }

    /// `Ok(())` when there are no errors, otherwise the aggregate.
    pub fn check<I, E>(errors: I) -> Result<(), Self>
    where
        I: IntoIterator<Item = E>,
        E: Into<BoxError>,
    {
        match Self::from_errors(errors) {
            None => Ok(()),
            Some(aggregate) => Err(aggregate),
        }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> impl Iterator<Item = &(dyn StdError + Send + Sync + 'static)> {
        self.errors.iter().map(|e| e.as_ref())
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [only] = self.errors.as_slice() {
            return write!(f, "{}", only);
        }
        write!(f, "[")?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", err)?;
        }
        write!(f, "]")
    }
}

impl StdError for AggregateError {}
