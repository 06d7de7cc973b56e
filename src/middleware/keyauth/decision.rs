//! What to do once every extractor has been tried without success.
//!
//! Kept free of I/O so the outcome table can be tested on its own.

use super::AuthError;
use crate::error::BoxError;

/// The rejection class for a request no candidate authenticated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Failure {
    /// No extractor produced a candidate.
    Missing,
    /// At least one candidate reached the validator and was refused.
    Invalid,
}

impl Failure {
    /// The cause recorded when no concrete error is available.
    pub(crate) fn marker(self) -> AuthError {
        match self {
            Self::Missing => AuthError::MissingKey,
            Self::Invalid => AuthError::InvalidKey,
        }
    }
}

/// The most recent failures seen while walking the extractors.
#[derive(Default)]
pub(crate) struct Attempts {
    extraction: Option<BoxError>,
    validation: Option<BoxError>,
}

impl Attempts {
    pub(crate) fn extraction_failed(&mut self, err: BoxError) {
        self.extraction = Some(err);
    }

    pub(crate) fn validation_failed(&mut self, err: BoxError) {
        self.validation = Some(err);
    }

    /// Validation failures take precedence over extraction failures.
    pub(crate) fn into_failure(self) -> (Failure, Option<BoxError>) {
        match (self.validation, self.extraction) {
            (Some(err), _) => (Failure::Invalid, Some(err)),
            (None, err) => (Failure::Missing, err),
        }
    }
}

/// What a configured error handler made of the failure.
pub(crate) enum Handled {
    /// No handler ran; the cause is still available.
    Unhandled(Option<BoxError>),
    /// The handler returned `Ok(())`.
    Suppressed,
    /// The handler returned an error of its own.
    Replaced(BoxError),
}

pub(crate) enum Verdict {
    /// Carry on with the rest of the chain.
    Continue,
    /// Abort with this error as given.
    Abort(BoxError),
    /// Abort with the default rejection for `Failure`.
    Reject(Failure, BoxError),
}

pub(crate) fn decide(failure: Failure, handled: Handled, continue_on_ignored: bool) -> Verdict {
    match handled {
        Handled::Replaced(err) => Verdict::Abort(err),
        Handled::Suppressed if continue_on_ignored => Verdict::Continue,
        Handled::Suppressed => Verdict::Reject(failure, Box::new(failure.marker())),
        Handled::Unhandled(cause) => {
            Verdict::Reject(failure, cause.unwrap_or_else(|| Box::new(failure.marker())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(msg: &str) -> BoxError {
        msg.to_owned().into()
    }

    #[test]
    fn validation_failure_outranks_extraction_failure() {
        let mut attempts = Attempts::default();
        attempts.extraction_failed(boxed("no header"));
        attempts.validation_failed(boxed("bad key"));
        attempts.extraction_failed(boxed("no query"));
        let (failure, cause) = attempts.into_failure();
        assert_eq!(failure, Failure::Invalid);
        assert_eq!(cause.unwrap().to_string(), "bad key");
    }

    #[test]
    fn last_extraction_failure_is_kept() {
        let mut attempts = Attempts::default();
        attempts.extraction_failed(boxed("first"));
        attempts.extraction_failed(boxed("second"));
        let (failure, cause) = attempts.into_failure();
        assert_eq!(failure, Failure::Missing);
        assert_eq!(cause.unwrap().to_string(), "second");

        let (failure, cause) = Attempts::default().into_failure();
        assert_eq!(failure, Failure::Missing);
        assert!(cause.is_none());
    }

    #[test]
    fn replaced_error_aborts_regardless_of_flag() {
        for flag in [true, false] {
            let verdict = decide(Failure::Invalid, Handled::Replaced(boxed("custom")), flag);
            assert!(matches!(verdict, Verdict::Abort(e) if e.to_string() == "custom"));
        }
    }

    #[test]
    fn suppressed_error_continues_only_when_allowed() {
        assert!(matches!(decide(Failure::Missing, Handled::Suppressed, true), Verdict::Continue));

        let Verdict::Reject(failure, cause) = decide(Failure::Invalid, Handled::Suppressed, false) else {
            panic!("expected a rejection");
        };
        assert_eq!(failure, Failure::Invalid);
        assert_eq!(cause.to_string(), AuthError::InvalidKey.to_string());
    }

    #[test]
    fn unhandled_error_is_rejected_even_with_flag() {
        let Verdict::Reject(failure, cause) =
            decide(Failure::Missing, Handled::Unhandled(Some(boxed("no header"))), true)
        else {
            panic!("expected a rejection");
        };
        assert_eq!(failure, Failure::Missing);
        assert_eq!(cause.to_string(), "no header");

        let Verdict::Reject(_, cause) = decide(Failure::Missing, Handled::Unhandled(None), false) else {
            panic!("expected a rejection");
        };
        assert_eq!(cause.to_string(), "missing key");
    }
}
