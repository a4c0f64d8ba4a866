//! Bridging of callback-style activation to a blocking call.

pub mod rendezvous;

use std::time::Duration;

use crate::models::error::ActivationError;

pub use rendezvous::ActivationRendezvous;

/// What an OS completion callback delivers: a channel handle that may be
/// null, or a failure reported by the callback itself.
pub type CompletionResult<T> = Result<Option<T>, ActivationError>;

/// Wait on `rendezvous` and fold the delivered result into one outcome.
///
/// Timeout, callback failure and a null handle stay distinct variants.
pub fn await_completion<T: Send>(
    rendezvous: &ActivationRendezvous<CompletionResult<T>>,
    timeout: Duration,
) -> Result<T, ActivationError> {
    match rendezvous.wait(timeout) {
        None => Err(ActivationError::Timeout(timeout)),
        Some(Err(err)) => Err(err),
        Some(Ok(None)) => Err(ActivationError::NullChannel),
        Some(Ok(Some(handle))) => Ok(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_stay_distinct() {
        let timeout = Duration::from_millis(5);

        let pending = ActivationRendezvous::<CompletionResult<u32>>::new();
        assert_eq!(await_completion(&pending, timeout), Err(ActivationError::Timeout(timeout)));

        let null = ActivationRendezvous::<CompletionResult<u32>>::new();
        null.complete(Ok(None));
        assert_eq!(await_completion(&null, timeout), Err(ActivationError::NullChannel));

        let failed = ActivationRendezvous::<CompletionResult<u32>>::new();
        failed.complete(Err(ActivationError::PermissionDenied));
        assert_eq!(await_completion(&failed, timeout), Err(ActivationError::PermissionDenied));

        let ok = ActivationRendezvous::<CompletionResult<u32>>::new();
        ok.complete(Ok(Some(7)));
        assert_eq!(await_completion(&ok, timeout), Ok(7));
    }
}
