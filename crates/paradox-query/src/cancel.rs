use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{QueryError, QueryResult};

/// Shared cancellation flag for one query.
///
/// Clones observe the same flag, so a token handed to another thread can stop a query that is
/// being driven elsewhere. Loops poll it through [`CancellationToken::check`].
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once [`CancellationToken::cancel`] has been called on any clone.
    #[inline]
    pub fn check(&self) -> QueryResult<()> {
        if self.is_cancelled() {
            Err(QueryError::Cancelled)
        } else {
            Ok(())
        }
    }
}
