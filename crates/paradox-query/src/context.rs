use crate::cancel::CancellationToken;
use crate::collation::Locale;

/// Ambient settings for executing one query.
#[derive(Clone, Debug, Default)]
pub struct EvalContext {
    pub locale: Locale,
    cancellation: CancellationToken,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    /// Use `token` so the caller can cancel the query from elsewhere.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}
