use esprit_core::EspritError;

/// What a single stream attempt resolved to, fed to the outer retry loop.
/// Replaces exception-driven control flow per REDESIGN FLAGS: the streaming
/// loop returns one of these instead of throwing, and
/// [`crate::dispatcher::Dispatcher::dispatch`]'s outer loop dispatches on
/// the tag.
#[derive(Debug)]
pub enum StreamOutcome<T> {
    /// The attempt completed; carries the terminal response.
    Ok(T),
    /// HTTP 429. `retry_after_s` is the provider's `Retry-After` hint,
    /// defaulting to 60 when absent. Triggers account rotation without
    /// incrementing the attempt counter.
    RateLimited { retry_after_s: u64 },
    /// A transient, retryable failure (connect error, 5xx, Cloud-Code 400
    /// within its own retry budget). Sleeps with exponential backoff and
    /// increments the attempt counter.
    Retryable,
    /// Non-retryable; for Mode B, try the next model in the fallback chain
    /// before giving up.
    Fallback,
    /// Unrecoverable; surface to the caller.
    Fatal(EspritError),
}
