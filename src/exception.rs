//! Panic-recovery bridge.
//!
//! Lets non-panicking code invoke panic-prone logic and recover from it on
//! the calling thread. A panic raised inside the protected block is caught,
//! converted into an opaque [`Exception`] value, and handed to a recovery
//! closure instead of unwinding past the call.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Opaque value describing a caught panic.
///
/// Carries a short classification (`name`), the panic message when one was
/// recoverable from the payload (`reason`), and the original boxed payload
/// for callers that want to downcast it themselves.
///
/// # Examples
///
/// ```
/// use catch_release::try_catch;
///
/// let err = try_catch(|| -> u32 { panic!("boom") }).unwrap_err();
/// assert_eq!(err.reason(), Some("boom"));
/// assert_eq!(err.message(), "boom");
/// ```
pub struct Exception {
    name: String,
    reason: Option<String>,
    payload: Box<dyn Any + Send>,
}

impl Exception {
    /// Create an exception with a classification name and no message.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: None,
            payload: Box::new(()),
        }
    }

    /// Create an exception with a classification name and a message.
    pub fn with_reason(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: Some(reason.into()),
            payload: Box::new(()),
        }
    }

    /// An operation was invoked while its receiver was in an unsuitable state.
    pub fn illegal_state(reason: impl Into<String>) -> Self {
        Self::with_reason("illegal state", reason)
    }

    /// A lookup found nothing where an element was required.
    pub fn no_such_element(reason: impl Into<String>) -> Self {
        Self::with_reason("no such element", reason)
    }

    /// A bounded wait ran out of time.
    pub fn timeout(reason: impl Into<String>) -> Self {
        Self::with_reason("timeout", reason)
    }

    /// Wrap a raw panic payload.
    ///
    /// Payloads that are already an `Exception` (raised via [`exc_throw`])
    /// pass through unchanged. `&str` and `String` payloads, the two shapes
    /// the `panic!` macro produces, surface as the exception's reason. Any
    /// other payload stays available through [`Exception::payload`].
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<Exception>() {
            Ok(exc) => return *exc,
            Err(other) => other,
        };
        let reason = if let Some(msg) = payload.downcast_ref::<&'static str>() {
            Some((*msg).to_string())
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            Some(msg.clone())
        } else {
            None
        };
        Self {
            name: "panic".to_string(),
            reason,
            payload,
        }
    }

    /// Short classification of what was raised.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The panic message, when one could be recovered from the payload.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Human-readable description: the reason when present, the name otherwise.
    pub fn message(&self) -> &str {
        self.reason.as_deref().unwrap_or(&self.name)
    }

    /// Borrow the original panic payload for downcasting.
    pub fn payload(&self) -> &(dyn Any + Send) {
        &*self.payload
    }

    /// Recover the original panic payload, consuming the exception.
    pub fn into_payload(self) -> Box<dyn Any + Send> {
        self.payload
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{}: {}", self.name, reason),
            None => write!(f, "{}", self.name),
        }
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exception")
            .field("name", &self.name)
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

impl std::error::Error for Exception {}

/// Result of a protected computation.
pub type ExcResult<T> = Result<T, Exception>;

/// Run `try_block`; if it panics, hand the caught [`Exception`] to
/// `catch_block` instead of letting the unwind continue.
///
/// `try_block` runs exactly once on the calling thread. On normal completion
/// `catch_block` is never invoked. On panic, `catch_block` runs exactly once
/// with the caught exception and `exc_catch` then returns normally. A panic
/// raised by `catch_block` itself propagates unmodified; there is no second
/// layer of protection.
///
/// # Examples
///
/// ```
/// use catch_release::exc_catch;
///
/// let mut recovered = false;
/// exc_catch(
///     || panic!("lost connection"),
///     |exc| {
///         assert_eq!(exc.reason(), Some("lost connection"));
///         recovered = true;
///     },
/// );
/// assert!(recovered);
/// ```
pub fn exc_catch<T, C>(try_block: T, catch_block: C)
where
    T: FnOnce(),
    C: FnOnce(&Exception),
{
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(try_block)) {
        let exc = Exception::from_panic(payload);
        catch_block(&exc);
    }
}

/// Run `block` and return its value, or the caught [`Exception`] if it panics.
///
/// This is the error-union form of [`exc_catch`]: the "catch" step becomes a
/// pattern match on the returned `Result`.
pub fn try_catch<A>(block: impl FnOnce() -> A) -> ExcResult<A> {
    panic::catch_unwind(AssertUnwindSafe(block)).map_err(Exception::from_panic)
}

/// Run `block` and return its value; on panic, produce the value from
/// `recover` instead.
pub fn try_or_recover<A>(block: impl FnOnce() -> A, recover: impl FnOnce(&Exception) -> A) -> A {
    match try_catch(block) {
        Ok(value) => value,
        Err(exc) => recover(&exc),
    }
}

/// Run `block`; if it panics, run `what` and then resume the original unwind.
///
/// The panic payload is preserved across the resume, so a caller further up
/// the stack observes the original panic, not a replacement.
pub fn on_exception<A, B>(block: impl FnOnce() -> A, what: impl FnOnce() -> B) -> A {
    match panic::catch_unwind(AssertUnwindSafe(block)) {
        Ok(value) => value,
        Err(payload) => {
            what();
            panic::resume_unwind(payload)
        }
    }
}

/// Run `block`, then `finally`, returning `block`'s value.
///
/// `finally` runs on both paths: after a normal completion, and before the
/// unwind resumes when `block` panics.
pub fn try_finally<A, B>(block: impl FnOnce() -> A, finally: impl FnOnce() -> B) -> A {
    match panic::catch_unwind(AssertUnwindSafe(block)) {
        Ok(value) => {
            finally();
            value
        }
        Err(payload) => {
            finally();
            panic::resume_unwind(payload)
        }
    }
}

/// Raise an [`Exception`] as a panic.
///
/// The exception travels as the panic payload and is recovered intact by
/// [`exc_catch`] or [`try_catch`] further down the stack.
pub fn exc_throw(exc: Exception) -> ! {
    panic::panic_any(exc)
}
