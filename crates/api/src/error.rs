//! Pinhold error types.

use std::sync::Arc;

/// A clonable trait-object inner error.
#[derive(Clone, Default)]
pub struct DynInnerError(
    pub Option<Arc<dyn std::error::Error + 'static + Send + Sync>>,
);

impl std::fmt::Debug for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_ref() {
            None => f.write_str("None"),
            Some(s) => s.fmt(f),
        }
    }
}

impl std::error::Error for DynInnerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.as_ref().map(|s| {
            let out: &(dyn std::error::Error + 'static) = &**s;
            out
        })
    }
}

impl DynInnerError {
    /// Construct a new DynInnerError from a source error.
    pub fn new<E: std::error::Error + 'static + Send + Sync>(e: E) -> Self {
        Self(Some(Arc::new(e)))
    }
}

/// The core pinhold error type. This type is used in all external
/// pinhold apis as well as internally in some modules.
///
/// This type is required to implement `Clone` so that task outcomes
/// derived from it can be recorded and re-reported cheaply.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PinError {
    /// Generic pinhold internal error.
    #[error("{ctx} (src: {src})")]
    Other {
        /// Any context associated with this error.
        ctx: Arc<str>,

        /// The inner error (if any).
        #[source]
        src: DynInnerError,
    },

    /// An http endpoint responded with a non-success status.
    #[error("{ctx} (status: {status})")]
    Status {
        /// Any context associated with this error.
        ctx: Arc<str>,

        /// The http status code received.
        status: u16,
    },
}

impl PinError {
    /// Construct an "other" error with an inner source error.
    pub fn other_src<
        C: std::fmt::Display,
        S: std::error::Error + 'static + Send + Sync,
    >(
        ctx: C,
        src: S,
    ) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::new(src),
        }
    }

    /// Construct an "other" error.
    pub fn other<C: std::fmt::Display>(ctx: C) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::default(),
        }
    }

    /// Construct a "status" error from a non-success http response.
    pub fn status<C: std::fmt::Display>(ctx: C, status: u16) -> Self {
        Self::Status {
            ctx: ctx.to_string().into_boxed_str().into(),
            status,
        }
    }
}

/// The core pinhold result type.
pub type PinResult<T> = Result<T, PinError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            "bla (src: None)",
            PinError::other("bla").to_string().as_str(),
        );
        assert_eq!(
            "foo (src: bar)",
            PinError::other_src("foo", std::io::Error::other("bar"))
                .to_string()
                .as_str(),
        );
        assert_eq!(
            "nope (status: 502)",
            PinError::status("nope", 502).to_string().as_str(),
        );
    }

    #[test]
    fn ensure_pin_error_type_is_send_and_sync() {
        fn ensure<T: std::fmt::Display + Send + Sync>(_t: T) {}
        ensure(PinError::other("bla"));
    }
}
