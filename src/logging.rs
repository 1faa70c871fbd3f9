use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A unique identifier for a particular engine operation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct OperationId(pub usize);

impl Display for OperationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl OperationId {
    /// Atomically get the next ID. This wraps around back to zero if you somehow exceed a usize.
    pub fn next() -> OperationId {
        static OPERATION_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);
        OperationId(OPERATION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Log the start of an operation and return its ID.
    pub fn start(name: &str, detail: impl Display) -> OperationId {
        let id = Self::next();
        info!("->op{id} {name} {detail}");
        id
    }

    /// Log how an operation ended, choosing the level from the error's severity.
    pub fn finish<T, E>(self, result: &Result<T, E>)
    where
        E: Display + Severity,
    {
        let id = self;
        match result {
            Ok(_) => info!("<-op{id} ok"),
            Err(err) => match err.severity() {
                Level::Rejected => warn!("<-op{id} rejected: {err}"),
                Level::Failed => error!("<-op{id} failed: {err}"),
            },
        }
    }
}

/// How bad an operation error is.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Level {
    /// The caller asked for something the rules forbid; state is unchanged.
    Rejected,
    /// Something underneath the engine broke, e.g. the store.
    Failed,
}

/// Classifies errors for operation logging.
pub trait Severity {
    fn severity(&self) -> Level;
}

impl<E: Severity> Severity for &E {
    fn severity(&self) -> Level {
        (**self).severity()
    }
}

impl Severity for crate::error::Error {
    fn severity(&self) -> Level {
        Level::Failed
    }
}
