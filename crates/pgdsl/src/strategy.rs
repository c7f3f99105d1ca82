//! Blocking execution strategies.
//!
//! A strategy decides what a run hands back; the run itself is always the same
//! fold over one connection.
//!
//! | Strategy | `run_with::<S>` returns | failures |
//! |---|---|---|
//! | [`Direct`] | `DslResult<T>` | returned as soon as a leaf fails |
//! | [`Captured`] | `DslResult<T>` | backend errors and panics become values |
//! | [`Defer`] | [`Deferred<T>`] | nothing runs until [`Deferred::force`] |

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::backend::Backend;
use crate::error::{DslError, DslResult};
use crate::program::Program;
use crate::session::{BlockingSession, interpret};

/// A blocking run, not yet started.
pub type Run<'a, T> = Box<dyn FnOnce() -> DslResult<T> + 'a>;

/// How a blocking run is wrapped.
pub trait Strategy {
    type Output<'a, T: 'a>;

    fn wrap<'a, T: 'a>(run: Run<'a, T>) -> Self::Output<'a, T>;
}

/// Run now; the first failure is returned.
#[derive(Debug, Clone, Copy, Default)]
pub struct Direct;

/// Run now; panics inside the run are caught and reported as
/// [`DslError::Panicked`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Captured;

/// Run later, when forced.
#[derive(Debug, Clone, Copy, Default)]
pub struct Defer;

impl Strategy for Direct {
    type Output<'a, T: 'a> = DslResult<T>;

    fn wrap<'a, T: 'a>(run: Run<'a, T>) -> DslResult<T> {
        run()
    }
}

impl Strategy for Captured {
    type Output<'a, T: 'a> = DslResult<T>;

    fn wrap<'a, T: 'a>(run: Run<'a, T>) -> DslResult<T> {
        match panic::catch_unwind(AssertUnwindSafe(run)) {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(target: "pgdsl.program", panic = %message, "program panicked");
                Err(DslError::Panicked(message))
            }
        }
    }
}

impl Strategy for Defer {
    type Output<'a, T: 'a> = Deferred<'a, T>;

    fn wrap<'a, T: 'a>(run: Run<'a, T>) -> Deferred<'a, T> {
        Deferred { run }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A run that has been described but not started.
///
/// Failures stay inside until [`force`](Deferred::force) is called; dropping an
/// unforced value never touches the backend.
#[must_use = "deferred runs do nothing until forced"]
pub struct Deferred<'a, T> {
    run: Run<'a, T>,
}

impl<'a, T: 'a> Deferred<'a, T> {
    pub fn new(run: impl FnOnce() -> DslResult<T> + 'a) -> Self {
        Self { run: Box::new(run) }
    }

    /// Execute now, on the calling thread.
    pub fn force(self) -> DslResult<T> {
        (self.run)()
    }

    pub fn map<U: 'a>(self, f: impl FnOnce(T) -> U + 'a) -> Deferred<'a, U> {
        let run = self.run;
        Deferred::new(move || run().map(f))
    }
}

impl<T> fmt::Debug for Deferred<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}

fn execute<B: Backend, T: Send + 'static>(backend: &B, program: Program<T>) -> DslResult<T> {
    let mut session = BlockingSession::open(backend)?;
    futures::executor::block_on(interpret(&mut session, program))
}

impl<T: Send + 'static> Program<T> {
    /// Run against a blocking backend under strategy `S`.
    ///
    /// One connection is acquired for the whole run and released on every exit
    /// path. Must not be called from inside an async runtime when the backend
    /// blocks on one.
    pub fn run_with<S: Strategy, B: Backend>(self, backend: &B) -> S::Output<'_, T> {
        S::wrap(Box::new(move || execute(backend, self)))
    }

    /// [`Direct`] run.
    pub fn run<B: Backend>(self, backend: &B) -> DslResult<T> {
        self.run_with::<Direct, B>(backend)
    }

    /// [`Captured`] run.
    pub fn run_captured<B: Backend>(self, backend: &B) -> DslResult<T> {
        self.run_with::<Captured, B>(backend)
    }

    /// [`Defer`] run.
    pub fn run_deferred<B: Backend>(self, backend: &B) -> Deferred<'_, T> {
        self.run_with::<Defer, B>(backend)
    }
}
