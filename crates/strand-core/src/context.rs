//! Scoped remote-execution options.
//!
//! Options set in a scope apply to every submission issued inside it. Synchronous
//! callers use a thread-local stack; async callers use a tokio task-local so the
//! overlay follows the task across worker threads.
use std::{cell::RefCell, future::Future};

use strand_model::RemoteOptions;

thread_local! {
    static THREAD_OPTIONS: RefCell<Vec<RemoteOptions>> = const { RefCell::new(Vec::new()) };
}

tokio::task_local! {
    static TASK_OPTIONS: RemoteOptions;
}

struct PopOnDrop;

impl Drop for PopOnDrop {
    fn drop(&mut self) {
        THREAD_OPTIONS.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

fn thread_options() -> RemoteOptions {
    THREAD_OPTIONS.with(|stack| {
        stack
            .borrow()
            .iter()
            .fold(RemoteOptions::default(), |acc, inner| acc.merged(inner))
    })
}

/// Options in effect for the caller, outer scopes first, inner scopes overriding.
pub fn current_remote_options() -> RemoteOptions {
    let base = thread_options();
    TASK_OPTIONS
        .try_with(|task| base.merged(task))
        .unwrap_or(base)
}

/// Run `f` with `options` layered on top of the current thread's options.
///
/// The overlay is removed when `f` returns or unwinds.
pub fn remote_options<R>(options: RemoteOptions, f: impl FnOnce() -> R) -> R {
    THREAD_OPTIONS.with(|stack| stack.borrow_mut().push(options));
    let _guard = PopOnDrop;
    f()
}

/// Drive `fut` with `options` layered on top of the current options.
///
/// The merged overlay is captured when this is called.
pub async fn with_remote_options<F: Future>(options: RemoteOptions, fut: F) -> F::Output {
    let merged = current_remote_options().merged(&options);
    TASK_OPTIONS.scope(merged, fut).await
}
