//! Worker-pool primitive for fanning pure, self-contained tasks out across a
//! `rayon` thread pool and collecting results into a map keyed by task id.
//!
//! This is the idiomatic-Rust analogue of a `multiprocessing.Pool` driving
//! `imap_unordered`: tasks carry everything they need (snapshots,
//! attachments, epoch ranges), there is no shared mutable state, and
//! completion order does not affect the output since results land in a map.

use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use thiserror::Error;

/// How often progress is logged, in completed tasks. The `tqdm` analogue.
const PROGRESS_INTERVAL: usize = 100;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("worker task {key} panicked: {message}")]
    TaskPanicked { key: String, message: String },
}

pub type Result<T> = std::result::Result<T, ExecutorError>;

/// A self-contained unit of CPU-bound work, keyed for result aggregation.
pub trait Task: Send + Sync {
    type Key: Eq + Hash + Send + std::fmt::Debug;
    type Output: Send;

    fn key(&self) -> Self::Key;
    fn run(&self) -> Self::Output;
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker task panicked with a non-string payload".to_string()
    }
}

/// Runs every task across the available cores, returning a map keyed by
/// [`Task::key`]. A task that panics is a fatal error for the whole batch —
/// the offending key is reported, never silently dropped.
pub fn run_all<T: Task>(tasks: Vec<T>) -> Result<HashMap<T::Key, T::Output>> {
    let total = tasks.len();
    let completed = AtomicUsize::new(0);

    tracing::info!(total, "dispatching tasks to worker pool");

    let results: Vec<std::result::Result<(T::Key, T::Output), ExecutorError>> = tasks
        .par_iter()
        .map(|task| {
            let key = task.key();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run()));

            let n = completed.fetch_add(1, Ordering::SeqCst) + 1;
            if n % PROGRESS_INTERVAL == 0 || n == total {
                tracing::info!(completed = n, total, "worker pool progress");
            }

            match outcome {
                Ok(output) => Ok((key, output)),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(key = ?key, message, "worker task panicked");
                    Err(ExecutorError::TaskPanicked {
                        key: format!("{key:?}"),
                        message,
                    })
                }
            }
        })
        .collect();

    let mut map = HashMap::with_capacity(total);
    for result in results {
        let (key, output) = result?;
        map.insert(key, output);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Double(i64);

    impl Task for Double {
        type Key = i64;
        type Output = i64;

        fn key(&self) -> Self::Key {
            self.0
        }

        fn run(&self) -> Self::Output {
            self.0 * 2
        }
    }

    struct Panicky;

    impl Task for Panicky {
        type Key = &'static str;
        type Output = ();

        fn key(&self) -> Self::Key {
            "panicky"
        }

        fn run(&self) -> Self::Output {
            panic!("boom");
        }
    }

    #[test]
    fn runs_every_task_and_aggregates_by_key() {
        let tasks: Vec<Double> = (0..20).map(Double).collect();
        let results = run_all(tasks).unwrap();
        assert_eq!(results.len(), 20);
        for (key, value) in results {
            assert_eq!(value, key * 2);
        }
    }

    #[test]
    fn surfaces_panics_as_executor_error() {
        let tasks = vec![Panicky];
        let err = run_all(tasks).unwrap_err();
        match err {
            ExecutorError::TaskPanicked { key, .. } => assert_eq!(key, "\"panicky\""),
        }
    }

    #[test]
    fn empty_task_list_yields_empty_map() {
        let tasks: Vec<Double> = Vec::new();
        let results = run_all(tasks).unwrap();
        assert!(results.is_empty());
    }
}
