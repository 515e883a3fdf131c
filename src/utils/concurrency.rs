//! Deadline-bounded fan-out on a rayon pool
//!
//! Tasks are spawned onto an owned `rayon::ThreadPool` and report back over a
//! channel. The caller stops waiting at the per-task timeout or the request
//! deadline, whichever is earlier; late tasks are signalled through the cancel
//! token and their results dropped. Results come back in task order.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::ThreadPool;

/// Cooperative cancellation flag
///
/// A child token reports cancelled when either it or its parent is cancelled;
/// cancelling a child leaves the parent alone.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self { flag: Arc::new(AtomicBool::new(false)), parent: Some(Arc::clone(&self.flag)) }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.parent.as_ref().map(|p| p.load(Ordering::SeqCst)).unwrap_or(false)
    }
}

/// How a spawned task ended, from the caller's point of view
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<T> {
    Completed(T),
    Panicked(String),
    /// No result before the per-task timeout or the deadline
    TimedOut,
    /// Cancelled before it started
    Cancelled,
}

impl<T> TaskOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            TaskOutcome::Completed(v) => Some(v),
            _ => None,
        }
    }
}

/// Run `tasks` on `pool`, waiting at most `per_task` (and never past `deadline`)
pub fn run_with_deadline<T, F>(
    pool: &ThreadPool,
    tasks: Vec<F>,
    per_task: Duration,
    deadline: Instant,
    cancel: &CancelToken,
) -> Vec<TaskOutcome<T>>
where
    T: Send + 'static,
    F: FnOnce(&CancelToken) -> T + Send + 'static,
{
    let n = tasks.len();
    let batch = cancel.child();
    let (tx, rx) = mpsc::channel::<(usize, TaskOutcome<T>)>();

    for (idx, task) in tasks.into_iter().enumerate() {
        let tx = tx.clone();
        let token = batch.clone();
        pool.spawn(move || {
            if token.is_cancelled() {
                let _ = tx.send((idx, TaskOutcome::Cancelled));
                return;
            }
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| task(&token))) {
                Ok(v) => TaskOutcome::Completed(v),
                Err(payload) => TaskOutcome::Panicked(panic_message(payload.as_ref())),
            };
            // Receiver is gone once the caller stopped waiting
            let _ = tx.send((idx, outcome));
        });
    }
    drop(tx);

    let wait_until = (Instant::now() + per_task).min(deadline);
    let mut slots: Vec<Option<TaskOutcome<T>>> = (0..n).map(|_| None).collect();
    let mut remaining = n;

    while remaining > 0 {
        let now = Instant::now();
        if now >= wait_until {
            break;
        }
        match rx.recv_timeout(wait_until - now) {
            Ok((idx, outcome)) => {
                if slots[idx].is_none() {
                    slots[idx] = Some(outcome);
                    remaining -= 1;
                }
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if remaining > 0 {
        batch.cancel();
    }

    slots.into_iter().map(|s| s.unwrap_or(TaskOutcome::TimedOut)).collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn pool() -> ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap()
    }

    type Task = Box<dyn FnOnce(&CancelToken) -> u32 + Send>;

    #[test]
    fn test_results_in_task_order() {
        let tasks: Vec<Task> = vec![
            Box::new(|_: &CancelToken| {
                thread::sleep(Duration::from_millis(30));
                1
            }),
            Box::new(|_: &CancelToken| 2),
            Box::new(|_: &CancelToken| 3),
        ];
        let out = run_with_deadline(
            &pool(),
            tasks,
            Duration::from_secs(2),
            Instant::now() + Duration::from_secs(5),
            &CancelToken::new(),
        );
        let values: Vec<u32> = out.into_iter().filter_map(TaskOutcome::completed).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn test_panicking_task_is_isolated() {
        let tasks: Vec<Task> = vec![Box::new(|_: &CancelToken| panic!("boom")), Box::new(|_: &CancelToken| 7)];
        let out = run_with_deadline(
            &pool(),
            tasks,
            Duration::from_secs(2),
            Instant::now() + Duration::from_secs(5),
            &CancelToken::new(),
        );
        assert_eq!(out[0], TaskOutcome::Panicked("boom".to_string()));
        assert_eq!(out[1], TaskOutcome::Completed(7));
    }

    #[test]
    fn test_slow_task_times_out_and_sees_cancel() {
        let tasks: Vec<Task> = vec![
            Box::new(|token: &CancelToken| {
                let start = Instant::now();
                while !token.is_cancelled() && start.elapsed() < Duration::from_secs(2) {
                    thread::sleep(Duration::from_millis(5));
                }
                0
            }),
            Box::new(|_: &CancelToken| 5),
        ];
        let parent = CancelToken::new();
        let out = run_with_deadline(
            &pool(),
            tasks,
            Duration::from_millis(50),
            Instant::now() + Duration::from_secs(5),
            &parent,
        );
        assert_eq!(out[0], TaskOutcome::TimedOut);
        assert_eq!(out[1], TaskOutcome::Completed(5));
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_cancelled_parent_skips_tasks() {
        let parent = CancelToken::new();
        parent.cancel();
        let tasks: Vec<Task> = vec![Box::new(|_: &CancelToken| 1)];
        let out = run_with_deadline(
            &pool(),
            tasks,
            Duration::from_secs(1),
            Instant::now() + Duration::from_secs(1),
            &parent,
        );
        assert_eq!(out[0], TaskOutcome::Cancelled);
    }
}
