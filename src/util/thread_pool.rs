use crate::error::PregelError;
use crossbeam_channel::unbounded;
use crossbeam_utils::thread;
use std::num::NonZeroUsize;

/// Fixed-size pool of scoped worker threads. Tasks may borrow from the caller's stack; each call
/// to `run_tasks` blocks until every task has finished.
#[derive(Debug, Clone, Copy, new)]
pub struct ThreadPool {
    threads: NonZeroUsize,
}

impl ThreadPool {
    pub fn with_threads(threads: usize) -> Self {
        Self { threads: NonZeroUsize::new(threads).unwrap_or(NonZeroUsize::MIN) }
    }

    pub fn threads(&self) -> usize {
        self.threads.get()
    }

    /// Runs `f` on every task and returns the results in task order.
    pub fn run_tasks<T, R, F>(&self, tasks: Vec<T>, f: F) -> Result<Vec<R>, PregelError>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync,
    {
        let task_count = tasks.len();
        if task_count == 0 {
            return Ok(Vec::new());
        }
        let (task_sender, task_receiver) = unbounded();
        for task in tasks.into_iter().enumerate() {
            task_sender
                .send(task)
                .map_err(|_| PregelError::Generic("Task queue closed unexpectedly".to_owned()))?;
        }
        drop(task_sender);
        let (result_sender, result_receiver) = unbounded();

        let f = &f;
        thread::scope(|s| {
            for worker in 0..self.threads.get().min(task_count) {
                let task_receiver = task_receiver.clone();
                let result_sender = result_sender.clone();
                s.builder()
                    .name(format!("pregel-{}", worker))
                    .spawn(move |_| {
                        for (index, task) in task_receiver.iter() {
                            if result_sender.send((index, f(task))).is_err() {
                                break;
                            }
                        }
                    })
                    .map_err(|e| PregelError::Generic(format!("Could not spawn thread: {}", e)))?;
            }
            Ok::<(), PregelError>(())
        })
        .map_err(|_| PregelError::Generic("A worker thread panicked".to_owned()))??;
        drop(result_sender);

        let mut results: Vec<Option<R>> = (0..task_count).map(|_| None).collect();
        for (index, result) in result_receiver.iter() {
            results[index] = Some(result);
        }
        results
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| PregelError::Generic("A task did not produce a result".to_owned()))
    }
}
