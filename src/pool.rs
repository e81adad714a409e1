// src/pool.rs
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::deque::BlockDeque;
use crate::error::Result;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

const QUEUE_CAPACITY: usize = 1000;

/// A fixed-size worker pool consuming tasks from a shared blocking queue.
///
/// Workers exit after their current task when the pool is closed; tasks still
/// queued at that point are dropped. A panicking task is caught and logged
/// without crashing its worker.
pub struct ThreadPool {
    queue: Arc<BlockDeque<Task>>,
    workers: Vec<JoinHandle<()>>,
    thread_count: usize,
}

impl ThreadPool {
    /// Create a pool. A `None` or zero thread count means the number of
    /// concurrent threads supported by the hardware.
    pub fn new(thread_count: Option<usize>) -> Self {
        let mut count = thread_count.unwrap_or(0);
        if count == 0 {
            count = num_cpus::get();
        }
        Self {
            queue: Arc::new(BlockDeque::with_capacity(QUEUE_CAPACITY)),
            workers: Vec::new(),
            thread_count: count,
        }
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Launch the workers.
    pub fn start(&mut self) -> Result<()> {
        debug_assert!(self.workers.is_empty());
        for i in 0..self.thread_count {
            let queue = Arc::clone(&self.queue);
            let handle = thread::Builder::new()
                .name(format!("mazurka-worker-{i}"))
                .spawn(move || Self::exec_proc(queue))?;
            self.workers.push(handle);
        }
        Ok(())
    }

    /// Enqueue a task. Blocks while the queue is full.
    pub fn push(&self, task: impl FnOnce() + Send + 'static) {
        self.queue.push_back(Box::new(task));
    }

    /// Signal workers to exit after their current task. Remaining queued
    /// tasks are dropped.
    pub fn close(&self) {
        self.queue.close();
    }

    fn exec_proc(queue: Arc<BlockDeque<Task>>) {
        while let Some(task) = queue.pop(None) {
            if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                tracing::error!("panic raised in worker task");
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.queue.close();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
