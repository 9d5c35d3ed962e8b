use std::{
    io,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, mpsc},
    thread,
};

use log::{debug, warn};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of workers pulling jobs from a shared queue.
///
/// A job that panics is logged and its worker moves on to the next one. Dropping the
/// pool closes the queue and joins every worker once its current job returns.
#[derive(Debug)]
pub struct ThreadPool {
    workers: Vec<Worker>,
    sender: Option<mpsc::Sender<Job>>,
}

impl ThreadPool {
    pub fn new(size: usize) -> io::Result<Self> {
        assert!(size > 0);

        let mut workers = Vec::with_capacity(size);
        let (sender, receiver) = mpsc::channel();

        let receiver = Arc::new(Mutex::new(receiver));
        let sender = Some(sender);

        for i in 0..size {
            workers.push(Worker::new(i, Arc::clone(&receiver))?);
        }

        Ok(Self { workers, sender })
    }

    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let job = Box::new(f);
        let sent = self.sender.as_ref().map(|sender| sender.send(job));
        if !matches!(sent, Some(Ok(()))) {
            warn!("thread pool queue closed; job dropped");
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        drop(self.sender.take());

        for worker in self.workers.drain(..) {
            debug!("shutting down worker {}", worker.id);

            if worker.thread.join().is_err() {
                warn!("worker {} panicked", worker.id);
            }
        }
    }
}

#[derive(Debug)]
struct Worker {
    id: usize,
    thread: thread::JoinHandle<()>,
}

impl Worker {
    fn new(id: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>) -> io::Result<Self> {
        let thread = thread::Builder::new()
            .name(format!("calculator-worker-{id}"))
            .spawn(move || {
                loop {
                    let msg = match receiver.lock() {
                        Ok(receiver) => receiver.recv(),
                        Err(poisoned) => poisoned.into_inner().recv(),
                    };
                    match msg {
                        Ok(job) => {
                            debug!("worker {id} handling a connection!");
                            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                                warn!("worker {id} job panicked");
                            }
                        }
                        Err(_) => {
                            debug!("worker {id} disconnected!");
                            break;
                        }
                    }
                }
            })?;

        Ok(Self { id, thread })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn pool_runs_every_job() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = ThreadPool::new(4).unwrap();

        for _ in 0..32 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        // Dropping joins the workers after the queue drains.
        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn pool_survives_panicking_job() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = ThreadPool::new(2).unwrap();

        pool.execute(|| panic!("job failed"));
        for _ in 0..4 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn single_worker_outlives_panicking_jobs() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = ThreadPool::new(1).unwrap();

        for _ in 0..3 {
            pool.execute(|| panic!("job failed"));
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    #[should_panic]
    fn pool_requires_workers() {
        let _ = ThreadPool::new(0);
    }
}
