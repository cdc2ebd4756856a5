use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::event_loop::{EventLoop, LoopHandle};

/// One OS thread running its own [`EventLoop`] forever.
///
/// Grounded on `EventLoopThread`: the spawning thread blocks on a condvar
/// until the new thread's loop has actually been constructed, so
/// [`LoopThread::start`] never hands back a handle to a loop that doesn't
/// exist yet.
pub struct LoopThread {
    join_handle: Option<JoinHandle<()>>,
    handle: LoopHandle,
}

impl LoopThread {
    pub fn start() -> io::Result<LoopThread> {
        let ready = Arc::new((Mutex::new(None::<io::Result<LoopHandle>>), Condvar::new()));
        let ready_for_thread = Arc::clone(&ready);

        let join_handle = thread::Builder::new()
            .name("reactor-worker".to_string())
            .spawn(move || {
                let mut loop_ = match EventLoop::new() {
                    Ok(loop_) => loop_,
                    Err(e) => {
                        let (lock, cvar) = &*ready_for_thread;
                        *lock.lock().unwrap() = Some(Err(e));
                        cvar.notify_one();
                        return;
                    }
                };
                let handle = loop_.handle();
                {
                    let (lock, cvar) = &*ready_for_thread;
                    *lock.lock().unwrap() = Some(Ok(handle));
                    cvar.notify_one();
                }
                if let Err(e) = loop_.run_forever() {
                    log::error!("worker loop exited with an error: {}", e);
                }
            })?;

        let (lock, cvar) = &*ready;
        let mut guard = lock.lock().unwrap();
        while guard.is_none() {
            guard = cvar.wait(guard).unwrap();
        }
        let handle = guard.take().unwrap()?;

        Ok(LoopThread {
            join_handle: Some(join_handle),
            handle,
        })
    }

    pub fn handle(&self) -> &LoopHandle {
        &self.handle
    }

    fn stop(&self) {
        self.handle.post(Box::new(|loop_: &mut EventLoop| loop_.quit()));
    }
}

impl Drop for LoopThread {
    fn drop(&mut self) {
        self.stop();
        if let Some(join_handle) = self.join_handle.take() {
            let _ = join_handle.join();
        }
    }
}

/// A fixed-size pool of worker loops, handed out round robin.
///
/// Grounded on `EventLoopThreadPool`: connections accepted on the base loop
/// are distributed across `threads` in rotation; a pool of size zero means
/// every connection runs on the base loop itself (`get_next_loop` falls
/// back to `base`).
pub struct LoopPool {
    base: LoopHandle,
    threads: Vec<LoopThread>,
    next: Arc<AtomicUsize>,
}

impl LoopPool {
    pub fn new(base: LoopHandle) -> LoopPool {
        LoopPool {
            base,
            threads: Vec::new(),
            next: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Spawns `pool_size` worker threads, each running its own loop.
    /// `pool_size == 0` keeps the pool empty — every accepted connection
    /// then runs on the base loop.
    pub fn start(&mut self, pool_size: usize) -> io::Result<()> {
        for _ in 0..pool_size {
            self.threads.push(LoopThread::start()?);
        }
        Ok(())
    }

    pub fn pool_size(&self) -> usize {
        self.threads.len()
    }

    /// A cheap, `Send`-able snapshot of the pool usable for round-robin
    /// assignment from inside a boxed callback.
    pub fn handle(&self) -> LoopPoolHandle {
        LoopPoolHandle {
            base: self.base.clone(),
            workers: Arc::new(self.threads.iter().map(|t| t.handle().clone()).collect()),
            next: Arc::clone(&self.next),
        }
    }
}

#[derive(Clone)]
pub struct LoopPoolHandle {
    base: LoopHandle,
    workers: Arc<Vec<LoopHandle>>,
    next: Arc<AtomicUsize>,
}

impl LoopPoolHandle {
    /// The next worker loop in rotation, or the base loop if the pool is
    /// empty.
    pub fn get_next_loop(&self) -> LoopHandle {
        if self.workers.is_empty() {
            return self.base.clone();
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        self.workers[idx].clone()
    }

    pub fn pool_size(&self) -> usize {
        self.workers.len()
    }
}
