/*
 * pool.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Canter, an HTTP/1.x protocol library.
 *
 * Canter is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Canter is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Canter.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Fixed-size worker pool over a FIFO queue. Workers drain the queue and
//! exit when it runs dry; enqueueing respawns idle slots. The queue mutex
//! guards the items and the pause flag; each worker slot has its own mutex
//! for the thread handle plus an atomic running flag.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};

struct QueueState<T> {
    items: VecDeque<T>,
    pause: bool,
}

struct Shared<T> {
    queue: Mutex<QueueState<T>>,
}

struct WorkerSlot {
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    running: AtomicBool,
}

impl WorkerSlot {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            handle: Mutex::new(None),
            running: AtomicBool::new(false),
        })
    }
}

pub struct WorkerPool<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    workers: Mutex<Vec<Arc<WorkerSlot>>>,
    processor: Arc<dyn Fn(usize, T) + Send + Sync>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Create a pool of `size` workers (at least one) around a processor
    /// invoked as `(worker_index, item)`.
    pub fn new(size: usize, processor: impl Fn(usize, T) + Send + Sync + 'static) -> Result<Self> {
        if size == 0 {
            return Err(Error::state("pool size must be at least 1"));
        }
        Ok(Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(QueueState {
                    items: VecDeque::new(),
                    pause: false,
                }),
            }),
            workers: Mutex::new((0..size).map(|_| WorkerSlot::new()).collect()),
            processor: Arc::new(processor),
        })
    }

    pub fn size(&self) -> usize {
        self.workers.lock().unwrap().len()
    }

    /// Number of workers currently marked running.
    pub fn active_workers(&self) -> usize {
        self.workers
            .lock()
            .unwrap()
            .iter()
            .filter(|slot| slot.running.load(Ordering::SeqCst))
            .count()
    }

    pub fn queued(&self) -> usize {
        self.shared.queue.lock().unwrap().items.len()
    }

    /// Push an item and wake an idle worker slot for it.
    pub fn enqueue(&self, item: T) {
        {
            let mut queue = self.shared.queue.lock().unwrap();
            queue.items.push_back(item);
        }
        self.dispatch();
    }

    /// Scan the worker slots: join any whose running flag has cleared, and
    /// start workers while queued items remain.
    fn dispatch(&self) {
        let workers = self.workers.lock().unwrap();
        for (index, slot) in workers.iter().enumerate() {
            let backlog = {
                let queue = self.shared.queue.lock().unwrap();
                if queue.pause {
                    return;
                }
                queue.items.len()
            };
            if backlog == 0 {
                return;
            }
            if slot
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                let mut handle = slot.handle.lock().unwrap();
                if let Some(old) = handle.take() {
                    old.join().ok();
                }
                let shared = self.shared.clone();
                let processor = self.processor.clone();
                let slot = slot.clone();
                *handle = Some(thread::spawn(move || {
                    worker_loop(shared, slot, processor, index);
                }));
            }
        }
    }

    fn on_worker_thread(&self) -> bool {
        let current = thread::current().id();
        let workers = self.workers.lock().unwrap();
        workers.iter().any(|slot| {
            slot.handle
                .lock()
                .unwrap()
                .as_ref()
                .map(|h| h.thread().id() == current)
                .unwrap_or(false)
        })
    }

    /// Block until every queued item has been processed and all workers have
    /// gone idle. New items are admitted again once this returns. Calling
    /// from inside a worker is a precondition violation.
    pub fn wait(&self) -> Result<()> {
        if self.on_worker_thread() {
            return Err(Error::state("inside a pooled thread"));
        }
        // let the queue drain first
        loop {
            let empty = self.shared.queue.lock().unwrap().items.is_empty();
            if empty {
                break;
            }
            self.dispatch();
            thread::sleep(Duration::from_millis(2));
        }
        self.shared.queue.lock().unwrap().pause = true;
        self.join_all();
        self.shared.queue.lock().unwrap().pause = false;
        self.dispatch();
        Ok(())
    }

    /// Change the number of workers. Pauses, joins every worker, resizes the
    /// slot vector, resumes. Illegal from inside a worker, and the pool never
    /// shrinks below one worker.
    pub fn resize(&self, size: usize) -> Result<()> {
        if size == 0 {
            return Err(Error::state("pool size must be at least 1"));
        }
        if self.on_worker_thread() {
            return Err(Error::state("inside a pooled thread"));
        }
        self.shared.queue.lock().unwrap().pause = true;
        self.join_all();
        {
            let mut workers = self.workers.lock().unwrap();
            workers.resize_with(size, WorkerSlot::new);
        }
        self.shared.queue.lock().unwrap().pause = false;
        self.dispatch();
        Ok(())
    }

    fn join_all(&self) {
        let handles: Vec<_> = {
            let workers = self.workers.lock().unwrap();
            workers
                .iter()
                .filter_map(|slot| slot.handle.lock().unwrap().take())
                .collect()
        };
        for handle in handles {
            handle.join().ok();
        }
    }
}

impl<T: Send + 'static> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.shared.queue.lock().unwrap().pause = true;
        self.join_all();
    }
}

fn worker_loop<T: Send + 'static>(
    shared: Arc<Shared<T>>,
    slot: Arc<WorkerSlot>,
    processor: Arc<dyn Fn(usize, T) + Send + Sync>,
    index: usize,
) {
    loop {
        // take the next item; skip the round when the queue lock is busy so a
        // slow dispatcher cannot stall this worker, and vice versa
        let item = loop {
            match shared.queue.try_lock() {
                Ok(mut queue) => {
                    break if queue.pause {
                        None
                    } else {
                        queue.items.pop_front()
                    };
                }
                Err(std::sync::TryLockError::WouldBlock) => thread::yield_now(),
                Err(std::sync::TryLockError::Poisoned(_)) => return,
            }
        };
        match item {
            Some(item) => processor(index, item),
            None => {
                slot.running.store(false, Ordering::SeqCst);
                // an item may have been enqueued between the pop attempt and
                // the flag clear; reclaim the slot rather than strand it
                let backlog = {
                    let queue = shared.queue.lock().unwrap();
                    !queue.pause && !queue.items.is_empty()
                };
                if backlog
                    && slot
                        .running
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                {
                    continue;
                }
                return;
            }
        }
    }
}
