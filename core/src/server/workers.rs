/*
 * workers.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Staffetta, a local application server.
 *
 * Staffetta is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Staffetta is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Staffetta.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Bounded worker pool for synchronous applications: a fixed set of threads
//! draining a shared job queue. Submission never blocks; oversubscription
//! queues instead of spawning.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    tx: Sender<Job>,
}

impl WorkerPool {
    /// Spawn `size` worker threads sharing one queue.
    pub fn new(size: usize) -> Self {
        let (tx, rx) = channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        for i in 0..size.max(1) {
            let rx = Arc::clone(&rx);
            let _ = thread::Builder::new()
                .name(format!("app-worker-{}", i))
                .spawn(move || worker_loop(rx));
        }
        Self { tx }
    }

    /// Default pool size: min(128, cpus * 8 + 16).
    pub fn default_size() -> usize {
        let cpus = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        (cpus * 8 + 16).min(128)
    }

    /// Enqueue a job. Returns immediately; an idle worker picks it up.
    pub fn submit(&self, job: Job) {
        let _ = self.tx.send(job);
    }
}

fn worker_loop(rx: Arc<Mutex<Receiver<Job>>>) {
    loop {
        // The guard is released before the job runs, so workers drain the
        // queue concurrently.
        let job = rx.lock().unwrap().recv();
        match job {
            Ok(job) => job(),
            Err(_) => break, // pool dropped
        }
    }
}
