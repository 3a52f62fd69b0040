//! Background requests polled from the UI thread.
//!
//! A [`Request`] slot runs each job on its own thread and remembers which key
//! it currently wants. Only a worker started for that key can replace the
//! slot's value. Workers for superseded keys still run to completion but their
//! results are dropped when they are joined.

use std::any::Any;
use std::fmt;
use std::thread::JoinHandle;

/// What a call to [`Request::poll`] observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Nothing requested, or the wanted value is already in place.
    Idle,
    /// The wanted value is still being computed.
    Pending,
    /// The wanted value arrived and replaced the previous one.
    Fresh,
    /// Only results for superseded keys arrived; they were discarded.
    Stale,
    /// The worker for the wanted key panicked.
    Failed(String),
}

pub struct Request<K, T> {
    wanted: Option<K>,
    workers: Vec<(K, JoinHandle<T>)>,
    value: Option<(K, T)>,
    generation: usize,
}

impl<K, T> Default for Request<K, T> {
    fn default() -> Self {
        Self {
            wanted: None,
            workers: Vec::new(),
            value: None,
            generation: 0,
        }
    }
}

impl<K: fmt::Debug, T> fmt::Debug for Request<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("wanted", &self.wanted)
            .field("in_flight", &self.workers.len())
            .field("ready", &self.value.as_ref().map(|(key, _)| key))
            .field("generation", &self.generation)
            .finish()
    }
}

impl<K, T> Request<K, T>
where
    K: Clone + PartialEq + fmt::Debug,
    T: Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wanted(&self) -> Option<&K> {
        self.wanted.as_ref()
    }

    /// Starts `job` for `key`. Earlier workers are superseded, not stopped.
    pub fn start<F>(&mut self, key: K, job: F)
    where
        F: FnOnce() -> T + Send + 'static,
    {
        log::debug!("request started for {key:?}");
        self.wanted = Some(key.clone());
        self.workers.push((key, std::thread::spawn(job)));
    }

    /// Starts `job` unless `key` is already wanted. Returns whether it started.
    pub fn ensure<F>(&mut self, key: K, job: F) -> bool
    where
        F: FnOnce() -> T + Send + 'static,
    {
        if self.wanted.as_ref() == Some(&key) {
            return false;
        }
        self.start(key, job);
        true
    }

    /// Forgets the wanted key and the current value. Running workers are
    /// detached and never observed.
    pub fn clear(&mut self) {
        self.wanted = None;
        self.value = None;
        self.workers.clear();
    }

    pub fn is_pending(&self) -> bool {
        self.workers
            .iter()
            .any(|(key, _)| self.wanted.as_ref() == Some(key))
    }

    /// Joins finished workers. Call once per frame.
    pub fn poll(&mut self) -> Delivery {
        let mut fresh = false;
        let mut stale = false;
        let mut failed = None;

        let mut idx = 0;
        while idx < self.workers.len() {
            if !self.workers[idx].1.is_finished() {
                idx += 1;
                continue;
            }
            let (key, handle) = self.workers.remove(idx);
            let current = self.wanted.as_ref() == Some(&key);
            match handle.join() {
                Ok(value) if current => {
                    self.value = Some((key, value));
                    self.generation += 1;
                    fresh = true;
                }
                Ok(_) => {
                    log::debug!("discarding stale response for {key:?}");
                    stale = true;
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    log::error!("request worker for {key:?} panicked: {message}");
                    if current {
                        failed = Some(message);
                    } else {
                        stale = true;
                    }
                }
            }
        }

        if fresh {
            Delivery::Fresh
        } else if let Some(message) = failed {
            Delivery::Failed(message)
        } else if self.is_pending() {
            Delivery::Pending
        } else if stale {
            Delivery::Stale
        } else {
            Delivery::Idle
        }
    }

    /// The most recent value, even if a newer key is pending.
    pub fn ready(&self) -> Option<&T> {
        self.value.as_ref().map(|(_, value)| value)
    }

    /// The value, only if it was produced for `key`.
    pub fn ready_for(&self, key: &K) -> Option<&T> {
        self.value
            .as_ref()
            .filter(|(ready, _)| ready == key)
            .map(|(_, value)| value)
    }

    /// Incremented with every fresh delivery.
    pub fn generation(&self) -> usize {
        self.generation
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_owned()
    }
}
