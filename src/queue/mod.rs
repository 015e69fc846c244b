// Transaction queue - serializes transaction callbacks against the driver

use crate::driver::{Driver, TransactionHandle};
use crate::error::{ArborDbError, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Caller-facing handle on one queued transaction's eventual outcome.
///
/// A receipt settles exactly once: with the callback's value, with the
/// callback's error, with [`ArborDbError::TransactionPanicked`] if the
/// callback panicked, or with [`ArborDbError::Closed`] if the database
/// shut down before the transaction ran.
pub struct TransactionReceipt<T> {
    outcome: Receiver<Result<T>>,
}

impl<T> TransactionReceipt<T> {
    /// Block until the transaction settles.
    pub fn wait(self) -> Result<T> {
        match self.outcome.recv() {
            Ok(result) => result,
            // The runner was dropped without executing: the database
            // closed while this transaction was still queued.
            Err(mpsc::RecvError) => Err(ArborDbError::Closed),
        }
    }
}

/// Adapts one transaction callback into a single settlement of its
/// receipt.
///
/// The callback shape is uniform: synchronous, fallible by returning
/// `Err`. Panics inside the callback are contained and reported through
/// the receipt, never propagated into the drain loop.
pub(crate) struct TransactionRunner {
    execute: Box<dyn FnOnce(&dyn Driver) -> Option<String> + Send>,
}

impl TransactionRunner {
    /// Pair a callback with the receipt that will observe its outcome.
    pub(crate) fn new<T, F>(callback: F) -> (Self, TransactionReceipt<T>)
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn TransactionHandle) -> Result<T> + Send + 'static,
    {
        let (settle, outcome) = mpsc::sync_channel(1);
        let execute = Box::new(move |driver: &dyn Driver| {
            let caught = panic::catch_unwind(AssertUnwindSafe(|| {
                let mut handle = driver.create_transaction();
                callback(handle.as_mut())
            }));
            let result = match caught {
                Ok(settled) => settled,
                Err(payload) => Err(ArborDbError::TransactionPanicked(panic_text(&payload))),
            };
            let failure = result.as_ref().err().map(|e| e.to_string());
            // The caller may have dropped its receipt; that is not an error.
            let _ = settle.send(result);
            failure
        });
        (
            TransactionRunner { execute },
            TransactionReceipt { outcome },
        )
    }

    /// Execute the callback exactly once and settle the receipt. Returns
    /// the rendered error when the transaction failed, for the drain
    /// loop to log. Never panics outward.
    pub(crate) fn run(self, driver: &dyn Driver) -> Option<String> {
        (self.execute)(driver)
    }
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

/// FIFO queue of pending transactions drained by a single worker thread.
///
/// The channel is the queue and the worker is the drain loop: a single
/// consumer means at most one callback executes at any instant, in
/// enqueue order.
pub(crate) struct TransactionQueue {
    pending: Sender<TransactionRunner>,
    worker: JoinHandle<()>,
}

impl TransactionQueue {
    /// Spawn the worker thread and start draining.
    pub(crate) fn start(driver: Arc<dyn Driver>, opened: Arc<AtomicBool>) -> Result<Self> {
        let (pending, incoming) = mpsc::channel::<TransactionRunner>();
        let worker = thread::Builder::new()
            .name("arbordb-txn".into())
            .spawn(move || drain(incoming, driver, opened))?;
        Ok(TransactionQueue { pending, worker })
    }

    /// Enqueue a runner.
    pub(crate) fn submit(&self, runner: TransactionRunner) -> Result<()> {
        self.pending.send(runner).map_err(|_| ArborDbError::Closed)
    }

    /// Disconnect the queue and wait for the worker to finish the
    /// in-flight transaction and fail the rest.
    pub(crate) fn shutdown(self) {
        drop(self.pending);
        if self.worker.join().is_err() {
            log::error!("Transaction worker thread panicked");
        }
    }
}

/// The drain loop. Receives runners in FIFO order and runs them one at a
/// time. A failed transaction is logged and draining continues; once the
/// open flag clears, remaining runners are dropped unexecuted so their
/// receipts settle with `Closed`. Exits when every sender is gone.
fn drain(incoming: Receiver<TransactionRunner>, driver: Arc<dyn Driver>, opened: Arc<AtomicBool>) {
    while let Ok(runner) = incoming.recv() {
        if !opened.load(Ordering::Acquire) {
            drop(runner);
            continue;
        }
        if let Some(err) = runner.run(driver.as_ref()) {
            log::error!("Transaction failed: {err}");
        }
    }
}
