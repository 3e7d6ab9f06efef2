//! Cooperative task scheduling.

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::sync::Arc;

use flume::{Receiver, Sender};
use futures::future::BoxFuture;
use futures::task::{waker_ref, ArcWake};
use spin::Mutex;

/// A spawner trait for executing lifecycle futures on the host's task queue.
///
/// This abstraction lets a host plug the engine into whatever event loop it
/// already drives. Function pointers and closures implement it through the
/// blanket implementation; [`Scheduler`] is the built-in implementation.
pub trait Spawner: Send + Sync {
    /// Queue `future` for execution. It must not be polled before `spawn` returns.
    fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>);
}

impl<F> Spawner for F
where
    F: Fn(Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync,
{
    fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>) {
        self(future)
    }
}

struct Task {
    future: Mutex<Option<BoxFuture<'static, ()>>>,
    queue: Sender<Arc<Task>>,
}

impl ArcWake for Task {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.queue.send(arc_self.clone()).ok();
    }
}

/// Single-threaded cooperative executor.
///
/// Spawned futures and woken tasks are queued on a channel and only run when
/// the host calls [`run_until_idle`](Self::run_until_idle), the equivalent of
/// a micro-task checkpoint. A future is therefore never polled inside the
/// call that spawned or woke it.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use oxide_bind::{Scheduler, Spawner};
///
/// let scheduler = Scheduler::new();
/// let ran = Arc::new(AtomicBool::new(false));
/// let flag = ran.clone();
///
/// scheduler.spawn(Box::pin(async move { flag.store(true, Ordering::SeqCst) }));
/// assert!(!ran.load(Ordering::SeqCst));
///
/// scheduler.run_until_idle();
/// assert!(ran.load(Ordering::SeqCst));
/// ```
#[derive(Clone)]
pub struct Scheduler {
    sender: Sender<Arc<Task>>,
    receiver: Receiver<Arc<Task>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self { sender, receiver }
    }

    /// Poll queued tasks until none is ready. Returns how many polls ran.
    pub fn run_until_idle(&self) -> usize {
        let mut polls = 0;

        while let Ok(task) = self.receiver.try_recv() {
            // Take the future out so a task that wakes itself mid-poll is
            // re-queued rather than polled re-entrantly.
            let Some(mut future) = task.future.lock().take() else {
                continue;
            };

            let waker = waker_ref(&task);
            let mut cx = Context::from_waker(&waker);
            polls += 1;

            if let Poll::Pending = future.as_mut().poll(&mut cx) {
                *task.future.lock() = Some(future);
            }
        }

        polls
    }

    /// Number of tasks waiting to be polled.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

impl Spawner for Scheduler {
    fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>) {
        let task = Arc::new(Task {
            future: Mutex::new(Some(future)),
            queue: self.sender.clone(),
        });
        self.sender.send(task).ok();
    }
}
