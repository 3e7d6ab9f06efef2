//! Cancellable units of lifecycle work.
//!
//! An [`Action`] is the handle for one piece of asynchronous work tied to a
//! node: a delay, a scripted animation, a CSS transition or a whole
//! sequence of them. It moves through exactly one of two transitions:
//!
//! ```text
//! Pending ──settle()──▶ Settled
//!    └─────cancel()───▶ Cancelled
//! ```
//!
//! Neither terminal state can be left. Cancelling runs the registered
//! canceller once; the completion path of a cancelled action is never taken.

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};
use std::sync::Arc;

use spin::Mutex;

use crate::scheduler::Spawner;

/// Cancellation function installed by whoever started the work.
pub type Canceller = Box<dyn FnOnce() + Send>;

/// Observable state of an [`Action`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionState {
    Pending,
    Settled,
    Cancelled,
}

/// How an action finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Settled,
    Cancelled,
}

impl Outcome {
    pub fn is_settled(self) -> bool {
        matches!(self, Outcome::Settled)
    }
}

enum Phase {
    Pending {
        canceller: Option<Canceller>,
        waiters: Vec<Waker>,
    },
    Settled,
    Cancelled,
}

/// Handle to one cancellable unit of work.
///
/// Clones share state; two handles are the same action when
/// [`same`](Self::same) says so.
#[derive(Clone)]
pub struct Action {
    phase: Arc<Mutex<Phase>>,
}

impl core::fmt::Debug for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Action").field(&self.state()).finish()
    }
}

impl Default for Action {
    fn default() -> Self {
        Self::pending()
    }
}

impl Action {
    pub fn pending() -> Self {
        Self {
            phase: Arc::new(Mutex::new(Phase::Pending {
                canceller: None,
                waiters: Vec::new(),
            })),
        }
    }

    /// An action that has already completed.
    pub fn settled() -> Self {
        Self {
            phase: Arc::new(Mutex::new(Phase::Settled)),
        }
    }

    pub fn state(&self) -> ActionState {
        match &*self.phase.lock() {
            Phase::Pending { .. } => ActionState::Pending,
            Phase::Settled => ActionState::Settled,
            Phase::Cancelled => ActionState::Cancelled,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == ActionState::Pending
    }

    pub fn same(&self, other: &Action) -> bool {
        Arc::ptr_eq(&self.phase, &other.phase)
    }

    /// Install the function [`cancel`](Self::cancel) will run.
    ///
    /// Dropped unused when the action has already finished, replaces any
    /// earlier canceller otherwise.
    pub fn set_canceller(&self, canceller: Canceller) {
        if let Phase::Pending { canceller: slot, .. } = &mut *self.phase.lock() {
            *slot = Some(canceller);
        }
    }

    /// Complete the action. Returns `false` when it had already finished.
    pub fn settle(&self) -> bool {
        let waiters = {
            let mut phase = self.phase.lock();
            match core::mem::replace(&mut *phase, Phase::Settled) {
                Phase::Pending { waiters, .. } => waiters,
                finished => {
                    *phase = finished;
                    return false;
                }
            }
        };

        waiters.into_iter().for_each(Waker::wake);
        true
    }

    /// Cancel the action. Cancelling a finished action does nothing and
    /// returns `false`.
    pub fn cancel(&self) -> bool {
        let (canceller, waiters) = {
            let mut phase = self.phase.lock();
            match core::mem::replace(&mut *phase, Phase::Cancelled) {
                Phase::Pending { canceller, waiters } => (canceller, waiters),
                finished => {
                    *phase = finished;
                    return false;
                }
            }
        };

        if let Some(canceller) = canceller {
            canceller();
        }
        waiters.into_iter().for_each(Waker::wake);
        true
    }

    /// Future resolving to how the action finished.
    pub fn finished(&self) -> Finished {
        Finished {
            action: self.clone(),
        }
    }

    /// Run `continuation` on a later tick if, and only if, the action settles.
    pub fn then<F>(&self, spawner: &dyn Spawner, continuation: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let finished = self.finished();
        spawner.spawn(Box::pin(async move {
            if finished.await.is_settled() {
                continuation();
            }
        }));
    }
}

/// Future returned by [`Action::finished`].
pub struct Finished {
    action: Action,
}

impl Future for Finished {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut phase = self.action.phase.lock();
        match &mut *phase {
            Phase::Settled => Poll::Ready(Outcome::Settled),
            Phase::Cancelled => Poll::Ready(Outcome::Cancelled),
            Phase::Pending { waiters, .. } => {
                if !waiters.iter().any(|waker| waker.will_wake(cx.waker())) {
                    waiters.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}
