//! Blocking hand-off from background handlers into the authoritative
//! context that owns the host world.
//!
//! A handler packs everything it needs to mutate into one closure and
//! calls [`AuthorityHandle::run`]; the tick loop executes queued closures
//! between ticks via [`AuthorityInbox`] and the handler thread blocks until
//! the reply arrives.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

pub type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

thread_local! {
    static ON_AUTHORITY: Cell<bool> = const { Cell::new(false) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffError {
    /// The authoritative context has shut down.
    Closed,
    /// The closure was discarded without running.
    Dropped,
    /// Called from inside a closure already running on the authority.
    Nested,
    /// Another hand-off through the same handle is still outstanding.
    Overlapping,
}

impl fmt::Display for HandoffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Closed => "authoritative context closed",
            Self::Dropped => "hand-off dropped before it ran",
            Self::Nested => "nested hand-off; batch the work into one closure",
            Self::Overlapping => "hand-off already outstanding",
        };
        f.write_str(text)
    }
}

impl std::error::Error for HandoffError {}

/// Sending side, held by the background context.
pub struct AuthorityHandle<S> {
    tx: mpsc::UnboundedSender<Job<S>>,
    busy: Arc<AtomicBool>,
}

impl<S> Clone for AuthorityHandle<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            busy: Arc::clone(&self.busy),
        }
    }
}

/// Receiving side, drained by the tick loop.
pub struct AuthorityInbox<S> {
    rx: mpsc::UnboundedReceiver<Job<S>>,
}

pub fn channel<S>() -> (AuthorityHandle<S>, AuthorityInbox<S>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        AuthorityHandle {
            tx,
            busy: Arc::new(AtomicBool::new(false)),
        },
        AuthorityInbox { rx },
    )
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct OnAuthority;

impl OnAuthority {
    fn enter() -> Self {
        ON_AUTHORITY.with(|flag| flag.set(true));
        Self
    }
}

impl Drop for OnAuthority {
    fn drop(&mut self) {
        ON_AUTHORITY.with(|flag| flag.set(false));
    }
}

impl<S: 'static> AuthorityHandle<S> {
    /// Run `f` on the authoritative context and wait for its result.
    ///
    /// Must be called from a blocking-capable thread, never from an async
    /// task.
    pub fn run<R, F>(&self, f: F) -> Result<R, HandoffError>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        if ON_AUTHORITY.with(Cell::get) {
            return Err(HandoffError::Nested);
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(HandoffError::Overlapping);
        }
        let _busy = BusyGuard(&self.busy);

        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job<S> = Box::new(move |state| {
            let _ = reply_tx.send(f(state));
        });
        self.tx.send(job).map_err(|_| HandoffError::Closed)?;
        reply_rx.blocking_recv().map_err(|_| HandoffError::Dropped)
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl<S> AuthorityInbox<S> {
    /// Run every queued closure against `state`. Returns how many ran.
    pub fn pump(&mut self, state: &mut S) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            Self::execute(job, state);
            ran += 1;
        }
        ran
    }

    /// Wait for the next closure. `None` once every handle is gone.
    pub async fn recv(&mut self) -> Option<Job<S>> {
        self.rx.recv().await
    }

    pub fn execute(job: Job<S>, state: &mut S) {
        let _on = OnAuthority::enter();
        job(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn wait_busy<S: 'static>(handle: &AuthorityHandle<S>) {
        while !handle.is_busy() {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn run_blocks_until_the_authority_pumps() {
        let (handle, mut inbox) = channel::<Vec<u32>>();
        let worker = thread::spawn(move || handle.run(|state| {
            state.push(7);
            state.len()
        }));

        let mut state = vec![1];
        while inbox.pump(&mut state) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(worker.join().unwrap(), Ok(2));
        assert_eq!(state, vec![1, 7]);
    }

    #[test]
    fn second_hand_off_while_one_is_outstanding_is_rejected() {
        let (handle, mut inbox) = channel::<u32>();
        let first = handle.clone();
        let worker = thread::spawn(move || first.run(|n| *n += 1));
        wait_busy(&handle);

        assert_eq!(handle.run(|n| *n += 10), Err(HandoffError::Overlapping));

        let mut state = 0;
        while inbox.pump(&mut state) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(worker.join().unwrap(), Ok(()));
        assert_eq!(state, 1);
        assert!(!handle.is_busy());
    }

    #[test]
    fn hand_off_from_inside_the_authority_is_nested() {
        let (handle, mut inbox) = channel::<u32>();
        let inner = handle.clone();
        let worker = thread::spawn(move || handle.run(move |_| inner.run(|n| *n += 1)));

        let mut state = 0;
        while inbox.pump(&mut state) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(worker.join().unwrap(), Ok(Err(HandoffError::Nested)));
        assert_eq!(state, 0);
    }

    #[test]
    fn closed_and_dropped_are_distinguished() {
        let (handle, inbox) = channel::<u32>();
        drop(inbox);
        assert_eq!(handle.run(|_| ()), Err(HandoffError::Closed));

        let (handle, inbox) = channel::<u32>();
        let observer = handle.clone();
        let worker = thread::spawn(move || handle.run(|_| ()));
        wait_busy(&observer);
        // Give the closure time to be queued, then discard it unrun.
        thread::sleep(Duration::from_millis(20));
        drop(inbox);
        assert_eq!(worker.join().unwrap(), Err(HandoffError::Dropped));
    }
}
