//! Single-threaded, readiness-driven reactor (spec §4.D/§5).
//!
//! Grounded on the original `holytls` `src/holytls/core/reactor.cc` design
//! (a hand-rolled, non-async/await event loop), implemented here on top of
//! `mio::Poll` rather than a raw epoll/kqueue wrapper. One `Reactor` owns
//! exactly one OS thread; cross-thread work arrives through `post()`, which
//! pushes onto a lock-free queue and pings the reactor's `mio::Waker` so the
//! event loop wakes up even when nothing is readable.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_queue::SegQueue;
use mio::{Events, Interest, Poll, Token, Waker};

use crate::error::{HolyError, InternalError};

/// Hard upper bound on live registrations, matching the original's fixed
/// `kMaxFds` token table (spec §4.D).
pub const MAX_FDS: usize = 65_536;

/// Reserved token the `Waker` posts to; never assigned to a real source.
const WAKE_TOKEN: Token = Token(MAX_FDS);

/// Readiness callbacks a registered source implements.
pub trait Handler: Send {
    fn on_readable(&mut self, reactor: &mut ReactorHandle<'_>);
    fn on_writable(&mut self, reactor: &mut ReactorHandle<'_>);
    /// Called once, in place of the readable/writable callbacks, when the
    /// source's registration hit an error; the handler should tear itself
    /// down (it will be deregistered immediately after this call returns).
    fn on_error(&mut self, err: io::Error);
}

type PostedFn = Box<dyn FnOnce(&mut ReactorHandle<'_>) + Send>;

/// A narrow view into the reactor passed to callbacks, so handlers can
/// register/deregister/post without holding a `&mut Reactor` themselves.
pub struct ReactorHandle<'a> {
    poll: &'a mio::Poll,
    slots: &'a mut Vec<Option<Box<dyn Handler>>>,
    now_ms: i64,
}

impl<'a> ReactorHandle<'a> {
    pub fn now_ms(&self) -> i64 {
        self.now_ms
    }

    pub fn register(
        &mut self,
        source: &mut dyn mio::event::Source,
        interests: Interest,
        handler: Box<dyn Handler>,
    ) -> Result<Token, HolyError> {
        let token = first_free_slot(self.slots)?;
        self.poll
            .registry()
            .register(source, token, interests)
            .map_err(|e| HolyError::Internal(InternalError::Bug(format!("mio register failed: {e}"))))?;
        self.slots[token.0] = Some(handler);
        Ok(token)
    }

    pub fn reregister(
        &mut self,
        source: &mut dyn mio::event::Source,
        token: Token,
        interests: Interest,
    ) -> Result<(), HolyError> {
        self.poll
            .registry()
            .reregister(source, token, interests)
            .map_err(|e| HolyError::Internal(InternalError::Bug(format!("mio reregister failed: {e}"))))
    }

    pub fn deregister(&mut self, source: &mut dyn mio::event::Source, token: Token) {
        let _ = self.poll.registry().deregister(source);
        self.slots[token.0] = None;
    }
}

fn first_free_slot(slots: &mut [Option<Box<dyn Handler>>]) -> Result<Token, HolyError> {
    slots
        .iter()
        .position(|s| s.is_none())
        .map(Token)
        .ok_or(HolyError::Internal(InternalError::ReactorFull { max_fds: MAX_FDS }))
}

/// The event loop itself. Not `Sync` — one per OS thread, per
/// `ReactorManager` shard.
pub struct Reactor {
    poll: Poll,
    waker: Arc<Waker>,
    slots: Vec<Option<Box<dyn Handler>>>,
    posted: Arc<SegQueue<PostedFn>>,
    running: bool,
    started_at: Instant,
}

impl Reactor {
    pub fn new() -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        Ok(Self {
            poll,
            waker,
            slots: (0..MAX_FDS).map(|_| None).collect(),
            posted: Arc::new(SegQueue::new()),
            running: false,
            started_at: Instant::now(),
        })
    }

    /// A cheap, cloneable handle other threads use to schedule work onto
    /// this reactor (spec §4.D "post").
    pub fn poster(&self) -> ReactorPoster {
        ReactorPoster {
            waker: self.waker.clone(),
            posted: self.posted.clone(),
        }
    }

    pub fn register(
        &mut self,
        source: &mut dyn mio::event::Source,
        interests: Interest,
        handler: Box<dyn Handler>,
    ) -> Result<Token, HolyError> {
        let mut handle = ReactorHandle {
            poll: &self.poll,
            slots: &mut self.slots,
            now_ms: self.now_ms(),
        };
        handle.register(source, interests, handler)
    }

    pub fn now_ms(&self) -> i64 {
        self.started_at.elapsed().as_millis() as i64
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Runs the loop until `stop()` is called from within a callback, or
    /// until `max_iterations` readiness polls have happened (test hook;
    /// production callers pass `None`).
    pub fn run(&mut self, max_iterations: Option<usize>) -> io::Result<()> {
        self.running = true;
        let mut events = Events::with_capacity(1024);
        let mut iterations = 0usize;

        while self.running {
            self.poll.poll(&mut events, Some(Duration::from_millis(250)))?;

            for event in events.iter() {
                if event.token() == WAKE_TOKEN {
                    self.drain_posted();
                    continue;
                }
                self.dispatch(event);
            }

            iterations += 1;
            if let Some(max) = max_iterations {
                if iterations >= max {
                    break;
                }
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, event: &mio::event::Event) {
        let token = event.token();
        if token.0 >= self.slots.len() {
            return;
        }
        let now_ms = self.now_ms();
        let Some(mut handler) = self.slots[token.0].take() else {
            return;
        };

        {
            let mut handle = ReactorHandle { poll: &self.poll, slots: &mut self.slots, now_ms };
            if event.is_error() || event.is_read_closed() && event.is_write_closed() {
                handler.on_error(io::Error::new(io::ErrorKind::Other, "socket error or hangup"));
                return;
            }
            if event.is_readable() {
                handler.on_readable(&mut handle);
            }
            if event.is_writable() {
                handler.on_writable(&mut handle);
            }
        }

        // A callback may already have deregistered (and thus cleared) this
        // slot; only restore it if it's still empty and the handler wasn't
        // consumed by a deregister call.
        if self.slots[token.0].is_none() {
            self.slots[token.0] = Some(handler);
        }
    }

    fn drain_posted(&mut self) {
        let now_ms = self.now_ms();
        while let Some(job) = self.posted.pop() {
            let mut handle = ReactorHandle { poll: &self.poll, slots: &mut self.slots, now_ms };
            job(&mut handle);
        }
    }
}

/// A `Send + Sync` handle for scheduling closures to run on a reactor's own
/// thread, from any other thread.
#[derive(Clone)]
pub struct ReactorPoster {
    waker: Arc<Waker>,
    posted: Arc<SegQueue<PostedFn>>,
}

impl ReactorPoster {
    pub fn post(&self, job: impl FnOnce(&mut ReactorHandle<'_>) + Send + 'static) -> io::Result<()> {
        self.posted.push(Box::new(job));
        self.waker.wake()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn reactor_starts_and_stops_cleanly() {
        let mut reactor = Reactor::new().expect("reactor construction");
        reactor.run(Some(1)).expect("one poll iteration");
    }

    #[test]
    fn post_wakes_the_loop_and_runs_the_job() {
        let mut reactor = Reactor::new().expect("reactor construction");
        let poster = reactor.poster();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();

        poster.post(move |_handle| {
            ran2.fetch_add(1, Ordering::SeqCst);
        }).expect("post succeeds");

        reactor.run(Some(1)).expect("loop processes the wake");
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn now_ms_is_monotonic_non_negative() {
        let reactor = Reactor::new().expect("reactor construction");
        assert!(reactor.now_ms() >= 0);
    }
}
