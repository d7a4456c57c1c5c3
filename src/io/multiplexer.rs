//! `IOMultiplexer`, spec §4.1.
//!
//! A single-threaded readiness poll over a set of workers plus a self-pipe
//! "pinger" — here `mio::Waker`, which is exactly that primitive on every
//! platform mio supports, so there is no reason to hand-roll one.

use std::{
    collections::HashMap,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use log::{debug, warn};
use mio::{Events, Interest, Poll, Token};

use super::worker::{Endpoint, Worker};

const WAKER_TOKEN: Token = Token(0);
const FIRST_WORKER_TOKEN: usize = 1;

pub struct IoMultiplexer {
    poll: Poll,
    events: Events,
    workers: HashMap<Token, Worker>,
    next_token: usize,
    waker: Arc<mio::Waker>,
    in_select: u32,
    close_requested: bool,
    closed: bool,
}

impl IoMultiplexer {
    pub fn new() -> io::Result<IoMultiplexer> {
        let poll = Poll::new()?;
        let waker = Arc::new(mio::Waker::new(poll.registry(), WAKER_TOKEN)?);
        Ok(IoMultiplexer {
            poll,
            events: Events::with_capacity(128),
            workers: HashMap::new(),
            next_token: FIRST_WORKER_TOKEN,
            waker,
            in_select: 0,
            close_requested: false,
            closed: false,
        })
    }

    /// Wraps an endpoint, registering it atomically with the poll.
    pub fn create_worker(&mut self, endpoint: impl Endpoint + 'static) -> io::Result<Token> {
        let token = Token(self.next_token);
        self.next_token += 1;
        let mut worker = Worker::new(endpoint);
        self.poll
            .registry()
            .register(worker.source(), token, Interest::READABLE | Interest::WRITABLE)?;
        self.workers.insert(token, worker);
        Ok(token)
    }

    pub fn worker(&self, token: Token) -> Option<&Worker> {
        self.workers.get(&token)
    }

    pub fn worker_mut(&mut self, token: Token) -> Option<&mut Worker> {
        self.workers.get_mut(&token)
    }

    pub fn queue_send(&mut self, token: Token, data: &[u8]) {
        if let Some(w) = self.workers.get_mut(&token) {
            w.queue_send(data);
        }
    }

    /// Wakes a pending `select`/`sleep`. The only operation safe to call
    /// from another thread (spec §5).
    pub fn ping(&self) -> io::Result<()> {
        self.waker.wake()
    }

    /// A clonable handle to the waker, for callers that need to ping from
    /// another thread without holding a lock on the multiplexer itself
    /// (spec §5).
    pub fn waker(&self) -> Arc<mio::Waker> {
        Arc::clone(&self.waker)
    }

    /// Polls; dispatches readable workers' inbound bytes, services writable
    /// workers, and closes failed workers. Errored/closed workers first,
    /// then reads, then writes (spec §5 ordering guarantee).
    pub fn select(&mut self, timeout: Duration) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.in_select += 1;
        let result = self.select_once(timeout);
        self.in_select -= 1;
        if self.in_select == 0 && self.close_requested && !self.closed {
            self.do_close_all();
        }
        result
    }

    fn select_once(&mut self, timeout: Duration) -> io::Result<()> {
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }

        let mut errored = Vec::new();
        let mut readable = Vec::new();
        let mut writable = Vec::new();
        for event in self.events.iter() {
            let token = event.token();
            if token == WAKER_TOKEN {
                continue;
            }
            if event.is_error() || (event.is_read_closed() && event.is_write_closed()) {
                errored.push(token);
            } else {
                if event.is_readable() {
                    readable.push(token);
                }
                if event.is_writable() {
                    writable.push(token);
                }
            }
        }

        for token in errored {
            self.close_worker(token);
        }
        for token in readable {
            self.service_readable(token)?;
        }
        for token in writable {
            self.service_writable(token)?;
        }
        Ok(())
    }

    fn service_readable(&mut self, token: Token) -> io::Result<()> {
        let outcome = match self.workers.get_mut(&token) {
            Some(w) => w.service_readable(),
            None => return Ok(()),
        };
        match outcome {
            Ok(true) => {}
            Ok(false) => {
                warn!("closing worker {token:?} due to empty read");
                self.close_worker(token);
            }
            Err(e) => {
                warn!("socket error on worker {token:?}: {e}");
                self.close_worker(token);
            }
        }
        Ok(())
    }

    fn service_writable(&mut self, token: Token) -> io::Result<()> {
        let outcome = match self.workers.get_mut(&token) {
            Some(w) if w.has_pending_send() => w.service_writable(),
            _ => return Ok(()),
        };
        if let Err(e) = outcome {
            warn!("socket error writing worker {token:?}: {e}");
            self.close_worker(token);
        }
        Ok(())
    }

    fn close_worker(&mut self, token: Token) {
        if let Some(mut w) = self.workers.remove(&token) {
            let _ = self.poll.registry().deregister(w.source());
            w.mark_closed();
        }
    }

    /// Repeatedly `select`s with the remaining budget until `d` elapses.
    /// Never busy-waits; any byte that arrives during the sleep is buffered
    /// into its worker before this returns (spec §4.1 contract).
    pub fn sleep(&mut self, d: Duration) -> io::Result<()> {
        let start = Instant::now();
        loop {
            if self.closed {
                return Ok(());
            }
            let elapsed = start.elapsed();
            if elapsed >= d {
                return Ok(());
            }
            self.select(d - elapsed)?;
        }
    }

    /// If called during a `select`, defers actual teardown until that
    /// `select` returns; otherwise tears down immediately (spec §4.1).
    pub fn close_all(&mut self) {
        if self.in_select > 0 {
            self.close_requested = true;
            let _ = self.ping();
        } else {
            self.do_close_all();
        }
    }

    fn do_close_all(&mut self) {
        let tokens: Vec<Token> = self.workers.keys().copied().collect();
        for token in tokens {
            self.close_worker(token);
        }
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Hands the select loop to a short-lived background thread for the
    /// duration of `read_fn` (e.g. a blocking terminal read), then signals
    /// shutdown, pings, and joins before returning (spec §4.1, §5). No I/O
    /// overlap with the caller is possible after this returns: the thread
    /// is joined and this multiplexer is handed back exclusively.
    pub fn take_over_for_terminal_read<F, R>(mut self, read_fn: F) -> (IoMultiplexer, R)
    where
        F: FnOnce() -> R,
    {
        let done = Arc::new(AtomicBool::new(false));
        let done_bg = Arc::clone(&done);
        let handle = thread::Builder::new()
            .name("BackgroundIOThread".into())
            .spawn(move || {
                while !done_bg.load(Ordering::Acquire) {
                    if self.select(Duration::from_millis(200)).is_err() {
                        break;
                    }
                }
                self
            })
            .expect("failed to spawn background IO thread");

        let result = read_fn();
        done.store(true, Ordering::Release);
        debug!("terminal read finished, signalling background IO thread");
        // best-effort: the thread also polls `done` on its own cadence
        let this = handle.join().expect("background IO thread panicked");
        let _ = this.ping();
        (this, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::net::{TcpListener, TcpStream};
    use std::net::SocketAddr;

    fn loopback_pair() -> (TcpStream, TcpStream) {
        let mut listener = TcpListener::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        // Accept loop: a fresh-bound listener may need a moment.
        let mut poll = Poll::new().unwrap();
        poll.registry()
            .register(&mut listener, Token(99), Interest::READABLE)
            .unwrap();
        let mut events = Events::with_capacity(4);
        poll.poll(&mut events, Some(Duration::from_secs(2))).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn sleep_buffers_bytes_arriving_during_the_wait() {
        let (mut client, server) = loopback_pair();
        let mut mux = IoMultiplexer::new().unwrap();
        let token = mux.create_worker(server).unwrap();

        use std::io::Write;
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            client.write_all(b"hello").unwrap();
        });

        mux.sleep(Duration::from_millis(300)).unwrap();
        assert_eq!(mux.worker(token).unwrap().received(), b"hello");
    }

    #[test]
    fn empty_read_closes_the_worker() {
        let (client, server) = loopback_pair();
        let mut mux = IoMultiplexer::new().unwrap();
        let token = mux.create_worker(server).unwrap();
        drop(client);
        mux.sleep(Duration::from_millis(300)).unwrap();
        assert!(mux.worker(token).is_none());
    }

    #[test]
    fn ping_wakes_a_pending_select() {
        let mut mux = IoMultiplexer::new().unwrap();
        let waker = mux.waker();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            waker.wake().unwrap();
        });
        let start = Instant::now();
        mux.select(Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn close_all_during_select_is_deferred() {
        let mut mux = IoMultiplexer::new().unwrap();
        mux.in_select = 1;
        mux.close_all();
        assert!(!mux.is_closed());
        assert!(mux.close_requested);
        mux.in_select = 0;
        mux.select(Duration::from_millis(10)).unwrap();
        assert!(mux.is_closed());
    }
}
