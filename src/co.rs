use std::cell::Cell;
use std::fmt;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use crate::config::CoConfig;
use crate::error::{Error, Result};
use crate::message::{Input, Output};
use crate::stack::SuspendStack;

/// The state of a coroutine.
///
/// `Canceled`, `Panicked` and `Done` are terminal.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum State {
    NotRunning,
    Running,
    Suspending,
    Canceled,
    Panicked,
    Done,
}

impl State {
    pub fn is_terminal(self) -> bool {
        match self {
            State::Canceled | State::Panicked | State::Done => true,
            _ => false,
        }
    }

    fn is_resumable(self) -> bool {
        match self {
            State::NotRunning | State::Suspending => true,
            _ => false,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            State::NotRunning => "not running",
            State::Running => "running",
            State::Suspending => "suspending",
            State::Canceled => "canceled",
            State::Panicked => "panicked",
            State::Done => "done",
        };
        f.write_str(s)
    }
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A computation running on its own thread that only makes progress while
/// someone is blocked in `resume` or `cancel`.
///
/// Must not be resumed concurrently from several threads; a second resume
/// racing a running one is rejected with `CannotResume`.
pub struct Coroutine<I, O> {
    id: u64,
    state: Arc<Mutex<State>>,
    tx: Mutex<SyncSender<Input<I>>>,
    rx: Mutex<Receiver<Output<O>>>,
    point: Point<I, O>,
}

/// A coroutine's view of itself.
///
/// Handed to the body and freely cloned into whatever the body calls.
pub struct Yielder<I, O> {
    inner: Arc<YieldSide<I, O>>,
}

struct YieldSide<I, O> {
    id: u64,
    state: Arc<Mutex<State>>,
    tx: Mutex<SyncSender<Output<O>>>,
    rx: Mutex<Receiver<Input<I>>>,
}

impl<I, O> Clone for Yielder<I, O> {
    fn clone(&self) -> Self {
        Yielder {
            inner: self.inner.clone(),
        }
    }
}

impl<I: Send + 'static, O: Send + 'static> Coroutine<I, O> {
    pub fn new<F>(f: F) -> Result<Coroutine<I, O>>
    where
        F: FnOnce(I, &Yielder<I, O>) -> Result<O> + Send + 'static,
    {
        Coroutine::with_config(&CoConfig::default(), f)
    }

    /// Spawns the body's thread right away; it blocks until the first
    /// `resume`, so the body does no work before then.
    pub fn with_config<F>(config: &CoConfig, f: F) -> Result<Coroutine<I, O>>
    where
        F: FnOnce(I, &Yielder<I, O>) -> Result<O> + Send + 'static,
    {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(Mutex::new(State::NotRunning));

        // One slot each way is enough: the two sides strictly alternate.
        let (in_tx, in_rx) = sync_channel(1);
        let (out_tx, out_rx) = sync_channel(1);

        let yielder = Yielder {
            inner: Arc::new(YieldSide {
                id: id,
                state: state.clone(),
                tx: Mutex::new(out_tx),
                rx: Mutex::new(in_rx),
            }),
        };

        let body_side = yielder.clone();
        thread::Builder::new()
            .name(config.thread_name(id))
            .stack_size(config.stack_size)
            .spawn(move || run(f, body_side))
            .map_err(Error::Spawn)?;

        debug!(coroutine = id, "spawned coroutine");

        Ok(Coroutine {
            id: id,
            state: state,
            tx: Mutex::new(in_tx),
            rx: Mutex::new(out_rx),
            point: Point { yielder: yielder },
        })
    }
}

impl<I, O> Coroutine<I, O> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> State {
        *lock(&self.state)
    }

    /// Runs the body with `input` until it yields or returns.
    ///
    /// A panic inside the body is re-raised here.
    pub fn resume(&self, input: I) -> Result<O> {
        {
            let mut state = lock(&self.state);
            if !state.is_resumable() {
                return Err(Error::CannotResume(*state));
            }
            *state = State::Running;
        }

        trace!(coroutine = self.id, "resume");
        if lock(&self.tx).send(Input::Value(input)).is_err() {
            return Err(Error::Detached);
        }
        self.receive()
    }

    /// Like `resume`, but registers this coroutine on `points` for the
    /// duration of the call so that `suspend` can find it from anywhere in
    /// the body.
    pub fn resume_on(&self, points: &SuspendStack<Point<I, O>>, input: I) -> Result<O> {
        let _guard = PointGuard::new(points, self.point.clone());
        self.resume(input)
    }

    /// Delivers `Canceled` to the suspended body and waits for it to finish.
    ///
    /// Only a suspended coroutine can be canceled.
    pub fn cancel(&self) -> Result<()> {
        {
            let mut state = lock(&self.state);
            match *state {
                State::Suspending => *state = State::Canceled,
                s => return Err(Error::CannotCancel(s)),
            }
        }

        debug!(coroutine = self.id, "cancel");
        if lock(&self.tx).send(Input::Cancel).is_err() {
            return Err(Error::Detached);
        }
        match self.receive() {
            Ok(_) | Err(Error::Canceled) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn receive(&self) -> Result<O> {
        let m = lock(&self.rx).recv();
        match m {
            Ok(Output::Value(v)) => Ok(v),
            Ok(Output::Error(e)) => Err(e),
            Ok(Output::Panic(p)) => {
                *lock(&self.state) = State::Panicked;
                resume_unwind(p)
            }
            Err(_) => Err(Error::Detached),
        }
    }
}

impl<I, O> Drop for Coroutine<I, O> {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        let s = *state;
        if s.is_resumable() {
            // Our sender goes away with us, which the body sees as cancellation.
            warn!(coroutine = self.id, state = %s, "dropping unfinished coroutine");
            *state = State::Canceled;
        }
    }
}

impl<I, O> Yielder<I, O> {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Hands `out` to the current resumer and blocks until resumed again.
    pub fn yield_(&self, out: O) -> Result<I> {
        let inner = &*self.inner;
        {
            let mut state = lock(&inner.state);
            match *state {
                State::Running => *state = State::Suspending,
                State::Canceled => return Err(Error::Canceled),
                s => return Err(Error::CannotYield(s)),
            }
        }

        trace!(coroutine = inner.id, "yield");
        if lock(&inner.tx).send(Output::Value(out)).is_err() {
            return Err(self.canceled());
        }

        let m = lock(&inner.rx).recv();
        match m {
            Ok(Input::Value(v)) => Ok(v),
            Ok(Input::Cancel) => Err(Error::Canceled),
            Err(_) => Err(self.canceled()),
        }
    }

    fn canceled(&self) -> Error {
        debug!(coroutine = self.inner.id, "resumer went away");
        *lock(&self.inner.state) = State::Canceled;
        Error::Canceled
    }
}

fn run<I, O, F>(f: F, yielder: Yielder<I, O>)
where
    F: FnOnce(I, &Yielder<I, O>) -> Result<O>,
{
    let first = lock(&yielder.inner.rx).recv();
    let input = match first {
        Ok(Input::Value(input)) => input,
        // Dropped before it was ever resumed.
        Ok(Input::Cancel) | Err(_) => return,
    };

    BODY.with(|b| b.set(Some(yielder.id())));
    let outcome = catch_unwind(AssertUnwindSafe(|| f(input, &yielder)));

    let m = match outcome {
        Ok(r) => {
            let mut state = lock(&yielder.inner.state);
            if *state != State::Canceled {
                *state = State::Done;
            }
            Output::from(r)
        }
        Err(p) => {
            warn!(coroutine = yielder.inner.id, "coroutine body panicked");
            *lock(&yielder.inner.state) = State::Panicked;
            Output::Panic(p)
        }
    };

    // Nobody may be listening any more; that is fine.
    let _ = lock(&yielder.inner.tx).send(m);
}

/// A pending resume rendezvous: the yield side of one coroutine.
pub struct Point<I, O> {
    yielder: Yielder<I, O>,
}

impl<I, O> Clone for Point<I, O> {
    fn clone(&self) -> Self {
        Point {
            yielder: self.yielder.clone(),
        }
    }
}

impl<I, O> PartialEq for Point<I, O> {
    fn eq(&self, other: &Self) -> bool {
        self.yielder.id() == other.yielder.id()
    }
}

impl<I, O> Point<I, O> {
    pub fn coroutine_id(&self) -> u64 {
        self.yielder.id()
    }
}

struct PointGuard<'a, I, O> {
    points: &'a SuspendStack<Point<I, O>>,
    point: Point<I, O>,
}

impl<'a, I, O> PointGuard<'a, I, O> {
    fn new(points: &'a SuspendStack<Point<I, O>>, point: Point<I, O>) -> PointGuard<'a, I, O> {
        points.push(point.clone());
        PointGuard {
            points: points,
            point: point,
        }
    }
}

impl<'a, I, O> Drop for PointGuard<'a, I, O> {
    fn drop(&mut self) {
        self.points.delete_by_self(&self.point);
    }
}

thread_local! {
    // The coroutine whose body this thread is running, if any.
    static BODY: Cell<Option<u64>> = Cell::new(None);
    static DEPTH: Cell<usize> = Cell::new(0);
}

/// Calls to `nested` a thread may stack before the next one moves to a
/// fresh thread.
const MAX_NESTED: usize = 32;

/// Yields `out` to whoever is resuming the coroutine whose body the
/// current thread runs, without needing its `Yielder`.
///
/// Fails with `NoResumePoint` when called outside a body resumed through
/// `resume_on` with the same `points`.
pub fn suspend<I, O>(points: &SuspendStack<Point<I, O>>, out: O) -> Result<I> {
    let current = BODY.with(|b| b.get()).ok_or(Error::NoResumePoint)?;
    let point = points
        .pop_where(|p| p.coroutine_id() == current)
        .ok_or(Error::NoResumePoint)?;
    point.yielder.yield_(out)
}

struct DepthGuard(usize);

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(self.0));
    }
}

/// Runs `f`, which may recurse back into `nested` without bound.
///
/// Every `MAX_NESTED` levels the call continues on a new thread with
/// `config.stack_size` bytes of stack while this one waits for it. The new
/// thread acts for the same body, so `suspend` from inside `f` still
/// reaches the right point. Panics in `f` are re-raised here.
pub(crate) fn nested<R, F>(config: &CoConfig, f: F) -> Result<R>
where
    R: Send,
    F: FnOnce() -> Result<R> + Send,
{
    let depth = DEPTH.with(|d| d.get());
    if depth < MAX_NESTED {
        let _guard = DepthGuard(depth);
        DEPTH.with(|d| d.set(depth + 1));
        return f();
    }

    let body = BODY.with(|b| b.get());
    trace!(depth = depth, "continuing on a fresh stack");
    thread::scope(|s| {
        let handle = thread::Builder::new()
            .name(format!("{}-nested", config.name_prefix))
            .stack_size(config.stack_size)
            .spawn_scoped(s, move || {
                BODY.with(|b| b.set(body));
                DEPTH.with(|d| d.set(1));
                f()
            })
            .map_err(Error::Spawn)?;
        handle.join().unwrap_or_else(|p| resume_unwind(p))
    })
}
