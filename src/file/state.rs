//! The open/load/unload/close lifecycle of one physical resource.
//!
//! Every request runs on the resource's own `ExecutionQueue` as an explicit work loop over
//! `(operation, step)`. A step either moves on to the next step, parks the operation in the
//! later queue (the state is busy, or an older operation has not completed yet), or hands the
//! operation to an I/O completion token. Parked operations are re-posted in order whenever a busy
//! state ends and whenever an operation completes.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::engine::{FrameHooks, ShortId};
use crate::sched::{ExecutionQueue, SchedulerShared};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Closed,
    Opening,
    Opened,
    Loading,
    Loaded,
    Unloading,
    Closing,
    /// A load arrived while unloading.
    WillReload,
    /// The unload finished, the pending load has to load again.
    CanReload,
    /// An open arrived while closing.
    WillReopen,
    /// The close finished, the pending open has to open again.
    CanReopen,
}

impl State {
    #[inline]
    pub fn is_busy(self) -> bool {
        match self {
            State::Opening
            | State::Loading
            | State::Unloading
            | State::Closing
            | State::WillReload
            | State::WillReopen => true,
            _ => false,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Who asked for the resource. Streaming users are the only ones that get streamed files loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpOrigin {
    Loading,
    Streaming,
}

pub type IncrementCallback = Box<dyn FnOnce(bool) + Send + 'static>;
pub type DecrementCallback = Box<dyn FnOnce() + Send + 'static>;
/// Receives the decrement callback once the state is deletable, and must invoke it.
pub type DeleteFn = Box<dyn FnOnce(DecrementCallback) + Send + 'static>;

/// The kind-specific I/O of a resource. Each call receives a completion token that must be
/// resolved exactly once, from any thread. A token dropped unresolved resolves as a failure (or
/// as done, for unload and close).
pub trait FileOps: Send + Sync + 'static {
    fn type_name(&self) -> &'static str;
    fn short_id(&self) -> ShortId;
    fn is_streamed(&self) -> bool;

    fn open_file(&self, done: OpenCompletion);
    fn load_in_sound_engine(&self, done: LoadCompletion);
    fn unload_from_sound_engine(&self, done: UnloadCompletion);
    fn close_file(&self, done: CloseCompletion);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Begin,
    Open,
    Load,
    Unload,
    Close,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Succeeded,
    Failed,
    Done,
    ToClosedFile,
    Deferred,
}

enum OpKind {
    Increment(IncrementCallback),
    Decrement {
        delete: DeleteFn,
        callback: DecrementCallback,
        stray: bool,
    },
}

struct Op {
    origin: OpOrigin,
    order: u64,
    kind: OpKind,
}

enum Next {
    Step(Op, Step),
    Later(Op, Step),
    Suspended,
    Finished,
}

struct Core {
    state: State,
    load_count: usize,
    streaming_count: usize,
    creation_op_order: u64,
    done_op_order: u64,
    later: VecDeque<(Op, Step)>,
}

pub struct FileState {
    ops: Box<dyn FileOps>,
    queue: ExecutionQueue,
    opened_instances: AtomicUsize,
    core: Mutex<Core>,
    frames: Arc<dyn FrameHooks>,
    pass_pending: AtomicBool,
}

impl FileState {
    pub fn new(
        ops: Box<dyn FileOps>,
        scheduler: Arc<SchedulerShared>,
        frames: Arc<dyn FrameHooks>,
    ) -> Arc<Self> {
        let name = format!("{} {}", ops.type_name(), ops.short_id());

        Arc::new(FileState {
            ops,
            queue: ExecutionQueue::new(name, scheduler),
            opened_instances: AtomicUsize::new(0),
            core: Mutex::new(Core {
                state: State::Closed,
                load_count: 0,
                streaming_count: 0,
                creation_op_order: 0,
                done_op_order: 0,
                later: VecDeque::new(),
            }),
            frames,
            pass_pending: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn ops(&self) -> &dyn FileOps {
        self.ops.as_ref()
    }

    #[inline]
    pub fn short_id(&self) -> ShortId {
        self.ops.short_id()
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.ops.type_name()
    }

    #[inline]
    pub fn state(&self) -> State {
        self.core().state
    }

    #[inline]
    pub fn load_count(&self) -> usize {
        self.core().load_count
    }

    #[inline]
    pub fn streaming_count(&self) -> usize {
        self.core().streaming_count
    }

    /// Increments that have been issued and whose matching decrement did not complete yet.
    #[inline]
    pub fn opened_instances(&self) -> usize {
        self.opened_instances.load(Ordering::SeqCst)
    }

    pub fn can_delete(&self) -> bool {
        let core = self.core();
        self.opened_instances() == 0 && core.state == State::Closed && core.load_count == 0
    }

    /// Adds a reference. `callback` receives true if the resource ended up in the state the
    /// caller needs: loaded, or opened for streamed files that nobody streams yet.
    pub fn increment_count_async<F>(self: &Arc<Self>, origin: OpOrigin, callback: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.reserve();
        self.increment_reserved(origin, callback);
    }

    // Counts the opened instance of an increment about to be issued.
    pub(crate) fn reserve(&self) {
        self.opened_instances.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_reserved<F>(self: &Arc<Self>, origin: OpOrigin, callback: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let op = Op {
            origin,
            order: 0,
            kind: OpKind::Increment(Box::new(callback)),
        };

        self.post(op, Step::Begin);
    }

    /// Releases a reference. Once nothing references the closed resource anymore, `delete` is
    /// handed `callback` instead of invoking it directly.
    pub fn decrement_count_async<D, F>(self: &Arc<Self>, origin: OpOrigin, delete: D, callback: F)
    where
        D: FnOnce(DecrementCallback) + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        let op = Op {
            origin,
            order: 0,
            kind: OpKind::Decrement {
                delete: Box::new(delete),
                callback: Box::new(callback),
                stray: false,
            },
        };

        self.post(op, Step::Begin);
    }

    /// Waits for outstanding work with at most `retries` round-trips through the queue, then
    /// closes the queue.
    pub fn term(&self, retries: u32) {
        for _ in 0..retries {
            if self.opened_instances() == 0 && !self.pass_pending.load(Ordering::SeqCst) {
                break;
            }

            self.queue.async_wait(|| {});
            ::std::thread::yield_now();
        }

        if self.opened_instances() > 0 {
            warn!(
                "{} {} terminated with {} opened instances.",
                self.type_name(),
                self.short_id(),
                self.opened_instances()
            );
        }

        self.queue.close();
    }

    fn core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap()
    }

    fn post(self: &Arc<Self>, op: Op, step: Step) {
        let this = self.clone();
        self.queue.async_(move || this.drive(Next::Step(op, step)));
    }

    fn drive(self: &Arc<Self>, mut next: Next) {
        loop {
            next = match next {
                Next::Step(op, step) => self.step(op, step),
                Next::Later(op, step) => {
                    self.core().later.push_back((op, step));
                    return;
                }
                Next::Suspended | Next::Finished => return,
            }
        }
    }

    fn step(self: &Arc<Self>, op: Op, step: Step) -> Next {
        let increment = match op.kind {
            OpKind::Increment(_) => true,
            OpKind::Decrement { .. } => false,
        };

        match step {
            Step::Begin if increment => self.begin_increment(op),
            Step::Begin => self.begin_decrement(op),
            Step::Open => self.open(op),
            Step::Load => self.load(op),
            Step::Unload => self.unload(op),
            Step::Close => self.close(op),
            Step::Done if increment => self.increment_done(op),
            Step::Done => self.decrement_done(op),
        }
    }

    fn begin_increment(self: &Arc<Self>, mut op: Op) -> Next {
        let mut core = self.core();
        op.order = core.creation_op_order;
        core.creation_op_order += 1;

        core.load_count += 1;
        if op.origin == OpOrigin::Streaming {
            core.streaming_count += 1;
        }

        Next::Step(op, Step::Open)
    }

    fn begin_decrement(self: &Arc<Self>, mut op: Op) -> Next {
        let mut core = self.core();
        op.order = core.creation_op_order;
        core.creation_op_order += 1;

        if core.load_count == 0 {
            warn!(
                "{} {} decremented without a matching increment.",
                self.type_name(),
                self.short_id()
            );

            if let OpKind::Decrement { ref mut stray, .. } = op.kind {
                *stray = true;
            }

            return Next::Step(op, Step::Done);
        }

        core.load_count -= 1;
        if op.origin == OpOrigin::Streaming {
            if core.streaming_count > 0 {
                core.streaming_count -= 1;
            } else {
                warn!(
                    "{} {} received a streaming decrement without streaming users.",
                    self.type_name(),
                    self.short_id()
                );
            }
        }

        if core.streaming_count > core.load_count {
            programming_error!(
                "{} {} has more streaming users than users.",
                self.type_name(),
                self.short_id()
            );
            core.streaming_count = core.load_count;
        }

        Next::Step(op, Step::Unload)
    }

    fn open(self: &Arc<Self>, op: Op) -> Next {
        {
            let mut core = self.core();

            if core.state.is_busy() {
                if core.state == State::Closing {
                    self.transit(&mut core, State::WillReopen);
                }

                return Next::Later(op, Step::Open);
            }

            if core.state == State::CanReopen {
                self.transit(&mut core, State::Closed);
            }

            if !self.can_open_file(&core) {
                return Next::Step(op, Step::Load);
            }

            self.transit(&mut core, State::Opening);
        }

        self.ops.open_file(OpenCompletion(Some(self.pending(op, Step::Open))));
        Next::Suspended
    }

    fn load(self: &Arc<Self>, op: Op) -> Next {
        {
            let mut core = self.core();

            if core.state.is_busy() {
                match core.state {
                    State::Unloading => self.transit(&mut core, State::WillReload),
                    State::Closing => self.transit(&mut core, State::WillReopen),
                    _ => {}
                }

                return Next::Later(op, Step::Open);
            }

            if core.state == State::CanReload {
                self.transit(&mut core, State::Opened);
            }

            if !self.can_load(&core) {
                return Next::Step(op, Step::Done);
            }

            self.transit(&mut core, State::Loading);
        }

        self.ops
            .load_in_sound_engine(LoadCompletion(Some(self.pending(op, Step::Load))));
        Next::Suspended
    }

    fn increment_done(self: &Arc<Self>, op: Op) -> Next {
        let result = {
            let mut core = self.core();

            if core.state.is_busy() || op.order != core.done_op_order {
                return Next::Later(op, Step::Done);
            }

            core.done_op_order += 1;

            match op.origin {
                OpOrigin::Streaming => core.state == State::Loaded,
                OpOrigin::Loading => {
                    core.state == State::Loaded
                        || (core.state == State::Opened && !self.can_load(&core))
                        || (core.state == State::Closed && !self.can_open_file(&core))
                }
            }
        };

        self.flush_later();

        if !result {
            debug!(
                "{} {} could not be made available.",
                self.type_name(),
                self.short_id()
            );
        }

        if let OpKind::Increment(callback) = op.kind {
            callback(result);
        }

        Next::Finished
    }

    fn unload(self: &Arc<Self>, op: Op) -> Next {
        {
            let mut core = self.core();

            if core.state.is_busy() {
                return Next::Later(op, Step::Unload);
            }

            if !self.can_unload(&core) {
                return Next::Step(op, Step::Close);
            }

            self.transit(&mut core, State::Unloading);
        }

        self.ops
            .unload_from_sound_engine(UnloadCompletion(Some(self.pending(op, Step::Unload))));
        Next::Suspended
    }

    fn close(self: &Arc<Self>, op: Op) -> Next {
        {
            let mut core = self.core();

            if core.state.is_busy() {
                return Next::Later(op, Step::Close);
            }

            if !self.can_close(&core) {
                return Next::Step(op, Step::Done);
            }

            self.transit(&mut core, State::Closing);
        }

        self.ops
            .close_file(CloseCompletion(Some(self.pending(op, Step::Close))));
        Next::Suspended
    }

    fn decrement_done(self: &Arc<Self>, op: Op) -> Next {
        let deletable = {
            let mut core = self.core();

            if core.state.is_busy() || op.order != core.done_op_order {
                return Next::Later(op, Step::Done);
            }

            core.done_op_order += 1;

            if let OpKind::Decrement { stray: false, .. } = op.kind {
                self.opened_instances.fetch_sub(1, Ordering::SeqCst);
            }

            self.opened_instances() == 0 && core.state == State::Closed && core.load_count == 0
        };

        self.flush_later();

        if let OpKind::Decrement {
            delete, callback, ..
        } = op.kind
        {
            if deletable {
                delete(callback);
            } else {
                callback();
            }
        }

        Next::Finished
    }

    fn complete(self: &Arc<Self>, op: Op, step: Step, outcome: Outcome) -> Next {
        let mut flush = true;

        let next = {
            let mut core = self.core();
            let state = core.state;

            match (step, outcome) {
                (Step::Open, Outcome::Succeeded) => {
                    self.expect_state(state, State::Opening);
                    self.transit(&mut core, State::Opened);
                    Next::Step(op, Step::Load)
                }
                (Step::Open, _) => {
                    self.expect_state(state, State::Opening);
                    warn!("Failed to open {} {}.", self.type_name(), self.short_id());
                    self.transit(&mut core, State::Closed);
                    Next::Step(op, Step::Load)
                }
                (Step::Load, Outcome::Succeeded) => {
                    self.expect_state(state, State::Loading);
                    self.transit(&mut core, State::Loaded);
                    Next::Step(op, Step::Done)
                }
                (Step::Load, _) => {
                    self.expect_state(state, State::Loading);
                    warn!("Failed to load {} {}.", self.type_name(), self.short_id());
                    self.transit(&mut core, State::Opened);
                    Next::Step(op, Step::Done)
                }
                (Step::Unload, Outcome::Deferred) => match state {
                    State::WillReload => {
                        self.transit(&mut core, State::Loaded);
                        Next::Step(op, Step::Done)
                    }
                    State::Unloading => {
                        self.transit(&mut core, State::Loaded);
                        flush = false;
                        self.arm_pass();
                        Next::Later(op, Step::Unload)
                    }
                    _ => {
                        self.expect_state(state, State::Unloading);
                        Next::Step(op, Step::Close)
                    }
                },
                (Step::Unload, Outcome::ToClosedFile) => {
                    match state {
                        State::WillReload => self.transit(&mut core, State::CanReopen),
                        _ => {
                            self.expect_state(state, State::Unloading);
                            self.transit(&mut core, State::Closed);
                        }
                    }

                    Next::Step(op, Step::Close)
                }
                (Step::Unload, _) => {
                    match state {
                        State::WillReload => self.transit(&mut core, State::CanReload),
                        _ => {
                            self.expect_state(state, State::Unloading);
                            self.transit(&mut core, State::Opened);
                        }
                    }

                    Next::Step(op, Step::Close)
                }
                (Step::Close, Outcome::Deferred) => match state {
                    State::WillReopen => {
                        self.transit(&mut core, State::Opened);
                        Next::Step(op, Step::Done)
                    }
                    State::Closing => {
                        self.transit(&mut core, State::Opened);
                        flush = false;
                        self.arm_pass();
                        Next::Later(op, Step::Close)
                    }
                    _ => {
                        self.expect_state(state, State::Closing);
                        Next::Step(op, Step::Done)
                    }
                },
                (Step::Close, _) => {
                    match state {
                        State::WillReopen => self.transit(&mut core, State::CanReopen),
                        _ => {
                            self.expect_state(state, State::Closing);
                            self.transit(&mut core, State::Closed);
                        }
                    }

                    Next::Step(op, Step::Done)
                }
                (Step::Begin, _) | (Step::Done, _) => {
                    programming_error!("Completion of a step without I/O.");
                    Next::Step(op, step)
                }
            }
        };

        if flush {
            self.flush_later();
        }

        next
    }

    fn pending(self: &Arc<Self>, op: Op, step: Step) -> Pending {
        Pending {
            file: self.clone(),
            op,
            step,
        }
    }

    // Re-posts every parked operation, in order.
    fn flush_later(self: &Arc<Self>) {
        let later: Vec<_> = self.core().later.drain(..).collect();
        for (op, step) in later {
            self.post(op, step);
        }
    }

    // Retries the engine-deferred operations after the next audio pass.
    fn arm_pass(self: &Arc<Self>) {
        if self.pass_pending.swap(true, Ordering::SeqCst) {
            return;
        }

        let this = self.clone();
        self.frames.after_pass(Box::new(move || {
            if this.queue.is_closed() || this.queue.is_being_closed() {
                return;
            }

            let file = this.clone();
            this.queue.async_(move || {
                file.pass_pending.store(false, Ordering::SeqCst);
                file.flush_later();
            });
        }));
    }

    fn transit(&self, core: &mut Core, to: State) {
        trace!(
            "{} {} transits from {} to {}.",
            self.type_name(),
            self.short_id(),
            core.state,
            to
        );

        core.state = to;
    }

    fn expect_state(&self, current: State, expected: State) {
        if current != expected {
            programming_error!(
                "{} {} is {} but {} was expected.",
                self.type_name(),
                self.short_id(),
                current,
                expected
            );
        }
    }

    fn can_open_file(&self, core: &Core) -> bool {
        core.state == State::Closed && core.load_count > 0
    }

    fn can_load(&self, core: &Core) -> bool {
        core.state == State::Opened && (!self.ops.is_streamed() || core.streaming_count > 0)
    }

    fn can_unload(&self, core: &Core) -> bool {
        core.state == State::Loaded
            && if self.ops.is_streamed() {
                core.streaming_count == 0
            } else {
                core.load_count == 0
            }
    }

    fn can_close(&self, core: &Core) -> bool {
        core.state == State::Opened && core.load_count == 0
    }
}

impl Drop for FileState {
    fn drop(&mut self) {
        let core = self.core();
        if core.load_count > 0 || !core.later.is_empty() {
            programming_error!(
                "{} {} dropped while still referenced.",
                self.ops.type_name(),
                self.ops.short_id()
            );
        }
    }
}

struct Pending {
    file: Arc<FileState>,
    op: Op,
    step: Step,
}

impl Pending {
    fn resume(self, outcome: Outcome) {
        let Pending { file, op, step } = self;
        let this = file.clone();
        file.queue.async_(move || {
            let next = this.complete(op, step, outcome);
            this.drive(next);
        });
    }
}

macro_rules! completion {
    ($name:ident, $fallback:expr, { $($method:ident => $outcome:expr,)+ }) => {
        pub struct $name(Option<Pending>);

        impl $name {
            $(
                pub fn $method(mut self) {
                    if let Some(v) = self.0.take() {
                        v.resume($outcome);
                    }
                }
            )+
        }

        impl Drop for $name {
            fn drop(&mut self) {
                if let Some(v) = self.0.take() {
                    warn!(
                        "{} of {} {} was dropped unresolved.",
                        stringify!($name),
                        v.file.type_name(),
                        v.file.short_id()
                    );
                    v.resume($fallback);
                }
            }
        }
    };
}

completion!(OpenCompletion, Outcome::Failed, {
    succeeded => Outcome::Succeeded,
    failed => Outcome::Failed,
});

completion!(LoadCompletion, Outcome::Failed, {
    succeeded => Outcome::Succeeded,
    failed => Outcome::Failed,
});

completion!(UnloadCompletion, Outcome::Done, {
    done => Outcome::Done,
    to_closed_file => Outcome::ToClosedFile,
    defer => Outcome::Deferred,
});

completion!(CloseCompletion, Outcome::Done, {
    done => Outcome::Done,
    defer => Outcome::Deferred,
});
