//! # What is This?
//!
//! An asynchronous resource loader for interactive audio runtimes. Audio objects (events, buses,
//! sound banks, media...) are mapped onto the files they need, and each file is reference counted
//! so it is read and handed to the sound engine once, however many objects use it.
//!
//! The crate is organized in layers:
//!
//! 1. `sched`: a worker pool, serial execution queues on top of it, and one-shot promises.
//! 2. `file`: per-file state machines driven through open, load, unload and close, plus a cache
//! of open file handles.
//! 3. `loader`: the bookkeeping of loaded objects, switch container leaves and language
//! variants.
//!
//! `SoundResourceSystem` wires them together from a `LoaderSettings`.

#[macro_use]
extern crate log;
#[macro_use]
extern crate failure;

#[macro_use]
pub mod errors;
#[macro_use]
pub mod utils;

pub mod engine;
pub mod file;
pub mod loader;
pub mod prelude;
pub mod sched;
pub mod settings;
pub mod system;
