use std::path::PathBuf;

use failure::Fail;

use crate::engine::EngineError;

pub type Result<T> = ::std::result::Result<T, ::failure::Error>;

#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "{}", _0)]
    IO(::std::io::Error),
    #[fail(display = "{}", _0)]
    Json(::serde_json::Error),
    #[fail(display = "Undefined path {:?}.", _0)]
    FileNotFound(PathBuf),
    #[fail(display = "File {:?} is empty.", _0)]
    EmptyFile(PathBuf),
    #[fail(display = "File {:?} is not opened.", _0)]
    FileNotOpened(PathBuf),
    #[fail(display = "Sound engine rejected the operation: {}.", _0)]
    Engine(EngineError),
    #[fail(display = "Malformed settings: {}.", _0)]
    Settings(String),
    #[fail(display = "Service {} has been terminated.", _0)]
    Terminated(&'static str),
}

impl From<::std::io::Error> for Error {
    fn from(err: ::std::io::Error) -> Self {
        Error::IO(err)
    }
}

impl From<::serde_json::Error> for Error {
    fn from(err: ::serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        Error::Engine(err)
    }
}

/// Reports a broken invariant. Panics when debug assertions are enabled, logs and lets the
/// caller continue otherwise.
macro_rules! programming_error {
    ($($arg:tt)+) => {{
        error!($($arg)+);
        if cfg!(debug_assertions) && !::std::thread::panicking() {
            panic!($($arg)+);
        }
    }};
}
