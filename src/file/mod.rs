//! Physical resources: their lifecycle, the file I/O underneath, and the managers that hand
//! reference counts out to the loader.

pub mod cache;
pub mod external_source;
pub mod handler;
pub mod media;
pub mod memory;
pub mod soundbank;
pub mod state;
pub mod vfs;

pub use self::cache::{FileCache, FileCacheHandle};
pub use self::external_source::ExternalSourceFileManager;
pub use self::handler::FileHandler;
pub use self::media::MediaFileManager;
pub use self::soundbank::SoundBankFileManager;
pub use self::state::{FileOps, FileState, OpOrigin, State};
pub use self::vfs::{Directory, FileReader, FileSystem, IoPriority, Memory};
