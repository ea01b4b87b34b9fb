//! Commonly used utilities like handles, pools and hashing.

#[macro_use]
pub mod handle;
pub mod handle_pool;
pub mod hash;
pub mod object_pool;

pub use self::handle::{Handle, HandleIndex, HandleLike};
pub use self::handle_pool::HandlePool;
pub use self::hash::FastHashMap;
pub use self::object_pool::ObjectPool;
