#![forbid(unsafe_code)]

//! File watching for livemark: one OS watch handle per path, shared by
//! any number of subscribers, with write-settle debouncing and
//! per-subscriber change/delete callbacks.
//!
//! The registry is pumped from the host's event loop; nothing here
//! spawns threads of its own. See [`WatchRegistry`].

mod disk_io;
mod error;
mod listeners;
mod registry;
mod settle;

pub use disk_io::FileStats;
pub use error::{CallbackError, WatchError};
pub use listeners::{ListenerId, SubscriberId};
pub use registry::{
    ChangeCallback, ChangeEvent, DeleteCallback, DeleteEvent, POLL_INTERVAL, SETTLE_THRESHOLD,
    WatchRegistry,
};
