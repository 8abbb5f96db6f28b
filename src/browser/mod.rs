//! Remote directory browsing.
//!
//! Directory structure is fetched lazily with `find`, a few levels at a
//! time, and cached. A directory is listed again only when it is not yet
//! fully explored or was explicitly refreshed.

mod cache;
mod navigator;
mod remote_ops;

pub use cache::{parse_listing, DirectoryCache, DirectoryNode};
pub use navigator::{
    BrowseAction, BrowsePrompt, DirectoryBrowser, DirectoryEntry, DirectoryView,
    DEFAULT_MAX_DEPTH,
};
pub use remote_ops::{existence_command, listing_command, mkdir_command, parse_existence};
