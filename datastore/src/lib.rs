//! # Background
//!
//! The 'datastore' for Apteryx is the in-memory tree of path/value entries the
//! daemon serves, plus the path grammar everything else is written against.
//!
//! Paths look like filesystem paths: `/interfaces/eth0/state`.  A trailing `/`
//! makes a *directory form* used for one-level searches and one-level watcher
//! patterns; a trailing `/*` makes a *wildcard suffix* matching a whole
//! subtree.  The empty string, `/`, `*` and `/*` are all spellings of the root
//! directory.
//!
//! # Library
//!
//! The `path` module validates and classifies paths and implements watcher
//! pattern matching.  The `tree` module holds the store itself: a trie keyed
//! by path segment where only the path→value mapping is observable.  Values
//! are opaque byte strings, and an empty value is the same thing as absence,
//! so storing an empty value deletes the entry.

pub mod error;
pub mod path;
pub mod tree;

pub use error::{Error, Result};
pub use path::{kind, PathKind, Pattern};
pub use tree::Tree;
