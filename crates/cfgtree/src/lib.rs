//! # cfgtree - hierarchical configuration
//!
//! Plain json (or yaml) documents, extended with references and derivation, resolved into one
//! self-contained configuration tree.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `cfgtree` works internally.
//!
//! ### Source documents
//!
//! ```json
//! {
//!   "includes": ["defaults.json"],
//!   "config": {
//!     "base_obj": {"n": 1},
//!     "derived": {"&derived": {"base": "/base_obj", "config": {"m": 2}}},
//!     "#opaque": {"kept": "as a single value"},
//!     "&copy": "/base_obj"
//!   }
//! }
//! ```
//!
//! [documents::Documents] loads a file and, depth-first, everything it includes. Each file only
//! has to be a valid document at this point. The format of a file is picked by its extension
//! from a [documents::FormatRegistry].
//!
//! ### Reading
//!
//! see [reader::Reader::read_documents]
//!
//! Every `config` object becomes a raw [node::Tree]. Member keys are checked and their decorator
//! decides what node they turn into:
//! - no decorator: objects become `Object` nodes, everything else a `Value`
//! - `#`: a `Value`, even for objects and arrays
//! - `&`: a placeholder, either a `NodeReference` (path string) or a `DerivedObject`
//!   (`base` plus optional `config`)
//!
//! Strings inside values get `${NAME}` expanded ([environment::EnvironmentVariables]).
//!
//! The raw trees of all documents are merged in load order, later documents win.
//!
//! ### Node tree
//!
//! All nodes of a tree live in one arena and are addressed by [node::NodeId]. Nodes know their
//! parent. Paths ([node_path::NodePath]) look like `/a/b`, `b/c` or `../c` and are resolved
//! relative to the parent of the placeholder that uses them.
//!
//! ### Resolution
//!
//! see [resolve::resolve_references]
//!
//! Placeholders are rewritten in place, pass after pass:
//!
//! | **pass** | `&copy` (`/base_obj`)   | `&derived` (base `/base_obj`)     |
//! |----------|-------------------------|-----------------------------------|
//! | 1        | `{"n": 1}`              | `{"n": 1, "m": 2}`                |
//!
//! A reference copies its target, even an unresolved one. A derivation waits until all bases are
//! resolved. When a pass changes nothing, it is repeated with external (already resolved)
//! configurations as a fallback lookup source. When that changes nothing either, or the cycle
//! limit is reached, resolution fails and reports every placeholder still left.
//!
//! ### Output
//!
//! A successful resolution yields a [config::Config]. It is read-only, can be decoded into typed
//! structures via [serde] and serialized again (see [serialize]).
//!
pub mod config;
pub mod documents;
pub mod environment;
pub mod node;
pub mod node_path;
pub mod reader;
pub mod resolve;
pub mod serialize;
mod visit;

pub use config::Config;
pub use node_path::NodePath;
pub use reader::Reader;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unable to load configuration")]
    Load(#[from] documents::LoadError),
    #[error("unable to read configuration")]
    Read(#[from] reader::ReadError),
    #[error("unable to resolve configuration")]
    Resolve(#[from] resolve::ResolveError),
}
