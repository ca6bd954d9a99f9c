//! In-Memory DOM
//!
//! The document emulation used to build markup on the server and to bind
//! cells onto an already-parsed tree on the client. Three pieces:
//!
//! - [`node`]: the tree itself — elements, text, comments, fragments — and
//!   the HTML serializer
//! - [`markers`]: the `s:ID`/`e:ID` comment protocol delimiting dynamic
//!   regions, plus region scanning and in-place updates
//! - [`casemap`]: camelCase↔kebab-case adapter backing style and dataset
//!   storage

pub mod casemap;
pub mod markers;
pub mod node;

pub use casemap::{camel_to_kebab, kebab_to_camel, CaseMappedMap};
pub use markers::{scan_regions, RegionHandle, RegionRecord};
pub use node::{Document, DomNode};
