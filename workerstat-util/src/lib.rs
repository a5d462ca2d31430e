//! Helper types used by `workerstat` sinks and their tests.
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

#[cfg(feature = "debugging")]
mod debugging;
#[cfg(feature = "debugging")]
pub use debugging::{CapturedPoint, DebuggingSink, Snapshotter};
