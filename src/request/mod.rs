//! Request descriptions and the keys derived from them.
//!
//! A [`RequestDescriptor`] says *what* to fetch. A [`Key`] is the canonical
//! identity of a descriptor under a [`KeyTag`], used to share one poll loop
//! between every observer of the same request.

mod descriptor;
mod key;

pub use descriptor::{Filter, RequestDescriptor, RequestParams, Sort};
pub use key::{derive_key, Key, KeyTag};
