//! vsfs-core: a minimal Unix-style on-disk file system, implemented as a
//! library over a borrowed `&mut [u8]` image. The crate never maps a file
//! itself — that's the adapter's job (`vsfs-mkfs`, `vsfs-fuse`), each of
//! which owns a `memmap2::MmapMut` and hands this crate the byte slice
//! backing it.
//!
//! Module map:
//! - [`layout`] — block-layout constants and region arithmetic.
//! - [`disk`] — byte-exact on-disk record definitions and their codec.
//! - [`bitmap`] — the inode/data block allocator primitive.
//! - [`format`] — builds a fresh, empty file system into a sized image.
//! - [`mount`] — validates an existing image and exposes [`mount::MountContext`].
//! - [`path`] — resolves absolute paths against the root directory.
//! - [`ops`] — the operations engine: statfs, getattr, readdir, create,
//!   unlink, utimens, truncate, read, write.
//! - [`error`] — the shared error type and its errno mapping.

pub mod bitmap;
pub mod disk;
pub mod error;
pub mod format;
pub mod layout;
pub mod mount;
pub mod ops;
pub mod path;

pub use error::{VsfsError, VsfsResult};
pub use format::{format as format_image, FormatOptions};
pub use mount::MountContext;
