//! Byte-signature scanning over raw memory ranges
//!
//! A signature is a pattern of concrete bytes interleaved with wildcard
//! positions. The scan engine locates the first (or every) occurrence of a
//! signature inside a byte range, picking the fastest scan kernel the current
//! CPU supports, and wraps hits in a result type that knows how to resolve
//! RIP-relative displacements at the match site.
//!
//! ```rust
//! use sigscan::scan::{self, ScanAlign, ScanHints, Signature};
//!
//! let haystack = [0x00, 0x01, 0x02, 0x03, 0x04];
//! let sig = Signature::parse("02 03").unwrap();
//!
//! let hit = scan::find_first(&haystack, &sig, ScanAlign::X1, ScanHints::NONE);
//! assert_eq!(hit.get(), haystack[2..].as_ptr());
//! ```
//!
//! # Note about lifetimes
//! A result borrows nothing: it is a raw address into the scanned range. It is
//! the caller's job to keep the backing memory alive (and unmoved) for as long
//! as the result is dereferenced.

#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(windows)]
pub mod module;
pub mod scan;
