//! A thin indirection over the atomics used throughout this crate.
//!
//! Under normal compilation this simply re-exports `core::sync::atomic`. When
//! built with `--cfg loom` for model-checking, it instead re-exports loom's
//! shadow atomics, which track the orderings and interleavings the checker
//! needs to see. Every algorithm in this crate goes through `crate::sync`
//! instead of `std::sync`/`core::sync` directly so the exact same source is
//! used in both configurations.

#[cfg(not(loom))]
pub(crate) use core::sync::atomic;

#[cfg(loom)]
pub(crate) use loom::sync::atomic;
