#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs, unsafe_op_in_unsafe_fn)]
#![warn(rust_2018_idioms)]
//! This crate provides a hazard-pointer based safe memory reclamation engine
//! and an unbounded, fetch-and-add based MPMC FIFO queue built on top of it.
//!
//! # Feature-Flags
//! * `queues`: Enables the MPMC Queue
//! * `hazard_ptr`: Enables the Hazard-Pointer implementation
//! * `full`: Enables all the Feature-Flags

#[cfg(feature = "hazard_ptr")]
#[cfg_attr(docsrs, doc(cfg(feature = "hazard_ptr")))]
pub mod hazard_ptr;
#[cfg(feature = "queues")]
#[cfg_attr(docsrs, doc(cfg(feature = "queues")))]
pub mod queues;

pub(crate) mod sync;
