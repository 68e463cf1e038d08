#![forbid(unsafe_code)]
//! Asynchronous bridge carrying raw filesystem operations across a
//! network boundary.
//!
//! This crate provides a tokio-based transport for the low-level
//! filesystem operation set: lookup, attribute access, file I/O,
//! directory listing, locking and extended attributes travel over a
//! framed byte stream between a forwarding client and a serving peer.
//!
//! # Overview
//!
//! Two adapters meet in the middle:
//!
//! - [`srv::Server`] accepts connections and dispatches decoded calls
//!   to a native [`RawFilesystem`] implementation.
//! - [`client::RemoteFs`] implements [`RawFilesystem`] itself and
//!   forwards every operation over a [`client::Connection`].
//!
//! Composing them turns any local filesystem backend into a network
//! service and back again without either side knowing the difference.
//!
//! # Getting Started
//!
//! To serve a filesystem you need to:
//!
//! 1. Implement the [`RawFilesystem`] trait for your backend type
//! 2. Start the server with [`srv::srv_async`] or related functions
//!
//! # Example
//!
//! ```no_run
//! use netfuse::{srv::srv_async, ops::{RawFilesystem, InHeader, AttrOut, GetAttrIn}, Interrupt, Status, Result};
//! use async_trait::async_trait;
//!
//! struct MyFs;
//!
//! #[async_trait]
//! impl RawFilesystem for MyFs {
//!     async fn getattr(
//!         &self,
//!         _intr: &Interrupt,
//!         arg: &GetAttrIn,
//!         out: &mut AttrOut,
//!     ) -> Status {
//!         out.attr.ino = arg.header.nodeid;
//!         out.attr.mode = 0o040755;
//!         Status::OK
//!     }
//!
//!     // Operations left unimplemented report ENOSYS to the caller.
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     srv_async(MyFs, "tcp!127.0.0.1!7878").await
//! }
//! ```
//!
//! # Protocol Details
//!
//! ## Message Flow
//!
//! Every call is a tagged request message answered on the same tag.
//! Single-shot operations get exactly one reply carrying a [`Status`]
//! payload next to the output fields. Read and directory listing
//! replies stream: zero or more chunk frames followed by an
//! end-of-stream marker, so a large result never materializes as one
//! oversized message.
//!
//! ## Status vs. abort
//!
//! An operation that fails in the backend (`ENOENT`, `EACCES`, ...)
//! still succeeds at the transport level; its errno travels as payload.
//! Only two things abort a call outright: an operation the serving side
//! does not implement, and an internal failure on the serving side.
//! The forwarding client translates those back to `ENOSYS` and `EIO`.
//!
//! ## Cancellation
//!
//! Each call carries an [`Interrupt`]. Firing it on the calling side
//! posts an interrupt message for the in-flight tag and resolves the
//! local call with `EINTR`; the serving side fires the matching
//! [`Interrupt`] handed to the backend, which may then give up early.
//!
//! # Transport
//!
//! The library supports multiple transports:
//! - **TCP**: `"tcp!host!port"` (e.g., `"tcp!0.0.0.0!7878"`)
//! - **Unix Domain Sockets**: `"unix!path!suffix"` (e.g., `"unix!/tmp/socket!0"`)
//!
//! # Safety
//!
//! This crate forbids unsafe code (`#![forbid(unsafe_code)]`) and relies
//! on Rust's type system for memory safety. All operations are async and
//! designed to be cancellation-safe.
pub mod cancel;
pub mod chunk;
pub mod client;
pub mod dirent;
pub mod error;
pub mod ops;
pub mod serialize;
pub mod srv;
pub mod status;
#[macro_use]
pub mod utils;
pub mod wire;

pub use crate::cancel::Interrupt;
pub use crate::client::{Connection, RemoteFs, connect};
pub use crate::dirent::{DirEntry, DirEntryList};
pub use crate::error::Error;
pub use crate::ops::RawFilesystem;
pub use crate::srv::{Server, srv_async};
pub use crate::status::{AbortCode, Status};
pub use crate::utils::Result;
pub use crate::wire::{FsCall, Msg};
