//! Skein - relationship graphs between issues.
//!
//! This crate tracks three kinds of edges on top of a host issue tracker:
//! blocking dependencies, group-reaction parent/child trees, and dispatches
//! that forward an issue to a branch and pull request in a target repository.
//! The host keeps ownership of issues, repositories, branches and pull
//! requests and exposes them through the traits in [`platform`].
//!
//! [`service::Relations`] is the entry point for request handlers.

#![forbid(unsafe_code)]

pub mod branches;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod graph;
pub mod platform;
pub mod service;
pub mod store;

pub use error::{Error, Result};
pub use service::Relations;
