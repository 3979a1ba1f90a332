//! Skein CLI - a self-contained command line for skein.
//!
//! The binary keeps repositories, branches, issues and pull requests in a
//! local `SQLite` host ([`host::LocalHost`]) and drives the relation services
//! of the `skein` crate against it.

#![forbid(unsafe_code)]

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod output;
