//! Remote drive access for campusdrive.
//!
//! This crate talks to a Graph-style drive API: it signs in, resolves the
//! shared folder the application works in, and exposes typed operations on
//! folders and spreadsheet files.
//!
//! # Design Principles
//! - One retry policy: every remote call goes through [`AuthorizedTransport`],
//!   which re-authenticates at most once per call on a 401 answer
//! - Pluggable seams: the HTTP layer ([`Transport`]) and credential source
//!   ([`TokenProvider`]) are traits, with in-memory implementations for tests
//! - Unified error semantics: all failures map onto `campusdrive_common::Error`

pub mod auth;
pub mod client;
pub mod config;
pub mod graph;
pub mod memory;
pub mod transport;

pub use auth::{AccessToken, DeviceCodeTokenProvider, StaticTokenProvider, TokenProvider, Tokens};
pub use client::{normalize_filename, DriveClient, DriveLocation};
pub use config::{AuthConfig, DriveConfig};
pub use graph::{ItemReference, ListResponse, RemoteItem};
pub use memory::MemoryDrive;
pub use transport::{
    ApiRequest, ApiResponse, AuthorizedTransport, ReqwestTransport, RequestBody, Transport,
};
