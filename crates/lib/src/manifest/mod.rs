//! Remote manifest retrieval.
//!
//! A manifest is the server-declared list of files (name, size, digest, URL) that make up the
//! expected state of the install directory. Two sources produce one: a generic update backend
//! serving `/api/files`, and a source-hosting repository listing served by its contents API.

mod client;
mod types;

pub use client::{ManifestClient, ManifestSource, RepositorySource};
pub use types::{FileRecord, Manifest, ManifestEntry, ManifestError, VersionEntry, VersionInfo};
