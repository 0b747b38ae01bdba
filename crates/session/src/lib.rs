//! Caller-side download sessions on top of `fastpve-download`.
//!
//! The engine transfers bytes; this crate decides *what* to transfer and
//! keeps the state file in step:
//!
//! 1. **Source**: a restored record, explicit candidates, or an iStoreOS
//!    release resolved through its version index ([`catalog`])
//! 2. **Select**: remote URL cache first, then the candidates in order
//! 3. **Transfer**: save the record, run the engine with a progress
//!    reporter, save the updated record whatever the outcome

pub mod catalog;
pub mod error;
pub mod fetcher;
pub mod reporter;
pub mod session;

pub use catalog::{IstoreRelease, resolve_urls};
pub use error::SessionError;
pub use fetcher::ArtifactFetcher;
pub use reporter::ProgressReporter;
pub use session::{
    ArtifactSource, FetchRequest, download_file, fetch_artifact, file_name_from_url,
    restore_session, select_first_reachable,
};
