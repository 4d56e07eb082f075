//! Pre-made transactions against GitHub REST API and the filesystem.

mod download_and_extract_archive;
mod download_artifact;
mod extract_archive;
mod fetch_artifacts;
mod fetch_latest_run;

pub use download_and_extract_archive::*;
pub use download_artifact::*;
pub use extract_archive::*;
pub use fetch_artifacts::*;
pub use fetch_latest_run::*;
