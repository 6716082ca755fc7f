//! Build-stage entry points driven by the host with flat item records.
//!
//! The download stage turns declared Maven libraries into cached files and
//! annotates each item with their paths. The verification stage reads those
//! annotations back and checks every POM dependency against what the build
//! already provides.

pub mod download;
pub mod verify;

pub use download::{DownloadReport, MavenDownloadTask};
pub use verify::{DependencyCheck, MavenDependencyVerifier, VerificationInputs, VerificationReport};

use tokio::runtime::{Builder as RuntimeBuilder, Runtime};

fn blocking_runtime() -> std::io::Result<Runtime> {
    RuntimeBuilder::new_multi_thread().enable_all().build()
}
