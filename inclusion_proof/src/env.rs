use std::io;

use dotenvy::dotenv;
use tracing::warn;

/// Loads a local `.env` file, if any, into the process environment so that
/// `PROOFGEN_*` variables can be kept out of the command line.
///
/// A missing or unreadable file is not an error.
pub fn load_dotenvy_vars_if_present() {
    match dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded environment file"),
        Err(dotenvy::Error::Io(io::Error { .. })) => (),
        Err(e) => warn!("found a local `.env` file but could not parse it: {e}"),
    }
}
