use std::io;
use std::path::PathBuf;

/// Failure to fetch or decode one image reference.
///
/// This is the only runtime error class of the gallery. It never reaches the
/// user: navigation treats a failed decode exactly like a successful one.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("empty image reference")]
    EmptyReference,
    #[error("image reference escapes the asset root: {0}")]
    OutsideRoot(String),
    #[error("failed to read {reference}: {source}")]
    Io {
        reference: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode {reference}: {message}")]
    Decode { reference: String, message: String },
}

/// Problems with the card configuration file.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read card file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse card file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("card #{0} has an empty id")]
    EmptyId(usize),
    #[error("duplicate card id '{0}'")]
    DuplicateId(String),
}
