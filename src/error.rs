//! Error taxonomy for the viewer.
//!
//! Every failure a Loader Request can settle into is a [`ViewerError`]; so are
//! configuration problems found at startup. Resizes never fail: invalid
//! dimensions are clamped by the viewport instead of being reported.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("could not read `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[cfg(target_arch = "wasm32")]
    #[error("could not fetch `{path}`: {source}")]
    Fetch {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid glTF: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("could not decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("could not decode `{path}`: {reason}")]
    Decode { path: String, reason: String },

    /// A compressed mesh was requested before a decoder was installed.
    #[error("`{path}` needs the compressed-mesh decoder but no decoder path is configured")]
    DecoderNotConfigured { path: String },

    #[error("expected a {expected} resource but the loader produced a {found}")]
    UnexpectedResource {
        expected: &'static str,
        found: &'static str,
    },

    #[error("no node with id {0} in the scene")]
    MissingNode(u32),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("could not parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("surface error: {0}")]
    Surface(String),
}

impl ViewerError {
    /// Whether this error belongs to a single Loader Request, as opposed to a
    /// startup or rendering problem.
    pub fn is_load_failure(&self) -> bool {
        match self {
            ViewerError::Io { .. }
            | ViewerError::Gltf(_)
            | ViewerError::Image(_)
            | ViewerError::Decode { .. }
            | ViewerError::UnexpectedResource { .. }
            | ViewerError::MissingNode(_) => true,
            #[cfg(target_arch = "wasm32")]
            ViewerError::Fetch { .. } => true,
            ViewerError::DecoderNotConfigured { .. }
            | ViewerError::Config(_)
            | ViewerError::Toml(_)
            | ViewerError::Surface(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ViewerError>;
