//! Asset loading.
//!
//! [`AssetLoader::load`] turns an asset path into a [`LoaderRequest`]: a
//! not-yet-started fetch-and-decode future. The request does nothing on its
//! own. [`crate::context::ViewerContext::issue`] registers the caller's
//! continuation for it and hands back a [`PendingLoad`] to drive; when that
//! finishes it yields a [`LoadCompletion`], which the context applies on the
//! viewer thread. The loader itself never touches the scene.
//!
//! - `model` decodes glTF/GLB scenes
//! - `texture` decodes 2D textures and HDR environment images
//! - `decoder` delegates compressed meshes to an external decoder

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    task::{Context, Poll},
};

use crate::{
    config::ViewerConfig,
    data_structures::{
        mesh::{EnvironmentMap, TextureResource, TextureSettings},
        scene_graph::Node,
    },
    error::{Result, ViewerError},
};

pub mod decoder;
pub mod model;
pub mod texture;

use decoder::MeshDecoder;

#[cfg(not(target_arch = "wasm32"))]
pub type LoadFuture = Pin<Box<dyn Future<Output = Result<Resource>> + Send>>;
#[cfg(target_arch = "wasm32")]
pub type LoadFuture = Pin<Box<dyn Future<Output = Result<Resource>>>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the loader should decode the bytes at a path into.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AssetKind {
    MeshScene,
    /// A mesh scene whose primitives need the compressed-mesh decoder.
    CompressedMeshScene,
    Environment,
    Texture(TextureSettings),
}

#[derive(Debug)]
pub enum Resource {
    MeshScene(Node),
    Environment(EnvironmentMap),
    Texture(TextureResource),
}

impl Resource {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Resource::MeshScene(_) => "mesh scene",
            Resource::Environment(_) => "environment map",
            Resource::Texture(_) => "texture",
        }
    }

    pub fn into_scene(self) -> Result<Node> {
        match self {
            Resource::MeshScene(node) => Ok(node),
            other => Err(unexpected("mesh scene", &other)),
        }
    }

    pub fn into_environment(self) -> Result<EnvironmentMap> {
        match self {
            Resource::Environment(map) => Ok(map),
            other => Err(unexpected("environment map", &other)),
        }
    }

    pub fn into_texture(self) -> Result<TextureResource> {
        match self {
            Resource::Texture(texture) => Ok(texture),
            other => Err(unexpected("texture", &other)),
        }
    }
}

fn unexpected(expected: &'static str, found: &Resource) -> ViewerError {
    ViewerError::UnexpectedResource {
        expected,
        found: found.kind_name(),
    }
}

/// Lifecycle of a Loader Request. `Attached` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    /// The resource arrived and its continuation is running.
    Resolved,
    Attached,
    Failed,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Attached | RequestState::Failed)
    }
}

/// A fetch-and-decode operation that has not been registered yet.
pub struct LoaderRequest {
    id: RequestId,
    path: String,
    kind: AssetKind,
    future: LoadFuture,
}

impl LoaderRequest {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }
}

impl fmt::Debug for LoaderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderRequest")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("kind", &self.kind)
            .finish()
    }
}

/// A registered request. Resolves to its [`LoadCompletion`].
#[derive(Debug)]
pub struct PendingLoad {
    request: LoaderRequest,
}

impl PendingLoad {
    pub(crate) fn new(request: LoaderRequest) -> Self {
        Self { request }
    }

    pub fn id(&self) -> RequestId {
        self.request.id
    }

    pub fn path(&self) -> &str {
        &self.request.path
    }
}

impl Future for PendingLoad {
    type Output = LoadCompletion;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let request = &mut self.request;
        request.future.as_mut().poll(cx).map(|result| LoadCompletion {
            id: request.id,
            path: request.path.clone(),
            result,
        })
    }
}

#[derive(Debug)]
pub struct LoadCompletion {
    pub id: RequestId,
    pub path: String,
    pub result: Result<Resource>,
}

/// Where asset bytes come from: a directory on disk natively, a path below
/// the page origin on the web.
#[derive(Clone, Debug)]
pub struct AssetSource {
    root: String,
}

impl AssetSource {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    #[cfg(target_arch = "wasm32")]
    fn format_url(&self, file_name: &str) -> Result<reqwest::Url> {
        let config_error = |reason: String| ViewerError::Config(reason);
        let window = web_sys::window().ok_or_else(|| config_error("no browser window".into()))?;
        let origin = window
            .location()
            .origin()
            .map_err(|_| config_error("page origin is not readable".into()))?;
        let base = reqwest::Url::parse(&format!("{}/{}/", origin, self.root.trim_matches('/')))
            .map_err(|e| config_error(e.to_string()))?;
        base.join(file_name).map_err(|e| config_error(e.to_string()))
    }

    pub async fn load_binary(&self, file_name: &str) -> Result<Vec<u8>> {
        #[cfg(target_arch = "wasm32")]
        let data = {
            let url = self.format_url(file_name)?;
            let fetch_error = |source| ViewerError::Fetch {
                path: file_name.to_string(),
                source,
            };
            reqwest::get(url)
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(fetch_error)?
                .bytes()
                .await
                .map_err(fetch_error)?
                .to_vec()
        };
        #[cfg(not(target_arch = "wasm32"))]
        let data = {
            let path = std::path::Path::new(&self.root).join(file_name);
            tokio::fs::read(&path)
                .await
                .map_err(|source| ViewerError::Io {
                    path: path.display().to_string(),
                    source,
                })?
        };

        Ok(data)
    }
}

/// Resolves asset paths into [`Resource`]s.
pub struct AssetLoader {
    source: AssetSource,
    decoder: Option<Arc<dyn MeshDecoder>>,
    next_id: AtomicU64,
}

impl fmt::Debug for AssetLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetLoader")
            .field("source", &self.source)
            .field("decoder", &self.decoder)
            .finish()
    }
}

impl AssetLoader {
    pub fn new(source: AssetSource) -> Self {
        Self {
            source,
            decoder: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// A loader for the configured asset root. Natively the configured
    /// decoder path gets an [`decoder::ExternalDecoder`]; on the web a
    /// decoder has to be installed with [`AssetLoader::with_decoder`].
    pub fn from_config(config: &ViewerConfig) -> Self {
        let loader = Self::new(AssetSource::new(config.assets.root.clone()));
        #[cfg(not(target_arch = "wasm32"))]
        {
            let dir = config.decoder.path.as_deref().filter(|p| !p.trim().is_empty());
            if let Some(dir) = dir {
                let dir = std::path::Path::new(&config.assets.root).join(dir);
                log::info!("Compressed meshes are decoded by {}", dir.display());
                return loader.with_decoder(Arc::new(decoder::ExternalDecoder::new(dir)));
            }
        }
        loader
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn MeshDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn has_decoder(&self) -> bool {
        self.decoder.is_some()
    }

    pub fn source(&self) -> &AssetSource {
        &self.source
    }

    /// Prepares a load of `path`. Nothing is fetched until the request is
    /// issued and driven.
    ///
    /// Compressed mesh scenes are refused with
    /// [`ViewerError::DecoderNotConfigured`] while no decoder is installed.
    pub fn load(&self, kind: AssetKind, path: &str) -> Result<LoaderRequest> {
        if kind == AssetKind::CompressedMeshScene && self.decoder.is_none() {
            return Err(ViewerError::DecoderNotConfigured {
                path: path.to_string(),
            });
        }
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        log::debug!("Request {} for {} ({:?})", id, path, kind);
        let future = fetch(
            self.source.clone(),
            self.decoder.clone(),
            kind,
            path.to_string(),
        );
        Ok(LoaderRequest {
            id,
            path: path.to_string(),
            kind,
            future: Box::pin(future),
        })
    }
}

async fn fetch(
    source: AssetSource,
    decoder: Option<Arc<dyn MeshDecoder>>,
    kind: AssetKind,
    path: String,
) -> Result<Resource> {
    let bytes = source.load_binary(&path).await?;
    match kind {
        AssetKind::MeshScene | AssetKind::CompressedMeshScene => {
            model::load_scene(&source, &path, bytes, decoder)
                .await
                .map(Resource::MeshScene)
        }
        AssetKind::Environment => {
            texture::decode_environment(&path, &bytes).map(Resource::Environment)
        }
        AssetKind::Texture(settings) => {
            texture::decode_texture(&path, &bytes, settings).map(Resource::Texture)
        }
    }
}
