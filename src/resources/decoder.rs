//! Delegation of compressed-mesh decoding.
//!
//! glTF primitives carrying `KHR_draco_mesh_compression` store their geometry
//! as an opaque Draco bitstream. The viewer does not decode it itself; it
//! hands the bytes to a [`MeshDecoder`]. The loader refuses to issue a
//! compressed-mesh load until one is installed.

use crate::{data_structures::mesh::Geometry, error::Result};

pub const DRACO_EXTENSION: &str = "KHR_draco_mesh_compression";

pub trait MeshDecoder: Send + Sync + std::fmt::Debug {
    /// Decodes one compressed primitive into triangle-list geometry.
    fn decode(&self, data: &[u8]) -> Result<Geometry>;
}

#[cfg(not(target_arch = "wasm32"))]
pub use native::ExternalDecoder;

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::{
        path::{Path, PathBuf},
        process::Command,
        sync::atomic::{AtomicU64, Ordering},
    };

    use super::MeshDecoder;
    use crate::{
        data_structures::mesh::Geometry,
        error::{Result, ViewerError},
    };

    static NEXT_SCRATCH: AtomicU64 = AtomicU64::new(0);

    /// Runs the reference `draco_decoder` tool found in a configured
    /// directory and reads back the Wavefront OBJ it writes.
    #[derive(Debug, Clone)]
    pub struct ExternalDecoder {
        dir: PathBuf,
    }

    impl ExternalDecoder {
        pub const PROGRAM: &'static str = "draco_decoder";

        pub fn new(dir: impl Into<PathBuf>) -> Self {
            Self { dir: dir.into() }
        }

        pub fn program(&self) -> PathBuf {
            self.dir.join(Self::PROGRAM)
        }
    }

    impl MeshDecoder for ExternalDecoder {
        fn decode(&self, data: &[u8]) -> Result<Geometry> {
            let scratch = std::env::temp_dir().join(format!(
                "house-viewer-{}-{}",
                std::process::id(),
                NEXT_SCRATCH.fetch_add(1, Ordering::Relaxed)
            ));
            let input = scratch.with_extension("drc");
            let output = scratch.with_extension("obj");

            let result = run(&self.program(), data, &input, &output);
            for file in [&input, &output] {
                if let Err(e) = std::fs::remove_file(file) {
                    log::debug!("could not remove {}: {}", file.display(), e);
                }
            }
            result
        }
    }

    fn run(program: &Path, data: &[u8], input: &Path, output: &Path) -> Result<Geometry> {
        let io_error = |path: &Path| {
            let path = path.display().to_string();
            move |source| ViewerError::Io { path, source }
        };
        std::fs::write(input, data).map_err(io_error(input))?;

        let status = Command::new(program)
            .arg("-i")
            .arg(input)
            .arg("-o")
            .arg(output)
            .status()
            .map_err(io_error(program))?;
        if !status.success() {
            return Err(ViewerError::Decode {
                path: input.display().to_string(),
                reason: format!("{} exited with {}", program.display(), status),
            });
        }
        read_obj(output)
    }

    fn read_obj(path: &Path) -> Result<Geometry> {
        let (models, _) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                triangulate: true,
                single_index: true,
                ..Default::default()
            },
        )
        .map_err(|e| ViewerError::Decode {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(merge_models(models))
    }

    /// Concatenates the OBJ models into one geometry. Once any model carries
    /// normals or texture coordinates, models without them get placeholders
    /// so every attribute stays aligned with its vertex.
    fn merge_models(models: Vec<tobj::Model>) -> Geometry {
        let any_normals = models.iter().any(|model| !model.mesh.normals.is_empty());
        let any_tex_coords = models.iter().any(|model| !model.mesh.texcoords.is_empty());

        let mut geometry = Geometry::default();
        for model in models {
            let mesh = model.mesh;
            let base = geometry.positions.len() as u32;
            let count = mesh.positions.len() / 3;
            geometry
                .positions
                .extend(mesh.positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]]));
            if any_normals {
                if mesh.normals.len() == count * 3 {
                    geometry
                        .normals
                        .extend(mesh.normals.chunks_exact(3).map(|n| [n[0], n[1], n[2]]));
                } else {
                    geometry.normals.extend(std::iter::repeat_n([0.0, 1.0, 0.0], count));
                }
            }
            if any_tex_coords {
                if mesh.texcoords.len() == count * 2 {
                    // OBJ puts v = 0 at the bottom, glTF at the top
                    geometry
                        .tex_coords
                        .extend(mesh.texcoords.chunks_exact(2).map(|t| [t[0], 1.0 - t[1]]));
                } else {
                    geometry.tex_coords.extend(std::iter::repeat_n([0.0, 0.0], count));
                }
            }
            geometry
                .indices
                .extend(mesh.indices.iter().map(|index| base + index));
        }
        geometry
    }

}
