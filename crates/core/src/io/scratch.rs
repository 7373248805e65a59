//! Temporary storage for intermediate grids
//!
//! Every grid is written with its file handle closed before the path is
//! handed back, so a later stage can reopen it without lock contention.
//! The whole directory is removed when the [`ScratchSpace`] is dropped.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use super::{load_raster, save_raster, IoElement};
use crate::error::{Error, Result};
use crate::raster::Raster;

/// A per-run directory of intermediate rasters
#[derive(Debug)]
pub struct ScratchSpace {
    dir: TempDir,
}

impl ScratchSpace {
    /// Create a scratch directory under the system temp location
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("floodfuse-")
            .tempdir()
            .map_err(|e| Error::io_at(std::env::temp_dir(), e))?;
        debug!("Scratch space at {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Create a scratch directory inside `parent`
    pub fn new_in<P: AsRef<Path>>(parent: P) -> Result<Self> {
        let parent = parent.as_ref();
        let dir = tempfile::Builder::new()
            .prefix("floodfuse-")
            .tempdir_in(parent)
            .map_err(|e| Error::io_at(parent, e))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path an intermediate named `name` is stored at
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.path().join(format!("{}.tif", name))
    }

    /// Write `raster` as `name`, returning its path once the file is closed
    pub fn store<T: IoElement>(&self, name: &str, raster: &Raster<T>) -> Result<PathBuf> {
        let path = self.path_for(name);
        save_raster(raster, &path).map_err(|e| match e {
            Error::Io(source) => Error::io_at(&path, source),
            other => other,
        })?;
        debug!("Stored intermediate {}", path.display());
        Ok(path)
    }

    /// Reopen a stored intermediate
    pub fn load<T: IoElement>(&self, name: &str) -> Result<Raster<T>> {
        load_raster(self.path_for(name))
    }

    /// Remove the directory now, reporting any failure
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| Error::io_at(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GeoTransform;
    use crate::CRS;

    #[test]
    fn store_then_load() {
        let scratch = ScratchSpace::new().unwrap();
        let mut r: Raster<f64> = Raster::filled(2, 3, 1.5);
        r.set_transform(GeoTransform::new(10.0, 20.0, 1.0, -1.0));
        r.set_crs(Some(CRS::from_epsg(31983)));

        let path = scratch.store("resample", &r).unwrap();
        assert!(path.exists());

        let back: Raster<f64> = scratch.load("resample").unwrap();
        assert_eq!(back.shape(), (2, 3));
        assert_eq!(back.get(1, 2).unwrap(), 1.5);
    }

    #[test]
    fn dropped_scratch_is_removed() {
        let dir = {
            let scratch = ScratchSpace::new().unwrap();
            scratch.store("x", &Raster::<f32>::new(1, 1)).unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!dir.exists());
    }
}
