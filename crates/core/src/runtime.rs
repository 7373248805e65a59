//! Process-wide GIS runtime bracket
//!
//! The loading backends may need one-time global initialisation (GDAL
//! driver registration). A pipeline run acquires a [`GisRuntime`] before
//! loading anything and releases it when the guard drops, on every exit
//! path. Only one guard may be alive at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::info;

use crate::error::{Error, Result};

static ACTIVE: AtomicBool = AtomicBool::new(false);

/// Guard proving raster/vector loading is available
#[derive(Debug)]
pub struct GisRuntime {
    started: Instant,
}

impl GisRuntime {
    /// Initialise the loading backends for the lifetime of the guard
    pub fn acquire() -> Result<Self> {
        if ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Other("GIS runtime already acquired".into()));
        }

        #[cfg(feature = "gdal")]
        gdal::DriverManager::register_all();

        info!("GIS runtime acquired");
        Ok(Self {
            started: Instant::now(),
        })
    }

    /// Whether a guard is currently alive
    pub fn is_active() -> bool {
        ACTIVE.load(Ordering::Acquire)
    }
}

impl Drop for GisRuntime {
    fn drop(&mut self) {
        ACTIVE.store(false, Ordering::Release);
        info!("GIS runtime released after {:.2?}", self.started.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_guard_at_a_time() {
        let guard = GisRuntime::acquire().unwrap();
        assert!(GisRuntime::is_active());
        assert!(GisRuntime::acquire().is_err());
        drop(guard);
        assert!(!GisRuntime::is_active());
        let again = GisRuntime::acquire().unwrap();
        drop(again);
    }
}
