//! I/O for elevation input and hydrology products
//!
//! Input is a GeoTIFF (first band) or a TSV height grid; output is the
//! TSV/INI product set, either as files or as a single stdout stream.

mod ini;
mod native;
mod output;
mod tsv;

pub use ini::{read_metadata_ini, write_metadata_ini, IniStyle, MetadataIni};
pub use native::{is_tiff, read_geotiff, read_geotiff_from_buffer};
pub use output::{write_stream, OutputFiles, OutputPaths, Products};
pub use tsv::{format_general, read_tsv_grid, write_heights, write_integers, write_tsv_grid, FloatStyle};

use crate::error::{Error, Result};
use crate::raster::{GeoMetadata, Raster};
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SDEM_SUFFIX: &str = "-sdem.tsv";

/// Load an elevation raster from disk.
///
/// `.tsv` paths are read as height grids; a `<name>-sdem.tsv` picks up
/// georeferencing from a sibling `<name>.ini` when one exists. Anything
/// else is decoded as a GeoTIFF.
pub fn load_raster(path: impl AsRef<Path>) -> Result<(Raster<f32>, GeoMetadata)> {
    let path = path.as_ref();
    let is_tsv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tsv"));

    let (raster, meta) = if is_tsv {
        load_tsv(path)?
    } else {
        read_geotiff::<f32, _>(path)?
    };
    raster.ensure_min_size()?;
    log_loaded(&path.display().to_string(), &raster);
    Ok((raster, meta))
}

/// Load an elevation raster from a byte stream such as stdin.
///
/// TIFF data is recognised by its header; anything else is parsed as a
/// TSV height grid with default georeferencing.
pub fn load_raster_from_reader<R: Read>(mut reader: R) -> Result<(Raster<f32>, GeoMetadata)> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| Error::raster_open("<stdin>", e))?;
    if bytes.is_empty() {
        return Err(Error::raster_open("<stdin>", "no input data"));
    }

    let (raster, meta) = if is_tiff(&bytes) {
        debug!(bytes = bytes.len(), "stdin carries TIFF data");
        read_geotiff_from_buffer::<f32>(&bytes)?
    } else {
        debug!(bytes = bytes.len(), "stdin carries TSV data");
        let raster = read_tsv_grid(Cursor::new(bytes)).map_err(|e| relabel(e, Path::new("<stdin>")))?;
        (raster, GeoMetadata::default())
    };
    raster.ensure_min_size()?;
    log_loaded("<stdin>", &raster);
    Ok((raster, meta))
}

fn log_loaded(source: &str, raster: &Raster<f32>) {
    let stats = raster.statistics();
    info!(
        source,
        rows = raster.rows(),
        cols = raster.cols(),
        min = ?stats.min,
        max = ?stats.max,
        missing = stats.missing_count,
        "loaded raster"
    );
}

fn load_tsv(path: &Path) -> Result<(Raster<f32>, GeoMetadata)> {
    let file = File::open(path).map_err(|e| Error::raster_open(path, e))?;
    let raster: Raster<f32> = read_tsv_grid(BufReader::new(file)).map_err(|e| relabel(e, path))?;

    let meta = match sibling_ini(path) {
        Some(ini_path) if ini_path.is_file() => {
            let file = File::open(&ini_path).map_err(|e| Error::raster_open(&ini_path, e))?;
            let parsed = read_metadata_ini(BufReader::new(file))?;
            if (parsed.rows, parsed.cols) != raster.shape() {
                return Err(Error::SizeMismatch {
                    er: parsed.rows,
                    ec: parsed.cols,
                    ar: raster.rows(),
                    ac: raster.cols(),
                });
            }
            debug!(ini = %ini_path.display(), "using sibling metadata");
            parsed.meta
        }
        _ => GeoMetadata::default(),
    };
    Ok((raster, meta))
}

/// `<dir>/<name>-sdem.tsv` -> `<dir>/<name>.ini`
fn sibling_ini(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(SDEM_SUFFIX)?;
    Some(path.with_file_name(format!("{stem}.ini")))
}

fn relabel(err: Error, path: &Path) -> Error {
    match err {
        Error::RasterOpen { reason, .. } => Error::raster_open(path, reason),
        other => other,
    }
}
