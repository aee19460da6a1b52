//! Product serialization: the four output files or one stdout stream

use crate::error::{Error, Result};
use crate::io::ini::{write_metadata_ini, IniStyle};
use crate::io::tsv::{write_heights, write_integers, FloatStyle};
use crate::raster::{GeoMetadata, Raster};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Everything a run hands to serialization
#[derive(Debug, Clone)]
pub struct Products {
    /// Filled heights
    pub heights: Raster<f32>,
    /// Direction codes 0-8
    pub directions: Raster<u8>,
    /// Upstream cell counts
    pub totals: Raster<u64>,
    pub meta: GeoMetadata,
}

/// Output file paths derived from a basename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub sdem: PathBuf,
    pub ini: PathBuf,
    pub fdir: PathBuf,
    pub ftotal: PathBuf,
}

impl OutputPaths {
    /// `name` -> `name-sdem.tsv`, `name.ini`, `name-fdir.tsv`, `name-ftotal.tsv`
    pub fn from_basename(basename: impl AsRef<Path>) -> Self {
        let base = basename.as_ref().to_string_lossy().into_owned();
        Self {
            sdem: PathBuf::from(format!("{base}-sdem.tsv")),
            ini: PathBuf::from(format!("{base}.ini")),
            fdir: PathBuf::from(format!("{base}-fdir.tsv")),
            ftotal: PathBuf::from(format!("{base}-ftotal.tsv")),
        }
    }
}

struct OutputFile {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl OutputFile {
    fn create(path: PathBuf) -> Result<Self> {
        let file = File::create(&path).map_err(|e| Error::output(&path, e))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    fn write_with<F>(&mut self, write: F) -> Result<()>
    where
        F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
    {
        write(&mut self.writer)
            .and_then(|_| self.writer.flush())
            .map_err(|e| Error::output(&self.path, e))
    }
}

/// The four output files, opened up front so an unwritable destination
/// fails before any computation.
pub struct OutputFiles {
    sdem: OutputFile,
    ini: OutputFile,
    fdir: OutputFile,
    ftotal: OutputFile,
}

impl OutputFiles {
    /// Create (truncate) all four files for `basename`
    pub fn create(basename: impl AsRef<Path>) -> Result<Self> {
        let paths = OutputPaths::from_basename(basename);
        debug!(?paths, "opening output files");
        Ok(Self {
            sdem: OutputFile::create(paths.sdem)?,
            ini: OutputFile::create(paths.ini)?,
            fdir: OutputFile::create(paths.fdir)?,
            ftotal: OutputFile::create(paths.ftotal)?,
        })
    }

    /// Write every product to its file and flush
    pub fn write(mut self, products: &Products) -> Result<()> {
        let (rows, cols) = products.heights.shape();
        self.sdem
            .write_with(|w| write_heights(w, &products.heights, FloatStyle::General))?;
        self.ini
            .write_with(|w| write_metadata_ini(w, &products.meta, rows, cols, IniStyle::File))?;
        self.fdir.write_with(|w| write_integers(w, &products.directions))?;
        self.ftotal.write_with(|w| write_integers(w, &products.totals))?;
        Ok(())
    }
}

/// Write the four products as consecutive blocks separated by a blank line.
///
/// Heights use fixed notation here, and the metadata keeps six decimals.
pub fn write_stream<W: Write>(writer: &mut W, products: &Products) -> std::io::Result<()> {
    let (rows, cols) = products.heights.shape();
    write_heights(writer, &products.heights, FloatStyle::Fixed)?;
    writeln!(writer)?;
    write_metadata_ini(writer, &products.meta, rows, cols, IniStyle::Stream)?;
    writeln!(writer)?;
    write_integers(writer, &products.directions)?;
    writeln!(writer)?;
    write_integers(writer, &products.totals)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn products() -> Products {
        Products {
            heights: Raster::from_rows(vec![vec![2.0, 1.5], vec![1.0, 0.5]]).unwrap(),
            directions: Raster::from_rows(vec![vec![7, 1], vec![5, 3]]).unwrap(),
            totals: Raster::from_rows(vec![vec![0, 0], vec![0, 0]]).unwrap(),
            meta: GeoMetadata::default(),
        }
    }

    #[test]
    fn test_paths_from_basename() {
        let paths = OutputPaths::from_basename("/tmp/run/hood");
        assert_eq!(paths.sdem, PathBuf::from("/tmp/run/hood-sdem.tsv"));
        assert_eq!(paths.ini, PathBuf::from("/tmp/run/hood.ini"));
        assert_eq!(paths.fdir, PathBuf::from("/tmp/run/hood-fdir.tsv"));
        assert_eq!(paths.ftotal, PathBuf::from("/tmp/run/hood-ftotal.tsv"));
    }

    #[test]
    fn test_files_written() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("out");
        OutputFiles::create(&base).unwrap().write(&products()).unwrap();

        let paths = OutputPaths::from_basename(&base);
        assert_eq!(std::fs::read_to_string(paths.sdem).unwrap(), "2\t1.5\n1\t0.5\n");
        assert_eq!(std::fs::read_to_string(paths.fdir).unwrap(), "7\t1\n5\t3\n");
        assert_eq!(std::fs::read_to_string(paths.ftotal).unwrap(), "0\t0\n0\t0\n");
        let ini = std::fs::read_to_string(paths.ini).unwrap();
        assert!(ini.contains("x_pixels=2\ny_pixels=2\n"));
    }

    #[test]
    fn test_create_fails_for_missing_directory() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("missing").join("out");
        let err = OutputFiles::create(&base).err().unwrap();
        assert!(matches!(err, Error::OutputIo { .. }));
    }

    #[test]
    fn test_stream_blocks() {
        let mut out = Vec::new();
        write_stream(&mut out, &products()).unwrap();
        let text = String::from_utf8(out).unwrap();
        let blocks: Vec<&str> = text.split("\n\n").collect();
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0], "2.000000\t1.500000\n1.000000\t0.500000");
        assert!(blocks[1].starts_with("[Core]\npixel_size=1.000000"));
        assert_eq!(blocks[2], "7\t1\n5\t3");
        assert_eq!(blocks[3], "0\t0\n0\t0\n");
    }
}
