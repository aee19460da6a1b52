//! Metadata INI written next to the grids
//!
//! ```text
//! [Core]
//! pixel_size=30
//! x_pixels=720
//! y_pixels=540
//! [Display]
//! origin_x=560000
//! origin_y=5120000
//! projection=...
//! ```

use crate::error::{Error, Result};
use crate::raster::GeoMetadata;
use std::io::{BufRead, Write};

/// Number rendering used for the INI values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IniStyle {
    /// Whole numbers, as written to `<name>.ini`
    File,
    /// Six decimals, as written to standard output
    Stream,
}

impl IniStyle {
    fn number(self, value: f64) -> String {
        match self {
            IniStyle::File => format!("{value:.0}"),
            IniStyle::Stream => format!("{value:.6}"),
        }
    }
}

/// Write the metadata block for a `rows` x `cols` grid
pub fn write_metadata_ini<W: Write>(
    writer: &mut W,
    meta: &GeoMetadata,
    rows: usize,
    cols: usize,
    style: IniStyle,
) -> std::io::Result<()> {
    writeln!(writer, "[Core]")?;
    writeln!(writer, "pixel_size={}", style.number(meta.pixel_size))?;
    writeln!(writer, "x_pixels={cols}")?;
    writeln!(writer, "y_pixels={rows}")?;
    writeln!(writer, "[Display]")?;
    writeln!(writer, "origin_x={}", style.number(meta.origin_x))?;
    writeln!(writer, "origin_y={}", style.number(meta.origin_y))?;
    writeln!(writer, "projection={}", meta.projection)?;
    Ok(())
}

/// Parsed metadata file: georeferencing plus the declared grid size
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataIni {
    pub meta: GeoMetadata,
    pub rows: usize,
    pub cols: usize,
}

/// Read a metadata INI. Section headers are accepted but not required;
/// unknown keys are ignored.
pub fn read_metadata_ini<R: BufRead>(reader: R) -> Result<MetadataIni> {
    let mut meta = GeoMetadata::default();
    let mut rows = None;
    let mut cols = None;

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('[') || line.starts_with(';') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "pixel_size" => meta.pixel_size = parse_number("pixel_size", value)?,
            "origin_x" => meta.origin_x = parse_number("origin_x", value)?,
            "origin_y" => meta.origin_y = parse_number("origin_y", value)?,
            "x_pixels" => cols = Some(parse_number::<usize>("x_pixels", value)?),
            "y_pixels" => rows = Some(parse_number::<usize>("y_pixels", value)?),
            "projection" => meta.projection = value.to_string(),
            _ => {}
        }
    }

    match (rows, cols) {
        (Some(rows), Some(cols)) => Ok(MetadataIni { meta, rows, cols }),
        _ => Err(Error::InvalidParameter {
            name: "ini",
            value: String::new(),
            reason: "x_pixels and y_pixels are required".into(),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T> {
    value.parse::<T>().map_err(|_| Error::InvalidParameter {
        name,
        value: value.to_string(),
        reason: "not a number".into(),
    })
}
