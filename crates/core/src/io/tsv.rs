//! Tab-separated grid text
//!
//! One raster row per line, values separated by a single tab, no trailing
//! tab, every line (including the last) terminated by `\n`. This is the
//! format the plotter and the inundation mapper read.

use crate::error::{Error, Result};
use crate::raster::{Raster, RasterElement};
use std::io::{BufRead, Write};
use std::str::FromStr;

/// How floating point heights are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatStyle {
    /// Shortest of fixed/scientific with six significant digits (C `%g`)
    General,
    /// Fixed notation with six decimals (C `%f`)
    Fixed,
}

impl FloatStyle {
    pub fn format(self, value: f64) -> String {
        match self {
            FloatStyle::General => format_general(value, 6),
            FloatStyle::Fixed => format_fixed(value),
        }
    }
}

/// Format like C's `%.{precision}g`.
pub fn format_general(value: f64, precision: usize) -> String {
    if let Some(special) = non_finite(value) {
        return special;
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0".into() } else { "0".into() };
    }

    let precision = precision.max(1);
    // Rounding happens here, so the exponent already accounts for carries
    // such as 999999.5 -> 1.00000e6.
    let sci = format!("{:.*e}", precision - 1, value);
    let (mantissa, exponent) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if exponent < -4 || exponent >= precision as i32 {
        let mantissa = trim_fraction(mantissa);
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{value:.decimals$}")).to_string()
    }
}

fn format_fixed(value: f64) -> String {
    non_finite(value).unwrap_or_else(|| format!("{value:.6}"))
}

fn non_finite(value: f64) -> Option<String> {
    if value.is_nan() {
        Some(if value.is_sign_negative() { "-nan".into() } else { "nan".into() })
    } else if value.is_infinite() {
        Some(if value < 0.0 { "-inf".into() } else { "inf".into() })
    } else {
        None
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Write a raster as TSV, rendering each value with `render`.
pub fn write_tsv_grid<T, W, F>(writer: &mut W, raster: &Raster<T>, mut render: F) -> std::io::Result<()>
where
    T: RasterElement,
    W: Write,
    F: FnMut(T) -> String,
{
    for row in raster.row_views() {
        let mut first = true;
        for &value in row.iter() {
            if !first {
                writer.write_all(b"\t")?;
            }
            writer.write_all(render(value).as_bytes())?;
            first = false;
        }
        writer.write_all(b"\n")?;
    }
    Ok(())
}

/// Write heights with the given float style
pub fn write_heights<W: Write>(writer: &mut W, heights: &Raster<f32>, style: FloatStyle) -> std::io::Result<()> {
    write_tsv_grid(writer, heights, |v| style.format(v as f64))
}

/// Write integer grids (direction codes, flow totals)
pub fn write_integers<T, W>(writer: &mut W, raster: &Raster<T>) -> std::io::Result<()>
where
    T: RasterElement + std::fmt::Display,
    W: Write,
{
    write_tsv_grid(writer, raster, |v| v.to_string())
}

/// Read a TSV grid. Reading stops at the first blank line after data, so
/// the first block of a multi-block stream can be read directly.
pub fn read_tsv_grid<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement + FromStr,
    R: BufRead,
{
    let mut rows: Vec<Vec<T>> = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if rows.is_empty() {
                continue;
            }
            break;
        }
        let row = trimmed
            .split(['\t', ' '])
            .filter(|field| !field.is_empty())
            .map(|field| {
                field.parse::<T>().map_err(|_| {
                    Error::raster_open("<tsv>", format!("line {}: cannot parse {field:?}", line_no + 1))
                })
            })
            .collect::<Result<Vec<T>>>()?;
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(Error::raster_open("<tsv>", "no data rows"));
    }
    let width = rows[0].len();
    if let Some((idx, bad)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
        return Err(Error::SizeMismatch {
            er: rows.len(),
            ec: width,
            ar: idx + 1,
            ac: bad.len(),
        });
    }
    Raster::from_rows(rows)
}
