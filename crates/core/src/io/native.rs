//! Native GeoTIFF reading (without GDAL dependency)
//!
//! Uses the `tiff` crate. Only the first band is read; georeferencing comes
//! from the ModelPixelScale/ModelTiepoint tags and the projection string
//! from the GeoAsciiParams tag when present.

use crate::error::{Error, Result};
use crate::raster::{GeoMetadata, GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tracing::debug;

/// Whether a byte buffer starts with a TIFF header
pub fn is_tiff(bytes: &[u8]) -> bool {
    bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*")
}

/// Read a GeoTIFF file into a Raster plus its metadata
pub fn read_geotiff<T, P>(path: P) -> Result<(Raster<T>, GeoMetadata)>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::raster_open(path, e))?;
    decode_geotiff(BufReader::new(file)).map_err(|e| relabel(e, path))
}

/// Read a GeoTIFF from an in-memory buffer
///
/// Same as `read_geotiff` but operates on a byte slice; used for rasters
/// arriving on standard input.
pub fn read_geotiff_from_buffer<T>(data: &[u8]) -> Result<(Raster<T>, GeoMetadata)>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data))
}

/// Attach the input path to decoder errors that were produced without one.
fn relabel(err: Error, path: &Path) -> Error {
    match err {
        Error::RasterOpen { reason, .. } => Error::raster_open(path, reason),
        other => other,
    }
}

fn decode_geotiff<T, R>(reader: R) -> Result<(Raster<T>, GeoMetadata)>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder =
        Decoder::new(reader).map_err(|e| Error::raster_open("<stream>", format!("TIFF decode error: {e}")))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::raster_open("<stream>", format!("cannot read dimensions: {e}")))?;

    let rows = height as usize;
    let cols = width as usize;

    let result = decoder
        .read_image()
        .map_err(|e| Error::raster_open("<stream>", format!("cannot read image data: {e}")))?;

    let data: Vec<T> = match result {
        DecodingResult::F32(buf) => cast_all(&buf),
        DecodingResult::F64(buf) => cast_all(&buf),
        DecodingResult::U8(buf) => cast_all(&buf),
        DecodingResult::U16(buf) => cast_all(&buf),
        DecodingResult::U32(buf) => cast_all(&buf),
        DecodingResult::I8(buf) => cast_all(&buf),
        DecodingResult::I16(buf) => cast_all(&buf),
        DecodingResult::I32(buf) => cast_all(&buf),
        _ => return Err(Error::UnsupportedDataType("unsupported TIFF sample format".to_string())),
    };

    // Multi-band or truncated images decode to a sample count that does not
    // match the declared size.
    if data.len() != rows * cols {
        return Err(Error::SizeMismatch {
            er: rows,
            ec: cols,
            ar: data.len() / cols.max(1),
            ac: cols,
        });
    }

    let raster = Raster::from_vec(data, rows, cols)?;
    raster.ensure_min_size()?;

    let transform = read_geotransform(&mut decoder).unwrap_or_default();
    let projection = decoder
        .get_tag_ascii_string(Tag::GeoAsciiParamsTag)
        .ok()
        .map(|s| s.trim_end_matches(['|', '\0']).to_string());
    debug!(rows, cols, ?transform, "decoded GeoTIFF");

    Ok((raster, GeoMetadata::from_transform(&transform, projection)))
}

fn cast_all<S, T>(buf: &[S]) -> Vec<T>
where
    S: Copy + num_traits::NumCast,
    T: RasterElement,
{
    buf.iter()
        .map(|&v| num_traits::cast(v).unwrap_or_else(T::fallback))
        .collect()
}

/// Attempt to read GeoTransform from TIFF tags: pixel scale plus tiepoint,
/// else a full model transformation matrix.
fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok();
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok();
    if let (Some(scale), Some(tiepoint)) = (scale, tiepoint) {
        return GeoTransform::from_tiepoint(&scale, &tiepoint);
    }
    let matrix = decoder.get_tag_f64_vec(Tag::ModelTransformationTag).ok()?;
    GeoTransform::from_model_transformation(&matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiff::encoder::colortype::Gray32Float;
    use tiff::encoder::TiffEncoder;

    fn encode(rows: u32, cols: u32, data: &[f32], georef: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut encoder = TiffEncoder::new(Cursor::new(&mut buf)).unwrap();
            let mut image = encoder.new_image::<Gray32Float>(cols, rows).unwrap();
            if georef {
                let scale = [10.0_f64, 10.0, 0.0];
                let tiepoint = [0.0_f64, 0.0, 0.0, 1000.0, 2000.0, 0.0];
                image.encoder().write_tag(Tag::ModelPixelScaleTag, &scale[..]).unwrap();
                image.encoder().write_tag(Tag::ModelTiepointTag, &tiepoint[..]).unwrap();
            }
            image.write_data(data).unwrap();
        }
        buf
    }

    #[test]
    fn test_decode_heights_and_transform() {
        let data: Vec<f32> = (0..12).map(|v| v as f32 * 1.5).collect();
        let bytes = encode(3, 4, &data, true);
        assert!(is_tiff(&bytes));

        let (raster, meta) = read_geotiff_from_buffer::<f32>(&bytes).unwrap();
        assert_eq!(raster.shape(), (3, 4));
        assert_eq!(raster.get(2, 3).unwrap(), 16.5);
        assert_eq!(meta.pixel_size, 10.0);
        assert_eq!(meta.origin_x, 1000.0);
        assert_eq!(meta.origin_y, 2000.0);
    }

    #[test]
    fn test_decode_projection_string() {
        let mut buf = Vec::new();
        {
            let mut encoder = TiffEncoder::new(Cursor::new(&mut buf)).unwrap();
            let mut image = encoder.new_image::<Gray32Float>(2, 2).unwrap();
            image
                .encoder()
                .write_tag(Tag::GeoAsciiParamsTag, "WGS 84 / UTM zone 10N|")
                .unwrap();
            image.write_data(&[1.0f32, 2.0, 3.0, 4.0]).unwrap();
        }
        let (_, meta) = read_geotiff_from_buffer::<f32>(&buf).unwrap();
        assert_eq!(meta.projection, "WGS 84 / UTM zone 10N");
    }

    #[test]
    fn test_decode_model_transformation() {
        let matrix = [
            30.0_f64, 0.0, 0.0, 450.0, //
            0.0, -30.0, 0.0, 8100.0, //
            0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        let mut buf = Vec::new();
        {
            let mut encoder = TiffEncoder::new(Cursor::new(&mut buf)).unwrap();
            let mut image = encoder.new_image::<Gray32Float>(2, 2).unwrap();
            image
                .encoder()
                .write_tag(Tag::ModelTransformationTag, &matrix[..])
                .unwrap();
            image.write_data(&[1.0f32, 2.0, 3.0, 4.0]).unwrap();
        }
        let (_, meta) = read_geotiff_from_buffer::<f32>(&buf).unwrap();
        assert_eq!(meta.pixel_size, 30.0);
        assert_eq!(meta.origin_x, 450.0);
        assert_eq!(meta.origin_y, 8100.0);
    }

    #[test]
    fn test_decode_without_georef_uses_default() {
        let bytes = encode(2, 2, &[1.0, 2.0, 3.0, 4.0], false);
        let (_, meta) = read_geotiff_from_buffer::<f32>(&bytes).unwrap();
        assert_eq!(meta, GeoMetadata::default());
    }

    #[test]
    fn test_rejects_single_row() {
        let bytes = encode(1, 4, &[1.0, 2.0, 3.0, 4.0], false);
        let err = read_geotiff_from_buffer::<f32>(&bytes).unwrap_err();
        assert!(matches!(err, Error::InvalidDimensions { .. }));
    }

    #[test]
    fn test_garbage_is_open_error() {
        let err = read_geotiff_from_buffer::<f32>(b"not a tiff at all").unwrap_err();
        assert!(matches!(err, Error::RasterOpen { .. }));
    }

    #[test]
    fn test_missing_file_is_open_error() {
        let err = read_geotiff::<f32, _>("/nonexistent/dem.tif").unwrap_err();
        match err {
            Error::RasterOpen { path, .. } => assert!(path.ends_with("dem.tif")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
