//! Affine geotransformation and the metadata block carried with a DEM

/// Affine transformation coefficients for georeferencing rasters.
///
/// Converts between pixel coordinates (col, row) and geographic coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// For north-up images, `row_rotation` and `col_rotation` are typically 0,
/// and `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
    /// Rotation about X axis (usually 0)
    pub row_rotation: f64,
    /// Rotation about Y axis (usually 0)
    pub col_rotation: f64,
}

impl GeoTransform {
    /// Create a new GeoTransform with no rotation (north-up image)
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// Create from the six affine coefficients
    /// `[origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]`
    pub fn from_coefficients(coeffs: [f64; 6]) -> Self {
        Self {
            origin_x: coeffs[0],
            pixel_width: coeffs[1],
            row_rotation: coeffs[2],
            origin_y: coeffs[3],
            col_rotation: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    /// Build from GeoTIFF ModelPixelScale + ModelTiepoint tag values.
    ///
    /// `tiepoint` is `[I, J, K, X, Y, Z]` and `scale` is `[ScaleX, ScaleY, ScaleZ]`.
    pub fn from_tiepoint(scale: &[f64], tiepoint: &[f64]) -> Option<Self> {
        if scale.len() < 2 || tiepoint.len() < 6 {
            return None;
        }
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        Some(Self::new(origin_x, origin_y, scale[0], -scale[1]))
    }

    /// Build from a GeoTIFF ModelTransformation tag (row-major 4x4 matrix).
    pub fn from_model_transformation(matrix: &[f64]) -> Option<Self> {
        if matrix.len() < 16 {
            return None;
        }
        Some(Self::from_coefficients([
            matrix[3], matrix[0], matrix[1], matrix[7], matrix[4], matrix[5],
        ]))
    }

    /// Get the cell size (assumes square pixels and no rotation).
    ///
    /// This is the X size only; the Y size lives in `pixel_height`.
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

/// Georeferencing passed through unchanged from the input raster to the
/// metadata output.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoMetadata {
    /// Physical size of one cell along X
    pub pixel_size: f64,
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Projection as reported by the source (WKT or empty)
    pub projection: String,
}

impl GeoMetadata {
    /// Metadata from a transform and an optional projection string
    pub fn from_transform(transform: &GeoTransform, projection: Option<String>) -> Self {
        Self {
            pixel_size: transform.cell_size(),
            origin_x: transform.origin_x,
            origin_y: transform.origin_y,
            projection: projection.unwrap_or_default(),
        }
    }
}

impl Default for GeoMetadata {
    fn default() -> Self {
        Self::from_transform(&GeoTransform::default(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_tiepoint() {
        let gt = GeoTransform::from_tiepoint(&[30.0, 30.0, 0.0], &[0.0, 0.0, 0.0, 500.0, 9000.0, 0.0])
            .unwrap();
        assert_relative_eq!(gt.origin_x, 500.0);
        assert_relative_eq!(gt.origin_y, 9000.0);
        assert_relative_eq!(gt.pixel_height, -30.0);
        assert_relative_eq!(gt.cell_size(), 30.0);
    }

    #[test]
    fn test_from_model_transformation() {
        let matrix = [
            5.0, 0.0, 0.0, 300.0, //
            0.0, -5.0, 0.0, 700.0, //
            0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        let gt = GeoTransform::from_model_transformation(&matrix).unwrap();
        assert_relative_eq!(gt.origin_x, 300.0);
        assert_relative_eq!(gt.origin_y, 700.0);
        assert_relative_eq!(gt.pixel_height, -5.0);
        assert_relative_eq!(gt.cell_size(), 5.0);
        assert!(GeoTransform::from_model_transformation(&matrix[..6]).is_none());
    }

    #[test]
    fn test_from_tiepoint_too_short() {
        assert!(GeoTransform::from_tiepoint(&[1.0], &[0.0; 6]).is_none());
    }

    #[test]
    fn test_metadata_from_coefficients() {
        let gt = GeoTransform::from_coefficients([100.0, 10.0, 0.0, 200.0, 0.0, -10.0]);
        let meta = GeoMetadata::from_transform(&gt, Some("EPSG:32610".into()));
        assert_relative_eq!(meta.pixel_size, 10.0);
        assert_relative_eq!(meta.origin_x, 100.0);
        assert_relative_eq!(meta.origin_y, 200.0);
        assert_eq!(meta.projection, "EPSG:32610");
    }
}
