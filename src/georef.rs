use std::fmt;

use glam::{DAffine2, DVec2};

const KEY_MODEL_TYPE: u16 = 1024;
const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_TYPE: u16 = 3072;

const MODEL_PROJECTED: u16 = 1;
const MODEL_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Coordinate reference system, identified by EPSG code when known.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Crs {
    Unknown,
    Projected(u32),
    Geographic(u32),
}

impl Crs {
    pub fn epsg(&self) -> Option<u32> {
        match *self {
            Crs::Unknown => None,
            Crs::Projected(code) | Crs::Geographic(code) => Some(code),
        }
    }

    /// An unknown system is accepted against anything.
    pub fn is_compatible(&self, other: &Crs) -> bool {
        match (self.epsg(), other.epsg()) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }

    /// Reads a GeoTIFF GeoKeyDirectory (`[version, revision, minor, count, entries...]`).
    pub fn from_geokeys(keys: &[u16]) -> Crs {
        if keys.len() < 4 {
            return Crs::Unknown;
        }
        let count = keys[3] as usize;
        let mut crs = Crs::Unknown;
        for entry in keys[4..].chunks_exact(4).take(count) {
            let (key, location, value) = (entry[0], entry[1], entry[3]);
            /* only inline SHORT values carry EPSG codes; 32767 is "user defined" */
            if location != 0 || value == 0 || value == 32767 {
                continue;
            }
            match key {
                KEY_PROJECTED_TYPE => crs = Crs::Projected(value as u32),
                KEY_GEOGRAPHIC_TYPE if crs == Crs::Unknown => crs = Crs::Geographic(value as u32),
                _ => {}
            }
        }
        crs
    }

    pub fn to_geokeys(&self) -> Option<Vec<u16>> {
        let (model, key, code) = match *self {
            Crs::Unknown => return None,
            Crs::Projected(code) => (MODEL_PROJECTED, KEY_PROJECTED_TYPE, code),
            Crs::Geographic(code) => (MODEL_GEOGRAPHIC, KEY_GEOGRAPHIC_TYPE, code),
        };
        let code = u16::try_from(code).ok()?;
        Some(vec![
            1,
            1,
            0,
            3,
            KEY_MODEL_TYPE,
            0,
            1,
            model,
            KEY_RASTER_TYPE,
            0,
            1,
            RASTER_PIXEL_IS_AREA,
            key,
            0,
            1,
            code,
        ])
    }

    /// Extracts the outermost EPSG authority of a WKT definition (`.prj` files).
    pub fn from_wkt(wkt: &str) -> Crs {
        let code = ["AUTHORITY[\"EPSG\",\"", "ID[\"EPSG\","]
            .iter()
            .filter_map(|marker| wkt.rfind(marker).map(|pos| pos + marker.len()))
            .max()
            .and_then(|start| leading_number(&wkt[start..]));
        match code {
            None => Crs::Unknown,
            Some(code) => {
                let head = wkt.trim_start();
                if head.starts_with("GEOGCS") || head.starts_with("GEOGCRS") {
                    Crs::Geographic(code)
                } else {
                    Crs::Projected(code)
                }
            }
        }
    }

    /// Parses `EPSG:4326` or `urn:ogc:def:crs:EPSG::4326` style names.
    pub fn from_name(name: &str) -> Crs {
        let upper = name.to_ascii_uppercase();
        let code = match upper.rfind("EPSG") {
            Some(pos) => leading_number(upper[pos + 4..].trim_start_matches(':')),
            None => None,
        };
        match code {
            Some(code) if is_geographic_code(code) => Crs::Geographic(code),
            Some(code) => Crs::Projected(code),
            None => Crs::Unknown,
        }
    }

    pub fn to_name(&self) -> Option<String> {
        self.epsg().map(|code| format!("urn:ogc:def:crs:EPSG::{}", code))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.epsg() {
            Some(code) => write!(f, "EPSG:{}", code),
            None => write!(f, "unknown"),
        }
    }
}

fn leading_number(s: &str) -> Option<u32> {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/* EPSG geographic 2D systems live in 4001..=4999 for the common cases */
fn is_geographic_code(code: u32) -> bool {
    (4001..=4999).contains(&code)
}

/// Affine pixel to world mapping. Pixel `(0, 0)` is the top-left corner of
/// the first pixel.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GeoTransform {
    affine: DAffine2,
}

impl Default for GeoTransform {
    fn default() -> Self {
        GeoTransform::identity()
    }
}

impl GeoTransform {
    pub fn identity() -> GeoTransform {
        GeoTransform {
            affine: DAffine2::IDENTITY,
        }
    }

    /// `[x0, dx, rx, y0, ry, dy]` in GDAL order.
    pub fn from_gdal(gt: [f64; 6]) -> GeoTransform {
        GeoTransform {
            affine: DAffine2::from_cols(
                DVec2::new(gt[1], gt[4]),
                DVec2::new(gt[2], gt[5]),
                DVec2::new(gt[0], gt[3]),
            ),
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        let m = &self.affine.matrix2;
        let t = self.affine.translation;
        [t.x, m.x_axis.x, m.y_axis.x, t.y, m.x_axis.y, m.y_axis.y]
    }

    /// GeoTIFF `ModelTiepointTag` + `ModelPixelScaleTag`.
    pub fn from_tiepoint(tiepoint: &[f64], scale: &[f64]) -> Option<GeoTransform> {
        if tiepoint.len() < 6 || scale.len() < 2 {
            return None;
        }
        let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
        let (sx, sy) = (scale[0], scale[1]);
        if sx == 0.0 || sy == 0.0 {
            return None;
        }
        Some(GeoTransform::from_gdal([
            x - i * sx,
            sx,
            0.0,
            y + j * sy,
            0.0,
            -sy,
        ]))
    }

    /// GeoTIFF `ModelTransformationTag`, a row-major 4x4 matrix.
    pub fn from_model_transformation(m: &[f64]) -> Option<GeoTransform> {
        if m.len() < 16 {
            return None;
        }
        let gt = GeoTransform::from_gdal([m[3], m[0], m[1], m[7], m[4], m[5]]);
        if gt.affine.matrix2.determinant() == 0.0 {
            return None;
        }
        Some(gt)
    }

    pub fn has_rotation(&self) -> bool {
        let m = &self.affine.matrix2;
        m.x_axis.y != 0.0 || m.y_axis.x != 0.0
    }

    /// `(tiepoint, pixel_scale)` for a north-up transform, `None` when rotated.
    pub fn to_tiepoint(&self) -> Option<([f64; 6], [f64; 3])> {
        if self.has_rotation() {
            return None;
        }
        let gt = self.to_gdal();
        Some(([0.0, 0.0, 0.0, gt[0], gt[3], 0.0], [gt[1], -gt[5], 0.0]))
    }

    pub fn to_model_transformation(&self) -> [f64; 16] {
        let gt = self.to_gdal();
        [
            gt[1], gt[2], 0.0, gt[0], //
            gt[4], gt[5], 0.0, gt[3], //
            0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ]
    }

    pub fn pixel_to_world(&self, pixel: DVec2) -> DVec2 {
        self.affine.transform_point2(pixel)
    }

    pub fn world_to_pixel(&self, world: DVec2) -> DVec2 {
        self.affine.inverse().transform_point2(world)
    }

    pub fn inverse(&self) -> DAffine2 {
        self.affine.inverse()
    }

    /// Ground area of one pixel.
    pub fn pixel_area(&self) -> f64 {
        self.affine.matrix2.determinant().abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiepoint_round_trip() {
        let gt = GeoTransform::from_tiepoint(
            &[0.0, 0.0, 0.0, 500_000.0, 4_200_000.0, 0.0],
            &[10.0, 10.0, 0.0],
        )
        .unwrap();
        assert_eq!(gt.to_gdal(), [500_000.0, 10.0, 0.0, 4_200_000.0, 0.0, -10.0]);
        let world = gt.pixel_to_world(DVec2::new(2.0, 3.0));
        assert_eq!(world, DVec2::new(500_020.0, 4_199_970.0));
        let pixel = gt.world_to_pixel(world);
        assert!((pixel - DVec2::new(2.0, 3.0)).length() < 1e-9);
        let (tiepoint, scale) = gt.to_tiepoint().unwrap();
        assert_eq!(tiepoint[3], 500_000.0);
        assert_eq!(scale[1], 10.0);
    }

    #[test]
    fn geokeys_round_trip() {
        let crs = Crs::Projected(27700);
        let keys = crs.to_geokeys().unwrap();
        assert_eq!(Crs::from_geokeys(&keys), crs);
        assert_eq!(Crs::from_geokeys(&[1, 1, 0]), Crs::Unknown);
    }

    #[test]
    fn wkt_uses_outermost_authority() {
        let wkt = r#"PROJCS["OSGB 1936 / British National Grid",GEOGCS["OSGB 1936",AUTHORITY["EPSG","4277"]],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AUTHORITY["EPSG","27700"]]"#;
        assert_eq!(Crs::from_wkt(wkt), Crs::Projected(27700));
        let wkt = r#"GEOGCS["WGS 84",DATUM["WGS_1984"],AUTHORITY["EPSG","4326"]]"#;
        assert_eq!(Crs::from_wkt(wkt), Crs::Geographic(4326));
        assert_eq!(Crs::from_wkt("LOCAL_CS[\"x\"]"), Crs::Unknown);
    }

    #[test]
    fn names_and_compatibility() {
        assert_eq!(Crs::from_name("urn:ogc:def:crs:EPSG::32630"), Crs::Projected(32630));
        assert_eq!(Crs::from_name("EPSG:4326"), Crs::Geographic(4326));
        assert!(Crs::Unknown.is_compatible(&Crs::Projected(1)));
        assert!(!Crs::Projected(1).is_compatible(&Crs::Projected(2)));
    }
}
