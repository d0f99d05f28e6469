//! Single-band float GeoTIFF codec.
//!
//! Georeferencing is read from the GeoTIFF tags:
//!
//! - `ModelPixelScaleTag` + `ModelTiepointTag`, or a north-up
//!   `ModelTransformationTag`, for the grid geometry
//! - `GeoKeyDirectoryTag` for the EPSG code (`ProjectedCSTypeGeoKey`, else
//!   `GeographicTypeGeoKey`) and the raster type (area or point)
//! - `GDAL_NODATA` for the missing-value sentinel
//!
//! Samples of any integer or float type are widened to `f32`. Rasters are
//! written as 32-bit float with `NaN` for missing cells.

use std::fs;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use covariate_common::{Band, CrsCode, GridSpec, Raster};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tracing::{debug, warn};

use crate::error::{RasterIoError, RasterIoResult};

/// Extensions recognized as GeoTIFF files.
pub const EXTENSIONS: &[&str] = &["tif", "tiff"];

/// Extension used when writing.
pub const EXTENSION: &str = "tif";

/// Upper bound on the decoded image size in bytes.
pub const MAX_DECODED_BYTES: usize = u32::MAX as usize;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u16 = 32767;

/// Whether `path` carries a GeoTIFF extension.
pub fn is_geotiff(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Georeferencing of a decoded image.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoInfo {
    pub grid: GridSpec,
    pub crs: Option<CrsCode>,
    pub nodata: Option<f64>,
}

/// Keys of a `GeoKeyDirectoryTag` that carry their value inline.
fn geo_keys(directory: &[u16]) -> Vec<(u16, u16)> {
    if directory.len() < 4 {
        return Vec::new();
    }
    let count = directory[3] as usize;
    directory[4..]
        .chunks_exact(4)
        .take(count)
        .filter(|entry| entry[1] == 0)
        .map(|entry| (entry[0], entry[3]))
        .collect()
}

/// EPSG-coded CRS named by a GeoKey directory.
pub fn crs_from_geokeys(directory: &[u16]) -> Option<CrsCode> {
    let keys = geo_keys(directory);
    let lookup = |id: u16| keys.iter().find(|(k, _)| *k == id).map(|(_, v)| *v);
    let code = lookup(PROJECTED_CS_TYPE)
        .or_else(|| lookup(GEOGRAPHIC_TYPE))
        .filter(|c| *c != USER_DEFINED)?;
    CrsCode::parse(&format!("EPSG:{}", code)).ok()
}

/// GeoKey directory describing `crs` with area-registered pixels.
pub fn geokeys_for(crs: CrsCode) -> RasterIoResult<Vec<u16>> {
    let epsg = u16::try_from(crs.epsg())
        .map_err(|_| RasterIoError::InvalidFormat(format!("EPSG code of {} does not fit a GeoKey", crs)))?;
    let (model, cs_key) = if crs.is_geographic() {
        (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE)
    } else {
        (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE)
    };
    // Header: directory version, key revision, minor revision, key count.
    let mut keys = vec![1, 1, 0, 3];
    for (key, value) in [
        (GT_MODEL_TYPE, model),
        (GT_RASTER_TYPE, RASTER_PIXEL_IS_AREA),
        (cs_key, epsg),
    ] {
        keys.extend_from_slice(&[key, 0, 1, value]);
    }
    Ok(keys)
}

fn optional_f64s<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag) -> RasterIoResult<Option<Vec<f64>>> {
    if decoder.find_tag(tag)?.is_none() {
        return Ok(None);
    }
    Ok(Some(decoder.get_tag_f64_vec(tag)?))
}

fn read_geo_info<R: Read + Seek>(decoder: &mut Decoder<R>, nx: usize, ny: usize) -> RasterIoResult<GeoInfo> {
    let directory = if decoder.find_tag(Tag::GeoKeyDirectoryTag)?.is_some() {
        decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag)?
    } else {
        Vec::new()
    };
    let crs = crs_from_geokeys(&directory);
    let pixel_is_point = geo_keys(&directory)
        .iter()
        .any(|(k, v)| *k == GT_RASTER_TYPE && *v == RASTER_PIXEL_IS_POINT);

    let scale = optional_f64s(decoder, Tag::ModelPixelScaleTag)?;
    let tiepoint = optional_f64s(decoder, Tag::ModelTiepointTag)?;
    let transform = optional_f64s(decoder, Tag::ModelTransformationTag)?;

    let (mut origin_x, mut origin_y, dx, dy) = match (scale, tiepoint, transform) {
        (Some(s), Some(t), _) if s.len() >= 2 && t.len() >= 6 => {
            // Tiepoint (i, j, k) -> (x, y, z); rows grow southwards.
            (t[3] - t[0] * s[0], t[4] + t[1] * s[1], s[0], s[1])
        }
        (_, _, Some(m)) if m.len() >= 8 => {
            if m[1] != 0.0 || m[4] != 0.0 {
                return Err(RasterIoError::InvalidFormat(
                    "rotated model transformation is not supported".to_string(),
                ));
            }
            (m[3], m[7], m[0], -m[5])
        }
        _ => {
            return Err(RasterIoError::InvalidFormat(
                "image has no georeferencing tags".to_string(),
            ))
        }
    };

    if pixel_is_point {
        origin_x -= dx / 2.0;
        origin_y += dy / 2.0;
    }

    if !(dx.is_finite() && dy.is_finite() && dx > 0.0 && dy > 0.0) {
        return Err(RasterIoError::InvalidFormat(format!(
            "pixel size {}x{} is not positive",
            dx, dy
        )));
    }

    let nodata = if decoder.find_tag(Tag::GdalNodata)?.is_some() {
        let text = decoder.get_tag_ascii_string(Tag::GdalNodata)?;
        let text = text.trim_matches(char::from(0)).trim();
        Some(text.parse::<f64>().map_err(|_| {
            RasterIoError::InvalidFormat(format!("bad GDAL_NODATA value '{}'", text))
        })?)
    } else {
        None
    };

    Ok(GeoInfo {
        grid: GridSpec::new(nx, ny, dx, dy, origin_x, origin_y),
        crs,
        nodata,
    })
}

fn widen(image: DecodingResult) -> RasterIoResult<Vec<f32>> {
    #[allow(unreachable_patterns)]
    let data = match image {
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
        _ => {
            return Err(RasterIoError::InvalidFormat(
                "unsupported sample format".to_string(),
            ))
        }
    };
    Ok(data)
}

/// Decode a GeoTIFF image into a raster. Single-sample images give one band
/// called `name`; interleaved samples give `name_1`, `name_2`, ... Nodata
/// cells become `NaN`.
pub fn decode(bytes: &[u8], name: &str) -> RasterIoResult<Raster> {
    let mut limits = Limits::default();
    limits.decoding_buffer_size = MAX_DECODED_BYTES;
    let mut decoder = Decoder::new(Cursor::new(bytes))?.with_limits(limits);

    let (width, height) = decoder.dimensions()?;
    let (nx, ny) = (width as usize, height as usize);
    let cells = nx
        .checked_mul(ny)
        .filter(|c| *c > 0)
        .ok_or_else(|| RasterIoError::InvalidFormat(format!("unusable image size {}x{}", nx, ny)))?;

    let info = read_geo_info(&mut decoder, nx, ny)?;
    let mut data = widen(decoder.read_image()?)?;

    if let Some(nd) = info.nodata.filter(|v| !v.is_nan()) {
        let nd = nd as f32;
        for v in data.iter_mut().filter(|v| **v == nd) {
            *v = f32::NAN;
        }
    }

    if data.len() % cells != 0 || data.is_empty() {
        return Err(RasterIoError::InvalidFormat(format!(
            "expected a multiple of {} samples ({}x{}), found {}",
            cells,
            nx,
            ny,
            data.len()
        )));
    }
    let samples = data.len() / cells;
    let bands = if samples == 1 {
        vec![Band::new(name, data)]
    } else {
        (0..samples)
            .map(|s| {
                let values = data.iter().skip(s).step_by(samples).copied().collect();
                Band::new(format!("{}_{}", name, s + 1), values)
            })
            .collect()
    };

    debug!(
        layer = name,
        nx,
        ny,
        bands = bands.len(),
        crs = ?info.crs,
        "Decoded GeoTIFF"
    );

    Ok(Raster {
        grid: info.grid,
        crs: info.crs,
        bands,
    })
}

/// Encode one band as a float32 GeoTIFF.
pub fn encode(raster: &Raster, band: usize) -> RasterIoResult<Vec<u8>> {
    let b = raster.bands.get(band).ok_or(RasterIoError::NoSuchBand {
        index: band,
        count: raster.bands.len(),
    })?;
    let grid = &raster.grid;
    let cells = grid.checked_len().filter(|c| *c == b.data.len()).ok_or_else(|| {
        RasterIoError::InvalidFormat(format!(
            "band '{}' has {} values for a {}x{} grid",
            b.name,
            b.data.len(),
            grid.nx,
            grid.ny
        ))
    })?;
    let width = u32::try_from(grid.nx)
        .map_err(|_| RasterIoError::InvalidFormat(format!("{} columns exceed TIFF limits", grid.nx)))?;
    let height = u32::try_from(grid.ny)
        .map_err(|_| RasterIoError::InvalidFormat(format!("{} rows exceed TIFF limits", grid.ny)))?;

    let mut out = Cursor::new(Vec::with_capacity(cells * 4 + 1024));
    {
        let mut encoder = TiffEncoder::new(&mut out)?;
        let mut image = encoder.new_image::<colortype::Gray32Float>(width, height)?;
        let dir = image.encoder();
        dir.write_tag(Tag::ModelPixelScaleTag, &[grid.dx, grid.dy, 0.0][..])?;
        dir.write_tag(
            Tag::ModelTiepointTag,
            &[0.0, 0.0, 0.0, grid.origin_x, grid.origin_y, 0.0][..],
        )?;
        if let Some(crs) = raster.crs {
            dir.write_tag(Tag::GeoKeyDirectoryTag, &geokeys_for(crs)?[..])?;
        }
        dir.write_tag(Tag::GdalNodata, "nan")?;
        image.write_data(&b.data)?;
    }
    Ok(out.into_inner())
}

/// Read a GeoTIFF file. The band is named after the file stem.
pub fn read(path: &Path) -> RasterIoResult<Raster> {
    let bytes = fs::read(path)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "layer".to_string());
    let raster = decode(&bytes, &name)?;
    if raster.crs.is_none() {
        warn!(path = %path.display(), "GeoTIFF has no EPSG-coded CRS");
    }
    Ok(raster)
}

/// Write one band of a raster to `path`.
pub fn write_band(raster: &Raster, band: usize, path: &Path) -> RasterIoResult<()> {
    let bytes = encode(raster, band)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(())
}

/// Write every band to `<dir>/<band name>.tif`. Returns the written paths in
/// band order.
pub fn write_stack(raster: &Raster, dir: &Path) -> RasterIoResult<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut paths = Vec::with_capacity(raster.bands.len());
    for (i, band) in raster.bands.iter().enumerate() {
        let path = dir.join(format!("{}.{}", band.name, EXTENSION));
        write_band(raster, i, &path)?;
        paths.push(path);
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GridSpec {
        GridSpec::new(3, 2, 10.0, 10.0, 100.0, 220.0)
    }

    #[test]
    fn test_geokeys_name_the_crs() {
        let utm = CrsCode::Utm { zone: 33, north: true };
        assert_eq!(crs_from_geokeys(&geokeys_for(utm).unwrap()), Some(utm));
        assert_eq!(
            crs_from_geokeys(&geokeys_for(CrsCode::Epsg4326).unwrap()),
            Some(CrsCode::Epsg4326)
        );
        // user-defined projection
        assert_eq!(crs_from_geokeys(&[1, 1, 0, 1, 3072, 0, 1, 32767]), None);
        assert_eq!(crs_from_geokeys(&[1, 1]), None);
    }

    #[test]
    fn test_decode_keeps_nan_and_geometry() {
        let raster = Raster::single(
            "dem",
            grid(),
            Some(CrsCode::Epsg3857),
            vec![1.0, 2.0, 3.0, 4.0, f32::NAN, 6.0],
        )
        .unwrap();
        let out = decode(&encode(&raster, 0).unwrap(), "dem").unwrap();

        assert_eq!(out.grid, grid());
        assert_eq!(out.crs, Some(CrsCode::Epsg3857));
        assert_eq!(out.bands[0].data[5], 6.0);
        assert!(out.bands[0].data[4].is_nan());
    }

    #[test]
    fn test_encode_rejects_mismatched_band() {
        let raster = Raster {
            grid: grid(),
            crs: None,
            bands: vec![Band::new("short", vec![1.0; 4])],
        };
        assert!(matches!(encode(&raster, 0), Err(RasterIoError::InvalidFormat(_))));
        assert!(matches!(
            encode(&raster, 2),
            Err(RasterIoError::NoSuchBand { index: 2, count: 1 })
        ));
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(matches!(decode(b"ncols 3\nnrows 2\n", "x"), Err(RasterIoError::Tiff(_))));
    }

    #[test]
    fn test_extension_check() {
        assert!(is_geotiff(Path::new("a/b/slope.TIF")));
        assert!(is_geotiff(Path::new("bio01.tiff")));
        assert!(!is_geotiff(Path::new("notes.txt")));
        assert!(!is_geotiff(Path::new("dem")));
    }
}
