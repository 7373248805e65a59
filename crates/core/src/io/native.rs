//! Native GeoTIFF reading/writing (without GDAL dependency)
//!
//! Uses the `tiff` crate for basic TIFF I/O. Understands the georeferencing
//! tags the pipeline needs to round-trip its own intermediates: pixel scale,
//! tiepoint, the EPSG code from the GeoKey directory, and GDAL's nodata tag.
//! For full GeoTIFF support (projections, advanced types), enable the `gdal` feature.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const KEY_MODEL_TYPE: u16 = 1024;
const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
/// GeoKey value meaning "user defined", i.e. no EPSG code
const USER_DEFINED: u16 = 32767;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone)]
pub struct GeoTiffOptions {
    /// Compression (not supported in native mode; kept for API parity)
    pub compression: String,
}

impl Default for GeoTiffOptions {
    fn default() -> Self {
        Self {
            compression: "NONE".to_string(),
        }
    }
}

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Read a GeoTIFF file into a Raster
///
/// Native reader with limited GeoTIFF metadata support.
/// For full support, enable the `gdal` feature.
pub fn read_geotiff<T, P>(path: P, band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::io_at(path, e))?;
    decode_geotiff(BufReader::new(file), band)
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T>(data: &[u8], band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data), band)
}

macro_rules! cast_band {
    ($buf:expr, $band:expr, $bands:expr) => {
        $buf.iter()
            .skip($band)
            .step_by($bands)
            .map(|&v| num_traits::cast(v).unwrap_or(T::default_nodata()))
            .collect()
    };
}

/// Internal: decode a GeoTIFF from any `Read + Seek` source
fn decode_geotiff<T, R>(reader: R, band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    let mut decoder =
        Decoder::new(reader).map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;

    let rows = height as usize;
    let cols = width as usize;
    let cells = rows * cols;

    let result = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    let samples = match &result {
        DecodingResult::U8(b) => b.len(),
        DecodingResult::U16(b) => b.len(),
        DecodingResult::U32(b) => b.len(),
        DecodingResult::I8(b) => b.len(),
        DecodingResult::I16(b) => b.len(),
        DecodingResult::I32(b) => b.len(),
        DecodingResult::F32(b) => b.len(),
        DecodingResult::F64(b) => b.len(),
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ))
        }
    };

    if cells == 0 || samples % cells != 0 {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }
    let bands = samples / cells;
    // Band numbers are 1-indexed, as in GDAL
    let band_idx = band.unwrap_or(1).saturating_sub(1);
    if band_idx >= bands {
        return Err(Error::InvalidParameter {
            name: "band",
            value: (band_idx + 1).to_string(),
            reason: format!("image has {} band(s)", bands),
        });
    }

    let data: Vec<T> = match result {
        DecodingResult::U8(buf) => cast_band!(buf, band_idx, bands),
        DecodingResult::U16(buf) => cast_band!(buf, band_idx, bands),
        DecodingResult::U32(buf) => cast_band!(buf, band_idx, bands),
        DecodingResult::I8(buf) => cast_band!(buf, band_idx, bands),
        DecodingResult::I16(buf) => cast_band!(buf, band_idx, bands),
        DecodingResult::I32(buf) => cast_band!(buf, band_idx, bands),
        DecodingResult::F32(buf) => cast_band!(buf, band_idx, bands),
        DecodingResult::F64(buf) => cast_band!(buf, band_idx, bands),
        _ => unreachable!("pixel format checked above"),
    };

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Ok(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_crs(&mut decoder));
    raster.set_nodata(read_nodata(&mut decoder));

    Ok(raster)
}

/// Attempt to read GeoTransform from TIFF tags
fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(tag(MODEL_PIXEL_SCALE))
        .map_err(|_| Error::Other("No pixel scale tag".into()))?;

    let tiepoint = decoder
        .get_tag_f64_vec(tag(MODEL_TIEPOINT))
        .map_err(|_| Error::Other("No tiepoint tag".into()))?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z]
        // scale: [ScaleX, ScaleY, ScaleZ]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        let pixel_width = scale[0];
        let pixel_height = -scale[1]; // Negative for north-up

        return Ok(GeoTransform::new(origin_x, origin_y, pixel_width, pixel_height));
    }

    Err(Error::Other("Cannot determine geotransform".into()))
}

/// EPSG code from the GeoKey directory (projected first, then geographic)
fn read_crs<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u16_vec(tag(GEO_KEY_DIRECTORY)).ok()?;
    if keys.len() < 4 {
        return None;
    }
    let count = keys[3] as usize;

    let mut projected = None;
    let mut geographic = None;
    for entry in keys[4..].chunks_exact(4).take(count) {
        // [key id, tag location, count, value]; location 0 means inline value
        let (id, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 || value == 0 || value == USER_DEFINED {
            continue;
        }
        match id {
            KEY_PROJECTED_CS_TYPE => projected = Some(value),
            KEY_GEOGRAPHIC_TYPE => geographic = Some(value),
            _ => {}
        }
    }

    projected
        .or(geographic)
        .map(|code| CRS::from_epsg(u32::from(code)))
}

fn read_nodata<R, T>(decoder: &mut Decoder<R>) -> Option<T>
where
    R: std::io::Read + std::io::Seek,
    T: RasterElement,
{
    let text = decoder.get_tag_ascii_string(tag(GDAL_NODATA)).ok()?;
    let value: f64 = text.trim_matches(char::from(0)).trim().parse().ok()?;
    T::from_f64(value)
}

/// Write a Raster to a GeoTIFF file
///
/// Native writer with limited GeoTIFF metadata support.
/// Writes as 32-bit float. For full support, enable the `gdal` feature.
/// The file handle is closed before this function returns.
pub fn write_geotiff<T, P>(
    raster: &Raster<T>,
    path: P,
    _options: Option<GeoTiffOptions>,
) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| Error::io_at(path, e))?;
    let mut writer = BufWriter::new(file);
    encode_geotiff(raster, &mut writer)?;
    let file = writer
        .into_inner()
        .map_err(|e| Error::io_at(path, e.into_error()))?;
    file.sync_all().map_err(|e| Error::io_at(path, e))?;
    Ok(())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(
    raster: &Raster<T>,
    _options: Option<GeoTiffOptions>,
) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf))?;
    Ok(buf)
}

/// GeoKey directory describing raster type and, when known, the EPSG code
fn geokeys(crs: Option<&CRS>) -> Vec<u16> {
    let code = crs
        .and_then(|c| c.epsg())
        .and_then(|c| u16::try_from(c).ok());

    let mut entries: Vec<[u16; 4]> = Vec::new();
    match (crs, code) {
        (Some(crs), Some(code)) if crs.is_geographic() => {
            entries.push([KEY_MODEL_TYPE, 0, 1, MODEL_TYPE_GEOGRAPHIC]);
            entries.push([KEY_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA]);
            entries.push([KEY_GEOGRAPHIC_TYPE, 0, 1, code]);
        }
        (_, Some(code)) => {
            entries.push([KEY_MODEL_TYPE, 0, 1, MODEL_TYPE_PROJECTED]);
            entries.push([KEY_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA]);
            entries.push([KEY_PROJECTED_CS_TYPE, 0, 1, code]);
        }
        _ => {
            entries.push([KEY_MODEL_TYPE, 0, 1, MODEL_TYPE_PROJECTED]);
            entries.push([KEY_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA]);
        }
    }

    let mut keys = vec![1, 1, 0, entries.len() as u16];
    for e in entries {
        keys.extend_from_slice(&e);
    }
    keys
}

/// Internal: encode a Raster as GeoTIFF into any `Write + Seek` sink
fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + std::io::Seek,
{
    let mut encoder = TiffEncoder::new(writer)
        .map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    let (rows, cols) = raster.shape();

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;

    let gt = raster.transform();

    let scale = vec![gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(tag(MODEL_PIXEL_SCALE), scale.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write scale tag: {}", e)))?;

    let tiepoint = vec![0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(tag(MODEL_TIEPOINT), tiepoint.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write tiepoint tag: {}", e)))?;

    let keys = geokeys(raster.crs());
    image
        .encoder()
        .write_tag(tag(GEO_KEY_DIRECTORY), keys.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write geokey tag: {}", e)))?;

    if let Some(nd) = raster.nodata().and_then(|nd| nd.to_f64()) {
        let text = format!("{}", nd);
        image
            .encoder()
            .write_tag(tag(GDAL_NODATA), text.as_str())
            .map_err(|e| Error::Other(format!("Cannot write nodata tag: {}", e)))?;
    }

    image
        .write_data(&data)
        .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_roundtrip_keeps_georeferencing() {
        let mut raster: Raster<f64> = Raster::new(3, 4);
        for r in 0..3 {
            for c in 0..4 {
                raster.set(r, c, (r * 4 + c) as f64).unwrap();
            }
        }
        raster.set(1, 1, -9999.0).unwrap();
        raster.set_transform(GeoTransform::new(330_000.0, 7_400_000.0, 30.0, -30.0));
        raster.set_crs(Some(CRS::from_epsg(31983)));
        raster.set_nodata(Some(-9999.0));

        let bytes = write_geotiff_to_buffer(&raster, None).unwrap();
        let loaded: Raster<f64> = read_geotiff_from_buffer(&bytes, None).unwrap();

        assert_eq!(loaded.shape(), (3, 4));
        assert_eq!(loaded.transform(), raster.transform());
        assert_eq!(loaded.crs().and_then(|c| c.epsg()), Some(31983));
        assert_eq!(loaded.nodata(), Some(-9999.0));
        assert!(loaded.is_nodata(loaded.get(1, 1).unwrap()));
        assert_eq!(loaded.get(2, 3).unwrap(), 11.0);
    }

    #[test]
    fn geographic_crs_uses_geographic_key() {
        let keys = geokeys(Some(&CRS::wgs84()));
        assert!(keys.chunks(4).any(|k| k[0] == KEY_GEOGRAPHIC_TYPE && k[3] == 4326));
        let keys = geokeys(None);
        assert_eq!(keys[3], 2);
    }

    #[test]
    fn missing_band_is_rejected() {
        let raster: Raster<f32> = Raster::new(2, 2);
        let bytes = write_geotiff_to_buffer(&raster, None).unwrap();
        assert!(read_geotiff_from_buffer::<f32>(&bytes, Some(2)).is_err());
    }
}
