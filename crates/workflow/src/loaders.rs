//! Grid loaders referenced by workflow data sources.
//!
//! A loader turns the (already `$ref`-resolved) parameter object of a data
//! source into a [`RasterGrid`]. Built-in loaders:
//!
//! | name | parameters | reads |
//! |---|---|---|
//! | `rasterio` | `path`, `band` (1) | GeoTIFF band, GDAL nodata as NaN |
//! | `topotoolbox.read_tif` | `path` | GeoTIFF band 1 |
//! | `topotoolbox.load_dem` | `source` | GeoTIFF, `.tif` appended when missing |
//! | `numpy` | `path`, `key` | `.npy` 2D array, cell size 1 |
//! | `array` | `values`, `cellsize` (1) | inline nested rows, `null` as NaN |

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{Array2, ShapeBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use topoviz_common::{Extent, RasterGrid, Result, TopovizError};
use tracing::{debug, warn};

/// GeoTIFF ModelPixelScaleTag.
const MODEL_PIXEL_SCALE_TAG: u16 = 33550;
/// GeoTIFF ModelTiepointTag.
const MODEL_TIEPOINT_TAG: u16 = 33922;
/// GDAL_NODATA ascii tag.
const GDAL_NODATA_TAG: u16 = 42113;

const NPY_MAGIC: &[u8] = b"\x93NUMPY";

/// Loads a grid from resolved data-source parameters.
pub type Loader = Arc<dyn Fn(Map<String, Value>) -> Result<RasterGrid> + Send + Sync>;

/// Registry of grid loaders keyed by name.
#[derive(Clone, Default)]
pub struct LoaderRegistry {
    loaders: HashMap<String, Loader>,
}

impl fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RasterioParams {
    path: PathBuf,
    #[serde(default = "first_band")]
    band: usize,
}

fn first_band() -> usize {
    1
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PathParams {
    path: PathBuf,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DemParams {
    source: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NumpyParams {
    path: PathBuf,
    #[serde(default)]
    key: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ArrayParams {
    values: Vec<Vec<Option<f64>>>,
    #[serde(default = "unit_cellsize")]
    cellsize: f64,
}

fn unit_cellsize() -> f64 {
    1.0
}

fn decode<T: DeserializeOwned>(loader: &str, params: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(params))
        .map_err(|e| TopovizError::invalid_parameter(format!("{} params", loader), e.to_string()))
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in loader.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("rasterio", |params| {
            let p: RasterioParams = decode("rasterio", params)?;
            read_geotiff(&p.path, p.band)
        });
        registry.register("topotoolbox.read_tif", |params| {
            let p: PathParams = decode("topotoolbox.read_tif", params)?;
            read_geotiff(&p.path, 1)
        });
        registry.register("topotoolbox.load_dem", |params| {
            let p: DemParams = decode("topotoolbox.load_dem", params)?;
            read_geotiff(&dem_source_path(&p.source), 1)
        });
        registry.register("numpy", |params| {
            let p: NumpyParams = decode("numpy", params)?;
            if let Some(key) = &p.key {
                debug!(key = %key, "numpy key only applies to .npz archives");
            }
            Ok(RasterGrid::new(read_npy(&p.path)?, 1.0))
        });
        registry.register("array", |params| {
            let p: ArrayParams = decode("array", params)?;
            let rows: Vec<Vec<f64>> = p
                .values
                .into_iter()
                .map(|row| row.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
                .collect();
            RasterGrid::from_rows(&rows, p.cellsize)
        });
        registry
    }

    /// Register (or replace) a loader under `name`.
    pub fn register<F>(&mut self, name: &str, loader: F)
    where
        F: Fn(Map<String, Value>) -> Result<RasterGrid> + Send + Sync + 'static,
    {
        self.loaders.insert(name.to_string(), Arc::new(loader));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.loaders.contains_key(name)
    }

    /// Sorted loader names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.loaders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run loader `name` on `params`.
    pub fn load(&self, name: &str, params: Map<String, Value>) -> Result<RasterGrid> {
        let loader = self
            .loaders
            .get(name)
            .ok_or_else(|| TopovizError::unknown("loader", name))?;
        let grid = loader(params)?;
        let (rows, cols) = grid.shape();
        debug!(
            loader = name,
            rows,
            cols,
            cellsize = grid.cellsize(),
            "Loaded grid"
        );
        Ok(grid)
    }
}

/// Path of a DEM source: `.tif` is appended when it has no extension.
pub fn dem_source_path(source: &str) -> PathBuf {
    let path = PathBuf::from(source);
    if path.extension().is_some() {
        path
    } else {
        path.with_extension("tif")
    }
}

fn tiff_error(path: &Path) -> impl Fn(tiff::TiffError) -> TopovizError + '_ {
    move |e| TopovizError::load(format!("{}: {}", path.display(), e))
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| TopovizError::load(format!("cannot open {}: {}", path.display(), e)))
}

#[allow(unreachable_patterns)]
fn samples_to_f32(result: DecodingResult) -> Option<Vec<f32>> {
    Some(match result {
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        _ => return None,
    })
}

fn find_f64s<R>(decoder: &mut Decoder<R>, code: u16) -> Option<Vec<f64>>
where
    R: std::io::Read + std::io::Seek,
{
    decoder
        .find_tag(Tag::from_u16_exhaustive(code))
        .ok()
        .flatten()
        .and_then(|v| v.into_f64_vec().ok())
}

/// Read one band of a GeoTIFF.
///
/// Cell size comes from the model pixel scale and the extent from the
/// first tie point; cells equal to the GDAL nodata value become NaN.
pub fn read_geotiff(path: &Path, band: usize) -> Result<RasterGrid> {
    let to_err = tiff_error(path);
    let mut decoder = Decoder::new(BufReader::new(open(path)?)).map_err(&to_err)?;
    let (width, height) = decoder.dimensions().map_err(&to_err)?;
    let (rows, cols) = (height as usize, width as usize);

    let pixel_scale = find_f64s(&mut decoder, MODEL_PIXEL_SCALE_TAG);
    let tiepoint = find_f64s(&mut decoder, MODEL_TIEPOINT_TAG);
    let nodata = decoder
        .find_tag(Tag::from_u16_exhaustive(GDAL_NODATA_TAG))
        .ok()
        .flatten()
        .and_then(|v| v.into_string().ok())
        .and_then(|s| s.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse::<f64>().ok());

    let samples = samples_to_f32(decoder.read_image().map_err(&to_err)?)
        .ok_or_else(|| TopovizError::load(format!("{}: unsupported sample format", path.display())))?;
    let pixels = rows * cols;
    if pixels == 0 || samples.len() % pixels != 0 {
        return Err(TopovizError::load(format!(
            "{}: {} samples do not fill a {}x{} image",
            path.display(),
            samples.len(),
            cols,
            rows
        )));
    }
    let bands = samples.len() / pixels;
    if band == 0 || band > bands {
        return Err(TopovizError::invalid_parameter(
            "band",
            format!("band {} out of range 1..={}", band, bands),
        ));
    }

    let mut values: Vec<f32> = samples.into_iter().skip(band - 1).step_by(bands).collect();
    if let Some(nodata) = nodata {
        let nodata = nodata as f32;
        values.iter_mut().filter(|v| **v == nodata).for_each(|v| *v = f32::NAN);
    }
    let z = Array2::from_shape_vec((rows, cols), values)
        .map_err(|e| TopovizError::load(format!("{}: {}", path.display(), e)))?;

    let cellsize = match pixel_scale.as_deref() {
        Some([sx, ..]) if sx.is_finite() && *sx != 0.0 => sx.abs(),
        _ => {
            warn!(path = %path.display(), "No pixel scale tag; assuming a cell size of 1");
            1.0
        }
    };
    let grid = match tiepoint.as_deref() {
        Some([i, j, _, x, y, ..]) => {
            let x0 = x - i * cellsize;
            let y0 = y + j * cellsize;
            RasterGrid::with_extent(z, cellsize, Extent::from_upper_left(x0, y0, rows, cols, cellsize))
        }
        _ => RasterGrid::new(z, cellsize),
    };
    Ok(grid)
}

/// Value of `key` in a `.npy` header dict, unquoted.
fn header_field<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let marker = format!("'{}':", key);
    let rest = header[header.find(&marker)? + marker.len()..].trim_start();
    let end = if rest.starts_with('(') {
        rest.find(')')? + 1
    } else {
        rest.find([',', '}'])?
    };
    Some(rest[..end].trim().trim_matches('\''))
}

fn npy_error(path: &Path, message: impl fmt::Display) -> TopovizError {
    TopovizError::load(format!("{}: {}", path.display(), message))
}

/// Decode little-endian elements of `size` bytes.
fn decode_elements(data: &[u8], descr: &str) -> Option<Vec<f32>> {
    let kind = descr.trim_start_matches(['<', '|', '=']);
    let size: usize = kind.get(1..)?.parse().ok()?;
    if size == 0 {
        return None;
    }
    let chunks = data.chunks_exact(size);
    let values = match (kind.as_bytes().first()?, size) {
        (b'f', 4) => chunks.map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect(),
        (b'f', 8) => chunks
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32)
            .collect(),
        (b'i', 1) => chunks.map(|c| c[0] as i8 as f32).collect(),
        (b'i', 2) => chunks.map(|c| i16::from_le_bytes([c[0], c[1]]) as f32).collect(),
        (b'i', 4) => chunks
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32)
            .collect(),
        (b'i', 8) => chunks
            .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32)
            .collect(),
        (b'u', 1) | (b'b', 1) => chunks.map(|c| c[0] as f32).collect(),
        (b'u', 2) => chunks.map(|c| u16::from_le_bytes([c[0], c[1]]) as f32).collect(),
        (b'u', 4) => chunks
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32)
            .collect(),
        _ => return None,
    };
    Some(values)
}

/// Read a 2D `.npy` array as `f32`.
pub fn read_npy(path: &Path) -> Result<Array2<f32>> {
    let bytes = std::fs::read(path).map_err(|e| npy_error(path, e))?;
    if !bytes.starts_with(NPY_MAGIC) || bytes.len() < 10 {
        if bytes.starts_with(b"PK") {
            return Err(npy_error(path, ".npz archives are not supported"));
        }
        return Err(npy_error(path, "not a .npy file"));
    }
    let (header_start, header_len) = match bytes[6] {
        1 => (10, u16::from_le_bytes([bytes[8], bytes[9]]) as usize),
        2 | 3 if bytes.len() >= 12 => (
            12,
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
        ),
        v => return Err(npy_error(path, format!("unsupported .npy version {}", v))),
    };
    let data_start = header_start + header_len;
    let header = bytes
        .get(header_start..data_start)
        .map(String::from_utf8_lossy)
        .ok_or_else(|| npy_error(path, "truncated header"))?;

    let descr = header_field(&header, "descr").ok_or_else(|| npy_error(path, "missing descr"))?;
    if descr.starts_with('>') {
        return Err(npy_error(path, format!("big-endian dtype {} is not supported", descr)));
    }
    let fortran = header_field(&header, "fortran_order") == Some("True");
    let shape: Vec<usize> = header_field(&header, "shape")
        .ok_or_else(|| npy_error(path, "missing shape"))?
        .trim_matches(|c| c == '(' || c == ')')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|e| npy_error(path, e)))
        .collect::<Result<_>>()?;
    let [rows, cols] = shape[..] else {
        return Err(npy_error(path, format!("expected a 2D array, got shape {:?}", shape)));
    };

    let values = decode_elements(&bytes[data_start..], descr)
        .ok_or_else(|| npy_error(path, format!("unsupported dtype {}", descr)))?;
    if values.len() != rows * cols {
        return Err(npy_error(
            path,
            format!("{} values for shape ({}, {})", values.len(), rows, cols),
        ));
    }
    let array = if fortran {
        Array2::from_shape_vec((rows, cols).f(), values)
    } else {
        Array2::from_shape_vec((rows, cols), values)
    }
    .map_err(|e| npy_error(path, e))?;
    Ok(array.as_standard_layout().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use serde_json::json;
    use test_utils::{assert_nan_aware_eq, write_geotiff_with_nodata, TempWorkspace};

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_geotiff_extent_and_nodata() {
        let ws = TempWorkspace::new().unwrap();
        let path = ws.path("dem.tif");
        let z = array![[1.0f32, -9999.0, 3.0], [4.0, 5.0, 6.0]];
        write_geotiff_with_nodata(&path, &z, 30.0, (1000.0, 2000.0), Some(-9999.0)).unwrap();

        let grid = read_geotiff(&path, 1).unwrap();
        assert_eq!(grid.shape(), (2, 3));
        assert_eq!(grid.cellsize(), 30.0);
        assert_eq!(grid.extent(), Extent::new(1000.0, 1090.0, 1940.0, 2000.0));
        assert_nan_aware_eq!(grid.z(), &array![[1.0f32, f32::NAN, 3.0], [4.0, 5.0, 6.0]], 0.0);
    }

    #[test]
    fn test_rasterio_band_out_of_range() {
        let ws = TempWorkspace::new().unwrap();
        let path = ws.write_geotiff("dem.tif", &array![[1.0f32, 2.0]], 1.0).unwrap();
        let registry = LoaderRegistry::builtin();
        let err = registry
            .load("rasterio", params(json!({"path": path, "band": 2})))
            .unwrap_err();
        assert_eq!(err.error_code(), "InvalidParameterError");
    }

    #[test]
    fn test_load_dem_appends_extension() {
        assert_eq!(dem_source_path("bigtujunga"), PathBuf::from("bigtujunga.tif"));
        assert_eq!(dem_source_path("a/b.TIF"), PathBuf::from("a/b.TIF"));

        let ws = TempWorkspace::new().unwrap();
        ws.write_geotiff("site.tif", &array![[1.0f32, 2.0], [3.0, 4.0]], 5.0).unwrap();
        let source = ws.path("site");
        let grid = LoaderRegistry::builtin()
            .load("topotoolbox.load_dem", params(json!({"source": source})))
            .unwrap();
        assert_eq!(grid.cellsize(), 5.0);
    }

    #[test]
    fn test_numpy_loader() {
        let ws = TempWorkspace::new().unwrap();
        let z = array![[1.0f32, 2.0, 3.0], [4.0, f32::NAN, 6.0]];
        let path = ws.write_npy("a.npy", &z).unwrap();
        let grid = LoaderRegistry::builtin()
            .load("numpy", params(json!({"path": path})))
            .unwrap();
        assert_eq!(grid.cellsize(), 1.0);
        assert_nan_aware_eq!(grid.z(), &z, 0.0);
    }

    #[test]
    fn test_npy_header_parsing() {
        let header = "{'descr': '<f8', 'fortran_order': True, 'shape': (2, 3), }";
        assert_eq!(header_field(header, "descr"), Some("<f8"));
        assert_eq!(header_field(header, "fortran_order"), Some("True"));
        assert_eq!(header_field(header, "shape"), Some("(2, 3)"));
        assert_eq!(decode_elements(&[1, 0], "<i2"), Some(vec![1.0]));
        assert_eq!(decode_elements(&[0; 2], "<c8"), None);
        assert_eq!(decode_elements(&[0; 4], "<f0"), None);
    }

    #[test]
    fn test_zero_itemsize_npy_is_load_error() {
        let ws = TempWorkspace::new().unwrap();
        let mut header = String::from("{'descr': '<f0', 'fortran_order': False, 'shape': (2, 2), }");
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');
        let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(&[0; 16]);
        let path = ws.path("zero.npy");
        std::fs::write(&path, bytes).unwrap();

        let err = LoaderRegistry::builtin()
            .load("numpy", params(json!({"path": path})))
            .unwrap_err();
        assert_eq!(err.error_code(), "LoadError");
        assert!(err.to_string().contains("<f0"));
    }

    #[test]
    fn test_array_loader() {
        let grid = LoaderRegistry::builtin()
            .load(
                "array",
                params(json!({"values": [[1, 2], [null, 4]], "cellsize": 10})),
            )
            .unwrap();
        assert_eq!(grid.cellsize(), 10.0);
        assert!(grid.z()[[1, 0]].is_nan());
    }

    #[test]
    fn test_unknown_loader_and_bad_params() {
        let registry = LoaderRegistry::builtin();
        let err = registry.load("gdal", Map::new()).unwrap_err();
        assert_eq!(err.error_code(), "UnknownIdentifierError");
        let err = registry
            .load("rasterio", params(json!({"path": "x.tif", "colour": 1})))
            .unwrap_err();
        assert_eq!(err.error_code(), "InvalidParameterError");
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let err = read_geotiff(Path::new("/nonexistent/x.tif"), 1).unwrap_err();
        assert_eq!(err.error_code(), "LoadError");
    }
}
