//! Common test fixtures for topoviz tests.
//!
//! Writers for the raster formats the workflow loaders understand, and a
//! temporary workspace to hold workflow documents between export and replay.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde_json::{json, Value};
use tempfile::TempDir;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

/// GeoTIFF ModelPixelScaleTag.
const MODEL_PIXEL_SCALE_TAG: u16 = 33550;
/// GeoTIFF ModelTiepointTag.
const MODEL_TIEPOINT_TAG: u16 = 33922;
/// GDAL_NODATA ascii tag.
const GDAL_NODATA_TAG: u16 = 42113;

fn tiff_err(err: tiff::TiffError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

/// Write a 2D `f32` array as a version 1.0 `.npy` file (little endian, C order).
pub fn write_npy(path: &Path, values: &Array2<f32>) -> io::Result<()> {
    let (rows, cols) = values.dim();
    let mut header = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
        rows, cols
    );
    // magic (6) + version (2) + header length (2) + header + '\n' must be a multiple of 64
    let unpadded = 10 + header.len() + 1;
    let padding = (64 - unpadded % 64) % 64;
    header.push_str(&" ".repeat(padding));
    header.push('\n');

    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(b"\x93NUMPY")?;
    out.write_all(&[1, 0])?;
    out.write_all(&(header.len() as u16).to_le_bytes())?;
    out.write_all(header.as_bytes())?;
    for v in values.iter() {
        out.write_all(&v.to_le_bytes())?;
    }
    out.flush()
}

/// Write a single-band `f32` GeoTIFF with pixel scale and upper-left tie point.
pub fn write_geotiff(
    path: &Path,
    values: &Array2<f32>,
    cellsize: f64,
    upper_left: (f64, f64),
) -> io::Result<()> {
    write_geotiff_with_nodata(path, values, cellsize, upper_left, None)
}

/// [`write_geotiff`] plus an optional GDAL nodata tag.
pub fn write_geotiff_with_nodata(
    path: &Path,
    values: &Array2<f32>,
    cellsize: f64,
    upper_left: (f64, f64),
    nodata: Option<f64>,
) -> io::Result<()> {
    let (rows, cols) = values.dim();
    let data: Vec<f32> = values.iter().copied().collect();

    let file = BufWriter::new(File::create(path)?);
    let mut encoder = TiffEncoder::new(file).map_err(tiff_err)?;
    let mut image = encoder
        .new_image::<colortype::Gray32Float>(cols as u32, rows as u32)
        .map_err(tiff_err)?;
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE_TAG), &[cellsize, cellsize, 0.0][..])
        .map_err(tiff_err)?;
    image
        .encoder()
        .write_tag(
            Tag::Unknown(MODEL_TIEPOINT_TAG),
            &[0.0, 0.0, 0.0, upper_left.0, upper_left.1, 0.0][..],
        )
        .map_err(tiff_err)?;
    if let Some(nodata) = nodata {
        let text = nodata.to_string();
        image
            .encoder()
            .write_tag(Tag::Unknown(GDAL_NODATA_TAG), text.as_str())
            .map_err(tiff_err)?;
    }
    image.write_data(&data).map_err(tiff_err)?;
    Ok(())
}

/// A minimal single-map workflow document pointing at `dem_path`.
pub fn minimal_workflow_json(dem_path: &str, loader: &str) -> Value {
    json!({
        "version": 1,
        "inputs": {
            "dem_path": {"type": "path", "prompt": "Path to DEM", "default": dem_path}
        },
        "data_sources": {
            "dem": {"loader": loader, "params": {"path": {"$ref": "dem_path"}}}
        },
        "maps": [
            {
                "name": "dem",
                "data": "dem",
                "cmap": "terrain",
                "processors": [
                    {"name": "nan_below", "params": {"threshold": 0.0}},
                    {"name": "hillshade", "params": {"azimuth": 315.0}}
                ]
            }
        ],
        "run": {"mode": "fig2d"}
    })
}

/// A temporary directory holding fixture files for one test.
pub struct TempWorkspace {
    dir: TempDir,
}

impl TempWorkspace {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    /// Root of the workspace.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of `name` inside the workspace.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write a JSON document and return its path.
    pub fn write_json(&self, name: &str, value: &Value) -> io::Result<PathBuf> {
        let path = self.path(name);
        let text = serde_json::to_string_pretty(value)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(&path, text)?;
        Ok(path)
    }

    /// Write an `.npy` raster and return its path.
    pub fn write_npy(&self, name: &str, values: &Array2<f32>) -> io::Result<PathBuf> {
        let path = self.path(name);
        write_npy(&path, values)?;
        Ok(path)
    }

    /// Write a GeoTIFF raster anchored at the origin and return its path.
    pub fn write_geotiff(&self, name: &str, values: &Array2<f32>, cellsize: f64) -> io::Result<PathBuf> {
        let path = self.path(name);
        let rows = values.nrows() as f64;
        write_geotiff(&path, values, cellsize, (0.0, rows * cellsize))?;
        Ok(path)
    }
}
