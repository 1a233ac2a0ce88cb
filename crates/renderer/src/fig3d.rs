//! 3D scenes: height-mapped, lit, colored meshes built from map layers.
//!
//! Each expanded layer becomes one mesh. Its colors come from the layer's
//! own values; its heights come from the surface layer resolved by
//! [`expand_draped`], so draped layers follow the relief they were derived
//! from.
//!
//! Screenshots are rasterized in software with an orthographic camera and
//! painter's-order triangle fills.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use pipeline::layer::nan_min_max;
use pipeline::{expand_draped, Layer, Lighting, RenderMode};
use serde::{Deserialize, Serialize};
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Transform};
use topoviz_common::{Result, TopovizError};
use tracing::{debug, info, warn};

use crate::colormap::{colorize, Color, ColorSpec, Colormap};
use crate::fig2d::{draw_colorbar, Colorbar};
use crate::png::create_png_auto;

/// Relief of an automatically scaled surface, in multiples of its span in cells.
pub const AUTO_RELIEF_FACTOR: f64 = 3.2;

type Vec3 = [f64; 3];

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

fn scale(a: Vec3, s: f64) -> Vec3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalize(a: Vec3) -> Option<Vec3> {
    let len = dot(a, a).sqrt();
    (len > 0.0 && len.is_finite()).then(|| scale(a, 1.0 / len))
}

/// Camera as `(position, focal_point, view_up)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPosition(pub Vec3, pub Vec3, pub Vec3);

impl CameraPosition {
    pub fn position(&self) -> Vec3 {
        self.0
    }

    pub fn focal_point(&self) -> Vec3 {
        self.1
    }

    pub fn view_up(&self) -> Vec3 {
        self.2
    }
}

/// Scene-level configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Fig3dSettings {
    pub background: ColorSpec,
    pub smooth_shading: bool,
    pub show_scalar_bar: bool,
    pub eye_dome_lighting: bool,
    /// Vertical exaggeration in map units per cell; automatic when `None`.
    pub z_exaggeration: Option<f64>,
    /// Screenshot size in pixels.
    pub window_size: (u32, u32),
}

impl Default for Fig3dSettings {
    fn default() -> Self {
        Self {
            background: ColorSpec::named("white"),
            smooth_shading: true,
            show_scalar_bar: true,
            eye_dome_lighting: true,
            z_exaggeration: None,
            window_size: (1024, 768),
        }
    }
}

/// Lighting of a mesh after layer overrides and scene defaults are merged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedLighting {
    pub ambient: f64,
    pub diffuse: f64,
    pub specular: f64,
    pub specular_power: f64,
    pub smooth_shading: bool,
    pub eye_dome_lighting: bool,
    pub light_azimuth: f64,
    pub light_elevation: f64,
    pub light_intensity: f64,
}

impl ResolvedLighting {
    pub fn resolve(lighting: &Lighting, settings: &Fig3dSettings) -> Self {
        let lighting = lighting.clamped();
        Self {
            ambient: lighting.ambient,
            diffuse: lighting.diffuse,
            specular: lighting.specular,
            specular_power: lighting.specular_power,
            smooth_shading: lighting.smooth_shading.unwrap_or(settings.smooth_shading),
            eye_dome_lighting: lighting
                .eye_dome_lighting
                .unwrap_or(settings.eye_dome_lighting),
            light_azimuth: lighting.azimuth_or_default(),
            light_elevation: lighting.elevation_or_default(),
            light_intensity: lighting.intensity_or_default(),
        }
    }

    /// Unit vector pointing towards the light. Azimuth is clockwise from north.
    fn light_direction(&self) -> Vec3 {
        let az = self.light_azimuth.to_radians();
        let el = self.light_elevation.to_radians();
        [az.sin() * el.cos(), az.cos() * el.cos(), el.sin()]
    }

    /// Blinn-Phong shade factor for `color` with surface normal `n`.
    fn shade(&self, color: Color, n: Vec3, view: Vec3) -> Color {
        let l = self.light_direction();
        let lambert = dot(n, l).max(0.0);
        let highlight = normalize(add(l, view))
            .map(|h| dot(n, h).max(0.0).powf(self.specular_power.max(1.0)))
            .unwrap_or(0.0);
        let diffuse = self.ambient + self.diffuse * lambert * self.light_intensity;
        let spec = self.specular * highlight * self.light_intensity * 255.0;
        let channel = |c: u8| (c as f64 * diffuse + spec).round().clamp(0.0, 255.0) as u8;
        Color::new(channel(color.r), channel(color.g), channel(color.b), color.a)
    }
}

/// Vertical scale applied to a surface's values.
///
/// With no exaggeration the relief is scaled to [`AUTO_RELIEF_FACTOR`] times
/// the surface span in cells (0 for a flat or all-NaN surface). An explicit
/// exaggeration is divided by the cell size. Both are multiplied by the
/// surface layer's `z_scale_factor`.
pub fn z_scale(surface: &Layer, exaggeration: Option<f64>) -> f64 {
    let cellsize = match surface.grid().cellsize() {
        c if c > 0.0 && c.is_finite() => c,
        _ => 1.0,
    };
    let factor = surface.z_scale_factor();
    match exaggeration {
        Some(ex) => ex / cellsize * factor,
        None => {
            let (zmin, zmax) = nan_min_max(surface.value());
            let z_range = zmax - zmin;
            if !(z_range.is_finite() && z_range > 0.0) {
                return 0.0;
            }
            let span_cells = surface.grid().extent().span() / cellsize;
            AUTO_RELIEF_FACTOR * span_cells / z_range * factor
        }
    }
}

/// Triangulated height field of one layer.
#[derive(Debug, Clone)]
pub struct Mesh {
    name: String,
    surface: String,
    vertices: Vec<Vec3>,
    colors: Vec<Color>,
    scalars: Vec<f32>,
    triangles: Vec<[u32; 3]>,
    opacity: f64,
    z_scale: f64,
    lighting: ResolvedLighting,
    scalar_bar: Option<Colorbar>,
}

impl Mesh {
    /// Build the mesh of `layer` placed on `surface`.
    ///
    /// Row 0 is the northern edge. NaN heights sit at zero; cells with any
    /// NaN scalar are left out.
    pub fn build(layer: &Layer, surface: &Layer, settings: &Fig3dSettings) -> Result<Self> {
        let (rows, cols) = layer.value().dim();
        if surface.value().dim() != (rows, cols) {
            return Err(TopovizError::ShapeMismatch {
                expected: surface.value().dim(),
                actual: (rows, cols),
            });
        }

        let z_scale = z_scale(surface, settings.z_exaggeration);
        let extent = surface.grid().extent();
        let step = |lo: f64, hi: f64, n: usize| if n > 1 { (hi - lo) / (n - 1) as f64 } else { 0.0 };
        let dx = step(extent.xmin, extent.xmax, cols);
        let dy = step(extent.ymin, extent.ymax, rows);

        let mut vertices = Vec::with_capacity(rows * cols);
        for ((row, col), &z) in surface.value().indexed_iter() {
            let z = if z.is_nan() { 0.0 } else { z as f64 };
            vertices.push([
                extent.xmin + col as f64 * dx,
                extent.ymax - row as f64 * dy,
                z * z_scale,
            ]);
        }

        let scalars: Vec<f32> = layer.value().iter().copied().collect();
        let cmap = Colormap::resolve(layer.cmap());
        let colors = colorize(layer.value(), layer.vmin(), layer.vmax(), &cmap, 1.0)
            .chunks_exact(4)
            .map(|c| Color::new(c[0], c[1], c[2], c[3]))
            .collect();

        let mut triangles = Vec::new();
        for row in 0..rows.saturating_sub(1) {
            for col in 0..cols.saturating_sub(1) {
                let a = row * cols + col;
                let (b, c, d) = (a + 1, a + cols, a + cols + 1);
                if [a, b, c, d].iter().any(|&i| scalars[i].is_nan()) {
                    continue;
                }
                triangles.push([a as u32, c as u32, b as u32]);
                triangles.push([b as u32, c as u32, d as u32]);
            }
        }

        let scalar_bar = layer
            .cbar()
            .filter(|_| settings.show_scalar_bar)
            .map(|label| Colorbar {
                label: label.to_string(),
                cmap: layer.cmap().to_string(),
                vmin: layer.vmin(),
                vmax: layer.vmax(),
            });

        Ok(Self {
            name: layer.name().to_string(),
            surface: surface.name().to_string(),
            vertices,
            colors,
            scalars,
            triangles,
            opacity: layer.alpha(),
            z_scale,
            lighting: ResolvedLighting::resolve(layer.lighting(), settings),
            scalar_bar,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the layer supplying the geometry.
    pub fn surface_name(&self) -> &str {
        &self.surface
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn scalars(&self) -> &[f32] {
        &self.scalars
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn z_scale(&self) -> f64 {
        self.z_scale
    }

    pub fn lighting(&self) -> &ResolvedLighting {
        &self.lighting
    }

    pub fn scalar_bar(&self) -> Option<&Colorbar> {
        self.scalar_bar.as_ref()
    }

    fn face_normal(&self, tri: &[u32; 3]) -> Option<Vec3> {
        let [a, b, c] = tri.map(|i| self.vertices[i as usize]);
        normalize(cross(sub(b, a), sub(c, a)))
    }

    /// Area-weighted vertex normals, for smooth shading.
    fn vertex_normals(&self) -> Vec<Vec3> {
        let mut normals = vec![[0.0; 3]; self.vertices.len()];
        for tri in &self.triangles {
            let [a, b, c] = tri.map(|i| self.vertices[i as usize]);
            let n = cross(sub(b, a), sub(c, a));
            for &i in tri {
                normals[i as usize] = add(normals[i as usize], n);
            }
        }
        normals
            .into_iter()
            .map(|n| normalize(n).unwrap_or([0.0, 0.0, 1.0]))
            .collect()
    }
}

/// A 3D scene of map meshes.
#[derive(Debug, Clone)]
pub struct Figure3d {
    settings: Fig3dSettings,
    meshes: Vec<Mesh>,
    mesh_index: HashMap<String, usize>,
    base_layers: Vec<Layer>,
    camera: Option<CameraPosition>,
}

impl Default for Figure3d {
    fn default() -> Self {
        Self::new(Fig3dSettings::default())
    }
}

impl Figure3d {
    pub fn new(settings: Fig3dSettings) -> Self {
        Self {
            settings,
            meshes: Vec::new(),
            mesh_index: HashMap::new(),
            base_layers: Vec::new(),
            camera: None,
        }
    }

    pub fn settings(&self) -> &Fig3dSettings {
        &self.settings
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    /// Mesh registered under a layer name.
    pub fn mesh(&self, name: &str) -> Option<&Mesh> {
        self.mesh_index.get(name).and_then(|&i| self.meshes.get(i))
    }

    pub fn base_layers(&self) -> &[Layer] {
        &self.base_layers
    }

    /// Expand `layers` in 3D mode and add one mesh per expanded layer.
    ///
    /// `surface_override` supplies the geometry of draped roots.
    pub fn add_maps(
        &mut self,
        layers: impl IntoIterator<Item = Layer>,
        surface_override: Option<Layer>,
    ) -> Result<()> {
        let layers: Vec<Layer> = layers.into_iter().collect();
        if layers.is_empty() {
            return Err(TopovizError::invalid_parameter(
                "maps",
                "provide at least one layer to add",
            ));
        }

        for layer in layers {
            self.base_layers.push(layer.clone());
            let expansion = expand_draped(layer, RenderMode::ThreeD, surface_override.clone())?;
            for (layer, surface) in expansion.pairs() {
                let mesh = Mesh::build(layer, surface, &self.settings)?;
                debug!(
                    layer = %mesh.name(),
                    surface = %mesh.surface_name(),
                    z_scale = mesh.z_scale(),
                    triangles = mesh.triangles().len(),
                    "Built mesh"
                );
                if self.mesh_index.contains_key(mesh.name()) {
                    warn!(layer = %mesh.name(), "Another mesh with this name exists; lookups now return the newest");
                }
                self.mesh_index.insert(mesh.name().to_string(), self.meshes.len());
                self.meshes.push(mesh);
            }
        }
        Ok(())
    }

    pub fn set_camera_position(&mut self, camera: CameraPosition) {
        self.camera = Some(camera);
    }

    /// Camera set through [`Figure3d::set_camera_position`], if any.
    pub fn custom_camera(&self) -> Option<CameraPosition> {
        self.camera
    }

    fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut points = self
            .meshes
            .iter()
            .flat_map(|m| m.triangles.iter().flat_map(move |t| t.map(|i| m.vertices[i as usize])));
        let first = points.next()?;
        Some(points.fold((first, first), |(lo, hi), p| {
            (
                [lo[0].min(p[0]), lo[1].min(p[1]), lo[2].min(p[2])],
                [hi[0].max(p[0]), hi[1].max(p[1]), hi[2].max(p[2])],
            )
        }))
    }

    /// The configured camera, else an oblique view from the south-west.
    pub fn camera_position(&self) -> CameraPosition {
        if let Some(camera) = self.camera {
            return camera;
        }
        let (lo, hi) = self.bounds().unwrap_or(([0.0; 3], [1.0; 3]));
        let focal = scale(add(lo, hi), 0.5);
        let diagonal = dot(sub(hi, lo), sub(hi, lo)).sqrt().max(1.0);
        let position = add(focal, scale([-1.0, -1.0, 1.0], diagonal));
        CameraPosition(position, focal, [0.0, 0.0, 1.0])
    }

    /// Rasterize the scene from the current camera.
    pub fn render(&self) -> Result<(u32, u32, Vec<u8>)> {
        let (width, height) = self.settings.window_size;
        let mut canvas = Pixmap::new(width, height)
            .ok_or_else(|| TopovizError::render(format!("cannot allocate {}x{} canvas", width, height)))?;
        let bg = self.settings.background.to_color()?;
        canvas.fill(tiny_skia::Color::from_rgba8(bg.r, bg.g, bg.b, bg.a));

        let camera = self.camera_position();
        let forward = normalize(sub(camera.focal_point(), camera.position()))
            .ok_or_else(|| TopovizError::invalid_parameter("camera_position", "position equals focal point"))?;
        let right = normalize(cross(forward, camera.view_up()))
            .ok_or_else(|| TopovizError::invalid_parameter("camera_position", "view_up is parallel to the view direction"))?;
        let up = cross(right, forward);
        let view = scale(forward, -1.0);
        let project = |p: Vec3| {
            let d = sub(p, camera.focal_point());
            (dot(d, right), dot(d, up), dot(d, forward))
        };

        // Screen-space fit over all drawable vertices.
        let mut min = (f64::INFINITY, f64::INFINITY);
        let mut max = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for mesh in &self.meshes {
            for tri in &mesh.triangles {
                for &i in tri {
                    let (x, y, _) = project(mesh.vertices[i as usize]);
                    min = (min.0.min(x), min.1.min(y));
                    max = (max.0.max(x), max.1.max(y));
                }
            }
        }
        let bar_space = if self.meshes.iter().any(|m| m.scalar_bar.is_some()) {
            0.15 * width as f64
        } else {
            0.0
        };
        let avail_w = width as f64 * 0.9 - bar_space;
        let avail_h = height as f64 * 0.9;
        let span = ((max.0 - min.0).max(f64::EPSILON), (max.1 - min.1).max(f64::EPSILON));
        let px_scale = (avail_w / span.0).min(avail_h / span.1);
        let offset = (
            width as f64 * 0.05 + (avail_w - span.0 * px_scale) / 2.0,
            height as f64 * 0.05 + (avail_h - span.1 * px_scale) / 2.0,
        );
        let to_screen = |x: f64, y: f64| {
            (
                (offset.0 + (x - min.0) * px_scale) as f32,
                (offset.1 + (max.1 - y) * px_scale) as f32,
            )
        };

        struct Face {
            depth: f64,
            points: [(f32, f32); 3],
            color: Color,
        }
        let mut faces = Vec::new();
        for mesh in &self.meshes {
            let normals = mesh.lighting.smooth_shading.then(|| mesh.vertex_normals());
            for tri in &mesh.triangles {
                let Some(face_normal) = mesh.face_normal(tri) else {
                    continue;
                };
                // Two-sided lighting
                let facing = |n: Vec3| if dot(n, view) < 0.0 { scale(n, -1.0) } else { n };
                let shades: Vec<Color> = tri
                    .iter()
                    .map(|&i| {
                        let n = normals.as_ref().map_or(face_normal, |ns| ns[i as usize]);
                        mesh.lighting.shade(mesh.colors[i as usize], facing(n), view)
                    })
                    .collect();
                let avg = |f: fn(&Color) -> u8| {
                    (shades.iter().map(|c| f(c) as u32).sum::<u32>() / 3) as u8
                };
                let color = Color::rgb(avg(|c| c.r), avg(|c| c.g), avg(|c| c.b)).with_alpha(mesh.opacity);

                let projected = tri.map(|i| project(mesh.vertices[i as usize]));
                faces.push(Face {
                    depth: projected.iter().map(|p| p.2).sum::<f64>() / 3.0,
                    points: projected.map(|(x, y, _)| to_screen(x, y)),
                    color,
                });
            }
        }
        faces.sort_by(|a, b| b.depth.total_cmp(&a.depth));

        let mut paint = Paint::default();
        paint.anti_alias = false;
        for face in &faces {
            let mut pb = PathBuilder::new();
            pb.move_to(face.points[0].0, face.points[0].1);
            pb.line_to(face.points[1].0, face.points[1].1);
            pb.line_to(face.points[2].0, face.points[2].1);
            pb.close();
            if let Some(path) = pb.finish() {
                paint.set_color_rgba8(face.color.r, face.color.g, face.color.b, face.color.a);
                canvas.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
            }
        }

        let bar_w = 0.02 * width as f64;
        let mut x = width as f64 - bar_space + bar_w;
        for bar in self.meshes.iter().filter_map(Mesh::scalar_bar) {
            draw_colorbar(&mut canvas, bar, x, height as f64 * 0.2, bar_w, height as f64 * 0.6);
            x += bar_w * 2.5;
        }

        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for p in canvas.pixels() {
            let c = p.demultiply();
            pixels.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        Ok((width, height, pixels))
    }

    /// Render and write a PNG screenshot; returns the camera used.
    pub fn screenshot(&self, path: impl AsRef<Path>) -> Result<CameraPosition> {
        let path = path.as_ref();
        let camera = self.camera_position();
        let (width, height, pixels) = self.render()?;
        let mut text = vec![
            ("Software".to_string(), "topoviz".to_string()),
            ("camera_position".to_string(), serde_json::to_string(&camera)?),
        ];
        for mesh in &self.meshes {
            if let Some(bar) = mesh.scalar_bar() {
                text.push(("scalar_bar".to_string(), bar.label.clone()));
            }
        }
        let png = create_png_auto(&pixels, width as usize, height as usize, &text)?;
        std::fs::write(path, &png)?;
        info!(path = %path.display(), meshes = self.meshes.len(), "Saved 3D screenshot");
        Ok(camera)
    }

    /// Wavefront OBJ text of every mesh, with per-vertex colors.
    pub fn to_obj(&self) -> String {
        let mut out = String::from("# topoviz scene\n");
        let mut offset = 1usize;
        for mesh in &self.meshes {
            let _ = writeln!(out, "o {}", mesh.name);
            for (v, c) in mesh.vertices.iter().zip(&mesh.colors) {
                let [r, g, b] = c.to_unit_rgb();
                let _ = writeln!(out, "v {} {} {} {:.4} {:.4} {:.4}", v[0], v[1], v[2], r, g, b);
            }
            for tri in &mesh.triangles {
                let [a, b, c] = tri.map(|i| i as usize + offset);
                let _ = writeln!(out, "f {} {} {}", a, b, c);
            }
            offset += mesh.vertices.len();
        }
        out
    }

    pub fn save_obj(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_obj())?;
        info!(path = %path.display(), meshes = self.meshes.len(), "Saved 3D mesh");
        Ok(())
    }
}

/// Build a scene from `layers` with default settings and write a screenshot.
pub fn quickmap3d(layers: Vec<Layer>, screenshot_path: impl AsRef<Path>) -> Result<(Figure3d, CameraPosition)> {
    let mut figure = Figure3d::default();
    figure.add_maps(layers, None)?;
    let camera = figure.screenshot(screenshot_path)?;
    Ok((figure, camera))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use pipeline::processors::{hillshade_processor, scale as scale_processor};
    use test_utils::assert_approx_eq;
    use test_utils::generators::cone_dem;
    use topoviz_common::RasterGrid;

    fn layer(name: &str, z: Array2<f32>, cellsize: f64) -> Layer {
        Layer::builder(RasterGrid::new(z, cellsize))
            .name(name)
            .build()
            .unwrap()
    }

    fn terrain_values(fig: &Figure3d) -> &Array2<f32> {
        fig.base_layers()[0].value()
    }

    #[test]
    fn test_auto_z_scale() {
        // 4x4 cells of 10 m: span 40 m = 4 cells; relief 0..8
        let dem = layer("dem", Array2::from_shape_fn((4, 4), |(r, _)| r as f32 * 8.0 / 3.0), 10.0);
        assert_approx_eq!(z_scale(&dem, None), 3.2 * 4.0 / 8.0, 1e-9);
        assert_approx_eq!(z_scale(&dem, Some(2.0)), 0.2, 1e-12);
    }

    #[test]
    fn test_z_scale_uses_scale_factor_and_flat_surface() {
        let mut dem = layer("dem", array![[0.0f32, 1.0], [2.0, 3.0]], 1.0);
        dem.set_z_scale_factor(2.0);
        assert_approx_eq!(z_scale(&dem, Some(1.0)), 2.0, 1e-12);
        let flat = layer("flat", Array2::from_elem((3, 3), 5.0), 1.0);
        assert_eq!(z_scale(&flat, None), 0.0);
        let empty = layer("nan", Array2::from_elem((3, 3), f32::NAN), 1.0);
        assert_eq!(z_scale(&empty, None), 0.0);
    }

    #[test]
    fn test_mesh_skips_nan_cells_and_flattens_nan_heights() {
        let dem = layer("dem", array![[1.0f32, 2.0, 3.0], [4.0, f32::NAN, 6.0]], 1.0);
        let mesh = Mesh::build(&dem, &dem, &Fig3dSettings::default()).unwrap();
        assert_eq!(mesh.vertices().len(), 6);
        assert_eq!(mesh.vertices()[4][2], 0.0);
        // both cells touch the NaN vertex
        assert!(mesh.triangles().is_empty());
        // row 0 is the northern edge
        assert!(mesh.vertices()[0][1] > mesh.vertices()[3][1]);
    }

    #[test]
    fn test_shape_mismatch_between_layer_and_surface() {
        let a = layer("a", Array2::zeros((2, 2)), 1.0);
        let b = layer("b", Array2::zeros((3, 2)), 1.0);
        let err = Mesh::build(&a, &b, &Fig3dSettings::default()).unwrap_err();
        assert_eq!(err.error_code(), "ShapeMismatchError");
    }

    #[test]
    fn test_draped_hillshade_follows_scaled_relief() {
        let mut dem = layer("dem", cone_dem(8, 8, 50.0), 10.0);
        dem.add_processor(hillshade_processor(315.0, 50.0, 1.0, true));
        dem.add_processor(scale_processor(2.0));

        let mut fig = Figure3d::default();
        fig.add_maps(vec![dem], None).unwrap();
        assert_eq!(fig.meshes().len(), 2);

        let terrain = fig.mesh("dem").unwrap();
        let shade = &fig.meshes()[1];
        assert_eq!(shade.surface_name(), "dem");
        assert_eq!(shade.vertices(), terrain.vertices());
        let (zmin, zmax) = nan_min_max(terrain_values(&fig));
        assert_approx_eq!(terrain.z_scale(), 2.0 * 3.2 * 8.0 / (zmax - zmin), 1e-9);
    }

    #[test]
    fn test_lighting_resolution() {
        let mut dem = layer("dem", cone_dem(4, 4, 10.0), 1.0);
        dem.lighting_mut().smooth_shading = Some(false);
        dem.lighting_mut().light_azimuth = Some(90.0);
        let settings = Fig3dSettings::default();
        let resolved = ResolvedLighting::resolve(dem.lighting(), &settings);
        assert!(!resolved.smooth_shading);
        assert!(resolved.eye_dome_lighting);
        assert_eq!(resolved.light_azimuth, 90.0);
        assert_eq!(resolved.light_elevation, Lighting::DEFAULT_ELEVATION);
    }

    #[test]
    fn test_surface_override_for_draped_root() {
        let terrain = layer("terrain", cone_dem(5, 5, 20.0), 1.0);
        let mut drape = layer("drape", Array2::from_elem((5, 5), 1.0), 1.0);
        drape.set_draped(true);
        let mut fig = Figure3d::default();
        fig.add_maps(vec![drape], Some(terrain)).unwrap();
        assert_eq!(fig.meshes()[0].surface_name(), "terrain");
        assert!(fig.meshes()[0].vertices().iter().any(|v| v[2] > 0.0));
    }

    #[test]
    fn test_camera_serializes_as_nested_arrays() {
        let camera = CameraPosition([1.0, 2.0, 3.0], [0.0; 3], [0.0, 0.0, 1.0]);
        let json = serde_json::to_value(camera).unwrap();
        assert_eq!(json, serde_json::json!([[1.0, 2.0, 3.0], [0.0, 0.0, 0.0], [0.0, 0.0, 1.0]]));
        let back: CameraPosition = serde_json::from_value(json).unwrap();
        assert_eq!(back, camera);
    }

    #[test]
    fn test_render_and_obj_export() {
        let mut dem = layer("dem", cone_dem(6, 6, 30.0), 10.0);
        dem.set_cbar(Some("Elevation (m)".into()));
        let mut fig = Figure3d::new(Fig3dSettings {
            window_size: (64, 48),
            ..Fig3dSettings::default()
        });
        fig.add_maps(vec![dem], None).unwrap();

        let (w, h, pixels) = fig.render().unwrap();
        assert_eq!((w, h), (64, 48));
        // something other than the white background was drawn
        assert!(pixels.chunks_exact(4).any(|p| p != [255, 255, 255, 255]));

        let obj = fig.to_obj();
        assert!(obj.contains("o dem"));
        assert_eq!(obj.lines().filter(|l| l.starts_with("v ")).count(), 36);
        assert_eq!(obj.lines().filter(|l| l.starts_with("f ")).count(), 50);
    }

    #[test]
    fn test_degenerate_camera_rejected() {
        let mut fig = Figure3d::default();
        fig.add_maps(vec![layer("dem", cone_dem(3, 3, 1.0), 1.0)], None).unwrap();
        fig.set_camera_position(CameraPosition([0.0; 3], [0.0; 3], [0.0, 0.0, 1.0]));
        assert!(fig.render().is_err());
    }
}
