//! 2D map figures: georeferenced raster compositing with axis decorations.
//!
//! A [`Figure2d`] holds one or more axes. Layers added to an axis are
//! expanded in 2D mode and drawn in render order. Labels, titles and tick
//! units are figure metadata: they are exported as workflow actions and
//! written as PNG text chunks on save.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use pipeline::{expand, Layer, RenderMode};
use tiny_skia::{
    ColorU8, FillRule, FilterQuality, Mask, Paint, PathBuilder, Pixmap, PixmapPaint, Rect, Stroke,
    Transform,
};
use topoviz_common::{Extent, Result, TopovizError};
use tracing::{debug, info, warn};

use crate::actions::{Fig2dAction, GridCrossStyle, TickAxes, TitleLoc};
use crate::colormap::{colorize, Color, Colormap};
use crate::png::create_png_auto;

/// Figure size used when none is configured, in inches.
pub const DEFAULT_FIGSIZE: (f64, f64) = (6.4, 4.8);

/// Default figure height of [`finalize_figsize`], in inches.
pub const BASE_HEIGHT: f64 = 6.0;
/// Minimum figure width of [`finalize_figsize`], in inches.
pub const MIN_WIDTH: f64 = 4.0;
/// Width reserved for a colorbar by [`finalize_figsize`], in inches.
pub const CBAR_EXTRA: f64 = 1.3;

const POINTS_PER_INCH: f64 = 72.0;
const TARGET_TICKS: f64 = 5.0;

/// Pick a figure size from the union extent of `layers`.
///
/// Height is [`BASE_HEIGHT`]; width is 70% of it times the aspect ratio, at
/// least [`MIN_WIDTH`], plus [`CBAR_EXTRA`] when any layer has a colorbar.
pub fn finalize_figsize<'a>(layers: impl IntoIterator<Item = &'a Layer>) -> (f64, f64) {
    let mut union: Option<Extent> = None;
    let mut has_cbar = false;
    for layer in layers {
        let extent = layer.grid().extent();
        union = Some(union.map_or(extent, |u| u.union(&extent)));
        has_cbar |= layer.cbar().is_some();
    }

    let aspect = union.map_or(1.0, |u| u.aspect_ratio());
    let mut width = (0.7 * BASE_HEIGHT * aspect).max(MIN_WIDTH);
    if has_cbar {
        width += CBAR_EXTRA;
    }
    (width, BASE_HEIGHT)
}

/// Figure-level configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Fig2dSettings {
    /// `(width, height)` in inches; [`DEFAULT_FIGSIZE`] when unset.
    pub figsize: Option<(f64, f64)>,
    pub dpi: f64,
    /// Style preset name, kept for round trips.
    pub style: Option<String>,
    pub background: Color,
    /// Number of axes, laid out in one row.
    pub axes: usize,
}

impl Default for Fig2dSettings {
    fn default() -> Self {
        Self {
            figsize: None,
            dpi: 100.0,
            style: None,
            background: Color::WHITE,
            axes: 1,
        }
    }
}

/// A layer drawn on an axis, with the extent it was placed at.
#[derive(Debug, Clone)]
pub struct DrawnImage {
    layer: Layer,
    extent: Extent,
}

impl DrawnImage {
    pub fn layer(&self) -> &Layer {
        &self.layer
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }
}

/// Colorbar attached next to an axis for a labelled layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Colorbar {
    pub label: String,
    pub cmap: String,
    pub vmin: f64,
    pub vmax: f64,
}

/// One plotting area of a figure.
#[derive(Debug, Clone, Default)]
pub struct Axis {
    titles: BTreeMap<TitleLoc, String>,
    xlabel: String,
    ylabel: String,
    xlim: Option<(f64, f64)>,
    ylim: Option<(f64, f64)>,
    km_x: bool,
    km_y: bool,
    crosses: Vec<GridCrossStyle>,
    images: Vec<DrawnImage>,
    colorbars: Vec<Colorbar>,
    recorded: Vec<Fig2dAction>,
}

impl Axis {
    pub fn title(&self, loc: TitleLoc) -> Option<&str> {
        self.titles.get(&loc).map(String::as_str)
    }

    pub fn xlabel(&self) -> &str {
        &self.xlabel
    }

    pub fn ylabel(&self) -> &str {
        &self.ylabel
    }

    pub fn images(&self) -> &[DrawnImage] {
        &self.images
    }

    pub fn colorbars(&self) -> &[Colorbar] {
        &self.colorbars
    }

    pub fn grid_crosses(&self) -> &[GridCrossStyle] {
        &self.crosses
    }

    /// Helper actions applied to this axis, in order.
    pub fn recorded_actions(&self) -> &[Fig2dAction] {
        &self.recorded
    }

    /// Whether x / y tick labels are shown in kilometres.
    pub fn km_ticks(&self) -> (bool, bool) {
        (self.km_x, self.km_y)
    }

    fn data_extent(&self) -> Option<Extent> {
        self.images
            .iter()
            .map(|image| image.extent)
            .reduce(|a, b| a.union(&b))
    }

    /// Current x limits: explicit ones, else the drawn data, else `(0, 1)`.
    pub fn xlim(&self) -> (f64, f64) {
        self.xlim
            .or_else(|| self.data_extent().map(|e| (e.xmin, e.xmax)))
            .unwrap_or((0.0, 1.0))
    }

    pub fn ylim(&self) -> (f64, f64) {
        self.ylim
            .or_else(|| self.data_extent().map(|e| (e.ymin, e.ymax)))
            .unwrap_or((0.0, 1.0))
    }

    /// `None` keeps the current value of that side.
    pub fn set_xlim(&mut self, min: Option<f64>, max: Option<f64>) {
        let (lo, hi) = self.xlim();
        self.xlim = Some((min.unwrap_or(lo), max.unwrap_or(hi)));
    }

    pub fn set_ylim(&mut self, min: Option<f64>, max: Option<f64>) {
        let (lo, hi) = self.ylim();
        self.ylim = Some((min.unwrap_or(lo), max.unwrap_or(hi)));
    }

    /// Major x tick positions within the limits.
    pub fn xticks(&self) -> Vec<f64> {
        let (lo, hi) = self.xlim();
        nice_ticks(lo, hi).0
    }

    pub fn yticks(&self) -> Vec<f64> {
        let (lo, hi) = self.ylim();
        nice_ticks(lo, hi).0
    }

    pub fn tick_labels(&self, ticks: &[f64], km: bool) -> Vec<String> {
        ticks.iter().map(|&t| format_tick(t, km)).collect()
    }
}

/// Rounded tick positions covering `[lo, hi]` and their spacing.
fn nice_ticks(lo: f64, hi: f64) -> (Vec<f64>, f64) {
    let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
    let range = hi - lo;
    if !range.is_finite() || range <= 0.0 {
        return (vec![lo], 1.0);
    }

    let raw = range / TARGET_TICKS;
    let magnitude = 10f64.powf(raw.log10().floor());
    let step = [1.0, 2.0, 2.5, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|s| *s >= raw)
        .unwrap_or(10.0 * magnitude);

    let first = (lo / step).ceil() as i64;
    let eps = step * 1e-9;
    let ticks = (0..)
        .map(|k| (first + k) as f64 * step)
        .take_while(|t| *t <= hi + eps)
        .collect();
    (ticks, step)
}

/// Midpoints between major ticks that fall inside `[lo, hi]`.
fn minor_ticks(lo: f64, hi: f64) -> Vec<f64> {
    let (major, step) = nice_ticks(lo, hi);
    let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
    let Some(&first) = major.first() else {
        return Vec::new();
    };
    std::iter::once(first - step / 2.0)
        .chain(major.iter().map(|t| t + step / 2.0))
        .filter(|t| *t >= lo && *t <= hi)
        .collect()
}

fn format_tick(value: f64, km: bool) -> String {
    if km {
        return format!("{:.1}", value / 1000.0);
    }
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        let text = format!("{:.4}", value);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Relabel a metre axis label to kilometres; `None` when no change applies.
fn km_label(label: &str) -> Option<String> {
    let lower = label.to_lowercase();
    if label.is_empty() || !lower.contains('m') || lower.contains("km") {
        return None;
    }
    Some(label.replace('m', "km").replace('M', "km"))
}

/// Rendered RGBA pixels (not premultiplied) of a figure.
#[derive(Debug, Clone)]
pub struct RenderedFigure {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Plot rectangle of an axis in pixels and its data mapping.
struct Frame {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    xlim: (f64, f64),
    ylim: (f64, f64),
}

impl Frame {
    /// Fit `axis`'s limits into the box at equal aspect, centered.
    fn fit(axis: &Axis, left: f64, top: f64, avail_w: f64, avail_h: f64) -> Self {
        let xlim = axis.xlim();
        let ylim = axis.ylim();
        let span = |lim: (f64, f64)| {
            let d = (lim.1 - lim.0).abs();
            if d > 0.0 && d.is_finite() {
                d
            } else {
                1.0
            }
        };
        let (dw, dh) = (span(xlim), span(ylim));
        let scale = (avail_w / dw).min(avail_h / dh);
        let (width, height) = (dw * scale, dh * scale);
        Self {
            left: left + (avail_w - width) / 2.0,
            top: top + (avail_h - height) / 2.0,
            width,
            height,
            xlim,
            ylim,
        }
    }

    fn to_px(&self, x: f64, y: f64) -> (f64, f64) {
        let sx = self.width / nonzero(self.xlim.1 - self.xlim.0);
        let sy = self.height / nonzero(self.ylim.1 - self.ylim.0);
        (
            self.left + (x - self.xlim.0) * sx,
            self.top + (self.ylim.1 - y) * sy,
        )
    }

    fn rect(&self) -> Option<Rect> {
        Rect::from_xywh(
            self.left as f32,
            self.top as f32,
            self.width as f32,
            self.height as f32,
        )
    }
}

fn nonzero(d: f64) -> f64 {
    if d == 0.0 || !d.is_finite() {
        1.0
    } else {
        d
    }
}

fn paint_for(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, color.a);
    paint.anti_alias = true;
    paint
}

/// PNG text keyword: printable Latin-1, at most 79 bytes.
fn keyword(raw: &str) -> String {
    raw.chars()
        .map(|c| if (' '..='~').contains(&c) { c } else { '_' })
        .take(79)
        .collect()
}

fn axis_error(index: usize, count: usize) -> TopovizError {
    TopovizError::invalid_parameter(
        "axis",
        format!("axis index {} out of range (figure has {} axes)", index, count),
    )
}

/// Where a named layer is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHandle {
    pub axis: usize,
    pub index: usize,
}

/// A 2D figure of one or more map axes.
#[derive(Debug, Clone)]
pub struct Figure2d {
    settings: Fig2dSettings,
    axes: Vec<Axis>,
    images: HashMap<String, ImageHandle>,
    colorbars: HashMap<String, (usize, usize)>,
    base_layers: Vec<Layer>,
}

impl Default for Figure2d {
    fn default() -> Self {
        Self::new(Fig2dSettings::default())
    }
}

impl Figure2d {
    pub fn new(settings: Fig2dSettings) -> Self {
        let axes = vec![Axis::default(); settings.axes.max(1)];
        Self {
            settings,
            axes,
            images: HashMap::new(),
            colorbars: HashMap::new(),
            base_layers: Vec::new(),
        }
    }

    pub fn settings(&self) -> &Fig2dSettings {
        &self.settings
    }

    /// Figure size in inches.
    pub fn figsize(&self) -> (f64, f64) {
        self.settings.figsize.unwrap_or(DEFAULT_FIGSIZE)
    }

    pub fn set_figsize(&mut self, figsize: (f64, f64)) {
        self.settings.figsize = Some(figsize);
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn axis(&self, index: usize) -> Result<&Axis> {
        self.axes
            .get(index)
            .ok_or_else(|| axis_error(index, self.axes.len()))
    }

    fn axis_mut(&mut self, index: usize) -> Result<&mut Axis> {
        let count = self.axes.len();
        self.axes
            .get_mut(index)
            .ok_or_else(|| axis_error(index, count))
    }

    /// Layers as they were added, before expansion.
    pub fn base_layers(&self) -> &[Layer] {
        &self.base_layers
    }

    /// Drawn layer registered under `name`.
    pub fn image(&self, name: &str) -> Option<&DrawnImage> {
        let handle = self.images.get(name)?;
        self.axes.get(handle.axis)?.images.get(handle.index)
    }

    pub fn image_handles(&self) -> &HashMap<String, ImageHandle> {
        &self.images
    }

    pub fn colorbar(&self, name: &str) -> Option<&Colorbar> {
        let &(axis, index) = self.colorbars.get(name)?;
        self.axes.get(axis)?.colorbars.get(index)
    }

    /// Expand `layers` in 2D mode and draw them on axis `axis`, in order.
    pub fn add_maps(&mut self, axis: usize, layers: impl IntoIterator<Item = Layer>) -> Result<()> {
        self.axis(axis)?;
        let layers: Vec<Layer> = layers.into_iter().collect();
        if layers.is_empty() {
            return Err(TopovizError::invalid_parameter(
                "maps",
                "provide at least one layer to add",
            ));
        }

        for layer in layers {
            self.base_layers.push(layer.clone());
            for drawn in expand(layer, RenderMode::TwoD)? {
                self.draw(axis, drawn)?;
            }
        }
        Ok(())
    }

    fn draw(&mut self, axis: usize, layer: Layer) -> Result<()> {
        let name = layer.name().to_string();
        if self.images.contains_key(&name) {
            warn!(layer = %name, "Another layer with this name is already drawn; lookups now return the newest");
        }
        debug!(layer = %name, axis, cmap = %layer.cmap(), alpha = layer.alpha(), "Drawing layer");

        let extent = layer.grid().extent();
        let colorbar = layer.cbar().map(|label| Colorbar {
            label: label.to_string(),
            cmap: layer.cmap().to_string(),
            vmin: layer.vmin(),
            vmax: layer.vmax(),
        });

        let target = self.axis_mut(axis)?;
        target.images.push(DrawnImage { layer, extent });
        let index = target.images.len() - 1;
        let cbar_index = colorbar.map(|c| {
            target.colorbars.push(c);
            target.colorbars.len() - 1
        });

        self.images.insert(name.clone(), ImageHandle { axis, index });
        if let Some(cbar_index) = cbar_index {
            self.colorbars.insert(name, (axis, cbar_index));
        }
        Ok(())
    }

    pub fn set_title(&mut self, axis: usize, text: impl Into<String>, loc: TitleLoc) -> Result<()> {
        let text = text.into();
        let target = self.axis_mut(axis)?;
        if text.is_empty() {
            target.titles.remove(&loc);
        } else {
            target.titles.insert(loc, text);
        }
        Ok(())
    }

    pub fn set_xlabel(&mut self, axis: usize, text: impl Into<String>) -> Result<()> {
        self.axis_mut(axis)?.xlabel = text.into();
        Ok(())
    }

    pub fn set_ylabel(&mut self, axis: usize, text: impl Into<String>) -> Result<()> {
        self.axis_mut(axis)?.ylabel = text.into();
        Ok(())
    }

    /// Show tick labels in kilometres and relabel metre axis labels.
    pub fn convert_ticks_to_km(&mut self, axis: usize, axes: TickAxes) -> Result<()> {
        let target = self.axis_mut(axis)?;
        if axes.includes_x() {
            target.km_x = true;
            if let Some(label) = km_label(&target.xlabel) {
                target.xlabel = label;
            }
        }
        if axes.includes_y() {
            target.km_y = true;
            if let Some(label) = km_label(&target.ylabel) {
                target.ylabel = label;
            }
        }
        target
            .recorded
            .push(Fig2dAction::ConvertTicksToKm { axis, axes });
        Ok(())
    }

    /// Draw `+` markers at every major (and optionally minor) tick junction.
    pub fn add_grid_crosses(&mut self, axis: usize, style: GridCrossStyle) -> Result<()> {
        style.color.to_color()?;
        let target = self.axis_mut(axis)?;
        target.crosses.push(style.clone());
        target
            .recorded
            .push(Fig2dAction::AddGridCrosses { axis, style });
        Ok(())
    }

    /// Apply a post-render action to the axis it names.
    pub fn apply_action(&mut self, action: &Fig2dAction) -> Result<()> {
        debug!(?action, "Applying fig2d action");
        match action {
            Fig2dAction::Title { axis, text, loc } => self.set_title(*axis, text.clone(), *loc),
            Fig2dAction::Xlabel { axis, text } => self.set_xlabel(*axis, text.clone()),
            Fig2dAction::Ylabel { axis, text } => self.set_ylabel(*axis, text.clone()),
            Fig2dAction::Xlim { axis, min, max } => {
                self.axis_mut(*axis)?.set_xlim(*min, *max);
                Ok(())
            }
            Fig2dAction::Ylim { axis, min, max } => {
                self.axis_mut(*axis)?.set_ylim(*min, *max);
                Ok(())
            }
            Fig2dAction::ConvertTicksToKm { axis, axes } => self.convert_ticks_to_km(*axis, *axes),
            Fig2dAction::AddGridCrosses { axis, style } => {
                self.add_grid_crosses(*axis, style.clone())
            }
        }
    }

    /// Actions that rebuild this figure's decorations: recorded helpers
    /// first, then titles and labels, axis by axis.
    pub fn actions(&self) -> Vec<Fig2dAction> {
        let mut actions = Vec::new();
        for (idx, axis) in self.axes.iter().enumerate() {
            actions.extend(axis.recorded.iter().cloned().map(|a| a.with_axis(idx)));
            for loc in TitleLoc::ALL {
                if let Some(text) = axis.title(loc) {
                    actions.push(Fig2dAction::Title {
                        axis: idx,
                        text: text.to_string(),
                        loc,
                    });
                }
            }
            if !axis.xlabel.is_empty() {
                actions.push(Fig2dAction::Xlabel {
                    axis: idx,
                    text: axis.xlabel.clone(),
                });
            }
            if !axis.ylabel.is_empty() {
                actions.push(Fig2dAction::Ylabel {
                    axis: idx,
                    text: axis.ylabel.clone(),
                });
            }
        }
        actions
    }

    /// PNG text metadata describing titles, labels, ticks and colorbars.
    pub fn metadata(&self) -> Vec<(String, String)> {
        let mut text = vec![("Software".to_string(), "topoviz".to_string())];
        if let Some(title) = self.axes.iter().find_map(|a| a.title(TitleLoc::Center)) {
            text.push(("Title".to_string(), title.to_string()));
        }
        for (idx, axis) in self.axes.iter().enumerate() {
            for loc in TitleLoc::ALL {
                if let Some(title) = axis.title(loc) {
                    text.push((format!("axis{}.title.{}", idx, loc.as_str()), title.to_string()));
                }
            }
            if !axis.xlabel.is_empty() {
                text.push((format!("axis{}.xlabel", idx), axis.xlabel.clone()));
            }
            if !axis.ylabel.is_empty() {
                text.push((format!("axis{}.ylabel", idx), axis.ylabel.clone()));
            }
            let (km_x, km_y) = axis.km_ticks();
            text.push((
                format!("axis{}.xticks", idx),
                axis.tick_labels(&axis.xticks(), km_x).join(", "),
            ));
            text.push((
                format!("axis{}.yticks", idx),
                axis.tick_labels(&axis.yticks(), km_y).join(", "),
            ));
            for (name, &(cbar_axis, cbar_idx)) in &self.colorbars {
                if cbar_axis != idx {
                    continue;
                }
                if let Some(cbar) = axis.colorbars.get(cbar_idx) {
                    text.push((
                        keyword(&format!("axis{}.colorbar.{}", idx, name)),
                        format!("{} [{}, {}] {}", cbar.label, cbar.vmin, cbar.vmax, cbar.cmap),
                    ));
                }
            }
        }
        text
    }

    /// Size of the rendered image in pixels.
    pub fn pixel_size(&self) -> (u32, u32) {
        let (w, h) = self.figsize();
        let to_px = |inches: f64| (inches * self.settings.dpi).round().max(1.0) as u32;
        (to_px(w), to_px(h))
    }

    /// Composite every axis into an RGBA image.
    pub fn render(&self) -> Result<RenderedFigure> {
        let (width, height) = self.pixel_size();
        let mut canvas = Pixmap::new(width, height)
            .ok_or_else(|| TopovizError::render(format!("cannot allocate {}x{} canvas", width, height)))?;
        let bg = self.settings.background;
        canvas.fill(tiny_skia::Color::from_rgba8(bg.r, bg.g, bg.b, bg.a));

        let cell_w = width as f64 / self.axes.len() as f64;
        let cell_h = height as f64;
        for (idx, axis) in self.axes.iter().enumerate() {
            let cbar_space = 0.12 * cell_w * axis.colorbars.len() as f64;
            let left = idx as f64 * cell_w + 0.12 * cell_w;
            let top = 0.08 * cell_h;
            let avail_w = (cell_w * 0.83 - cbar_space).max(1.0);
            let avail_h = cell_h * 0.82;
            let frame = Frame::fit(axis, left, top, avail_w, avail_h);
            self.render_axis(&mut canvas, axis, &frame)?;
        }

        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for p in canvas.pixels() {
            let c = p.demultiply();
            pixels.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        Ok(RenderedFigure {
            width,
            height,
            pixels,
        })
    }

    fn render_axis(&self, canvas: &mut Pixmap, axis: &Axis, frame: &Frame) -> Result<()> {
        let clip = frame.rect().and_then(|rect| {
            let mut mask = Mask::new(canvas.width(), canvas.height())?;
            mask.fill_path(
                &PathBuilder::from_rect(rect),
                FillRule::Winding,
                false,
                Transform::identity(),
            );
            Some(mask)
        });

        for image in &axis.images {
            draw_image(canvas, image, frame, clip.as_ref())?;
        }
        for style in &axis.crosses {
            self.draw_crosses(canvas, axis, frame, style)?;
        }

        if let Some(rect) = frame.rect() {
            let mut stroke = Stroke::default();
            stroke.width = 1.0;
            canvas.stroke_path(
                &PathBuilder::from_rect(rect),
                &paint_for(Color::BLACK),
                &stroke,
                Transform::identity(),
                None,
            );
        }

        let bar_w = (frame.width * 0.05).max(4.0);
        let mut x = frame.left + frame.width + bar_w;
        for cbar in &axis.colorbars {
            draw_colorbar(canvas, cbar, x, frame.top + frame.height * 0.05, bar_w, frame.height * 0.9);
            x += bar_w * 3.0;
        }
        Ok(())
    }

    fn draw_crosses(
        &self,
        canvas: &mut Pixmap,
        axis: &Axis,
        frame: &Frame,
        style: &GridCrossStyle,
    ) -> Result<()> {
        let color = style.color.to_color()?;
        let (x0, x1) = axis.xlim();
        let (y0, y1) = axis.ylim();
        let scale = self.settings.dpi / POINTS_PER_INCH;

        let mut xs: Vec<(f64, bool)> = nice_ticks(x0, x1).0.into_iter().map(|t| (t, false)).collect();
        let mut ys: Vec<(f64, bool)> = nice_ticks(y0, y1).0.into_iter().map(|t| (t, false)).collect();
        if style.include_minor {
            xs.extend(minor_ticks(x0, x1).into_iter().map(|t| (t, true)));
            ys.extend(minor_ticks(y0, y1).into_iter().map(|t| (t, true)));
        }

        let mut stroke = Stroke::default();
        stroke.width = (style.linewidth * scale) as f32;
        for &(x, x_minor) in &xs {
            for &(y, y_minor) in &ys {
                let minor = x_minor || y_minor;
                let (size, alpha) = if minor {
                    (style.size * 0.6, style.alpha * 0.2)
                } else {
                    (style.size, style.alpha)
                };
                let half = size * scale / 2.0;
                let (px, py) = frame.to_px(x, y);

                let mut pb = PathBuilder::new();
                pb.move_to((px - half) as f32, py as f32);
                pb.line_to((px + half) as f32, py as f32);
                pb.move_to(px as f32, (py - half) as f32);
                pb.line_to(px as f32, (py + half) as f32);
                if let Some(path) = pb.finish() {
                    canvas.stroke_path(
                        &path,
                        &paint_for(color.with_alpha(alpha)),
                        &stroke,
                        Transform::identity(),
                        None,
                    );
                }
            }
        }
        Ok(())
    }

    /// Encode the rendered figure as PNG with its metadata.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let rendered = self.render()?;
        create_png_auto(
            &rendered.pixels,
            rendered.width as usize,
            rendered.height as usize,
            &self.metadata(),
        )
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let png = self.to_png()?;
        std::fs::write(path, &png)?;
        info!(path = %path.display(), bytes = png.len(), "Saved 2D figure");
        Ok(())
    }
}

fn draw_image(canvas: &mut Pixmap, image: &DrawnImage, frame: &Frame, clip: Option<&Mask>) -> Result<()> {
    let layer = &image.layer;
    let (rows, cols) = layer.value().dim();
    if rows == 0 || cols == 0 {
        return Ok(());
    }

    let cmap = Colormap::resolve(layer.cmap());
    let rgba = colorize(layer.value(), layer.vmin(), layer.vmax(), &cmap, layer.alpha());
    let mut raster = Pixmap::new(cols as u32, rows as u32)
        .ok_or_else(|| TopovizError::render(format!("cannot allocate {}x{} raster", cols, rows)))?;
    for (dst, src) in raster.pixels_mut().iter_mut().zip(rgba.chunks_exact(4)) {
        *dst = ColorU8::from_rgba(src[0], src[1], src[2], src[3]).premultiply();
    }

    let extent = image.extent;
    let (left, top) = frame.to_px(extent.xmin, extent.ymax);
    let (right, bottom) = frame.to_px(extent.xmax, extent.ymin);
    let transform = Transform::from_row(
        ((right - left) / cols as f64) as f32,
        0.0,
        0.0,
        ((bottom - top) / rows as f64) as f32,
        left as f32,
        top as f32,
    );
    let paint = PixmapPaint {
        quality: FilterQuality::Nearest,
        ..PixmapPaint::default()
    };
    canvas.draw_pixmap(0, 0, raster.as_ref(), &paint, transform, clip);
    Ok(())
}

pub(crate) fn draw_colorbar(canvas: &mut Pixmap, cbar: &Colorbar, x: f64, y: f64, width: f64, height: f64) {
    let cmap = Colormap::resolve(&cbar.cmap);
    let rows = height.round().max(1.0) as usize;
    for row in 0..rows {
        let t = 1.0 - row as f32 / (rows.max(2) - 1) as f32;
        if let Some(rect) = Rect::from_xywh(x as f32, (y + row as f64) as f32, width as f32, 1.0) {
            canvas.fill_rect(rect, &paint_for(cmap.sample(t)), Transform::identity(), None);
        }
    }
    if let Some(rect) = Rect::from_xywh(x as f32, y as f32, width as f32, rows as f32) {
        canvas.stroke_path(
            &PathBuilder::from_rect(rect),
            &paint_for(Color::BLACK),
            &Stroke::default(),
            Transform::identity(),
            None,
        );
    }
}

/// Draw `layers` on a single axis sized to their extent, labelled in
/// kilometres with grid crosses.
pub fn quickmap(layers: Vec<Layer>) -> Result<Figure2d> {
    if layers.is_empty() {
        return Err(TopovizError::invalid_parameter(
            "maps",
            "provide at least one layer",
        ));
    }
    let settings = Fig2dSettings {
        figsize: Some(finalize_figsize(&layers)),
        ..Fig2dSettings::default()
    };
    let mut figure = Figure2d::new(settings);
    figure.add_maps(0, layers)?;
    figure.set_xlabel(0, "Easting (km)")?;
    figure.set_ylabel(0, "Northing (km)")?;
    figure.convert_ticks_to_km(0, TickAxes::Both)?;
    figure.add_grid_crosses(0, GridCrossStyle::default())?;
    Ok(figure)
}
