//! Materializing and running workflow documents.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use pipeline::{Layer, ProcessorRegistry};
use renderer::{CameraPosition, Fig2dAction, Fig2dSettings, Fig3dSettings, Figure2d, Figure3d};
use serde_json::{Map, Value};
use topoviz_common::{RasterGrid, Result, TopovizError};
use tracing::{debug, info};

use crate::inputs::{self, resolve_params};
use crate::loaders::LoaderRegistry;
use crate::spec::{InputSpec, NamedMap, RunMode, WorkflowSpec};

/// Screenshot written by a 3D run that names no path.
pub const DEFAULT_SCREENSHOT_PATH: &str = "quickmap3d.png";

/// Result of a 2D run.
#[derive(Debug)]
pub struct Rendered2d {
    pub figure: Figure2d,
    /// Where the figure was written, if `save_path` was set.
    pub saved: Option<PathBuf>,
}

/// Result of a 3D run.
#[derive(Debug)]
pub struct Rendered3d {
    pub figure: Figure3d,
    /// Camera the screenshot was taken from.
    pub camera: CameraPosition,
    pub screenshot: PathBuf,
}

/// Figures produced by [`Workflow::run`]; `both` fills both slots.
#[derive(Debug, Default)]
pub struct RunOutput {
    pub fig2d: Option<Rendered2d>,
    pub fig3d: Option<Rendered3d>,
}

/// A parsed workflow document plus the registries used to materialize it.
///
/// Running never modifies the document: every run loads grids and builds
/// layers afresh.
#[derive(Debug, Clone)]
pub struct Workflow {
    spec: WorkflowSpec,
    processors: ProcessorRegistry,
    loaders: LoaderRegistry,
    output_dir: Option<PathBuf>,
}

impl Workflow {
    /// Wrap a document with the built-in processors and loaders.
    pub fn new(spec: WorkflowSpec) -> Self {
        Self {
            spec,
            processors: ProcessorRegistry::builtin(),
            loaders: LoaderRegistry::builtin(),
            output_dir: None,
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(text)?))
    }

    /// Read a workflow JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let workflow = Self::from_json_str(&text)?;
        debug!(
            path = %path.display(),
            inputs = workflow.spec.inputs.len(),
            maps = workflow.spec.maps.len(),
            "Loaded workflow"
        );
        Ok(workflow)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.spec)?)
    }

    /// Write the document as indented JSON.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json_string()?)?;
        info!(path = %path.display(), "Saved workflow");
        Ok(())
    }

    pub fn with_processors(mut self, processors: ProcessorRegistry) -> Self {
        self.processors = processors;
        self
    }

    pub fn with_loaders(mut self, loaders: LoaderRegistry) -> Self {
        self.loaders = loaders;
        self
    }

    /// Resolve relative `save_path` / `screenshot_path` values against `dir`.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn spec(&self) -> &WorkflowSpec {
        &self.spec
    }

    pub fn spec_mut(&mut self) -> &mut WorkflowSpec {
        &mut self.spec
    }

    pub fn into_spec(self) -> WorkflowSpec {
        self.spec
    }

    pub fn input_specs(&self) -> &NamedMap<InputSpec> {
        &self.spec.inputs
    }

    /// Whether the document asks to be prompted for its inputs.
    pub fn interactive(&self) -> bool {
        self.spec.interactive.unwrap_or(true)
    }

    pub fn validate_defaults(&self) -> Result<()> {
        inputs::validate_defaults(&self.spec)
    }

    pub fn resolve_inputs(&self, provided: &Map<String, Value>) -> Result<Map<String, Value>> {
        inputs::resolve_inputs(&self.spec, provided)
    }

    pub fn loader_inputs(&self) -> BTreeSet<String> {
        inputs::loader_inputs(&self.spec)
    }

    /// Mode from the `run` section, `fig2d` when unset.
    pub fn default_mode(&self) -> Result<RunMode> {
        self.spec
            .run
            .mode
            .as_deref()
            .map(str::parse)
            .transpose()
            .map(Option::unwrap_or_default)
    }

    /// Load every data source, keyed by its name.
    pub fn load_grids(&self, inputs: &Map<String, Value>) -> Result<HashMap<String, RasterGrid>> {
        let mut grids = HashMap::with_capacity(self.spec.data_sources.len());
        for (name, source) in self.spec.data_sources.iter() {
            let params = resolve_params(&source.params, inputs)?;
            debug!(data = name, loader = %source.loader, "Loading data source");
            grids.insert(name.to_string(), self.loaders.load(&source.loader, params)?);
        }
        Ok(grids)
    }

    /// Load grids and build one layer per map, processors attached in
    /// declaration order.
    pub fn build_maps(&self, inputs: &Map<String, Value>) -> Result<Vec<Layer>> {
        let grids = self.load_grids(inputs)?;
        let mut layers = Vec::with_capacity(self.spec.maps.len());
        for map in &self.spec.maps {
            let grid = grids
                .get(&map.data)
                .ok_or_else(|| TopovizError::unknown("data source", &map.data))?;

            let mut builder = Layer::builder(grid.clone())
                .cmap(map.cmap.clone())
                .alpha(map.alpha)
                .draped(map.draped)
                .lighting(map.lighting());
            if let Some(name) = &map.name {
                builder = builder.name(name.clone());
            }
            if let Some(vmin) = map.vmin {
                builder = builder.vmin(vmin);
            }
            if let Some(vmax) = map.vmax {
                builder = builder.vmax(vmax);
            }
            if let Some(cbar) = &map.cbar {
                builder = builder.cbar(cbar.clone());
            }
            for spec in &map.processors {
                let params = resolve_params(&spec.params, inputs)?;
                builder = builder.processor(self.processors.build(&spec.name, params)?);
            }

            let layer = builder.build()?;
            debug!(
                layer = %layer.name(),
                data = %map.data,
                processors = layer.processors().len(),
                "Built map"
            );
            layers.push(layer);
        }
        info!(maps = layers.len(), "Built maps");
        Ok(layers)
    }

    fn output_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match &self.output_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Materialize the layers and drive the renderer(s) for `mode`
    /// (the document's own mode when `None`).
    pub fn run(&self, inputs: &Map<String, Value>, mode: Option<RunMode>) -> Result<RunOutput> {
        let mode = match mode {
            Some(mode) => mode,
            None => self.default_mode()?,
        };
        info!(%mode, "Running workflow");
        let mut output = RunOutput::default();
        if matches!(mode, RunMode::Fig2d | RunMode::Both) {
            output.fig2d = Some(self.run_fig2d(inputs)?);
        }
        if matches!(mode, RunMode::Fig3d | RunMode::Both) {
            output.fig3d = Some(self.run_fig3d(inputs)?);
        }
        Ok(output)
    }

    fn run_fig2d(&self, inputs: &Map<String, Value>) -> Result<Rendered2d> {
        let maps = self.build_maps(inputs)?;
        let spec = self.spec.fig2d.clone().unwrap_or_default();

        let mut figure = Figure2d::new(Fig2dSettings {
            figsize: spec.figsize,
            style: spec.style.clone(),
            ..Fig2dSettings::default()
        });
        figure.add_maps(0, maps)?;
        for raw in &spec.actions {
            figure.apply_action(&Fig2dAction::from_value(raw)?)?;
        }

        let saved = match &spec.save_path {
            Some(path) => {
                let path = self.output_path(path);
                figure.save(&path)?;
                Some(path)
            }
            None => {
                info!("No fig2d.save_path set; figure kept in memory");
                None
            }
        };
        Ok(Rendered2d { figure, saved })
    }

    fn run_fig3d(&self, inputs: &Map<String, Value>) -> Result<Rendered3d> {
        let maps = self.build_maps(inputs)?;
        let spec = self.spec.fig3d.clone().unwrap_or_default();

        let defaults = Fig3dSettings::default();
        let settings = Fig3dSettings {
            background: spec.background.clone().unwrap_or(defaults.background),
            smooth_shading: spec.smooth_shading.unwrap_or(defaults.smooth_shading),
            show_scalar_bar: spec.show_scalar_bar.unwrap_or(defaults.show_scalar_bar),
            eye_dome_lighting: spec.eye_dome_lighting.unwrap_or(defaults.eye_dome_lighting),
            z_exaggeration: spec.z_exaggeration,
            window_size: spec.window_size.unwrap_or(defaults.window_size),
        };
        settings.background.to_color()?;

        let surface = match &spec.surface_map {
            Some(name) => Some(
                maps.iter()
                    .find(|layer| layer.name() == name)
                    .cloned()
                    .ok_or_else(|| TopovizError::unknown("surface map", name))?,
            ),
            None => None,
        };

        let mut figure = Figure3d::new(settings);
        if let Some(camera) = spec.camera_position {
            figure.set_camera_position(camera);
        }
        figure.add_maps(maps, surface)?;

        let screenshot = self.output_path(
            spec.screenshot_path
                .as_deref()
                .unwrap_or(DEFAULT_SCREENSHOT_PATH),
        );
        let camera = figure.screenshot(&screenshot)?;
        info!(camera = ?camera, "Camera position");
        Ok(Rendered3d {
            figure,
            camera,
            screenshot,
        })
    }
}
