//! Building workflow documents from live figures.
//!
//! Each base layer of a figure becomes a path input (`<name>_path`,
//! defaulting to `<name>.tif`), a data source reading that input through
//! the chosen loader, and a map carrying the layer's display settings and
//! processor chain. Grid values are not embedded; replaying the document
//! reloads them from the referenced paths.

use pipeline::layer::nan_min_max;
use pipeline::Layer;
use renderer::{Figure2d, Figure3d};
use serde_json::{Map, Value};
use topoviz_common::Result;
use tracing::{debug, warn};

use crate::inputs::REF_KEY;
use crate::spec::{
    DataSourceSpec, Fig2dSpec, Fig3dSpec, InputSpec, MapSpec, NamedMap, ProcessorSpec, RunMode,
    RunSpec, WorkflowSpec, WORKFLOW_VERSION,
};
use crate::workflow::Workflow;

/// Loader written into exported data sources unless overridden.
pub const DEFAULT_LOADER: &str = "topotoolbox.read_tif";

/// Options of [`workflow_from_fig2d`] and [`workflow_from_fig3d`].
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Value of the document's `interactive` flag.
    pub interactive: bool,
    /// Loader used by every exported data source.
    pub default_loader: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            interactive: true,
            default_loader: DEFAULT_LOADER.to_string(),
        }
    }
}

/// Inputs, data sources and maps describing a set of layers.
#[derive(Debug, Clone, Default)]
pub struct ExportedMaps {
    pub inputs: NamedMap<InputSpec>,
    pub data_sources: NamedMap<DataSourceSpec>,
    pub maps: Vec<MapSpec>,
}

/// Parameter of `loader` that receives the file path.
pub fn loader_path_key(loader: &str) -> &'static str {
    match loader {
        "topotoolbox.load_dem" => "source",
        _ => "path",
    }
}

fn bound_differs(value: f64, auto: f64) -> bool {
    value.is_finite() && !(auto.is_finite() && (value - auto).abs() <= f64::EPSILON * auto.abs().max(1.0))
}

/// Map declaration capturing `layer`'s display settings and processors.
///
/// `vmin`/`vmax` are written only when they differ from the value range,
/// so automatic bounds stay automatic on replay. Processor parameters that
/// cannot be expressed in JSON are dropped with a warning.
pub fn map_spec_from_layer(layer: &Layer, data: &str) -> MapSpec {
    let mut spec = MapSpec::new(data);
    spec.name = Some(layer.name().to_string());
    spec.cmap = layer.cmap().to_string();
    spec.alpha = layer.alpha();
    spec.cbar = layer.cbar().map(str::to_string);
    spec.draped = layer.draped();
    spec.set_lighting(layer.lighting());

    let (lo, hi) = nan_min_max(layer.value());
    spec.vmin = bound_differs(layer.vmin(), lo).then(|| layer.vmin());
    spec.vmax = bound_differs(layer.vmax(), hi).then(|| layer.vmax());

    spec.processors = layer
        .processors()
        .iter()
        .map(|processor| {
            let dropped = processor.non_json_params();
            if !dropped.is_empty() {
                warn!(
                    layer = %layer.name(),
                    processor = %processor.name(),
                    params = ?dropped,
                    "Dropping parameters that cannot be written to a workflow"
                );
            }
            ProcessorSpec {
                name: processor.name().to_string(),
                params: processor.params(),
            }
        })
        .collect();
    spec
}

/// Inputs, data sources and maps for `layers`, all read through `loader`.
pub fn specs_from_layers<'a>(layers: impl IntoIterator<Item = &'a Layer>, loader: &str) -> ExportedMaps {
    let mut exported = ExportedMaps::default();
    for layer in layers {
        let data_id = layer.name().to_string();
        let input_id = format!("{}_path", data_id);
        if exported.data_sources.contains_key(&data_id) {
            warn!(layer = %data_id, "Several layers share this name; the last one wins its input and data source");
        }

        exported.inputs.insert(
            input_id.clone(),
            InputSpec::path(format!("Path for {}", data_id), format!("{}.tif", data_id)),
        );

        let mut reference = Map::new();
        reference.insert(REF_KEY.to_string(), Value::String(input_id));
        let mut params = Map::new();
        params.insert(loader_path_key(loader).to_string(), Value::Object(reference));
        exported.data_sources.insert(
            data_id.clone(),
            DataSourceSpec {
                loader: loader.to_string(),
                params,
                extra: Map::new(),
            },
        );

        exported.maps.push(map_spec_from_layer(layer, &data_id));
    }
    debug!(maps = exported.maps.len(), loader, "Exported layers");
    exported
}

fn document(exported: ExportedMaps, options: &ExportOptions, mode: RunMode) -> WorkflowSpec {
    WorkflowSpec {
        version: WORKFLOW_VERSION,
        interactive: Some(options.interactive),
        inputs: exported.inputs,
        data_sources: exported.data_sources,
        maps: exported.maps,
        run: RunSpec {
            mode: Some(mode.to_string()),
            extra: Map::new(),
        },
        ..WorkflowSpec::default()
    }
}

/// Workflow that redraws `figure`: its base layers, size, style and the
/// decorations recorded on its axes.
pub fn workflow_from_fig2d(figure: &Figure2d, options: &ExportOptions) -> Result<Workflow> {
    let layers: Vec<&Layer> = if figure.base_layers().is_empty() {
        figure
            .axes()
            .iter()
            .flat_map(|axis| axis.images().iter().map(|image| image.layer()))
            .collect()
    } else {
        figure.base_layers().iter().collect()
    };
    let exported = specs_from_layers(layers, &options.default_loader);

    let actions = figure
        .actions()
        .iter()
        .map(|action| action.to_value())
        .collect::<Result<Vec<Value>>>()?;

    let mut spec = document(exported, options, RunMode::Fig2d);
    spec.fig2d = Some(Fig2dSpec {
        figsize: Some(figure.figsize()),
        style: figure.settings().style.clone(),
        actions,
        ..Fig2dSpec::default()
    });
    Ok(Workflow::new(spec))
}

/// Workflow that rebuilds `figure`'s scene with the same settings and, if
/// one was set, the same camera.
pub fn workflow_from_fig3d(figure: &Figure3d, options: &ExportOptions) -> Result<Workflow> {
    let exported = specs_from_layers(figure.base_layers(), &options.default_loader);
    let settings = figure.settings();

    let mut spec = document(exported, options, RunMode::Fig3d);
    spec.fig3d = Some(Fig3dSpec {
        background: Some(settings.background.clone()),
        smooth_shading: Some(settings.smooth_shading),
        show_scalar_bar: Some(settings.show_scalar_bar),
        eye_dome_lighting: Some(settings.eye_dome_lighting),
        z_exaggeration: settings.z_exaggeration,
        camera_position: figure.custom_camera(),
        window_size: Some(settings.window_size),
        ..Fig3dSpec::default()
    });
    Ok(Workflow::new(spec))
}
