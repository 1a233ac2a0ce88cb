//! End-to-end tests: figures exported to workflow documents and replayed.

use ndarray::Array2;
use pipeline::processors::{gaussian_smooth, hillshade_processor, nan_below, nan_mask, scale};
use pipeline::Layer;
use renderer::{CameraPosition, Figure2d, Figure3d, GridCrossStyle, TickAxes, TitleLoc};
use serde_json::{json, Map, Value};
use test_utils::{cone_dem, minimal_workflow_json, TempWorkspace};
use topoviz_common::BoundaryMode;
use workflow::{
    workflow_from_fig2d, workflow_from_fig3d, ExportOptions, LoaderRegistry, RunMode, Workflow,
};

fn load_dem(ws: &TempWorkspace) -> (std::path::PathBuf, Layer) {
    let path = ws.write_geotiff("dem.tif", &cone_dem(16, 16, 100.0), 10.0).unwrap();
    let mut params = Map::new();
    params.insert("path".into(), json!(path.to_string_lossy()));
    let grid = LoaderRegistry::builtin().load("rasterio", params).unwrap();
    let layer = Layer::builder(grid)
        .name("dem")
        .cbar("Elevation (m)")
        .processor(nan_below(5.0))
        .processor(gaussian_smooth(1.5, BoundaryMode::Reflect))
        .processor(hillshade_processor(315.0, 45.0, 1.0, true))
        .processor(scale(2.0))
        .build()
        .unwrap();
    (path, layer)
}

fn rasterio_options() -> ExportOptions {
    ExportOptions {
        interactive: false,
        default_loader: "rasterio".to_string(),
    }
}

fn provided(key: &str, value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    map
}

fn image_names(figure: &Figure2d) -> Vec<String> {
    figure
        .axis(0)
        .unwrap()
        .images()
        .iter()
        .map(|image| image.layer().name().to_string())
        .collect()
}

#[test]
fn test_fig2d_export_replay_round_trip() {
    let ws = TempWorkspace::new().unwrap();
    let (dem_path, layer) = load_dem(&ws);

    let mut figure = Figure2d::default();
    figure.add_maps(0, vec![layer.clone()]).unwrap();
    figure.set_title(0, "Relief", TitleLoc::Left).unwrap();
    figure.convert_ticks_to_km(0, TickAxes::Both).unwrap();
    figure.add_grid_crosses(0, GridCrossStyle::default()).unwrap();

    let exported = workflow_from_fig2d(&figure, &rasterio_options()).unwrap();
    let doc_path = ws.path("workflow.json");
    exported.to_file(&doc_path).unwrap();

    let replay = Workflow::from_file(&doc_path).unwrap().with_output_dir(ws.root());
    assert!(!replay.interactive());
    assert_eq!(replay.default_mode().unwrap(), RunMode::Fig2d);
    assert_eq!(replay.spec().inputs.keys().collect::<Vec<_>>(), vec!["dem_path"]);

    let inputs = replay
        .resolve_inputs(&provided("dem_path", json!(dem_path.to_string_lossy())))
        .unwrap();
    let maps = replay.build_maps(&inputs).unwrap();
    assert_eq!(maps.len(), 1);
    let rebuilt = &maps[0];
    assert_eq!(rebuilt.name(), "dem");
    assert_eq!(rebuilt.cbar(), Some("Elevation (m)"));
    assert_eq!(rebuilt.cmap(), layer.cmap());

    let original: Vec<(&str, Map<String, Value>)> =
        layer.processors().iter().map(|p| (p.name(), p.params())).collect();
    let replayed: Vec<(&str, Map<String, Value>)> =
        rebuilt.processors().iter().map(|p| (p.name(), p.params())).collect();
    assert_eq!(original, replayed);

    let output = replay.run(&inputs, None).unwrap();
    assert!(output.fig3d.is_none());
    let rendered = output.fig2d.unwrap();
    assert_eq!(image_names(&rendered.figure), image_names(&figure));
    assert_eq!(rendered.figure.actions(), figure.actions());
    let axis = rendered.figure.axis(0).unwrap();
    assert_eq!(axis.title(TitleLoc::Left), Some("Relief"));
    assert_eq!(axis.xlabel(), "Easting (km)");
    assert_eq!(rendered.figure.figsize(), figure.figsize());
}

#[test]
fn test_document_defaults_point_at_layer_name() {
    let ws = TempWorkspace::new().unwrap();
    let (_, layer) = load_dem(&ws);
    let mut figure = Figure2d::default();
    figure.add_maps(0, vec![layer]).unwrap();

    let exported = workflow_from_fig2d(&figure, &ExportOptions::default()).unwrap();
    let doc: Value = serde_json::from_str(&exported.to_json_string().unwrap()).unwrap();
    assert_eq!(doc["version"], json!(1));
    assert_eq!(doc["interactive"], json!(true));
    assert_eq!(doc["inputs"]["dem_path"]["default"], json!("dem.tif"));
    assert_eq!(doc["inputs"]["dem_path"]["type"], json!("path"));
    assert_eq!(
        doc["data_sources"]["dem"],
        json!({"loader": "topotoolbox.read_tif", "params": {"path": {"$ref": "dem_path"}}})
    );
    assert_eq!(doc["run"]["mode"], json!("fig2d"));
}

#[test]
fn test_load_dem_export_uses_source_parameter() {
    let ws = TempWorkspace::new().unwrap();
    let (_, layer) = load_dem(&ws);
    let mut figure = Figure2d::default();
    figure.add_maps(0, vec![layer]).unwrap();

    let options = ExportOptions {
        default_loader: "topotoolbox.load_dem".to_string(),
        ..ExportOptions::default()
    };
    let exported = workflow_from_fig2d(&figure, &options).unwrap();
    let source = exported.spec().data_sources.get("dem").unwrap();
    assert_eq!(source.params["source"], json!({"$ref": "dem_path"}));
}

#[test]
fn test_mask_processor_survives_without_mask() {
    let ws = TempWorkspace::new().unwrap();
    let (_, layer) = load_dem(&ws);
    let mut masked = layer.clone();
    masked.processors_mut().clear();
    masked.add_processor(nan_mask(Array2::from_elem(layer.value().dim(), false)));

    let mut figure = Figure2d::default();
    figure.add_maps(0, vec![masked]).unwrap();
    let exported = workflow_from_fig2d(&figure, &ExportOptions::default()).unwrap();
    let processors = &exported.spec().maps[0].processors;
    assert_eq!(processors.len(), 1);
    assert_eq!(processors[0].name, "nan_mask");
    assert!(!processors[0].params.contains_key("mask"));
}

#[test]
fn test_fig3d_export_replay_keeps_camera() {
    let ws = TempWorkspace::new().unwrap();
    let (dem_path, layer) = load_dem(&ws);

    let mut figure = Figure3d::default();
    figure.add_maps(vec![layer], None).unwrap();
    let camera = CameraPosition([80.0, -200.0, 300.0], [80.0, 80.0, 0.0], [0.0, 0.0, 1.0]);
    figure.set_camera_position(camera);

    let exported = workflow_from_fig3d(&figure, &rasterio_options()).unwrap();
    let text = exported.to_json_string().unwrap();
    let replay = Workflow::from_json_str(&text).unwrap().with_output_dir(ws.root());
    let fig3d = replay.spec().fig3d.as_ref().unwrap();
    assert_eq!(fig3d.camera_position, Some(camera));
    assert_eq!(fig3d.window_size, Some(figure.settings().window_size));

    let inputs = replay
        .resolve_inputs(&provided("dem_path", json!(dem_path.to_string_lossy())))
        .unwrap();
    let output = replay.run(&inputs, None).unwrap();
    assert!(output.fig2d.is_none());
    let rendered = output.fig3d.unwrap();
    assert_eq!(rendered.camera, camera);
    assert!(rendered.screenshot.exists());
    assert_eq!(rendered.figure.meshes().len(), figure.meshes().len());
}

#[test]
fn test_minimal_document_runs_with_npy_loader() {
    let ws = TempWorkspace::new().unwrap();
    let npy = ws.write_npy("dem.npy", &cone_dem(8, 8, 50.0)).unwrap();
    let mut doc = minimal_workflow_json(&npy.to_string_lossy(), "numpy");
    doc["fig2d"] = json!({"save_path": "map.png"});
    let workflow = Workflow::from_json_str(&doc.to_string())
        .unwrap()
        .with_output_dir(ws.root());

    workflow.validate_defaults().unwrap();
    let inputs = workflow.resolve_inputs(&Map::new()).unwrap();
    let output = workflow.run(&inputs, None).unwrap();
    let rendered = output.fig2d.unwrap();
    assert_eq!(rendered.saved.as_deref(), Some(ws.path("map.png").as_path()));
    assert!(ws.path("map.png").exists());
    assert_eq!(rendered.figure.axis(0).unwrap().images().len(), 2);
}
