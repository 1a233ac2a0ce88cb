//! Workflow documents: declarative, replayable descriptions of a figure.
//!
//! A document declares runtime inputs, data sources that load grids through
//! named loaders, maps (layers with processor chains) and figure settings.
//! Parameters anywhere under `data_sources[*].params` or
//! `maps[*].processors[*].params` may be `{"$ref": "<input>"}` and are
//! substituted at run time.
//!
//! - [`spec`]: serde model of the JSON document
//! - [`inputs`]: input typing, defaults and `$ref` substitution
//! - [`loaders`]: the loader registry with GeoTIFF, `.npy` and inline readers
//! - [`workflow`]: materializing maps and driving the renderers
//! - [`export`]: turning live figures back into documents
//!
//! # Example
//!
//! ```
//! use serde_json::{json, Map};
//! use workflow::{RunMode, Workflow};
//!
//! let workflow = Workflow::from_json_str(&json!({
//!     "version": 1,
//!     "inputs": {"threshold": {"type": "float", "default": 2.5}},
//!     "data_sources": {
//!         "dem": {"loader": "array", "params": {"values": [[1, 2], [3, 4]]}}
//!     },
//!     "maps": [{"data": "dem", "processors": [
//!         {"name": "nan_below", "params": {"threshold": {"$ref": "threshold"}}}
//!     ]}]
//! }).to_string()).unwrap();
//!
//! let inputs = workflow.resolve_inputs(&Map::new()).unwrap();
//! let output = workflow.run(&inputs, Some(RunMode::Fig2d)).unwrap();
//! assert!(output.fig2d.is_some());
//! ```

pub mod export;
pub mod inputs;
pub mod loaders;
pub mod spec;
pub mod workflow;

pub use export::{
    map_spec_from_layer, specs_from_layers, workflow_from_fig2d, workflow_from_fig3d,
    ExportOptions, ExportedMaps, DEFAULT_LOADER,
};
pub use inputs::{loader_inputs, resolve_inputs, resolve_param, validate_defaults, InputType, REF_KEY};
pub use loaders::{Loader, LoaderRegistry};
pub use spec::{
    DataSourceSpec, Fig2dSpec, Fig3dSpec, InputSpec, MapSpec, NamedMap, ProcessorSpec, RunMode,
    RunSpec, WorkflowSpec, WORKFLOW_VERSION,
};
pub use workflow::{Rendered2d, Rendered3d, RunOutput, Workflow, DEFAULT_SCREENSHOT_PATH};
