//! Map layers and the processing pipeline that prepares them for rendering.
//!
//! A [`Layer`] wraps a [`RasterGrid`](topoviz_common::RasterGrid) with display
//! settings and an ordered list of [`Processor`]s. [`expand`] runs the
//! processors depth-first and returns the flat list of layers to draw;
//! [`expand_draped`] additionally resolves which layer supplies the 3D
//! geometry of each entry.
//!
//! # Example
//!
//! ```
//! use ndarray::array;
//! use pipeline::{expand, processors, Layer, RenderMode};
//! use topoviz_common::RasterGrid;
//!
//! let grid = RasterGrid::new(array![[1.0f32, 2.0], [3.0, 4.0]], 1.0);
//! let layer = Layer::builder(grid)
//!     .name("dem")
//!     .processor(processors::nan_below(2.5))
//!     .processor(processors::hillshade_processor(315.0, 50.0, 1.0, true))
//!     .build()
//!     .unwrap();
//!
//! let layers = expand(layer, RenderMode::TwoD).unwrap();
//! assert_eq!(layers.len(), 2);
//! assert_eq!(layers[0].name(), "dem");
//! assert!(layers[1].draped());
//! ```

pub mod expand;
pub mod layer;
pub mod processor;
pub mod processors;
pub mod registry;

pub use expand::{expand, expand_draped, DrapedExpansion, SurfaceRef};
pub use layer::{Layer, LayerBuilder, Lighting};
pub use processor::{
    ParamValue, Process, Processor, ProcessorFactory, ProcessorKind, Produced, RenderMode,
};
pub use registry::ProcessorRegistry;
