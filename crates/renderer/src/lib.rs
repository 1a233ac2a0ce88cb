//! Figure rendering for map layers.
//!
//! - [`fig2d`]: georeferenced raster compositing with axis actions
//! - [`fig3d`]: height-mapped meshes with surface draping and lighting
//! - [`colormap`]: named colormaps and value colorization
//! - [`png`]: PNG encoding with text metadata

pub mod actions;
pub mod colormap;
pub mod fig2d;
pub mod fig3d;
pub mod png;

pub use actions::{Fig2dAction, GridCrossStyle, TickAxes, TitleLoc};
pub use colormap::{Color, ColorSpec, Colormap};
pub use fig2d::{finalize_figsize, quickmap, Fig2dSettings, Figure2d};
pub use fig3d::{quickmap3d, CameraPosition, Fig3dSettings, Figure3d, Mesh};
