//! Built-in processors.

pub mod filter;
pub mod helper3d;
pub mod mask;
pub mod shading;

pub use filter::{gaussian_smooth, GaussianSmooth};
pub use helper3d::{
    double_scale, dramatic_lighting, flat_lighting, glossy_lighting, halve_scale,
    heightmap_lighting, light_lower, light_raise, light_rotate_left, light_rotate_right,
    lighting_adjust, lighting_brighten, lighting_control, lighting_darken,
    lighting_intensity_down, lighting_intensity_up, matte_lighting, scale, tenfold, tenthfold,
    LightingAdjust, LightingControl, Scale,
};
pub use mask::{nan_above, nan_below, nan_equal, nan_mask, NanAbove, NanBelow, NanEqual, NanMask};
pub use shading::{
    hillshade, hillshade_processor, multishade, multishade_processor, smooth_hillshade,
    smooth_multishade, Hillshade, Multishade,
};
