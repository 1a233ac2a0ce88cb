//! End-to-end tests for layers, processors and expansion.
//!
//! Covers:
//! - Display bound invariants after value reassignment
//! - Expansion order across nested derived layers
//! - Shading of NaN-masked and fully masked layers
//! - Registry replay of serialized processor chains

use std::collections::HashMap;

use ndarray::{array, Array2};
use pipeline::processors::{self, LightingControl};
use pipeline::{expand, expand_draped, Layer, Produced, ProcessorFactory, ProcessorRegistry, RenderMode};
use test_utils::{all_nan_dem, assert_nan_aware_eq, cone_dem, count_nan, dem_with_nan_hole, ramp_dem};
use topoviz_common::{BoundaryMode, RasterGrid};

// ============================================================================
// Helper functions
// ============================================================================

fn dem_layer(name: &str, z: Array2<f32>) -> Layer {
    Layer::builder(RasterGrid::new(z, 10.0))
        .name(name)
        .build()
        .unwrap()
}

// ============================================================================
// Layer invariants
// ============================================================================

#[test]
fn test_bounds_follow_every_reassignment() {
    let mut layer = dem_layer("dem", cone_dem(9, 9, 40.0));
    for values in [
        ramp_dem(4, 3, 2.5),
        dem_with_nan_hole(6, (0, 0, 3)),
        array![[f32::INFINITY, -3.0], [f32::NAN, 8.0]],
    ] {
        layer.set_value(values);
        let finite: Vec<f32> = layer.value().iter().copied().filter(|v| v.is_finite()).collect();
        let min = finite.iter().copied().fold(f32::INFINITY, f32::min) as f64;
        let max = finite.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
        assert_eq!(layer.vmin(), min);
        assert_eq!(layer.vmax(), max);
        assert!(layer.value().iter().all(|v| v.is_finite() || v.is_nan()));
    }

    layer.set_value(all_nan_dem(2, 2));
    assert!(layer.vmin().is_nan() && layer.vmax().is_nan());
}

#[test]
fn test_same_name_is_same_key() {
    let a = dem_layer("shared", cone_dem(4, 4, 1.0));
    let b = dem_layer("shared", ramp_dem(8, 2, 1.0));
    let mut handles: HashMap<Layer, usize> = HashMap::new();
    handles.insert(a, 1);
    handles.insert(b, 2);
    assert_eq!(handles.len(), 1);
}

// ============================================================================
// Expansion
// ============================================================================

#[test]
fn test_children_expand_contiguously() {
    // Each shade gets its own mask, so nested processors must run before the sibling
    let mut root = dem_layer("root", cone_dem(12, 12, 100.0));
    let tagger = |tag: &'static str| {
        ProcessorFactory::build(
            tag,
            move |_, layer| {
                let mut shade = processors::hillshade(
                    layer,
                    &Default::default(),
                    0.45,
                )?;
                shade.add_processor(processors::nan_above(0.99));
                Ok(Produced::Many(vec![shade.clone(), shade]))
            },
            false,
            true,
            true,
            Vec::<(String, pipeline::ParamValue)>::new(),
        )
    };
    root.add_processor(tagger("first"));
    root.add_processor(processors::nan_below(50.0));
    root.add_processor(tagger("second"));

    let out = expand(root, RenderMode::TwoD).unwrap();
    assert_eq!(out.len(), 5);
    assert_eq!(out[0].name(), "root");
    assert!(out[1..].iter().all(Layer::draped));
    // The second pair was shaded after masking, so it carries the mask
    assert!(count_nan(out[3].value()) > count_nan(out[1].value()));
}

#[test]
fn test_three_d_chain() {
    let layer = Layer::builder(RasterGrid::new(cone_dem(10, 10, 80.0), 5.0))
        .name("relief")
        .processor(processors::tenfold())
        .processor(processors::lighting_control(LightingControl::dramatic()))
        .processor(processors::multishade_processor(vec![315.0, 45.0], 45.0, 1.0, true))
        .build()
        .unwrap();

    let two_d = expand(layer.clone(), RenderMode::TwoD).unwrap();
    assert_eq!(two_d.len(), 2);
    assert_eq!(two_d[0].z_scale_factor(), 1.0);

    let three_d = expand_draped(layer, RenderMode::ThreeD, None).unwrap();
    let pairs: Vec<_> = three_d.pairs().collect();
    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[0].0.z_scale_factor(), 10.0);
    assert_eq!(pairs[0].0.lighting().light_elevation, Some(20.0));
    assert_eq!(pairs[1].1.name(), "relief");
}

#[test]
fn test_expansion_is_deterministic() {
    let build = || {
        Layer::builder(RasterGrid::new(dem_with_nan_hole(16, (4, 4, 4)), 1.0))
            .name("dem")
            .processor(processors::gaussian_smooth(1.0, BoundaryMode::Reflect))
            .processor(processors::hillshade_processor(270.0, 30.0, 2.0, false))
            .build()
            .unwrap()
    };
    let a = expand(build(), RenderMode::TwoD).unwrap();
    let b = expand(build(), RenderMode::TwoD).unwrap();
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_nan_aware_eq!(x.value().view(), y.value().view(), 0.0);
    }
}

#[test]
fn test_hillshade_of_fully_masked_layer() {
    let mut layer = dem_layer("dem", cone_dem(8, 8, 30.0));
    layer.add_processor(processors::nan_above(-1.0));
    layer.add_processor(processors::hillshade_processor(315.0, 50.0, 1.0, true));
    let out = expand(layer, RenderMode::TwoD).unwrap();
    assert_eq!(count_nan(out[0].value()), 64);
    assert!(out[1].value().iter().any(|v| v.is_finite()));
}

// ============================================================================
// Registry replay
// ============================================================================

#[test]
fn test_registry_replays_processor_chain() {
    let chain = vec![
        processors::nan_equal(-9999.0),
        processors::gaussian_smooth(2.0, BoundaryMode::Wrap),
        processors::hillshade_processor(200.0, 35.0, 1.5, false),
        processors::halve_scale(),
        processors::light_rotate_right(),
    ];
    let registry = ProcessorRegistry::builtin();
    for original in &chain {
        let replayed = registry.build(original.name(), original.params()).unwrap();
        assert_eq!(replayed.name(), original.name());
        assert_eq!(replayed.params(), original.params());
        assert_eq!(replayed.compatible_2d(), original.compatible_2d());
        assert_eq!(replayed.recursive(), original.recursive());
    }
}
