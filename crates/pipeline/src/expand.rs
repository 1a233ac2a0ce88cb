//! Depth-first expansion of a layer's processor chain into render order.
//!
//! A layer is listed before anything derived from it. Each processor runs
//! in attachment order; the layers it produces are fully expanded (their own
//! processors included) before the next processor of the parent runs.

use topoviz_common::Result;
use tracing::debug;

use crate::layer::Layer;
use crate::processor::RenderMode;

/// Where a layer placed in 3D takes its geometry from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceRef {
    /// Another entry of the same expansion (possibly itself).
    Entry(usize),
    /// The override surface supplied to [`expand_draped`].
    Override,
}

/// Flat render list of a 3D expansion with each layer's geometry source.
#[derive(Debug, Clone)]
pub struct DrapedExpansion {
    entries: Vec<(Layer, SurfaceRef)>,
    override_surface: Option<Layer>,
}

impl DrapedExpansion {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Layers in render order.
    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.entries.iter().map(|(layer, _)| layer)
    }

    pub fn surface_refs(&self) -> impl Iterator<Item = SurfaceRef> + '_ {
        self.entries.iter().map(|(_, surface)| *surface)
    }

    /// `(layer, surface)` pairs in render order.
    pub fn pairs(&self) -> impl Iterator<Item = (&Layer, &Layer)> {
        self.entries.iter().map(move |(layer, surface)| {
            let geometry = match surface {
                SurfaceRef::Entry(idx) => &self.entries[*idx].0,
                SurfaceRef::Override => self.override_surface.as_ref().unwrap_or(layer),
            };
            (layer, geometry)
        })
    }

    pub fn into_layers(self) -> Vec<Layer> {
        self.entries.into_iter().map(|(layer, _)| layer).collect()
    }
}

fn walk(
    layer: Layer,
    inherited: SurfaceRef,
    mode: RenderMode,
    depth: usize,
    out: &mut Vec<(Layer, SurfaceRef)>,
) -> Result<()> {
    let idx = out.len();
    let surface = if layer.draped() {
        inherited
    } else {
        SurfaceRef::Entry(idx)
    };
    debug!(layer = %layer.name(), depth, draped = layer.draped(), %mode, "Expanding layer");

    let processors = layer.processors().to_vec();
    out.push((layer, surface));

    for processor in processors.iter().filter(|p| p.compatible_with(mode)) {
        let produced = processor.apply(&mut out[idx].0)?;
        debug!(
            layer = %out[idx].0.name(),
            processor = %processor.name(),
            produced = produced.len(),
            "Applied processor"
        );
        for child in produced {
            walk(child, surface, mode, depth + 1, out)?;
        }
    }
    Ok(())
}

/// Apply `layer`'s processors for `mode` and collect every layer to render.
///
/// The result starts with `layer` itself (after its in-place mutations).
pub fn expand(layer: Layer, mode: RenderMode) -> Result<Vec<Layer>> {
    let mut out = Vec::new();
    walk(layer, SurfaceRef::Entry(0), mode, 0, &mut out)?;
    Ok(out.into_iter().map(|(layer, _)| layer).collect())
}

/// Like [`expand`], also resolving each layer's 3D surface.
///
/// A non-draped layer is its own surface. A draped layer uses the surface
/// of its nearest non-draped ancestor. A draped root uses `surface_override`
/// when given, else itself.
pub fn expand_draped(
    layer: Layer,
    mode: RenderMode,
    surface_override: Option<Layer>,
) -> Result<DrapedExpansion> {
    let inherited = if surface_override.is_some() {
        SurfaceRef::Override
    } else {
        SurfaceRef::Entry(0)
    };
    let mut entries = Vec::new();
    walk(layer, inherited, mode, 0, &mut entries)?;
    Ok(DrapedExpansion {
        entries,
        override_surface: surface_override,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{Produced, ProcessorFactory};
    use crate::processors::{hillshade_processor, nan_below, scale};
    use ndarray::array;
    use test_utils::assert_nan_aware_eq;
    use topoviz_common::RasterGrid;

    fn named(name: &str) -> Layer {
        Layer::builder(RasterGrid::new(array![[1.0f32, 2.0], [3.0, 4.0]], 1.0))
            .name(name)
            .build()
            .unwrap()
    }

    /// A processor spawning one named child that carries `child_processors`.
    fn spawn(child: &'static str, draped: bool, nested: Vec<crate::Processor>) -> crate::Processor {
        ProcessorFactory::build(
            "spawn",
            move |_, parent| {
                let mut layer = Layer::builder(parent.grid().clone())
                    .name(child)
                    .draped(draped)
                    .build()?;
                for p in &nested {
                    layer.add_processor(p.clone());
                }
                Ok(Produced::Single(layer))
            },
            false,
            true,
            true,
            Vec::<(String, crate::ParamValue)>::new(),
        )
    }

    fn names(layers: &[Layer]) -> Vec<&str> {
        layers.iter().map(Layer::name).collect()
    }

    #[test]
    fn test_mask_below_scenario() {
        let mut layer = named("dem");
        layer.add_processor(nan_below(2.5));
        let out = expand(layer, RenderMode::TwoD).unwrap();
        assert_eq!(out.len(), 1);
        assert_nan_aware_eq!(
            out[0].value().view(),
            array![[f32::NAN, f32::NAN], [3.0, 4.0]].view(),
            0.0
        );
    }

    #[test]
    fn test_depth_first_order() {
        let mut root = named("root");
        root.add_processor(spawn("a", false, vec![spawn("a1", false, vec![]), spawn("a2", false, vec![])]));
        root.add_processor(spawn("b", false, vec![spawn("b1", false, vec![])]));
        let out = expand(root, RenderMode::Any).unwrap();
        assert_eq!(names(&out), vec!["root", "a", "a1", "a2", "b", "b1"]);
    }

    #[test]
    fn test_mode_filtering_skips_processors() {
        let mut root = named("root");
        root.add_processor(scale(3.0));
        root.add_processor(spawn("child", false, vec![]));
        let flat = expand(root.clone(), RenderMode::TwoD).unwrap();
        assert_eq!(flat[0].z_scale_factor(), 1.0);
        assert_eq!(flat.len(), 2);

        let relief = expand(root, RenderMode::ThreeD).unwrap();
        assert_eq!(relief[0].z_scale_factor(), 3.0);
    }

    #[test]
    fn test_in_place_mutation_visible_to_later_processors() {
        let mut root = named("root");
        root.add_processor(nan_below(1.5));
        root.add_processor(hillshade_processor(315.0, 50.0, 1.0, true));
        let out = expand(root, RenderMode::TwoD).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[1].value()[[0, 0]].is_nan());
        assert!(out[1].draped());
    }

    #[test]
    fn test_processor_errors_propagate() {
        let mut root = named("root");
        root.add_processor(crate::processors::multishade_processor(vec![1.0], 50.0, 1.0, true));
        assert!(expand(root, RenderMode::TwoD).is_err());
    }

    #[test]
    fn test_draped_layers_inherit_surface() {
        let mut root = named("root");
        root.add_processor(spawn("shade", true, vec![spawn("shade2", true, vec![])]));
        root.add_processor(spawn("solid", false, vec![spawn("over", true, vec![])]));
        let expansion = expand_draped(root, RenderMode::ThreeD, None).unwrap();

        let pairs: Vec<(&str, &str)> = expansion
            .pairs()
            .map(|(layer, surface)| (layer.name(), surface.name()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("root", "root"),
                ("shade", "root"),
                ("shade2", "root"),
                ("solid", "solid"),
                ("over", "solid"),
            ]
        );
    }

    #[test]
    fn test_surface_override_for_draped_root() {
        let mut root = named("drape");
        root.set_draped(true);
        root.add_processor(spawn("child", true, vec![]));
        let expansion = expand_draped(root, RenderMode::ThreeD, Some(named("terrain"))).unwrap();
        let surfaces: Vec<&str> = expansion.pairs().map(|(_, s)| s.name()).collect();
        assert_eq!(surfaces, vec!["terrain", "terrain"]);
    }

    #[test]
    fn test_surface_sees_later_parent_mutations() {
        let mut root = named("root");
        root.add_processor(hillshade_processor(315.0, 50.0, 1.0, true));
        root.add_processor(scale(2.0));
        let expansion = expand_draped(root, RenderMode::ThreeD, None).unwrap();
        let (_, surface) = expansion.pairs().nth(1).unwrap();
        assert_eq!(surface.z_scale_factor(), 2.0);
    }
}
