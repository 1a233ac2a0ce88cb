//! Processor registry: maps serialized processor names to builders.
//!
//! Builders take the JSON parameter map stored in a workflow document and
//! return a configured [`Processor`]. The inverse direction is
//! [`Processor::params`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use topoviz_common::{Result, TopovizError};
use tracing::debug;

use crate::processor::Processor;
use crate::processors::{self, Hillshade, Multishade};

/// Builds a processor from its serialized parameters.
pub type ProcessorBuilder = Arc<dyn Fn(Map<String, Value>) -> Result<Processor> + Send + Sync>;

/// Registry of processor builders keyed by name.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    builders: HashMap<String, ProcessorBuilder>,
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("names", &self.names())
            .finish()
    }
}

/// Rebuild a factory-made processor with new parameters, keeping its flags.
///
/// Keys missing from `params` take the kind's default value.
fn rebuild(template: Processor) -> impl Fn(Map<String, Value>) -> Result<Processor> {
    move |params| {
        let mut processor = template.clone();
        processor.replace_params(params)?;
        Ok(processor)
    }
}

/// A preset that takes no parameters.
fn preset(factory: fn() -> Processor) -> impl Fn(Map<String, Value>) -> Result<Processor> {
    move |params| {
        let processor = factory();
        if let Some(key) = params.keys().next() {
            return Err(TopovizError::invalid_parameter(
                key.clone(),
                format!("'{}' takes no parameters", processor.name()),
            ));
        }
        Ok(processor)
    }
}

impl ProcessorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in processor and preset.
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        registry.register("nan_equal", rebuild(processors::nan_equal(0.0)));
        registry.register("nan_below", rebuild(processors::nan_below(0.0)));
        registry.register("nan_above", rebuild(processors::nan_above(0.0)));
        registry.register("nan_mask", rebuild(processors::nan_mask(Default::default())));
        registry.register(
            "gaussian_smooth",
            rebuild(processors::gaussian_smooth(1.0, Default::default())),
        );
        let shade = Hillshade::default();
        registry.register(
            "hillshade",
            rebuild(processors::hillshade_processor(
                shade.azimuth,
                shade.altitude,
                shade.exaggerate,
                shade.fused,
            )),
        );
        let multi = Multishade::default();
        registry.register(
            "multishade",
            rebuild(processors::multishade_processor(
                multi.azimuths,
                multi.altitude,
                multi.exaggerate,
                multi.fused,
            )),
        );
        registry.register("scale", rebuild(processors::scale(1.0)));
        registry.register(
            "lighting_control",
            rebuild(processors::lighting_control(Default::default())),
        );
        registry.register(
            "lighting_adjust",
            rebuild(processors::lighting_adjust(Default::default())),
        );

        let presets: [(&str, fn() -> Processor); 17] = [
            ("double_scale", processors::double_scale),
            ("halve_scale", processors::halve_scale),
            ("tenfold", processors::tenfold),
            ("tenthfold", processors::tenthfold),
            ("matte_lighting", processors::matte_lighting),
            ("glossy_lighting", processors::glossy_lighting),
            ("flat_lighting", processors::flat_lighting),
            ("dramatic_lighting", processors::dramatic_lighting),
            ("heightmap_lighting", processors::heightmap_lighting),
            ("lighting_intensity_up", processors::lighting_intensity_up),
            ("lighting_intensity_down", processors::lighting_intensity_down),
            ("lighting_brighten", processors::lighting_brighten),
            ("lighting_darken", processors::lighting_darken),
            ("light_rotate_left", processors::light_rotate_left),
            ("light_rotate_right", processors::light_rotate_right),
            ("light_raise", processors::light_raise),
            ("light_lower", processors::light_lower),
        ];
        for (name, factory) in presets {
            registry.register(name, preset(factory));
        }

        debug!(processors = registry.len(), "Processor registry loaded");
        registry
    }

    /// Register (or replace) a builder under `name`.
    pub fn register<F>(&mut self, name: &str, builder: F)
    where
        F: Fn(Map<String, Value>) -> Result<Processor> + Send + Sync + 'static,
    {
        self.builders.insert(name.to_string(), Arc::new(builder));
    }

    /// Register a custom processor as a template; replays overwrite its JSON params.
    pub fn register_template(&mut self, template: Processor) {
        let name = template.name().to_string();
        self.register(&name, rebuild(template));
    }

    /// Build the processor registered as `name` from serialized parameters.
    pub fn build(&self, name: &str, params: Map<String, Value>) -> Result<Processor> {
        let builder = self
            .builders
            .get(name)
            .ok_or_else(|| TopovizError::unknown("processor", name))?;
        builder(params)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{ParamValue, ProcessorFactory, Produced, RenderMode};
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_builtin_names() {
        let registry = ProcessorRegistry::builtin();
        for name in ["nan_below", "hillshade", "multishade", "scale", "tenfold", "light_raise"] {
            assert!(registry.contains(name), "missing {}", name);
        }
        assert_eq!(registry.len(), 27);
    }

    #[test]
    fn test_build_with_defaults_and_overrides() {
        let registry = ProcessorRegistry::builtin();
        let p = registry
            .build("hillshade", params(json!({"azimuth": 45.0})))
            .unwrap();
        assert_eq!(p.name(), "hillshade");
        assert_eq!(p.param("azimuth"), Some(json!(45.0)));
        assert_eq!(p.param("altitude"), Some(json!(50.0)));
        assert!(!p.recursive());
    }

    #[test]
    fn test_build_keeps_mode_flags() {
        let registry = ProcessorRegistry::builtin();
        let p = registry.build("scale", params(json!({"factor": 3.0}))).unwrap();
        assert!(!p.compatible_with(RenderMode::TwoD));
        let alias = registry.build("double_scale", Map::new()).unwrap();
        assert_eq!(alias.name(), "scale");
        assert_eq!(alias.param("factor"), Some(json!(2.0)));
    }

    #[test]
    fn test_unknown_processor() {
        let err = ProcessorRegistry::builtin().build("sharpen", Map::new()).unwrap_err();
        assert_eq!(err.error_code(), "UnknownIdentifierError");
    }

    #[test]
    fn test_bad_params() {
        let registry = ProcessorRegistry::builtin();
        let err = registry
            .build("nan_below", params(json!({"threshold": "low"})))
            .unwrap_err();
        assert!(matches!(err, TopovizError::InvalidParameter { .. }));
        let err = registry
            .build("tenfold", params(json!({"factor": 3.0})))
            .unwrap_err();
        assert!(matches!(err, TopovizError::InvalidParameter { .. }));
    }

    #[test]
    fn test_nan_equal_requires_target() {
        let registry = ProcessorRegistry::builtin();
        let err = registry.build("nan_equal", Map::new()).unwrap_err();
        assert_eq!(err.error_code(), "InvalidParameterError");
        assert!(err.to_string().contains("target"));

        let p = registry
            .build("nan_equal", params(json!({"target": -9999.0})))
            .unwrap();
        assert_eq!(p.param("target"), Some(json!(-9999.0)));
    }

    #[test]
    fn test_round_trip_of_builtin_params() {
        let registry = ProcessorRegistry::builtin();
        let original = processors::multishade_processor(vec![10.0, 190.0], 30.0, 2.0, false);
        let rebuilt = registry.build(original.name(), original.params()).unwrap();
        assert_eq!(rebuilt.params(), original.params());
    }

    #[test]
    fn test_custom_template() {
        let mut registry = ProcessorRegistry::new();
        registry.register_template(ProcessorFactory::build(
            "noop",
            |_, _| Ok(Produced::Empty),
            false,
            true,
            true,
            [("level", ParamValue::from(1.0))],
        ));
        let p = registry.build("noop", params(json!({"level": 4.0}))).unwrap();
        assert_eq!(p.param("level"), Some(json!(4.0)));
        assert!(!p.recursive());
    }
}
