//! Post-render 2D axis actions, as recorded on figures and replayed from
//! workflow documents.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use topoviz_common::{Result, TopovizError};

use crate::colormap::ColorSpec;

/// Action type names understood by [`Fig2dAction::from_value`].
pub const ACTION_TYPES: [&str; 7] = [
    "title",
    "xlabel",
    "ylabel",
    "xlim",
    "ylim",
    "convert_ticks_to_km",
    "add_grid_crosses",
];

/// Horizontal placement of an axis title.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TitleLoc {
    Left,
    #[default]
    Center,
    Right,
}

impl TitleLoc {
    pub const ALL: [TitleLoc; 3] = [TitleLoc::Left, TitleLoc::Center, TitleLoc::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            TitleLoc::Left => "left",
            TitleLoc::Center => "center",
            TitleLoc::Right => "right",
        }
    }
}

/// Which axes a tick conversion applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickAxes {
    X,
    Y,
    #[default]
    Both,
}

impl TickAxes {
    pub fn includes_x(&self) -> bool {
        matches!(self, TickAxes::X | TickAxes::Both)
    }

    pub fn includes_y(&self) -> bool {
        matches!(self, TickAxes::Y | TickAxes::Both)
    }
}

/// Marker style of grid crosses drawn at tick intersections.
///
/// Crosses on minor ticks are drawn at 60% size and 20% opacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridCrossStyle {
    pub color: ColorSpec,
    /// Marker size in points.
    pub size: f64,
    /// Stroke width in points.
    pub linewidth: f64,
    pub alpha: f64,
    pub include_minor: bool,
}

impl Default for GridCrossStyle {
    fn default() -> Self {
        Self {
            color: ColorSpec::named("black"),
            size: 5.0,
            linewidth: 1.0,
            alpha: 0.47,
            include_minor: true,
        }
    }
}

/// A single axis action. `axis` indexes the figure's axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Fig2dAction {
    Title {
        #[serde(default)]
        axis: usize,
        #[serde(default)]
        text: String,
        #[serde(default)]
        loc: TitleLoc,
    },
    Xlabel {
        #[serde(default)]
        axis: usize,
        #[serde(default)]
        text: String,
    },
    Ylabel {
        #[serde(default)]
        axis: usize,
        #[serde(default)]
        text: String,
    },
    Xlim {
        #[serde(default)]
        axis: usize,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Ylim {
        #[serde(default)]
        axis: usize,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    ConvertTicksToKm {
        #[serde(default)]
        axis: usize,
        #[serde(default)]
        axes: TickAxes,
    },
    AddGridCrosses {
        #[serde(default)]
        axis: usize,
        #[serde(flatten)]
        style: GridCrossStyle,
    },
}

impl Fig2dAction {
    /// Decode an action object from a workflow document.
    ///
    /// A missing or unknown `type` is an `UnknownIdentifier` error; malformed
    /// fields (including a negative axis) are `InvalidParameter`.
    pub fn from_value(value: &Value) -> Result<Self> {
        let kind = value.get("type").and_then(Value::as_str).unwrap_or("");
        if !ACTION_TYPES.contains(&kind) {
            return Err(TopovizError::unknown("fig2d action", kind));
        }
        serde_json::from_value(value.clone())
            .map_err(|e| TopovizError::invalid_parameter(format!("{} action", kind), e.to_string()))
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn axis(&self) -> usize {
        match self {
            Fig2dAction::Title { axis, .. }
            | Fig2dAction::Xlabel { axis, .. }
            | Fig2dAction::Ylabel { axis, .. }
            | Fig2dAction::Xlim { axis, .. }
            | Fig2dAction::Ylim { axis, .. }
            | Fig2dAction::ConvertTicksToKm { axis, .. }
            | Fig2dAction::AddGridCrosses { axis, .. } => *axis,
        }
    }

    /// The same action targeting another axis.
    pub fn with_axis(mut self, index: usize) -> Self {
        match &mut self {
            Fig2dAction::Title { axis, .. }
            | Fig2dAction::Xlabel { axis, .. }
            | Fig2dAction::Ylabel { axis, .. }
            | Fig2dAction::Xlim { axis, .. }
            | Fig2dAction::Ylim { axis, .. }
            | Fig2dAction::ConvertTicksToKm { axis, .. }
            | Fig2dAction::AddGridCrosses { axis, .. } => *axis = index,
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let action = Fig2dAction::from_value(&json!({"type": "add_grid_crosses", "size": 8})).unwrap();
        match action {
            Fig2dAction::AddGridCrosses { axis, style } => {
                assert_eq!(axis, 0);
                assert_eq!(style.size, 8.0);
                assert_eq!(style.alpha, 0.47);
                assert!(style.include_minor);
            }
            other => panic!("unexpected {:?}", other),
        }
        let title = Fig2dAction::from_value(&json!({"type": "title", "text": "DEM"})).unwrap();
        assert_eq!(
            title,
            Fig2dAction::Title {
                axis: 0,
                text: "DEM".into(),
                loc: TitleLoc::Center
            }
        );
    }

    #[test]
    fn test_unknown_type() {
        let err = Fig2dAction::from_value(&json!({"type": "legend"})).unwrap_err();
        assert_eq!(err.error_code(), "UnknownIdentifierError");
        let err = Fig2dAction::from_value(&json!({"text": "no type"})).unwrap_err();
        assert_eq!(err.error_code(), "UnknownIdentifierError");
    }

    #[test]
    fn test_malformed_fields() {
        let err = Fig2dAction::from_value(&json!({"type": "xlim", "axis": -1})).unwrap_err();
        assert_eq!(err.error_code(), "InvalidParameterError");
        let err = Fig2dAction::from_value(&json!({"type": "convert_ticks_to_km", "axes": "z"})).unwrap_err();
        assert_eq!(err.error_code(), "InvalidParameterError");
    }

    #[test]
    fn test_serialized_shape() {
        let value = Fig2dAction::ConvertTicksToKm {
            axis: 1,
            axes: TickAxes::Y,
        }
        .to_value()
        .unwrap();
        assert_eq!(value, json!({"type": "convert_ticks_to_km", "axis": 1, "axes": "y"}));

        let crosses = Fig2dAction::AddGridCrosses {
            axis: 0,
            style: GridCrossStyle::default(),
        }
        .to_value()
        .unwrap();
        assert_eq!(crosses["color"], json!("black"));
        assert_eq!(crosses["include_minor"], json!(true));
        assert_eq!(Fig2dAction::from_value(&crosses).unwrap().axis(), 0);
    }
}
