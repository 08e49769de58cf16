//! Edit intents
//!
//! The closed set of edits the system can execute. Each variant carries its
//! own parameter shape; dispatching on an intent is always a total match.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::image::ImageRef;
use crate::domain::operation::OperationType;

/// Features the prompt router can dispatch to
pub const SUPPORTED_FEATURES: [&str; 6] = [
    "relight",
    "enhance",
    "face_restore",
    "style_transfer",
    "remove_background",
    "object_removal",
];

/// Styles the style-transfer unit ships models for
pub const STYLES: [&str; 5] = ["candy", "mosaic", "rain_princess", "udnie", "starry_night"];

pub const DEFAULT_BRIGHTNESS: f32 = 1.0;
pub const DEFAULT_FIDELITY: f32 = 0.7;
pub const DEFAULT_STYLE: &str = "candy";

/// Segmentation model family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    Human,
    General,
}

impl ModelVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelVariant::Human => "human",
            ModelVariant::General => "general",
        }
    }
}

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModelVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "human" | "person" | "portrait" => Ok(ModelVariant::Human),
            "general" | "object" => Ok(ModelVariant::General),
            other => Err(format!("Unknown model type: {}", other)),
        }
    }
}

/// Where light should come from when relighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LightDirection {
    #[default]
    Front,
    Left,
    Right,
    Top,
    Bottom,
}

impl LightDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            LightDirection::Front => "front",
            LightDirection::Left => "left",
            LightDirection::Right => "right",
            LightDirection::Top => "top",
            LightDirection::Bottom => "bottom",
        }
    }
}

impl std::str::FromStr for LightDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "front" => Ok(LightDirection::Front),
            "left" => Ok(LightDirection::Left),
            "right" => Ok(LightDirection::Right),
            "top" | "above" => Ok(LightDirection::Top),
            "bottom" | "below" => Ok(LightDirection::Bottom),
            other => Err(format!("Unknown light direction: {}", other)),
        }
    }
}

/// Restoration task for the enhance unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnhanceMode {
    #[default]
    Denoise,
    Deblur,
}

impl EnhanceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnhanceMode::Denoise => "denoise",
            EnhanceMode::Deblur => "deblur",
        }
    }
}

impl std::str::FromStr for EnhanceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "denoise" => Ok(EnhanceMode::Denoise),
            "deblur" => Ok(EnhanceMode::Deblur),
            other => Err(format!("Unknown enhance mode: {}", other)),
        }
    }
}

/// A typed edit request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Intent {
    Relight {
        #[serde(default = "default_brightness")]
        brightness: f32,
        #[serde(default)]
        direction: LightDirection,
    },
    Enhance {
        #[serde(default)]
        mode: EnhanceMode,
    },
    FaceRestore {
        #[serde(default = "default_fidelity")]
        fidelity: f32,
    },
    StyleTransfer {
        style: String,
    },
    RemoveBackground {
        #[serde(default)]
        model_type: Option<ModelVariant>,
    },
    ObjectRemoval {
        x: u32,
        y: u32,
    },
    BackgroundReplace {
        background: ImageRef,
        #[serde(default)]
        model_type: Option<ModelVariant>,
    },
}

fn default_brightness() -> f32 {
    DEFAULT_BRIGHTNESS
}

fn default_fidelity() -> f32 {
    DEFAULT_FIDELITY
}

/// Reasons a requested feature cannot become an intent
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntentError {
    #[error("Feature '{0}' is not supported")]
    Unsupported(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

impl Intent {
    /// Operation type recorded in history for this intent
    pub fn operation_type(&self) -> OperationType {
        match self {
            Intent::Relight { .. } => OperationType::Relight,
            Intent::Enhance { .. } => OperationType::Enhance,
            Intent::FaceRestore { .. } => OperationType::FaceRestore,
            Intent::StyleTransfer { .. } => OperationType::StyleTransfer,
            Intent::RemoveBackground { .. } => OperationType::RemoveBackground,
            Intent::ObjectRemoval { .. } => OperationType::ObjectRemoval,
            Intent::BackgroundReplace { .. } => OperationType::BackgroundReplace,
        }
    }

    /// Parameter payload stored alongside the operation
    pub fn parameters(&self) -> Map<String, Value> {
        let mut map = Map::new();
        match self {
            Intent::Relight {
                brightness,
                direction,
            } => {
                map.insert("brightness".into(), Value::from(*brightness as f64));
                map.insert("direction".into(), Value::from(direction.as_str()));
            }
            Intent::Enhance { mode } => {
                map.insert("mode".into(), Value::from(mode.as_str()));
            }
            Intent::FaceRestore { fidelity } => {
                map.insert("fidelity".into(), Value::from(*fidelity as f64));
            }
            Intent::StyleTransfer { style } => {
                map.insert("style".into(), Value::from(style.as_str()));
            }
            Intent::RemoveBackground { model_type } => {
                if let Some(model_type) = model_type {
                    map.insert("model_type".into(), Value::from(model_type.as_str()));
                }
            }
            Intent::ObjectRemoval { x, y } => {
                map.insert("x".into(), Value::from(*x));
                map.insert("y".into(), Value::from(*y));
            }
            Intent::BackgroundReplace {
                background,
                model_type,
            } => {
                map.insert("background_id".into(), Value::from(background.id.as_str()));
                map.insert("background_url".into(), Value::from(background.url.as_str()));
                if let Some(model_type) = model_type {
                    map.insert("model_type".into(), Value::from(model_type.as_str()));
                }
            }
        }
        map
    }

    /// Checks parameter ranges
    pub fn validate(&self) -> Result<(), IntentError> {
        match self {
            Intent::Relight { brightness, .. } => {
                if !brightness.is_finite() || !(0.0..=2.0).contains(brightness) {
                    return Err(IntentError::InvalidParameters(format!(
                        "brightness must be within 0.0..=2.0, got {}",
                        brightness
                    )));
                }
            }
            Intent::FaceRestore { fidelity } => {
                if !fidelity.is_finite() || !(0.0..=1.0).contains(fidelity) {
                    return Err(IntentError::InvalidParameters(format!(
                        "fidelity must be within 0.0..=1.0, got {}",
                        fidelity
                    )));
                }
            }
            Intent::StyleTransfer { style } => {
                if !STYLES.contains(&style.as_str()) {
                    return Err(IntentError::InvalidParameters(format!(
                        "unknown style '{}', expected one of {}",
                        style,
                        STYLES.join(", ")
                    )));
                }
            }
            Intent::BackgroundReplace { background, .. } => {
                if background.url.trim().is_empty() {
                    return Err(IntentError::InvalidParameters(
                        "background url cannot be empty".to_string(),
                    ));
                }
            }
            Intent::Enhance { .. } | Intent::RemoveBackground { .. } | Intent::ObjectRemoval { .. } => {}
        }
        Ok(())
    }

    /// Builds an intent from a classified feature name and loose parameters
    ///
    /// Numeric parameters are clamped into range and missing ones take their
    /// defaults. Features outside [`SUPPORTED_FEATURES`] are rejected.
    pub fn from_route(feature: &str, params: &Map<String, Value>) -> Result<Intent, IntentError> {
        let normalized = feature.trim().to_lowercase().replace(['-', ' '], "_");

        let intent = match normalized.as_str() {
            "relight" | "relighting" => Intent::Relight {
                brightness: number(params, "brightness")
                    .map(|b| (b as f32).clamp(0.0, 2.0))
                    .unwrap_or(DEFAULT_BRIGHTNESS),
                direction: text(params, "direction")
                    .and_then(|d| d.parse().ok())
                    .unwrap_or_default(),
            },
            "enhance" => Intent::Enhance {
                mode: text(params, "mode")
                    .and_then(|m| m.parse().ok())
                    .unwrap_or_default(),
            },
            "denoise" => Intent::Enhance {
                mode: EnhanceMode::Denoise,
            },
            "deblur" => Intent::Enhance {
                mode: EnhanceMode::Deblur,
            },
            "face_restore" | "face_restoration" => Intent::FaceRestore {
                fidelity: number(params, "fidelity")
                    .map(|f| (f as f32).clamp(0.0, 1.0))
                    .unwrap_or(DEFAULT_FIDELITY),
            },
            "style_transfer" => Intent::StyleTransfer {
                style: text(params, "style")
                    .map(|s| s.trim().to_lowercase().replace([' ', '-'], "_"))
                    .filter(|s| STYLES.contains(&s.as_str()))
                    .unwrap_or_else(|| DEFAULT_STYLE.to_string()),
            },
            "remove_background" | "background_removal" => Intent::RemoveBackground {
                model_type: text(params, "model_type").and_then(|m| m.parse().ok()),
            },
            "object_removal" | "remove_object" => {
                let x = coordinate(params, "x")?;
                let y = coordinate(params, "y")?;
                Intent::ObjectRemoval { x, y }
            }
            _ => return Err(IntentError::Unsupported(feature.to_string())),
        };

        intent.validate()?;
        Ok(intent)
    }
}

fn number(params: &Map<String, Value>, key: &str) -> Option<f64> {
    match params.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text<'a>(params: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn coordinate(params: &Map<String, Value>, key: &str) -> Result<u32, IntentError> {
    let value = number(params, key).ok_or_else(|| {
        IntentError::InvalidParameters(format!("object removal requires numeric '{}'", key))
    })?;
    if !value.is_finite() || value < 0.0 {
        return Err(IntentError::InvalidParameters(format!(
            "'{}' must be a non-negative pixel coordinate",
            key
        )));
    }
    Ok(value.round() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_from_route_relight_clamps_brightness() {
        let intent = Intent::from_route("relight", &params(json!({ "brightness": 7.5 }))).unwrap();
        assert_eq!(
            intent,
            Intent::Relight {
                brightness: 2.0,
                direction: LightDirection::Front
            }
        );
    }

    #[test]
    fn test_from_route_aliases() {
        let deblur = Intent::from_route("Deblur", &Map::new()).unwrap();
        assert_eq!(
            deblur,
            Intent::Enhance {
                mode: EnhanceMode::Deblur
            }
        );

        let removal = Intent::from_route("remove-background", &params(json!({ "model_type": "human" })))
            .unwrap();
        assert_eq!(
            removal,
            Intent::RemoveBackground {
                model_type: Some(ModelVariant::Human)
            }
        );
    }

    #[test]
    fn test_from_route_unknown_style_falls_back() {
        let intent = Intent::from_route("style_transfer", &params(json!({ "style": "cubism" }))).unwrap();
        assert_eq!(
            intent,
            Intent::StyleTransfer {
                style: DEFAULT_STYLE.to_string()
            }
        );
    }

    #[test]
    fn test_from_route_object_removal_requires_point() {
        let err = Intent::from_route("object_removal", &params(json!({ "x": 10 }))).unwrap_err();
        assert!(matches!(err, IntentError::InvalidParameters(_)));

        let ok = Intent::from_route("object_removal", &params(json!({ "x": "12", "y": 30.4 }))).unwrap();
        assert_eq!(ok, Intent::ObjectRemoval { x: 12, y: 30 });
    }

    #[test]
    fn test_from_route_unsupported() {
        let err = Intent::from_route("colorize", &Map::new()).unwrap_err();
        assert_eq!(err, IntentError::Unsupported("colorize".to_string()));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(Intent::FaceRestore { fidelity: 1.5 }.validate().is_err());
        assert!(
            Intent::StyleTransfer {
                style: "cubism".to_string()
            }
            .validate()
            .is_err()
        );
        assert!(Intent::ObjectRemoval { x: 1, y: 2 }.validate().is_ok());
    }

    #[test]
    fn test_intent_deserializes_with_defaults() {
        let intent: Intent = serde_json::from_value(json!({ "kind": "relight" })).unwrap();
        assert_eq!(
            intent,
            Intent::Relight {
                brightness: DEFAULT_BRIGHTNESS,
                direction: LightDirection::Front
            }
        );
        assert_eq!(intent.operation_type(), OperationType::Relight);
    }

    #[test]
    fn test_parameters_payload() {
        let intent = Intent::ObjectRemoval { x: 4, y: 9 };
        assert_eq!(Value::Object(intent.parameters()), json!({ "x": 4, "y": 9 }));
    }
}
