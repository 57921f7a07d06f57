//! Serialized forms of rules, actions and candidates.
//!
//! These mirror the JSON files written by the rule editor: coordinates and
//! colors are usually strings there, so numeric fields accept either form.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionKind, ActionList};
use crate::detector::{DetectionSpec, ImageSpec, PixelSpec};
use crate::error::RecordError;
use crate::logger;
use crate::matcher::{ColorMode, MatchMethod};
use crate::types::{Point, Rgb};

/// Integer written either as a JSON number or as a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumOrText {
    Num(i64),
    Text(String),
}

impl NumOrText {
    fn to_i32(&self, field: &'static str) -> Result<i32, RecordError> {
        let bad = || RecordError::BadNumber { field, value: self.to_string() };
        match self {
            NumOrText::Num(n) => i32::try_from(*n).map_err(|_| bad()),
            NumOrText::Text(s) => s.trim().parse().map_err(|_| bad()),
        }
    }
}

impl std::fmt::Display for NumOrText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumOrText::Num(n) => write!(f, "{}", n),
            NumOrText::Text(s) => f.write_str(s),
        }
    }
}

/// Parse "r, g, b".
pub fn parse_rgb(text: &str) -> Result<Rgb, RecordError> {
    let bad = || RecordError::BadColor(text.to_string());
    let parts: Vec<u8> = text
        .split(',')
        .map(|p| p.trim().parse::<u8>())
        .collect::<Result<_, _>>()
        .map_err(|_| bad())?;
    match parts[..] {
        [r, g, b] => Ok(Rgb::new(r, g, b)),
        _ => Err(bad()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuleRecord {
    Pixel {
        x: NumOrText,
        y: NumOrText,
        rgb: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tolerance: Option<f64>,
    },
    Image {
        image_path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        threshold: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method: Option<MatchMethod>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        grayscale: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        debug_mode: Option<bool>,
    },
}

impl RuleRecord {
    /// Validated detection spec.
    pub fn to_spec(&self) -> Result<DetectionSpec, RecordError> {
        let spec = match self {
            RuleRecord::Pixel { x, y, rgb, tolerance } => DetectionSpec::Pixel(PixelSpec {
                at: Point::new(x.to_i32("x")?, y.to_i32("y")?),
                color: parse_rgb(rgb)?,
                tolerance: *tolerance,
            }),
            RuleRecord::Image { image_path, threshold, method, grayscale, debug_mode } => {
                DetectionSpec::Image(ImageSpec {
                    reference: image_path.clone(),
                    method: *method,
                    threshold: *threshold,
                    color_mode: grayscale.map(ColorMode::from_grayscale),
                    debug: *debug_mode,
                })
            }
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Record in the editor's format (coordinates as strings).
    pub fn from_spec(spec: &DetectionSpec) -> Self {
        match spec {
            DetectionSpec::Pixel(p) => RuleRecord::Pixel {
                x: NumOrText::Text(p.at.x.to_string()),
                y: NumOrText::Text(p.at.y.to_string()),
                rgb: p.color.to_string(),
                tolerance: p.tolerance,
            },
            DetectionSpec::Image(img) => RuleRecord::Image {
                image_path: img.reference.clone(),
                threshold: img.threshold,
                method: img.method,
                grayscale: img.color_mode.map(|m| m == ColorMode::Grayscale),
                debug_mode: img.debug,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: String,
}

impl ActionRecord {
    pub fn to_action(&self) -> Result<Action, RecordError> {
        let kind: ActionKind = self.kind.parse()?;
        Action::from_parts(kind, &self.value)
    }

    pub fn from_action(action: &Action) -> Self {
        Self { kind: action.kind().label().to_string(), value: action.value() }
    }
}

/// Build an action list. An action whose payload does not parse is logged
/// and left out; an unknown action type fails the whole list.
pub fn actions_from_records(records: &[ActionRecord]) -> Result<ActionList, RecordError> {
    let mut actions = ActionList::new();
    for record in records {
        match record.to_action() {
            Ok(action) => actions.push(action),
            Err(e @ RecordError::BadNumber { .. }) => {
                logger::warn(&format!("skipping action {} [{}]: {}", record.kind, record.value, e));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(actions)
}

pub fn actions_to_records(actions: &ActionList) -> Vec<ActionRecord> {
    actions.iter().map(ActionRecord::from_action).collect()
}

/// Candidate for a locate call: a bare image path or a path with options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CandidateRecord {
    Path(PathBuf),
    Options {
        path: PathBuf,
        #[serde(default)]
        threshold: Option<f32>,
        #[serde(default)]
        method: Option<MatchMethod>,
        #[serde(default)]
        grayscale: Option<bool>,
        #[serde(default)]
        debug_mode: Option<bool>,
    },
}

impl CandidateRecord {
    pub fn to_spec(&self) -> Result<DetectionSpec, RecordError> {
        let spec = match self {
            CandidateRecord::Path(path) => DetectionSpec::Image(ImageSpec::new(path.clone())),
            CandidateRecord::Options { path, threshold, method, grayscale, debug_mode } => {
                DetectionSpec::Image(ImageSpec {
                    reference: path.clone(),
                    method: *method,
                    threshold: *threshold,
                    color_mode: grayscale.map(ColorMode::from_grayscale),
                    debug: *debug_mode,
                })
            }
        };
        spec.validate()?;
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_editor_pixel_record() {
        let rec: RuleRecord =
            serde_json::from_str(r#"{"type": "pixel", "x": "10", "y": "20", "rgb": "255, 0, 0"}"#).unwrap();
        let spec = rec.to_spec().unwrap();
        assert_eq!(
            spec,
            DetectionSpec::Pixel(PixelSpec::new(Point::new(10, 20), Rgb::new(255, 0, 0)))
        );
    }

    #[test]
    fn test_numeric_coordinates_accepted() {
        let rec: RuleRecord =
            serde_json::from_str(r#"{"type": "pixel", "x": 3, "y": 4, "rgb": "1,2,3", "tolerance": 5}"#).unwrap();
        match rec.to_spec().unwrap() {
            DetectionSpec::Pixel(p) => {
                assert_eq!(p.at, Point::new(3, 4));
                assert_eq!(p.tolerance, Some(5.0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_editor_image_record() {
        let rec: RuleRecord =
            serde_json::from_str(r#"{"type": "image", "image_path": "images/cap_1.png"}"#).unwrap();
        assert_eq!(
            rec.to_spec().unwrap(),
            DetectionSpec::Image(ImageSpec::new("images/cap_1.png"))
        );
    }

    #[test]
    fn test_image_options() {
        let rec: RuleRecord = serde_json::from_str(
            r#"{"type": "image", "image_path": "a.png", "threshold": 0.9, "method": 1, "grayscale": true}"#,
        )
        .unwrap();
        match rec.to_spec().unwrap() {
            DetectionSpec::Image(img) => {
                assert_eq!(img.method, Some(MatchMethod::SqDiffNormed));
                assert_eq!(img.threshold, Some(0.9));
                assert_eq!(img.color_mode, Some(ColorMode::Grayscale));
                assert_eq!(img.debug, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bad_records_rejected() {
        let bad_color: RuleRecord =
            serde_json::from_str(r#"{"type": "pixel", "x": "1", "y": "1", "rgb": "red"}"#).unwrap();
        assert!(matches!(bad_color.to_spec(), Err(RecordError::BadColor(_))));

        let bad_x: RuleRecord =
            serde_json::from_str(r#"{"type": "pixel", "x": "", "y": "1", "rgb": "1, 2, 3"}"#).unwrap();
        assert!(matches!(bad_x.to_spec(), Err(RecordError::BadNumber { field: "x", .. })));

        let negative: RuleRecord =
            serde_json::from_str(r#"{"type": "pixel", "x": "-4", "y": "1", "rgb": "1, 2, 3"}"#).unwrap();
        assert!(matches!(negative.to_spec(), Err(RecordError::NegativeCoordinate { .. })));

        assert!(serde_json::from_str::<RuleRecord>(r#"{"type": "sound"}"#).is_err());
    }

    #[test]
    fn test_parse_rgb() {
        assert_eq!(parse_rgb(" 1 ,2, 3").unwrap(), Rgb::new(1, 2, 3));
        assert!(parse_rgb("1, 2").is_err());
        assert!(parse_rgb("1, 2, 3, 4").is_err());
        assert!(parse_rgb("256, 0, 0").is_err());
    }

    #[test]
    fn test_spec_written_in_editor_format() {
        let spec = DetectionSpec::Pixel(PixelSpec::new(Point::new(7, 8), Rgb::new(9, 10, 11)));
        let json = serde_json::to_value(RuleRecord::from_spec(&spec)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "pixel", "x": "7", "y": "8", "rgb": "9, 10, 11"})
        );
    }

    #[test]
    fn test_action_records() {
        let records: Vec<ActionRecord> = serde_json::from_str(
            r#"[
                {"type": "Press Key", "value": "e"},
                {"type": "Wait (ms)", "value": "500"},
                {"type": "Click Found Spot", "value": ""},
                {"type": "click_at", "value": "10, 20"},
                {"type": "type_text", "value": "hi"}
            ]"#,
        )
        .unwrap();
        let actions = actions_from_records(&records).unwrap();
        assert_eq!(
            actions.iter().cloned().collect::<Vec<_>>(),
            vec![
                Action::PressKey("e".into()),
                Action::Wait(500),
                Action::ClickAtAnchor,
                Action::ClickAtFixedPoint("10, 20".into()),
                Action::TypeText("hi".into()),
            ]
        );
        assert_eq!(actions_to_records(&actions)[3].kind, "Click Custom (X,Y)");

        let unknown = ActionRecord { kind: "Dance".into(), value: String::new() };
        assert!(matches!(unknown.to_action(), Err(RecordError::UnknownAction(_))));
    }

    #[test]
    fn test_bad_payload_skips_only_that_action() {
        let records = vec![
            ActionRecord { kind: "Press Key".into(), value: "e".into() },
            ActionRecord { kind: "Wait (ms)".into(), value: "soon".into() },
            ActionRecord { kind: "Press Key".into(), value: "f".into() },
        ];
        let actions = actions_from_records(&records).unwrap();
        assert_eq!(
            actions.iter().cloned().collect::<Vec<_>>(),
            vec![Action::PressKey("e".into()), Action::PressKey("f".into())]
        );

        let mut records = records;
        records.push(ActionRecord { kind: "Teleport".into(), value: String::new() });
        assert!(matches!(actions_from_records(&records), Err(RecordError::UnknownAction(_))));
    }
}
