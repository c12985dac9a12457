use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Operating mode of the perception pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Surveillance,
    Assistive,
    SelfDriving,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Surveillance, Mode::Assistive, Mode::SelfDriving];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Surveillance => "surveillance",
            Mode::Assistive => "assistive",
            Mode::SelfDriving => "self_driving",
        }
    }

    /// Depth estimation (and everything downstream of it) is skipped in surveillance.
    pub fn runs_depth(&self) -> bool {
        !matches!(self, Mode::Surveillance)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{0}' is not one of surveillance, assistive, self_driving")]
pub struct ParseModeError(pub String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "surveillance" => Ok(Mode::Surveillance),
            "assistive" => Ok(Mode::Assistive),
            "self_driving" => Ok(Mode::SelfDriving),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

/// Axis-aligned box in pixel coordinates, `(x1, y1)` top-left and `(x2, y2)` bottom-right.
///
/// Serialized as a `[x1, y1, x2, y2]` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        (self.x2 - self.x1).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y2 - self.y1).max(0)
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    /// Horizontal and vertical centre.
    pub fn center(&self) -> (f32, f32) {
        (
            (self.x1 + self.x2) as f32 / 2.0,
            (self.y1 + self.y2) as f32 / 2.0,
        )
    }

    /// Clamp every corner into `[0, width-1] x [0, height-1]`.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let max_x = width.saturating_sub(1) as i32;
        let max_y = height.saturating_sub(1) as i32;
        Self {
            x1: self.x1.clamp(0, max_x),
            y1: self.y1.clamp(0, max_y),
            x2: self.x2.clamp(0, max_x),
            y2: self.y2.clamp(0, max_y),
        }
    }
}

impl From<[i32; 4]> for BBox {
    fn from(v: [i32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [i32; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Horizontal third of the frame an object's centre falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Center,
    Right,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Left => "Left",
            Direction::Center => "Center",
            Direction::Right => "Right",
        }
    }
}

/// Vertical third of the frame an object's centre falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerticalZone {
    Upper,
    Middle,
    Lower,
}

impl VerticalZone {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerticalZone::Upper => "Upper",
            VerticalZone::Middle => "Middle",
            VerticalZone::Lower => "Lower",
        }
    }
}

/// Categorical distance derived from normalized depth (larger depth score = closer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Distance {
    #[serde(rename = "Very Close")]
    VeryClose,
    Near,
    Medium,
    Far,
    Unknown,
}

impl Distance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::VeryClose => "Very Close",
            Distance::Near => "Near",
            Distance::Medium => "Medium",
            Distance::Far => "Far",
            Distance::Unknown => "Unknown",
        }
    }
}

/// Safety relevance of a label, 5 (Critical) down to 1 (Minimal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PriorityLevel {
    Minimal = 1,
    Low = 2,
    Medium = 3,
    High = 4,
    Critical = 5,
}

impl PriorityLevel {
    /// Levels outside 1..=5 saturate to the nearest bound.
    pub fn from_level(level: u8) -> Self {
        match level {
            0 | 1 => PriorityLevel::Minimal,
            2 => PriorityLevel::Low,
            3 => PriorityLevel::Medium,
            4 => PriorityLevel::High,
            _ => PriorityLevel::Critical,
        }
    }

    pub fn level(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityLevel::Critical => "Critical",
            PriorityLevel::High => "High",
            PriorityLevel::Medium => "Medium",
            PriorityLevel::Low => "Low",
            PriorityLevel::Minimal => "Minimal",
        }
    }
}

/// Walkable/drivable-space suggestion produced by the free-space engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Navigation {
    #[serde(rename = "Move Forward")]
    MoveForward,
    #[serde(rename = "Move Slightly Left")]
    MoveSlightlyLeft,
    #[serde(rename = "Move Slightly Right")]
    MoveSlightlyRight,
    #[serde(rename = "Obstacle Ahead")]
    ObstacleAhead,
    Unknown,
}

impl Navigation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Navigation::MoveForward => "Move Forward",
            Navigation::MoveSlightlyLeft => "Move Slightly Left",
            Navigation::MoveSlightlyRight => "Move Slightly Right",
            Navigation::ObstacleAhead => "Obstacle Ahead",
            Navigation::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Navigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discrete steering decision for self-driving mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SteeringInstruction {
    #[serde(rename = "Move Forward")]
    MoveForward,
    #[serde(rename = "Turn Left")]
    TurnLeft,
    #[serde(rename = "Turn Right")]
    TurnRight,
    Stop,
}

impl SteeringInstruction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SteeringInstruction::MoveForward => "Move Forward",
            SteeringInstruction::TurnLeft => "Turn Left",
            SteeringInstruction::TurnRight => "Turn Right",
            SteeringInstruction::Stop => "Stop",
        }
    }
}

impl fmt::Display for SteeringInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detector output before fusion with depth and zone information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BBox,
}

impl RawDetection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// A detection annotated with zone, distance, priority, urgency and alert text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BBox,
    pub direction: Direction,
    pub vertical_zone: VerticalZone,
    /// `"{vertical} {direction}"`, e.g. `"Lower Center"`.
    pub spatial_zone: String,
    pub distance: Distance,
    pub priority: u8,
    pub priority_level: PriorityLevel,
    pub urgency: bool,
    pub alert: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!("surveillance".parse::<Mode>().unwrap(), Mode::Surveillance);
        assert_eq!(" Assistive ".parse::<Mode>().unwrap(), Mode::Assistive);
        assert_eq!("self_driving".parse::<Mode>().unwrap(), Mode::SelfDriving);
        assert!("driving".parse::<Mode>().is_err());
        assert!("".parse::<Mode>().is_err());
    }

    #[test]
    fn test_mode_roundtrip_display() {
        for mode in Mode::ALL {
            assert_eq!(mode.to_string().parse::<Mode>().unwrap(), mode);
        }
        assert!(!Mode::Surveillance.runs_depth());
        assert!(Mode::Assistive.runs_depth());
        assert!(Mode::SelfDriving.runs_depth());
    }

    #[test]
    fn test_bbox_clamp() {
        let b = BBox::new(-10, -5, 700, 500).clamp_to(640, 480);
        assert_eq!(b, BBox::new(0, 0, 639, 479));
    }

    #[test]
    fn test_bbox_serializes_as_array() {
        let json = serde_json::to_string(&BBox::new(1, 2, 3, 4)).unwrap();
        assert_eq!(json, "[1,2,3,4]");
        let back: BBox = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BBox::new(1, 2, 3, 4));
    }

    #[test]
    fn test_priority_level_saturates() {
        assert_eq!(PriorityLevel::from_level(0), PriorityLevel::Minimal);
        assert_eq!(PriorityLevel::from_level(9), PriorityLevel::Critical);
        assert_eq!(PriorityLevel::from_level(4).level(), 4);
        assert!(PriorityLevel::Critical > PriorityLevel::High);
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(serde_json::to_string(&Distance::VeryClose).unwrap(), "\"Very Close\"");
        assert_eq!(
            serde_json::to_string(&Navigation::MoveSlightlyLeft).unwrap(),
            "\"Move Slightly Left\""
        );
        assert_eq!(serde_json::to_string(&Mode::SelfDriving).unwrap(), "\"self_driving\"");
        assert_eq!(serde_json::to_string(&SteeringInstruction::Stop).unwrap(), "\"Stop\"");
    }
}
