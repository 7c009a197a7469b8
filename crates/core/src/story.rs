//! The validated story document model.
//!
//! Validation here is structural only: a parse failure names the first
//! missing or mistyped field. Graph reachability, the 8-50 frame bound and
//! the 2-3 quiz-option bound are contracts enforced through the system
//! prompt, not re-checked at parse time, so a slightly off-spec model output
//! still renders instead of hard-failing.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The persona the model speaks as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub description: String,
    pub tone: String,
}

/// A frame identifier as produced by the model.
///
/// The system prompt asks for sequential integers, but models occasionally
/// emit numeric strings instead. Integers and numeric strings normalize to
/// [`FrameId::Num`] at parse time; anything else is retained as given rather
/// than rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameId {
    Num(i64),
    Raw(Value),
}

impl FrameId {
    /// Normalization applied to every id-shaped value on the way in.
    pub fn normalize(value: Value) -> Self {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => FrameId::Num(i),
                None => FrameId::Raw(Value::Number(n)),
            },
            Value::String(s) => match s.trim().parse::<i64>() {
                Ok(i) => FrameId::Num(i),
                Err(_) => FrameId::Raw(Value::String(s)),
            },
            other => FrameId::Raw(other),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FrameId::Num(i) => Some(*i),
            FrameId::Raw(_) => None,
        }
    }
}

impl<'de> Deserialize<'de> for FrameId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(FrameId::normalize(Value::deserialize(deserializer)?))
    }
}

impl Serialize for FrameId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            FrameId::Num(i) => serializer.serialize_i64(*i),
            FrameId::Raw(value) => value.serialize(serializer),
        }
    }
}

/// One answer in a quiz frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameOption {
    pub text: String,
    #[serde(rename = "nextFrameId")]
    pub next_frame_id: FrameId,
}

/// One narrative beat: a linear teaching beat, or a quiz beat when `options`
/// is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub id: FrameId,
    pub speaker: String,
    pub text: String,
    /// Expected vocabulary: neutral, happy, sad, surprised, angry, thinking,
    /// excited. Deviations are kept as-is.
    pub emotion: String,
    #[serde(default)]
    pub options: Option<Vec<FrameOption>>,
    /// Absent exactly on terminal frames (and on quiz frames, where the
    /// options carry the branching).
    #[serde(default, rename = "nextFrameId")]
    pub next_frame_id: Option<FrameId>,
}

/// The fully validated story graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub title: String,
    pub summary: String,
    pub frames: Vec<Frame>,
}
