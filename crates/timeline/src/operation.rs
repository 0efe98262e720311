/// Operation wire format shared by the diff engine and remote replay
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::{ClipId, LayerId, MarkerId, Timeline, TimelineError, TrackId};

/// Operation `type` strings as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    #[serde(rename = "layer.add")]
    LayerAdd,
    #[serde(rename = "layer.delete")]
    LayerDelete,
    #[serde(rename = "layer.update")]
    LayerUpdate,
    #[serde(rename = "layer.reorder")]
    LayerReorder,

    #[serde(rename = "audio_track.add")]
    AudioTrackAdd,
    #[serde(rename = "audio_track.delete")]
    AudioTrackDelete,
    #[serde(rename = "audio_track.update")]
    AudioTrackUpdate,
    #[serde(rename = "audio_track.reorder")]
    AudioTrackReorder,

    #[serde(rename = "clip.add")]
    ClipAdd,
    #[serde(rename = "clip.delete")]
    ClipDelete,
    #[serde(rename = "clip.trim")]
    ClipTrim,
    #[serde(rename = "clip.transform")]
    ClipTransform,
    #[serde(rename = "clip.effects")]
    ClipEffects,
    #[serde(rename = "clip.text")]
    ClipText,
    #[serde(rename = "clip.text_style")]
    ClipTextStyle,
    #[serde(rename = "clip.shape")]
    ClipShape,
    #[serde(rename = "clip.crop")]
    ClipCrop,
    #[serde(rename = "clip.keyframes")]
    ClipKeyframes,
    #[serde(rename = "clip.update")]
    ClipUpdate,

    #[serde(rename = "audio_clip.add")]
    AudioClipAdd,
    #[serde(rename = "audio_clip.delete")]
    AudioClipDelete,
    #[serde(rename = "audio_clip.update")]
    AudioClipUpdate,

    #[serde(rename = "marker.add")]
    MarkerAdd,
    #[serde(rename = "marker.delete")]
    MarkerDelete,
    #[serde(rename = "marker.update")]
    MarkerUpdate,

    #[serde(rename = "timeline.full_replace")]
    TimelineFullReplace,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::LayerAdd => "layer.add",
            OperationKind::LayerDelete => "layer.delete",
            OperationKind::LayerUpdate => "layer.update",
            OperationKind::LayerReorder => "layer.reorder",
            OperationKind::AudioTrackAdd => "audio_track.add",
            OperationKind::AudioTrackDelete => "audio_track.delete",
            OperationKind::AudioTrackUpdate => "audio_track.update",
            OperationKind::AudioTrackReorder => "audio_track.reorder",
            OperationKind::ClipAdd => "clip.add",
            OperationKind::ClipDelete => "clip.delete",
            OperationKind::ClipTrim => "clip.trim",
            OperationKind::ClipTransform => "clip.transform",
            OperationKind::ClipEffects => "clip.effects",
            OperationKind::ClipText => "clip.text",
            OperationKind::ClipTextStyle => "clip.text_style",
            OperationKind::ClipShape => "clip.shape",
            OperationKind::ClipCrop => "clip.crop",
            OperationKind::ClipKeyframes => "clip.keyframes",
            OperationKind::ClipUpdate => "clip.update",
            OperationKind::AudioClipAdd => "audio_clip.add",
            OperationKind::AudioClipDelete => "audio_clip.delete",
            OperationKind::AudioClipUpdate => "audio_clip.update",
            OperationKind::MarkerAdd => "marker.add",
            OperationKind::MarkerDelete => "marker.delete",
            OperationKind::MarkerUpdate => "marker.update",
            OperationKind::TimelineFullReplace => "timeline.full_replace",
        }
    }

    /// Buckets that merge a partial payload into an existing clip.
    pub fn is_clip_patch(&self) -> bool {
        matches!(
            self,
            OperationKind::ClipTrim
                | OperationKind::ClipTransform
                | OperationKind::ClipEffects
                | OperationKind::ClipText
                | OperationKind::ClipTextStyle
                | OperationKind::ClipShape
                | OperationKind::ClipCrop
                | OperationKind::ClipKeyframes
                | OperationKind::ClipUpdate
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One semantic change between two snapshots.
///
/// `layer_id`/`track_id` act as the target for layer and track operations and
/// as the containing collection for clip operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_id: Option<ClipId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_id: Option<LayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<TrackId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_id: Option<MarkerId>,
    /// Position of an added item in its destination collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default)]
    pub data: Value,
}

impl Operation {
    pub fn new(kind: OperationKind, data: Value) -> Self {
        Self {
            kind,
            clip_id: None,
            layer_id: None,
            track_id: None,
            marker_id: None,
            index: None,
            data,
        }
    }

    pub fn with_clip(mut self, clip_id: ClipId) -> Self {
        self.clip_id = Some(clip_id);
        self
    }

    pub fn with_layer(mut self, layer_id: LayerId) -> Self {
        self.layer_id = Some(layer_id);
        self
    }

    pub fn with_track(mut self, track_id: TrackId) -> Self {
        self.track_id = Some(track_id);
        self
    }

    pub fn with_marker(mut self, marker_id: MarkerId) -> Self {
        self.marker_id = Some(marker_id);
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// A single operation carrying the whole snapshot.
    pub fn full_replace(timeline: &Timeline) -> Result<Self, TimelineError> {
        let data = serde_json::to_value(timeline).map_err(|e| TimelineError::Encode(e.to_string()))?;
        Ok(Self::new(OperationKind::TimelineFullReplace, data))
    }

    /// Decodes one operation from a loosely typed payload.
    pub fn from_value(value: &Value) -> Result<Self, TimelineError> {
        Operation::deserialize(value).map_err(|e| TimelineError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_names_round_trip_through_serde() {
        let op = Operation::new(OperationKind::ClipTextStyle, json!({ "text_style": null }))
            .with_clip(ClipId::from("c1"))
            .with_layer(LayerId::from("l1"));

        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["type"], "clip.text_style");
        assert_eq!(value["clip_id"], "c1");
        assert!(value.get("track_id").is_none());
        assert_eq!(OperationKind::ClipTextStyle.as_str(), "clip.text_style");
    }

    #[test]
    fn test_unknown_type_is_a_decode_error() {
        let value = json!({ "type": "clip.teleport", "clip_id": "c1", "data": {} });
        assert!(matches!(
            Operation::from_value(&value),
            Err(TimelineError::Decode(_))
        ));
    }

    #[test]
    fn test_missing_data_defaults_to_null() {
        let value = json!({ "type": "layer.delete", "layer_id": "l1" });
        let op = Operation::from_value(&value).unwrap();
        assert_eq!(op.kind, OperationKind::LayerDelete);
        assert_eq!(op.layer_id, Some(LayerId::from("l1")));
        assert!(op.data.is_null());
    }
}
