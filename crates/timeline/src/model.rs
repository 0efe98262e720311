use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt};
use uuid::Uuid;

use crate::{Millis, TimelineError};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a visual layer.
    LayerId
);
string_id!(
    /// Identifier of a clip or audio clip.
    ClipId
);
string_id!(
    /// Identifier of an audio track.
    TrackId
);
string_id!(
    /// Identifier of a timeline marker.
    MarkerId
);
string_id!(
    /// Identifier linking clips that move together.
    GroupId
);

/// A complete project document at one point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Timeline {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub duration_ms: Millis,
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub audio_tracks: Vec<AudioTrack>,
    #[serde(default)]
    pub markers: Vec<Marker>,
    #[serde(default)]
    pub groups: Vec<ClipGroup>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Video,
    Image,
    Text,
    Shape,
    Adjustment,
}

impl Default for LayerKind {
    fn default() -> Self {
        Self::Video
    }
}

/// Visual layer. Array position in `Timeline::layers` is paint order, first is front-most.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Layer {
    pub id: LayerId,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: LayerKind,
    #[serde(default)]
    pub order: i32,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub clips: Vec<Clip>,
}

impl Layer {
    pub fn new(name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            id: LayerId::new(),
            name: name.into(),
            kind,
            order: 0,
            visible: true,
            locked: false,
            clips: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transform {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default = "default_scale")]
    pub scale_x: f64,
    #[serde(default = "default_scale")]
    pub scale_y: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
            opacity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Effect {
    pub kind: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shape {
    pub kind: String,
    #[serde(default)]
    pub fill: Option<String>,
    #[serde(default)]
    pub stroke: Option<String>,
    #[serde(default)]
    pub stroke_width: f64,
    #[serde(default)]
    pub corner_radius: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextStyle {
    #[serde(default)]
    pub font_family: String,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub align: TextAlign,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

impl Default for TextAlign {
    fn default() -> Self {
        Self::Center
    }
}

/// Crop insets as fractions of the source frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Crop {
    #[serde(default)]
    pub top: f64,
    #[serde(default)]
    pub right: f64,
    #[serde(default)]
    pub bottom: f64,
    #[serde(default)]
    pub left: f64,
}

/// Keyframe time is relative to the owning clip's start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Keyframe {
    pub time_ms: Millis,
    #[serde(default)]
    pub transform: Transform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
}

/// A clip is asset-backed, a shape primitive, or text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clip {
    pub id: ClipId,
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Shape>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_style: Option<TextStyle>,
    #[serde(default)]
    pub start_ms: Millis,
    #[serde(default)]
    pub duration_ms: Millis,
    #[serde(default)]
    pub in_point_ms: Millis,
    #[serde(default)]
    pub out_point_ms: Millis,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyframes: Option<Vec<Keyframe>>,
    #[serde(default)]
    pub transform: Transform,
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<Crop>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_in_ms: Option<Millis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_out_ms: Option<Millis>,
}

impl Clip {
    fn blank(start_ms: Millis, duration_ms: Millis) -> Self {
        Self {
            id: ClipId::new(),
            asset_id: None,
            shape: None,
            text_content: None,
            text_style: None,
            start_ms,
            duration_ms,
            in_point_ms: 0,
            out_point_ms: duration_ms,
            speed: 1.0,
            group_id: None,
            keyframes: None,
            transform: Transform::default(),
            effects: Vec::new(),
            crop: None,
            fade_in_ms: None,
            fade_out_ms: None,
        }
    }

    pub fn asset(asset_id: impl Into<String>, start_ms: Millis, duration_ms: Millis) -> Self {
        Self {
            asset_id: Some(asset_id.into()),
            ..Self::blank(start_ms, duration_ms)
        }
    }

    pub fn text(content: impl Into<String>, start_ms: Millis, duration_ms: Millis) -> Self {
        Self {
            text_content: Some(content.into()),
            ..Self::blank(start_ms, duration_ms)
        }
    }

    pub fn shape(shape: Shape, start_ms: Millis, duration_ms: Millis) -> Self {
        Self {
            shape: Some(shape),
            ..Self::blank(start_ms, duration_ms)
        }
    }

    pub fn end_ms(&self) -> Millis {
        self.start_ms + self.duration_ms
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ducking {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_duck_level")]
    pub level: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioTrack {
    pub id: TrackId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub order: i32,
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default)]
    pub muted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ducking: Option<Ducking>,
    #[serde(
        default,
        alias = "linkedVideoLayerId",
        skip_serializing_if = "Option::is_none"
    )]
    pub linked_video_layer_id: Option<LayerId>,
    #[serde(default)]
    pub clips: Vec<AudioClip>,
}

impl AudioTrack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TrackId::new(),
            name: name.into(),
            order: 0,
            volume: 1.0,
            muted: false,
            ducking: None,
            linked_video_layer_id: None,
            clips: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioClip {
    pub id: ClipId,
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub start_ms: Millis,
    #[serde(default)]
    pub duration_ms: Millis,
    #[serde(default)]
    pub in_point_ms: Millis,
    #[serde(default)]
    pub out_point_ms: Millis,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default)]
    pub muted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_in_ms: Option<Millis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_out_ms: Option<Millis>,
}

impl AudioClip {
    pub fn new(asset_id: impl Into<String>, start_ms: Millis, duration_ms: Millis) -> Self {
        Self {
            id: ClipId::new(),
            asset_id: Some(asset_id.into()),
            start_ms,
            duration_ms,
            in_point_ms: 0,
            out_point_ms: duration_ms,
            speed: 1.0,
            volume: 1.0,
            muted: false,
            group_id: None,
            fade_in_ms: None,
            fade_out_ms: None,
        }
    }

    pub fn end_ms(&self) -> Millis {
        self.start_ms + self.duration_ms
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Marker {
    pub id: MarkerId,
    pub time_ms: Millis,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_marker_color")]
    pub color: String,
}

impl Marker {
    pub fn new(time_ms: Millis, name: impl Into<String>) -> Self {
        Self {
            id: MarkerId::new(),
            time_ms,
            name: name.into(),
            color: default_marker_color(),
        }
    }
}

/// Opaque grouping record; the sync core does not enforce it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClipGroup {
    pub id: GroupId,
    #[serde(default)]
    pub clip_ids: Vec<ClipId>,
}

fn default_true() -> bool {
    true
}

fn default_scale() -> f64 {
    1.0
}

fn default_opacity() -> f64 {
    1.0
}

fn default_speed() -> f64 {
    1.0
}

fn default_volume() -> f64 {
    1.0
}

fn default_font_size() -> f64 {
    48.0
}

fn default_duck_level() -> f64 {
    0.3
}

fn default_marker_color() -> String {
    "#4A9EFF".to_string()
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(&self, id: &LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| &l.id == id)
    }

    pub fn audio_track(&self, id: &TrackId) -> Option<&AudioTrack> {
        self.audio_tracks.iter().find(|t| &t.id == id)
    }

    pub fn marker(&self, id: &MarkerId) -> Option<&Marker> {
        self.markers.iter().find(|m| &m.id == id)
    }

    /// Finds a clip in any layer.
    pub fn clip(&self, id: &ClipId) -> Option<(&Layer, &Clip)> {
        self.layers
            .iter()
            .find_map(|layer| layer.clips.iter().find(|c| &c.id == id).map(|c| (layer, c)))
    }

    pub fn clip_count(&self) -> usize {
        self.layers.iter().map(|l| l.clips.len()).sum::<usize>()
            + self.audio_tracks.iter().map(|t| t.clips.len()).sum::<usize>()
    }

    /// End of the last clip across layers and audio tracks.
    pub fn computed_duration_ms(&self) -> Millis {
        let visual = self
            .layers
            .iter()
            .flat_map(|l| l.clips.iter().map(Clip::end_ms));
        let audio = self
            .audio_tracks
            .iter()
            .flat_map(|t| t.clips.iter().map(AudioClip::end_ms));
        visual.chain(audio).max().unwrap_or(0).max(0)
    }

    /// Deep equality ignoring the version counter.
    pub fn same_content(&self, other: &Timeline) -> bool {
        self.duration_ms == other.duration_ms && self.same_structure(other)
    }

    /// Deep equality ignoring version and the derived duration.
    pub fn same_structure(&self, other: &Timeline) -> bool {
        self.layers == other.layers
            && self.audio_tracks == other.audio_tracks
            && self.markers == other.markers
            && self.groups == other.groups
    }

    /// Checks id uniqueness within each keyed collection.
    pub fn validate(&self) -> Result<(), TimelineError> {
        check_unique("layer", self.layers.iter().map(|l| l.id.as_str()))?;
        for layer in &self.layers {
            check_unique("clip", layer.clips.iter().map(|c| c.id.as_str()))?;
        }
        check_unique("audio_track", self.audio_tracks.iter().map(|t| t.id.as_str()))?;
        for track in &self.audio_tracks {
            check_unique("audio_clip", track.clips.iter().map(|c| c.id.as_str()))?;
        }
        check_unique("marker", self.markers.iter().map(|m| m.id.as_str()))?;
        check_unique("group", self.groups.iter().map(|g| g.id.as_str()))?;
        Ok(())
    }

    pub fn normalize(&mut self) {
        for clip in self.layers.iter_mut().flat_map(|l| l.clips.iter_mut()) {
            clamp_timing(
                &mut clip.start_ms,
                &mut clip.duration_ms,
                &mut clip.in_point_ms,
                &mut clip.out_point_ms,
            );
            if let Some(keyframes) = clip.keyframes.as_mut() {
                keyframes.sort_by_key(|k| k.time_ms);
            }
        }
        for clip in self.audio_tracks.iter_mut().flat_map(|t| t.clips.iter_mut()) {
            clamp_timing(
                &mut clip.start_ms,
                &mut clip.duration_ms,
                &mut clip.in_point_ms,
                &mut clip.out_point_ms,
            );
        }
        self.markers.iter_mut().for_each(|m| m.time_ms = m.time_ms.max(0));
    }
}

fn clamp_timing(start: &mut Millis, duration: &mut Millis, in_point: &mut Millis, out_point: &mut Millis) {
    *start = (*start).max(0);
    *duration = (*duration).max(0);
    *in_point = (*in_point).max(0);
    *out_point = (*out_point).max(*in_point);
}

fn check_unique<'a>(
    collection: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<(), TimelineError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(TimelineError::DuplicateId {
                collection,
                id: id.to_string(),
            });
        }
    }
    Ok(())
}
