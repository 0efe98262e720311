use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
    AudioClip, AudioTrack, Clip, ClipId, Layer, LayerId, Marker, Operation, OperationKind,
    Timeline, TimelineError, TrackId,
};

/// An operation `apply_operations` could not apply.
#[derive(Debug, Clone)]
pub struct SkippedOperation {
    pub index: usize,
    pub kind: OperationKind,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub applied: usize,
    pub skipped: Vec<SkippedOperation>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Applies every operation it can, in order, and reports the rest.
///
/// Later operations win over earlier ones touching the same bucket.
pub fn apply_operations(timeline: &mut Timeline, ops: &[Operation]) -> ApplyReport {
    let mut report = ApplyReport::default();
    for (index, op) in ops.iter().enumerate() {
        match apply_operation(timeline, op) {
            Ok(()) => report.applied += 1,
            Err(e) => report.skipped.push(SkippedOperation {
                index,
                kind: op.kind,
                reason: e.to_string(),
            }),
        }
    }
    report
}

/// Applies a single operation. The version counter is never touched.
pub fn apply_operation(timeline: &mut Timeline, op: &Operation) -> Result<(), TimelineError> {
    match op.kind {
        OperationKind::LayerAdd => {
            let layer: Layer = decode(&op.data)?;
            upsert(&mut timeline.layers, layer, op.index, |l| &l.id);
            Ok(())
        }
        OperationKind::LayerDelete => {
            let id = layer_target(op)?;
            remove(&mut timeline.layers, |l| &l.id == id)
                .ok_or_else(|| TimelineError::LayerNotFound(id.clone()))
        }
        OperationKind::LayerUpdate => {
            let id = layer_target(op)?;
            let layer = find_layer(timeline, id)?;
            patch(layer, &op.data)
        }
        OperationKind::LayerReorder => {
            let order = decode_order(&op.data)?;
            reorder(&mut timeline.layers, &order, |l| l.id.as_str());
            Ok(())
        }

        OperationKind::AudioTrackAdd => {
            let track: AudioTrack = decode(&op.data)?;
            upsert(&mut timeline.audio_tracks, track, op.index, |t| &t.id);
            Ok(())
        }
        OperationKind::AudioTrackDelete => {
            let id = track_target(op)?;
            remove(&mut timeline.audio_tracks, |t| &t.id == id)
                .ok_or_else(|| TimelineError::TrackNotFound(id.clone()))
        }
        OperationKind::AudioTrackUpdate => {
            let id = track_target(op)?;
            let track = find_track(timeline, id)?;
            patch(track, &op.data)
        }
        OperationKind::AudioTrackReorder => {
            let order = decode_order(&op.data)?;
            reorder(&mut timeline.audio_tracks, &order, |t| t.id.as_str());
            Ok(())
        }

        OperationKind::ClipAdd => {
            let clip: Clip = decode(&op.data)?;
            let layer_id = layer_target(op)?;
            let layer = find_layer(timeline, layer_id)?;
            upsert(&mut layer.clips, clip, op.index, |c| &c.id);
            Ok(())
        }
        OperationKind::ClipDelete => {
            let clip_id = clip_target(op)?;
            let layer = layer_holding_clip(timeline, op.layer_id.as_ref(), clip_id)?;
            remove(&mut layer.clips, |c| &c.id == clip_id)
                .ok_or_else(|| TimelineError::ClipNotFound(clip_id.clone()))
        }
        kind if kind.is_clip_patch() => {
            let clip_id = clip_target(op)?;
            let layer = layer_holding_clip(timeline, op.layer_id.as_ref(), clip_id)?;
            let clip = layer
                .clips
                .iter_mut()
                .find(|c| &c.id == clip_id)
                .ok_or_else(|| TimelineError::ClipNotFound(clip_id.clone()))?;
            patch(clip, &op.data)
        }

        OperationKind::AudioClipAdd => {
            let clip: AudioClip = decode(&op.data)?;
            let track_id = track_target(op)?;
            let track = find_track(timeline, track_id)?;
            upsert(&mut track.clips, clip, op.index, |c| &c.id);
            Ok(())
        }
        OperationKind::AudioClipDelete => {
            let clip_id = clip_target(op)?;
            let track = track_holding_clip(timeline, op.track_id.as_ref(), clip_id)?;
            remove(&mut track.clips, |c| &c.id == clip_id)
                .ok_or_else(|| TimelineError::ClipNotFound(clip_id.clone()))
        }
        OperationKind::AudioClipUpdate => {
            let clip_id = clip_target(op)?;
            let track = track_holding_clip(timeline, op.track_id.as_ref(), clip_id)?;
            let clip = track
                .clips
                .iter_mut()
                .find(|c| &c.id == clip_id)
                .ok_or_else(|| TimelineError::ClipNotFound(clip_id.clone()))?;
            patch(clip, &op.data)
        }

        OperationKind::MarkerAdd => {
            let marker: Marker = decode(&op.data)?;
            upsert(&mut timeline.markers, marker, op.index, |m| &m.id);
            Ok(())
        }
        OperationKind::MarkerDelete => {
            let id = op
                .marker_id
                .as_ref()
                .ok_or(TimelineError::MissingTarget("marker_id", op.kind))?;
            remove(&mut timeline.markers, |m| &m.id == id)
                .ok_or_else(|| TimelineError::MarkerNotFound(id.clone()))
        }
        OperationKind::MarkerUpdate => {
            let id = op
                .marker_id
                .as_ref()
                .ok_or(TimelineError::MissingTarget("marker_id", op.kind))?;
            let marker = timeline
                .markers
                .iter_mut()
                .find(|m| &m.id == id)
                .ok_or_else(|| TimelineError::MarkerNotFound(id.clone()))?;
            patch(marker, &op.data)
        }

        OperationKind::TimelineFullReplace => {
            let mut replacement: Timeline = decode(&op.data)?;
            replacement.version = timeline.version;
            *timeline = replacement;
            Ok(())
        }

        // Every clip patch kind is handled by the guard arm above.
        _ => Err(TimelineError::InvalidOp(format!("unhandled operation {}", op.kind))),
    }
}

fn layer_target(op: &Operation) -> Result<&LayerId, TimelineError> {
    op.layer_id
        .as_ref()
        .ok_or(TimelineError::MissingTarget("layer_id", op.kind))
}

fn track_target(op: &Operation) -> Result<&TrackId, TimelineError> {
    op.track_id
        .as_ref()
        .ok_or(TimelineError::MissingTarget("track_id", op.kind))
}

fn clip_target(op: &Operation) -> Result<&ClipId, TimelineError> {
    op.clip_id
        .as_ref()
        .ok_or(TimelineError::MissingTarget("clip_id", op.kind))
}

fn find_layer<'a>(timeline: &'a mut Timeline, id: &LayerId) -> Result<&'a mut Layer, TimelineError> {
    timeline
        .layers
        .iter_mut()
        .find(|l| &l.id == id)
        .ok_or_else(|| TimelineError::LayerNotFound(id.clone()))
}

fn find_track<'a>(timeline: &'a mut Timeline, id: &TrackId) -> Result<&'a mut AudioTrack, TimelineError> {
    timeline
        .audio_tracks
        .iter_mut()
        .find(|t| &t.id == id)
        .ok_or_else(|| TimelineError::TrackNotFound(id.clone()))
}

/// Uses the layer context when given, otherwise searches every layer.
fn layer_holding_clip<'a>(
    timeline: &'a mut Timeline,
    layer_id: Option<&LayerId>,
    clip_id: &ClipId,
) -> Result<&'a mut Layer, TimelineError> {
    match layer_id {
        Some(id) => find_layer(timeline, id),
        None => timeline
            .layers
            .iter_mut()
            .find(|l| l.clips.iter().any(|c| &c.id == clip_id))
            .ok_or_else(|| TimelineError::ClipNotFound(clip_id.clone())),
    }
}

fn track_holding_clip<'a>(
    timeline: &'a mut Timeline,
    track_id: Option<&TrackId>,
    clip_id: &ClipId,
) -> Result<&'a mut AudioTrack, TimelineError> {
    match track_id {
        Some(id) => find_track(timeline, id),
        None => timeline
            .audio_tracks
            .iter_mut()
            .find(|t| t.clips.iter().any(|c| &c.id == clip_id))
            .ok_or_else(|| TimelineError::ClipNotFound(clip_id.clone())),
    }
}

/// Inserts at `index` (clamped), or replaces in place when the id already exists.
fn upsert<T, K: PartialEq>(items: &mut Vec<T>, item: T, index: Option<usize>, key: impl Fn(&T) -> &K) {
    if let Some(existing) = items.iter_mut().find(|i| key(i) == key(&item)) {
        *existing = item;
        return;
    }
    let at = index.unwrap_or(items.len()).min(items.len());
    items.insert(at, item);
}

fn remove<T>(items: &mut Vec<T>, matches: impl Fn(&T) -> bool) -> Option<()> {
    let idx = items.iter().position(matches)?;
    items.remove(idx);
    Some(())
}

/// Sorts by position in `order`; ids missing from it keep their relative order at the end.
fn reorder<T>(items: &mut [T], order: &[String], key: impl Fn(&T) -> &str) {
    items.sort_by_key(|item| {
        order
            .iter()
            .position(|id| id == key(item))
            .unwrap_or(usize::MAX)
    });
}

fn decode_order(data: &Value) -> Result<Vec<String>, TimelineError> {
    let order = data
        .get("order")
        .ok_or_else(|| TimelineError::Decode("reorder without `order`".to_string()))?;
    decode(order)
}

/// Merges a shallow payload into an item. Identity and nested collections are not patchable.
fn patch<T: Serialize + DeserializeOwned>(item: &mut T, data: &Value) -> Result<(), TimelineError> {
    let Value::Object(changes) = data else {
        return Err(TimelineError::Decode(format!("expected object payload, got {}", data)));
    };
    let mut current = match serde_json::to_value(&*item).map_err(|e| TimelineError::Encode(e.to_string()))? {
        Value::Object(map) => map,
        other => return Err(TimelineError::Encode(format!("expected object, got {}", other))),
    };
    for (key, value) in changes {
        if key == "id" || key == "clips" {
            continue;
        }
        current.insert(key.clone(), value.clone());
    }
    *item = decode(&Value::Object(current))?;
    Ok(())
}

fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, TimelineError> {
    T::deserialize(value).map_err(|e| TimelineError::Decode(e.to_string()))
}
