/// Snapshot diffing: turns two timelines into an ordered list of coarse operations
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use crate::{
    apply_operations, AudioTrack, Layer, Marker, Operation, OperationKind, Timeline, TimelineError,
};

/// Above this many operations a diff collapses into one full replace.
pub const MAX_OPERATIONS: usize = 50;

type Bucket = (OperationKind, &'static [&'static str]);

const CLIP_BUCKETS: &[Bucket] = &[
    (
        OperationKind::ClipTrim,
        &["start_ms", "duration_ms", "in_point_ms", "out_point_ms", "speed"],
    ),
    (OperationKind::ClipTransform, &["transform"]),
    (OperationKind::ClipEffects, &["effects"]),
    (OperationKind::ClipText, &["text_content"]),
    (OperationKind::ClipTextStyle, &["text_style"]),
    (OperationKind::ClipShape, &["shape"]),
    (OperationKind::ClipCrop, &["crop"]),
    (OperationKind::ClipKeyframes, &["keyframes"]),
];

/// Keys never carried by an update payload: identity and nested collections.
const STRUCTURAL_KEYS: &[&str] = &["id", "clips"];

/// Computes the operations that turn `old` into `new`.
///
/// Never drops a real change: a diff that is too large, or that misses a
/// difference the buckets do not cover, becomes a single `timeline.full_replace`.
pub fn diff(old: &Timeline, new: &Timeline) -> Vec<Operation> {
    match try_diff(old, new) {
        Ok(ops) => ops,
        // Only reachable when a snapshot cannot be encoded; nothing better to send.
        Err(_) => Operation::full_replace(new).map(|op| vec![op]).unwrap_or_default(),
    }
}

pub fn try_diff(old: &Timeline, new: &Timeline) -> Result<Vec<Operation>, TimelineError> {
    let mut ops = Vec::new();

    diff_layers(&old.layers, &new.layers, &mut ops)?;
    diff_audio_tracks(&old.audio_tracks, &new.audio_tracks, &mut ops)?;
    diff_markers(&old.markers, &new.markers, &mut ops)?;

    let duration_only = ops.is_empty() && old.duration_ms != new.duration_ms;
    if ops.len() > MAX_OPERATIONS || duration_only || !reproduces(old, &ops, new) {
        return Ok(vec![Operation::full_replace(new)?]);
    }
    Ok(ops)
}

/// Replays `ops` on a copy of `old`; true when the result has the structure
/// of `new`. Receivers derive the duration themselves.
fn reproduces(old: &Timeline, ops: &[Operation], new: &Timeline) -> bool {
    let mut replayed = old.clone();
    let report = apply_operations(&mut replayed, ops);
    report.skipped.is_empty() && replayed.same_structure(new)
}

fn diff_layers(old: &[Layer], new: &[Layer], ops: &mut Vec<Operation>) -> Result<(), TimelineError> {
    let old_by_id: HashMap<_, _> = old.iter().map(|l| (&l.id, l)).collect();
    let new_ids: HashSet<_> = new.iter().map(|l| &l.id).collect();

    for layer in old.iter().filter(|l| !new_ids.contains(&l.id)) {
        ops.push(Operation::new(OperationKind::LayerDelete, Value::Null).with_layer(layer.id.clone()));
    }

    for (index, layer) in new.iter().enumerate() {
        let Some(previous) = old_by_id.get(&layer.id) else {
            ops.push(
                Operation::new(OperationKind::LayerAdd, encode(layer)?)
                    .with_layer(layer.id.clone())
                    .with_index(index),
            );
            continue;
        };

        let changes = diff_fields(&encode_map(*previous)?, &encode_map(layer)?, &[], OperationKind::LayerUpdate);
        for (kind, payload) in changes {
            ops.push(Operation::new(kind, Value::Object(payload)).with_layer(layer.id.clone()));
        }
        diff_clips(previous, layer, ops)?;
    }

    if let Some(order) = reordered(old.iter().map(|l| &l.id), new.iter().map(|l| &l.id)) {
        ops.push(Operation::new(OperationKind::LayerReorder, serde_json::json!({ "order": order })));
    }
    Ok(())
}

fn diff_clips(old: &Layer, new: &Layer, ops: &mut Vec<Operation>) -> Result<(), TimelineError> {
    let old_by_id: HashMap<_, _> = old.clips.iter().map(|c| (&c.id, c)).collect();
    let new_ids: HashSet<_> = new.clips.iter().map(|c| &c.id).collect();

    for clip in old.clips.iter().filter(|c| !new_ids.contains(&c.id)) {
        ops.push(
            Operation::new(OperationKind::ClipDelete, Value::Null)
                .with_clip(clip.id.clone())
                .with_layer(new.id.clone()),
        );
    }

    for (index, clip) in new.clips.iter().enumerate() {
        match old_by_id.get(&clip.id) {
            None => ops.push(
                Operation::new(OperationKind::ClipAdd, encode(clip)?)
                    .with_clip(clip.id.clone())
                    .with_layer(new.id.clone())
                    .with_index(index),
            ),
            Some(previous) => {
                let changes = diff_fields(
                    &encode_map(*previous)?,
                    &encode_map(clip)?,
                    CLIP_BUCKETS,
                    OperationKind::ClipUpdate,
                );
                for (kind, payload) in changes {
                    ops.push(
                        Operation::new(kind, Value::Object(payload))
                            .with_clip(clip.id.clone())
                            .with_layer(new.id.clone()),
                    );
                }
            }
        }
    }
    Ok(())
}

fn diff_audio_tracks(
    old: &[AudioTrack],
    new: &[AudioTrack],
    ops: &mut Vec<Operation>,
) -> Result<(), TimelineError> {
    let old_by_id: HashMap<_, _> = old.iter().map(|t| (&t.id, t)).collect();
    let new_ids: HashSet<_> = new.iter().map(|t| &t.id).collect();

    for track in old.iter().filter(|t| !new_ids.contains(&t.id)) {
        ops.push(Operation::new(OperationKind::AudioTrackDelete, Value::Null).with_track(track.id.clone()));
    }

    for (index, track) in new.iter().enumerate() {
        let Some(previous) = old_by_id.get(&track.id) else {
            ops.push(
                Operation::new(OperationKind::AudioTrackAdd, encode(track)?)
                    .with_track(track.id.clone())
                    .with_index(index),
            );
            continue;
        };

        let changes = diff_fields(
            &encode_map(*previous)?,
            &encode_map(track)?,
            &[],
            OperationKind::AudioTrackUpdate,
        );
        for (kind, payload) in changes {
            ops.push(Operation::new(kind, Value::Object(payload)).with_track(track.id.clone()));
        }
        diff_audio_clips(previous, track, ops)?;
    }

    if let Some(order) = reordered(old.iter().map(|t| &t.id), new.iter().map(|t| &t.id)) {
        ops.push(Operation::new(OperationKind::AudioTrackReorder, serde_json::json!({ "order": order })));
    }
    Ok(())
}

fn diff_audio_clips(
    old: &AudioTrack,
    new: &AudioTrack,
    ops: &mut Vec<Operation>,
) -> Result<(), TimelineError> {
    let old_by_id: HashMap<_, _> = old.clips.iter().map(|c| (&c.id, c)).collect();
    let new_ids: HashSet<_> = new.clips.iter().map(|c| &c.id).collect();

    for clip in old.clips.iter().filter(|c| !new_ids.contains(&c.id)) {
        ops.push(
            Operation::new(OperationKind::AudioClipDelete, Value::Null)
                .with_clip(clip.id.clone())
                .with_track(new.id.clone()),
        );
    }

    for (index, clip) in new.clips.iter().enumerate() {
        match old_by_id.get(&clip.id) {
            None => ops.push(
                Operation::new(OperationKind::AudioClipAdd, encode(clip)?)
                    .with_clip(clip.id.clone())
                    .with_track(new.id.clone())
                    .with_index(index),
            ),
            Some(previous) => {
                let changes = diff_fields(
                    &encode_map(*previous)?,
                    &encode_map(clip)?,
                    &[],
                    OperationKind::AudioClipUpdate,
                );
                for (kind, payload) in changes {
                    ops.push(
                        Operation::new(kind, Value::Object(payload))
                            .with_clip(clip.id.clone())
                            .with_track(new.id.clone()),
                    );
                }
            }
        }
    }
    Ok(())
}

fn diff_markers(old: &[Marker], new: &[Marker], ops: &mut Vec<Operation>) -> Result<(), TimelineError> {
    let old_by_id: HashMap<_, _> = old.iter().map(|m| (&m.id, m)).collect();
    let new_ids: HashSet<_> = new.iter().map(|m| &m.id).collect();

    for marker in old.iter().filter(|m| !new_ids.contains(&m.id)) {
        ops.push(Operation::new(OperationKind::MarkerDelete, Value::Null).with_marker(marker.id.clone()));
    }

    for (index, marker) in new.iter().enumerate() {
        match old_by_id.get(&marker.id) {
            None => ops.push(
                Operation::new(OperationKind::MarkerAdd, encode(marker)?)
                    .with_marker(marker.id.clone())
                    .with_index(index),
            ),
            Some(previous) => {
                let changes = diff_fields(
                    &encode_map(*previous)?,
                    &encode_map(marker)?,
                    &[],
                    OperationKind::MarkerUpdate,
                );
                for (kind, payload) in changes {
                    ops.push(Operation::new(kind, Value::Object(payload)).with_marker(marker.id.clone()));
                }
            }
        }
    }
    Ok(())
}

/// Compares two encoded items bucket by bucket.
///
/// A bucket whose keys differ yields one payload carrying every key of that
/// bucket. Remaining changed keys share one `fallback` payload; keys that
/// vanished are sent as `null`.
fn diff_fields(
    old: &Map<String, Value>,
    new: &Map<String, Value>,
    buckets: &[Bucket],
    fallback: OperationKind,
) -> Vec<(OperationKind, Map<String, Value>)> {
    let mut out = Vec::new();
    let mut bucketed: HashSet<&str> = HashSet::new();

    for (kind, keys) in buckets {
        bucketed.extend(keys.iter().copied());
        if keys.iter().any(|k| old.get(*k) != new.get(*k)) {
            let payload = keys
                .iter()
                .map(|k| (k.to_string(), new.get(*k).cloned().unwrap_or(Value::Null)))
                .collect();
            out.push((*kind, payload));
        }
    }

    let mut rest = Map::new();
    let removed = old.keys().filter(|k| !new.contains_key(*k));
    for key in new.keys().chain(removed) {
        if bucketed.contains(key.as_str()) || STRUCTURAL_KEYS.contains(&key.as_str()) {
            continue;
        }
        if old.get(key) != new.get(key) {
            rest.insert(key.clone(), new.get(key).cloned().unwrap_or(Value::Null));
        }
    }
    if !rest.is_empty() {
        out.push((fallback, rest));
    }
    out
}

/// Returns the new id order when both sides hold the same ids in a different order.
fn reordered<'a, T>(
    old: impl Iterator<Item = &'a T>,
    new: impl Iterator<Item = &'a T>,
) -> Option<Vec<String>>
where
    T: ToString + Eq + std::hash::Hash + 'a,
{
    let old_ids: Vec<&T> = old.collect();
    let new_ids: Vec<&T> = new.collect();
    if old_ids.len() != new_ids.len() || old_ids == new_ids {
        return None;
    }
    let old_set: HashSet<&T> = old_ids.iter().copied().collect();
    if new_ids.iter().any(|id| !old_set.contains(id)) {
        return None;
    }
    Some(new_ids.iter().map(|id| id.to_string()).collect())
}

fn encode<T: Serialize>(item: &T) -> Result<Value, TimelineError> {
    serde_json::to_value(item).map_err(|e| TimelineError::Encode(e.to_string()))
}

fn encode_map<T: Serialize>(item: &T) -> Result<Map<String, Value>, TimelineError> {
    match encode(item)? {
        Value::Object(map) => Ok(map),
        other => Err(TimelineError::Encode(format!("expected object, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{apply_operations, AudioClip, Clip, ClipGroup, GroupId, LayerKind, Shape};

    fn sample() -> Timeline {
        let mut video = Layer::new("Video", LayerKind::Video);
        video.clips.push(Clip::asset("intro.mp4", 0, 3000));
        video.clips.push(Clip::asset("broll.mp4", 3000, 2000));

        let mut titles = Layer::new("Titles", LayerKind::Text);
        titles.clips.push(Clip::text("Hello", 500, 1500));

        let mut shapes = Layer::new("Shapes", LayerKind::Shape);
        shapes.clips.push(Clip::shape(
            Shape {
                kind: "rect".to_string(),
                fill: Some("#ffffff".to_string()),
                stroke: None,
                stroke_width: 0.0,
                corner_radius: 4.0,
            },
            0,
            1000,
        ));

        let mut music = AudioTrack::new("Music");
        music.clips.push(AudioClip::new("song.mp3", 0, 5000));

        Timeline {
            version: 3,
            duration_ms: 5000,
            layers: vec![titles, shapes, video],
            audio_tracks: vec![music],
            markers: vec![Marker::new(1000, "Beat")],
            groups: Vec::new(),
        }
    }

    fn assert_round_trip(old: &Timeline, new: &Timeline) -> Vec<Operation> {
        let ops = diff(old, new);
        let mut patched = old.clone();
        let report = apply_operations(&mut patched, &ops);
        assert!(report.skipped.is_empty(), "skipped: {:?}", report.skipped);
        assert!(patched.same_content(new), "ops {:?} did not reproduce target", ops);
        ops
    }

    #[test]
    fn test_identical_snapshots_produce_no_operations() {
        let timeline = sample();
        assert!(diff(&timeline, &timeline).is_empty());
        assert!(diff(&Timeline::default(), &Timeline::default()).is_empty());
    }

    #[test]
    fn test_version_only_change_is_not_a_change() {
        let old = sample();
        let mut new = old.clone();
        new.version = 9;
        assert!(diff(&old, &new).is_empty());
    }

    #[test]
    fn test_move_clip_emits_single_trim() {
        let old = sample();
        let mut new = old.clone();
        new.layers[2].clips[1].start_ms = 4000;

        let ops = assert_round_trip(&old, &new);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::ClipTrim);
        assert_eq!(ops[0].clip_id.as_ref(), Some(&new.layers[2].clips[1].id));
        assert_eq!(ops[0].layer_id.as_ref(), Some(&new.layers[2].id));
        // The whole bucket travels, including unchanged siblings.
        assert_eq!(ops[0].data["start_ms"], 4000);
        assert_eq!(ops[0].data["duration_ms"], 2000);
        assert_eq!(ops[0].data["speed"], 1.0);
    }

    #[test]
    fn test_delete_layer_emits_single_delete() {
        let old = sample();
        let mut new = old.clone();
        let removed = new.layers.remove(1);

        let ops = assert_round_trip(&old, &new);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::LayerDelete);
        assert_eq!(ops[0].layer_id, Some(removed.id));
    }

    #[test]
    fn test_reorder_with_identical_ids() {
        let old = sample();
        let mut new = old.clone();
        new.layers.rotate_right(1);

        let ops = assert_round_trip(&old, &new);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::LayerReorder);
        let expected: Vec<String> = new.layers.iter().map(|l| l.id.to_string()).collect();
        assert_eq!(ops[0].data["order"], serde_json::json!(expected));
    }

    #[test]
    fn test_reorder_audio_tracks() {
        let mut old = sample();
        old.audio_tracks.push(AudioTrack::new("Voice"));
        let mut new = old.clone();
        new.audio_tracks.swap(0, 1);

        let ops = assert_round_trip(&old, &new);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::AudioTrackReorder);
    }

    #[test]
    fn test_reorder_skipped_when_ids_change() {
        let old = sample();
        let mut new = old.clone();
        new.layers.push(Layer::new("Overlay", LayerKind::Image));
        new.layers.swap(0, 3);

        let ops = assert_round_trip(&old, &new);
        assert!(ops.iter().all(|op| op.kind != OperationKind::LayerReorder));
        // The add alone cannot restore the moved layers.
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::TimelineFullReplace);
    }

    #[test]
    fn test_add_at_position_needs_no_reorder() {
        let old = sample();
        let mut new = old.clone();
        new.layers.insert(1, Layer::new("Overlay", LayerKind::Image));

        let ops = assert_round_trip(&old, &new);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::LayerAdd);
        assert_eq!(ops[0].index, Some(1));
    }

    #[test]
    fn test_opacity_change_is_a_transform_bucket() {
        let old = sample();
        let mut new = old.clone();
        new.layers[0].clips[0].transform.opacity = 0.25;

        let ops = assert_round_trip(&old, &new);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::ClipTransform);
        assert_eq!(ops[0].data["transform"]["opacity"], 0.25);
    }

    #[test]
    fn test_transform_and_text_yield_two_operations() {
        let old = sample();
        let mut new = old.clone();
        let clip = &mut new.layers[0].clips[0];
        clip.transform.x = 120.0;
        clip.transform.rotation = 15.0;
        clip.text_content = Some("Goodbye".to_string());

        let ops = assert_round_trip(&old, &new);
        let kinds: Vec<_> = ops.iter().map(|op| op.kind).collect();
        assert_eq!(kinds, vec![OperationKind::ClipTransform, OperationKind::ClipText]);
    }

    #[test]
    fn test_generic_update_carries_only_changed_keys() {
        let old = sample();
        let mut new = old.clone();
        new.layers[2].clips[0].fade_in_ms = Some(250);
        new.layers[2].clips[0].group_id = Some(GroupId::from("g1"));

        let ops = assert_round_trip(&old, &new);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::ClipUpdate);
        let data = ops[0].data.as_object().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data["fade_in_ms"], 250);
        assert_eq!(data["group_id"], "g1");
    }

    #[test]
    fn test_removed_optional_field_is_sent_as_null() {
        let mut old = sample();
        old.layers[2].clips[0].fade_out_ms = Some(400);
        let mut new = old.clone();
        new.layers[2].clips[0].fade_out_ms = None;

        let ops = assert_round_trip(&old, &new);
        assert_eq!(ops[0].kind, OperationKind::ClipUpdate);
        assert!(ops[0].data["fade_out_ms"].is_null());
    }

    #[test]
    fn test_layer_scalar_change_and_clip_add() {
        let old = sample();
        let mut new = old.clone();
        new.layers[1].visible = false;
        new.layers[1].name = "Hidden".to_string();
        new.layers[1].clips.insert(0, Clip::asset("logo.png", 0, 500));

        let ops = assert_round_trip(&old, &new);
        let kinds: Vec<_> = ops.iter().map(|op| op.kind).collect();
        assert_eq!(kinds, vec![OperationKind::LayerUpdate, OperationKind::ClipAdd]);
        assert!(ops[0].data.get("clips").is_none());
        assert_eq!(ops[1].index, Some(0));
        assert_eq!(ops[1].data["asset_id"], "logo.png");
    }

    #[test]
    fn test_clip_moved_between_layers() {
        let old = sample();
        let mut new = old.clone();
        let clip = new.layers[2].clips.remove(1);
        new.layers[1].clips.push(clip);

        let ops = assert_round_trip(&old, &new);
        let kinds: Vec<_> = ops.iter().map(|op| op.kind).collect();
        assert_eq!(kinds, vec![OperationKind::ClipAdd, OperationKind::ClipDelete]);
    }

    #[test]
    fn test_audio_and_marker_changes() {
        let old = sample();
        let mut new = old.clone();
        new.audio_tracks[0].volume = 0.5;
        new.audio_tracks[0].clips[0].muted = true;
        new.markers[0].name = "Drop".to_string();
        new.markers.push(Marker::new(4000, "Outro"));

        let ops = assert_round_trip(&old, &new);
        let kinds: Vec<_> = ops.iter().map(|op| op.kind).collect();
        assert_eq!(
            kinds,
            vec![
                OperationKind::AudioTrackUpdate,
                OperationKind::AudioClipUpdate,
                OperationKind::MarkerUpdate,
                OperationKind::MarkerAdd,
            ]
        );
    }

    #[test]
    fn test_ceiling_falls_back_to_full_replace() {
        let mut old = Timeline::default();
        let mut layer = Layer::new("Busy", LayerKind::Video);
        for i in 0..51 {
            layer.clips.push(Clip::asset(format!("clip-{}.mp4", i), i * 100, 100));
        }
        old.layers.push(layer);

        let mut new = old.clone();
        for clip in &mut new.layers[0].clips {
            clip.transform.x += 10.0;
        }

        let ops = diff(&old, &new);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::TimelineFullReplace);
        let replaced: Timeline = serde_json::from_value(ops[0].data.clone()).unwrap();
        assert_eq!(replaced, new);
    }

    #[test]
    fn test_exactly_fifty_operations_stay_granular() {
        let mut old = Timeline::default();
        let mut layer = Layer::new("Busy", LayerKind::Video);
        for i in 0..50 {
            layer.clips.push(Clip::asset(format!("clip-{}.mp4", i), i * 100, 100));
        }
        old.layers.push(layer);
        let mut new = old.clone();
        new.layers[0].clips.iter_mut().for_each(|c| c.speed = 2.0);

        let ops = diff(&old, &new);
        assert_eq!(ops.len(), MAX_OPERATIONS);
        assert!(ops.iter().all(|op| op.kind == OperationKind::ClipTrim));
    }

    #[test]
    fn test_uncovered_change_falls_back_to_full_replace() {
        let old = sample();
        let mut new = old.clone();
        new.groups.push(ClipGroup {
            id: GroupId::from("g1"),
            clip_ids: vec![old.layers[2].clips[0].id.clone()],
        });

        let ops = diff(&old, &new);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::TimelineFullReplace);
    }

    #[test]
    fn test_clip_reorder_within_layer_falls_back_to_full_replace() {
        let old = sample();
        let mut new = old.clone();
        new.layers[2].clips.swap(0, 1);

        let ops = assert_round_trip(&old, &new);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::TimelineFullReplace);
    }

    #[test]
    fn test_duration_only_change_falls_back_to_full_replace() {
        let old = sample();
        let mut new = old.clone();
        new.duration_ms = 9000;

        let ops = assert_round_trip(&old, &new);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::TimelineFullReplace);
    }

    #[test]
    fn test_derived_duration_does_not_block_granular_ops() {
        let old = sample();
        let mut new = old.clone();
        new.layers[2].clips[1].start_ms = 5000;
        new.duration_ms = new.computed_duration_ms();

        let ops = diff(&old, &new);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::ClipTrim);
    }

    #[test]
    fn test_clip_reorder_next_to_marker_rename_falls_back_to_full_replace() {
        let old = sample();
        let mut new = old.clone();
        new.layers[2].clips.swap(0, 1);
        new.markers[0].name = "Drop".to_string();

        let ops = assert_round_trip(&old, &new);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::TimelineFullReplace);
    }

    #[test]
    fn test_group_change_next_to_trim_falls_back_to_full_replace() {
        let old = sample();
        let mut new = old.clone();
        new.layers[2].clips[1].start_ms = 4000;
        new.groups.push(ClipGroup {
            id: GroupId::from("g1"),
            clip_ids: vec![old.layers[2].clips[0].id.clone()],
        });

        let ops = assert_round_trip(&old, &new);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::TimelineFullReplace);
    }

    #[test]
    fn test_diff_is_deterministic() {
        let old = sample();
        let mut new = old.clone();
        new.layers.remove(0);
        new.layers[0].clips[0].crop = Some(crate::Crop {
            top: 0.1,
            ..Default::default()
        });
        new.markers.clear();

        assert_eq!(diff(&old, &new), diff(&old, &new));
    }
}
