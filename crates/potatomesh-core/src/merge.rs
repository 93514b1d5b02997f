//! Field-level reconciliation of one node across sources.
//!
//! Base identity/display/config fields: a present source value overwrites,
//! an absent one never clears. The caller's merge order decides precedence.
//!
//! Timestamped blocks (telemetry, position): a candidate overwrites only when
//! its timestamp is strictly newer, and then the timestamp and ISO companion
//! move with it. Otherwise the candidate can only fill gaps.

use crate::identity::NodeRef;
use crate::node::{NodeAggregate, PositionBlock, TelemetryBlock};
use crate::records::NodeRecord;

fn overwrite<T: Clone>(slot: &mut Option<T>, candidate: &Option<T>) {
    if let Some(value) = candidate {
        *slot = Some(value.clone());
    }
}

fn apply<T: Clone>(slot: &mut Option<T>, candidate: &Option<T>, newer: bool) {
    if let Some(value) = candidate {
        if newer || slot.is_none() {
            *slot = Some(value.clone());
        }
    }
}

/// `true` when `candidate` should replace `current`.
pub fn is_newer(candidate: Option<i64>, current: Option<i64>) -> bool {
    match (candidate, current) {
        (Some(candidate), Some(current)) => candidate > current,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Overwrite-if-present for base fields. `last_heard` never moves backwards.
pub fn merge_base(target: &mut NodeAggregate, source: &NodeRecord) {
    overwrite(&mut target.node_id, &source.node_id);
    overwrite(&mut target.node_num, &source.node_num);
    overwrite(&mut target.short_name, &source.short_name);
    overwrite(&mut target.long_name, &source.long_name);
    overwrite(&mut target.role, &source.role);
    overwrite(&mut target.hw_model, &source.hw_model);
    overwrite(&mut target.modem_preset, &source.modem_preset);
    overwrite(&mut target.lora_freq, &source.lora_freq);
    overwrite(&mut target.first_heard, &source.first_heard);
    overwrite(&mut target.snr, &source.snr);
    overwrite(&mut target.hops_away, &source.hops_away);
    overwrite(&mut target.public_key, &source.public_key);

    if is_newer(source.last_heard, target.last_heard) {
        target.last_heard = source.last_heard;
        target.last_seen_iso = source.last_seen_iso.clone();
    }
}

/// Identifiers the caller passed explicitly take precedence over feed data.
pub fn merge_reference(target: &mut NodeAggregate, reference: &NodeRef) {
    if let Some(id) = reference.node_id() {
        target.node_id = Some(id.to_string());
    }
    if let Some(num) = reference.node_num() {
        target.node_num = Some(num);
    }
}

/// Prefer-existing-unless-newer merge of a telemetry block. Returns whether
/// the candidate's timestamp was taken.
pub fn merge_telemetry(target: &mut TelemetryBlock, candidate: &TelemetryBlock) -> bool {
    let newer = is_newer(candidate.time, target.time);
    for (metric, value) in &candidate.metrics {
        if newer {
            target.metrics.insert(*metric, *value);
        } else {
            target.metrics.entry(*metric).or_insert(*value);
        }
    }
    if newer {
        target.time = candidate.time;
        target.iso = candidate.iso.clone();
    }
    newer
}

/// Prefer-existing-unless-newer merge of a position block.
pub fn merge_position(target: &mut PositionBlock, candidate: &PositionBlock) -> bool {
    let newer = is_newer(candidate.time, target.time);
    apply(&mut target.latitude, &candidate.latitude, newer);
    apply(&mut target.longitude, &candidate.longitude, newer);
    apply(&mut target.altitude, &candidate.altitude, newer);
    apply(&mut target.sats_in_view, &candidate.sats_in_view, newer);
    apply(&mut target.precision_bits, &candidate.precision_bits, newer);
    apply(&mut target.location_source, &candidate.location_source, newer);
    if newer {
        target.time = candidate.time;
        target.iso = candidate.iso.clone();
    }
    newer
}

/// Base fields plus both timestamped blocks of a node record.
pub fn merge_record(target: &mut NodeAggregate, source: &NodeRecord) {
    merge_base(target, source);
    merge_telemetry(&mut target.telemetry, &source.telemetry);
    merge_position(&mut target.position, &source.position);
}

/// `last_heard = max(last_heard, telemetry time, position time)`; unset when
/// none of them is known. The ISO companion follows whichever wins.
pub fn derive_last_heard(node: &mut NodeAggregate) {
    let candidates = [
        (node.last_heard, node.last_seen_iso.clone()),
        (node.telemetry.time, node.telemetry.iso.clone()),
        (node.position.time, node.position.iso.clone()),
    ];
    let mut best: Option<(i64, Option<String>)> = None;
    for (time, iso) in candidates {
        if let Some(time) = time {
            if best.as_ref().map_or(true, |(current, _)| time > *current) {
                best = Some((time, iso));
            }
        }
    }
    if let Some((time, iso)) = best {
        if node.last_heard != Some(time) {
            node.last_heard = Some(time);
            node.last_seen_iso = iso;
        }
    }
}
