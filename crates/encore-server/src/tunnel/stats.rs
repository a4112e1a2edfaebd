//! Statistic reports: performances, accomplishments, pad stats.
//!
//! Each report becomes one [`StatRecord`] keyed by `(pid, kind, subject)`;
//! a later report for the same key replaces the earlier one. Fields the
//! server does not rank on are kept verbatim.

use std::collections::BTreeMap;

use encore_core::Environment;
use encore_proto::tunnel::TunnelResponse;

use super::{TunnelCall, TunnelRegistry};
use crate::{
    handler_error::HandlerError,
    storage::{StatRecord, Storage},
};

pub(super) fn register<E: Environment, S: Storage>(registry: &mut TunnelRegistry<E, S>) {
    registry.insert("performance/record", performance_record);
    registry.insert("accomplishment/record", accomplishment_record);
    registry.insert("stats/pad_user", pad_user);
}

/// Store one report. `subject` and `value` name the arguments that key and
/// rank it; every other argument except `pid` lands in `fields`.
fn record<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
    kind: &str,
    subject: Option<&str>,
    value: Option<&str>,
) -> Result<TunnelResponse, HandlerError> {
    let pid = call.pid()?;
    let subject_id = subject.map(|name| call.args.int(name)).transpose()?.unwrap_or(0);
    let value_num = value.map(|name| call.args.int(name)).transpose()?.unwrap_or(0);

    let fields: BTreeMap<String, String> = call
        .args
        .iter()
        .filter(|(name, _)| *name != "pid" && Some(*name) != subject && Some(*name) != value)
        .map(|(name, v)| (name.to_string(), v.as_string()))
        .collect();

    call.services.repo.put_stat(&StatRecord {
        pid,
        kind: kind.to_string(),
        subject: subject_id,
        value: value_num,
        fields,
        recorded_at: call.now(),
    })?;
    tracing::debug!(pid, kind, subject = subject_id, "stat recorded");
    Ok(call.empty())
}

fn performance_record<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
) -> Result<TunnelResponse, HandlerError> {
    record(call, "performance", Some("song_id"), Some("score"))
}

fn accomplishment_record<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
) -> Result<TunnelResponse, HandlerError> {
    record(call, "accomplishment", Some("acc_id"), Some("value"))
}

fn pad_user<E: Environment, S: Storage>(call: &TunnelCall<'_, E, S>) -> Result<TunnelResponse, HandlerError> {
    record(call, "pad_user", None, None)
}
