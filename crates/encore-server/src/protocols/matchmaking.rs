//! Matchmaking and custom matchmaking: the gathering lifecycle.
//!
//! A creator owns at most one gathering; registering again replaces the old
//! one. Discovery answers from a fresh repository snapshot on every query and
//! rewrites the host and owner PIDs of each result with the creator's PID.

use encore_core::{
    Environment, Gathering,
    gathering::{self, DISCOVERY_LIMIT, PUBLIC_OFFSET, read_u32_at},
};
use encore_proto::{AnyDataHolder, ProtocolId, StreamWriter, protocol};

use crate::{
    dispatcher::{Access, Call, RouteTable},
    handler_error::HandlerError,
    storage::{Storage, StorageError},
};

/// Type name of a gathering inside an `AnyDataHolder`.
pub const GATHERING_TYPE: &str = "HarmonixGathering";

/// Attempts at drawing an unused gathering id.
const ID_ATTEMPTS: usize = 16;

/// Register the matchmaking and custom matchmaking methods.
pub fn register<E: Environment, S: Storage>(table: &mut RouteTable<E, S>) {
    use protocol::matchmaking::{
        FIND_BY_ID, FIND_BY_SINGLE_ID, GET_STATE, REGISTER_GATHERING, SET_STATE, TERMINATE_GATHERING,
        UPDATE_GATHERING,
    };

    table.insert(ProtocolId::Matchmaking, REGISTER_GATHERING, Access::Secure, register_gathering);
    table.insert(ProtocolId::Matchmaking, TERMINATE_GATHERING, Access::Secure, terminate_gathering);
    table.insert(ProtocolId::Matchmaking, UPDATE_GATHERING, Access::Secure, update_gathering);
    table.insert(ProtocolId::Matchmaking, FIND_BY_ID, Access::Secure, find_by_id);
    table.insert(ProtocolId::Matchmaking, FIND_BY_SINGLE_ID, Access::Secure, find_by_single_id);
    table.insert(ProtocolId::Matchmaking, GET_STATE, Access::Secure, get_state);
    table.insert(ProtocolId::Matchmaking, SET_STATE, Access::Secure, set_state);
    table.insert(ProtocolId::CustomMatchmaking, protocol::custom_matchmaking::CUSTOM_FIND, Access::Secure, custom_find);
}

fn discovery_holder(gathering: &Gathering) -> AnyDataHolder {
    AnyDataHolder::new(GATHERING_TYPE, gathering.discovery_contents())
}

fn require_gathering<E: Environment, S: Storage>(call: &Call<'_, E, S>, id: u32) -> Result<Gathering, HandlerError> {
    call.services.repo.find_gathering(id)?.ok_or_else(|| HandlerError::InvalidArgument(format!("no gathering {id}")))
}

fn require_creator(call_username: &str, gathering: &Gathering) -> Result<(), HandlerError> {
    if gathering.creator == call_username {
        Ok(())
    } else {
        Err(HandlerError::AccessDenied(format!("gathering {} belongs to {}", gathering.id, gathering.creator)))
    }
}

fn register_gathering<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let holder: AnyDataHolder = call.params().read_structure()?;
    call.require_non_master()?;

    let services = call.services;
    let session = &*call.session;
    let now = call.now();

    let replaced = services.repo.delete_gatherings_by_creator(&session.username)?;
    let mut gathering = Gathering::new(0, &session.username, session.pid, holder.data.to_vec(), session.platform, now);
    gathering.public = read_u32_at(&gathering.contents, PUBLIC_OFFSET).is_some_and(|flag| flag != 0);

    for _ in 0..ID_ATTEMPTS {
        gathering.id = gathering::gathering_id_from_random(services.env.random_u32());
        match services.repo.insert_gathering(&gathering) {
            Ok(()) => {
                tracing::info!(pid = session.pid, id = gathering.id, replaced, "registered gathering");
                let mut reply = StreamWriter::new();
                reply.write_u32(gathering.id);
                return Ok(reply);
            },
            Err(StorageError::Conflict { .. }) => {},
            Err(err) => return Err(err.into()),
        }
    }
    Err(HandlerError::Storage(StorageError::Io("no free gathering id".to_string())))
}

fn update_gathering<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let holder: AnyDataHolder = call.params().read_structure()?;
    call.require_non_master()?;

    let id = read_u32_at(&holder.data, 0).ok_or_else(|| HandlerError::InvalidArgument("gathering too short".into()))?;
    let mut gathering = require_gathering(call, id)?;
    require_creator(&call.session.username, &gathering)?;

    gathering.apply_update(holder.data.to_vec(), call.now());
    call.services.repo.update_gathering(&gathering)?;

    let mut reply = StreamWriter::new();
    reply.write_bool(true);
    Ok(reply)
}

fn terminate_gathering<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let id = call.params().read_u32()?;
    call.require_non_master()?;

    let deleted = match call.services.repo.find_gathering(id)? {
        Some(gathering) => {
            require_creator(&call.session.username, &gathering)?;
            call.services.repo.delete_gathering(id)?
        },
        None => false,
    };

    let mut reply = StreamWriter::new();
    reply.write_bool(deleted);
    Ok(reply)
}

fn set_state<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let mut params = call.params();
    let id = params.read_u32()?;
    let state = params.read_u32()?;

    let mut gathering = require_gathering(call, id)?;
    gathering.set_state(state, call.now());
    call.services.repo.update_gathering(&gathering)?;

    let mut reply = StreamWriter::new();
    reply.write_bool(true);
    Ok(reply)
}

fn get_state<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let id = call.params().read_u32()?;
    let gathering = require_gathering(call, id)?;

    let mut reply = StreamWriter::new();
    reply.write_u32(gathering.state);
    Ok(reply)
}

fn find_by_id<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let ids = call.params().read_u32_list()?;

    let mut found = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(gathering) = call.services.repo.find_gathering(id)? {
            found.push(discovery_holder(&gathering));
        }
    }

    let mut reply = StreamWriter::new();
    reply.write_list(&found, |w, holder| {
        w.write_structure(holder);
    });
    Ok(reply)
}

fn find_by_single_id<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let id = call.params().read_u32()?;

    let mut reply = StreamWriter::new();
    match call.services.repo.find_gathering(id)? {
        Some(gathering) => reply.write_bool(true).write_structure(&discovery_holder(&gathering)),
        None => reply.write_bool(false).write_structure(&AnyDataHolder::new(GATHERING_TYPE, Vec::new())),
    };
    Ok(reply)
}

fn custom_find<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let services = call.services;
    let session = &*call.session;
    let now = call.now();

    let candidates: Vec<Gathering> = services
        .repo
        .list_gatherings()?
        .into_iter()
        .filter(|g| g.is_discoverable_by(&session.username, session.platform, now))
        .collect();
    let picked = gathering::sample(candidates, DISCOVERY_LIMIT, || services.env.random_u64());

    tracing::debug!(pid = session.pid, found = picked.len(), "custom find");

    let holders: Vec<AnyDataHolder> = picked.iter().map(discovery_holder).collect();
    let mut reply = StreamWriter::new();
    reply.write_list(&holders, |w, holder| {
        w.write_structure(holder);
    });
    Ok(reply)
}
