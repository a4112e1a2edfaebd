//! Account management: per-console profiles and machine status.
//!
//! Profiles are created by the console's master user. The console that
//! created an account is the only one allowed to delete it.

use encore_core::{Environment, master_user};
use encore_proto::{
    ProtocolId, StationUrl, StreamReader, StreamWriter, UrlScheme, protocol,
    station_url::{KEY_ADDRESS, KEY_PID, KEY_PORT, KEY_RVCID, KEY_SID, KEY_TYPE},
};

use crate::{
    dispatcher::{Access, Call, RouteTable},
    handler_error::HandlerError,
    protocols::authentication,
    storage::Storage,
};

/// Register the account management methods.
pub fn register<E: Environment, S: Storage>(table: &mut RouteTable<E, S>) {
    use protocol::account_management::{
        DELETE_ACCOUNT, FIND_BY_NAME_LIKE, FIND_BY_NAME_REGEX, GET_NAME, GET_STATUS, LOOKUP_OR_CREATE_ACCOUNT,
        NINTENDO_CREATE_ACCOUNT, UPDATE_STATUS,
    };

    table.insert(ProtocolId::AccountManagement, NINTENDO_CREATE_ACCOUNT, Access::Secure, create_account);
    table.insert(ProtocolId::AccountManagement, LOOKUP_OR_CREATE_ACCOUNT, Access::Secure, create_account);
    table.insert(ProtocolId::AccountManagement, DELETE_ACCOUNT, Access::Secure, delete_account);
    table.insert(ProtocolId::AccountManagement, GET_NAME, Access::Secure, authentication::get_name);
    table.insert(ProtocolId::AccountManagement, FIND_BY_NAME_REGEX, Access::Secure, find_by_name);
    table.insert(ProtocolId::AccountManagement, FIND_BY_NAME_LIKE, Access::Secure, find_by_name);
    table.insert(ProtocolId::AccountManagement, UPDATE_STATUS, Access::Secure, update_status);
    table.insert(ProtocolId::AccountManagement, GET_STATUS, Access::Secure, get_status);
}

/// Station URL synthesized for a freshly created profile.
pub fn profile_station_url(address: std::net::SocketAddr, pid: u32, connection_id: u32) -> StationUrl {
    let mut url = StationUrl::new(UrlScheme::Prudp);
    url.set(KEY_ADDRESS, address.ip())
        .set(KEY_PORT, address.port())
        .set(KEY_PID, pid)
        .set(KEY_SID, 15)
        .set(KEY_TYPE, 3)
        .set(KEY_RVCID, connection_id);
    url
}

fn create_account<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let mut params = call.params();
    let username = params.read_string()?;
    let _key = params.read_string()?;
    let _groups = params.read_u32()?;
    let _email = params.read_string()?;
    // platform auth data may follow; it is not checked

    if username.is_empty() || master_user::is_master_name(&username) {
        return Err(HandlerError::InvalidUsername(username));
    }

    let pid = authentication::find_or_create_user(call, &username)?;
    call.session.pid_stack.push(pid);

    let url = profile_station_url(call.session.address, pid, call.session.connection_id);
    call.services.repo.update_user_station_urls(pid, Some(url.to_string()), None)?;
    match call.session.station_urls.first_mut() {
        Some(external) => *external = url,
        None => call.session.station_urls.push(url),
    }

    let mut reply = StreamWriter::new();
    reply.write_u32(pid);
    Ok(reply)
}

fn delete_account<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let pid = call.params().read_u32()?;
    let repo = &call.services.repo;

    let user = repo.get_user_by_pid(pid)?.ok_or(HandlerError::InvalidPid(pid))?;
    if call.session.machine_id == 0 || user.creator_machine != call.session.machine_id || pid == user.creator_machine {
        return Err(HandlerError::AccessDenied(format!("pid {pid} was not created by this console")));
    }

    repo.delete_user(pid)?;
    repo.remove_machine_user(user.creator_machine, pid)?;
    call.session.pid_stack.remove(pid);
    tracing::info!(pid, machine = user.creator_machine, "deleted account");
    Ok(StreamWriter::new())
}

fn read_name_query(params: &mut StreamReader<'_>) -> Result<String, HandlerError> {
    let _group = params.read_u32()?;
    let name = params.read_string()?;
    Ok(name)
}

fn find_by_name<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let name = read_name_query(&mut call.params())?;
    let repo = &call.services.repo;

    let mut found = Vec::new();
    if let Some(pid) = authentication::resolve_name(repo, &name)?
        && let Some(user) = repo.get_user_by_pid(pid)?
    {
        found.push((user.pid, user.username));
    }

    let mut reply = StreamWriter::new();
    reply.write_list(&found, |w, (pid, name)| {
        w.write_u32(*pid).write_string(name);
    });
    Ok(reply)
}

fn update_status<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let status = call.params().read_string()?;
    let machine_id = call.session.machine_id;
    if machine_id == 0 {
        return Err(HandlerError::AccessDenied("session has no console".to_string()));
    }
    call.services.repo.update_machine_status(machine_id, &status)?;
    Ok(StreamWriter::new())
}

fn get_status<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let pid = call.params().read_u32()?;
    let repo = &call.services.repo;

    let machine_id = match repo.get_machine_by_id(pid)? {
        Some(machine) => machine.id,
        None => repo.get_user_by_pid(pid)?.ok_or(HandlerError::InvalidPid(pid))?.creator_machine,
    };
    let status = repo.get_machine_by_id(machine_id)?.map(|m| m.status).unwrap_or_default();

    let mut reply = StreamWriter::new();
    reply.write_string(&status);
    Ok(reply)
}
