//! Secure protocol: station URL registration and peer lookup.
//!
//! The client registers the URLs it believes it has; the server rewrites the
//! public one with the address it actually observed, then publishes the
//! result so other clients can find it.

use encore_core::{Environment, SessionState};
use encore_proto::{
    ProtocolId, StationUrl, StreamWriter, UrlScheme,
    protocol::{self, LOGIN_RESULT_SUCCESS},
    station_url::{KEY_ADDRESS, KEY_PID, KEY_PORT, KEY_RVCID},
};

use crate::{
    dispatcher::{Access, Call, RouteTable},
    handler_error::HandlerError,
    storage::Storage,
};

/// Register the secure methods.
pub fn register<E: Environment, S: Storage>(table: &mut RouteTable<E, S>) {
    use protocol::secure::{
        REGISTER, REGISTER_EX, REPLACE_URL, REQUEST_CONNECTION_DATA, REQUEST_URLS, SEND_REPORT, TEST_CONNECTIVITY,
        UPDATE_URLS,
    };

    table.insert(ProtocolId::Secure, REGISTER, Access::Secure, register_urls);
    table.insert(ProtocolId::Secure, REGISTER_EX, Access::Secure, register_urls);
    table.insert(ProtocolId::Secure, REQUEST_CONNECTION_DATA, Access::Secure, request_connection_data);
    table.insert(ProtocolId::Secure, REQUEST_URLS, Access::Secure, request_urls);
    table.insert(ProtocolId::Secure, TEST_CONNECTIVITY, Access::Secure, test_connectivity);
    table.insert(ProtocolId::Secure, UPDATE_URLS, Access::Secure, update_urls);
    table.insert(ProtocolId::Secure, REPLACE_URL, Access::Secure, replace_url);
    table.insert(ProtocolId::Secure, SEND_REPORT, Access::Secure, send_report);
}

/// Public URL for `session`, derived from the client's first URL with the
/// observed address, PID and connection id filled in.
pub fn public_url(session: &SessionState, local: Option<&StationUrl>) -> StationUrl {
    let mut url = local.cloned().unwrap_or_else(|| StationUrl::new(UrlScheme::Prudp));
    url.set(KEY_ADDRESS, session.address.ip())
        .set(KEY_PORT, session.address.port())
        .set(KEY_PID, session.pid)
        .set(KEY_RVCID, session.connection_id);
    url
}

/// Store the session's URLs: public first, then the client's own.
fn publish<E: Environment, S: Storage>(call: &mut Call<'_, E, S>, urls: Vec<StationUrl>) -> Result<StationUrl, HandlerError> {
    let public = public_url(call.session, urls.first());
    let internal = urls.first().map(ToString::to_string);

    let mut station_urls = Vec::with_capacity(urls.len() + 1);
    station_urls.push(public.clone());
    station_urls.extend(urls);
    call.session.station_urls = station_urls;

    let services = call.services;
    let session = &*call.session;
    services.registry.update(session.connection_id, session.pid, &session.station_urls);
    services.repo.update_user_station_urls(session.pid, Some(public.to_string()), internal)?;
    if session.machine_id != 0 {
        services.repo.update_machine_url(session.machine_id, &public.to_string())?;
    }
    Ok(public)
}

fn register_urls<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    // RegisterEx appends login data after the list; nothing in it is used
    let urls = call.params().read_list(|r| r.read_structure::<StationUrl>())?;
    let public = publish(call, urls)?;

    tracing::debug!(pid = call.session.pid, cid = call.session.connection_id, %public, "registered station urls");

    let mut reply = StreamWriter::new();
    reply.write_u32(LOGIN_RESULT_SUCCESS).write_u32(call.session.connection_id).write_structure(&public);
    Ok(reply)
}

fn update_urls<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let urls = call.params().read_list(|r| r.read_structure::<StationUrl>())?;
    publish(call, urls)?;
    Ok(StreamWriter::new())
}

fn replace_url<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let mut params = call.params();
    let old: StationUrl = params.read_structure()?;
    let new: StationUrl = params.read_structure()?;

    let mut urls: Vec<StationUrl> = call.session.station_urls.iter().skip(1).cloned().collect();
    match urls.iter_mut().find(|u| **u == old) {
        Some(slot) => *slot = new,
        None => return Err(HandlerError::InvalidArgument(format!("{old} is not registered"))),
    }
    publish(call, urls)?;
    Ok(StreamWriter::new())
}

/// URLs of `pid`: live ones if connected, otherwise the stored pair.
fn lookup_urls<E: Environment, S: Storage>(
    call: &Call<'_, E, S>,
    cid: u32,
    pid: u32,
) -> Result<Option<(u32, Vec<StationUrl>)>, HandlerError> {
    let registry = &call.services.registry;
    let live = registry.lookup(cid).filter(|c| c.pid == pid).map(|c| (cid, c)).or_else(|| registry.find_by_pid(pid));
    if let Some((cid, client)) = live {
        return Ok(Some((cid, client.station_urls)));
    }

    let Some(user) = call.services.repo.get_user_by_pid(pid)? else {
        return Ok(None);
    };
    let urls = [user.external_url, user.internal_url]
        .into_iter()
        .flatten()
        .filter_map(|u| StationUrl::parse(&u).ok())
        .collect::<Vec<_>>();
    Ok((!urls.is_empty()).then_some((0, urls)))
}

fn request_connection_data<E: Environment, S: Storage>(
    call: &mut Call<'_, E, S>,
) -> Result<StreamWriter, HandlerError> {
    let mut params = call.params();
    let cid = params.read_u32()?;
    let pid = params.read_u32()?;

    let mut reply = StreamWriter::new();
    match lookup_urls(call, cid, pid)? {
        Some((cid, urls)) => {
            reply.write_bool(true).write_list(&urls, |w, url| {
                w.write_structure(url).write_u32(cid);
            });
        },
        None => {
            reply.write_bool(false).write_u32(0);
        },
    }
    Ok(reply)
}

fn request_urls<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let mut params = call.params();
    let cid = params.read_u32()?;
    let pid = params.read_u32()?;

    let mut reply = StreamWriter::new();
    match lookup_urls(call, cid, pid)? {
        Some((_, urls)) => reply.write_bool(true).write_list(&urls, |w, url| {
            w.write_structure(url);
        }),
        None => reply.write_bool(false).write_u32(0),
    };
    Ok(reply)
}

fn test_connectivity<E: Environment, S: Storage>(_call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    Ok(StreamWriter::new())
}

fn send_report<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let mut params = call.params();
    let report_id = params.read_u32()?;
    let data = params.read_qbuffer()?;
    tracing::info!(pid = call.session.pid, report_id, len = data.len(), "client report");
    Ok(StreamWriter::new())
}
