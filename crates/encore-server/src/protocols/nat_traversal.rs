//! NAT traversal: probe relaying.
//!
//! A client about to join a peer asks the server to tell that peer to start
//! probing back. The server forwards the caller's public URL to every
//! connected client named by an `RVCID` in the request.

use encore_core::Environment;
use encore_proto::{
    ProtocolId, RmcRequest, StationUrl, StreamWriter, protocol, station_url::KEY_RVCID,
};

use crate::{
    dispatcher::{Access, Call, RouteTable},
    handler_error::HandlerError,
    storage::Storage,
};

/// Register the NAT traversal methods.
pub fn register<E: Environment, S: Storage>(table: &mut RouteTable<E, S>) {
    use protocol::nat_traversal::{REPORT_NAT_PROPERTIES, REPORT_NAT_TRAVERSAL_RESULT, REQUEST_PROBE_INITIATION};

    table.insert(ProtocolId::NatTraversal, REQUEST_PROBE_INITIATION, Access::Secure, request_probe_initiation);
    table.insert(ProtocolId::NatTraversal, REPORT_NAT_TRAVERSAL_RESULT, Access::Secure, report_result);
    table.insert(ProtocolId::NatTraversal, REPORT_NAT_PROPERTIES, Access::Secure, report_properties);
}

/// `InitiateProbe(url)` request sent to a peer.
pub fn initiate_probe(call_id: u32, caller: &StationUrl) -> RmcRequest {
    let mut params = StreamWriter::new();
    params.write_structure(caller);
    RmcRequest {
        protocol_id: ProtocolId::NatTraversal.to_u8(),
        call_id,
        method_id: protocol::nat_traversal::INITIATE_PROBE,
        parameters: params.freeze(),
    }
}

fn request_probe_initiation<E: Environment, S: Storage>(
    call: &mut Call<'_, E, S>,
) -> Result<StreamWriter, HandlerError> {
    let targets = call.params().read_list(|r| r.read_structure::<StationUrl>())?;
    let Some(caller) = call.session.station_urls.first() else {
        return Err(HandlerError::InvalidArgument("caller has not registered a station url".to_string()));
    };

    let services = call.services;
    for cid in targets.iter().filter_map(|u| u.get_u32(KEY_RVCID)) {
        if cid == call.session.connection_id {
            continue;
        }
        let message = initiate_probe(services.next_call_id(), caller).encode();
        if !services.registry.notify(cid, message) {
            tracing::debug!(from = call.session.connection_id, to = cid, "probe target not reachable");
        }
    }
    Ok(StreamWriter::new())
}

fn report_result<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let mut params = call.params();
    let cid = params.read_u32()?;
    let success = params.read_bool()?;
    tracing::debug!(pid = call.session.pid, peer = cid, success, "nat traversal result");
    Ok(StreamWriter::new())
}

fn report_properties<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let mut params = call.params();
    let natm = params.read_u32()?;
    let natf = params.read_u32()?;
    let rtt = params.read_u32()?;
    tracing::debug!(pid = call.session.pid, natm, natf, rtt, "nat properties");
    Ok(StreamWriter::new())
}
