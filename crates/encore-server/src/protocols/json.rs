//! JSON protocol: the tunnel's RMC entry point.

use encore_core::Environment;
use encore_proto::{ProtocolId, StreamWriter, protocol};

use crate::{
    dispatcher::{Access, Call, RouteTable},
    handler_error::HandlerError,
    storage::Storage,
};

/// Register the JSON methods.
pub fn register<E: Environment, S: Storage>(table: &mut RouteTable<E, S>) {
    table.insert(ProtocolId::Json, protocol::json::REQUEST, Access::Secure, request);
    table.insert(ProtocolId::Json, protocol::json::REQUEST2, Access::Secure, request2);
}

/// `Request(text)`: run one tunnel request and reply with its JSON text.
fn request<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let text = call.params().read_string()?;
    let response = call.services.tunnel().handle(call.session, call.services, &text)?;

    let mut reply = StreamWriter::new();
    reply.write_string(&response);
    Ok(reply)
}

/// `Request2(text)`: run one tunnel request; the reply body stays empty.
fn request2<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let text = call.params().read_string()?;
    let response = call.services.tunnel().handle(call.session, call.services, &text)?;
    tracing::trace!(pid = call.session.pid, len = response.len(), "json request2 handled");
    Ok(StreamWriter::new())
}
