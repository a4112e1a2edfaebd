//! Binary data protocol: opaque per-key blobs.

use encore_core::Environment;
use encore_proto::{ProtocolId, StreamWriter, protocol};

use crate::{
    dispatcher::{Access, Call, RouteTable},
    handler_error::HandlerError,
    storage::{BlobRecord, Storage},
};

/// Register the binary data methods.
pub fn register<E: Environment, S: Storage>(table: &mut RouteTable<E, S>) {
    table.insert(ProtocolId::BinaryData, protocol::binary_data::SAVE, Access::Secure, save);
    table.insert(ProtocolId::BinaryData, protocol::binary_data::LOAD, Access::Secure, load);
}

/// `Save(key, data)`. The first principal to save a key owns it; nobody
/// else may overwrite it.
fn save<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let mut params = call.params();
    let key = params.read_string()?;
    let data = params.read_buffer()?;

    let repo = &call.services.repo;
    let owner = call.session.pid;
    if let Some(existing) = repo.load_blob(&key)?
        && existing.owner != owner
    {
        return Err(HandlerError::AccessDenied(format!("blob {key} belongs to {}", existing.owner)));
    }

    repo.save_blob(&key, &BlobRecord { owner, data: data.to_vec() })?;
    tracing::debug!(pid = owner, key, len = data.len(), "saved blob");
    Ok(StreamWriter::new())
}

fn load<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let key = call.params().read_string()?;
    let blob = call.services.repo.load_blob(&key)?.ok_or_else(|| HandlerError::InvalidArgument(format!("no blob {key}")))?;

    let mut reply = StreamWriter::new();
    reply.write_buffer(&blob.data);
    Ok(reply)
}
