//! Message delivery protocol: message submission.
//!
//! The server owns the id, sender and reception time of every message; the
//! client only chooses recipient, subject, body, lifetime and flags.

use encore_core::{Environment, NewMessage, StoredMessage};
use encore_proto::{AnyDataHolder, ProtocolId, StreamReader, StreamWriter, TextMessage, protocol};

use crate::{
    dispatcher::{Access, Call, RouteTable},
    handler_error::HandlerError,
    storage::Storage,
};

/// Register the message delivery methods.
pub fn register<E: Environment, S: Storage>(table: &mut RouteTable<E, S>) {
    table.insert(
        ProtocolId::MessageDelivery,
        protocol::message_delivery::DELIVER_MESSAGE,
        Access::Secure,
        deliver_message,
    );
}

/// Read a `"TextMessage"` holder.
pub(crate) fn read_text_message(params: &mut StreamReader<'_>) -> Result<TextMessage, HandlerError> {
    let holder: AnyDataHolder = params.read_structure()?;
    Ok(TextMessage::from_holder(&holder)?)
}

/// Store `message` for its recipient as sent by the caller. Returns the
/// message as stored.
pub(crate) fn deliver<E: Environment, S: Storage>(
    call: &Call<'_, E, S>,
    message: TextMessage,
) -> Result<TextMessage, HandlerError> {
    let header = message.header;
    let recipient = header.recipient;
    let now = call.now();

    let mut store = call.services.messages();
    let id = store
        .deliver(
            NewMessage {
                recipient,
                parent_id: header.parent_id,
                sender_pid: call.session.pid,
                sender: call.session.username.clone(),
                lifetime: header.lifetime,
                flags: header.flags,
                subject: header.subject,
                body: message.body,
            },
            now,
        )
        .ok_or_else(|| HandlerError::InvalidArgument("every message id is in use".to_string()))?;

    tracing::debug!(from = call.session.pid, to = recipient.inbox_id(), id, "delivered message");

    store
        .get(&recipient, id)
        .map(StoredMessage::text_message)
        .ok_or_else(|| HandlerError::InvalidArgument(format!("message {id} missing after delivery")))
}

fn deliver_message<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let message = read_text_message(&mut call.params())?;
    let stored = deliver(call, message)?;

    let mut reply = StreamWriter::new();
    reply.write_structure(&stored.to_holder());
    Ok(reply)
}
