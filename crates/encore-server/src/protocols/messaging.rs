//! Messaging protocol: inbox queries.
//!
//! Inboxes are addressed as `(id, type)`: type 1 is a principal and needs
//! that PID on the caller's stack, type 2 is a gathering.

use encore_core::Environment;
use encore_proto::{
    MessageRecipient, ProtocolId, RecipientType, StreamReader, StreamWriter, TextMessage, protocol,
};

use crate::{
    dispatcher::{Access, Call, RouteTable},
    handler_error::HandlerError,
    protocols::message_delivery,
    storage::Storage,
};

/// Register the messaging methods.
pub fn register<E: Environment, S: Storage>(table: &mut RouteTable<E, S>) {
    use protocol::messaging::{
        DELETE_ALL_MESSAGES, DELETE_MESSAGES, DELIVER_MESSAGE_MULTI_TARGET, GET_MESSAGE_HEADERS,
        GET_NUMBER_OF_MESSAGES, RETRIEVE_MESSAGES,
    };

    table.insert(ProtocolId::Messaging, GET_NUMBER_OF_MESSAGES, Access::Secure, get_number_of_messages);
    table.insert(ProtocolId::Messaging, GET_MESSAGE_HEADERS, Access::Secure, get_message_headers);
    table.insert(ProtocolId::Messaging, RETRIEVE_MESSAGES, Access::Secure, retrieve_messages);
    table.insert(ProtocolId::Messaging, DELETE_MESSAGES, Access::Secure, delete_messages);
    table.insert(ProtocolId::Messaging, DELETE_ALL_MESSAGES, Access::Secure, delete_all_messages);
    table.insert(ProtocolId::Messaging, DELIVER_MESSAGE_MULTI_TARGET, Access::Secure, deliver_multi_target);
}

/// Read `(id, type)` and check the caller may open that inbox.
fn read_inbox<E: Environment, S: Storage>(
    call: &Call<'_, E, S>,
    params: &mut StreamReader<'_>,
) -> Result<MessageRecipient, HandlerError> {
    let id = params.read_u32()?;
    let kind = params.read_u32()?;
    match RecipientType::from_u32(kind) {
        Some(RecipientType::Principal) => {
            call.validate_pid(id)?;
            Ok(MessageRecipient::principal(id))
        },
        Some(RecipientType::Gathering) => Ok(MessageRecipient::gathering(id)),
        None => Err(HandlerError::InvalidArgument(format!("recipient type {kind}"))),
    }
}

fn get_number_of_messages<E: Environment, S: Storage>(
    call: &mut Call<'_, E, S>,
) -> Result<StreamWriter, HandlerError> {
    let mut params = call.params();
    let inbox = read_inbox(call, &mut params)?;
    let count = call.services.messages().count(&inbox, call.now());

    let mut reply = StreamWriter::new();
    reply.write_u32(count as u32);
    Ok(reply)
}

fn get_message_headers<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let mut params = call.params();
    let inbox = read_inbox(call, &mut params)?;
    let offset = params.read_u32()? as usize;
    let size = params.read_u32()? as usize;

    let headers = call.services.messages().headers(&inbox, offset, size, call.now());

    let mut reply = StreamWriter::new();
    reply.write_list(&headers, |w, header| {
        w.write_structure(header);
    });
    Ok(reply)
}

fn retrieve_messages<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let mut params = call.params();
    let inbox = read_inbox(call, &mut params)?;
    let ids = params.read_u32_list()?;
    let leave_on_server = params.read_bool()?;

    let messages: Vec<TextMessage> = call.services.messages().retrieve(&inbox, &ids, leave_on_server, call.now());

    let mut reply = StreamWriter::new();
    reply.write_list(&messages, |w, message| {
        w.write_structure(&message.to_holder());
    });
    Ok(reply)
}

fn delete_messages<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let mut params = call.params();
    let inbox = read_inbox(call, &mut params)?;
    let ids = params.read_u32_list()?;

    let deleted = call.services.messages().delete(&inbox, &ids);
    tracing::debug!(pid = call.session.pid, inbox = inbox.inbox_id(), deleted, "deleted messages");
    Ok(StreamWriter::new())
}

fn delete_all_messages<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let mut params = call.params();
    let inbox = read_inbox(call, &mut params)?;

    let deleted = call.services.messages().delete_all(&inbox);

    let mut reply = StreamWriter::new();
    reply.write_u32(deleted as u32);
    Ok(reply)
}

fn deliver_multi_target<E: Environment, S: Storage>(
    call: &mut Call<'_, E, S>,
) -> Result<StreamWriter, HandlerError> {
    let mut params = call.params();
    let targets = params.read_u32_list()?;
    let message = message_delivery::read_text_message(&mut params)?;

    for pid in targets {
        let mut copy = message.clone();
        copy.header.recipient = MessageRecipient::principal(pid);
        message_delivery::deliver(call, copy)?;
    }
    Ok(StreamWriter::new())
}
