//! Message structures exchanged by the messaging protocols.

use crate::{
    any_data::AnyDataHolder,
    datetime::PackedDateTime,
    errors::Result,
    stream::{StreamReader, StreamWriter, Structure},
};

/// Type name of a text message inside an [`AnyDataHolder`].
pub const TEXT_MESSAGE_TYPE: &str = "TextMessage";

/// What a message is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecipientType {
    /// A single principal
    Principal,
    /// Every member of a gathering
    Gathering,
}

impl RecipientType {
    /// Convert from the wire value (1 = principal, 2 = gathering).
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Principal),
            2 => Some(Self::Gathering),
            _ => None,
        }
    }

    /// Wire value.
    pub fn to_u32(self) -> u32 {
        match self {
            Self::Principal => 1,
            Self::Gathering => 2,
        }
    }
}

/// Recipient slot of a message.
///
/// The wire layout carries both a principal id and a gathering id; only the
/// one named by `recipient_type` is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRecipient {
    /// Raw recipient type (see [`RecipientType`])
    pub recipient_type: u32,
    /// Principal id, for principal recipients
    pub principal_id: u32,
    /// Gathering id, for gathering recipients
    pub gathering_id: u32,
}

impl MessageRecipient {
    /// Recipient addressing one principal.
    pub fn principal(pid: u32) -> Self {
        Self { recipient_type: RecipientType::Principal.to_u32(), principal_id: pid, gathering_id: 0 }
    }

    /// Recipient addressing a gathering.
    pub fn gathering(id: u32) -> Self {
        Self { recipient_type: RecipientType::Gathering.to_u32(), principal_id: 0, gathering_id: id }
    }

    /// Decoded recipient type.
    pub fn kind(&self) -> Option<RecipientType> {
        RecipientType::from_u32(self.recipient_type)
    }

    /// Id of the addressed inbox.
    pub fn inbox_id(&self) -> u32 {
        match self.kind() {
            Some(RecipientType::Gathering) => self.gathering_id,
            _ => self.principal_id,
        }
    }
}

impl Structure for MessageRecipient {
    fn write_to(&self, writer: &mut StreamWriter) {
        writer.write_u32(self.recipient_type).write_u32(self.principal_id).write_u32(self.gathering_id);
    }

    fn read_from(reader: &mut StreamReader<'_>) -> Result<Self> {
        Ok(Self {
            recipient_type: reader.read_u32()?,
            principal_id: reader.read_u32()?,
            gathering_id: reader.read_u32()?,
        })
    }
}

/// Message header: every fixed field plus subject and sender, no body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessage {
    /// Server-assigned message id
    pub id: u32,
    /// Thread parent id
    pub parent_id: u32,
    /// Sender principal id
    pub sender_pid: u32,
    /// Reception time
    pub reception_time: PackedDateTime,
    /// Seconds the message stays reachable after reception
    pub lifetime: u32,
    /// Client-defined flags
    pub flags: u32,
    /// Subject line
    pub subject: String,
    /// Sender display name
    pub sender: String,
    /// Recipient
    pub recipient: MessageRecipient,
}

impl Structure for UserMessage {
    fn write_to(&self, writer: &mut StreamWriter) {
        writer
            .write_u32(self.id)
            .write_u32(self.parent_id)
            .write_u32(self.sender_pid)
            .write_u64(self.reception_time.value())
            .write_u32(self.lifetime)
            .write_u32(self.flags)
            .write_string(&self.subject)
            .write_string(&self.sender)
            .write_structure(&self.recipient);
    }

    fn read_from(reader: &mut StreamReader<'_>) -> Result<Self> {
        Ok(Self {
            id: reader.read_u32()?,
            parent_id: reader.read_u32()?,
            sender_pid: reader.read_u32()?,
            reception_time: PackedDateTime::from_raw(reader.read_u64()?),
            lifetime: reader.read_u32()?,
            flags: reader.read_u32()?,
            subject: reader.read_string()?,
            sender: reader.read_string()?,
            recipient: reader.read_structure()?,
        })
    }
}

/// Header plus text body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    /// Fixed fields
    pub header: UserMessage,
    /// Text body
    pub body: String,
}

impl TextMessage {
    /// Wrap in a `"TextMessage"` holder.
    pub fn to_holder(&self) -> AnyDataHolder {
        AnyDataHolder::from_structure(TEXT_MESSAGE_TYPE, self)
    }

    /// Unwrap from a holder, requiring the `"TextMessage"` type name.
    pub fn from_holder(holder: &AnyDataHolder) -> Result<Self> {
        holder.to_structure(TEXT_MESSAGE_TYPE)
    }
}

impl Structure for TextMessage {
    fn write_to(&self, writer: &mut StreamWriter) {
        writer.write_structure(&self.header).write_string(&self.body);
    }

    fn read_from(reader: &mut StreamReader<'_>) -> Result<Self> {
        Ok(Self { header: reader.read_structure()?, body: reader.read_string()? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProtocolError;

    fn message() -> TextMessage {
        TextMessage {
            header: UserMessage {
                id: 0,
                parent_id: 0,
                sender_pid: 0,
                reception_time: PackedDateTime::default(),
                lifetime: 60,
                flags: 0,
                subject: "hi".to_string(),
                sender: String::new(),
                recipient: MessageRecipient::principal(42),
            },
            body: "1:0:ping".to_string(),
        }
    }

    #[test]
    fn text_message_survives_holder() {
        let holder = message().to_holder();
        assert_eq!(holder.type_name, TEXT_MESSAGE_TYPE);
        assert_eq!(TextMessage::from_holder(&holder).unwrap(), message());
    }

    #[test]
    fn wrong_type_name_is_rejected() {
        let mut holder = message().to_holder();
        holder.type_name = "BinaryMessage".to_string();
        assert!(matches!(TextMessage::from_holder(&holder), Err(ProtocolError::InvalidDataHolder(_))));
    }

    #[test]
    fn inbox_id_follows_recipient_type() {
        assert_eq!(MessageRecipient::principal(42).inbox_id(), 42);
        assert_eq!(MessageRecipient::gathering(900).inbox_id(), 900);
        assert_eq!(MessageRecipient::gathering(900).kind(), Some(RecipientType::Gathering));
    }
}
