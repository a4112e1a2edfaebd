//! Protocol and method identifiers.
//!
//! An RMC request names its handler with a 7-bit protocol id and a 32-bit
//! method id. The method tables below list every method the server answers.

/// Result value returned in the first slot of a successful login.
pub const LOGIN_RESULT_SUCCESS: u32 = 0x0001_0001;

/// Known RMC protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ProtocolId {
    /// Peer-to-peer NAT probing
    NatTraversal = 0x03,
    /// Login and ticket issue (auth endpoint)
    Authentication = 0x0A,
    /// Station URL registration (secure endpoint)
    Secure = 0x0B,
    /// Gathering lifecycle
    Matchmaking = 0x15,
    /// Inbox queries
    Messaging = 0x17,
    /// Account creation, lookup and status
    AccountManagement = 0x19,
    /// Message submission
    MessageDelivery = 0x1B,
    /// Platform-scoped gathering discovery
    CustomMatchmaking = 0x6D,
    /// Opaque blob storage
    BinaryData = 0x6E,
    /// JSON application tunnel
    Json = 0x70,
    /// Console profile listing
    ConsoleManagement = 0x71,
}

impl ProtocolId {
    /// Convert from the low seven bits of the protocol byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x03 => Some(Self::NatTraversal),
            0x0A => Some(Self::Authentication),
            0x0B => Some(Self::Secure),
            0x15 => Some(Self::Matchmaking),
            0x17 => Some(Self::Messaging),
            0x19 => Some(Self::AccountManagement),
            0x1B => Some(Self::MessageDelivery),
            0x6D => Some(Self::CustomMatchmaking),
            0x6E => Some(Self::BinaryData),
            0x70 => Some(Self::Json),
            0x71 => Some(Self::ConsoleManagement),
            _ => None,
        }
    }

    /// Numeric wire value.
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Authentication protocol methods.
pub mod authentication {
    /// `Login(username)`
    pub const LOGIN: u32 = 1;
    /// `LoginEx(username, extra_data)`
    pub const LOGIN_EX: u32 = 2;
    /// `RequestTicket(source_pid, target_pid)`
    pub const REQUEST_TICKET: u32 = 3;
    /// `GetPID(username)`
    pub const GET_PID: u32 = 4;
    /// `GetName(pid)`
    pub const GET_NAME: u32 = 5;
}

/// Secure protocol methods.
pub mod secure {
    /// `Register(urls)`
    pub const REGISTER: u32 = 1;
    /// `RequestConnectionData(cid, pid)`
    pub const REQUEST_CONNECTION_DATA: u32 = 2;
    /// `RequestURLs(cid, pid)`
    pub const REQUEST_URLS: u32 = 3;
    /// `RegisterEx(urls, login_data)`
    pub const REGISTER_EX: u32 = 4;
    /// `TestConnectivity()`
    pub const TEST_CONNECTIVITY: u32 = 5;
    /// `UpdateURLs(urls)`
    pub const UPDATE_URLS: u32 = 6;
    /// `ReplaceURL(old, new)`
    pub const REPLACE_URL: u32 = 7;
    /// `SendReport(report_id, data)`
    pub const SEND_REPORT: u32 = 8;
}

/// NAT traversal protocol methods.
pub mod nat_traversal {
    /// `RequestProbeInitiation(urls)`
    pub const REQUEST_PROBE_INITIATION: u32 = 1;
    /// `InitiateProbe(url)`, sent by the server to a peer
    pub const INITIATE_PROBE: u32 = 2;
    /// `ReportNATTraversalResult(cid, result)`
    pub const REPORT_NAT_TRAVERSAL_RESULT: u32 = 4;
    /// `ReportNATProperties(natm, natf, rtt)`
    pub const REPORT_NAT_PROPERTIES: u32 = 5;
}

/// Matchmaking protocol methods.
pub mod matchmaking {
    /// `RegisterGathering(holder)`
    pub const REGISTER_GATHERING: u32 = 1;
    /// `TerminateGathering(id)`
    pub const TERMINATE_GATHERING: u32 = 2;
    /// `UpdateGathering(holder)`
    pub const UPDATE_GATHERING: u32 = 4;
    /// `FindByID(ids)`
    pub const FIND_BY_ID: u32 = 20;
    /// `FindBySingleID(id)`
    pub const FIND_BY_SINGLE_ID: u32 = 21;
    /// `GetState(id)`
    pub const GET_STATE: u32 = 29;
    /// `SetState(id, state)`
    pub const SET_STATE: u32 = 30;
}

/// Custom matchmaking protocol methods.
pub mod custom_matchmaking {
    /// `CustomFind(data)`
    pub const CUSTOM_FIND: u32 = 1;
}

/// Messaging protocol methods.
pub mod messaging {
    /// `GetNumberOfMessages(recipient)`
    pub const GET_NUMBER_OF_MESSAGES: u32 = 2;
    /// `GetMessageHeaders(recipient, range)`
    pub const GET_MESSAGE_HEADERS: u32 = 3;
    /// `RetrieveMessages(recipient, ids, leave_on_server)`
    pub const RETRIEVE_MESSAGES: u32 = 5;
    /// `DeleteMessages(recipient, ids)`
    pub const DELETE_MESSAGES: u32 = 6;
    /// `DeleteAllMessages(recipient)`
    pub const DELETE_ALL_MESSAGES: u32 = 7;
    /// `DeliverMessageMultiTarget(pids, holder)`
    pub const DELIVER_MESSAGE_MULTI_TARGET: u32 = 8;
}

/// Message delivery protocol methods.
pub mod message_delivery {
    /// `DeliverMessage(holder)`
    pub const DELIVER_MESSAGE: u32 = 1;
}

/// Account management protocol methods.
pub mod account_management {
    /// `DeleteAccount(pid)`
    pub const DELETE_ACCOUNT: u32 = 2;
    /// `GetName(pid)`
    pub const GET_NAME: u32 = 6;
    /// `FindByNameRegex(group, regex, range)`
    pub const FIND_BY_NAME_REGEX: u32 = 14;
    /// `UpdateStatus(status)`
    pub const UPDATE_STATUS: u32 = 17;
    /// `GetStatus(pid)`
    pub const GET_STATUS: u32 = 18;
    /// `FindByNameLike(group, name, range)`
    pub const FIND_BY_NAME_LIKE: u32 = 25;
    /// `NintendoCreateAccount(name, key, groups, email, auth_data)`
    pub const NINTENDO_CREATE_ACCOUNT: u32 = 27;
    /// `LookupOrCreateAccount(name, key, groups, email, auth_data)`
    pub const LOOKUP_OR_CREATE_ACCOUNT: u32 = 28;
}

/// Binary data protocol methods.
pub mod binary_data {
    /// `SaveBinaryData(key, data)`
    pub const SAVE: u32 = 1;
    /// `GetBinaryData(key)`
    pub const LOAD: u32 = 2;
}

/// Console management protocol methods.
pub mod console_management {
    /// `GetConsoleUsernames(friend_code)`
    pub const GET_CONSOLE_USERNAMES: u32 = 1;
}

/// JSON tunnel protocol methods.
pub mod json {
    /// `Request(json)`: answered with a JSON body
    pub const REQUEST: u32 = 1;
    /// `Request2(json)`: same work, empty body
    pub const REQUEST2: u32 = 2;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_ids_round_trip() {
        for id in [
            ProtocolId::NatTraversal,
            ProtocolId::Authentication,
            ProtocolId::Secure,
            ProtocolId::Matchmaking,
            ProtocolId::Messaging,
            ProtocolId::AccountManagement,
            ProtocolId::MessageDelivery,
            ProtocolId::CustomMatchmaking,
            ProtocolId::BinaryData,
            ProtocolId::Json,
            ProtocolId::ConsoleManagement,
        ] {
            assert_eq!(ProtocolId::from_u8(id.to_u8()), Some(id));
            assert!(id.to_u8() < 0x80);
        }
    }
}
