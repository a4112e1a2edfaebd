//! RMC protocol handlers.
//!
//! One module per protocol. Each exposes `register`, which adds its methods
//! to the route table with the endpoint they are served on.

pub mod account_management;
pub mod authentication;
pub mod binary_data;
pub mod console_management;
pub mod json;
pub mod matchmaking;
pub mod message_delivery;
pub mod messaging;
pub mod nat_traversal;
pub mod secure;

use encore_core::Environment;

use crate::{dispatcher::RouteTable, storage::Storage};

/// Register every protocol.
pub fn register_all<E: Environment, S: Storage>(table: &mut RouteTable<E, S>) {
    authentication::register(table);
    secure::register(table);
    nat_traversal::register(table);
    matchmaking::register(table);
    messaging::register(table);
    message_delivery::register(table);
    account_management::register(table);
    binary_data::register(table);
    console_management::register(table);
    json::register(table);
}
