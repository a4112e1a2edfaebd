//! Console management: the accounts a console has created.

use encore_core::Environment;
use encore_proto::{ProtocolId, StreamWriter, protocol};

use crate::{
    dispatcher::{Access, Call, RouteTable},
    handler_error::HandlerError,
    storage::Storage,
};

/// Register the console management methods.
pub fn register<E: Environment, S: Storage>(table: &mut RouteTable<E, S>) {
    table.insert(
        ProtocolId::ConsoleManagement,
        protocol::console_management::GET_CONSOLE_USERNAMES,
        Access::Secure,
        get_console_usernames,
    );
}

/// `GetConsoleUsernames(friend_code)`: master user first, then every account
/// the console created. An unknown console has no accounts.
fn get_console_usernames<E: Environment, S: Storage>(
    call: &mut Call<'_, E, S>,
) -> Result<StreamWriter, HandlerError> {
    let friend_code = call.params().read_string()?;
    let repo = &call.services.repo;

    let mut names = Vec::new();
    if let Some(machine) = repo.get_machine_by_friend_code(&friend_code)? {
        if let Some(master) = repo.get_user_by_pid(machine.id)? {
            names.push(master.username);
        }
        names.extend(repo.get_users_by_machine(machine.id)?.into_iter().filter(|u| u.pid != machine.id).map(|u| u.username));
    }

    let mut reply = StreamWriter::new();
    reply.write_string_list(&names);
    Ok(reply)
}
