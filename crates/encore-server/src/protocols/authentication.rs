//! Authentication protocol (auth endpoint).
//!
//! Login creates the account on first use and hands back a ticket the
//! client presents on the secure endpoint's CONNECT. Friend-code consoles
//! first log in as their master user, `Display (<friend code>)`; that
//! login creates or finds the machine record, and the master PID is the
//! machine id.

use encore_core::{Environment, Platform, master_user};
use encore_crypto::{SessionKey, build_ticket};
use encore_proto::{AnyDataHolder, ProtocolId, StreamWriter, protocol::{self, LOGIN_RESULT_SUCCESS}};

use crate::{
    config::HandlerConfig,
    dispatcher::{Access, Call, RouteTable},
    handler_error::HandlerError,
    services::Services,
    storage::{MachineRecord, Repository, Storage, StorageError, UserRecord},
};

/// Register the authentication methods.
pub fn register<E: Environment, S: Storage>(table: &mut RouteTable<E, S>) {
    use protocol::authentication::{GET_NAME, GET_PID, LOGIN, LOGIN_EX, REQUEST_TICKET};

    table.insert(ProtocolId::Authentication, LOGIN, Access::Auth, login);
    table.insert(ProtocolId::Authentication, LOGIN_EX, Access::Auth, login_ex);
    table.insert(ProtocolId::Authentication, REQUEST_TICKET, Access::Auth, request_ticket);
    table.insert(ProtocolId::Authentication, GET_PID, Access::Auth, get_pid);
    table.insert(ProtocolId::Authentication, GET_NAME, Access::Auth, get_name);
}

/// Password a ticket for `pid` is keyed with.
///
/// Friend-code consoles never send a password: their master user and every
/// account the console created use the console's friend code. Everyone else
/// uses the configured default password.
pub fn ticket_password<S: Storage>(
    repo: &Repository<S>,
    config: &HandlerConfig,
    pid: u32,
) -> Result<String, StorageError> {
    if let Some(machine) = repo.get_machine_by_id(pid)?
        && machine.platform.uses_friend_code()
    {
        return Ok(machine.friend_code);
    }
    if let Some(user) = repo.get_user_by_pid(pid)?
        && user.platform.uses_friend_code()
        && let Some(machine) = repo.get_machine_by_id(user.creator_machine)?
    {
        return Ok(machine.friend_code);
    }
    Ok(config.default_password.clone())
}

/// Principal named `name`, resolving master names through the machine table.
pub fn resolve_name<S: Storage>(repo: &Repository<S>, name: &str) -> Result<Option<u32>, StorageError> {
    if let Some(user) = repo.get_user_by_username(name)? {
        return Ok(Some(user.pid));
    }
    let Some(master) = master_user::parse(name) else {
        return Ok(None);
    };
    Ok(repo.get_machine_by_friend_code(&master.friend_code)?.map(|m| m.id))
}

fn issue_ticket<E: Environment, S: Storage>(
    services: &Services<E, S>,
    pid: u32,
    password: &str,
) -> Result<Vec<u8>, HandlerError> {
    let session_key = SessionKey::from_bytes(services.env.random_key());
    let info_key = services.env.random_key();
    Ok(build_ticket(pid, password, &session_key, &info_key)?.ticket)
}

fn login<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let username = call.params().read_string()?;
    login_as(call, &username)
}

fn login_ex<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let mut params = call.params();
    let username = params.read_string()?;
    // extra login data carries nothing the server uses
    params.read_structure::<AnyDataHolder>()?;
    login_as(call, &username)
}

fn login_as<E: Environment, S: Storage>(
    call: &mut Call<'_, E, S>,
    username: &str,
) -> Result<StreamWriter, HandlerError> {
    if username.is_empty() {
        return Err(HandlerError::InvalidUsername(String::new()));
    }

    let pid = match master_user::parse(username) {
        Some(master) => login_console(call, username, &master.friend_code)?,
        None => find_or_create_user(call, username)?,
    };
    call.session.authenticate(pid, username);

    let services = call.services;
    let password = ticket_password(&services.repo, &services.config, pid)?;
    let ticket = issue_ticket(services, pid, &password)?;

    tracing::info!(addr = %call.session.address, pid, username, platform = %call.session.platform, "login");

    let mut reply = StreamWriter::new();
    reply
        .write_u32(LOGIN_RESULT_SUCCESS)
        .write_u32(pid)
        .write_buffer(&ticket)
        .write_string(&services.config.secure_station_url().to_string())
        .write_u32(0)
        .write_u32(1)
        .write_u32(0x100);
    Ok(reply)
}

fn login_console<E: Environment, S: Storage>(
    call: &mut Call<'_, E, S>,
    username: &str,
    friend_code: &str,
) -> Result<u32, HandlerError> {
    let platform = call.session.platform;
    if !platform.uses_friend_code() {
        return Err(HandlerError::InvalidUsername(username.to_string()));
    }

    let repo = &call.services.repo;
    let machine = find_or_create_machine(call.services, platform, friend_code)?;
    if repo.get_user_by_pid(machine.id)?.is_none() {
        match repo.insert_user(&UserRecord::new(machine.id, username, platform, machine.id)) {
            Ok(()) => {},
            Err(StorageError::Conflict { .. }) if resolve_name(repo, username)? == Some(machine.id) => {},
            Err(StorageError::Conflict { .. }) => return Err(HandlerError::InvalidUsername(username.to_string())),
            Err(err) => return Err(err.into()),
        }
    }

    call.session.machine_id = machine.id;
    call.session.friend_code = Some(friend_code.to_string());
    Ok(machine.id)
}

fn find_or_create_machine<E: Environment, S: Storage>(
    services: &Services<E, S>,
    platform: Platform,
    friend_code: &str,
) -> Result<MachineRecord, HandlerError> {
    let repo = &services.repo;
    if let Some(machine) = repo.get_machine_by_friend_code(friend_code)? {
        return Ok(machine);
    }

    let machine = MachineRecord {
        id: repo.allocate_pid()?,
        platform,
        friend_code: friend_code.to_string(),
        users: Vec::new(),
        status: String::new(),
        last_url: None,
    };
    match repo.insert_machine(&machine) {
        Ok(()) => {
            tracing::info!(machine = machine.id, %platform, "registered console");
            Ok(machine)
        },
        Err(StorageError::Conflict { collection, key }) => {
            Ok(repo.get_machine_by_friend_code(friend_code)?.ok_or(StorageError::NotFound { collection, key })?)
        },
        Err(err) => Err(err.into()),
    }
}

/// Existing account `username`, or a new one created by the session's
/// machine.
pub(crate) fn find_or_create_user<E: Environment, S: Storage>(
    call: &mut Call<'_, E, S>,
    username: &str,
) -> Result<u32, HandlerError> {
    let repo = &call.services.repo;
    if let Some(user) = repo.get_user_by_username(username)? {
        return Ok(user.pid);
    }

    let pid = repo.allocate_pid()?;
    let user = UserRecord::new(pid, username, call.session.platform, call.session.machine_id);
    match repo.insert_user(&user) {
        Ok(()) => {
            repo.add_machine_user(call.session.machine_id, pid)?;
            tracing::info!(pid, username, "created account");
            Ok(pid)
        },
        // lost a race with another login for the same name
        Err(StorageError::Conflict { .. }) => {
            resolve_name(repo, username)?.ok_or_else(|| HandlerError::InvalidUsername(username.to_string()))
        },
        Err(err) => Err(err.into()),
    }
}

fn request_ticket<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let mut params = call.params();
    let source_pid = params.read_u32()?;
    let _target_pid = params.read_u32()?;
    call.validate_pid(source_pid)?;

    let services = call.services;
    let pid = call.session.pid;
    let password = ticket_password(&services.repo, &services.config, pid)?;
    let ticket = issue_ticket(services, pid, &password)?;

    let mut reply = StreamWriter::new();
    reply.write_u32(LOGIN_RESULT_SUCCESS).write_buffer(&ticket);
    Ok(reply)
}

fn get_pid<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let username = call.params().read_string()?;
    let pid = resolve_name(&call.services.repo, &username)?.ok_or(HandlerError::InvalidUsername(username))?;

    let mut reply = StreamWriter::new();
    reply.write_u32(pid);
    Ok(reply)
}

/// `GetName(pid)`, shared with account management.
pub(crate) fn get_name<E: Environment, S: Storage>(call: &mut Call<'_, E, S>) -> Result<StreamWriter, HandlerError> {
    let pid = call.params().read_u32()?;
    let user = call.services.repo.get_user_by_pid(pid)?.ok_or(HandlerError::InvalidPid(pid))?;

    let mut reply = StreamWriter::new();
    reply.write_string(&user.username);
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn friend_code_consoles_key_tickets_with_the_code() {
        let repo = Repository::new(MemoryStorage::new());
        let config = HandlerConfig { default_password: "pw".to_string(), ..HandlerConfig::default() };
        repo.insert_machine(&MachineRecord {
            id: 1001,
            platform: Platform::Wii,
            friend_code: "1234567890123456".to_string(),
            users: vec![1002],
            status: String::new(),
            last_url: None,
        })
        .unwrap();
        repo.insert_user(&UserRecord::new(1002, "wiiuser", Platform::Wii, 1001)).unwrap();
        repo.insert_user(&UserRecord::new(1003, "psuser", Platform::Ps3, 0)).unwrap();

        assert_eq!(ticket_password(&repo, &config, 1001).unwrap(), "1234567890123456");
        assert_eq!(ticket_password(&repo, &config, 1002).unwrap(), "1234567890123456");
        assert_eq!(ticket_password(&repo, &config, 1003).unwrap(), "pw");
    }

    #[test]
    fn master_names_resolve_through_machines() {
        let repo = Repository::new(MemoryStorage::new());
        repo.insert_machine(&MachineRecord {
            id: 1001,
            platform: Platform::Wii,
            friend_code: "0000000000000042".to_string(),
            users: vec![],
            status: String::new(),
            last_url: None,
        })
        .unwrap();

        assert_eq!(resolve_name(&repo, "Renamed Wii (0000000000000042)").unwrap(), Some(1001));
        assert_eq!(resolve_name(&repo, "nobody").unwrap(), None);
    }
}
