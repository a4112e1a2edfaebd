//! Per-account odds and ends: linking status, installed songs, option data.

use encore_core::Environment;
use encore_proto::tunnel::{RowWriter, TunnelResponse, TunnelRow};

use super::{RetCode, TunnelCall, TunnelRegistry};
use crate::{handler_error::HandlerError, storage::Storage};

pub(super) fn register<E: Environment, S: Storage>(registry: &mut TunnelRegistry<E, S>) {
    registry.insert("misc/get_accounts_setlist_creation_status", setlist_creation_status);
    registry.insert("misc/get_accounts_web_linked_status", web_linked_status);
    registry.insert("misc/link_account", link_account);
    registry.insert("misc/sync_available_songs", sync_available_songs);
    registry.insert("misc/set_option_data", set_option_data);
    registry.insert("misc/get_option_data", get_option_data);
}

/// Whether an account has published a setlist.
pub struct SetlistCreationStatus {
    /// Account
    pub pid: u32,
    /// 1 if the account owns at least one setlist
    pub creator: u32,
}

impl TunnelRow for SetlistCreationStatus {
    fn write_row(&self, row: &mut RowWriter<'_>) {
        row.int("pid", self.pid).int("creator", self.creator);
    }
}

struct LinkedStatus {
    pid: u32,
    is_linked: bool,
}

impl TunnelRow for LinkedStatus {
    fn write_row(&self, row: &mut RowWriter<'_>) {
        row.int("pid", self.pid).int("is_linked", i64::from(self.is_linked));
    }
}

struct OptionData {
    pid: u32,
    data: String,
}

impl TunnelRow for OptionData {
    fn write_row(&self, row: &mut RowWriter<'_>) {
        row.int("pid", self.pid).string("data", self.data.as_str());
    }
}

fn setlist_creation_status<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
) -> Result<TunnelResponse, HandlerError> {
    let pid = call.pid()?;
    let creator = call.services.repo.list_setlists()?.iter().any(|s| s.pid == pid);
    call.single(&SetlistCreationStatus { pid, creator: u32::from(creator) })
}

fn web_linked_status<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
) -> Result<TunnelResponse, HandlerError> {
    let pid = call.pid()?;
    let user = call.services.repo.require_user(pid)?;
    call.single(&LinkedStatus { pid, is_linked: user.linked })
}

/// Mark the account linked if `link_code` matches the one handed out.
fn link_account<E: Environment, S: Storage>(call: &TunnelCall<'_, E, S>) -> Result<TunnelResponse, HandlerError> {
    let pid = call.pid()?;
    let code = call.args.string("link_code")?;
    let repo = &call.services.repo;

    let mut user = repo.require_user(pid)?;
    let accepted = user.link_code.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(code.trim()));
    if accepted && !user.linked {
        user.linked = true;
        repo.update_user(&user)?;
        tracing::info!(pid, "account linked");
    }
    call.single(&RetCode(accepted))
}

fn sync_available_songs<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
) -> Result<TunnelResponse, HandlerError> {
    let pid = call.pid()?;
    let mut songs = call.args.int_list("songs")?;
    songs.sort_unstable();
    songs.dedup();

    let repo = &call.services.repo;
    let mut user = repo.require_user(pid)?;
    tracing::debug!(pid, songs = songs.len(), "synced available songs");
    user.available_songs = songs;
    repo.update_user(&user)?;
    Ok(call.empty())
}

fn set_option_data<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
) -> Result<TunnelResponse, HandlerError> {
    let pid = call.pid()?;
    let data = call.args.string("data")?;

    let repo = &call.services.repo;
    let mut user = repo.require_user(pid)?;
    user.option_data = data;
    repo.update_user(&user)?;
    Ok(call.empty())
}

fn get_option_data<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
) -> Result<TunnelResponse, HandlerError> {
    let pid = call.pid()?;
    let user = call.services.repo.require_user(pid)?;
    call.single(&OptionData { pid, data: user.option_data })
}

#[cfg(test)]
mod tests {
    use encore_core::Platform;
    use encore_proto::tunnel::{TunnelRequest, TunnelResponse};

    use super::*;
    use crate::tunnel::test_support::{call, login, services};

    #[test]
    fn setlist_creation_status_wire_form() {
        let response = TunnelResponse::single(
            "misc/get_accounts_setlist_creation_status",
            &SetlistCreationStatus { pid: 12345, creator: 0 },
        )
        .unwrap();
        assert_eq!(
            response.to_json_string(),
            r#"[["misc/get_accounts_setlist_creation_status","dd",["pid","creator"],[12345,0]]]"#
        );

        let request =
            TunnelRequest::parse(r#"[["misc/get_accounts_setlist_creation_status",[["pid"],[12345]]]]"#).unwrap();
        assert_eq!(request.args.len(), 1);
        assert_eq!(request.args.int("pid").unwrap(), 12345);
    }

    #[test]
    fn option_data_round_trips() {
        let services = services();
        let session = login(&services, "alice", Platform::Xbox360);
        let pid = session.pid;

        call(&services, &session, &format!(r#"[["misc/set_option_data",[["pid","data"],[{pid},"lefty=1"]]]]"#));
        let text = call(&services, &session, &format!(r#"[["misc/get_option_data",[["pid"],[{pid}]]]]"#));
        assert_eq!(text, format!(r#"[["misc/get_option_data","ds",["pid","data"],[{pid},"lefty=1"]]]"#));
    }

    #[test]
    fn available_songs_are_deduplicated() {
        let services = services();
        let session = login(&services, "alice", Platform::Xbox360);
        let pid = session.pid;

        call(
            &services,
            &session,
            &format!(
                r#"[["misc/sync_available_songs",[["pid","songs000","songs001","songs002"],[{pid},7,3,7]]]]"#
            ),
        );
        assert_eq!(services.repo.require_user(pid).unwrap().available_songs, vec![3, 7]);
    }

    #[test]
    fn linking_needs_the_issued_code() {
        let services = services();
        let session = login(&services, "alice", Platform::Xbox360);
        let pid = session.pid;
        let mut user = services.repo.require_user(pid).unwrap();
        user.link_code = Some("ABCD2345".to_string());
        services.repo.update_user(&user).unwrap();

        let wrong = call(&services, &session, &format!(r#"[["misc/link_account",[["pid","link_code"],[{pid},"ZZZZ"]]]]"#));
        assert!(wrong.ends_with("[1]]]"));
        let right =
            call(&services, &session, &format!(r#"[["misc/link_account",[["pid","link_code"],[{pid},"abcd2345"]]]]"#));
        assert!(right.ends_with("[0]]]"));

        let status =
            call(&services, &session, &format!(r#"[["misc/get_accounts_web_linked_status",[["pid"],[{pid}]]]]"#));
        assert!(status.ends_with(&format!("[{pid},1]]]")));
    }
}
