//! Custom setlists.
//!
//! Rows in one response share a column layout, so every song list in a
//! response is padded with zeros to the longest one; `num_songs` holds the
//! real length.

use encore_core::Environment;
use encore_proto::tunnel::{RowWriter, TunnelResponse, TunnelRow};

use super::{RetCode, TunnelCall, TunnelRegistry, entities::name_acceptable};
use crate::{
    handler_error::HandlerError,
    storage::{SetlistRecord, Storage},
};

/// Songs one setlist may hold.
pub const MAX_SETLIST_SONGS: usize = 100;
/// Shared setlists returned by `songlists/get`.
pub const SONGLISTS_LIMIT: usize = 50;

pub(super) fn register<E: Environment, S: Storage>(registry: &mut TunnelRegistry<E, S>) {
    registry.insert("setlists/update", setlist_update);
    registry.insert("setlists/sync", setlist_sync);
    registry.insert("songlists/get", songlists_get);
}

struct SetlistRow<'a> {
    setlist: &'a SetlistRecord,
    owner: String,
    width: usize,
}

impl TunnelRow for SetlistRow<'_> {
    fn write_row(&self, row: &mut RowWriter<'_>) {
        let mut songs = self.setlist.songs.clone();
        songs.resize(self.width, 0);

        row.int("id", self.setlist.id)
            .string("guid", self.setlist.guid.as_str())
            .int("owner_pid", self.setlist.pid)
            .string("owner_name", self.owner.as_str())
            .string("name", self.setlist.name.as_str())
            .string("description", self.setlist.description.as_str())
            .int("type", self.setlist.list_type)
            .int("shared", i64::from(self.setlist.shared))
            .int("num_songs", self.setlist.songs.len() as i64)
            .int_list("songs", &songs);
    }
}

fn setlist_rows<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
    setlists: &[SetlistRecord],
) -> Result<TunnelResponse, HandlerError> {
    let owners: Vec<u32> = setlists.iter().map(|s| s.pid).collect();
    let users = call.services.repo.get_users_by_pids(&owners)?;
    let width = setlists.iter().map(|s| s.songs.len()).max().unwrap_or(0);

    let rows: Vec<SetlistRow<'_>> = setlists
        .iter()
        .map(|setlist| SetlistRow {
            setlist,
            owner: users.get(&setlist.pid).map(|u| u.username.clone()).unwrap_or_default(),
            width,
        })
        .collect();
    call.rows(&rows)
}

fn setlist_update<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
) -> Result<TunnelResponse, HandlerError> {
    let pid = call.pid()?;
    let guid = call.args.string("guid")?;
    let name = call.args.string("name")?;
    let songs = call.args.int_list("songs")?;

    if guid.is_empty() || !name_acceptable(&name) || songs.is_empty() || songs.len() > MAX_SETLIST_SONGS {
        tracing::debug!(pid, guid, songs = songs.len(), "setlist rejected");
        return call.single(&RetCode(false));
    }

    let setlist = call.services.repo.upsert_setlist(SetlistRecord {
        id: 0,
        pid,
        guid,
        name: name.trim().to_string(),
        description: call.args.opt_string("description").unwrap_or_default(),
        songs,
        list_type: call.args.opt_int("type").unwrap_or(0),
        shared: call.args.opt_int("shared").is_some_and(|v| v != 0),
        platform: call.platform(),
        updated_at: call.now(),
    })?;

    tracing::debug!(pid, setlist = setlist.id, "setlist saved");
    call.single(&RetCode(true))
}

/// Every setlist the caller owns.
fn setlist_sync<E: Environment, S: Storage>(call: &TunnelCall<'_, E, S>) -> Result<TunnelResponse, HandlerError> {
    let pid = call.pid()?;
    let mut own: Vec<SetlistRecord> = call.services.repo.list_setlists()?.into_iter().filter(|s| s.pid == pid).collect();
    own.sort_by_key(|s| s.id);
    setlist_rows(call, &own)
}

/// Shared setlists of other players on the caller's platform, newest first.
fn songlists_get<E: Environment, S: Storage>(call: &TunnelCall<'_, E, S>) -> Result<TunnelResponse, HandlerError> {
    let pid = call.pid()?;
    let platform = call.platform();

    let mut shared: Vec<SetlistRecord> = call
        .services
        .repo
        .list_setlists()?
        .into_iter()
        .filter(|s| s.shared && s.pid != pid && s.platform == platform)
        .collect();
    shared.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
    shared.truncate(SONGLISTS_LIMIT);
    setlist_rows(call, &shared)
}

#[cfg(test)]
mod tests {
    use encore_core::Platform;
    use encore_proto::tunnel::TunnelResponse;

    use super::*;
    use crate::tunnel::test_support::{call, login, services};

    fn update(pid: u32, guid: &str, name: &str, songs: &[i64], shared: bool) -> String {
        let mut names = vec![r#""pid","guid","name","shared""#.to_string()];
        let mut values = vec![format!(r#"{pid},"{guid}","{name}",{}"#, u8::from(shared))];
        for (i, song) in songs.iter().enumerate() {
            names.push(format!(r#""songs{i:03}""#));
            values.push(song.to_string());
        }
        format!(r#"[["setlists/update",[[{}],[{}]]]]"#, names.join(","), values.join(","))
    }

    #[test]
    fn sync_pads_song_lists() {
        let services = services();
        let session = login(&services, "alice", Platform::Wii);
        let pid = session.pid;

        assert!(call(&services, &session, &update(pid, "a", "Warmup", &[4, 5, 6], false)).ends_with("[0]]]"));
        assert!(call(&services, &session, &update(pid, "b", "Encore", &[9], false)).ends_with("[0]]]"));

        let text = call(&services, &session, &format!(r#"[["setlists/sync",[["pid"],[{pid}]]]]"#));
        let rows = TunnelResponse::parse(&text).unwrap().row_args();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].int_list("songs").unwrap(), vec![4, 5, 6]);
        assert_eq!(rows[1].int_list("songs").unwrap(), vec![9, 0, 0]);
        assert_eq!(rows[1].int("num_songs").unwrap(), 1);
        assert_eq!(rows[1].string("owner_name").unwrap(), "alice");
    }

    #[test]
    fn bad_setlists_answer_ret_code_one() {
        let services = services();
        let session = login(&services, "alice", Platform::Wii);
        let text = call(&services, &session, &update(session.pid, "a", "Empty", &[], false));
        assert_eq!(text, r#"[["setlists/update","d",["ret_code"],[1]]]"#);
        assert!(services.repo.list_setlists().unwrap().is_empty());
    }

    #[test]
    fn songlists_show_other_players_shared_lists() {
        let services = services();
        let alice = login(&services, "alice", Platform::Wii);
        let bob = login(&services, "bob", Platform::Wii);
        let carol = login(&services, "carol", Platform::Ps3);

        call(&services, &bob, &update(bob.pid, "x", "Bob Public", &[1, 2], true));
        call(&services, &bob, &update(bob.pid, "y", "Bob Private", &[3], false));
        call(&services, &carol, &update(carol.pid, "z", "Carol Public", &[4], true));
        call(&services, &alice, &update(alice.pid, "w", "Alice Public", &[5], true));

        let text = call(&services, &alice, &format!(r#"[["songlists/get",[["pid"],[{}]]]]"#, alice.pid));
        let rows = TunnelResponse::parse(&text).unwrap().row_args();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].string("name").unwrap(), "Bob Public");
        assert_eq!(rows[0].int("owner_pid").unwrap(), i64::from(bob.pid));
    }
}
