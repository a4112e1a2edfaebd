//! Server-side configuration the client reads at startup.

use encore_core::Environment;
use encore_proto::tunnel::{RowWriter, TunnelResponse, TunnelRow};

use super::{TunnelCall, TunnelRegistry, config_list};
use crate::{handler_error::HandlerError, storage::Storage};

/// Config key of the message of the day.
pub const MOTD_KEY: &str = "motd";
/// Config key of the music library sort names.
pub const SORTS_KEY: &str = "music_library_sorts";
/// Config key of the music library filter names.
pub const FILTERS_KEY: &str = "music_library_filters";

pub(super) fn register<E: Environment, S: Storage>(registry: &mut TunnelRegistry<E, S>) {
    registry.insert("config/get", config_get);
    registry.insert("ticker/info/get", ticker_info);
    registry.insert("music_library/sort_and_filters", sort_and_filters);
}

struct Motd(String);

impl TunnelRow for Motd {
    fn write_row(&self, row: &mut RowWriter<'_>) {
        row.string("motd", self.0.as_str());
    }
}

struct Ticker {
    pid: u32,
    motd: String,
    open_battles: usize,
}

impl TunnelRow for Ticker {
    fn write_row(&self, row: &mut RowWriter<'_>) {
        row.int("pid", self.pid).string("motd", self.motd.as_str()).int("open_battles", self.open_battles as i64);
    }
}

struct LibraryEntry {
    is_filter: bool,
    id: usize,
    name: String,
}

impl TunnelRow for LibraryEntry {
    fn write_row(&self, row: &mut RowWriter<'_>) {
        row.int("is_filter", i64::from(self.is_filter)).int("id", self.id as i64).string("name", self.name.as_str());
    }
}

fn config_get<E: Environment, S: Storage>(call: &TunnelCall<'_, E, S>) -> Result<TunnelResponse, HandlerError> {
    let motd = call.services.repo.get_config(MOTD_KEY)?.unwrap_or_default();
    call.single(&Motd(motd))
}

fn ticker_info<E: Environment, S: Storage>(call: &TunnelCall<'_, E, S>) -> Result<TunnelResponse, HandlerError> {
    let pid = call.pid()?;
    let repo = &call.services.repo;
    let now = call.now();

    let motd = repo.get_config(MOTD_KEY)?.unwrap_or_default();
    let open_battles =
        repo.list_battles()?.iter().filter(|b| b.platform == call.platform() && b.closes_at > now).count();

    call.single(&Ticker { pid, motd, open_battles })
}

fn sort_and_filters<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
) -> Result<TunnelResponse, HandlerError> {
    let repo = &call.services.repo;
    let sorts = config_list(repo, SORTS_KEY)?.into_iter().enumerate().map(|(id, name)| LibraryEntry {
        is_filter: false,
        id,
        name,
    });
    let filters = config_list(repo, FILTERS_KEY)?.into_iter().enumerate().map(|(id, name)| LibraryEntry {
        is_filter: true,
        id,
        name,
    });

    let entries: Vec<LibraryEntry> = sorts.chain(filters).collect();
    call.rows(&entries)
}
