//! Bands, characters and web link codes.

use encore_core::Environment;
use encore_proto::tunnel::{RowWriter, TunnelResponse, TunnelRow};

use super::{RetCode, TunnelCall, TunnelRegistry};
use crate::{
    handler_error::HandlerError,
    storage::{BandRecord, CharacterRecord, Storage},
};

/// Longest accepted band or character name, in characters.
pub const MAX_NAME_CHARS: usize = 32;
/// Characters in a link code.
pub const LINK_CODE_LEN: usize = 8;

// excludes 0, O, 1 and I
const LINK_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub(super) fn register<E: Environment, S: Storage>(registry: &mut TunnelRegistry<E, S>) {
    registry.insert("entities/band/update", band_update);
    registry.insert("entities/character/update", character_update);
    registry.insert("entities/character/namecheck", character_namecheck);
    registry.insert("entities/linkcode/get", link_code_get);
}

struct BandId(u32);

impl TunnelRow for BandId {
    fn write_row(&self, row: &mut RowWriter<'_>) {
        row.int("band_id", self.0);
    }
}

struct CharId(u32);

impl TunnelRow for CharId {
    fn write_row(&self, row: &mut RowWriter<'_>) {
        row.int("char_id", self.0);
    }
}

struct LinkCode(String);

impl TunnelRow for LinkCode {
    fn write_row(&self, row: &mut RowWriter<'_>) {
        row.string("link_code", self.0.as_str());
    }
}

/// Display names must be non-empty, short and printable.
pub fn name_acceptable(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && trimmed.chars().count() <= MAX_NAME_CHARS && !trimmed.chars().any(char::is_control)
}

fn band_update<E: Environment, S: Storage>(call: &TunnelCall<'_, E, S>) -> Result<TunnelResponse, HandlerError> {
    let pid = call.pid()?;
    let name = call.args.string("name")?;
    if !name_acceptable(&name) {
        return Err(HandlerError::InvalidArgument(format!("band name {name:?}")));
    }

    let repo = &call.services.repo;
    // art is opaque; keep what was stored if the update carries none
    let art = match call.args.opt_string("art") {
        Some(art) => art.into_bytes(),
        None => repo.get_band(pid)?.map(|b| b.art).unwrap_or_default(),
    };

    let band = repo.upsert_band(BandRecord { id: 0, pid, name: name.trim().to_string(), art })?;
    tracing::debug!(pid, band = band.id, "band updated");
    call.single(&BandId(band.id))
}

fn character_update<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
) -> Result<TunnelResponse, HandlerError> {
    let pid = call.pid()?;
    let guid = call.args.string("guid")?;
    let name = call.args.string("name")?;
    let data = call.args.opt_string("data").unwrap_or_default();
    if !name_acceptable(&name) {
        return Err(HandlerError::InvalidArgument(format!("character name {name:?}")));
    }

    let character =
        call.services.repo.upsert_character(CharacterRecord { id: 0, pid, guid, name: name.trim().to_string(), data })?;
    call.single(&CharId(character.id))
}

fn character_namecheck<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
) -> Result<TunnelResponse, HandlerError> {
    call.opt_pid()?;
    let name = call.args.string("name")?;
    call.single(&RetCode(name_acceptable(&name)))
}

/// Link code for web account linking; issued once per account.
fn link_code_get<E: Environment, S: Storage>(call: &TunnelCall<'_, E, S>) -> Result<TunnelResponse, HandlerError> {
    let pid = call.pid()?;
    let repo = &call.services.repo;

    let mut user = repo.require_user(pid)?;
    let code = match &user.link_code {
        Some(code) => code.clone(),
        None => {
            let mut raw = [0u8; LINK_CODE_LEN];
            call.services.env.random_bytes(&mut raw);
            let code: String = raw
                .iter()
                .map(|b| char::from(LINK_CODE_ALPHABET[usize::from(*b) % LINK_CODE_ALPHABET.len()]))
                .collect();
            user.link_code = Some(code.clone());
            repo.update_user(&user)?;
            code
        },
    };
    call.single(&LinkCode(code))
}
