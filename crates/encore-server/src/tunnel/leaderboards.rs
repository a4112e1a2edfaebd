//! Leaderboards.
//!
//! Every board is the same computation over a different score source: keep
//! each player's best entry, sort by score descending, then slice by rank.
//! Song boards read the score collection filtered by song and role, battle
//! boards filter by battle, accomplishment boards read accomplishment
//! statistics. Display names for a page are fetched in one batch: band
//! aggregates (role 10) show the band name, everything else the owner's
//! username behind a console prefix.

use std::collections::{HashMap, HashSet};

use encore_core::Environment;
use encore_proto::tunnel::{RowWriter, TunnelResponse, TunnelRow};

use super::{TunnelCall, TunnelRegistry};
use crate::{
    handler_error::HandlerError,
    storage::{BAND_ROLE_ID, Repository, ScoreRecord, Storage},
};

/// Rows around the caller on a player board.
pub const PLAYER_WINDOW: u32 = 20;
/// Upper bound on rows in one page.
pub const MAX_PAGE_ROWS: u32 = 100;

pub(super) fn register<E: Environment, S: Storage>(registry: &mut TunnelRegistry<E, S>) {
    registry.insert("leaderboards/player/get", song_player);
    registry.insert("leaderboards/maxrank/get", song_max_rank);
    registry.insert("leaderboards/rankrange/get", song_rank_range);
    registry.insert("leaderboards/friends/get", song_friends);
    registry.insert("leaderboards/playerranks/get", player_ranks);
    registry.insert("leaderboards/battle_player/get", battle_player);
    registry.insert("leaderboards/battle_maxrank/get", battle_max_rank);
    registry.insert("leaderboards/battle_rankrange/get", battle_rank_range);
    registry.insert("leaderboards/acc_player/get", acc_player);
    registry.insert("leaderboards/acc_maxrank/get", acc_max_rank);
    registry.insert("leaderboards/acc_rankrange/get", acc_rank_range);
}

/// One player's entry on a board.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    pid: u32,
    role_id: u32,
    score: i64,
    diff_id: u32,
    notes_pct: u32,
    inst_mask: u32,
    stars: u32,
}

/// Which scores a board ranks.
#[derive(Debug, Clone, Copy)]
enum Board {
    Song { song_id: u32, role_id: u32 },
    Battle { battle_id: u32 },
    Accomplishment { accomplishment_id: i64 },
}

impl Board {
    fn song<E: Environment, S: Storage>(call: &TunnelCall<'_, E, S>) -> Result<Self, HandlerError> {
        Ok(Self::Song { song_id: call.u32_arg("song_id")?, role_id: call.u32_arg("role_id")? })
    }

    fn battle<E: Environment, S: Storage>(call: &TunnelCall<'_, E, S>) -> Result<Self, HandlerError> {
        Ok(Self::Battle { battle_id: call.u32_arg("battle_id")? })
    }

    fn accomplishment<E: Environment, S: Storage>(call: &TunnelCall<'_, E, S>) -> Result<Self, HandlerError> {
        Ok(Self::Accomplishment { accomplishment_id: call.args.int("acc_id")? })
    }

    /// Best entry per player, highest score first. Ties keep the earlier
    /// submission ahead.
    fn ranked<S: Storage>(self, repo: &Repository<S>) -> Result<Vec<Entry>, HandlerError> {
        let entries: Vec<Entry> = match self {
            Self::Song { song_id, role_id } => repo
                .list_scores()?
                .into_iter()
                .filter(|s| s.song_id == song_id && s.role_id == role_id)
                .map(score_entry)
                .collect(),
            Self::Battle { battle_id } => repo
                .list_scores()?
                .into_iter()
                .filter(|s| s.battle_id == Some(battle_id))
                .map(score_entry)
                .collect(),
            Self::Accomplishment { accomplishment_id } => repo
                .list_stats("accomplishment")?
                .into_iter()
                .filter(|s| s.subject == accomplishment_id)
                .map(|s| Entry {
                    pid: s.pid,
                    role_id: 0,
                    score: s.value,
                    diff_id: 0,
                    notes_pct: 0,
                    inst_mask: 0,
                    stars: 0,
                })
                .collect(),
        };
        Ok(rank(entries))
    }
}

fn score_entry(s: ScoreRecord) -> Entry {
    Entry {
        pid: s.pid,
        role_id: s.role_id,
        score: i64::from(s.score),
        diff_id: s.diff_id,
        notes_pct: s.notes_pct,
        inst_mask: s.instrument_mask,
        stars: s.stars,
    }
}

/// Keep each player's best entry and sort by score descending.
fn rank(entries: Vec<Entry>) -> Vec<Entry> {
    let mut best: Vec<Entry> = Vec::new();
    let mut index: HashMap<u32, usize> = HashMap::new();
    for entry in entries {
        match index.get(&entry.pid) {
            Some(&i) if best[i].score >= entry.score => {},
            Some(&i) => best[i] = entry,
            None => {
                index.insert(entry.pid, best.len());
                best.push(entry);
            },
        }
    }
    // stable: equal scores stay in submission order
    best.sort_by(|a, b| b.score.cmp(&a.score));
    best
}

/// Entries ranked `start..=end` (1-based) paired with their rank.
fn page(ranked: &[Entry], start: u32, end: u32) -> Vec<(u32, &Entry)> {
    let start = start.max(1);
    if end < start {
        return Vec::new();
    }
    let len = (end - start + 1).min(MAX_PAGE_ROWS);
    ranked
        .iter()
        .enumerate()
        .skip(start as usize - 1)
        .take(len as usize)
        .map(|(i, e)| (i as u32 + 1, e))
        .collect()
}

/// Page of `rows` entries with `pid` as close to the middle as possible.
fn window_around(ranked: &[Entry], pid: u32, rows: u32) -> Vec<(u32, &Entry)> {
    let rows = rows.clamp(1, MAX_PAGE_ROWS);
    let start = match ranked.iter().position(|e| e.pid == pid) {
        Some(i) => (i as u32 + 1).saturating_sub(rows / 2).max(1),
        None => 1,
    };
    page(ranked, start, start + rows - 1)
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardRow {
    /// Score owner
    pub pid: u32,
    /// Display name
    pub name: String,
    /// Difficulty
    pub diff_id: u32,
    /// 1-based rank
    pub rank: u32,
    /// Score
    pub score: i64,
    /// Rank is a percentile; never set
    pub is_percentile: bool,
    /// Instruments played
    pub inst_mask: u32,
    /// Notes hit, percent
    pub notes_pct: u32,
    /// Owner is on the caller's friend list
    pub is_friend: bool,
    /// Band aggregate whose owner has no band
    pub unnamed_band: bool,
    /// Stars
    pub stars: u32,
}

impl TunnelRow for LeaderboardRow {
    fn write_row(&self, row: &mut RowWriter<'_>) {
        row.int("pid", self.pid)
            .string("name", self.name.as_str())
            .int("diff_id", self.diff_id)
            .int("rank", self.rank)
            .int("score", self.score)
            .int("is_percentile", i64::from(self.is_percentile))
            .int("inst_mask", self.inst_mask)
            .int("notes_pct", self.notes_pct)
            .int("is_friend", i64::from(self.is_friend))
            .int("unnamed_band", i64::from(self.unnamed_band))
            .int("stars", self.stars);
    }
}

struct MaxRank(usize);

impl TunnelRow for MaxRank {
    fn write_row(&self, row: &mut RowWriter<'_>) {
        row.int("max_rank", self.0 as i64);
    }
}

struct PlayerRank {
    role_id: u32,
    rank: u32,
    score: i64,
    max_rank: usize,
}

impl TunnelRow for PlayerRank {
    fn write_row(&self, row: &mut RowWriter<'_>) {
        row.int("role_id", self.role_id)
            .int("rank", self.rank)
            .int("score", self.score)
            .int("max_rank", self.max_rank as i64);
    }
}

/// Turn a page into rows, resolving every display name in one batch.
fn rows_for<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
    caller: Option<u32>,
    page: &[(u32, &Entry)],
) -> Result<Vec<LeaderboardRow>, HandlerError> {
    let repo = &call.services.repo;

    let band_pids: Vec<u32> = page.iter().filter(|(_, e)| e.role_id == BAND_ROLE_ID).map(|(_, e)| e.pid).collect();
    let bands = repo.get_bands_by_pids(&band_pids)?;

    let mut user_pids: Vec<u32> = page.iter().map(|(_, e)| e.pid).collect();
    user_pids.extend(caller);
    let users = repo.get_users_by_pids(&user_pids)?;

    let friends: HashSet<u32> =
        caller.and_then(|pid| users.get(&pid)).map(|u| u.friends.iter().copied().collect()).unwrap_or_default();

    Ok(page
        .iter()
        .map(|&(rank, entry)| {
            let band = (entry.role_id == BAND_ROLE_ID).then(|| bands.get(&entry.pid)).flatten();
            let name = match (band, users.get(&entry.pid)) {
                (Some(band), _) => band.name.clone(),
                (None, Some(user)) => format!("{} {}", user.platform.console_prefix(), user.username),
                (None, None) => String::new(),
            };
            LeaderboardRow {
                pid: entry.pid,
                name,
                diff_id: entry.diff_id,
                rank,
                score: entry.score,
                is_percentile: false,
                inst_mask: entry.inst_mask,
                notes_pct: entry.notes_pct,
                is_friend: friends.contains(&entry.pid),
                unnamed_band: entry.role_id == BAND_ROLE_ID && band.is_none(),
                stars: entry.stars,
            }
        })
        .collect())
}

fn player_board<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
    board: Board,
) -> Result<TunnelResponse, HandlerError> {
    let pid = call.pid()?;
    let rows = call.opt_u32_arg("num_rows").unwrap_or(PLAYER_WINDOW);
    let ranked = board.ranked(&call.services.repo)?;
    let page = window_around(&ranked, pid, rows);
    call.rows(&rows_for(call, Some(pid), &page)?)
}

fn max_rank_board<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
    board: Board,
) -> Result<TunnelResponse, HandlerError> {
    call.opt_pid()?;
    let ranked = board.ranked(&call.services.repo)?;
    call.single(&MaxRank(ranked.len()))
}

fn rank_range_board<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
    board: Board,
) -> Result<TunnelResponse, HandlerError> {
    let caller = call.opt_pid()?;
    let start = call.u32_arg("start_rank")?;
    let end = call.u32_arg("end_rank")?;
    let ranked = board.ranked(&call.services.repo)?;
    let page = page(&ranked, start, end);
    call.rows(&rows_for(call, caller, &page)?)
}

fn song_player<E: Environment, S: Storage>(call: &TunnelCall<'_, E, S>) -> Result<TunnelResponse, HandlerError> {
    player_board(call, Board::song(call)?)
}

fn song_max_rank<E: Environment, S: Storage>(call: &TunnelCall<'_, E, S>) -> Result<TunnelResponse, HandlerError> {
    max_rank_board(call, Board::song(call)?)
}

fn song_rank_range<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
) -> Result<TunnelResponse, HandlerError> {
    rank_range_board(call, Board::song(call)?)
}

/// The caller and their friends, ranked among themselves.
fn song_friends<E: Environment, S: Storage>(call: &TunnelCall<'_, E, S>) -> Result<TunnelResponse, HandlerError> {
    let pid = call.pid()?;
    let board = Board::song(call)?;
    let repo = &call.services.repo;

    let mut circle: HashSet<u32> = repo.require_user(pid)?.friends.into_iter().collect();
    circle.insert(pid);

    let ranked: Vec<Entry> = board.ranked(repo)?.into_iter().filter(|e| circle.contains(&e.pid)).collect();
    let page = page(&ranked, 1, MAX_PAGE_ROWS);
    call.rows(&rows_for(call, Some(pid), &page)?)
}

/// The caller's rank on every role of one song.
fn player_ranks<E: Environment, S: Storage>(call: &TunnelCall<'_, E, S>) -> Result<TunnelResponse, HandlerError> {
    let pid = call.pid()?;
    let song_id = call.u32_arg("song_id")?;
    let repo = &call.services.repo;

    let mut roles: Vec<u32> =
        repo.list_scores()?.iter().filter(|s| s.song_id == song_id && s.pid == pid).map(|s| s.role_id).collect();
    roles.sort_unstable();
    roles.dedup();

    let mut ranks = Vec::with_capacity(roles.len());
    for role_id in roles {
        let ranked = Board::Song { song_id, role_id }.ranked(repo)?;
        if let Some(i) = ranked.iter().position(|e| e.pid == pid) {
            ranks.push(PlayerRank { role_id, rank: i as u32 + 1, score: ranked[i].score, max_rank: ranked.len() });
        }
    }
    call.rows(&ranks)
}

fn battle_player<E: Environment, S: Storage>(call: &TunnelCall<'_, E, S>) -> Result<TunnelResponse, HandlerError> {
    player_board(call, Board::battle(call)?)
}

fn battle_max_rank<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
) -> Result<TunnelResponse, HandlerError> {
    max_rank_board(call, Board::battle(call)?)
}

fn battle_rank_range<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
) -> Result<TunnelResponse, HandlerError> {
    rank_range_board(call, Board::battle(call)?)
}

fn acc_player<E: Environment, S: Storage>(call: &TunnelCall<'_, E, S>) -> Result<TunnelResponse, HandlerError> {
    player_board(call, Board::accomplishment(call)?)
}

fn acc_max_rank<E: Environment, S: Storage>(call: &TunnelCall<'_, E, S>) -> Result<TunnelResponse, HandlerError> {
    max_rank_board(call, Board::accomplishment(call)?)
}

fn acc_rank_range<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
) -> Result<TunnelResponse, HandlerError> {
    rank_range_board(call, Board::accomplishment(call)?)
}
