//! Score submission and score battles.

use encore_core::Environment;
use encore_proto::tunnel::{RowWriter, TunnelResponse, TunnelRow};

use super::{RetCode, TunnelCall, TunnelRegistry};
use crate::{
    handler_error::HandlerError,
    storage::{BAND_ROLE_ID, BattleRecord, Repository, ScoreRecord, Storage},
};

/// Battles one player may have open at a time.
pub const MAX_OPEN_BATTLES: usize = 3;
/// Battle length when the request names none.
pub const DEFAULT_BATTLE_SECS: u64 = 7 * 24 * 60 * 60;
/// Closed battles returned by `battles/closed/get`.
pub const CLOSED_BATTLES_LIMIT: usize = 20;

pub(super) fn register<E: Environment, S: Storage>(registry: &mut TunnelRegistry<E, S>) {
    registry.insert("scores/record", score_record);
    registry.insert("battles/record", battle_record);
    registry.insert("battles/limit/check", battle_limit_check);
    registry.insert("battles/closed/get", battles_closed);
}

struct BattleId(u32);

impl TunnelRow for BattleId {
    fn write_row(&self, row: &mut RowWriter<'_>) {
        row.int("battle_id", self.0);
    }
}

struct ClosedBattle<'a>(&'a BattleRecord);

impl TunnelRow for ClosedBattle<'_> {
    fn write_row(&self, row: &mut RowWriter<'_>) {
        row.int("battle_id", self.0.id)
            .string("name", self.0.name.as_str())
            .string("description", self.0.description.as_str())
            .int("closed_at", self.0.closes_at as i64);
    }
}

fn in_range<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
    name: &str,
    range: std::ops::RangeInclusive<u32>,
) -> Result<u32, HandlerError> {
    let value = call.u32_arg(name)?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(HandlerError::InvalidArgument(format!("{name} {value} outside {range:?}")))
    }
}

fn score_record<E: Environment, S: Storage>(call: &TunnelCall<'_, E, S>) -> Result<TunnelResponse, HandlerError> {
    let pid = call.pid()?;
    let now = call.now();
    let repo = &call.services.repo;

    let battle_id = call.opt_u32_arg("battle_id").filter(|&id| id != 0);
    if let Some(id) = battle_id {
        let battle = repo.get_battle(id)?.ok_or_else(|| HandlerError::InvalidArgument(format!("no battle {id}")))?;
        if battle.closes_at <= now {
            return Err(HandlerError::InvalidArgument(format!("battle {id} is closed")));
        }
    }

    let score = repo.insert_score(ScoreRecord {
        id: 0,
        pid,
        song_id: call.u32_arg("song_id")?,
        role_id: in_range(call, "role_id", 1..=BAND_ROLE_ID)?,
        score: call.u32_arg("score")?,
        stars: call.opt_u32_arg("stars").unwrap_or(0),
        diff_id: in_range(call, "diff_id", 1..=4)?,
        notes_pct: in_range(call, "notes_pct", 0..=100)?,
        instrument_mask: call.opt_u32_arg("inst_mask").unwrap_or(0),
        battle_id,
        recorded_at: now,
    })?;

    tracing::debug!(pid, song = score.song_id, role = score.role_id, score = score.score, "score recorded");
    Ok(call.empty())
}

fn open_battles<S: Storage>(repo: &Repository<S>, pid: u32, now: u64) -> Result<usize, HandlerError> {
    Ok(repo.list_battles()?.iter().filter(|b| b.pid == pid && b.closes_at > now).count())
}

fn battle_record<E: Environment, S: Storage>(call: &TunnelCall<'_, E, S>) -> Result<TunnelResponse, HandlerError> {
    let pid = call.pid()?;
    let now = call.now();
    let repo = &call.services.repo;

    if open_battles(repo, pid, now)? >= MAX_OPEN_BATTLES {
        return Err(HandlerError::InvalidArgument(format!("pid {pid} has too many open battles")));
    }
    let songs = call.args.int_list("songs")?;
    if songs.is_empty() {
        return Err(HandlerError::InvalidArgument("battle without songs".to_string()));
    }
    let duration = call.args.opt_int("duration").and_then(|d| u64::try_from(d).ok()).unwrap_or(DEFAULT_BATTLE_SECS);

    let battle = repo.insert_battle(BattleRecord {
        id: 0,
        pid,
        name: call.args.string("name")?,
        description: call.args.opt_string("description").unwrap_or_default(),
        songs,
        instrument: call.args.opt_int("instrument").unwrap_or(0),
        platform: call.platform(),
        created_at: now,
        closes_at: now.saturating_add(duration),
    })?;

    tracing::info!(pid, battle = battle.id, closes_at = battle.closes_at, "battle created");
    call.single(&BattleId(battle.id))
}

fn battle_limit_check<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
) -> Result<TunnelResponse, HandlerError> {
    let pid = call.pid()?;
    let open = open_battles(&call.services.repo, pid, call.now())?;
    call.single(&RetCode(open < MAX_OPEN_BATTLES))
}

/// Closed battles the caller created or played, most recently closed first.
fn battles_closed<E: Environment, S: Storage>(
    call: &TunnelCall<'_, E, S>,
) -> Result<TunnelResponse, HandlerError> {
    let pid = call.pid()?;
    let now = call.now();
    let repo = &call.services.repo;

    let played: Vec<u32> = repo.list_scores()?.iter().filter(|s| s.pid == pid).filter_map(|s| s.battle_id).collect();
    let mut closed: Vec<BattleRecord> = repo
        .list_battles()?
        .into_iter()
        .filter(|b| b.closes_at <= now && (b.pid == pid || played.contains(&b.id)))
        .collect();
    closed.sort_by(|a, b| b.closes_at.cmp(&a.closes_at));
    closed.truncate(CLOSED_BATTLES_LIMIT);

    let rows: Vec<ClosedBattle<'_>> = closed.iter().map(ClosedBattle).collect();
    call.rows(&rows)
}

#[cfg(test)]
mod tests {
    use encore_core::Platform;
    use encore_proto::tunnel::TunnelResponse;

    use super::*;
    use crate::tunnel::test_support::{call, login, services};

    fn score_request(pid: u32, battle_id: u32) -> String {
        format!(
            r#"[["scores/record",[["pid","song_id","role_id","score","stars","diff_id","notes_pct","inst_mask","battle_id"],[{pid},12,2,75000,5,4,97,2,{battle_id}]]]]"#
        )
    }

    #[test]
    fn scores_are_recorded() {
        let services = services();
        let session = login(&services, "alice", Platform::Ps3);

        let text = call(&services, &session, &score_request(session.pid, 0));
        assert_eq!(text, r#"[["scores/record","",[],[]]]"#);

        let scores = services.repo.list_scores().unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!((scores[0].score, scores[0].notes_pct, scores[0].battle_id), (75_000, 97, None));
    }

    #[test]
    fn out_of_range_fields_are_rejected() {
        let services = services();
        let session = login(&services, "alice", Platform::Ps3);
        let request = format!(
            r#"[["scores/record",[["pid","song_id","role_id","score","diff_id","notes_pct"],[{},1,11,5,1,5]]]]"#,
            session.pid
        );
        assert!(services.tunnel().handle(&session, &services, &request).is_err());
        assert!(services.repo.list_scores().unwrap().is_empty());
    }

    #[test]
    fn closed_battles_refuse_scores() {
        let services = services();
        let session = login(&services, "alice", Platform::Ps3);
        let battle = services
            .repo
            .insert_battle(BattleRecord {
                id: 0,
                pid: session.pid,
                name: "old".to_string(),
                description: String::new(),
                songs: vec![12],
                instrument: 0,
                platform: Platform::Ps3,
                created_at: 0,
                closes_at: 1,
            })
            .unwrap();

        let err = services.tunnel().handle(&session, &services, &score_request(session.pid, battle.id)).unwrap_err();
        assert!(matches!(err, HandlerError::Tunnel(_)));

        let closed = call(&services, &session, &format!(r#"[["battles/closed/get",[["pid"],[{}]]]]"#, session.pid));
        let rows = TunnelResponse::parse(&closed).unwrap().row_args();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].string("name").unwrap(), "old");
    }

    #[test]
    fn battle_limit_is_enforced() {
        let services = services();
        let session = login(&services, "alice", Platform::Ps3);
        let pid = session.pid;
        let create = format!(r#"[["battles/record",[["pid","name","songs000","songs001"],[{pid},"duel",5,6]]]]"#);
        let check = format!(r#"[["battles/limit/check",[["pid"],[{pid}]]]]"#);

        for _ in 0..MAX_OPEN_BATTLES {
            assert!(call(&services, &session, &check).ends_with("[0]]]"));
            let created = TunnelResponse::parse(&call(&services, &session, &create)).unwrap();
            assert!(created.row_args()[0].int("battle_id").unwrap() > 0);
        }
        assert!(call(&services, &session, &check).ends_with("[1]]]"));
        assert!(services.tunnel().handle(&session, &services, &create).is_err());
    }
}
