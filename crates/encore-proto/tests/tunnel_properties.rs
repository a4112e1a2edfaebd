//! Property-based tests for the JSON tunnel.

use encore_proto::tunnel::{RowWriter, TunnelArgs, TunnelRequest, TunnelResponse, TunnelRow};
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct ScoreRow {
    pid: i64,
    name: String,
    score: i64,
    songs: Vec<i64>,
}

impl TunnelRow for ScoreRow {
    fn write_row(&self, row: &mut RowWriter<'_>) {
        row.int("pid", self.pid).string("name", self.name.clone()).int("score", self.score).int_list("song", &self.songs);
    }
}

fn arbitrary_row(songs: usize) -> impl Strategy<Value = ScoreRow> {
    (any::<u32>(), "[a-zA-Z0-9\\[\\] ]{0,24}", any::<i32>(), prop::collection::vec(any::<u32>(), songs))
        .prop_map(|(pid, name, score, songs)| ScoreRow {
            pid: i64::from(pid),
            name,
            score: i64::from(score),
            songs: songs.into_iter().map(i64::from).collect(),
        })
}

fn expected_args(row: &ScoreRow) -> TunnelArgs {
    let mut args = TunnelArgs::new();
    args.insert("pid", row.pid).insert("name", row.name.as_str()).insert("score", row.score);
    for (i, song) in row.songs.iter().enumerate() {
        args.insert(format!("song{i:03}"), *song);
    }
    args
}

#[test]
fn prop_single_row_roundtrip() {
    proptest!(|(row in arbitrary_row(3))| {
        let response = TunnelResponse::single("scores/get", &row).expect("single row");
        let parsed = TunnelResponse::parse(&response.to_json_string()).expect("parse");

        prop_assert_eq!(parsed.path(), "scores/get");
        prop_assert_eq!(parsed.row_args(), vec![expected_args(&row)]);
        prop_assert_eq!(parsed.row_args()[0].int_list("song").expect("song list"), row.songs.clone());
    });
}

#[test]
fn prop_many_rows_roundtrip() {
    proptest!(|(rows in prop::collection::vec(arbitrary_row(2), 1..20))| {
        let response = TunnelResponse::rows("leaderboards/player/get", &rows).expect("rows");
        let parsed = TunnelResponse::parse(&response.to_json_string()).expect("parse");

        prop_assert_eq!(parsed.row_count(), rows.len());
        let expected: Vec<TunnelArgs> = rows.iter().map(expected_args).collect();
        prop_assert_eq!(parsed.row_args(), expected);
        prop_assert_eq!(parsed.types(), "dsddd");
    });
}

#[test]
fn prop_request_roundtrip() {
    proptest!(|(pid in any::<u32>(), name in "[a-z]{1,12}", values in prop::collection::vec(any::<i32>(), 0..8))| {
        let mut args = TunnelArgs::new();
        args.insert("pid", pid).insert("name", name.as_str());
        for (i, v) in values.iter().enumerate() {
            args.insert(format!("v{i:03}"), *v);
        }
        let request = TunnelRequest { path: "entities/band/update".to_string(), args };

        let parsed = TunnelRequest::parse(&request.to_json_string()).expect("parse");
        prop_assert_eq!(parsed.args.int("pid").expect("pid"), i64::from(pid));
        let expected: Vec<i64> = values.iter().copied().map(i64::from).collect();
        prop_assert_eq!(parsed.args.int_list("v").expect("list"), expected);
        prop_assert_eq!(parsed, request);
    });
}

#[test]
fn prop_arbitrary_text_never_panics() {
    proptest!(|(text in ".{0,128}")| {
        let _ = TunnelRequest::parse(&text);
        let _ = TunnelResponse::parse(&text);
    });
}
