//! Batch conversion of record text into structured [`Game`] values.

use crate::duckdb_impl::scalar::{VarcharOutput, invoke_unary_varchar_to_varchar};
use crate::error::ErrorAccumulator;
use crate::log;
use crate::position::derive_meta;
use crate::rules::{ChessGame, ParseMode, RulesEngine, setup_fen};
use crate::tags::parse_headers;
use crate::types::{Game, Player, STARTING_FEN, TagMap};
use chrono::NaiveDate;
use duckdb::{
    core::{DataChunkHandle, LogicalTypeHandle, LogicalTypeId},
    vscalar::{ScalarFunctionSignature, VScalar},
    vtab::arrow::WritableVector,
};
use serde_json::{Value, json};
use std::error::Error;
use uuid::Uuid;

/// Splits a batch into records. A new record starts at a tag line that
/// follows a blank line.
pub fn split_records(text: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut after_blank = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() && current.is_empty() {
            continue;
        }
        if trimmed.starts_with('[') && after_blank && !current.is_empty() {
            records.push(current.join("\n").trim().to_string());
            current.clear();
        }
        after_blank = trimmed.is_empty();
        current.push(line);
    }

    let last = current.join("\n");
    if !last.trim().is_empty() {
        records.push(last.trim().to_string());
    }
    records
}

/// `win`/`loss`/`draw` for white and black, `unknown` for anything else.
fn player_results(result: &str) -> (&'static str, &'static str) {
    match result.trim() {
        "1-0" => ("win", "loss"),
        "0-1" => ("loss", "win"),
        "1/2-1/2" => ("draw", "draw"),
        _ => ("unknown", "unknown"),
    }
}

fn parse_rating(tags: &TagMap, key: &str, errors: &mut ErrorAccumulator) -> Option<u32> {
    let raw = tags.get(key)?.trim();
    if raw.is_empty() || raw == "?" || raw == "-" {
        return None;
    }
    match raw.parse::<u32>() {
        Ok(rating) => Some(rating),
        Err(_) => {
            errors.reject_tag(key, raw);
            None
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct InvalidDate;

/// Unix seconds at midnight UTC of a `YYYY.MM.DD` date. Unknown month or day
/// parts (`??`) count as `01`; an unknown year gives no timestamp.
fn date_to_timestamp(raw: &str) -> Result<Option<i64>, InvalidDate> {
    let parts: Vec<&str> = raw.trim().split(['.', '-', '/']).collect();
    let [year, month, day] = parts.as_slice() else {
        return Err(InvalidDate);
    };
    if year.contains('?') {
        return Ok(None);
    }

    let part = |s: &str| -> Result<u32, InvalidDate> {
        if s.chars().all(|c| c == '?') {
            Ok(1)
        } else {
            s.parse().map_err(|_| InvalidDate)
        }
    };
    let year: i32 = year.parse().map_err(|_| InvalidDate)?;

    NaiveDate::from_ymd_opt(year, part(*month)?, part(*day)?)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| Some(dt.and_utc().timestamp()))
        .ok_or(InvalidDate)
}

fn player(
    tags: &TagMap,
    name_key: &str,
    elo_key: &str,
    result: &'static str,
    errors: &mut ErrorAccumulator,
) -> Player {
    Player {
        username: tags
            .get(name_key)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("Unknown")
            .to_string(),
        rating: parse_rating(tags, elo_key, errors),
        result,
    }
}

pub fn build_game(record: &str) -> Game {
    let tags = parse_headers(record);
    let mut errors = ErrorAccumulator::default();

    let fen = match ChessGame::load_pgn(record, ParseMode::Tolerant) {
        Ok(game) => game.fen(),
        Err(e) => {
            errors.push(format!("moves: {e}"));
            derive_meta(record).fen
        }
    };

    let end_time = match tags.get("Date") {
        Some(date) => date_to_timestamp(date).unwrap_or_else(|_| {
            errors.reject_tag("Date", date);
            None
        }),
        None => None,
    };

    let (white_result, black_result) = player_results(tags.get("Result").unwrap_or("*"));
    let white = player(&tags, "White", "WhiteElo", white_result, &mut errors);
    let black = player(&tags, "Black", "BlackElo", black_result, &mut errors);

    Game {
        uuid: Uuid::new_v4().to_string(),
        pgn: record.to_string(),
        fen,
        initial_setup: setup_fen(&tags).unwrap_or(STARTING_FEN).to_string(),
        time_control: tags
            .get("TimeControl")
            .filter(|tc| !tc.is_empty())
            .map(str::to_string),
        end_time,
        rules: "chess",
        eco: tags.get("ECO").filter(|eco| !eco.is_empty()).map(str::to_string),
        white,
        black,
        parse_error: errors.finish(),
    }
}

pub fn convert_pgn_batch(text: &str) -> Vec<Game> {
    let games: Vec<Game> = split_records(text).iter().map(|r| build_game(r)).collect();
    for (i, game) in games.iter().enumerate() {
        if let Some(err) = &game.parse_error {
            log::warn(format!("record {}: {err}", i + 1));
        }
    }
    games
}

fn player_json(player: &Player) -> Value {
    json!({
        "username": player.username,
        "rating": player.rating,
        "result": player.result,
    })
}

fn game_json(game: &Game) -> Value {
    let mut value = json!({
        "uuid": game.uuid,
        "pgn": game.pgn,
        "fen": game.fen,
        "initial_setup": game.initial_setup,
        "time_control": game.time_control,
        "end_time": game.end_time,
        "rules": game.rules,
        "white": player_json(&game.white),
        "black": player_json(&game.black),
        "parse_error": game.parse_error,
    });
    if let (Some(eco), Some(map)) = (&game.eco, value.as_object_mut()) {
        map.insert("eco".to_string(), Value::from(eco.as_str()));
    }
    value
}

pub fn games_to_json(games: &[Game]) -> String {
    Value::Array(games.iter().map(game_json).collect()).to_string()
}

/// `chess_pgn_games_json(pgns)`
pub struct ChessPgnGamesJsonScalar;

impl VScalar for ChessPgnGamesJsonScalar {
    type State = ();

    unsafe fn invoke(
        _state: &Self::State,
        input: &mut DataChunkHandle,
        output: &mut dyn WritableVector,
    ) -> Result<(), Box<dyn Error>> {
        invoke_unary_varchar_to_varchar(input, output, |text| {
            Ok(VarcharOutput::Value(games_to_json(&convert_pgn_batch(text))))
        })
    }

    fn signatures() -> Vec<ScalarFunctionSignature> {
        vec![ScalarFunctionSignature::exact(
            vec![LogicalTypeHandle::from(LogicalTypeId::Varchar)],
            LogicalTypeHandle::from(LogicalTypeId::Varchar),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BATCH: &str = "[Event \"USA-chJ\"]\n[Date \"1955.11.12\"]\n[White \"Thomason, J.\"]\n[Black \"Fischer, Robert James\"]\n[Result \"0-1\"]\n[ECO \"E91\"]\n\n1.d4 Nf6 2.c4 g6 0-1\n\n[Event \"USA-chJ\"]\n[Date \"1955.??.??\"]\n[White \"Fischer, Robert James\"]\n[WhiteElo \"2500\"]\n[Result \"1-0\"]\n\n1.e4 c5 1-0\n";

    #[test]
    fn test_split_records_at_blank_line_before_tags() {
        let records = split_records(BATCH);
        assert_eq!(records.len(), 2);
        assert!(records[0].starts_with("[Event"));
        assert!(records[0].ends_with("0-1"));
        assert!(records[1].contains("[WhiteElo \"2500\"]"));
    }

    #[test]
    fn test_split_records_keeps_header_block_together() {
        let records = split_records("\n\n[Event \"A\"]\n[Site \"B\"]\n\n1. e4 *\n");
        assert_eq!(records, vec!["[Event \"A\"]\n[Site \"B\"]\n\n1. e4 *"]);
        assert!(split_records("  \n").is_empty());
    }

    #[test]
    fn test_leading_blank_lines_do_not_make_a_record() {
        let games = convert_pgn_batch("\n\n[Event \"A\"]\n[White \"X\"]\n\n1. e4 *\n\n\n[Event \"B\"]\n\n1. d4 *");
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].white.username, "X");
        assert!(games[0].pgn.starts_with("[Event \"A\"]"));
        assert!(games[1].pgn.starts_with("[Event \"B\"]"));
    }

    #[test]
    fn test_convert_batch_fields() {
        let games = convert_pgn_batch(BATCH);
        assert_eq!(games.len(), 2);

        let first = &games[0];
        assert_eq!(first.white.username, "Thomason, J.");
        assert_eq!(first.white.result, "loss");
        assert_eq!(first.black.result, "win");
        assert_eq!(first.eco.as_deref(), Some("E91"));
        assert_eq!(first.rules, "chess");
        assert_eq!(first.initial_setup, STARTING_FEN);
        assert_eq!(first.end_time, Some(-446_169_600));
        assert_eq!(
            first.fen,
            "rnbqkb1r/pppppp1p/5np1/8/2PP4/8/PP2PPPP/RNBQKBNR w KQkq - 0 3"
        );
        assert_eq!(first.parse_error, None);

        let second = &games[1];
        assert_eq!(second.white.rating, Some(2500));
        assert_eq!(second.black.username, "Unknown");
        assert_eq!(second.black.rating, None);
        assert_eq!(second.end_time, Some(-473_385_600));
        assert_ne!(first.uuid, second.uuid);
    }

    #[test]
    fn test_player_results() {
        assert_eq!(player_results("1/2-1/2"), ("draw", "draw"));
        assert_eq!(player_results("*"), ("unknown", "unknown"));
    }

    #[test]
    fn test_date_to_timestamp() {
        assert_eq!(date_to_timestamp("1970.01.02"), Ok(Some(86_400)));
        assert_eq!(date_to_timestamp("1970.??.??"), Ok(Some(0)));
        assert_eq!(date_to_timestamp("????.??.??"), Ok(None));
        assert!(date_to_timestamp("1970.13.01").is_err());
        assert!(date_to_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_conversion_problems_are_accumulated() {
        let game = build_game("[WhiteElo \"abc\"]\n[Date \"1999.02.30\"]\n\n1. e4 e5 2. Ke3 *");
        assert_eq!(game.white.rating, None);
        assert_eq!(game.end_time, None);

        let err = game.parse_error.unwrap();
        assert!(err.starts_with("moves: illegal move 'Ke3'"), "{err}");
        assert!(err.contains("Date='1999.02.30'"));
        assert!(err.ends_with("WhiteElo='abc'"));
        assert_eq!(game.fen, STARTING_FEN);
    }

    #[test]
    fn test_custom_setup_is_initial_setup() {
        let fen = "4k3/8/8/8/8/8/4P3/4K3 w - - 0 1";
        let game = build_game(&format!("[SetUp \"1\"]\n[FEN \"{fen}\"]\n\n1. e4 *"));
        assert_eq!(game.initial_setup, fen);
        assert_eq!(game.fen, "4k3/8/8/8/4P3/8/8/4K3 b - - 0 1");
    }

    #[test]
    fn test_games_to_json_shape() {
        let json = games_to_json(&convert_pgn_batch(BATCH));
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["eco"], "E91");
        assert!(value[1].get("eco").is_none());
        assert_eq!(value[1]["white"]["rating"], 2500);
        assert_eq!(value[0]["parse_error"], Value::Null);
    }
}
