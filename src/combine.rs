//! Reconciliation of a played record with a continuation suggested from one
//! of its positions, and the simpler position + moves to record builder.

use crate::coord::{CoordinateMove, ParseCoordinateError, split_move_list};
use crate::duckdb_impl::scalar::{
    VarcharOutput, invoke_binary_varchar_to_varchar, invoke_ternary_varchar_to_varchar,
};
use crate::log;
use crate::position::normalize_fen;
use crate::rules::{ChessGame, ParseMode, RulesEngine, RulesError, setup_fen};
use duckdb::{
    core::{DataChunkHandle, LogicalTypeHandle, LogicalTypeId},
    vscalar::{ScalarFunctionSignature, VScalar},
    vtab::arrow::WritableVector,
};
use shakmaty::Role;
use std::error::Error;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("malformed input record: {0}")]
    MalformedInput(#[source] RulesError),
    #[error("position not found in record: {target}")]
    PositionNotFound { target: String },
    #[error("illegal continuation move #{index} '{text}' in position '{fen}'")]
    IllegalContinuationMove {
        index: usize,
        text: String,
        fen: String,
    },
    #[error("malformed continuation move #{index} '{text}': {reason}")]
    MalformedMove {
        index: usize,
        text: String,
        reason: &'static str,
    },
}

/// Runs a FEN through the rules engine when it can, so that fields the engine
/// writes differently (e.g. an en-passant square no pawn can use) compare
/// equal.
fn canonical_target<E: RulesEngine>(fen: &str) -> String {
    match E::from_fen(fen) {
        Ok(game) => normalize_fen(&game.fen()),
        Err(_) => normalize_fen(fen),
    }
}

fn start_of<E: RulesEngine>(original: &E) -> Result<E, ReconcileError> {
    match setup_fen(original.headers()) {
        Some(fen) => E::from_fen(fen).map_err(ReconcileError::MalformedInput),
        None => Ok(E::new()),
    }
}

/// Plies to replay so that the game stands on `target`; `0` is the start.
fn locate_cut<E: RulesEngine>(start: &E, original: &E, target: &str) -> Option<usize> {
    let target = canonical_target::<E>(target);
    if normalize_fen(&start.fen()) == target {
        return Some(0);
    }
    original
        .history()
        .iter()
        .position(|detail| normalize_fen(&detail.fen) == target)
        .map(|i| i + 1)
}

fn apply_moves<E: RulesEngine>(
    game: &mut E,
    moves: &[&str],
    default_queen: bool,
) -> Result<(), ReconcileError> {
    for (index, text) in moves.iter().enumerate() {
        let mv: CoordinateMove = text.parse().map_err(|e: ParseCoordinateError| {
            ReconcileError::MalformedMove {
                index,
                text: text.to_string(),
                reason: e.reason,
            }
        })?;

        let applied = match game.apply_move(&mv) {
            Err(_) if default_queen && mv.promotion.is_none() => {
                game.apply_move(&mv.promoting_to(Role::Queen))
            }
            other => other,
        };

        if applied.is_err() {
            return Err(ReconcileError::IllegalContinuationMove {
                index,
                text: text.to_string(),
                fen: game.fen(),
            });
        }
    }
    Ok(())
}

pub fn combine_pgn(pgn: &str, target_fen: &str, moves: &[&str]) -> Result<String, ReconcileError> {
    combine_pgn_with::<ChessGame>(pgn, target_fen, moves)
}

/// Truncates `pgn` at the first ply whose position matches `target_fen`
/// (ignoring the move counters) and appends `moves`.
pub fn combine_pgn_with<E: RulesEngine>(
    pgn: &str,
    target_fen: &str,
    moves: &[&str],
) -> Result<String, ReconcileError> {
    let original = E::load_pgn(pgn, ParseMode::Strict).map_err(ReconcileError::MalformedInput)?;
    let mut game = start_of(&original)?;

    let cut = locate_cut(&game, &original, target_fen).ok_or_else(|| {
        ReconcileError::PositionNotFound {
            target: normalize_fen(target_fen),
        }
    })?;
    log::debug(format!(
        "cutting record at ply {cut} of {}",
        original.history().len()
    ));

    for detail in &original.history()[..cut] {
        game.apply_move(&detail.coord)
            .map_err(ReconcileError::MalformedInput)?;
    }
    apply_moves(&mut game, moves, false)?;

    for (key, value) in original.headers().iter() {
        if key.eq_ignore_ascii_case("SetUp") || key.eq_ignore_ascii_case("FEN") {
            continue;
        }
        game.set_header(key, value);
    }

    // A plain truncation keeps the original headers, Result included.
    if !moves.is_empty() {
        let result = game.outcome().unwrap_or("*");
        game.set_header("Result", result);
    }

    Ok(game.export_pgn())
}

pub fn fen_moves_to_pgn(start_fen: &str, moves: &[&str]) -> Result<String, ReconcileError> {
    fen_moves_to_pgn_with::<ChessGame>(start_fen, moves)
}

/// Builds a record from a starting position and coordinate moves. An empty
/// FEN or `start` means the standard start, which gets no setup block.
pub fn fen_moves_to_pgn_with<E: RulesEngine>(
    start_fen: &str,
    moves: &[&str],
) -> Result<String, ReconcileError> {
    let start_fen = start_fen.trim();
    let mut game = if start_fen.is_empty() || start_fen.eq_ignore_ascii_case("start") {
        E::new()
    } else {
        E::from_fen(start_fen).map_err(ReconcileError::MalformedInput)?
    };

    apply_moves(&mut game, moves, true)?;
    Ok(game.export_pgn())
}

/// `chess_pgn_combine(pgn, fen, moves)`
pub struct ChessPgnCombineScalar;

impl VScalar for ChessPgnCombineScalar {
    type State = ();

    unsafe fn invoke(
        _state: &Self::State,
        input: &mut DataChunkHandle,
        output: &mut dyn WritableVector,
    ) -> Result<(), Box<dyn Error>> {
        invoke_ternary_varchar_to_varchar(input, output, |pgn, fen, moves| {
            let combined = combine_pgn(pgn, fen, &split_move_list(moves)).inspect_err(|e| {
                log::error(format!("chess_pgn_combine: {e}"));
            })?;
            Ok(VarcharOutput::Value(combined))
        })
    }

    fn signatures() -> Vec<ScalarFunctionSignature> {
        vec![ScalarFunctionSignature::exact(
            vec![
                LogicalTypeHandle::from(LogicalTypeId::Varchar),
                LogicalTypeHandle::from(LogicalTypeId::Varchar),
                LogicalTypeHandle::from(LogicalTypeId::Varchar),
            ],
            LogicalTypeHandle::from(LogicalTypeId::Varchar),
        )]
    }
}

/// `chess_fen_moves_pgn(fen, moves)`
pub struct ChessFenMovesPgnScalar;

impl VScalar for ChessFenMovesPgnScalar {
    type State = ();

    unsafe fn invoke(
        _state: &Self::State,
        input: &mut DataChunkHandle,
        output: &mut dyn WritableVector,
    ) -> Result<(), Box<dyn Error>> {
        invoke_binary_varchar_to_varchar(input, output, |fen, moves| {
            let pgn = fen_moves_to_pgn(fen, &split_move_list(moves)).inspect_err(|e| {
                log::error(format!("chess_fen_moves_pgn: {e}"));
            })?;
            Ok(VarcharOutput::Value(pgn))
        })
    }

    fn signatures() -> Vec<ScalarFunctionSignature> {
        vec![ScalarFunctionSignature::exact(
            vec![
                LogicalTypeHandle::from(LogicalTypeId::Varchar),
                LogicalTypeHandle::from(LogicalTypeId::Varchar),
            ],
            LogicalTypeHandle::from(LogicalTypeId::Varchar),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::derive_meta;
    use crate::types::{STARTING_FEN, Turn};

    const SAMPLE: &str = "[Event \"Test\"]\n[White \"A\"]\n[Black \"B\"]\n[Result \"1-0\"]\n\n1. e4 e5 2. Nf3 Nc6 1-0";

    fn final_position(pgn: &str) -> ChessGame {
        ChessGame::load_pgn(pgn, ParseMode::Strict).unwrap()
    }

    #[test]
    fn test_combine_appends_continuation_at_final_position() {
        let target = derive_meta(SAMPLE).fen;
        let combined = combine_pgn(SAMPLE, &target, &["f1b5"]).unwrap();

        assert_eq!(
            combined,
            "[Event \"Test\"]\n[White \"A\"]\n[Black \"B\"]\n[Result \"*\"]\n\n1. e4 e5 2. Nf3 Nc6 3. Bb5 *"
        );
        assert_eq!(
            final_position(&combined).fen(),
            "r1bqkbnr/pppp1ppp/2n5/1B2p3/4P3/5N2/PPPP1PPP/RNBQK2R b KQkq - 3 3"
        );
    }

    #[test]
    fn test_combine_truncates_at_earlier_ply() {
        // Counters and a dead en-passant square must not prevent the match.
        let target = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 5";
        let combined = combine_pgn(SAMPLE, target, &["d7d5"]).unwrap();
        assert!(combined.ends_with("\n\n1. e4 d5 *"), "{combined}");
    }

    #[test]
    fn test_combine_at_ply_zero_without_moves_keeps_headers() {
        let combined = combine_pgn(SAMPLE, STARTING_FEN, &[]).unwrap();
        assert_eq!(
            combined,
            "[Event \"Test\"]\n[White \"A\"]\n[Black \"B\"]\n[Result \"1-0\"]\n\n1-0"
        );

        let replayed = final_position(&combined);
        assert_eq!(replayed.fen(), STARTING_FEN);
        let headers: Vec<_> = replayed.headers().iter().collect();
        let original_position = final_position(SAMPLE);
        let original: Vec<_> = original_position.headers().iter().collect();
        assert_eq!(headers, original);
    }

    #[test]
    fn test_combine_with_empty_continuation_preserves_prefix() {
        let original = final_position(SAMPLE);
        let mut targets = vec![STARTING_FEN.to_string()];
        targets.extend(original.history().iter().map(|d| d.fen.clone()));

        for (k, target) in targets.iter().enumerate() {
            let combined = combine_pgn(SAMPLE, target, &[]).unwrap();
            let replayed = final_position(&combined);
            assert_eq!(replayed.history().len(), k);
            assert_eq!(normalize_fen(&replayed.fen()), normalize_fen(target));
        }
    }

    #[test]
    fn test_combine_keeps_result_when_line_is_unchanged() {
        let target = derive_meta(SAMPLE).fen;
        assert_eq!(combine_pgn(SAMPLE, &target, &[]).unwrap(), SAMPLE);
    }

    #[test]
    fn test_continuation_is_applied_in_order() {
        let combined = combine_pgn("*", STARTING_FEN, &["e2e4", "e7e5"]).unwrap();
        let game = final_position(&combined);
        assert_eq!(
            normalize_fen(&game.fen()),
            "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq -"
        );
        assert_eq!(game.turn(), Turn::White);
    }

    #[test]
    fn test_continuation_result_reflects_checkmate() {
        let pgn = "1. f3 e5 2. g4 *";
        let target = derive_meta(pgn).fen;
        assert_eq!(
            combine_pgn(pgn, &target, &["d8h4"]).unwrap(),
            "[Result \"0-1\"]\n\n1. f3 e5 2. g4 Qh4# 0-1"
        );
    }

    #[test]
    fn test_combine_rejects_malformed_record() {
        assert!(matches!(
            combine_pgn("not a valid record ???", STARTING_FEN, &[]),
            Err(ReconcileError::MalformedInput(_))
        ));
        assert!(matches!(
            combine_pgn("1. e4 e5 2. Ke3", STARTING_FEN, &[]),
            Err(ReconcileError::MalformedInput(RulesError::IllegalSan { .. }))
        ));
    }

    #[test]
    fn test_combine_rejects_unknown_position() {
        let err = combine_pgn(SAMPLE, "8/8/8/8/8/8/8/8 w - - 0 1", &[]).unwrap_err();
        assert_eq!(
            err,
            ReconcileError::PositionNotFound {
                target: "8/8/8/8/8/8/8/8 w - -".to_string()
            }
        );
    }

    #[test]
    fn test_combine_rejects_illegal_continuation() {
        let err = combine_pgn(SAMPLE, STARTING_FEN, &["a1a2"]).unwrap_err();
        assert_eq!(
            err,
            ReconcileError::IllegalContinuationMove {
                index: 0,
                text: "a1a2".to_string(),
                fen: STARTING_FEN.to_string(),
            }
        );

        let err = combine_pgn(SAMPLE, STARTING_FEN, &["e2e4", "e2e4"]).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::IllegalContinuationMove { index: 1, .. }
        ));
    }

    #[test]
    fn test_combine_rejects_malformed_continuation() {
        let err = combine_pgn(SAMPLE, STARTING_FEN, &["e2e9"]).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::MalformedMove { index: 0, ref text, .. } if text == "e2e9"
        ));
    }

    #[test]
    fn test_combine_preserves_custom_start() {
        let fen = "4k3/8/8/8/8/8/4P3/4K3 w - - 0 1";
        let pgn = format!("[SetUp \"1\"]\n[FEN \"{fen}\"]\n\n1. e4 Kd7 *");
        let combined = combine_pgn(&pgn, fen, &["e1d2"]).unwrap();
        assert_eq!(
            combined,
            format!("[Result \"*\"]\n[SetUp \"1\"]\n[FEN \"{fen}\"]\n\n1. Kd2 *")
        );
    }

    #[test]
    fn test_combine_custom_black_start_cut_mid_game() {
        let fen = "4k3/8/8/8/8/8/4P3/4K3 b - - 0 7";
        let pgn = format!("[SetUp \"1\"]\n[FEN \"{fen}\"]\n\n7... Kd7 8. e4 Kc6 *");
        let target = "8/3k4/8/8/4P3/8/8/4K3 b - e3 0 8";
        let combined = combine_pgn(&pgn, target, &["d7e6"]).unwrap();
        assert_eq!(
            combined,
            format!("[Result \"*\"]\n[SetUp \"1\"]\n[FEN \"{fen}\"]\n\n7... Kd7 8. e4 Ke6 *")
        );

        let replayed = final_position(&combined);
        assert_eq!(replayed.history().len(), 3);
        assert_eq!(replayed.fen(), "8/8/4k3/8/4P3/8/8/4K3 w - - 1 9");
    }

    #[test]
    fn test_fen_moves_to_pgn_from_standard_start() {
        assert_eq!(fen_moves_to_pgn("", &["e2e4", "e7e5"]).unwrap(), "1. e4 e5");
        assert_eq!(fen_moves_to_pgn("start", &[]).unwrap(), "");
    }

    #[test]
    fn test_fen_moves_to_pgn_emits_setup_block_and_defaults_to_queen() {
        let fen = "4k3/P7/8/8/8/8/8/4K3 w - - 0 1";
        assert_eq!(
            fen_moves_to_pgn(fen, &["a7a8"]).unwrap(),
            format!("[SetUp \"1\"]\n[FEN \"{fen}\"]\n\n1. a8=Q+")
        );
        assert_eq!(
            fen_moves_to_pgn(fen, &["a7a8n"]).unwrap(),
            format!("[SetUp \"1\"]\n[FEN \"{fen}\"]\n\n1. a8=N")
        );
    }

    #[test]
    fn test_fen_moves_to_pgn_errors() {
        assert!(matches!(
            fen_moves_to_pgn("garbage", &[]),
            Err(ReconcileError::MalformedInput(RulesError::InvalidFen { .. }))
        ));
        assert!(matches!(
            fen_moves_to_pgn("", &["e2e5"]),
            Err(ReconcileError::IllegalContinuationMove { index: 0, .. })
        ));
        assert!(matches!(
            fen_moves_to_pgn("", &["xx"]),
            Err(ReconcileError::MalformedMove { index: 0, .. })
        ));
    }
}
