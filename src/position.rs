//! Position and side-to-move derivation for arbitrary record text.
//!
//! Derivation never fails. Strategies are tried in order and the first one
//! that yields a position wins; the standard start is the last resort.

use crate::duckdb_impl::scalar::{VarcharOutput, invoke_unary_varchar_to_varchar};
use crate::log;
use crate::rules::{ChessGame, ParseMode, RulesEngine};
use crate::tags::{extract_meta, extract_tag};
use crate::types::{PgnMeta, STARTING_FEN, Turn};
use duckdb::{
    core::{DataChunkHandle, LogicalTypeHandle, LogicalTypeId},
    vscalar::{ScalarFunctionSignature, VScalar},
    vtab::arrow::WritableVector,
};
use serde_json::json;
use std::error::Error;

/// Placement, side to move, castling rights and en-passant square. The move
/// counters are dropped because independently produced FENs disagree on them.
pub fn normalize_fen(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

/// Reads the side-to-move field without a rules library. `None` when the
/// field is missing or is neither `w` nor `b`.
pub fn turn_from_fen(fen: &str) -> Option<Turn> {
    fen.split(' ').nth(1).and_then(Turn::from_fen_field)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedPosition {
    pub meta: PgnMeta,
    pub fen: String,
    pub turn: Turn,
}

type Strategy = fn(&str) -> Option<(String, Turn)>;

fn from_replay<E: RulesEngine>(text: &str) -> Option<(String, Turn)> {
    match E::load_pgn(text, ParseMode::Tolerant) {
        Ok(game) => Some((game.fen(), game.turn())),
        Err(e) => {
            log::warn(format!("replay failed, falling back: {e}"));
            None
        }
    }
}

fn from_fen_tag(text: &str) -> Option<(String, Turn)> {
    let fen = extract_tag("FEN", text)?;
    let turn = turn_from_fen(&fen)?;
    Some((fen, turn))
}

pub fn derive_meta(text: &str) -> DerivedPosition {
    derive_meta_with::<ChessGame>(text)
}

pub fn derive_meta_with<E: RulesEngine>(text: &str) -> DerivedPosition {
    let strategies: [Strategy; 2] = [from_replay::<E>, from_fen_tag];

    let (fen, turn) = strategies
        .iter()
        .find_map(|strategy| strategy(text))
        .unwrap_or_else(|| {
            log::debug("no usable position, using the standard start");
            (STARTING_FEN.to_string(), Turn::White)
        });

    DerivedPosition {
        meta: extract_meta(text),
        fen,
        turn,
    }
}

fn meta_json(derived: &DerivedPosition) -> String {
    json!({
        "white": derived.meta.white,
        "black": derived.meta.black,
        "result": derived.meta.result,
        "eco": derived.meta.eco,
        "date": derived.meta.date,
        "fen": derived.fen,
        "turn": derived.turn.as_str(),
    })
    .to_string()
}

/// `chess_pgn_meta(pgn)`
pub struct ChessPgnMetaScalar;

impl VScalar for ChessPgnMetaScalar {
    type State = ();

    unsafe fn invoke(
        _state: &Self::State,
        input: &mut DataChunkHandle,
        output: &mut dyn WritableVector,
    ) -> Result<(), Box<dyn Error>> {
        invoke_unary_varchar_to_varchar(input, output, |pgn| {
            Ok(VarcharOutput::Value(meta_json(&derive_meta(pgn))))
        })
    }

    fn signatures() -> Vec<ScalarFunctionSignature> {
        vec![ScalarFunctionSignature::exact(
            vec![LogicalTypeHandle::from(LogicalTypeId::Varchar)],
            LogicalTypeHandle::from(LogicalTypeId::Varchar),
        )]
    }
}

/// `chess_pgn_fen(pgn)`
pub struct ChessPgnFenScalar;

impl VScalar for ChessPgnFenScalar {
    type State = ();

    unsafe fn invoke(
        _state: &Self::State,
        input: &mut DataChunkHandle,
        output: &mut dyn WritableVector,
    ) -> Result<(), Box<dyn Error>> {
        invoke_unary_varchar_to_varchar(input, output, |pgn| {
            Ok(VarcharOutput::Value(derive_meta(pgn).fen))
        })
    }

    fn signatures() -> Vec<ScalarFunctionSignature> {
        vec![ScalarFunctionSignature::exact(
            vec![LogicalTypeHandle::from(LogicalTypeId::Varchar)],
            LogicalTypeHandle::from(LogicalTypeId::Varchar),
        )]
    }
}

/// `chess_fen_turn(fen)`
pub struct ChessFenTurnScalar;

impl VScalar for ChessFenTurnScalar {
    type State = ();

    unsafe fn invoke(
        _state: &Self::State,
        input: &mut DataChunkHandle,
        output: &mut dyn WritableVector,
    ) -> Result<(), Box<dyn Error>> {
        invoke_unary_varchar_to_varchar(input, output, |fen| {
            Ok(match turn_from_fen(fen) {
                Some(turn) => VarcharOutput::Value(turn.as_str().to_string()),
                None => VarcharOutput::Null,
            })
        })
    }

    fn signatures() -> Vec<ScalarFunctionSignature> {
        vec![ScalarFunctionSignature::exact(
            vec![LogicalTypeHandle::from(LogicalTypeId::Varchar)],
            LogicalTypeHandle::from(LogicalTypeId::Varchar),
        )]
    }
}
