mod analysis;
mod combine;
mod convert;
mod coord;
mod duckdb_impl;
mod error;
mod log;
mod moves;
mod position;
mod rules;
mod tags;
mod types;

use analysis::ChessAnalysisJsonScalar;
use combine::{ChessFenMovesPgnScalar, ChessPgnCombineScalar};
use convert::ChessPgnGamesJsonScalar;
use duckdb::{Connection, Result};
use duckdb_ext_macros::duckdb_extension;
use moves::ChessPgnMovesJsonScalar;
use position::{ChessFenTurnScalar, ChessPgnFenScalar, ChessPgnMetaScalar};
use std::error::Error;
use tags::ChessPgnTagScalar;

#[duckdb_extension(name = "chess_reconcile", api_version = "v1.0.0")]
pub unsafe fn extension_entrypoint(con: Connection) -> Result<(), Box<dyn Error>> {
    // Header and position lookups
    con.register_scalar_function::<ChessPgnTagScalar>("chess_pgn_tag")?;
    con.register_scalar_function::<ChessPgnMetaScalar>("chess_pgn_meta")?;
    con.register_scalar_function::<ChessPgnFenScalar>("chess_pgn_fen")?;
    con.register_scalar_function::<ChessFenTurnScalar>("chess_fen_turn")?;
    con.register_scalar_function::<ChessPgnMovesJsonScalar>("chess_pgn_moves_json")?;

    // Record building
    con.register_scalar_function::<ChessPgnCombineScalar>("chess_pgn_combine")?;
    con.register_scalar_function::<ChessFenMovesPgnScalar>("chess_fen_moves_pgn")?;
    con.register_scalar_function::<ChessPgnGamesJsonScalar>("chess_pgn_games_json")?;
    con.register_scalar_function::<ChessAnalysisJsonScalar>("chess_analysis_json")?;

    Ok(())
}
