use crate::duckdb_impl::scalar::{VarcharOutput, invoke_unary_varchar_to_varchar};
use crate::log;
use crate::rules::{ChessGame, MoveDetail, ParseMode, RulesEngine, RulesError};
use duckdb::{
    core::{DataChunkHandle, LogicalTypeHandle, LogicalTypeId},
    vscalar::{ScalarFunctionSignature, VScalar},
    vtab::arrow::WritableVector,
};
use serde_json::{Value, json};
use std::error::Error;

/// `chess_pgn_moves_json(pgn)`: the verbose history of the first record.
pub struct ChessPgnMovesJsonScalar;

impl VScalar for ChessPgnMovesJsonScalar {
    type State = ();

    unsafe fn invoke(
        _state: &Self::State,
        input: &mut DataChunkHandle,
        output: &mut dyn WritableVector,
    ) -> Result<(), Box<dyn Error>> {
        invoke_unary_varchar_to_varchar(input, output, |pgn| {
            Ok(VarcharOutput::Value(match moves_json(pgn) {
                Ok(json) => json,
                Err(e) => {
                    log::error(format!("Error processing moves: {e}"));
                    "[]".to_string()
                }
            }))
        })
    }

    fn signatures() -> Vec<ScalarFunctionSignature> {
        vec![ScalarFunctionSignature::exact(
            vec![LogicalTypeHandle::from(LogicalTypeId::Varchar)],
            LogicalTypeHandle::from(LogicalTypeId::Varchar),
        )]
    }
}

fn detail_json(detail: &MoveDetail) -> Value {
    json!({
        "ply": detail.ply,
        "san": detail.san,
        "uci": detail.coord.to_string(),
        "fen": detail.fen,
    })
}

pub fn moves_json(pgn: &str) -> Result<String, RulesError> {
    let game = ChessGame::load_pgn(pgn, ParseMode::Tolerant)?;
    let moves: Vec<Value> = game.history().iter().map(detail_json).collect();
    Ok(Value::Array(moves).to_string())
}
