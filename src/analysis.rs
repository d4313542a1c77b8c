//! Normalization of engine analysis payloads. Different analysis services
//! name the same fields differently; everything is mapped onto
//! [`MoveAnalysis`].

use crate::duckdb_impl::scalar::{VarcharOutput, invoke_unary_varchar_to_varchar};
use crate::log;
use duckdb::{
    core::{DataChunkHandle, LogicalTypeHandle, LogicalTypeId},
    vscalar::{ScalarFunctionSignature, VScalar},
    vtab::arrow::WritableVector,
};
use serde_json::{Map, Value};
use std::error::Error;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveAnalysis {
    pub r#move: Option<String>,
    /// Passed through as given: a number, or a string such as `"M3"`.
    pub evaluation: Option<Value>,
    pub best: Option<String>,
    pub depth: Option<Value>,
    pub text: Option<String>,
    pub fen: Option<String>,
    pub continuation: Option<Vec<Value>>,
    pub continuation_arr: Option<Vec<String>>,

    /// The move itself followed by its continuation.
    pub continuation_arr_combined: Vec<String>,
}

/// First of `keys` that is present and not `null`.
fn first_of<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find(|value| !value.is_null())
}

fn string_of(raw: &Value, keys: &[&str]) -> Option<String> {
    first_of(raw, keys).map(|value| match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

pub fn normalize_analysis(raw: &Value) -> MoveAnalysis {
    let r#move = string_of(raw, &["move", "san", "lan"]);
    let continuation_arr: Option<Vec<String>> =
        first_of(raw, &["continuationArr"])
            .and_then(Value::as_array)
            .map(|moves| {
                moves
                    .iter()
                    .filter_map(|m| m.as_str().map(str::to_string))
                    .collect()
            });

    let continuation_arr_combined = r#move
        .iter()
        .chain(continuation_arr.iter().flatten())
        .cloned()
        .collect();

    MoveAnalysis {
        evaluation: first_of(raw, &["eval", "evaluation"]).cloned(),
        best: string_of(raw, &["bestmove", "best", "bestMove"]),
        depth: first_of(raw, &["depth"]).cloned(),
        text: string_of(raw, &["text", "comment"]),
        fen: string_of(raw, &["fen"]),
        continuation: first_of(raw, &["continuation"])
            .and_then(Value::as_array)
            .cloned(),
        r#move,
        continuation_arr,
        continuation_arr_combined,
    }
}

/// Accepts a bare array, an object carrying a `moves` array, or a single
/// analysis object.
pub fn normalize_analysis_response(json: &str) -> Result<Vec<MoveAnalysis>, serde_json::Error> {
    let data: Value = serde_json::from_str(json)?;
    let lines = match &data {
        Value::Array(items) => items.iter().collect::<Vec<_>>(),
        Value::Object(obj) => match obj.get("moves").and_then(Value::as_array) {
            Some(items) => items.iter().collect(),
            None => vec![&data],
        },
        other => vec![other],
    };
    Ok(lines.into_iter().map(normalize_analysis).collect())
}

pub fn analysis_json(analysis: &MoveAnalysis) -> Value {
    let mut map = Map::new();
    let mut put = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            map.insert(key.to_string(), value);
        }
    };

    put("move", analysis.r#move.clone().map(Value::from));
    put("evaluation", analysis.evaluation.clone());
    put("best", analysis.best.clone().map(Value::from));
    put("depth", analysis.depth.clone());
    put("text", analysis.text.clone().map(Value::from));
    put("fen", analysis.fen.clone().map(Value::from));
    put("continuation", analysis.continuation.clone().map(Value::Array));
    put("continuationArr", analysis.continuation_arr.clone().map(Value::from));
    put(
        "continuationArrCombined",
        Some(Value::from(analysis.continuation_arr_combined.clone())),
    );

    Value::Object(map)
}

/// `chess_analysis_json(json)`
pub struct ChessAnalysisJsonScalar;

impl VScalar for ChessAnalysisJsonScalar {
    type State = ();

    unsafe fn invoke(
        _state: &Self::State,
        input: &mut DataChunkHandle,
        output: &mut dyn WritableVector,
    ) -> Result<(), Box<dyn Error>> {
        invoke_unary_varchar_to_varchar(input, output, |json| {
            Ok(VarcharOutput::Value(match normalize_analysis_response(json) {
                Ok(lines) => Value::Array(lines.iter().map(analysis_json).collect()).to_string(),
                Err(e) => {
                    log::error(format!("Error normalizing analysis: {e}"));
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
