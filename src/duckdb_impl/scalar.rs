//! Row loops shared by the `VARCHAR` scalars.
//!
//! Every helper checks column types, propagates NULL inputs to NULL outputs
//! and decodes `duckdb_string_t` cells before calling the row closure.
//!
//! # Safety
//! Only call these from inside a DuckDB scalar `invoke()` while the input and
//! output vectors are valid.

use std::error::Error;
use std::ffi::CString;

use duckdb::{
    core::{DataChunkHandle, FlatVector, Inserter, LogicalTypeId},
    vtab::arrow::WritableVector,
};
use libduckdb_sys::duckdb_string_t;

use super::string::decode_varchar;

#[derive(Debug, Clone)]
pub enum VarcharOutput {
    Null,
    Value(String),
}

fn ensure_type(
    vec: &FlatVector,
    expected: LogicalTypeId,
    label: &str,
) -> Result<(), Box<dyn Error>> {
    let actual = vec.logical_type().id();
    if actual != expected {
        return Err(format!(
            "scalar helper type mismatch: {label} expected {expected:?}, got {actual:?}"
        )
        .into());
    }
    Ok(())
}

fn insert_varchar(
    output_vec: &mut FlatVector,
    row: usize,
    value: VarcharOutput,
) -> Result<(), Box<dyn Error>> {
    match value {
        VarcharOutput::Null => output_vec.set_null(row),
        // Interior NULs cannot cross the C boundary.
        VarcharOutput::Value(v) if v.contains('\0') => {
            output_vec.insert(row, CString::new(v.replace('\0', " "))?)
        }
        VarcharOutput::Value(v) => output_vec.insert(row, CString::new(v)?),
    }
    Ok(())
}

/// Drive an `N`-ary `VARCHAR -> VARCHAR` scalar. A NULL in any input column
/// produces a NULL output row without calling `f`.
fn invoke_varchar_columns<const N: usize, F>(
    input: &DataChunkHandle,
    output: &mut dyn WritableVector,
    mut f: F,
) -> Result<(), Box<dyn Error>>
where
    F: FnMut(&[String; N]) -> Result<VarcharOutput, Box<dyn Error>>,
{
    let len = input.len();
    let columns: [FlatVector; N] = std::array::from_fn(|i| input.flat_vector(i));
    for (i, column) in columns.iter().enumerate() {
        ensure_type(column, LogicalTypeId::Varchar, &format!("input[{i}]"))?;
    }
    let slices: [&[duckdb_string_t]; N] =
        std::array::from_fn(|i| columns[i].as_slice::<duckdb_string_t>());

    let mut output_vec = output.flat_vector();
    ensure_type(&output_vec, LogicalTypeId::Varchar, "output")?;

    for row in 0..len {
        if columns
            .iter()
            .any(|column| column.row_is_null(row as u64))
        {
            output_vec.set_null(row);
            continue;
        }

        // SAFETY: every column was checked non-NULL for this row above.
        let values: [String; N] =
            std::array::from_fn(|i| unsafe { decode_varchar(&slices[i][row]) });
        insert_varchar(&mut output_vec, row, f(&values)?)?;
    }

    Ok(())
}

/// Invoke a unary `VARCHAR -> VARCHAR` scalar.
pub fn invoke_unary_varchar_to_varchar<F>(
    input: &DataChunkHandle,
    output: &mut dyn WritableVector,
    mut f: F,
) -> Result<(), Box<dyn Error>>
where
    F: FnMut(&str) -> Result<VarcharOutput, Box<dyn Error>>,
{
    invoke_varchar_columns::<1, _>(input, output, |[a]| f(a.as_str()))
}

/// Invoke a binary `VARCHAR, VARCHAR -> VARCHAR` scalar.
pub fn invoke_binary_varchar_to_varchar<F>(
    input: &DataChunkHandle,
    output: &mut dyn WritableVector,
    mut f: F,
) -> Result<(), Box<dyn Error>>
where
    F: FnMut(&str, &str) -> Result<VarcharOutput, Box<dyn Error>>,
{
    invoke_varchar_columns::<2, _>(input, output, |[a, b]| f(a.as_str(), b.as_str()))
}

/// Invoke a ternary `VARCHAR, VARCHAR, VARCHAR -> VARCHAR` scalar.
pub fn invoke_ternary_varchar_to_varchar<F>(
    input: &DataChunkHandle,
    output: &mut dyn WritableVector,
    mut f: F,
) -> Result<(), Box<dyn Error>>
where
    F: FnMut(&str, &str, &str) -> Result<VarcharOutput, Box<dyn Error>>,
{
    invoke_varchar_columns::<3, _>(input, output, |[a, b, c]| {
        f(a.as_str(), b.as_str(), c.as_str())
    })
}
