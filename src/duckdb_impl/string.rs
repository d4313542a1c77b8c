use libduckdb_sys::duckdb_string_t;

/// Longest payload DuckDB stores inline in a `duckdb_string_t`.
const INLINE_CAPACITY: u32 = 12;

/// Copy a DuckDB `VARCHAR` cell into an owned `String`, replacing invalid
/// UTF-8 sequences.
///
/// # Safety
///
/// `s` must be a non-NULL row of a `VARCHAR` vector that DuckDB handed to the
/// running scalar invocation; pointer-backed values must stay alive for the
/// duration of the call.
pub unsafe fn decode_varchar(s: &duckdb_string_t) -> String {
    // SAFETY: both union variants start with the length field.
    let len = unsafe { s.value.inlined.length };
    if len == 0 {
        return String::new();
    }

    let bytes: &[u8] = if len <= INLINE_CAPACITY {
        // SAFETY: short strings live in the inline buffer, `len` bytes initialized.
        let inlined = unsafe { &s.value.inlined.inlined };
        unsafe { std::slice::from_raw_parts(inlined.as_ptr() as *const u8, len as usize) }
    } else {
        // SAFETY: long strings carry a pointer to `len` bytes owned by DuckDB.
        let ptr = unsafe { s.value.pointer.ptr };
        unsafe { std::slice::from_raw_parts(ptr as *const u8, len as usize) }
    };

    String::from_utf8_lossy(bytes).into_owned()
}
