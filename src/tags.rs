use crate::duckdb_impl::scalar::{VarcharOutput, invoke_binary_varchar_to_varchar};
use crate::types::{PgnMeta, TagMap};
use duckdb::{
    core::{DataChunkHandle, LogicalTypeHandle, LogicalTypeId},
    vscalar::{ScalarFunctionSignature, VScalar},
    vtab::arrow::WritableVector,
};
use regex::Regex;
use std::error::Error;
use std::sync::LazyLock;

static TAG_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[(\w+)\s+"([^"]*)"\]"#).unwrap());

/// Returns the quoted value of the first `[Name "Value"]` tag whose name
/// matches `tag_name` case-insensitively. Empty values do not match.
pub fn extract_tag(tag_name: &str, pgn: &str) -> Option<String> {
    let pattern = format!(r#"(?i)\[{}\s+"([^"]+)"\]"#, regex::escape(tag_name));
    let re = Regex::new(&pattern).ok()?;
    re.captures(pgn)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Scans every tag line of the text, keeping the first value per key.
pub fn parse_headers(pgn: &str) -> TagMap {
    let mut tags = TagMap::new();
    for caps in TAG_LINE.captures_iter(pgn) {
        tags.push(&caps[1], &caps[2]);
    }
    tags
}

pub fn extract_meta(pgn: &str) -> PgnMeta {
    PgnMeta {
        white: extract_tag("White", pgn),
        black: extract_tag("Black", pgn),
        result: extract_tag("Result", pgn),
        eco: extract_tag("ECO", pgn),
        date: extract_tag("Date", pgn),
    }
}

/// `chess_pgn_tag(pgn, tag)`
pub struct ChessPgnTagScalar;

impl VScalar for ChessPgnTagScalar {
    type State = ();

    unsafe fn invoke(
        _state: &Self::State,
        input: &mut DataChunkHandle,
        output: &mut dyn WritableVector,
    ) -> Result<(), Box<dyn Error>> {
        invoke_binary_varchar_to_varchar(input, output, |pgn, tag| {
            Ok(match extract_tag(tag, pgn) {
                Some(value) => VarcharOutput::Value(value),
                None => VarcharOutput::Null,
            })
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

    const SAMPLE: &str = "[Event \"Test\"]\n[White \"A\"]\n[Black \"B\"]\n[Result \"1-0\"]\n\n1. e4 e5 2. Nf3 Nc6 1-0";

    #[test]
    fn test_extract_tag_basic() {
        assert_eq!(extract_tag("White", SAMPLE).as_deref(), Some("A"));
        assert_eq!(extract_tag("Black", SAMPLE).as_deref(), Some("B"));
        assert_eq!(extract_tag("Result", SAMPLE).as_deref(), Some("1-0"));
    }

    #[test]
    fn test_extract_tag_case_insensitive_name() {
        assert_eq!(extract_tag("white", SAMPLE).as_deref(), Some("A"));
        assert_eq!(extract_tag("EVENT", SAMPLE).as_deref(), Some("Test"));
    }

    #[test]
    fn test_extract_tag_value_with_spaces_and_punctuation() {
        let pgn = "[White \"Fischer, Robert James (USA) 2785\"]";
        assert_eq!(
            extract_tag("White", pgn).as_deref(),
            Some("Fischer, Robert James (USA) 2785")
        );
    }

    #[test]
    fn test_extract_tag_missing_is_none() {
        assert_eq!(extract_tag("ECO", SAMPLE), None);
        assert_eq!(extract_tag("White", ""), None);
    }

    #[test]
    fn test_extract_tag_does_not_match_longer_names() {
        let pgn = "[WhiteElo \"2500\"]\n[White \"Tal\"]";
        assert_eq!(extract_tag("White", pgn).as_deref(), Some("Tal"));
        assert_eq!(extract_tag("WhiteElo", pgn).as_deref(), Some("2500"));
    }

    #[test]
    fn test_extract_tag_first_occurrence_wins() {
        let pgn = "[Site \"Riga\"]\n[Site \"Moscow\"]";
        assert_eq!(extract_tag("Site", pgn).as_deref(), Some("Riga"));
    }

    #[test]
    fn test_extract_tag_empty_value_does_not_match() {
        assert_eq!(extract_tag("Round", "[Round \"\"]"), None);
    }

    #[test]
    fn test_extract_tag_name_is_not_a_pattern() {
        let pgn = "[White \"A\"]";
        assert_eq!(extract_tag("Whit.", pgn), None);
        assert_eq!(extract_tag(".*", pgn), None);
    }

    #[test]
    fn test_parse_headers_keeps_order_and_unknown_tags() {
        let tags = parse_headers("[Event \"E\"]\n[Annotator \"Me\"]\n[Round \"\"]\n1. e4 *");
        let pairs: Vec<_> = tags.iter().collect();
        assert_eq!(
            pairs,
            vec![("Event", "E"), ("Annotator", "Me"), ("Round", "")]
        );
    }

    #[test]
    fn test_extract_meta() {
        let meta = extract_meta(SAMPLE);
        assert_eq!(meta.white.as_deref(), Some("A"));
        assert_eq!(meta.black.as_deref(), Some("B"));
        assert_eq!(meta.result.as_deref(), Some("1-0"));
        assert_eq!(meta.eco, None);
        assert_eq!(meta.date, None);
    }
}
