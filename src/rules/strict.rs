use super::RulesError;
use regex::Regex;
use shakmaty::san::SanPlus;
use std::sync::LazyLock;

static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[^}]*\}|;[^\n]*").unwrap());
static MOVE_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+\.*").unwrap());
static NAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\$[0-9]+$").unwrap());
static CASTLE_WITH_ZEROS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0O]-[0O](-[0O])?[+#]?[!?]*$").unwrap());

const RESULTS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];

/// Standalone evaluation and commentary symbols, in ASCII and Unicode forms.
const ANNOTATION_GLYPHS: [&str; 24] = [
    "+-", "-+", "+=", "=+", "+/-", "-/+", "+/=", "=/+", "±", "∓", "⩲", "⩱", "=", "∞", "=/∞",
    "=/~", "~", "N", "TN", "□", "⨀", "Δ", "→", "↑",
];

/// Suffix some sources write after an en-passant capture.
const EN_PASSANT_MARKERS: [&str; 2] = ["e.p.", "ep"];

/// Rejects movetext containing tokens the reader would otherwise skip
/// silently. Tag lines, `%` escape lines, comments and variation brackets are
/// ignored; everything else must be a move number, a result, an annotation or
/// syntactically valid SAN.
pub(super) fn check_movetext_tokens(text: &str) -> Result<(), RulesError> {
    let movetext: String = text
        .lines()
        .filter(|line| {
            let line = line.trim_start();
            !line.starts_with('[') && !line.starts_with('%')
        })
        .collect::<Vec<_>>()
        .join("\n");
    let movetext = COMMENT.replace_all(&movetext, " ");

    movetext
        .split(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .filter(|token| !token.is_empty())
        .try_for_each(|token| {
            if is_movetext_token(token) {
                Ok(())
            } else {
                Err(RulesError::UnexpectedToken {
                    token: token.to_string(),
                })
            }
        })
}

fn is_movetext_token(token: &str) -> bool {
    if RESULTS.contains(&token)
        || ANNOTATION_GLYPHS.contains(&token)
        || EN_PASSANT_MARKERS.contains(&token)
        || NAG.is_match(token)
        || CASTLE_WITH_ZEROS.is_match(token)
    {
        return true;
    }

    let san = MOVE_NUMBER.replace(token, "");
    let san = san.trim_end_matches(['!', '?']);
    san.is_empty() || SanPlus::from_ascii(san.as_bytes()).is_ok()
}
