//! The chess rules capability the reconciliation code is written against,
//! and its `shakmaty` + `pgn-reader` implementation.

mod strict;
mod visitor;

use crate::coord::CoordinateMove;
use crate::types::{TagMap, Turn};
use pgn_reader::Reader;
use shakmaty::{
    CastlingMode, Chess, Color, EnPassantMode, Move, Position, fen::Fen, san::SanPlus,
};
use smallvec::SmallVec;
use std::fmt::Write;
use std::io;

/// How forgiving record loading is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Every token must be movetext and every move legal.
    Strict,
    /// Unknown tokens are skipped, capture markers and coordinate notation
    /// are accepted in place of SAN. Illegal moves still fail.
    Tolerant,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RulesError {
    #[error("invalid FEN '{fen}': {reason}")]
    InvalidFen { fen: String, reason: String },
    #[error("no game found in record")]
    EmptyRecord,
    #[error("unexpected token '{token}' in movetext")]
    UnexpectedToken { token: String },
    #[error("illegal move '{san}' at ply {ply}")]
    IllegalSan { san: String, ply: usize },
    #[error("illegal move '{uci}' in position '{fen}'")]
    IllegalMove { uci: String, fen: String },
    #[error("unreadable record: {0}")]
    Unreadable(String),
}

/// One played ply with enough detail to replay it elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveDetail {
    pub ply: usize,
    pub san: String,
    pub coord: CoordinateMove,
    /// Position after the move.
    pub fen: String,
}

pub type History = SmallVec<[MoveDetail; 64]>;

/// The minimal set of operations reconciliation needs from a rules library.
pub trait RulesEngine: Sized {
    /// A game at the standard starting position.
    fn new() -> Self;

    /// A game set up from `fen`; exports carry the `SetUp`/`FEN` block.
    fn from_fen(fen: &str) -> Result<Self, RulesError>;

    /// Replays the first record of `text`.
    fn load_pgn(text: &str, mode: ParseMode) -> Result<Self, RulesError>;

    fn fen(&self) -> String;

    fn turn(&self) -> Turn;

    fn history(&self) -> &[MoveDetail];

    fn apply_move(&mut self, mv: &CoordinateMove) -> Result<(), RulesError>;

    fn headers(&self) -> &TagMap;

    fn set_header(&mut self, key: &str, value: &str);

    /// `1-0`, `0-1` or `1/2-1/2` when the current position ends the game.
    fn outcome(&self) -> Option<&'static str>;

    fn export_pgn(&self) -> String;
}

/// The custom starting position a record declares, if any. A `FEN` tag counts
/// unless the record explicitly says `SetUp "0"`.
pub fn setup_fen(headers: &TagMap) -> Option<&str> {
    let fen = headers.get("FEN")?;
    match headers.get("SetUp") {
        Some(flag) if flag.trim() == "0" => None,
        _ => Some(fen),
    }
}

fn fen_of(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

#[derive(Debug, Clone)]
pub struct ChessGame {
    pos: Chess,
    setup: Option<String>,
    start_turn: Turn,
    start_fullmove: u32,
    history: History,
    headers: TagMap,
}

impl ChessGame {
    fn at(pos: Chess, setup: Option<String>) -> Self {
        Self {
            start_turn: pos.turn().into(),
            start_fullmove: pos.fullmoves().get(),
            pos,
            setup,
            history: History::new(),
            headers: TagMap::new(),
        }
    }

    pub(crate) fn position(&self) -> &Chess {
        &self.pos
    }

    pub(crate) fn set_headers(&mut self, headers: TagMap) {
        self.headers = headers;
    }

    /// Plays an already legal move and records it.
    pub(crate) fn play(&mut self, m: Move) {
        let coord = CoordinateMove::from_uci(&m.to_uci(CastlingMode::Standard));
        let san = SanPlus::from_move_and_play_unchecked(&mut self.pos, m);
        if let Some(coord) = coord {
            self.history.push(MoveDetail {
                ply: self.history.len() + 1,
                san: san.to_string(),
                coord,
                fen: fen_of(&self.pos),
            });
        }
    }

    fn write_movetext(&self, out: &mut String) {
        let mut move_no = self.start_fullmove;
        let mut turn = self.start_turn;

        for (i, detail) in self.history.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            match turn {
                Turn::White => {
                    let _ = write!(out, "{}. ", move_no);
                }
                Turn::Black if i == 0 => {
                    let _ = write!(out, "{}... ", move_no);
                }
                Turn::Black => {}
            }
            out.push_str(&detail.san);

            if turn == Turn::Black {
                move_no += 1;
            }
            turn = match turn {
                Turn::White => Turn::Black,
                Turn::Black => Turn::White,
            };
        }

        if let Some(result) = self.headers.get("Result") {
            if !self.history.is_empty() {
                out.push(' ');
            }
            out.push_str(result);
        }
    }
}

fn write_tag(out: &mut String, key: &str, value: &str) {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    let _ = writeln!(out, "[{} \"{}\"]", key, escaped);
}

impl RulesEngine for ChessGame {
    fn new() -> Self {
        Self::at(Chess::default(), None)
    }

    fn from_fen(fen: &str) -> Result<Self, RulesError> {
        let invalid = |reason: String| RulesError::InvalidFen {
            fen: fen.to_string(),
            reason,
        };
        let parsed: Fen = fen.trim().parse().map_err(|e| invalid(format!("{e}")))?;
        let pos: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| invalid(format!("{e}")))?;
        Ok(Self::at(pos, Some(fen.trim().to_string())))
    }

    fn load_pgn(text: &str, mode: ParseMode) -> Result<Self, RulesError> {
        if mode == ParseMode::Strict {
            strict::check_movetext_tokens(text)?;
        }

        let mut reader = Reader::new(io::Cursor::new(text.as_bytes()));
        let mut visitor = visitor::ReplayVisitor::new(mode);

        match reader.read_game(&mut visitor) {
            Ok(Some(result)) => result,
            Ok(None) => Err(RulesError::EmptyRecord),
            Err(e) => Err(RulesError::Unreadable(e.to_string())),
        }
    }

    fn fen(&self) -> String {
        fen_of(&self.pos)
    }

    fn turn(&self) -> Turn {
        self.pos.turn().into()
    }

    fn history(&self) -> &[MoveDetail] {
        &self.history
    }

    fn apply_move(&mut self, mv: &CoordinateMove) -> Result<(), RulesError> {
        let m = mv
            .to_uci()
            .to_move(&self.pos)
            .map_err(|_| RulesError::IllegalMove {
                uci: mv.to_string(),
                fen: self.fen(),
            })?;
        self.play(m);
        Ok(())
    }

    fn headers(&self) -> &TagMap {
        &self.headers
    }

    fn set_header(&mut self, key: &str, value: &str) {
        self.headers.set(key, value);
    }

    fn outcome(&self) -> Option<&'static str> {
        if self.pos.is_checkmate() {
            Some(match self.pos.turn() {
                Color::White => "0-1",
                Color::Black => "1-0",
            })
        } else if self.pos.is_stalemate() || self.pos.is_insufficient_material() {
            Some("1/2-1/2")
        } else {
            None
        }
    }

    fn export_pgn(&self) -> String {
        let mut out = String::new();

        for (key, value) in self.headers.iter() {
            if key.eq_ignore_ascii_case("SetUp") || key.eq_ignore_ascii_case("FEN") {
                continue;
            }
            write_tag(&mut out, key, value);
        }
        if let Some(fen) = &self.setup {
            write_tag(&mut out, "SetUp", "1");
            write_tag(&mut out, "FEN", fen);
        }
        if !out.is_empty() {
            out.push('\n');
        }

        self.write_movetext(&mut out);
        out
    }
}
