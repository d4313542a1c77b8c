use super::{ChessGame, ParseMode, RulesEngine, RulesError, setup_fen};
use crate::types::TagMap;
use pgn_reader::{Nag, Outcome, RawComment, RawTag, SanPlus, Skip, Visitor};
use shakmaty::{Chess, Move, Square, san::San, uci::UciMove};
use std::ops::ControlFlow;

macro_rules! pgn_visitor_skip_variations {
    () => {
        fn nag(&mut self, _: &mut Self::Movetext, _: Nag) -> ControlFlow<Self::Output> {
            ControlFlow::Continue(())
        }

        fn comment(
            &mut self,
            _: &mut Self::Movetext,
            _: RawComment<'_>,
        ) -> ControlFlow<Self::Output> {
            ControlFlow::Continue(())
        }

        fn partial_comment(
            &mut self,
            _: &mut Self::Movetext,
            _: RawComment<'_>,
        ) -> ControlFlow<Self::Output> {
            ControlFlow::Continue(())
        }

        fn begin_variation(&mut self, _: &mut Self::Movetext) -> ControlFlow<Self::Output, Skip> {
            ControlFlow::Continue(Skip(true))
        }
    };
}

/// Replays the mainline of a single record into a [`ChessGame`].
pub(super) struct ReplayVisitor {
    mode: ParseMode,
}

impl ReplayVisitor {
    pub(super) fn new(mode: ParseMode) -> Self {
        Self { mode }
    }

    fn resolve(&self, pos: &Chess, san: &San) -> Option<Move> {
        if let Ok(m) = san.to_move(pos) {
            return Some(m);
        }
        if self.mode == ParseMode::Strict {
            return None;
        }

        if let Some(toggled) = toggle_capture(san)
            && let Ok(m) = toggled.to_move(pos)
        {
            return Some(m);
        }
        coordinate_form(san).and_then(|uci| uci.to_move(pos).ok())
    }
}

/// The same move with the capture marker flipped, for sources that write
/// `ed5` or `Nxf3` inconsistently.
fn toggle_capture(san: &San) -> Option<San> {
    match *san {
        San::Normal {
            role,
            file,
            rank,
            capture,
            to,
            promotion,
        } => Some(San::Normal {
            role,
            file,
            rank,
            capture: !capture,
            to,
            promotion,
        }),
        _ => None,
    }
}

/// `g1f3` reads as a fully disambiguated pawn move. Reinterpret it as the
/// coordinate move it really is.
fn coordinate_form(san: &San) -> Option<UciMove> {
    match *san {
        San::Normal {
            file: Some(file),
            rank: Some(rank),
            to,
            promotion,
            ..
        } => Some(UciMove::Normal {
            from: Square::from_coords(file, rank),
            to,
            promotion,
        }),
        _ => None,
    }
}

impl Visitor for ReplayVisitor {
    type Tags = TagMap;
    type Movetext = ChessGame;
    type Output = Result<ChessGame, RulesError>;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        ControlFlow::Continue(TagMap::new())
    }

    fn tag(
        &mut self,
        tags: &mut Self::Tags,
        key: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        let key = String::from_utf8_lossy(key).into_owned();
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        tags.push(key, value);
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        let game = match setup_fen(&tags) {
            Some(fen) => ChessGame::from_fen(fen),
            None => Ok(ChessGame::new()),
        };

        match game {
            Ok(mut game) => {
                game.set_headers(tags);
                ControlFlow::Continue(game)
            }
            Err(e) => ControlFlow::Break(Err(e)),
        }
    }

    fn san(&mut self, game: &mut Self::Movetext, san_plus: SanPlus) -> ControlFlow<Self::Output> {
        match self.resolve(game.position(), &san_plus.san) {
            Some(m) => {
                game.play(m);
                ControlFlow::Continue(())
            }
            None => ControlFlow::Break(Err(RulesError::IllegalSan {
                san: san_plus.to_string(),
                ply: game.history().len() + 1,
            })),
        }
    }

    pgn_visitor_skip_variations!();

    fn outcome(&mut self, game: &mut Self::Movetext, outcome: Outcome) -> ControlFlow<Self::Output> {
        if game.headers().get("Result").is_none() {
            game.set_header("Result", &outcome.to_string());
        }
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, game: Self::Movetext) -> Self::Output {
        Ok(game)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shakmaty::{File, Rank, Role};

    fn san(text: &str) -> San {
        text.parse().unwrap()
    }

    #[test]
    fn test_toggle_capture_flips_marker_only() {
        assert_eq!(toggle_capture(&san("ed5")), Some(san("exd5")));
        assert_eq!(toggle_capture(&san("Nxf3")), Some(san("Nf3")));
        assert_eq!(toggle_capture(&san("O-O")), None);
    }

    #[test]
    fn test_coordinate_form_needs_full_origin() {
        assert_eq!(
            coordinate_form(&san("g1f3")),
            Some(UciMove::Normal {
                from: Square::from_coords(File::G, Rank::First),
                to: Square::F3,
                promotion: None,
            })
        );
        assert_eq!(coordinate_form(&san("Nf3")), None);
        assert_eq!(coordinate_form(&san("exd5")), None);
    }

    #[test]
    fn test_strict_resolution_does_not_retry() {
        let pos = Chess::default();
        assert!(ReplayVisitor::new(ParseMode::Strict).resolve(&pos, &san("g1f3")).is_none());

        let m = ReplayVisitor::new(ParseMode::Tolerant)
            .resolve(&pos, &san("g1f3"))
            .unwrap();
        assert_eq!(m.role(), Role::Knight);
        assert_eq!(m.to(), Square::F3);
    }
}
