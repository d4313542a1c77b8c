use shakmaty::{Role, Square, uci::UciMove};
use std::fmt;
use std::str::FromStr;

/// A move written as origin square, destination square and an optional
/// promotion letter, e.g. `e2e4` or `e7e8q`. Castling is written as the king
/// move (`e1g1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinateMove {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Role>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed coordinate move '{text}': {reason}")]
pub struct ParseCoordinateError {
    pub text: String,
    pub reason: &'static str,
}

fn parse_square(file: u8, rank: u8) -> Option<Square> {
    if !(b'a'..=b'h').contains(&file) || !(b'1'..=b'8').contains(&rank) {
        return None;
    }
    Square::from_ascii(&[file, rank]).ok()
}

fn promotion_role(letter: u8) -> Option<Role> {
    match letter {
        b'q' => Some(Role::Queen),
        b'r' => Some(Role::Rook),
        b'b' => Some(Role::Bishop),
        b'n' => Some(Role::Knight),
        _ => None,
    }
}

fn promotion_letter(role: Role) -> char {
    match role {
        Role::Queen => 'q',
        Role::Rook => 'r',
        Role::Bishop => 'b',
        Role::Knight => 'n',
        Role::King => 'k',
        Role::Pawn => 'p',
    }
}

impl FromStr for CoordinateMove {
    type Err = ParseCoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| ParseCoordinateError {
            text: s.to_string(),
            reason,
        };

        let bytes = s.as_bytes();
        if bytes.len() != 4 && bytes.len() != 5 {
            return Err(err("expected 4 or 5 characters"));
        }

        let from = parse_square(bytes[0], bytes[1]).ok_or_else(|| err("bad origin square"))?;
        let to = parse_square(bytes[2], bytes[3]).ok_or_else(|| err("bad destination square"))?;
        let promotion = match bytes.get(4) {
            Some(&letter) => {
                Some(promotion_role(letter).ok_or_else(|| err("bad promotion piece"))?)
            }
            None => None,
        };

        Ok(Self {
            from,
            to,
            promotion,
        })
    }
}

impl fmt::Display for CoordinateMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(role) = self.promotion {
            write!(f, "{}", promotion_letter(role))?;
        }
        Ok(())
    }
}

impl CoordinateMove {
    pub fn to_uci(self) -> UciMove {
        UciMove::Normal {
            from: self.from,
            to: self.to,
            promotion: self.promotion,
        }
    }

    /// Drop-in and null moves have no coordinate form.
    pub fn from_uci(uci: &UciMove) -> Option<Self> {
        match *uci {
            UciMove::Normal {
                from,
                to,
                promotion,
            } => Some(Self {
                from,
                to,
                promotion,
            }),
            _ => None,
        }
    }

    pub fn promoting_to(self, role: Role) -> Self {
        Self {
            promotion: Some(role),
            ..self
        }
    }
}

/// Splits a SQL-friendly move list (`"e2e4 e7e5"`, `"e2e4,e7e5"`) into tokens.
pub fn split_move_list(text: &str) -> Vec<&str> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .collect()
}
