pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Side to move, rendered as the FEN `w`/`b` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    White,
    Black,
}

impl Turn {
    pub fn from_fen_field(field: &str) -> Option<Self> {
        match field {
            "w" => Some(Self::White),
            "b" => Some(Self::Black),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::White => "w",
            Self::Black => "b",
        }
    }
}

impl From<shakmaty::Color> for Turn {
    fn from(color: shakmaty::Color) -> Self {
        match color {
            shakmaty::Color::White => Self::White,
            shakmaty::Color::Black => Self::Black,
        }
    }
}

/// Header tags in record order. Lookups are case-insensitive and the first
/// occurrence of a key wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMap(Vec<(String, String)>);

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Appends a tag unless the key is already present.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if self.get(&key).is_none() {
            self.0.push((key, value.into()));
        }
    }

    /// Replaces the value of an existing tag in place, or appends it.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some((_, v)) => *v = value,
            None => self.0.push((key.to_string(), value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The display headers the viewer cares about. Absent tags stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PgnMeta {
    pub white: Option<String>,
    pub black: Option<String>,
    pub result: Option<String>,
    pub eco: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub username: String,
    pub rating: Option<u32>,
    pub result: &'static str,
}

/// One record of a converted batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Game {
    pub uuid: String,
    pub pgn: String,
    pub fen: String,
    pub initial_setup: String,
    pub time_control: Option<String>,
    pub end_time: Option<i64>,
    pub rules: &'static str,
    pub eco: Option<String>,
    pub white: Player,
    pub black: Player,

    /// NULL-equivalent for clean records, otherwise every conversion problem
    /// found while building the game.
    pub parse_error: Option<String>,
}
