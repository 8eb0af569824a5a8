use pgn_reader::{BufferedReader, RawHeader, SanPlus, Skip, Visitor};
use std::io::Cursor;

/// One parsed game: its mainline move list plus tag metadata.
///
/// Tags are opaque passthrough; the engine never interprets them.
#[derive(Debug, Clone, Default)]
pub struct ExtractedGame {
    pub tags: Vec<(String, String)>,
    /// Mainline moves in SAN, in played order. Variations are dropped at the
    /// parser, so this is always a single path.
    pub moves: Vec<String>,
}

/// PGN visitor that keeps the mainline and tag pairs of each game
pub struct MainlineVisitor {
    current: ExtractedGame,
}

impl MainlineVisitor {
    pub fn new() -> Self {
        Self {
            current: ExtractedGame::default(),
        }
    }
}

impl Default for MainlineVisitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Visitor for MainlineVisitor {
    type Result = ExtractedGame;

    fn begin_game(&mut self) {
        self.current = ExtractedGame::default();
    }

    fn header(&mut self, key: &[u8], value: RawHeader<'_>) {
        self.current.tags.push((
            String::from_utf8_lossy(key).into_owned(),
            value.decode_utf8_lossy().into_owned(),
        ));
    }

    fn san(&mut self, san_plus: SanPlus) {
        self.current.moves.push(san_plus.san.to_string());
    }

    fn begin_variation(&mut self) -> Skip {
        // Only the first continuation at each ply is aggregated
        Skip(true)
    }

    fn end_game(&mut self) -> Self::Result {
        std::mem::take(&mut self.current)
    }
}

/// Parse a block of PGN text into zero or more games.
///
/// This is the per-item absorption boundary: any game text the parser cannot
/// handle yields nothing rather than an error, so one bad game never aborts
/// the rest of a file.
pub fn extract_games(game_text: &str) -> Vec<ExtractedGame> {
    let mut reader = BufferedReader::new(Cursor::new(game_text));
    let mut visitor = MainlineVisitor::new();
    let mut games = Vec::new();

    loop {
        match reader.read_game(&mut visitor) {
            Ok(Some(game)) => games.push(game),
            Ok(None) => break,
            Err(_) => break,
        }
    }

    games
}
