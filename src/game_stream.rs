use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

const STREAM_BUF_BYTES: usize = 64 * 1024;

/// Streaming extractor that turns a byte range of a PGN file into individual
/// raw game texts without loading the whole file.
///
/// Lines starting with `[` are buffered as tags; other non-blank lines are
/// movetext, joined with single spaces across wrapped lines. A blank line
/// after a game's movetext emits the game (tags, one blank line, movetext —
/// normalized regardless of the input's spacing). A game still buffered at
/// the end of the range is emitted without requiring a trailing blank line.
///
/// The stream is restartable from any range produced by
/// [`find_chunk_boundaries`]: ranges start exactly on a game boundary, and
/// any movetext seen before the first tag line is dropped as a partial game.
pub struct GameStream {
    reader: BufReader<File>,
    /// Byte offset of the next unread line
    pos: u64,
    end: u64,
    tags: String,
    movetext: String,
    line: String,
    finished: bool,
}

impl GameStream {
    /// Stream every game in the file
    pub fn from_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let end = std::fs::metadata(path.as_ref())?.len();
        Self::over_range(path, 0, end)
    }

    /// Stream the games whose first line starts inside `[start, end)`
    pub fn over_range<P: AsRef<Path>>(path: P, start: u64, end: u64) -> io::Result<Self> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(start))?;
        Ok(Self {
            reader: BufReader::with_capacity(STREAM_BUF_BYTES, file),
            pos: start,
            end,
            tags: String::new(),
            movetext: String::new(),
            line: String::new(),
            finished: false,
        })
    }

    fn take_game(&mut self) -> String {
        let movetext = self.movetext.trim();
        let mut text = String::with_capacity(self.tags.len() + movetext.len() + 2);
        text.push_str(&self.tags);
        text.push('\n');
        text.push_str(movetext);
        text.push('\n');
        self.tags.clear();
        self.movetext.clear();
        text
    }
}

impl Iterator for GameStream {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        while self.pos < self.end {
            self.line.clear();
            let consumed = match self.reader.read_line(&mut self.line) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };
            self.pos += consumed as u64;
            let line = self.line.trim_end_matches(['\r', '\n']);

            if line.starts_with('[') {
                // A tag line while movetext is pending means the separating
                // blank line was missing; close the previous game first.
                if !self.tags.is_empty() && !self.movetext.trim().is_empty() {
                    let line = line.to_string();
                    let game = self.take_game();
                    self.tags.push_str(&line);
                    self.tags.push('\n');
                    return Some(Ok(game));
                }
                self.tags.push_str(line);
                self.tags.push('\n');
            } else if !line.trim().is_empty() {
                // Movetext before any tag line is a partial game at a range
                // start; drop it.
                if !self.tags.is_empty() {
                    self.movetext.push_str(line.trim());
                    self.movetext.push(' ');
                }
            } else if !self.tags.is_empty() && !self.movetext.trim().is_empty() {
                return Some(Ok(self.take_game()));
            }
            // A blank line between tags and movetext is the PGN separator,
            // not a game boundary; keep buffering.
        }

        self.finished = true;
        if !self.tags.is_empty() {
            // Final game without a trailing blank line
            return Some(Ok(self.take_game()));
        }
        None
    }
}

/// Split a file into `num_chunks` byte ranges that each start exactly on a
/// game boundary.
///
/// Interior split points at `file_size * i / num_chunks` are rounded forward
/// to the offset of the next line starting with `[Event `. The returned
/// boundaries are strictly increasing, beginning at 0 and ending at the file
/// size, so consecutive pairs tile the file: no game is split across two
/// ranges and none is double-counted. Fewer than `num_chunks` ranges come
/// back when games are too few to separate the split points.
pub fn find_chunk_boundaries<P: AsRef<Path>>(path: P, num_chunks: usize) -> io::Result<Vec<u64>> {
    let path = path.as_ref();
    let file_size = std::fs::metadata(path)?.len();

    let mut boundaries = vec![0u64];
    if num_chunks > 1 && file_size > 0 {
        let mut file = File::open(path)?;
        for i in 1..num_chunks {
            let target = file_size * i as u64 / num_chunks as u64;
            if let Some(offset) = next_game_start(&mut file, target)? {
                if offset > *boundaries.last().unwrap() && offset < file_size {
                    boundaries.push(offset);
                }
            }
        }
    }
    boundaries.push(file_size);
    Ok(boundaries)
}

/// Byte offset of the first `[Event ` line that starts strictly after the
/// line containing `from`
fn next_game_start(file: &mut File, from: u64) -> io::Result<Option<u64>> {
    file.seek(SeekFrom::Start(from))?;
    let mut reader = BufReader::with_capacity(STREAM_BUF_BYTES, file);
    let mut pos = from;
    let mut buf = Vec::new();

    // The seek may have landed mid-line; discard up to the next newline.
    let consumed = reader.read_until(b'\n', &mut buf)?;
    pos += consumed as u64;

    loop {
        buf.clear();
        let line_start = pos;
        let consumed = reader.read_until(b'\n', &mut buf)?;
        if consumed == 0 {
            return Ok(None);
        }
        pos += consumed as u64;
        if buf.starts_with(b"[Event ") {
            return Ok(Some(line_start));
        }
    }
}
