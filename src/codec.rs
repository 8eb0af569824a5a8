use crate::errors::{HeatmapError, Result};
use crate::frequency_tree::{FrequencyNode, FrequencyTree};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Cancellation and progress are checked once per this many nodes, not per
/// node, to bound callback overhead on multi-million-node trees.
const PROGRESS_NODE_STRIDE: u64 = 10_000;

/// Longest accepted move text in a cache file; anything larger marks a
/// corrupt stream, not a real SAN token.
const MAX_MOVE_TEXT_BYTES: u32 = 4096;

/// Most children a single node may claim before the stream is rejected as
/// corrupt.
const MAX_CHILD_COUNT: i32 = 1 << 24;

/// Result of a cache load: the tree, plus whether the whole stream was
/// consumed or a cancellation left it partial.
#[derive(Debug)]
pub struct LoadOutcome {
    pub tree: FrequencyTree,
    pub complete: bool,
}

/// Serialize a tree to a cache file.
///
/// Little-endian stream, depth-first pre-order: a header (`max_depth: i32`,
/// `total_games: i32`) followed by nodes, each a length-prefixed UTF-8 move
/// text, `move_number: i32`, `is_white_move: u8`, `frequency: i32`,
/// `child_count: i32`, then the children recursively. Child order follows
/// map iteration and is not canonical; nothing relies on it beyond
/// round-trip reconstruction of the same tree shape.
pub fn save_tree<P: AsRef<Path>>(tree: &FrequencyTree, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);

    writer.write_all(&(tree.max_depth_plies() as i32).to_le_bytes())?;
    writer.write_all(&(tree.total_games() as i32).to_le_bytes())?;
    write_node(&mut writer, tree.root())?;

    writer.flush()?;
    Ok(())
}

fn write_node<W: Write>(writer: &mut W, node: &FrequencyNode) -> Result<()> {
    writer.write_all(&(node.move_text.len() as u32).to_le_bytes())?;
    writer.write_all(node.move_text.as_bytes())?;
    writer.write_all(&(node.move_number as i32).to_le_bytes())?;
    writer.write_all(&[node.is_white_move as u8])?;
    writer.write_all(&(node.frequency as i32).to_le_bytes())?;
    writer.write_all(&(node.children.len() as i32).to_le_bytes())?;

    for child in node.children.values() {
        write_node(writer, child)?;
    }
    Ok(())
}

/// Load a complete tree from a cache file
pub fn load_tree<P: AsRef<Path>>(path: P) -> Result<FrequencyTree> {
    let outcome = load_tree_with(path, None, None)?;
    Ok(outcome.tree)
}

/// Load a tree with incremental progress and cooperative cancellation.
///
/// `progress` receives `(bytes_read, total_bytes)`; `cancel` is polled every
/// [`PROGRESS_NODE_STRIDE`] nodes. Once it returns true the reader stops
/// descending and returns everything read so far as a structurally valid
/// partial tree with `complete == false` — a node whose children were only
/// partly read keeps exactly the children that were read. Cancellation is
/// not an error; a corrupt header or a truncated stream is.
pub fn load_tree_with<P: AsRef<Path>>(
    path: P,
    progress: Option<&dyn Fn(u64, u64)>,
    cancel: Option<&dyn Fn() -> bool>,
) -> Result<LoadOutcome> {
    let total_bytes = std::fs::metadata(path.as_ref())?.len();
    let file = File::open(path.as_ref())?;
    let mut state = LoadState {
        reader: CountingReader::new(BufReader::new(file)),
        total_bytes,
        nodes_read: 1,
        cancelled: false,
        progress,
        cancel,
    };

    if let Some(report) = state.progress {
        report(0, total_bytes);
    }

    let max_depth = state.read_i32_field("max_depth")?;
    let total_games = state.read_i32_field("total_games")?;
    let root = read_node(&mut state)?;

    if let Some(report) = state.progress {
        report(state.reader.bytes_read, total_bytes);
    }

    Ok(LoadOutcome {
        tree: FrequencyTree::from_raw(root, max_depth, total_games),
        complete: !state.cancelled,
    })
}

impl FrequencyTree {
    /// Save this tree to a binary cache file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_tree(self, path)
    }

    /// Load a tree from a binary cache file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<FrequencyTree> {
        load_tree(path)
    }
}

struct LoadState<'a> {
    reader: CountingReader<BufReader<File>>,
    total_bytes: u64,
    nodes_read: u64,
    cancelled: bool,
    progress: Option<&'a dyn Fn(u64, u64)>,
    cancel: Option<&'a dyn Fn() -> bool>,
}

impl LoadState<'_> {
    fn corrupt(&self, detail: impl Into<String>) -> HeatmapError {
        HeatmapError::CorruptCache {
            offset: self.reader.bytes_read,
            detail: detail.into(),
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                self.corrupt("unexpected end of file")
            } else {
                HeatmapError::from(e)
            }
        })
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// Read an i32 that must be non-negative
    fn read_i32_field(&mut self, field: &str) -> Result<u32> {
        let value = self.read_i32()?;
        u32::try_from(value).map_err(|_| self.corrupt(format!("negative {}: {}", field, value)))
    }

    fn read_move_text(&mut self) -> Result<String> {
        let len = self.read_u32()?;
        if len > MAX_MOVE_TEXT_BYTES {
            return Err(self.corrupt(format!("move text length {} exceeds limit", len)));
        }
        let mut buf = vec![0u8; len as usize];
        self.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|_| self.corrupt("move text is not valid UTF-8"))
    }

    /// Periodic progress/cancellation checkpoint; returns true once the
    /// caller has requested a stop.
    fn checkpoint(&mut self) -> bool {
        if self.cancelled {
            return true;
        }
        self.nodes_read += 1;
        if self.nodes_read % PROGRESS_NODE_STRIDE == 0 {
            if let Some(report) = self.progress {
                report(self.reader.bytes_read, self.total_bytes);
            }
            if let Some(cancel) = self.cancel {
                if cancel() {
                    self.cancelled = true;
                }
            }
        }
        self.cancelled
    }
}

fn read_node(state: &mut LoadState<'_>) -> Result<FrequencyNode> {
    let move_text = state.read_move_text()?;
    let move_number = state.read_i32_field("move_number")?;
    let is_white_move = match state.read_u8()? {
        0 => false,
        1 => true,
        other => return Err(state.corrupt(format!("invalid is_white_move byte {}", other))),
    };
    let frequency = state.read_i32_field("frequency")?;

    let child_count = state.read_i32()?;
    if !(0..=MAX_CHILD_COUNT).contains(&child_count) {
        return Err(state.corrupt(format!("implausible child count {}", child_count)));
    }

    let mut node = FrequencyNode {
        move_text,
        move_number,
        is_white_move,
        frequency,
        children: HashMap::with_capacity(child_count.min(64) as usize),
    };

    for _ in 0..child_count {
        // Cancellation omits this child and every unread sibling; ancestors
        // see the flag and stop as well, so the partial tree never indexes a
        // child that was not read.
        if state.checkpoint() {
            break;
        }
        let child = read_node(state)?;
        node.children.insert(child.move_text.clone(), child);
        if state.cancelled {
            break;
        }
    }

    Ok(node)
}

struct CountingReader<R> {
    inner: R,
    bytes_read: u64,
}

impl<R: Read> CountingReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            bytes_read: 0,
        }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes_read += n as u64;
        Ok(n)
    }
}
