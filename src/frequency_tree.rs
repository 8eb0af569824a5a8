use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Lightweight trie node that only tracks move frequencies, not game data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyNode {
    /// SAN text of the move; empty only for the synthetic root
    pub move_text: String,
    /// 1-based full-move number
    pub move_number: u32,
    pub is_white_move: bool,
    /// Count of games whose mainline passed through this node
    pub frequency: u32,
    /// Continuations keyed by move text; keys unique, iteration order irrelevant
    pub children: HashMap<String, FrequencyNode>,
}

impl FrequencyNode {
    pub fn new(move_text: impl Into<String>, move_number: u32, is_white_move: bool) -> Self {
        Self {
            move_text: move_text.into(),
            move_number,
            is_white_move,
            frequency: 0,
            children: HashMap::new(),
        }
    }

    /// Look up a child by move text, inserting a zero-frequency node if absent.
    ///
    /// Metadata on an existing child is never overwritten: whichever game
    /// reaches a node first fixes its `move_number`/`is_white_move`.
    pub fn find_or_create_child(
        &mut self,
        move_text: &str,
        move_number: u32,
        is_white_move: bool,
    ) -> &mut FrequencyNode {
        self.children
            .entry(move_text.to_string())
            .or_insert_with(|| FrequencyNode::new(move_text, move_number, is_white_move))
    }

    fn max_frequency(&self) -> u32 {
        let mut max = self.frequency;
        for child in self.children.values() {
            max = max.max(child.max_frequency());
        }
        max
    }

    fn count_nodes(&self) -> usize {
        1 + self.children.values().map(|c| c.count_nodes()).sum::<usize>()
    }

    fn depth(&self) -> usize {
        self.children
            .values()
            .map(|c| 1 + c.depth())
            .max()
            .unwrap_or(0)
    }

    fn merge_from(&mut self, source: FrequencyNode) {
        self.frequency += source.frequency;

        for (move_text, source_child) in source.children {
            match self.children.entry(move_text) {
                // Absent in target: attach the whole source subtree, no copy
                Entry::Vacant(slot) => {
                    slot.insert(source_child);
                }
                Entry::Occupied(mut existing) => existing.get_mut().merge_from(source_child),
            }
        }
    }

    fn collect_at_depth<'a>(&'a self, remaining: usize, out: &mut Vec<&'a FrequencyNode>) {
        if remaining == 0 {
            out.push(self);
            return;
        }
        for child in self.children.values() {
            child.collect_at_depth(remaining - 1, out);
        }
    }
}

/// Aggregate statistics about a tree, for display layers and the query CLI
#[derive(Debug, Clone, Serialize)]
pub struct TreeSummary {
    pub total_games: u32,
    pub node_count: usize,
    pub max_frequency: u32,
    pub max_depth_plies: u32,
    pub deepest_ply: usize,
}

/// Move-frequency trie built from the mainlines of a PGN game collection.
///
/// The tree exclusively owns its node graph. It is mutated only through
/// [`insert_game`](FrequencyTree::insert_game) and
/// [`merge`](FrequencyTree::merge); both keep the aggregate independent of
/// insertion order and partitioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyTree {
    root: FrequencyNode,
    /// Maximum accepted depth in plies (half-moves)
    max_depth: u32,
    total_games_processed: u32,
}

/// Default depth in full moves; stored internally as plies
pub const DEFAULT_MAX_FULL_MOVES: u32 = 50;

impl Default for FrequencyTree {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FULL_MOVES)
    }
}

impl FrequencyTree {
    /// Create an empty tree accepting up to `max_full_moves` full moves.
    ///
    /// Users think in full moves; the tree counts plies, so the bound is
    /// doubled internally.
    pub fn new(max_full_moves: u32) -> Self {
        Self {
            root: FrequencyNode::new("", 0, true),
            max_depth: max_full_moves * 2,
            total_games_processed: 0,
        }
    }

    pub(crate) fn from_raw(root: FrequencyNode, max_depth: u32, total_games_processed: u32) -> Self {
        Self {
            root,
            max_depth,
            total_games_processed,
        }
    }

    pub fn root(&self) -> &FrequencyNode {
        &self.root
    }

    /// Maximum accepted depth, in plies
    pub fn max_depth_plies(&self) -> u32 {
        self.max_depth
    }

    /// Games inserted into (or merged into) this tree instance
    pub fn total_games(&self) -> u32 {
        self.total_games_processed
    }

    /// Record one game's mainline.
    ///
    /// Walks from the root along `moves`, incrementing the frequency of every
    /// node visited (the root included) and descending one edge per move, up
    /// to the ply bound. A single game contributes at most `max_depth`
    /// increments; the game counter advances exactly once regardless of
    /// truncation.
    pub fn insert_game<S: AsRef<str>>(&mut self, moves: &[S]) {
        let mut node = &mut self.root;
        let mut depth = 0usize;

        while depth < self.max_depth as usize {
            node.frequency += 1;

            let Some(next) = moves.get(depth) else { break };
            let move_text = next.as_ref();
            if move_text.is_empty() {
                break;
            }

            // ply 0 is White's first move
            let is_white_move = depth % 2 == 0;
            let move_number = (depth / 2 + 1) as u32;

            node = node.find_or_create_child(move_text, move_number, is_white_move);
            depth += 1;
        }

        self.total_games_processed += 1;
    }

    /// Fold another tree into this one.
    ///
    /// Frequencies add; subtrees absent here are attached by move rather than
    /// copied. Merging is associative and commutative with respect to the
    /// resulting frequencies, so batch order never changes the aggregate.
    /// Node metadata stays first-writer-wins.
    pub fn merge(&mut self, source: FrequencyTree) {
        self.root.merge_from(source.root);
        self.total_games_processed += source.total_games_processed;
    }

    /// Highest frequency anywhere in the tree (the root's game count, unless
    /// the tree is empty). Display layers use this for color normalization.
    pub fn max_frequency(&self) -> u32 {
        self.root.max_frequency()
    }

    /// All nodes exactly `depth` edges below the root, excluding the root
    /// itself. `moves_at_depth(1)` lists every recorded first move.
    pub fn moves_at_depth(&self, depth: usize) -> Vec<&FrequencyNode> {
        let mut out = Vec::new();
        if depth > 0 {
            self.root.collect_at_depth(depth, &mut out);
        }
        out
    }

    /// Navigate to the node reached by playing `path` from the start
    /// position. An empty path yields the root.
    pub fn node_at<S: AsRef<str>>(&self, path: &[S]) -> Option<&FrequencyNode> {
        let mut node = &self.root;
        for mv in path {
            node = node.children.get(mv.as_ref())?;
        }
        Some(node)
    }

    /// Continuations after `path`, most frequent first. Ties break on move
    /// text so the listing is deterministic.
    pub fn continuations<S: AsRef<str>>(&self, path: &[S]) -> Vec<&FrequencyNode> {
        let Some(node) = self.node_at(path) else {
            return Vec::new();
        };
        let mut moves: Vec<&FrequencyNode> = node.children.values().collect();
        moves.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then_with(|| a.move_text.cmp(&b.move_text))
        });
        moves
    }

    /// Total resident nodes, the root included
    pub fn node_count(&self) -> usize {
        self.root.count_nodes()
    }

    /// Deepest ply currently present
    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    pub fn summary(&self) -> TreeSummary {
        TreeSummary {
            total_games: self.total_games_processed,
            node_count: self.node_count(),
            max_frequency: self.max_frequency(),
            max_depth_plies: self.max_depth,
            deepest_ply: self.depth(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_game_tree() -> FrequencyTree {
        let mut tree = FrequencyTree::new(5); // 10 plies
        tree.insert_game(&["e4", "e5", "Nf3"]);
        tree.insert_game(&["e4", "e5", "Nc3"]);
        tree.insert_game(&["d4", "d5"]);
        tree
    }

    #[test]
    fn test_three_game_scenario() {
        let tree = three_game_tree();

        assert_eq!(tree.total_games(), 3);
        assert_eq!(tree.root().frequency, 3);
        assert_eq!(tree.node_at(&["e4"]).unwrap().frequency, 2);
        assert_eq!(tree.node_at(&["d4"]).unwrap().frequency, 1);
        assert_eq!(tree.node_at(&["e4", "e5"]).unwrap().frequency, 2);
        assert_eq!(tree.node_at(&["e4", "e5", "Nf3"]).unwrap().frequency, 1);
        assert_eq!(tree.node_at(&["e4", "e5", "Nc3"]).unwrap().frequency, 1);
    }

    #[test]
    fn test_ply_metadata() {
        let tree = three_game_tree();

        let e4 = tree.node_at(&["e4"]).unwrap();
        assert_eq!(e4.move_number, 1);
        assert!(e4.is_white_move);

        let e5 = tree.node_at(&["e4", "e5"]).unwrap();
        assert_eq!(e5.move_number, 1);
        assert!(!e5.is_white_move);

        let nf3 = tree.node_at(&["e4", "e5", "Nf3"]).unwrap();
        assert_eq!(nf3.move_number, 2);
        assert!(nf3.is_white_move);
    }

    #[test]
    fn test_depth_truncation() {
        let mut tree = FrequencyTree::new(1); // 2 plies
        tree.insert_game(&["e4", "e5", "Nf3", "Nc6"]);

        assert_eq!(tree.total_games(), 1);
        assert_eq!(tree.root().frequency, 1);
        assert_eq!(tree.node_at(&["e4"]).unwrap().frequency, 1);
        // The node at the ply bound exists but the walk stopped before
        // crediting it; nothing beyond it may exist at all.
        assert_eq!(tree.node_at(&["e4", "e5"]).unwrap().frequency, 0);
        assert!(tree.node_at(&["e4", "e5", "Nf3"]).is_none());
        assert!(tree.depth() <= 2);
    }

    #[test]
    fn test_first_writer_wins_metadata() {
        let mut tree = FrequencyTree::new(5);
        tree.insert_game(&["e4"]);

        // Reaching the same key again must not touch existing metadata.
        let child = tree.root.find_or_create_child("e4", 99, false);
        assert_eq!(child.move_number, 1);
        assert!(child.is_white_move);
    }

    #[test]
    fn test_merge_into_empty_is_identity() {
        let source = three_game_tree();
        let mut target = FrequencyTree::new(5);
        target.merge(source.clone());

        assert_eq!(target, source);
    }

    #[test]
    fn test_merge_matches_sequential_insertion() {
        let mut a = FrequencyTree::new(5);
        a.insert_game(&["e4", "e5", "Nf3"]);
        a.insert_game(&["d4", "d5"]);
        let mut b = FrequencyTree::new(5);
        b.insert_game(&["e4", "e5", "Nc3"]);

        let mut merged = FrequencyTree::new(5);
        merged.merge(b);
        merged.merge(a);

        assert_eq!(merged, three_game_tree());
    }

    #[test]
    fn test_frequency_dominates_children() {
        fn check(node: &FrequencyNode) {
            for child in node.children.values() {
                assert!(node.frequency >= child.frequency);
                check(child);
            }
        }

        let mut tree = three_game_tree();
        check(tree.root());

        let mut other = FrequencyTree::new(5);
        other.insert_game(&["e4", "c5"]);
        tree.merge(other);
        check(tree.root());
    }

    #[test]
    fn test_moves_at_depth() {
        let tree = three_game_tree();

        assert!(tree.moves_at_depth(0).is_empty());

        let mut first: Vec<&str> = tree
            .moves_at_depth(1)
            .iter()
            .map(|n| n.move_text.as_str())
            .collect();
        first.sort_unstable();
        assert_eq!(first, vec!["d4", "e4"]);

        let mut third: Vec<&str> = tree
            .moves_at_depth(3)
            .iter()
            .map(|n| n.move_text.as_str())
            .collect();
        third.sort_unstable();
        assert_eq!(third, vec!["Nc3", "Nf3"]);
    }

    #[test]
    fn test_continuations_sorted() {
        let tree = three_game_tree();

        let top: Vec<&str> = tree
            .continuations::<&str>(&[])
            .iter()
            .map(|n| n.move_text.as_str())
            .collect();
        assert_eq!(top, vec!["e4", "d4"]);

        let after_e5: Vec<&str> = tree
            .continuations(&["e4", "e5"])
            .iter()
            .map(|n| n.move_text.as_str())
            .collect();
        // Equal frequencies fall back to move-text order
        assert_eq!(after_e5, vec!["Nc3", "Nf3"]);
    }

    #[test]
    fn test_summary() {
        let tree = three_game_tree();
        let summary = tree.summary();

        assert_eq!(summary.total_games, 3);
        assert_eq!(summary.max_frequency, 3);
        assert_eq!(summary.max_depth_plies, 10);
        assert_eq!(summary.deepest_ply, 3);
        // root, e4, e5, Nf3, Nc3, d4, d5
        assert_eq!(summary.node_count, 7);
    }
}
