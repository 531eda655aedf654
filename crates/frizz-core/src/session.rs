//! Card composition session
//!
//! A [`CompositionSession`] builds a card one block at a time. Containers are
//! opened and closed like a stack: every append goes to the innermost open
//! container, or to the top level when none is open. Every open and append is
//! recorded so it can be undone structurally.
//!
//! Blocks live in an arena keyed by [`NodeId`]; lists hold ids, which gives
//! undo stable identities to remove without holding references into the tree.
//!
//! The [`SessionRegistry`] enforces one active session per operator and guild.

use crate::blocks::{Block, Button};
use crate::error::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Arena identifier of one block in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

/// A list of children: the top level, or the inside of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ListKey {
    Top,
    Container(NodeId),
}

#[derive(Debug)]
enum Node {
    /// Children are stored in `lists` under `ListKey::Container(id)`
    Container { accent_color: Option<u32> },
    Leaf(Block),
}

#[derive(Debug)]
enum UndoEntry {
    Opened { container: NodeId },
    Appended { list: ListKey, node: NodeId },
}

/// Result of an undo request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOutcome {
    /// The history was empty
    Nothing,
    /// The last appended block was removed
    BlockRemoved,
    /// The last opened container was removed
    ContainerRemoved,
}

impl UndoOutcome {
    /// Fixed operator-facing description
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Nothing => "Nothing to undo.",
            Self::BlockRemoved => "Last action undone.",
            Self::ContainerRemoved => "Container removed.",
        }
    }
}

/// Where a merged button ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonPlacement {
    /// Added to the row already at the end of the target list
    Merged,
    /// A new row was appended
    NewRow,
}

/// In-progress card of one operator
#[derive(Debug)]
pub struct CompositionSession {
    nodes: HashMap<NodeId, Node>,
    lists: HashMap<ListKey, Vec<NodeId>>,
    open: Vec<NodeId>,
    history: Vec<UndoEntry>,
    next_id: u64,
}

impl Default for CompositionSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositionSession {
    /// Create an empty session
    #[must_use]
    pub fn new() -> Self {
        let mut lists = HashMap::new();
        lists.insert(ListKey::Top, Vec::new());
        Self {
            nodes: HashMap::new(),
            lists,
            open: Vec::new(),
            history: Vec::new(),
            next_id: 0,
        }
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    fn target(&self) -> ListKey {
        self.open
            .last()
            .map_or(ListKey::Top, |id| ListKey::Container(*id))
    }

    fn push_to(&mut self, list: ListKey, node: NodeId) {
        self.lists.entry(list).or_default().push(node);
    }

    /// Number of containers currently open
    #[must_use]
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Whether the card has no top-level blocks
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lists.get(&ListKey::Top).is_none_or(Vec::is_empty)
    }

    /// Open a new container inside the current target and enter it
    pub fn open_container(&mut self, accent_color: Option<u32>) {
        let target = self.target();
        let id = self.alloc(Node::Container { accent_color });
        self.lists.insert(ListKey::Container(id), Vec::new());
        self.push_to(target, id);
        self.open.push(id);
        self.history.push(UndoEntry::Opened { container: id });
    }

    /// Leave the innermost open container. Returns false when none is open.
    pub fn close_container(&mut self) -> bool {
        self.open.pop().is_some()
    }

    /// Append a block to the current target
    pub fn append(&mut self, block: Block) {
        let target = self.target();
        let id = self.alloc(Node::Leaf(block));
        self.push_to(target, id);
        self.history.push(UndoEntry::Appended {
            list: target,
            node: id,
        });
    }

    /// Add a button to the trailing action row when it has room, otherwise
    /// append a new row. Merging mutates the row in place and is undone
    /// together with the row.
    pub fn append_button_merging(&mut self, button: Button, capacity: usize) -> ButtonPlacement {
        let target = self.target();
        let last = self.lists.get(&target).and_then(|items| items.last().copied());
        if let Some(Node::Leaf(Block::ActionRow { buttons })) =
            last.and_then(|id| self.nodes.get_mut(&id))
        {
            if buttons.len() < capacity {
                buttons.push(button);
                return ButtonPlacement::Merged;
            }
        }
        self.append(Block::row(button));
        ButtonPlacement::NewRow
    }

    /// Revert the most recent open or append
    pub fn undo(&mut self) -> UndoOutcome {
        let Some(entry) = self.history.pop() else {
            return UndoOutcome::Nothing;
        };
        match entry {
            UndoEntry::Appended { list, node } => {
                self.remove_from(list, node);
                UndoOutcome::BlockRemoved
            }
            UndoEntry::Opened { container } => {
                if self.open.last() == Some(&container) {
                    self.open.pop();
                }
                if !self.detach(container) {
                    debug!(?container, "Undone container already gone");
                }
                UndoOutcome::ContainerRemoved
            }
        }
    }

    /// Remove `node` from `list`: by identity first, then by value.
    fn remove_from(&mut self, list: ListKey, node: NodeId) {
        let Some(items) = self.lists.get(&list) else {
            return;
        };
        let position = items.iter().rposition(|id| *id == node).or_else(|| {
            let wanted = self.materialize(node)?;
            items
                .iter()
                .position(|id| self.materialize(*id).as_ref() == Some(&wanted))
        });
        if let (Some(pos), Some(items)) = (position, self.lists.get_mut(&list)) {
            items.remove(pos);
        }
    }

    /// Remove a container from wherever it sits below the top level
    fn detach(&mut self, target: NodeId) -> bool {
        let nodes = &self.nodes;
        let lists = &mut self.lists;
        let mut pending = vec![ListKey::Top];
        while let Some(key) = pending.pop() {
            let Some(items) = lists.get_mut(&key) else {
                continue;
            };
            if let Some(pos) = items.iter().position(|id| *id == target) {
                items.remove(pos);
                return true;
            }
            pending.extend(
                items
                    .iter()
                    .filter(|id| matches!(nodes.get(*id), Some(Node::Container { .. })))
                    .map(|id| ListKey::Container(*id)),
            );
        }
        false
    }

    fn materialize(&self, id: NodeId) -> Option<Block> {
        match self.nodes.get(&id)? {
            Node::Leaf(block) => Some(block.clone()),
            Node::Container { accent_color } => Some(Block::Container {
                accent_color: *accent_color,
                children: self.materialize_list(ListKey::Container(id)),
            }),
        }
    }

    fn materialize_list(&self, key: ListKey) -> Vec<Block> {
        self.lists
            .get(&key)
            .map(|items| items.iter().filter_map(|id| self.materialize(*id)).collect())
            .unwrap_or_default()
    }

    /// Blocks of the list new blocks currently go to
    #[must_use]
    pub fn target_blocks(&self) -> Vec<Block> {
        self.materialize_list(self.target())
    }

    /// Current card without ending the session
    #[must_use]
    pub fn snapshot(&self) -> Vec<Block> {
        self.materialize_list(ListKey::Top)
    }

    /// Close every open container and hand over the finished card
    #[must_use]
    pub fn finalize(mut self) -> Vec<Block> {
        self.open.clear();
        self.snapshot()
    }
}

/// Identity of a composition session: one per operator per guild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    /// Guild (server) the session runs in
    pub guild_id: u64,
    /// Operator building the card
    pub user_id: u64,
}

impl SessionKey {
    /// Create a key
    #[must_use]
    pub fn new(guild_id: u64, user_id: u64) -> Self {
        Self { guild_id, user_id }
    }
}

/// Tracks which operators currently have a session open
#[derive(Debug, Default)]
pub struct SessionRegistry {
    active: DashMap<SessionKey, ()>,
}

impl SessionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the key for a new session.
    ///
    /// Fails with [`Error::SessionConflict`] while another session holds it.
    /// The returned guard releases the key when dropped.
    pub fn claim(self: &Arc<Self>, key: SessionKey) -> Result<SessionGuard> {
        match self.active.entry(key) {
            Entry::Occupied(_) => Err(Error::SessionConflict {
                guild_id: key.guild_id,
                user_id: key.user_id,
            }),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(SessionGuard {
                    registry: Arc::clone(self),
                    key,
                })
            }
        }
    }

    /// Whether a session is active for the key
    #[must_use]
    pub fn is_active(&self, key: &SessionKey) -> bool {
        self.active.contains_key(key)
    }

    /// Number of active sessions
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

/// Holds a session key; releases it on drop (finish, cancel, timeout or panic)
#[derive(Debug)]
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    key: SessionKey,
}

impl SessionGuard {
    /// Key this guard holds
    #[must_use]
    pub fn key(&self) -> SessionKey {
        self.key
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.active.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{validate_tree, MAX_ROW_BUTTONS};

    fn link(n: usize) -> Button {
        Button::link("https://example.com", format!("b{}", n))
    }

    #[test]
    fn test_append_goes_to_innermost_container() {
        let mut session = CompositionSession::new();
        session.append(Block::text("top"));
        session.open_container(Some(0x112233));
        session.append(Block::text("outer"));
        session.open_container(None);
        session.append(Block::text("inner"));
        assert_eq!(session.depth(), 2);

        assert!(session.close_container());
        session.append(Block::text("outer again"));

        let card = session.finalize();
        assert_eq!(
            card,
            vec![
                Block::text("top"),
                Block::Container {
                    accent_color: Some(0x112233),
                    children: vec![
                        Block::text("outer"),
                        Block::Container {
                            accent_color: None,
                            children: vec![Block::text("inner")],
                        },
                        Block::text("outer again"),
                    ],
                },
            ]
        );
    }

    #[test]
    fn test_close_without_open_is_noop() {
        let mut session = CompositionSession::new();
        assert!(!session.close_container());
        session.open_container(None);
        assert!(session.close_container());
        assert!(!session.close_container());
    }

    #[test]
    fn test_undo_after_append_restores_target() {
        let mut session = CompositionSession::new();
        session.open_container(None);
        session.append(Block::text("a"));
        let before = session.target_blocks();

        session.append(Block::divider());
        assert_eq!(session.undo(), UndoOutcome::BlockRemoved);
        assert_eq!(session.target_blocks(), before);
    }

    #[test]
    fn test_undo_after_open_removes_container_and_stack_entry() {
        let mut session = CompositionSession::new();
        session.append(Block::text("a"));
        session.open_container(None);
        session.open_container(Some(1));
        assert_eq!(session.depth(), 2);

        assert_eq!(session.undo(), UndoOutcome::ContainerRemoved);
        assert_eq!(session.depth(), 1);
        assert_eq!(
            session.snapshot(),
            vec![Block::text("a"), Block::container(None)]
        );

        assert_eq!(session.undo(), UndoOutcome::ContainerRemoved);
        assert_eq!(session.depth(), 0);
        assert_eq!(session.snapshot(), vec![Block::text("a")]);
    }

    #[test]
    fn test_undo_closed_container() {
        let mut session = CompositionSession::new();
        session.open_container(None);
        session.append(Block::text("inside"));
        session.close_container();

        assert_eq!(session.undo(), UndoOutcome::BlockRemoved);
        assert_eq!(session.snapshot(), vec![Block::container(None)]);
        assert_eq!(session.undo(), UndoOutcome::ContainerRemoved);
        assert!(session.is_empty());
        assert_eq!(session.undo(), UndoOutcome::Nothing);
        assert_eq!(UndoOutcome::Nothing.description(), "Nothing to undo.");
    }

    #[test]
    fn test_undo_is_idempotent_against_missing_block() {
        let mut session = CompositionSession::new();
        session.append(Block::text("a"));
        let list = ListKey::Top;
        session.lists.get_mut(&list).unwrap().clear();

        assert_eq!(session.undo(), UndoOutcome::BlockRemoved);
        assert!(session.is_empty());
    }

    #[test]
    fn test_undo_falls_back_to_value_equality() {
        let mut session = CompositionSession::new();
        session.append(Block::text("dup"));
        let original = session.lists[&ListKey::Top][0];

        // Replace the appended id with an equal-valued copy
        let copy = session.alloc(Node::Leaf(Block::text("dup")));
        session.lists.get_mut(&ListKey::Top).unwrap()[0] = copy;
        assert_ne!(original, copy);

        session.undo();
        assert!(session.is_empty());
    }

    #[test]
    fn test_button_merging_splits_at_capacity() {
        let mut session = CompositionSession::new();
        let placements: Vec<_> = (0..6)
            .map(|n| session.append_button_merging(link(n), MAX_ROW_BUTTONS))
            .collect();

        assert_eq!(placements[0], ButtonPlacement::NewRow);
        assert!(placements[1..5].iter().all(|p| *p == ButtonPlacement::Merged));
        assert_eq!(placements[5], ButtonPlacement::NewRow);

        let card = session.finalize();
        assert_eq!(card.len(), 2);
        match (&card[0], &card[1]) {
            (Block::ActionRow { buttons: first }, Block::ActionRow { buttons: second }) => {
                assert_eq!(first.len(), 5);
                assert_eq!(second.len(), 1);
                assert_eq!(second[0].label, "b5");
            }
            other => panic!("expected two rows, got {:?}", other),
        }
        validate_tree(&card).unwrap();
    }

    #[test]
    fn test_merging_does_not_cross_other_blocks() {
        let mut session = CompositionSession::new();
        session.append_button_merging(link(0), MAX_ROW_BUTTONS);
        session.append(Block::divider());
        assert_eq!(
            session.append_button_merging(link(1), MAX_ROW_BUTTONS),
            ButtonPlacement::NewRow
        );
    }

    #[test]
    fn test_undo_merged_row_removes_whole_row() {
        let mut session = CompositionSession::new();
        session.append_button_merging(link(0), MAX_ROW_BUTTONS);
        session.append_button_merging(link(1), MAX_ROW_BUTTONS);

        assert_eq!(session.undo(), UndoOutcome::BlockRemoved);
        assert!(session.is_empty());
    }

    #[test]
    fn test_finalize_keeps_open_containers() {
        let mut session = CompositionSession::new();
        session.open_container(None);
        session.append(Block::text("still here"));

        let card = session.finalize();
        assert_eq!(
            card,
            vec![Block::Container {
                accent_color: None,
                children: vec![Block::text("still here")],
            }]
        );
    }

    #[test]
    fn test_random_operation_sequences_stay_well_formed() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let mut session = CompositionSession::new();
            for step in 0..40 {
                match rng.gen_range(0..6) {
                    0 => session.open_container(None),
                    1 => {
                        session.close_container();
                    }
                    2 => session.append(Block::text(format!("t{}", step))),
                    3 => {
                        session.append_button_merging(link(step), MAX_ROW_BUTTONS);
                    }
                    _ => {
                        session.undo();
                    }
                }
            }
            validate_tree(&session.finalize()).unwrap();
        }
    }

    #[test]
    fn test_registry_rejects_second_session() {
        let registry = SessionRegistry::new();
        let key = SessionKey::new(1, 2);

        let guard = registry.claim(key).unwrap();
        assert!(registry.is_active(&key));
        assert!(matches!(
            registry.claim(key),
            Err(Error::SessionConflict {
                guild_id: 1,
                user_id: 2
            })
        ));

        // Other operators are unaffected
        let other = registry.claim(SessionKey::new(1, 3)).unwrap();
        assert_eq!(registry.active_count(), 2);

        drop(guard);
        assert!(!registry.is_active(&key));
        assert!(registry.claim(key).is_ok());
        drop(other);
    }
}
