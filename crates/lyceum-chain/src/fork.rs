//! In-memory tree of recent blocks competing to extend the chain.

use std::collections::{BTreeMap, HashMap};

use lyceum_types::{BlockId, SignedBlock};

use crate::error::ChainError;

/// A block held in the fork window with its link metadata.
#[derive(Clone, Debug)]
pub struct ForkItem {
    pub block: SignedBlock,
    pub id: BlockId,
    pub num: u32,
    pub previous: BlockId,
}

impl ForkItem {
    fn new(block: SignedBlock) -> Self {
        let id = block.id();
        let num = block.block_num();
        let previous = block.header.previous;
        Self {
            block,
            id,
            num,
            previous,
        }
    }
}

/// Tree of candidate blocks above the last irreversible block.
///
/// `head` tracks the tip of the longest branch seen, which is not
/// necessarily the branch the database has applied; the database compares
/// the two and decides whether to switch. Blocks below the irreversible
/// boundary are pruned, so every stored block is still contestable.
#[derive(Default)]
pub struct ForkDatabase {
    index: HashMap<BlockId, ForkItem>,
    by_number: BTreeMap<u32, Vec<BlockId>>,
    head: Option<BlockId>,
}

impl ForkDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn head(&self) -> Option<&ForkItem> {
        self.head.as_ref().and_then(|id| self.index.get(id))
    }

    pub fn get(&self, id: &BlockId) -> Option<&ForkItem> {
        self.index.get(id)
    }

    /// The block at `num` on the branch leading to the longest head.
    pub fn get_on_head_branch(&self, num: u32) -> Option<&ForkItem> {
        let mut item = self.head()?;
        loop {
            if item.num == num {
                return Some(item);
            }
            if item.num < num {
                return None;
            }
            item = self.index.get(&item.previous)?;
        }
    }

    /// Inserts a block and returns the (possibly unchanged) longest head.
    ///
    /// The first insertion seeds the tree; afterwards a block must link to a
    /// stored parent or it is rejected as unlinkable.
    pub fn push_block(&mut self, block: SignedBlock) -> Result<ForkItem, ChainError> {
        let item = ForkItem::new(block);
        if !self.index.is_empty() && !self.index.contains_key(&item.previous) {
            return Err(ChainError::UnlinkableBlock(item.id));
        }
        self.insert(item.clone());
        let head_num = self.head().map(|h| h.num).unwrap_or(0);
        if self.head.is_none() || item.num > head_num {
            self.head = Some(item.id);
        }
        Ok(self.head().cloned().unwrap_or(item))
    }

    /// Seeds the tree with an already-applied block, discarding anything
    /// held before. Used after replaying the block log.
    pub fn reset_to(&mut self, block: SignedBlock) {
        self.index.clear();
        self.by_number.clear();
        let item = ForkItem::new(block);
        self.head = Some(item.id);
        self.insert(item);
    }

    /// Moves the head pointer to its parent. The block stays stored so the
    /// abandoned tip can win again later.
    pub fn pop_head(&mut self) -> Result<(), ChainError> {
        let head = self.head().ok_or(ChainError::EmptyChain)?;
        let previous = head.previous;
        if !self.index.contains_key(&previous) {
            return Err(ChainError::UnlinkableBlock(previous));
        }
        self.head = Some(previous);
        Ok(())
    }

    /// Points the head at `id`, which must be stored.
    pub fn set_head(&mut self, id: &BlockId) {
        assert!(self.index.contains_key(id), "fork head must be stored");
        self.head = Some(*id);
    }

    /// Removes a block and every descendant built on it.
    pub fn remove_with_descendants(&mut self, id: &BlockId) {
        let mut doomed = vec![*id];
        while let Some(target) = doomed.pop() {
            if let Some(item) = self.index.remove(&target) {
                if let Some(ids) = self.by_number.get_mut(&item.num) {
                    ids.retain(|i| *i != target);
                    if ids.is_empty() {
                        self.by_number.remove(&item.num);
                    }
                }
                if self.head == Some(target) {
                    self.head = Some(item.previous);
                }
            }
            for (child_id, child) in &self.index {
                if child.previous == target {
                    doomed.push(*child_id);
                }
            }
        }
        // The parent the head fell back on may itself have been doomed;
        // land on the deepest block still stored.
        if self.head.is_some_and(|id| !self.index.contains_key(&id)) {
            self.head = self
                .by_number
                .iter()
                .next_back()
                .and_then(|(_, ids)| ids.first().copied());
        }
    }

    /// Drops every block numbered below `num`. Called as the irreversible
    /// boundary advances; the boundary block itself stays as the tree root.
    pub fn prune_below(&mut self, num: u32) {
        let stale: Vec<u32> = self.by_number.range(..num).map(|(n, _)| *n).collect();
        for n in stale {
            if let Some(ids) = self.by_number.remove(&n) {
                for id in ids {
                    self.index.remove(&id);
                }
            }
        }
    }

    /// Walks two tips back to their common ancestor.
    ///
    /// Returns the two branches tip-first, excluding the ancestor itself;
    /// the ancestor is the `previous` of each branch's last item.
    pub fn fetch_branch_from(
        &self,
        first: &BlockId,
        second: &BlockId,
    ) -> Result<(Vec<ForkItem>, Vec<ForkItem>), ChainError> {
        let mut a = self
            .index
            .get(first)
            .ok_or(ChainError::UnlinkableBlock(*first))?;
        let mut b = self
            .index
            .get(second)
            .ok_or(ChainError::UnlinkableBlock(*second))?;
        let mut first_branch = Vec::new();
        let mut second_branch = Vec::new();

        while a.num > b.num {
            first_branch.push(a.clone());
            a = self.parent(a)?;
        }
        while b.num > a.num {
            second_branch.push(b.clone());
            b = self.parent(b)?;
        }
        while a.id != b.id {
            first_branch.push(a.clone());
            second_branch.push(b.clone());
            a = self.parent(a)?;
            b = self.parent(b)?;
        }
        Ok((first_branch, second_branch))
    }

    fn parent(&self, item: &ForkItem) -> Result<&ForkItem, ChainError> {
        self.index
            .get(&item.previous)
            .ok_or(ChainError::UnlinkableBlock(item.previous))
    }

    fn insert(&mut self, item: ForkItem) {
        self.by_number.entry(item.num).or_default().push(item.id);
        self.index.insert(item.id, item);
    }
}
