use std::collections::VecDeque;

/// Bounded FIFO of recently committed items.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct History {
    depth: usize,
    items: VecDeque<String>,
}

impl History {
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            items: VecDeque::with_capacity(depth),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, item: &str) -> bool {
        self.items.iter().any(|i| i == item)
    }

    /// Append, evicting the oldest entries beyond `depth`.
    pub fn push(&mut self, item: &str) {
        if self.depth == 0 {
            return;
        }
        self.items.push_back(item.to_owned());
        while self.items.len() > self.depth {
            self.items.pop_front();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HistoryId(pub(crate) u32);

/// Owner of every history buffer in a [`crate::PoolSet`]. Pools refer to slots by [`HistoryId`];
/// pools declaring the same shared-history key get the same id.
#[derive(Clone, Debug, Default)]
pub struct Histories {
    slots: Vec<History>,
}

impl Histories {
    pub(crate) fn alloc(&mut self, depth: usize) -> HistoryId {
        let id = HistoryId(self.slots.len() as u32);
        self.slots.push(History::new(depth));
        id
    }

    pub fn get(&self, id: HistoryId) -> &History {
        &self.slots[id.0 as usize]
    }

    pub(crate) fn get_mut(&mut self, id: HistoryId) -> &mut History {
        &mut self.slots[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
