use crate::core::{CollectionError, ItemId, Result};
use crate::source::Page;
use futures::future::{BoxFuture, Shared};

/// A page fetch shared by every resolution waiting on it.
#[derive(Clone)]
pub(crate) struct PendingPage {
    pub offset: usize,
    pub done: Shared<BoxFuture<'static, Result<()>>>,
}

/// Compensation record of one optimistic edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EditRecord {
    Added {
        id: ItemId,
        evicted: Option<ItemId>,
        estimate_delta: isize,
        generation: u64,
    },
    Removed {
        id: ItemId,
        index: usize,
        estimate_delta: isize,
        generation: u64,
    },
    Moved {
        id: ItemId,
        from: usize,
        generation: u64,
    },
}

impl EditRecord {
    pub fn id(&self) -> &ItemId {
        match self {
            Self::Added { id, .. } | Self::Removed { id, .. } | Self::Moved { id, .. } => id,
        }
    }
}

/// Mutable part of a collection, guarded by the collection mutex.
pub(crate) struct CollectionState {
    pub local: bool,
    pub count_limit: usize,
    pub window: Vec<ItemId>,
    pub estimated_total: Option<usize>,
    /// Remote position of the next page. Advances by every identifier a page
    /// returned and follows the edits applied to the fetched prefix, so it
    /// stays aligned with the remote list as it changes.
    pub next_offset: usize,
    pub exhausted: bool,
    /// Bumped by cache flushes; pages and rollbacks from an older generation
    /// no longer apply to the window.
    pub generation: u64,
    pub in_flight: Option<PendingPage>,
}

impl CollectionState {
    pub fn local<I>(ids: I, count_limit: usize) -> Self
    where
        I: IntoIterator<Item = ItemId>,
    {
        let mut window: Vec<ItemId> = Vec::new();
        for id in ids {
            if count_limit != 0 && window.len() >= count_limit {
                break;
            }
            if !window.contains(&id) {
                window.push(id);
            }
        }

        Self {
            local: true,
            count_limit,
            estimated_total: Some(window.len()),
            window,
            next_offset: 0,
            exhausted: true,
            generation: 0,
            in_flight: None,
        }
    }

    pub fn remote(count_limit: usize) -> Self {
        Self {
            local: false,
            count_limit,
            window: Vec::new(),
            estimated_total: None,
            next_offset: 0,
            exhausted: false,
            generation: 0,
            in_flight: None,
        }
    }

    /// Best estimate of the full extent; never below the window length.
    pub fn estimate(&self) -> usize {
        self.estimated_total
            .unwrap_or(0)
            .max(self.window.len())
    }

    pub fn position(&self, id: &ItemId) -> Option<usize> {
        self.window.iter().position(|candidate| candidate == id)
    }

    fn at_limit(&self) -> bool {
        self.count_limit != 0 && self.window.len() >= self.count_limit
    }

    fn shift_offset(&mut self, delta: isize) {
        if !self.local {
            self.next_offset = self.next_offset.saturating_add_signed(delta);
        }
    }

    fn shift_estimate(&mut self, delta: isize) {
        if self.local {
            self.estimated_total = Some(self.window.len());
            return;
        }
        let shifted = (self.estimate() as isize + delta).max(0) as usize;
        self.estimated_total = Some(shifted.max(self.window.len()));
    }

    /// Appends a fetched page, skipping identifiers already present and
    /// stopping at the count limit. Returns the number of identifiers added.
    pub fn append_page(&mut self, page: Page) -> usize {
        let mut appended = 0;
        let returned = page.ids.len();

        for id in page.ids {
            if self.at_limit() {
                self.exhausted = true;
                break;
            }
            if !self.window.contains(&id) {
                self.window.push(id);
                appended += 1;
            }
        }

        self.next_offset += returned;
        if !page.has_more || returned == 0 {
            self.exhausted = true;
        }
        self.estimated_total = Some(page.total_estimate.max(self.window.len()));
        appended
    }

    /// Inserts `id` at the head, evicting the tail past the count limit.
    /// Returns `None` when `id` is already present.
    pub fn apply_add(&mut self, id: &ItemId) -> Option<EditRecord> {
        if self.window.contains(id) {
            return None;
        }

        let before = self.estimate();
        self.window.insert(0, id.clone());
        let evicted = if self.count_limit != 0 && self.window.len() > self.count_limit {
            self.window.pop()
        } else {
            None
        };
        self.shift_offset(1);
        self.shift_estimate(1);

        Some(EditRecord::Added {
            id: id.clone(),
            evicted,
            estimate_delta: self.estimate() as isize - before as isize,
            generation: self.generation,
        })
    }

    pub fn apply_remove_at(&mut self, index: usize) -> Result<EditRecord> {
        if index >= self.window.len() {
            return Err(CollectionError::OutOfRange {
                index,
                extent: self.window.len(),
            });
        }

        let before = self.estimate();
        let id = self.window.remove(index);
        self.shift_offset(-1);
        self.shift_estimate(-1);

        Ok(EditRecord::Removed {
            id,
            index,
            estimate_delta: self.estimate() as isize - before as isize,
            generation: self.generation,
        })
    }

    pub fn apply_move(&mut self, from: usize, to: usize) -> Result<EditRecord> {
        let extent = self.window.len();
        for index in [from, to] {
            if index >= extent {
                return Err(CollectionError::OutOfRange { index, extent });
            }
        }

        let id = self.window.remove(from);
        self.window.insert(to, id.clone());

        Ok(EditRecord::Moved {
            id,
            from,
            generation: self.generation,
        })
    }

    /// Reverses one edit without touching changes made by other edits since.
    pub fn rollback(&mut self, record: &EditRecord) {
        match record {
            EditRecord::Added {
                id,
                evicted,
                estimate_delta,
                generation,
            } => {
                if *generation == self.generation {
                    if let Some(position) = self.position(id) {
                        self.window.remove(position);
                    }
                    if let Some(evicted) = evicted {
                        if !self.window.contains(evicted) && !self.at_limit() {
                            self.window.push(evicted.clone());
                        }
                    }
                    self.shift_offset(-1);
                }
                self.shift_estimate(-estimate_delta);
            }
            EditRecord::Removed {
                id,
                index,
                estimate_delta,
                generation,
            } => {
                if *generation == self.generation {
                    // Never evicts to make room.
                    if !self.window.contains(id) && !self.at_limit() {
                        let index = (*index).min(self.window.len());
                        self.window.insert(index, id.clone());
                    }
                    self.shift_offset(1);
                }
                self.shift_estimate(-estimate_delta);
            }
            EditRecord::Moved {
                id,
                from,
                generation,
            } => {
                if *generation == self.generation {
                    if let Some(position) = self.position(id) {
                        let moved = self.window.remove(position);
                        let from = (*from).min(self.window.len());
                        self.window.insert(from, moved);
                    }
                }
            }
        }
    }

    /// Drops the materialized window of a remote collection.
    pub fn reset_paging(&mut self) {
        self.window.clear();
        self.next_offset = 0;
        self.exhausted = false;
        self.in_flight = None;
        self.generation += 1;
    }
}
