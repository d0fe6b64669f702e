use rand::seq::SliceRandom;

/// Traversal order over a playlist's items.
///
/// Holds a permutation of item indices and a position one past the last
/// item handed out. Shuffled cursors re-deal the permutation every time
/// the end wraps, so each repeat pass gets a fresh order.
#[derive(Debug)]
pub struct PlaylistCursor {
    order: Vec<usize>,
    pos: usize,
    shuffle: bool,
}

impl PlaylistCursor {
    pub fn new(len: usize, shuffle: bool) -> Self {
        let mut cursor = Self {
            order: (0..len).collect(),
            pos: 0,
            shuffle,
        };
        if shuffle {
            cursor.order.shuffle(&mut rand::thread_rng());
        }
        cursor
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Index of the next item, or None when the end is reached and repeat
    /// is off.
    pub fn next(&mut self, repeat: bool) -> Option<usize> {
        if self.order.is_empty() {
            return None;
        }
        if self.pos == self.order.len() {
            if !repeat {
                return None;
            }
            self.rearrange();
        }
        let index = self.order[self.pos];
        self.pos += 1;
        Some(index)
    }

    /// Step back one item. At the front this either wraps to the last item
    /// (repeat on) or stays on the first.
    pub fn prev(&mut self, repeat: bool) -> Option<usize> {
        if self.order.is_empty() {
            return None;
        }
        if self.pos <= 1 {
            self.pos = if repeat { self.order.len() } else { 1 };
        } else {
            self.pos -= 1;
        }
        Some(self.order[self.pos - 1])
    }

    /// Rewind to the start, re-dealing the order if shuffling.
    pub fn rearrange(&mut self) {
        self.pos = 0;
        if self.shuffle {
            self.order.shuffle(&mut rand::thread_rng());
        }
    }
}
