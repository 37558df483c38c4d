/// Index arithmetic for the modal lightbox over a history of `len` entries.
///
/// The viewer never holds a reference to the history itself; callers pass
/// the current length so a stale index can be re-validated after the
/// collection changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewer {
    active: Option<usize>,
}

impl Viewer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    /// Opens at `index`, clamped to the last entry. An empty history leaves
    /// the viewer closed.
    pub fn open(&mut self, index: usize, len: usize) {
        self.active = if len == 0 {
            None
        } else {
            Some(index.min(len - 1))
        };
    }

    pub fn close(&mut self) {
        self.active = None;
    }

    pub fn next(&mut self, len: usize) {
        if let Some(current) = self.active {
            if current + 1 < len {
                self.active = Some(current + 1);
            }
        }
    }

    pub fn previous(&mut self) {
        if let Some(current) = self.active {
            if current > 0 {
                self.active = Some(current - 1);
            }
        }
    }

    /// Clamps the active index into `0..len`, closing when empty.
    pub fn revalidate(&mut self, len: usize) {
        if let Some(current) = self.active {
            self.open(current, len);
        }
    }

    /// Keeps the same entry on screen after an insertion at the front.
    pub fn on_prepended(&mut self, new_len: usize) {
        if let Some(current) = self.active {
            self.open(current + 1, new_len);
        }
    }

    /// Adjusts after `removed` was deleted, leaving `new_len` entries.
    pub fn on_removed(&mut self, removed: usize, new_len: usize) {
        let Some(current) = self.active else {
            return;
        };
        if removed < current {
            self.open(current - 1, new_len);
        } else {
            self.open(current, new_len);
        }
    }
}
