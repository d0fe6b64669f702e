//! Playlist storage and traversal.
//!
//! A [`Playlist`] is the item container with readability and duplicate
//! checks; [`PlaylistState`] couples it with play flags and a traversal
//! cursor and is what the transport controller consumes.

pub mod cursor;

use std::fs::File;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use cursor::PlaylistCursor;

/// One playlist entry. Ids are stable for the lifetime of the playlist,
/// so entries can be removed without racing a moving index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistItem {
    pub id: u64,
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct Playlist {
    pub name: String,
    items: Vec<PlaylistItem>,
    next_id: u64,
}

impl Playlist {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
            next_id: 1,
        }
    }

    /// Append a track. Unreadable files and paths already present are
    /// skipped with a log line; returns whether the item was added.
    pub fn append(&mut self, path: PathBuf) -> bool {
        if self.items.iter().any(|item| item.path == path) {
            debug!("skipping duplicate playlist entry: {}", path.display());
            return false;
        }
        if let Err(e) = File::open(&path) {
            warn!("skipping unreadable playlist entry {}: {}", path.display(), e);
            return false;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.items.push(PlaylistItem { id, path });
        true
    }

    pub fn remove(&mut self, id: u64) -> Option<PlaylistItem> {
        let at = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(at))
    }

    pub fn items(&self) -> &[PlaylistItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.items.iter().any(|item| item.path == path)
    }
}

/// Playback flags attached to a playlist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayFlags {
    pub shuffle: bool,
    pub repeat: bool,
}

/// A playlist plus the cursor and flags the transport walks it with.
#[derive(Debug)]
pub struct PlaylistState {
    pub playlist: Playlist,
    pub flags: PlayFlags,
    cursor: PlaylistCursor,
}

impl PlaylistState {
    pub fn new(playlist: Playlist, flags: PlayFlags) -> Self {
        let cursor = PlaylistCursor::new(playlist.len(), flags.shuffle);
        Self { playlist, flags, cursor }
    }

    pub fn next(&mut self) -> Option<PathBuf> {
        let index = self.cursor.next(self.flags.repeat)?;
        Some(self.playlist.items()[index].path.clone())
    }

    pub fn prev(&mut self) -> Option<PathBuf> {
        let index = self.cursor.prev(self.flags.repeat)?;
        Some(self.playlist.items()[index].path.clone())
    }

    /// Rebuild the cursor after the playlist contents changed. Traversal
    /// restarts from the top of a freshly dealt order.
    pub fn refresh(&mut self) {
        debug!(
            "refreshing playlist \"{}\" ({} items)",
            self.playlist.name,
            self.playlist.len()
        );
        self.cursor = PlaylistCursor::new(self.playlist.len(), self.flags.shuffle);
    }

    pub fn is_single(&self) -> bool {
        self.playlist.len() == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(b"x").unwrap();
        path
    }

    #[test]
    fn test_append_skips_duplicates_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(dir.path(), "a.cwav");

        let mut playlist = Playlist::new("test");
        assert!(playlist.append(a.clone()));
        assert!(!playlist.append(a.clone()));
        assert!(!playlist.append(dir.path().join("missing.cwav")));
        assert_eq!(playlist.len(), 1);
    }

    #[test]
    fn test_remove_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(dir.path(), "a.cwav");
        let b = touch(dir.path(), "b.cwav");

        let mut playlist = Playlist::new("test");
        playlist.append(a.clone());
        playlist.append(b.clone());
        let id = playlist.items()[0].id;

        let removed = playlist.remove(id).unwrap();
        assert_eq!(removed.path, a);
        assert_eq!(playlist.len(), 1);
        assert!(playlist.remove(id).is_none());
        assert!(playlist.contains(&b));
    }

    #[test]
    fn test_state_walks_in_order_and_honors_repeat() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(dir.path(), "a.cwav");
        let b = touch(dir.path(), "b.cwav");

        let mut playlist = Playlist::new("test");
        playlist.append(a.clone());
        playlist.append(b.clone());

        let mut state = PlaylistState::new(playlist, PlayFlags { shuffle: false, repeat: false });
        assert_eq!(state.next(), Some(a.clone()));
        assert_eq!(state.next(), Some(b.clone()));
        assert_eq!(state.next(), None);

        state.flags.repeat = true;
        assert_eq!(state.next(), Some(a));
    }

    #[test]
    fn test_refresh_picks_up_new_items() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(dir.path(), "a.cwav");
        let b = touch(dir.path(), "b.cwav");

        let mut playlist = Playlist::new("test");
        playlist.append(a.clone());
        let mut state = PlaylistState::new(playlist, PlayFlags::default());
        assert_eq!(state.next(), Some(a.clone()));

        state.playlist.append(b.clone());
        state.refresh();
        assert_eq!(state.next(), Some(a));
        assert_eq!(state.next(), Some(b));
    }
}
