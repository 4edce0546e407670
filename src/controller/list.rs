//! Client-local projection of the owner's bookmarks
//!
//! The list is replaced wholesale by the initial fetch and afterwards only
//! moves in response to change events. Inserts are prepended without
//! re-sorting, so the newest-first order holds as long as the feed delivers
//! inserts in commit order.

use uuid::Uuid;

use crate::model::Bookmark;
use crate::store::ChangeEvent;

/// Ordered (newest first) list of bookmarks shown to the user.
///
/// # Examples
///
/// ```
/// use bookmark_manager::controller::list::BookmarkList;
///
/// let list = BookmarkList::default();
/// assert!(list.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkList {
    items: Vec<Bookmark>,
}

impl BookmarkList {
    /// Replaces the whole list with freshly fetched rows.
    pub fn replace(&mut self, rows: Vec<Bookmark>) {
        self.items = rows;
    }

    /// Applies a change event. Returns `true` when the list changed.
    ///
    /// - insert: prepended unless a row with the same id is present
    /// - delete: the matching row is removed; absent ids are ignored
    /// - update: ignored, bookmarks are never edited in place
    pub fn apply(&mut self, event: &ChangeEvent) -> bool {
        match event {
            ChangeEvent::Insert(row) => {
                if self.contains(row.id) {
                    return false;
                }
                self.items.insert(0, row.clone());
                true
            }
            ChangeEvent::Delete { id } => {
                let before = self.items.len();
                self.items.retain(|row| row.id != *id);
                self.items.len() != before
            }
            ChangeEvent::Update(_) => false,
        }
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.items.iter().any(|row| row.id == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bookmark> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[Bookmark] {
        &self.items
    }
}

impl<'a> IntoIterator for &'a BookmarkList {
    type Item = &'a Bookmark;
    type IntoIter = std::slice::Iter<'a, Bookmark>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
