//! Session directory: list entries, ownership, and client-side filtering.
//!
//! The entry list is rebuilt wholesale on every fetch. Filtering only shows
//! or hides already-fetched entries; it never refetches.

/// One row of the session directory, derived from a history fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionListEntry {
    pub id: i64,
    pub title: String,
    pub username: String,
    pub is_owner: bool,
}

impl SessionListEntry {
    /// Only the owner or an administrator sees the rename/delete affordance.
    pub fn shows_actions(&self, is_admin: bool) -> bool {
        self.is_owner || is_admin
    }
}

/// Two independent predicates ANDed together: a case-insensitive substring
/// match against the title and, when active, an ownership check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryFilter {
    pub search: String,
    pub mine_only: bool,
}

impl DirectoryFilter {
    pub fn matches(&self, entry: &SessionListEntry) -> bool {
        let matches_search = self.search.is_empty()
            || entry
                .title
                .to_lowercase()
                .contains(&self.search.to_lowercase());
        let matches_owner = !self.mine_only || entry.is_owner;
        matches_search && matches_owner
    }
}

/// Entries visible under a filter, in directory order.
pub fn visible<'a>(
    entries: &'a [SessionListEntry],
    filter: &DirectoryFilter,
) -> Vec<&'a SessionListEntry> {
    entries.iter().filter(|e| filter.matches(e)).collect()
}
