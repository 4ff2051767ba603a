use std::collections::HashSet;

use crate::domain::PropertyId;

/// The property ids a user has favorited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FavoriteSet {
    ids: HashSet<PropertyId>,
}

impl FavoriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, property_id: &PropertyId) -> bool {
        self.ids.contains(property_id)
    }

    pub fn insert(&mut self, property_id: PropertyId) -> bool {
        self.ids.insert(property_id)
    }

    pub fn remove(&mut self, property_id: &PropertyId) -> bool {
        self.ids.remove(property_id)
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyId> {
        self.ids.iter()
    }

    /// Ids in a stable order, for display.
    pub fn sorted(&self) -> Vec<PropertyId> {
        let mut ids: Vec<_> = self.ids.iter().cloned().collect();
        ids.sort();
        ids
    }
}

impl FromIterator<PropertyId> for FavoriteSet {
    fn from_iter<I: IntoIterator<Item = PropertyId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_collapse() {
        let set: FavoriteSet = ["a", "b", "a"].into_iter().map(PropertyId::from).collect();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&"a".into()));
    }

    #[test]
    fn test_sorted_is_stable() {
        let set: FavoriteSet = ["c", "a", "b"].into_iter().map(PropertyId::from).collect();
        let sorted: Vec<_> = set.sorted().iter().map(|p| p.to_string()).collect();
        assert_eq!(sorted, vec!["a", "b", "c"]);
    }
}
