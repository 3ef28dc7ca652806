//! One logical row: an ordered tuple of items.

use std::slice;
use std::sync::Arc;

use crate::item::{ItemData, ItemDataPtr, ItemId, ItemType, ITEM_ID_ANONY};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemGroup {
    items: Vec<ItemDataPtr>,
}

pub type ItemGroupPtr = Arc<ItemGroup>;

impl ItemGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn add(&mut self, item: ItemDataPtr) {
        self.items.push(item);
    }

    pub fn item_at(&self, index: usize) -> Option<&ItemDataPtr> {
        self.items.get(index)
    }

    /// First item carrying `id`.
    pub fn item(&self, id: ItemId) -> Option<&ItemDataPtr> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, ItemDataPtr> {
        self.items.iter()
    }

    pub fn items(&self) -> &[ItemDataPtr] {
        &self.items
    }

    /// The items of `self` followed by the items of `other`. Items are
    /// shared, not copied.
    pub fn concat(&self, other: &ItemGroup) -> ItemGroup {
        let mut items = Vec::with_capacity(self.len() + other.len());
        items.extend(self.items.iter().cloned());
        items.extend(other.items.iter().cloned());
        ItemGroup { items }
    }

    /// A group of NULLs shaped like `self` (same ids and types).
    pub fn null_like(&self) -> ItemGroup {
        self.items
            .iter()
            .map(|item| ItemData::null(item.id(), item.item_type()))
            .collect()
    }

    /// A group of `arity` anonymous NULLs, used when no row shows the shape.
    pub fn nulls(arity: usize) -> ItemGroup {
        (0..arity)
            .map(|_| ItemData::null(ITEM_ID_ANONY, ItemType::String))
            .collect()
    }
}

impl FromIterator<ItemDataPtr> for ItemGroup {
    fn from_iter<T: IntoIterator<Item = ItemDataPtr>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ItemGroup {
    type Item = &'a ItemDataPtr;
    type IntoIter = slice::Iter<'a, ItemDataPtr>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_position_and_id() {
        let mut group = ItemGroup::new();
        group.add(ItemData::int(10, 1));
        group.add(ItemData::string(11, "x"));
        assert_eq!(group.len(), 2);
        assert_eq!(group.item_at(1).unwrap().as_str(), Some("x"));
        assert_eq!(group.item(10).unwrap().to_string(), "1");
        assert!(group.item(99).is_none());
        assert!(group.item_at(2).is_none());
    }

    #[test]
    fn concat_shares_items() {
        let left: ItemGroup = vec![ItemData::int(1, 1)].into_iter().collect();
        let right: ItemGroup = vec![ItemData::int(2, 2)].into_iter().collect();
        let joined = left.concat(&right);
        assert_eq!(joined.len(), 2);
        assert!(Arc::ptr_eq(&joined.items()[0], &left.items()[0]));
    }

    #[test]
    fn null_like_keeps_shape() {
        let group: ItemGroup = vec![ItemData::uint64(5, 9), ItemData::string(6, "a")]
            .into_iter()
            .collect();
        let nulls = group.null_like();
        assert!(nulls.iter().all(|item| item.is_null()));
        assert_eq!(nulls.item_at(0).unwrap().item_type(), ItemType::Uint64);
        assert_eq!(nulls.item_at(1).unwrap().id(), 6);
    }
}
