//! Optimistic list transforms.
//!
//! Pure functions from an old list page to a new one. When the target item is
//! not on the page the input `Arc` is returned as-is, so callers can detect
//! "nothing changed" with `Arc::ptr_eq` and skip notifying subscribers.

use std::sync::Arc;

use crate::domain::entities::{ItemId, ListPatch, ListResult};

/// An optimistic rewrite applied to every cached page under a prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListTransform {
    Remove(ItemId),
    PatchFields { id: ItemId, fields: ListPatch },
}

impl ListTransform {
    pub fn apply(&self, list: &Arc<ListResult>) -> Arc<ListResult> {
        match self {
            ListTransform::Remove(id) => remove_item(list, id),
            ListTransform::PatchFields { id, fields } => patch_fields(list, id, fields),
        }
    }

    pub fn item_id(&self) -> &ItemId {
        match self {
            ListTransform::Remove(id) | ListTransform::PatchFields { id, .. } => id,
        }
    }
}

/// Drop `id` from the page. `total` only moves when this page held the item.
pub fn remove_item(list: &Arc<ListResult>, id: &ItemId) -> Arc<ListResult> {
    if !list.contains(id) {
        return Arc::clone(list);
    }

    let items = list
        .items
        .iter()
        .filter(|item| &item.id != id)
        .cloned()
        .collect();

    Arc::new(ListResult {
        items,
        total: list.total.saturating_sub(1),
        offset: list.offset,
        limit: list.limit,
        has_more: list.has_more,
    })
}

/// Merge the carried fields into the matching item; every other item keeps its `Arc`.
pub fn patch_fields(list: &Arc<ListResult>, id: &ItemId, fields: &ListPatch) -> Arc<ListResult> {
    if fields.is_empty() || !list.contains(id) {
        return Arc::clone(list);
    }

    let items = list
        .items
        .iter()
        .map(|item| {
            if &item.id == id {
                Arc::new(fields.apply_to(item))
            } else {
                Arc::clone(item)
            }
        })
        .collect();

    Arc::new(ListResult {
        items,
        total: list.total,
        offset: list.offset,
        limit: list.limit,
        has_more: list.has_more,
    })
}
