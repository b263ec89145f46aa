//! Page-by-page list reconciliation.
//!
//! Page 0 replaces the list. Later pages update rows already present in place
//! and append the rest. Either way the local favorite flag wins over whatever
//! the remote sent.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::CatalogItem;

/// Position of the list in the remote paging sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageWindow {
    pub page_index: u32,
    pub page_size: u32,
    pub has_more: bool,
}

impl PageWindow {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_index: 0,
            page_size,
            has_more: true,
        }
    }

    /// Window for a list of `len` rows loaded in an earlier run.
    /// A partial last page means the end was reached.
    pub fn restore(len: usize, page_size: u32) -> Self {
        let size = page_size.max(1) as usize;
        let pages = len.div_ceil(size).max(1);
        Self {
            page_index: (pages - 1) as u32,
            page_size,
            has_more: len > 0 && len % size == 0,
        }
    }

    pub fn next_page(&self) -> u32 {
        self.page_index + 1
    }
}

/// A list together with its paging position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagedItems {
    pub items: Vec<CatalogItem>,
    pub window: PageWindow,
}

impl PagedItems {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// Result of merging one fetched page into the current list
#[derive(Debug, Clone, PartialEq)]
pub struct PageMerge {
    /// Full list after the merge
    pub items: Vec<CatalogItem>,
    /// The fetched page, deduplicated, with local favorites applied
    pub page: Vec<CatalogItem>,
    pub window: PageWindow,
    /// Ids the list did not contain before
    pub net_new: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct PaginationMerger {
    page_size: u32,
}

impl PaginationMerger {
    pub fn new(page_size: u32) -> Self {
        Self { page_size }
    }

    pub fn merge(
        &self,
        existing: &[CatalogItem],
        fetched: Vec<CatalogItem>,
        page_index: u32,
    ) -> PageMerge {
        let returned = fetched.len();
        let favorites: HashMap<&str, bool> = existing
            .iter()
            .map(|item| (item.id.as_str(), item.is_favorite))
            .collect();

        let mut seen = HashSet::new();
        let page: Vec<CatalogItem> = fetched
            .into_iter()
            .filter(|item| seen.insert(item.id.clone()))
            .map(|mut item| {
                if let Some(&is_favorite) = favorites.get(item.id.as_str()) {
                    item.is_favorite = is_favorite;
                }
                item
            })
            .collect();

        let net_new = page
            .iter()
            .filter(|item| !favorites.contains_key(item.id.as_str()))
            .count();

        let full_page = returned > 0 && returned >= self.page_size as usize;

        let (items, has_more) = if page_index == 0 {
            (page.clone(), full_page)
        } else {
            let mut items = existing.to_vec();
            let positions: HashMap<String, usize> = items
                .iter()
                .enumerate()
                .map(|(i, item)| (item.id.clone(), i))
                .collect();
            for item in &page {
                match positions.get(&item.id) {
                    Some(&i) => items[i] = item.clone(),
                    None => items.push(item.clone()),
                }
            }
            // A page of ids we already hold would loop forever
            (items, full_page && net_new > 0)
        };

        PageMerge {
            items,
            page,
            window: PageWindow {
                page_index,
                page_size: self.page_size,
                has_more,
            },
            net_new,
        }
    }
}
