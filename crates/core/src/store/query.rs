//! Query types shared by every store backend.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Sort field for range scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    /// The entity's calendar date (transactions) or creation instant
    /// (entities without a domain date).
    Date,
    Name,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Deterministic scan order; ties on the sort key always break on `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortOrder {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortOrder {
    pub fn date_desc() -> Self {
        Self {
            field: SortField::Date,
            direction: SortDirection::Desc,
        }
    }

    pub fn name_asc() -> Self {
        Self {
            field: SortField::Name,
            direction: SortDirection::Asc,
        }
    }
}

/// Owner-scoped filter over domain fields. Unset fields match everything;
/// fields an entity does not carry are ignored by its `matches` impl.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityFilter {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub card_id: Option<String>,
    pub category_id: Option<String>,
    /// Substring match on the entity's display name.
    pub search: Option<String>,
}

impl EntityFilter {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Scan position within an ordered range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScanPosition {
    /// Beginning of a keyset scan.
    Start,
    /// Offset-mode scan (page-number pagination).
    Offset { offset: i64 },
    /// Keyset-mode scan resuming strictly after `(sort_key, id)`.
    After { sort_key: String, id: String },
}

/// Limit plus position for one page of a range scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: u32,
    pub position: ScanPosition,
}

impl PageRequest {
    pub fn first(limit: u32) -> Self {
        Self {
            limit,
            position: ScanPosition::Start,
        }
    }
}

/// One page of a stable range scan.
#[derive(Debug, Clone)]
pub struct ScanPage<E> {
    pub items: Vec<E>,
    /// Position resuming the scan after this page; `None` when exhausted.
    pub next: Option<ScanPosition>,
    pub has_more: bool,
    /// Total effective matches. Populated for offset scans; keyset scans
    /// skip the extra count and leave it `None`.
    pub total: Option<i64>,
}

impl<E> ScanPage<E> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next: None,
            has_more: false,
            total: None,
        }
    }
}
