//! Change-feed events observed from the authoritative store.
//!
//! Each watched collection has its own ordered stream of insert, update,
//! and delete notifications. There is no ordering guarantee across
//! collections.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Equipment, Request, Team};

/// A watched entity collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Teams,
    Equipment,
    Requests,
}

impl Collection {
    /// Table name in the authoritative store.
    pub fn table(self) -> &'static str {
        match self {
            Collection::Teams => "teams",
            Collection::Equipment => "equipment",
            Collection::Requests => "requests",
        }
    }

    /// NOTIFY channel carrying this collection's change feed.
    pub fn channel(self) -> &'static str {
        match self {
            Collection::Teams => "maintq_teams",
            Collection::Equipment => "maintq_equipment",
            Collection::Requests => "maintq_requests",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.table())
    }
}

/// A single change to one row of a collection.
///
/// This is also the wire shape of a NOTIFY payload:
/// `{"event": "insert", "row": {...}}` or `{"event": "delete", "row": "<id>"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "row", rename_all = "snake_case")]
pub enum RowEvent<T> {
    Insert(T),
    Update(T),
    Delete(Uuid),
}

impl<T> RowEvent<T> {
    pub fn kind(&self) -> &'static str {
        match self {
            RowEvent::Insert(_) => "insert",
            RowEvent::Update(_) => "update",
            RowEvent::Delete(_) => "delete",
        }
    }
}

/// A change event tagged with its collection. What `Store::subscribe`
/// delivers.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Team(RowEvent<Team>),
    Equipment(RowEvent<Equipment>),
    Request(RowEvent<Request>),
}

impl ChangeEvent {
    pub fn collection(&self) -> Collection {
        match self {
            ChangeEvent::Team(_) => Collection::Teams,
            ChangeEvent::Equipment(_) => Collection::Equipment,
            ChangeEvent::Request(_) => Collection::Requests,
        }
    }
}
