//! Batched range queries
//!
//! Region and scope queries can match millions of rows, so they are served
//! by a cursor that fetches one page at a time using keyset pagination on
//! the sequence id. A cursor walks the category tables one after another,
//! is finite, and cannot be rewound.

use std::collections::VecDeque;

use rusqlite::params_from_iter;
use rusqlite::types::Value;

use crate::error::StoreResult;
use crate::types::{BlockPos, ChangeEvent, EventCategory, Scope, Window};

use super::store::{select_columns, EventStore, RawEvent};

/// Predicate for a range query
///
/// Bounds only apply to spatial categories; when bounds are set, inventory
/// rows are never returned.
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub world: Option<String>,
    /// Inclusive, normalized (min, max)
    pub bounds: Option<(BlockPos, BlockPos)>,
    pub actors: Vec<String>,
    /// Inclusive lower time bound
    pub since: i64,
    /// Exclusive upper time bound
    pub until: Option<i64>,
    pub categories: Vec<EventCategory>,
    /// `Some(flag)` keeps only rows with that rolled-back flag
    pub rolled_back: Option<bool>,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            world: None,
            bounds: None,
            actors: Vec::new(),
            since: i64::MIN,
            until: None,
            categories: EventCategory::ALL.to_vec(),
            rolled_back: None,
        }
    }
}

impl EventFilter {
    /// Filter matching a rollback scope over a window
    pub fn from_scope(scope: &Scope, window: Window) -> Self {
        Self {
            world: scope.region.as_ref().map(|r| r.world.clone()),
            bounds: scope.region.as_ref().map(|r| (r.min, r.max)),
            actors: scope.actors.clone(),
            since: window.start,
            until: Some(window.end),
            categories: scope.effective_categories(),
            rolled_back: None,
        }
    }

    /// Keep only rows whose rolled-back flag equals `flag`
    pub fn rolled_back(mut self, flag: bool) -> Self {
        self.rolled_back = Some(flag);
        self
    }

    fn applies_to(&self, category: EventCategory) -> bool {
        self.categories.contains(&category) && (category.is_spatial() || self.bounds.is_none())
    }

    /// WHERE clause and its parameters for one category, after `after_id`
    fn where_clause(&self, category: EventCategory, after_id: i64) -> (String, Vec<Value>) {
        let mut clauses = vec!["id > ?".to_string(), "time >= ?".to_string()];
        let mut values = vec![Value::Integer(after_id), Value::Integer(self.since)];

        if let Some(until) = self.until {
            clauses.push("time < ?".to_string());
            values.push(Value::Integer(until));
        }
        if let Some(world) = &self.world {
            clauses.push("world = ?".to_string());
            values.push(Value::Text(world.clone()));
        }
        if let (Some((min, max)), true) = (self.bounds, category.is_spatial()) {
            clauses.push("x BETWEEN ? AND ? AND y BETWEEN ? AND ? AND z BETWEEN ? AND ?".to_string());
            values.extend(
                [min.x, max.x, min.y, max.y, min.z, max.z]
                    .into_iter()
                    .map(|v| Value::Integer(v as i64)),
            );
        }
        if !self.actors.is_empty() {
            clauses.push(format!(
                "actor_id IN ({})",
                vec!["?"; self.actors.len()].join(", ")
            ));
            values.extend(self.actors.iter().cloned().map(Value::Text));
        }
        if let Some(flag) = self.rolled_back {
            clauses.push("rolled_back = ?".to_string());
            values.push(Value::Integer(flag as i64));
        }

        (clauses.join(" AND "), values)
    }
}

/// Streaming result of a range query
///
/// Yields `Err` at most once; after an error the cursor is finished.
pub struct RegionCursor<'a> {
    store: &'a EventStore,
    filter: EventFilter,
    pending: VecDeque<EventCategory>,
    current: Option<EventCategory>,
    last_id: i64,
    page: VecDeque<ChangeEvent>,
    page_size: usize,
    failed: bool,
    pages_fetched: usize,
}

impl<'a> RegionCursor<'a> {
    fn new(store: &'a EventStore, filter: EventFilter) -> Self {
        let pending = EventCategory::ALL
            .into_iter()
            .filter(|c| filter.applies_to(*c))
            .collect();
        Self {
            store,
            filter,
            pending,
            current: None,
            last_id: 0,
            page: VecDeque::new(),
            page_size: store.page_size(),
            failed: false,
            pages_fetched: 0,
        }
    }

    /// Override the page size (mostly for tests)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Pages fetched from the database so far
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    fn fetch_page(&mut self, category: EventCategory) -> StoreResult<usize> {
        let (clause, mut values) = self.filter.where_clause(category, self.last_id);
        values.push(Value::Integer(self.page_size as i64));
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY id LIMIT ?",
            select_columns(category),
            category.table(),
            clause
        );

        let raws = self.store.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let raws = stmt
                .query_map(params_from_iter(values.iter()), RawEvent::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(raws)
        })?;
        self.pages_fetched += 1;

        let fetched = raws.len();
        if let Some(last) = raws.last() {
            self.last_id = last.id();
        }
        for raw in raws {
            self.page.push_back(raw.decode()?);
        }
        Ok(fetched)
    }
}

impl Iterator for RegionCursor<'_> {
    type Item = StoreResult<ChangeEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.page.pop_front() {
                return Some(Ok(event));
            }
            if self.failed {
                return None;
            }

            let category = match self.current {
                Some(category) => category,
                None => {
                    let next = self.pending.pop_front()?;
                    self.current = Some(next);
                    self.last_id = 0;
                    next
                }
            };

            match self.fetch_page(category) {
                Ok(fetched) if fetched < self.page_size => self.current = None,
                Ok(_) => {}
                Err(e) => {
                    self.failed = true;
                    self.page.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}

impl EventStore {
    /// Stream events matching `filter`, one page at a time
    pub fn query(&self, filter: EventFilter) -> RegionCursor<'_> {
        RegionCursor::new(self, filter)
    }

    /// Block and container events inside `[min, max]` of `world` since `since`
    pub fn query_by_region(&self, world: &str, min: BlockPos, max: BlockPos, since: i64) -> RegionCursor<'_> {
        self.query(EventFilter {
            world: Some(world.to_string()),
            bounds: Some((min.min(max), min.max(max))),
            since,
            ..Default::default()
        })
    }
}
