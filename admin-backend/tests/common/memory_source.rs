// tests/common/memory_source.rs

//! シード済みレコードに対して MetricQuery を評価するインメモリのデータソース

use admin_backend::error::{AppError, AppResult};
use admin_backend::repository::data_source::DataSource;
use admin_backend::repository::metric_query::{
    FieldValue, GroupRow, MetricKind, MetricQuery, MetricValue, Record, SortDirection,
};
use async_trait::async_trait;
use sea_orm::EntityName;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryDataSource {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    failing: Mutex<HashSet<String>>,
    executed: AtomicUsize,
}

// NULL は PostgreSQL の昇順と同じく最後に並べる
fn compare_nullable(a: &FieldValue, b: &FieldValue) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
    }
}

fn compare_keys(a: &[Option<String>], b: &[Option<String>]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ordering = match (x, y) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => x.cmp(y),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

impl InMemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<E: EntityName>(&self, entity: E, record: Record) {
        self.tables
            .lock()
            .unwrap()
            .entry(entity.table_name().to_string())
            .or_default()
            .push(record);
    }

    /// 指定テーブルへのクエリを DataSourceUnavailable で失敗させる
    pub fn fail_on<E: EntityName>(&self, entity: E) {
        self.failing
            .lock()
            .unwrap()
            .insert(entity.table_name().to_string());
    }

    /// 実行されたクエリ数（検証で弾かれたものは含まない）
    pub fn executed(&self) -> usize {
        self.executed.load(AtomicOrdering::SeqCst)
    }

    fn matching(&self, query: &MetricQuery) -> Vec<Record> {
        let tables = self.tables.lock().unwrap();
        tables
            .get(&query.entity)
            .map(|rows| {
                rows.iter()
                    .filter(|row| {
                        query
                            .predicate
                            .iter()
                            .all(|filter| filter.matches(row.value(&filter.field)))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn numbers(query: &MetricQuery, rows: &[Record]) -> Vec<f64> {
        let Some(field) = query.field.as_deref() else {
            return Vec::new();
        };
        rows.iter()
            .filter_map(|row| row.value(field).as_f64())
            .collect()
    }

    fn group(query: &MetricQuery, rows: Vec<Record>) -> Vec<GroupRow> {
        let mut groups: Vec<(Vec<Option<String>>, Vec<Record>)> = Vec::new();
        for row in rows {
            let keys: Vec<Option<String>> = query
                .group_keys
                .iter()
                .map(|key| row.value(key).to_key())
                .collect();
            match groups.iter_mut().find(|(k, _)| *k == keys) {
                Some((_, members)) => members.push(row),
                None => groups.push((keys, vec![row])),
            }
        }
        groups.sort_by(|a, b| compare_keys(&a.0, &b.0));

        groups
            .into_iter()
            .map(|(keys, members)| {
                let count = members.len() as u64;
                let value = if query.field.is_some() {
                    Self::numbers(query, &members).iter().sum()
                } else {
                    count as f64
                };
                GroupRow { keys, count, value }
            })
            .collect()
    }

    fn select(query: &MetricQuery, mut rows: Vec<Record>) -> Vec<Record> {
        rows.sort_by(|a, b| {
            for (field, direction) in &query.order_by {
                let ordering = compare_nullable(a.value(field), b.value(field));
                let ordering = match direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        if let Some(limit) = query.limit {
            rows.truncate(limit as usize);
        }

        rows.into_iter()
            .map(|row| {
                let mut projected = Record::new();
                for column in &query.columns {
                    projected.insert(column.name.clone(), row.value(&column.name).clone());
                }
                projected
            })
            .collect()
    }
}

#[async_trait]
impl DataSource for InMemoryDataSource {
    async fn execute(&self, query: &MetricQuery) -> AppResult<MetricValue> {
        query.validate()?;
        self.executed.fetch_add(1, AtomicOrdering::SeqCst);

        if self.failing.lock().unwrap().contains(&query.entity) {
            return Err(AppError::DataSourceUnavailable(format!(
                "{} is unreachable",
                query.entity
            )));
        }

        let rows = self.matching(query);
        let value = match query.kind {
            MetricKind::Count => MetricValue::Number(rows.len() as f64),
            MetricKind::Sum => MetricValue::Number(Self::numbers(query, &rows).iter().sum()),
            MetricKind::Average => {
                let numbers = Self::numbers(query, &rows);
                if numbers.is_empty() {
                    MetricValue::Number(0.0)
                } else {
                    MetricValue::Number(numbers.iter().sum::<f64>() / numbers.len() as f64)
                }
            }
            MetricKind::GroupBy => MetricValue::Groups(Self::group(query, rows)),
            MetricKind::Select => MetricValue::Records(Self::select(query, rows)),
        };
        Ok(value)
    }
}
