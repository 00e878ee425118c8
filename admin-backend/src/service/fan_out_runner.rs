// src/service/fan_out_runner.rs

use crate::error::{AppError, AppResult};
use crate::repository::data_source::DataSource;
use crate::repository::metric_query::{GroupRow, MetricQuery, MetricValue, Record};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// 名前付きクエリの集合。同名で追加すると置き換わる
#[derive(Debug, Clone)]
pub struct QueryBatch {
    label: String,
    queries: BTreeMap<String, MetricQuery>,
}

impl QueryBatch {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            queries: BTreeMap::new(),
        }
    }

    pub fn add(mut self, name: impl Into<String>, query: MetricQuery) -> Self {
        self.queries.insert(name.into(), query);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, query: MetricQuery) {
        self.queries.insert(name.into(), query);
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

/// バッチの実行結果（クエリ名 → 値）
#[derive(Debug, Clone, Default)]
pub struct MetricBag {
    values: HashMap<String, MetricValue>,
}

impl MetricBag {
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn lookup(&self, name: &str) -> AppResult<&MetricValue> {
        self.values
            .get(name)
            .ok_or_else(|| AppError::InvalidQuery(format!("metric '{}' is not in the bag", name)))
    }

    fn wrong_shape(name: &str, expected: &str) -> AppError {
        AppError::InvalidQuery(format!("metric '{}' is not a {}", name, expected))
    }

    pub fn number(&self, name: &str) -> AppResult<f64> {
        match self.lookup(name)? {
            MetricValue::Number(v) => Ok(*v),
            _ => Err(Self::wrong_shape(name, "number")),
        }
    }

    pub fn count(&self, name: &str) -> AppResult<u64> {
        self.number(name).map(|v| v.max(0.0) as u64)
    }

    pub fn groups(&self, name: &str) -> AppResult<&[GroupRow]> {
        match self.lookup(name)? {
            MetricValue::Groups(rows) => Ok(rows),
            _ => Err(Self::wrong_shape(name, "group list")),
        }
    }

    pub fn records(&self, name: &str) -> AppResult<&[Record]> {
        match self.lookup(name)? {
            MetricValue::Records(rows) => Ok(rows),
            _ => Err(Self::wrong_shape(name, "record list")),
        }
    }
}

/// 独立したクエリ群を並行実行し、すべて成功した場合のみ結果を返す
#[derive(Clone)]
pub struct FanOutRunner {
    source: Arc<dyn DataSource>,
    max_concurrent: usize,
}

impl FanOutRunner {
    pub fn new(source: Arc<dyn DataSource>, max_concurrent: usize) -> Self {
        Self {
            source,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// バッチを実行する。
    ///
    /// 全クエリの形式チェックを先に行い、1つでも不正なら I/O を行わずに失敗する。
    /// 実行中にいずれかが失敗した場合は残りのタスクを中断してそのエラーを返す。
    pub async fn run(&self, batch: QueryBatch) -> AppResult<MetricBag> {
        for (name, query) in &batch.queries {
            query.validate().map_err(|e| {
                warn!(batch = %batch.label, query = %name, error = %e, "Rejected invalid metric query");
                e
            })?;
        }

        if batch.is_empty() {
            return Ok(MetricBag::default());
        }

        let started = Instant::now();
        let size = batch.len();
        let label = batch.label;
        debug!(batch = %label, size = size, "Dispatching metric batch");

        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for (name, query) in batch.queries {
            let source = Arc::clone(&self.source);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| AppError::InternalServerError(format!("semaphore closed: {}", e)))?;
                let value = source.execute(&query).await?;
                Ok::<_, AppError>((name, value))
            });
        }

        let mut values = HashMap::with_capacity(size);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok((name, value))) => {
                    values.insert(name, value);
                }
                Ok(Err(e)) => {
                    tasks.abort_all();
                    warn!(batch = %label, error = %e, "Metric batch failed");
                    return Err(e);
                }
                Err(join_error) => {
                    tasks.abort_all();
                    warn!(batch = %label, error = %join_error, "Metric task did not complete");
                    return Err(AppError::InternalServerError(format!(
                        "metric task in batch '{}' did not complete: {}",
                        label, join_error
                    )));
                }
            }
        }

        debug!(
            batch = %label,
            size = size,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Metric batch completed"
        );

        Ok(MetricBag { values })
    }
}
