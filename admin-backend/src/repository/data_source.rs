// src/repository/data_source.rs

use crate::error::AppResult;
use crate::repository::metric_query::{
    FieldType, FieldValue, Filter, FilterOp, GroupRow, MetricKind, MetricQuery, MetricValue,
    Record, SortDirection,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{
    Alias, Asterisk, Cond, Expr, Func, Order, Query, SelectStatement, SimpleExpr,
};
use sea_orm::{ConnectionTrait, DatabaseConnection, QueryResult};
use tracing::debug;
use uuid::Uuid;

const COUNT_ALIAS: &str = "count";
const VALUE_ALIAS: &str = "value";

/// 集計クエリの実行先
///
/// 実装は `validate()` を通らないクエリを `InvalidQuery` で拒否し、
/// 接続や実行の失敗は `DataSourceUnavailable` として返す。
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn execute(&self, query: &MetricQuery) -> AppResult<MetricValue>;
}

/// PostgreSQL に対して sea-query で SQL を組み立てて実行するデータソース
#[derive(Clone)]
pub struct SeaOrmDataSource {
    db: DatabaseConnection,
}

impl SeaOrmDataSource {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn filter_expr(filter: &Filter) -> SimpleExpr {
        let col = Expr::col(Alias::new(filter.field.as_str()));
        match &filter.op {
            FilterOp::Eq(v) => col.eq(v.to_db_value()),
            FilterOp::Ne(v) => col.ne(v.to_db_value()),
            FilterOp::Gt(v) => col.gt(v.to_db_value()),
            FilterOp::Gte(v) => col.gte(v.to_db_value()),
            FilterOp::Lt(v) => col.lt(v.to_db_value()),
            FilterOp::Lte(v) => col.lte(v.to_db_value()),
            FilterOp::In(values) => col.is_in(values.iter().map(FieldValue::to_db_value)),
            FilterOp::IsNull => col.is_null(),
            FilterOp::IsNotNull => col.is_not_null(),
        }
    }

    fn as_double(expr: impl Into<SimpleExpr>) -> SimpleExpr {
        Func::cast_as(expr, Alias::new("DOUBLE PRECISION")).into()
    }

    fn build_select(query: &MetricQuery) -> SelectStatement {
        let mut select = Query::select();
        select.from(Alias::new(query.entity.as_str()));

        let mut cond = Cond::all();
        for filter in &query.predicate {
            cond = cond.add(Self::filter_expr(filter));
        }
        select.cond_where(cond);

        let field = query.field.as_deref().map(Alias::new);

        match query.kind {
            MetricKind::Count => {
                select.expr_as(Func::count(Expr::col(Asterisk)), Alias::new(COUNT_ALIAS));
            }
            MetricKind::Sum => {
                if let Some(field) = field {
                    select.expr_as(
                        Self::as_double(Func::sum(Expr::col(field))),
                        Alias::new(VALUE_ALIAS),
                    );
                }
            }
            MetricKind::Average => {
                if let Some(field) = field {
                    select.expr_as(
                        Self::as_double(Func::avg(Expr::col(field))),
                        Alias::new(VALUE_ALIAS),
                    );
                }
            }
            MetricKind::GroupBy => {
                for (i, key) in query.group_keys.iter().enumerate() {
                    select.expr_as(
                        Func::cast_as(Expr::col(Alias::new(key.as_str())), Alias::new("TEXT")),
                        Alias::new(format!("key_{}", i)),
                    );
                    select.group_by_col(Alias::new(key.as_str()));
                    select.order_by(Alias::new(key.as_str()), Order::Asc);
                }
                select.expr_as(Func::count(Expr::col(Asterisk)), Alias::new(COUNT_ALIAS));
                if let Some(field) = field {
                    select.expr_as(
                        Self::as_double(Func::sum(Expr::col(field))),
                        Alias::new(VALUE_ALIAS),
                    );
                }
            }
            MetricKind::Select => {
                for column in &query.columns {
                    let name = Alias::new(column.name.as_str());
                    match column.ty {
                        FieldType::Int => {
                            select.expr_as(
                                Func::cast_as(Expr::col(name.clone()), Alias::new("BIGINT")),
                                name,
                            );
                        }
                        FieldType::Float => {
                            select.expr_as(Self::as_double(Expr::col(name.clone())), name);
                        }
                        _ => {
                            select.column(name);
                        }
                    }
                }
                for (field, direction) in &query.order_by {
                    let order = match direction {
                        SortDirection::Asc => Order::Asc,
                        SortDirection::Desc => Order::Desc,
                    };
                    select.order_by(Alias::new(field.as_str()), order);
                }
                if let Some(limit) = query.limit {
                    select.limit(limit);
                }
            }
        }

        select
    }

    fn decode_groups(query: &MetricQuery, rows: Vec<QueryResult>) -> AppResult<Vec<GroupRow>> {
        let mut groups = Vec::with_capacity(rows.len());
        for row in rows {
            let mut keys = Vec::with_capacity(query.group_keys.len());
            for i in 0..query.group_keys.len() {
                keys.push(row.try_get::<Option<String>>("", &format!("key_{}", i))?);
            }
            let count = row.try_get::<i64>("", COUNT_ALIAS)?.max(0) as u64;
            let value = if query.field.is_some() {
                row.try_get::<Option<f64>>("", VALUE_ALIAS)?.unwrap_or(0.0)
            } else {
                count as f64
            };
            groups.push(GroupRow { keys, count, value });
        }
        Ok(groups)
    }

    fn decode_records(query: &MetricQuery, rows: Vec<QueryResult>) -> AppResult<Vec<Record>> {
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record = Record::new();
            for column in &query.columns {
                let name = column.name.as_str();
                let value: FieldValue = match column.ty {
                    FieldType::Uuid => row.try_get::<Option<Uuid>>("", name)?.into(),
                    FieldType::Text => row.try_get::<Option<String>>("", name)?.into(),
                    FieldType::Int => row.try_get::<Option<i64>>("", name)?.into(),
                    FieldType::Float => row.try_get::<Option<f64>>("", name)?.into(),
                    FieldType::Bool => row.try_get::<Option<bool>>("", name)?.into(),
                    FieldType::Timestamp => {
                        row.try_get::<Option<DateTime<Utc>>>("", name)?.into()
                    }
                };
                record.insert(name, value);
            }
            records.push(record);
        }
        Ok(records)
    }
}

#[async_trait]
impl DataSource for SeaOrmDataSource {
    async fn execute(&self, query: &MetricQuery) -> AppResult<MetricValue> {
        query.validate()?;

        let select = Self::build_select(query);
        let statement = self.db.get_database_backend().build(&select);
        debug!(
            entity = %query.entity,
            kind = ?query.kind,
            sql = %statement,
            "Executing metric query"
        );

        let rows = self.db.query_all(statement).await?;

        let value = match query.kind {
            MetricKind::Count => {
                let count = match rows.first() {
                    Some(row) => row.try_get::<i64>("", COUNT_ALIAS)?,
                    None => 0,
                };
                MetricValue::Number(count as f64)
            }
            MetricKind::Sum | MetricKind::Average => {
                let value = match rows.first() {
                    Some(row) => row.try_get::<Option<f64>>("", VALUE_ALIAS)?,
                    None => None,
                };
                MetricValue::Number(value.unwrap_or(0.0))
            }
            MetricKind::GroupBy => MetricValue::Groups(Self::decode_groups(query, rows)?),
            MetricKind::Select => MetricValue::Records(Self::decode_records(query, rows)?),
        };

        Ok(value)
    }
}
