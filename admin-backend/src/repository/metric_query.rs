// src/repository/metric_query.rs

//! 集計クエリの宣言的な定義
//!
//! `MetricQuery` はデータソースに対する1回分の読み取り（件数・合計・平均・グループ集計・
//! レコード取得）を表します。構築後は不変で、実行はデータソース実装に委ねます。

use crate::domain::period::Period;
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use sea_orm::{EntityName, IdenStatic};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use uuid::Uuid;

/// レコード取得時の列の型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldType {
    Uuid,
    Text,
    Int,
    Float,
    Bool,
    Timestamp,
}

/// 述語およびレコードで扱う値
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// グループキー用の文字列表現（NULL は None）
    pub fn to_key(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Bool(v) => Some(v.to_string()),
            FieldValue::Int(v) => Some(v.to_string()),
            FieldValue::Float(v) => Some(v.to_string()),
            FieldValue::Text(v) => Some(v.clone()),
            FieldValue::Uuid(v) => Some(v.to_string()),
            FieldValue::Timestamp(v) => Some(v.to_rfc3339()),
        }
    }

    /// sea-query のバインド値へ変換
    pub fn to_db_value(&self) -> sea_orm::Value {
        match self {
            FieldValue::Null => sea_orm::Value::String(None),
            FieldValue::Bool(v) => (*v).into(),
            FieldValue::Int(v) => (*v).into(),
            FieldValue::Float(v) => (*v).into(),
            FieldValue::Text(v) => v.clone().into(),
            FieldValue::Uuid(v) => (*v).into(),
            FieldValue::Timestamp(v) => (*v).into(),
        }
    }
}

// 数値同士は Int/Float を跨いで比較し、型の異なる値や NULL は比較不能とする
impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.partial_cmp(b),
            (FieldValue::Text(a), FieldValue::Text(b)) => a.partial_cmp(b),
            (FieldValue::Uuid(a), FieldValue::Uuid(b)) => a.partial_cmp(b),
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a.partial_cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<Uuid> for FieldValue {
    fn from(v: Uuid) -> Self {
        FieldValue::Uuid(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Null, Into::into)
    }
}

/// 述語の比較演算
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(FieldValue),
    Ne(FieldValue),
    Gt(FieldValue),
    Gte(FieldValue),
    Lt(FieldValue),
    Lte(FieldValue),
    In(Vec<FieldValue>),
    IsNull,
    IsNotNull,
}

/// 1つのフィールドに対する条件。述語内の条件はすべて AND で結合される
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
}

impl Filter {
    /// 値が条件を満たすか（SQL と同様に NULL との比較は偽）
    pub fn matches(&self, value: &FieldValue) -> bool {
        match &self.op {
            FilterOp::IsNull => value.is_null(),
            FilterOp::IsNotNull => !value.is_null(),
            _ if value.is_null() => false,
            FilterOp::Eq(expected) => value.partial_cmp(expected) == Some(Ordering::Equal),
            FilterOp::Ne(expected) => matches!(
                value.partial_cmp(expected),
                Some(Ordering::Less | Ordering::Greater)
            ),
            FilterOp::Gt(bound) => value.partial_cmp(bound) == Some(Ordering::Greater),
            FilterOp::Gte(bound) => matches!(
                value.partial_cmp(bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt(bound) => value.partial_cmp(bound) == Some(Ordering::Less),
            FilterOp::Lte(bound) => matches!(
                value.partial_cmp(bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::In(candidates) => candidates
                .iter()
                .any(|c| value.partial_cmp(c) == Some(Ordering::Equal)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetricKind {
    Count,
    Sum,
    Average,
    GroupBy,
    Select,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectColumn {
    pub name: String,
    pub ty: FieldType,
}

/// 集計クエリ
#[derive(Debug, Clone, PartialEq)]
pub struct MetricQuery {
    pub kind: MetricKind,
    pub entity: String,
    pub predicate: Vec<Filter>,
    /// sum/average の対象列。GroupBy では任意の合計対象列
    pub field: Option<String>,
    pub group_keys: Vec<String>,
    pub columns: Vec<SelectColumn>,
    pub order_by: Vec<(String, SortDirection)>,
    pub limit: Option<u64>,
}

impl MetricQuery {
    fn new<E: EntityName>(kind: MetricKind, entity: E) -> Self {
        Self {
            kind,
            entity: entity.table_name().to_string(),
            predicate: Vec::new(),
            field: None,
            group_keys: Vec::new(),
            columns: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn count<E: EntityName>(entity: E) -> Self {
        Self::new(MetricKind::Count, entity)
    }

    pub fn sum<E: EntityName, C: IdenStatic>(entity: E, field: C) -> Self {
        let mut query = Self::new(MetricKind::Sum, entity);
        query.field = Some(field.as_str().to_string());
        query
    }

    pub fn average<E: EntityName, C: IdenStatic>(entity: E, field: C) -> Self {
        let mut query = Self::new(MetricKind::Average, entity);
        query.field = Some(field.as_str().to_string());
        query
    }

    pub fn group_by<E, C, I>(entity: E, keys: I) -> Self
    where
        E: EntityName,
        C: IdenStatic,
        I: IntoIterator<Item = C>,
    {
        let mut query = Self::new(MetricKind::GroupBy, entity);
        query.group_keys = keys.into_iter().map(|k| k.as_str().to_string()).collect();
        query
    }

    pub fn select<E: EntityName>(entity: E) -> Self {
        Self::new(MetricKind::Select, entity)
    }

    // --- 述語ビルダー ---

    pub fn filter<C: IdenStatic>(mut self, field: C, op: FilterOp) -> Self {
        self.predicate.push(Filter {
            field: field.as_str().to_string(),
            op,
        });
        self
    }

    pub fn eq<C: IdenStatic, V: Into<FieldValue>>(self, field: C, value: V) -> Self {
        self.filter(field, FilterOp::Eq(value.into()))
    }

    pub fn is_in<C, V, I>(self, field: C, values: I) -> Self
    where
        C: IdenStatic,
        V: Into<FieldValue>,
        I: IntoIterator<Item = V>,
    {
        self.filter(
            field,
            FilterOp::In(values.into_iter().map(Into::into).collect()),
        )
    }

    /// field >= since
    pub fn since<C: IdenStatic>(self, field: C, since: DateTime<Utc>) -> Self {
        self.filter(field, FilterOp::Gte(since.into()))
    }

    /// 半開区間 [start, end) に収まる行に限定する
    pub fn within<C: IdenStatic>(self, field: C, period: &Period) -> Self {
        self.filter(field, FilterOp::Gte(period.start.into()))
            .filter(field, FilterOp::Lt(period.end.into()))
    }

    pub fn is_null<C: IdenStatic>(self, field: C) -> Self {
        self.filter(field, FilterOp::IsNull)
    }

    pub fn is_not_null<C: IdenStatic>(self, field: C) -> Self {
        self.filter(field, FilterOp::IsNotNull)
    }

    // --- GroupBy / Select ---

    /// GroupBy で各グループの合計を取る列
    pub fn value_field<C: IdenStatic>(mut self, field: C) -> Self {
        self.field = Some(field.as_str().to_string());
        self
    }

    pub fn column<C: IdenStatic>(mut self, field: C, ty: FieldType) -> Self {
        self.columns.push(SelectColumn {
            name: field.as_str().to_string(),
            ty,
        });
        self
    }

    pub fn order_by<C: IdenStatic>(mut self, field: C, direction: SortDirection) -> Self {
        self.order_by.push((field.as_str().to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// 述語と対象列を保ったまま平均に切り替える
    pub fn averaged(mut self) -> Self {
        self.kind = MetricKind::Average;
        self
    }

    /// 述語を保ったまま group-by に切り替える。対象列は各グループの合計に使われる
    pub fn grouped_by<C, I>(mut self, keys: I) -> Self
    where
        C: IdenStatic,
        I: IntoIterator<Item = C>,
    {
        self.kind = MetricKind::GroupBy;
        self.group_keys = keys.into_iter().map(|k| k.as_str().to_string()).collect();
        self
    }

    /// 実行前の形式チェック。I/O を伴わない
    pub fn validate(&self) -> AppResult<()> {
        if self.entity.is_empty() {
            return Err(AppError::InvalidQuery("entity must not be empty".to_string()));
        }

        match self.kind {
            MetricKind::Sum | MetricKind::Average if self.field.is_none() => {
                Err(AppError::InvalidQuery(format!(
                    "{:?} on {} requires a numeric field",
                    self.kind, self.entity
                )))
            }
            MetricKind::GroupBy if self.group_keys.is_empty() => Err(AppError::InvalidQuery(
                format!("GroupBy on {} requires at least one group key", self.entity),
            )),
            MetricKind::Select if self.columns.is_empty() => Err(AppError::InvalidQuery(
                format!("Select on {} requires at least one column", self.entity),
            )),
            _ => Ok(()),
        }
    }
}

/// グループ集計の1行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    pub keys: Vec<Option<String>>,
    pub count: u64,
    /// value_field 指定時はその合計、未指定時は件数
    pub value: f64,
}

impl GroupRow {
    pub fn key(&self, index: usize) -> Option<&str> {
        self.keys.get(index).and_then(|k| k.as_deref())
    }
}

/// Select で取得した1レコード（列名 → 値）
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Record(BTreeMap<String, FieldValue>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<C: IdenStatic, V: Into<FieldValue>>(mut self, field: C, value: V) -> Self {
        self.0.insert(field.as_str().to_string(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) {
        self.0.insert(field.into(), value);
    }

    /// 列が存在しない場合は NULL として扱う
    pub fn value(&self, field: &str) -> &FieldValue {
        self.0.get(field).unwrap_or(&FieldValue::Null)
    }

    fn missing<C: IdenStatic>(field: C, expected: &str) -> AppError {
        AppError::InvalidQuery(format!(
            "column {} is missing or not a {}",
            field.as_str(),
            expected
        ))
    }

    pub fn uuid<C: IdenStatic>(&self, field: C) -> AppResult<Uuid> {
        self.opt_uuid(field)?
            .ok_or_else(|| Self::missing(field, "uuid"))
    }

    pub fn opt_uuid<C: IdenStatic>(&self, field: C) -> AppResult<Option<Uuid>> {
        match self.value(field.as_str()) {
            FieldValue::Uuid(v) => Ok(Some(*v)),
            FieldValue::Null => Ok(None),
            _ => Err(Self::missing(field, "uuid")),
        }
    }

    pub fn text<C: IdenStatic>(&self, field: C) -> AppResult<String> {
        self.opt_text(field)?
            .ok_or_else(|| Self::missing(field, "text"))
    }

    pub fn opt_text<C: IdenStatic>(&self, field: C) -> AppResult<Option<String>> {
        match self.value(field.as_str()) {
            FieldValue::Text(v) => Ok(Some(v.clone())),
            FieldValue::Null => Ok(None),
            _ => Err(Self::missing(field, "text")),
        }
    }

    pub fn int<C: IdenStatic>(&self, field: C) -> AppResult<i64> {
        match self.value(field.as_str()) {
            FieldValue::Int(v) => Ok(*v),
            _ => Err(Self::missing(field, "integer")),
        }
    }

    pub fn boolean<C: IdenStatic>(&self, field: C) -> AppResult<bool> {
        match self.value(field.as_str()) {
            FieldValue::Bool(v) => Ok(*v),
            _ => Err(Self::missing(field, "boolean")),
        }
    }

    pub fn timestamp<C: IdenStatic>(&self, field: C) -> AppResult<DateTime<Utc>> {
        match self.value(field.as_str()) {
            FieldValue::Timestamp(v) => Ok(*v),
            _ => Err(Self::missing(field, "timestamp")),
        }
    }
}

/// 1クエリ分の解決済み結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MetricValue {
    Number(f64),
    Groups(Vec<GroupRow>),
    Records(Vec<Record>),
}
