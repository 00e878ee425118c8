// tests/unit/fan_out_tests.rs

use crate::common::memory_source::InMemoryDataSource;
use crate::common::test_data::{fixed_now, MarketplaceSeed, PaymentSeed};
use admin_backend::domain::{review_model, transaction_model, user_model};
use admin_backend::error::AppError;
use admin_backend::repository::metric_query::MetricQuery;
use admin_backend::service::dashboard_service::DashboardMetricsAggregator;
use admin_backend::service::fan_out_runner::{FanOutRunner, QueryBatch};
use admin_backend::config::AnalyticsConfig;
use std::sync::Arc;

#[tokio::test]
async fn test_batch_results_are_keyed_by_name() {
    let seed = MarketplaceSeed::new();
    seed.user("Aiko", "FREELANCER", "ACTIVE", fixed_now(), None);
    seed.user("Ben", "CLIENT", "ACTIVE", fixed_now(), None);
    seed.payment(PaymentSeed {
        amount: 120.0,
        ..Default::default()
    });
    seed.payment(PaymentSeed {
        amount: 80.0,
        ..Default::default()
    });

    let runner = FanOutRunner::new(seed.source.clone(), 2);
    let batch = QueryBatch::new("test")
        .add("users", MetricQuery::count(user_model::Entity))
        .add(
            "freelancers",
            MetricQuery::count(user_model::Entity).eq(user_model::Column::Role, "FREELANCER"),
        )
        .add(
            "revenue",
            MetricQuery::sum(transaction_model::Entity, transaction_model::Column::Amount),
        );

    let bag = runner.run(batch).await.unwrap();

    assert_eq!(bag.len(), 3);
    assert_eq!(bag.count("users").unwrap(), 2);
    assert_eq!(bag.count("freelancers").unwrap(), 1);
    assert_eq!(bag.number("revenue").unwrap(), 200.0);
    assert_eq!(seed.source.executed(), 3);
}

#[tokio::test]
async fn test_one_failing_query_fails_the_whole_batch() {
    let source = Arc::new(InMemoryDataSource::new());
    source.fail_on(review_model::Entity);

    let runner = FanOutRunner::new(source.clone(), 4);
    let batch = QueryBatch::new("test")
        .add("users", MetricQuery::count(user_model::Entity))
        .add(
            "rating",
            MetricQuery::average(review_model::Entity, review_model::Column::Rating),
        );

    let result = runner.run(batch).await;
    assert!(matches!(result, Err(AppError::DataSourceUnavailable(_))));
}

#[tokio::test]
async fn test_invalid_query_is_rejected_before_any_dispatch() {
    let source = Arc::new(InMemoryDataSource::new());
    let runner = FanOutRunner::new(source.clone(), 4);

    let mut broken = MetricQuery::sum(transaction_model::Entity, transaction_model::Column::Amount);
    broken.field = None;
    let batch = QueryBatch::new("test")
        .add("users", MetricQuery::count(user_model::Entity))
        .add("broken", broken);

    let result = runner.run(batch).await;

    assert!(matches!(result, Err(AppError::InvalidQuery(_))));
    assert_eq!(source.executed(), 0);
}

#[tokio::test]
async fn test_snapshot_has_no_partial_result_when_a_step_fails() {
    let seed = MarketplaceSeed::new();
    seed.user("Aiko", "FREELANCER", "ACTIVE", fixed_now(), None);
    seed.source.fail_on(review_model::Entity);

    let runner = FanOutRunner::new(seed.source.clone(), 4);
    let aggregator = DashboardMetricsAggregator::new(runner, AnalyticsConfig::default());

    let result = aggregator.snapshot_at(fixed_now()).await;
    assert!(matches!(result, Err(AppError::DataSourceUnavailable(_))));
}
