// tests/unit/period_analytics_tests.rs

use crate::common::app_helper::analytics_service;
use crate::common::test_data::{fixed_now, MarketplaceSeed, PaymentSeed, ProjectSeed};
use admin_backend::domain::period::Granularity;
use admin_backend::error::AppError;
use admin_backend::service::admin_analytics_service::AnalyticsRange;
use chrono::{Duration, Months, TimeZone, Utc};

fn last_thirty_days(granularity: Option<Granularity>) -> AnalyticsRange {
    AnalyticsRange {
        start: Some(fixed_now() - Duration::days(30)),
        end: Some(fixed_now()),
        granularity,
        days: None,
    }
}

#[tokio::test]
async fn test_revenue_growth_against_preceding_period() {
    let now = fixed_now();
    let seed = MarketplaceSeed::new();

    let aiko = seed.user("Aiko", "FREELANCER", "ACTIVE", now - Duration::days(400), None);
    let ben = seed.user("Ben", "FREELANCER", "ACTIVE", now - Duration::days(400), None);
    let design = seed.category("Design", None, 1);
    let logo_project = seed.project(ProjectSeed {
        freelancer: Some(aiko),
        category: Some(design),
        budget: 100.0,
        status: "COMPLETED",
        created_at: now - Duration::days(20),
        ..Default::default()
    });

    seed.payment(PaymentSeed {
        project: Some(logo_project),
        payee: Some(aiko),
        amount: 100.0,
        created_at: now - Duration::days(5),
        ..Default::default()
    });
    seed.payment(PaymentSeed {
        payee: Some(ben),
        amount: 50.0,
        payment_method: "bank_transfer",
        created_at: now - Duration::days(12),
        ..Default::default()
    });
    // 比較期間
    seed.payment(PaymentSeed {
        amount: 100.0,
        created_at: now - Duration::days(40),
        ..Default::default()
    });
    // 未完了は集計しない
    seed.payment(PaymentSeed {
        amount: 999.0,
        status: "PENDING",
        created_at: now - Duration::days(1),
        ..Default::default()
    });

    let service = analytics_service(seed.source.clone());
    let analytics = service
        .revenue_analytics_at(last_thirty_days(Some(Granularity::Week)), now)
        .await
        .unwrap();

    assert_eq!(analytics.total_revenue, 150.0);
    assert_eq!(analytics.previous_revenue, 100.0);
    assert_eq!(analytics.growth_rate, 50.0);
    assert_eq!(analytics.average_transaction_value, 75.0);

    // 4週 + 2日
    assert_eq!(analytics.time_series.len(), 5);
    let series_total: f64 = analytics.time_series.iter().map(|p| p.value).sum();
    assert_eq!(series_total, 150.0);

    let methods: Vec<(&str, f64)> = analytics
        .by_payment_method
        .iter()
        .map(|e| (e.key.as_str(), e.value))
        .collect();
    assert_eq!(methods, vec![("card", 100.0), ("bank_transfer", 50.0)]);

    assert_eq!(analytics.by_category.len(), 2);
    assert_eq!(analytics.by_category[0].key, design.to_string());
    assert_eq!(analytics.by_category[0].label, "Design");
    assert_eq!(analytics.by_category[0].value, 100.0);
    assert_eq!(analytics.by_category[1].key, "unassigned");
    assert_eq!(analytics.by_category[1].label, "Uncategorized");

    assert_eq!(analytics.top_freelancers.len(), 2);
    assert_eq!(analytics.top_freelancers[0].id, aiko);
    assert_eq!(analytics.top_freelancers[0].name, "Aiko Tester");
    assert_eq!(analytics.top_freelancers[0].revenue, 100.0);
    assert_eq!(analytics.top_freelancers[1].id, ben);
}

#[tokio::test]
async fn test_growth_is_zero_without_previous_activity() {
    let now = fixed_now();
    let seed = MarketplaceSeed::new();
    seed.payment(PaymentSeed {
        amount: 80.0,
        created_at: now - Duration::days(3),
        ..Default::default()
    });

    let service = analytics_service(seed.source.clone());
    let analytics = service
        .revenue_analytics_at(last_thirty_days(None), now)
        .await
        .unwrap();

    assert_eq!(analytics.total_revenue, 80.0);
    assert_eq!(analytics.previous_revenue, 0.0);
    assert_eq!(analytics.growth_rate, 0.0);
    // 31日以内は日次
    assert_eq!(analytics.time_series.len(), 30);
}

#[tokio::test]
async fn test_user_analytics_breakdowns_and_daily_average() {
    let now = fixed_now();
    let seed = MarketplaceSeed::new();
    seed.user("Aiko", "FREELANCER", "ACTIVE", now - Duration::days(2), None);
    seed.user("Ben", "FREELANCER", "SUSPENDED", now - Duration::days(9), None);
    seed.user("Chika", "CLIENT", "ACTIVE", now - Duration::days(15), None);
    seed.user("Daichi", "CLIENT", "ACTIVE", now - Duration::days(35), None);
    seed.user("Emi", "CLIENT", "ACTIVE", now - Duration::days(50), None);

    let service = analytics_service(seed.source.clone());
    let analytics = service
        .user_analytics_at(last_thirty_days(Some(Granularity::Day)), now)
        .await
        .unwrap();

    assert_eq!(analytics.total_new_users, 3);
    assert_eq!(analytics.previous_new_users, 2);
    assert_eq!(analytics.growth_rate, 50.0);
    assert!((analytics.average_daily_registrations - 0.1).abs() < 1e-9);

    assert_eq!(analytics.by_role[0].key, "FREELANCER");
    assert_eq!(analytics.by_role[0].count, 2);
    assert_eq!(analytics.by_role[1].key, "CLIENT");
    assert_eq!(analytics.by_status[0].key, "ACTIVE");
    assert_eq!(analytics.by_status[0].value, 2.0);
}

#[tokio::test]
async fn test_project_analytics_completion_rate_and_categories() {
    let now = fixed_now();
    let seed = MarketplaceSeed::new();
    let writing = seed.category("Writing", None, 1);

    for (status, category, budget) in [
        ("COMPLETED", Some(writing), 400.0),
        ("IN_PROGRESS", Some(writing), 200.0),
        ("CANCELLED", None, 100.0),
        ("PENDING", Some(writing), 100.0),
    ] {
        seed.project(ProjectSeed {
            category,
            budget,
            status,
            created_at: now - Duration::days(4),
            ..Default::default()
        });
    }

    let service = analytics_service(seed.source.clone());
    let analytics = service
        .project_analytics_at(last_thirty_days(None), now)
        .await
        .unwrap();

    assert_eq!(analytics.total_projects, 4);
    assert_eq!(analytics.average_budget, 200.0);
    assert_eq!(analytics.completion_rate, 25.0);

    assert_eq!(analytics.by_category[0].label, "Writing");
    assert_eq!(analytics.by_category[0].count, 3);
    assert_eq!(analytics.by_category[1].label, "Uncategorized");
    assert_eq!(analytics.by_status.len(), 4);
}

#[tokio::test]
async fn test_default_window_spans_twelve_months() {
    let now = fixed_now();
    let seed = MarketplaceSeed::new();
    let service = analytics_service(seed.source.clone());

    let analytics = service
        .user_analytics_at(AnalyticsRange::default(), now)
        .await
        .unwrap();

    assert_eq!(analytics.period.current.end, now);
    assert_eq!(
        analytics.period.current.start,
        now.checked_sub_months(Months::new(12)).unwrap()
    );
    assert_eq!(analytics.period.previous.end, analytics.period.current.start);
    // 1年は月次
    assert_eq!(analytics.time_series.len(), 12);
}

#[tokio::test]
async fn test_reversed_range_is_invalid_period() {
    let now = fixed_now();
    let service = analytics_service(MarketplaceSeed::new().source);

    let range = AnalyticsRange {
        start: Some(now),
        end: Some(now - Duration::days(1)),
        ..Default::default()
    };
    let result = service.revenue_analytics_at(range, now).await;

    assert!(matches!(result, Err(AppError::InvalidPeriod(_))));
}

#[tokio::test]
async fn test_daily_series_over_decades_is_rejected_before_querying() {
    let now = fixed_now();
    let seed = MarketplaceSeed::new();
    let service = analytics_service(seed.source.clone());

    let range = AnalyticsRange {
        start: Some(Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap()),
        end: Some(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()),
        granularity: Some(Granularity::Day),
        days: None,
    };
    let result = service.user_analytics_at(range, now).await;

    assert!(matches!(result, Err(AppError::InvalidPeriod(_))));
    assert_eq!(seed.source.executed(), 0);
}

#[tokio::test]
async fn test_default_window_on_leap_day_spans_twelve_buckets() {
    let now = Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap();
    let seed = MarketplaceSeed::new();
    let service = analytics_service(seed.source.clone());

    let analytics = service
        .user_analytics_at(AnalyticsRange::default(), now)
        .await
        .unwrap();

    assert_eq!(analytics.time_series.len(), 12);
    assert_eq!(analytics.time_series[0].period_start, analytics.period.current.start);
    assert_eq!(analytics.time_series[11].period_end, now);
}
