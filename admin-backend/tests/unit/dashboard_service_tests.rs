// tests/unit/dashboard_service_tests.rs

use crate::common::test_data::{fixed_now, MarketplaceSeed, PaymentSeed, ProjectSeed};
use admin_backend::config::AnalyticsConfig;
use admin_backend::service::dashboard_service::DashboardMetricsAggregator;
use admin_backend::service::fan_out_runner::FanOutRunner;
use chrono::{Duration, TimeZone, Utc};

fn aggregator(seed: &MarketplaceSeed) -> DashboardMetricsAggregator {
    DashboardMetricsAggregator::new(
        FanOutRunner::new(seed.source.clone(), 4),
        AnalyticsConfig::default(),
    )
}

#[tokio::test]
async fn test_dashboard_snapshot_over_seeded_marketplace() {
    let now = fixed_now();
    let seed = MarketplaceSeed::new();

    // Arrange: ユーザー
    let veteran = seed.user(
        "Aiko",
        "FREELANCER",
        "ACTIVE",
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Some(now - Duration::minutes(5)),
    );
    let newcomer = seed.user(
        "Ben",
        "FREELANCER",
        "ACTIVE",
        Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        Some(now - Duration::hours(2)),
    );
    let client = seed.user(
        "Chika",
        "CLIENT",
        "ACTIVE",
        now - Duration::hours(3),
        Some(now - Duration::minutes(1)),
    );

    // カテゴリとサービス
    let design = seed.category("Design", None, 1);
    let development = seed.category("Development", None, 2);
    let logo = seed.service(veteran, design);
    let web = seed.service(newcomer, development);

    // 案件: 完了1件、進行中2件
    let finished = seed.project(ProjectSeed {
        client,
        freelancer: Some(veteran),
        service: Some(logo),
        category: Some(design),
        budget: 1000.0,
        status: "COMPLETED",
        created_at: now - Duration::days(10),
    });
    seed.project(ProjectSeed {
        client,
        freelancer: Some(newcomer),
        service: Some(web),
        category: Some(development),
        budget: 500.0,
        status: "IN_PROGRESS",
        created_at: now - Duration::days(5),
    });
    seed.project(ProjectSeed {
        client,
        freelancer: Some(veteran),
        service: Some(web),
        category: Some(development),
        budget: 300.0,
        status: "ACCEPTED",
        created_at: now - Duration::days(2),
    });

    seed.review(finished, veteran, 4);
    seed.review(finished, veteran, 5);

    seed.activity(Some(client), "USER_REGISTERED", "user", now - Duration::hours(3));
    seed.activity(Some(client), "PROJECT_CREATED", "project", now - Duration::hours(1));
    seed.activity(None, "NIGHTLY_REINDEX", "system", now - Duration::minutes(30));

    // Act
    let snapshot = aggregator(&seed).snapshot_at(now).await.unwrap();

    // Assert: リアルタイム
    let stats = &snapshot.real_time_stats;
    assert_eq!(stats.online_users, 2);
    assert_eq!(stats.active_projects, 2);
    assert_eq!(stats.today_revenue, 0.0);
    assert_eq!(stats.today_registrations, 1);

    // KPI
    let kpis = &snapshot.kpis;
    assert_eq!(kpis.average_project_value, 1000.0);
    assert_eq!(kpis.customer_satisfaction, 90.0);
    assert_eq!(kpis.freelancer_retention_rate, 50.0);
    assert_eq!(kpis.payment_success_rate, 0.0);

    // 新しい順、未登録のアクションはコードのまま
    let actions: Vec<&str> = snapshot
        .recent_activity
        .iter()
        .map(|a| a.action.as_str())
        .collect();
    assert_eq!(
        actions,
        vec!["NIGHTLY_REINDEX", "PROJECT_CREATED", "USER_REGISTERED"]
    );
    assert_eq!(snapshot.recent_activity[0].description, "NIGHTLY_REINDEX");
    assert_eq!(snapshot.recent_activity[2].description, "New user registered");

    // 登録の古い順
    assert_eq!(snapshot.top_freelancers.len(), 2);
    let top = &snapshot.top_freelancers[0];
    assert_eq!(top.id, veteran);
    assert_eq!(top.name, "Aiko Tester");
    assert_eq!(top.completed_projects, 1);
    assert_eq!(top.total_earnings, 1000.0);
    assert_eq!(top.average_rating, 4.5);
    assert_eq!(snapshot.top_freelancers[1].average_rating, 0.0);

    // 進行中案件数の降順
    let popular = &snapshot.popular_categories;
    assert_eq!(popular.len(), 2);
    assert_eq!(popular[0].id, development);
    assert_eq!(popular[0].active_projects, 2);
    assert_eq!(popular[0].service_count, 1);
    assert_eq!(popular[1].id, design);
    assert_eq!(popular[1].active_projects, 0);

    assert_eq!(snapshot.generated_at, now);
}

#[tokio::test]
async fn test_kpis_from_ratings_and_payments() {
    let now = fixed_now();
    let seed = MarketplaceSeed::new();
    let freelancer = seed.user("Aiko", "FREELANCER", "ACTIVE", now, None);
    let project = seed.project(ProjectSeed {
        freelancer: Some(freelancer),
        budget: 200.0,
        status: "IN_PROGRESS",
        ..Default::default()
    });
    for rating in [5, 4, 4, 4] {
        seed.review(project, freelancer, rating);
    }

    let kpis = aggregator(&seed).kpis(now).await.unwrap();
    // 平均 4.25 → 85%
    assert_eq!(kpis.customer_satisfaction, 85.0);
    assert_eq!(kpis.payment_success_rate, 0.0);
    assert_eq!(kpis.freelancer_retention_rate, 0.0);

    for status in ["COMPLETED", "COMPLETED", "COMPLETED", "FAILED"] {
        seed.payment(PaymentSeed {
            amount: 50.0,
            status,
            ..Default::default()
        });
    }
    // 返金は決済の母数に含めない
    seed.payment(PaymentSeed {
        amount: 50.0,
        transaction_type: "REFUND",
        status: "FAILED",
        ..Default::default()
    });

    let kpis = aggregator(&seed).kpis(now).await.unwrap();
    assert_eq!(kpis.payment_success_rate, 75.0);
}

#[tokio::test]
async fn test_today_revenue_counts_only_completed_payments_since_midnight() {
    let now = fixed_now();
    let seed = MarketplaceSeed::new();
    let midnight = Utc.with_ymd_and_hms(2025, 6, 15, 0, 0, 0).unwrap();

    seed.payment(PaymentSeed {
        amount: 2000.0,
        created_at: midnight,
        ..Default::default()
    });
    seed.payment(PaymentSeed {
        amount: 1000.0,
        created_at: midnight - Duration::seconds(1),
        ..Default::default()
    });
    seed.payment(PaymentSeed {
        amount: 700.0,
        status: "PENDING",
        created_at: now,
        ..Default::default()
    });

    let stats = aggregator(&seed).real_time_stats(now).await.unwrap();
    assert_eq!(stats.today_revenue, 2000.0);
}

#[tokio::test]
async fn test_platform_metrics_monthly_buckets_and_top_categories() {
    let now = fixed_now();
    let seed = MarketplaceSeed::new();

    seed.user("Aiko", "FREELANCER", "ACTIVE", now, None);
    seed.user("Ben", "FREELANCER", "SUSPENDED", now, None);
    seed.user("Chika", "CLIENT", "ACTIVE", now, None);

    let design = seed.category("Design", None, 1);
    let writing = seed.category("Writing", None, 2);
    for _ in 0..3 {
        seed.project(ProjectSeed {
            category: Some(writing),
            ..Default::default()
        });
    }
    seed.project(ProjectSeed {
        category: Some(design),
        ..Default::default()
    });

    seed.payment(PaymentSeed {
        amount: 400.0,
        created_at: now - Duration::days(3),
        ..Default::default()
    });
    seed.payment(PaymentSeed {
        amount: 250.0,
        created_at: now - Duration::days(200),
        ..Default::default()
    });

    let metrics = aggregator(&seed).platform_metrics_at(now).await.unwrap();

    assert_eq!(metrics.total_freelancers, 2);
    assert_eq!(metrics.active_freelancers, 1);
    assert_eq!(metrics.total_clients, 1);
    assert_eq!(metrics.active_clients, 1);

    assert_eq!(metrics.top_categories.len(), 2);
    assert_eq!(metrics.top_categories[0].name, "Writing");
    assert_eq!(metrics.top_categories[0].project_count, 3);
    assert_eq!(metrics.top_categories[1].name, "Design");

    assert_eq!(metrics.monthly_revenue.len(), 12);
    let total: f64 = metrics.monthly_revenue.iter().map(|p| p.value).sum();
    assert_eq!(total, 650.0);
    assert_eq!(metrics.monthly_revenue.last().unwrap().value, 400.0);
    assert_eq!(metrics.monthly_revenue.last().unwrap().period_end, now);
}

#[tokio::test]
async fn test_monthly_revenue_on_leap_day_has_twelve_buckets() {
    let now = Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap();
    let seed = MarketplaceSeed::new();
    seed.payment(PaymentSeed {
        amount: 120.0,
        created_at: now - Duration::hours(6),
        ..Default::default()
    });

    let metrics = aggregator(&seed).platform_metrics_at(now).await.unwrap();

    assert_eq!(metrics.monthly_revenue.len(), 12);
    let last = metrics.monthly_revenue.last().unwrap();
    assert_eq!(last.period_start, Utc.with_ymd_and_hms(2024, 1, 29, 12, 0, 0).unwrap());
    assert_eq!(last.period_end, now);
    assert_eq!(last.value, 120.0);
}
