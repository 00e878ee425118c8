// tests/integration/postgres_analytics_tests.rs

//! 実際の PostgreSQL に対する集計の結合テスト

use crate::common::app_helper::analytics_service;
use crate::common::db::TestDatabase;
use crate::common::init_test_env;
use admin_backend::domain::{
    activity_log_model, category_model, project_model, review_model, service_model,
    transaction_model, user_model,
};
use admin_backend::repository::data_source::SeaOrmDataSource;
use admin_backend::service::admin_analytics_service::{AdminAnalyticsService, AnalyticsRange};
use admin_backend::service::period_calculator::start_of_day;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveModelBehavior, ActiveModelTrait, DatabaseConnection, Set};
use std::sync::Arc;
use uuid::Uuid;

fn service_for(db: &TestDatabase) -> AdminAnalyticsService {
    analytics_service(Arc::new(SeaOrmDataSource::new(db.connection.clone())))
}

async fn insert_user(db: &DatabaseConnection, first_name: &str, role: &str) -> user_model::Model {
    user_model::ActiveModel {
        email: Set(format!("{}@example.com", first_name.to_lowercase())),
        first_name: Set(first_name.to_string()),
        last_name: Set("Tester".to_string()),
        role: Set(role.to_string()),
        last_login_at: Set(Some(Utc::now())),
        ..user_model::ActiveModel::new()
    }
    .insert(db)
    .await
    .unwrap()
}

async fn insert_category(
    db: &DatabaseConnection,
    name: &str,
    parent_id: Option<Uuid>,
    display_order: i32,
) -> category_model::Model {
    category_model::ActiveModel {
        name: Set(name.to_string()),
        slug: Set(name.to_lowercase()),
        parent_id: Set(parent_id),
        display_order: Set(display_order),
        ..category_model::ActiveModel::new()
    }
    .insert(db)
    .await
    .unwrap()
}

async fn insert_service(db: &DatabaseConnection, freelancer_id: Uuid, category_id: Uuid) {
    service_model::ActiveModel {
        freelancer_id: Set(freelancer_id),
        category_id: Set(category_id),
        title: Set("Service".to_string()),
        price: Set(100.0),
        ..service_model::ActiveModel::new()
    }
    .insert(db)
    .await
    .unwrap();
}

async fn insert_payment(
    db: &DatabaseConnection,
    payer_id: Uuid,
    project_id: Option<Uuid>,
    amount: f64,
    transaction_type: &str,
    status: &str,
    created_at: DateTime<Utc>,
) {
    transaction_model::ActiveModel {
        project_id: Set(project_id),
        payer_id: Set(payer_id),
        amount: Set(amount),
        transaction_type: Set(transaction_type.to_string()),
        status: Set(status.to_string()),
        payment_method: Set("card".to_string()),
        created_at: Set(created_at),
        ..transaction_model::ActiveModel::new()
    }
    .insert(db)
    .await
    .unwrap();
}

#[tokio::test]
async fn test_revenue_summary_on_postgres() {
    init_test_env();
    let db = TestDatabase::new().await;
    let client = insert_user(&db.connection, "Chika", "CLIENT").await;
    let now = Utc::now();

    insert_payment(&db.connection, client.id, None, 2000.0, "PAYMENT", "COMPLETED", now).await;
    insert_payment(
        &db.connection,
        client.id,
        None,
        1000.0,
        "PAYMENT",
        "COMPLETED",
        start_of_day(now) - Duration::hours(1),
    )
    .await;
    insert_payment(&db.connection, client.id, None, 500.0, "PAYMENT", "FAILED", now).await;
    insert_payment(&db.connection, client.id, None, 300.0, "REFUND", "COMPLETED", now).await;

    let service = service_for(&db);

    let summary = service.revenue_summary().await.unwrap();
    assert_eq!(summary.today_revenue, 2000.0);
    assert_eq!(summary.total_revenue, 3000.0);

    assert_eq!(service.today_revenue().await.unwrap(), 2000.0);
    assert_eq!(service.total_revenue().await.unwrap(), 3000.0);
}

#[tokio::test]
async fn test_category_hierarchy_on_postgres() {
    init_test_env();
    let db = TestDatabase::new().await;
    let freelancer = insert_user(&db.connection, "Aiko", "FREELANCER").await;

    let design = insert_category(&db.connection, "Design", None, 2).await;
    let development = insert_category(&db.connection, "Development", None, 1).await;
    let web = insert_category(&db.connection, "Web", Some(development.id), 1).await;
    let mobile = insert_category(&db.connection, "Mobile", Some(development.id), 1).await;
    insert_category(&db.connection, "Frontend", Some(web.id), 1).await;

    for _ in 0..3 {
        insert_service(&db.connection, freelancer.id, web.id).await;
    }
    for _ in 0..5 {
        insert_service(&db.connection, freelancer.id, mobile.id).await;
    }

    let tree = service_for(&db).category_hierarchy().await.unwrap();

    assert_eq!(tree.len(), 2);
    assert_eq!(tree[0].id, development.id);
    assert_eq!(tree[1].id, design.id);
    assert_eq!(tree[0].children[0].name, "Mobile");
    assert_eq!(tree[0].children[0].service_count, 5);
    assert_eq!(tree[0].children[1].name, "Web");
    assert_eq!(tree[0].children[1].service_count, 3);
    assert_eq!(tree[0].children[1].children[0].name, "Frontend");
    assert!(tree[0].children[1].children[0].is_active);
}

#[tokio::test]
async fn test_dashboard_and_period_analytics_on_postgres() {
    init_test_env();
    let db = TestDatabase::new().await;
    let conn = &db.connection;

    let freelancer = insert_user(conn, "Aiko", "FREELANCER").await;
    let client = insert_user(conn, "Chika", "CLIENT").await;
    let design = insert_category(conn, "Design", None, 1).await;
    insert_service(conn, freelancer.id, design.id).await;

    let project = project_model::ActiveModel {
        client_id: Set(client.id),
        freelancer_id: Set(Some(freelancer.id)),
        category_id: Set(Some(design.id)),
        title: Set("Logo".to_string()),
        budget: Set(800.0),
        status: Set("COMPLETED".to_string()),
        completed_at: Set(Some(Utc::now())),
        ..project_model::ActiveModel::new()
    }
    .insert(conn)
    .await
    .unwrap();

    for rating in [4, 5] {
        review_model::ActiveModel {
            project_id: Set(project.id),
            reviewer_id: Set(client.id),
            reviewee_id: Set(freelancer.id),
            rating: Set(rating),
            ..review_model::ActiveModel::new()
        }
        .insert(conn)
        .await
        .unwrap();
    }

    transaction_model::ActiveModel {
        project_id: Set(Some(project.id)),
        payer_id: Set(client.id),
        payee_id: Set(Some(freelancer.id)),
        amount: Set(800.0),
        status: Set("COMPLETED".to_string()),
        payment_method: Set("card".to_string()),
        ..transaction_model::ActiveModel::new()
    }
    .insert(conn)
    .await
    .unwrap();

    activity_log_model::ActiveModel {
        user_id: Set(Some(client.id)),
        action: Set("PROJECT_COMPLETED".to_string()),
        entity_type: Set("project".to_string()),
        entity_id: Set(Some(project.id)),
        ..activity_log_model::ActiveModel::new()
    }
    .insert(conn)
    .await
    .unwrap();

    let service = service_for(&db);

    // ダッシュボード
    let snapshot = service.dashboard_metrics().await.unwrap();
    assert_eq!(snapshot.real_time_stats.online_users, 2);
    assert_eq!(snapshot.real_time_stats.today_revenue, 800.0);
    assert_eq!(snapshot.kpis.customer_satisfaction, 90.0);
    assert_eq!(snapshot.kpis.payment_success_rate, 100.0);
    assert_eq!(snapshot.kpis.freelancer_retention_rate, 100.0);
    assert_eq!(snapshot.recent_activity[0].description, "Project completed");
    assert_eq!(snapshot.top_freelancers[0].name, freelancer.display_name());
    assert_eq!(snapshot.top_freelancers[0].average_rating, 4.5);
    assert_eq!(snapshot.popular_categories[0].service_count, 1);

    // プラットフォーム指標
    let platform = service.platform_metrics().await.unwrap();
    assert_eq!(platform.top_categories[0].name, "Design");
    assert_eq!(platform.monthly_revenue.last().unwrap().value, 800.0);

    // 期間分析（既定の12か月）
    let revenue = service
        .revenue_analytics(AnalyticsRange::default())
        .await
        .unwrap();
    assert_eq!(revenue.total_revenue, 800.0);
    assert_eq!(revenue.by_category[0].label, "Design");
    assert_eq!(revenue.top_freelancers[0].id, freelancer.id);

    let projects = service
        .project_analytics(AnalyticsRange::default())
        .await
        .unwrap();
    assert_eq!(projects.total_projects, 1);
    assert_eq!(projects.completion_rate, 100.0);

    let users = service
        .user_analytics(AnalyticsRange::default())
        .await
        .unwrap();
    assert_eq!(users.total_new_users, 2);

    let performance = service.category_performance(design.id).await.unwrap();
    assert_eq!(performance.revenue, 800.0);
    assert_eq!(performance.completed_projects, 1);
}
