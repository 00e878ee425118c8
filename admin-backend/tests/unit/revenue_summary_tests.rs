// tests/unit/revenue_summary_tests.rs

use crate::common::app_helper::analytics_service;
use crate::common::test_data::{fixed_now, MarketplaceSeed, PaymentSeed};
use chrono::Duration;
use std::io;
use std::sync::{Arc, Mutex};

/// ログ出力を取り込むバッファ
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_revenue_summary_splits_today_from_total() {
    let now = fixed_now();
    let seed = MarketplaceSeed::new();
    seed.payment(PaymentSeed {
        amount: 2000.0,
        created_at: now - Duration::hours(1),
        ..Default::default()
    });
    seed.payment(PaymentSeed {
        amount: 1000.0,
        created_at: now - Duration::days(1),
        ..Default::default()
    });

    let summary = analytics_service(seed.source.clone())
        .revenue_summary_at(now)
        .await
        .unwrap();

    assert_eq!(summary.today_revenue, 2000.0);
    assert_eq!(summary.total_revenue, 3000.0);
}

#[tokio::test]
async fn test_revenue_operations_log_start_and_completion() {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let service = analytics_service(MarketplaceSeed::new().source);
    service.today_revenue().await.unwrap();
    service.total_revenue().await.unwrap();
    service.revenue_summary().await.unwrap();

    let output = buffer.contents();
    assert!(output.contains("Summing today's revenue"));
    assert!(output.contains("Summing total revenue"));
    assert!(output.contains("Building revenue summary"));
    assert_eq!(output.matches("Admin analytics completed").count(), 3);
    for operation in ["today_revenue", "total_revenue", "revenue_summary"] {
        assert!(
            output.matches(operation).count() >= 2,
            "missing start or completion line for {}",
            operation
        );
    }
}
