//! Integration test: timeout-wrapped paper broker through the ports

use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use vigil_core::{BrokerOrderStatus, BrokerPosition, OrderRequest, Side};
use vigil_gateway::{PaperBroker, TimeoutBroker};
use vigil_ports::{Broker, QuoteSource};

#[tokio::test]
async fn test_stop_order_triggers_on_price_move() {
    let _ = env_logger::try_init();

    let paper = PaperBroker::new();
    paper.set_position(BrokerPosition::new("AAPL", dec!(10), dec!(150), dec!(150)));
    paper.set_price("AAPL", dec!(150));
    let broker: Arc<dyn Broker> =
        Arc::new(TimeoutBroker::new(paper.clone(), Duration::from_secs(1)));

    let stop = broker
        .submit_order(&OrderRequest::stop("AAPL", Side::Sell, dec!(10), dec!(142.5)))
        .await
        .unwrap();
    assert_eq!(stop.status, BrokerOrderStatus::Accepted);
    assert_eq!(paper.open_order_ids(), vec![stop.id.clone()]);

    paper.set_price("AAPL", dec!(142));

    let order = broker.get_order(&stop.id).await.unwrap();
    assert_eq!(order.status, BrokerOrderStatus::Filled);
    assert_eq!(order.filled_avg_price, Some(dec!(142)));
    assert!(broker.get_positions().await.unwrap().is_empty());
    assert_eq!(
        paper.get_latest_quote("AAPL").await.unwrap().reference_price(),
        Some(dec!(142))
    );
}
