use std::sync::Arc;
use std::time::Duration;

use psmon::prelude::*;
use psmon_mem::InMemoryPubSub;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let pubsub = InMemoryPubSub::new();
    pubsub.add_topic("orders").await;
    pubsub.add_pull_subscription("orders-audit", "orders").await;

    let (sink, mut events) = ChannelEventSink::new();
    let service = MonitorService::new(
        Arc::new(pubsub.clone()),
        Arc::new(sink),
        MonitorConfig::default(),
    );

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{:<22} {}", event.name(), event.payload());
        }
    });

    service.refresh_resources().await;
    let started = service.start_topic_monitor("orders", None).await?;
    log::info!("Tailing 'orders' through '{}'", started.subscription_id);

    for i in 1..=3 {
        pubsub
            .publish_text("orders", &format!("order #{i} placed"))
            .await?;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    for message in service
        .get_buffered_messages(&started.subscription_id)
        .await?
    {
        println!("buffered {} -> {}", message.id, message.data_as_text());
    }

    service.shutdown().await;
    drop(service);
    let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;
    Ok(())
}
