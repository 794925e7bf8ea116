//! Example wiring: a `Client` with an in-memory queue and a webhook
//! sender, driven from the command line.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use notifyhub_client::{Client, SendOptions};
use notifyhub_common::{Format, MessageBuilder, Priority, Target, TargetType};
use notifyhub_dispatch::context::DispatchContext;
use notifyhub_senders::{WebhookConfig, WebhookSender};

#[derive(Parser, Debug)]
#[command(name = "notifyhub-demo", about = "Send a notification through a locally wired NotifyHub client")]
struct Cli {
    #[arg(long, default_value = "NotifyHub demo")]
    title: String,

    #[arg(long, default_value = "hello from notifyhub-demo")]
    body: String,

    /// Webhook URL to deliver to. Also settable via WEBHOOK_URL in the
    /// environment or a local .env file.
    #[arg(long, env = "WEBHOOK_URL", default_value = "https://example.invalid/webhook")]
    webhook_url: String,

    /// Queue the send and wait on the returned handle instead of calling
    /// the dispatcher directly.
    #[arg(long)]
    r#async: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let sender = Arc::new(WebhookSender::new(
        "webhook",
        WebhookConfig {
            timeout: Duration::from_secs(10),
            ..Default::default()
        },
    )?);

    let client = Client::builder().register_sender(sender)?.build();
    client.start();

    let message = MessageBuilder::new()
        .title(cli.title)
        .body(cli.body)
        .priority(Priority::Normal)
        .format(Format::Text)
        .target(Target::new(TargetType::Webhook, cli.webhook_url)?)
        .build()?;

    let ctx = DispatchContext::with_timeout(Duration::from_secs(30));

    if cli.r#async {
        let handle = client.send_async(&ctx, message, SendOptions::default()).await?;
        tracing::info!(message_id = handle.message_id(), "queued for background dispatch");
        match handle.result().await {
            Ok(receipt) => tracing::info!(?receipt, "delivery finished"),
            Err(e) => tracing::error!(error = %e, "delivery failed"),
        }
    } else {
        match client.send(&ctx, &message).await {
            Ok(receipt) => tracing::info!(?receipt, "delivered"),
            Err(e) => tracing::error!(error = %e, "send failed"),
        }
    }

    let report = client.health(&ctx).await;
    tracing::info!(?report, "client health");

    client.close().await?;
    Ok(())
}
