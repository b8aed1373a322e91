//! Server command implementation

use anyhow::Result;
use tally_core::Config;

pub async fn cmd_serve(config: Config, host: &str, port: u16, no_auth: bool) -> Result<()> {
    println!("🚀 Starting Tally server...");
    println!("   Data directory: {}", config.data_dir().display());
    println!("   Listening: http://{}:{}", host, port);
    println!("   Webhook: http://{}:{}/telegram/webhook", host, port);

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else if !config.api_keys.is_empty() {
        println!(
            "   🔑 API keys: {} configured (TALLY_API_KEYS)",
            config.api_keys.len()
        );
    }
    if config.telegram.webhook_secret.is_some() {
        println!("   🔒 Webhook secret: set (TELEGRAM_WEBHOOK_SECRET)");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let server_config = tally_server::ServerConfig {
        require_auth: !no_auth,
        api_keys: config.api_keys.clone(),
        webhook_secret: config.telegram.webhook_secret.clone(),
    };

    tally_server::serve_with_config(config, host, port, server_config).await?;

    Ok(())
}
