use log::{debug, error, info};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;

use twitchbot_core::backend::config::load_config;
use twitchbot_core::backend::twitch::{
    check_token, classify, timeout_duration, ProtocolEvent, Result, TwitchApi,
};

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config.toml: {}", e);
            std::process::exit(1);
        }
    };

    let api = match TwitchApi::from_config(&config) {
        Ok(api) => api,
        Err(e) => {
            error!("Failed to set up the Twitch API client: {}", e);
            std::process::exit(1);
        }
    };

    let token_info = api.validate_token().await;
    let login = check_token(&token_info, &config.twitch.client_id);
    info!("Reading chat lines from stdin as {}", login);

    if let Err(e) = read_line_feed().await {
        error!("Chat line feed failed: {}", e);
        std::process::exit(1);
    }

    info!("Chat line feed closed");
}

async fn read_line_feed() -> Result<()> {
    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());

    while let Some(line) = lines.next().await {
        let line = line?;
        let line = line.trim_end_matches('\r');

        match classify(line) {
            Some(event) => log_event(&event),
            None => debug!("Ignoring line: {}", line),
        }
    }

    Ok(())
}

fn log_event(event: &ProtocolEvent) {
    let channel = event.channel().unwrap_or("-");
    let sender = event.sender().unwrap_or("-");

    match event {
        ProtocolEvent::PrivateMessage { tags, content, .. } => {
            let display_name = tags.get("display-name").unwrap_or_else(|| sender.to_string());
            info!("[#{}] {}: {}", channel, display_name, content);

            let mentions = event.mentions();
            if !mentions.is_empty() {
                info!("[#{}] {} mentioned {:?}", channel, sender, mentions);
            }
        }
        ProtocolEvent::Whisper {
            receiver, content, ..
        } => {
            info!("[whisper] {} -> {}: {}", sender, receiver, content);
        }
        ProtocolEvent::Notice { content, .. } => {
            let content = content.as_deref().unwrap_or_default();
            match timeout_duration(content) {
                Some(seconds) => info!("[#{}] timeout for {} seconds: {}", channel, seconds, content),
                None => info!("[#{}] notice: {}", channel, content),
            }
        }
        _ => {
            debug!(
                "[#{}] {} from {} {:?}",
                channel,
                event.kind(),
                sender,
                event.content()
            );
        }
    }
}
