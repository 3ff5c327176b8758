//! Echo bot example: command handlers, a timer, and reconnect logging.
//!
//! Usage:
//!   cargo run --example echo_bot -- --server irc.libera.chat --port 6697 --tls \
//!     --channel "#hearth-test"
//!
//! Commands:
//!   !echo <text>   repeat text back where it was said
//!   {nick}: uptime how long the bot has been running

use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use hearth_core::{ConnectionEvent, ConnectionHandler, IrcBot, IrcConfig, MessageHandler};

#[derive(Parser)]
#[command(name = "echo-bot", about = "Hearth echo bot example")]
struct Args {
    #[arg(long, default_value = "irc.libera.chat")]
    server: String,
    #[arg(long, default_value_t = 6667)]
    port: u16,
    #[arg(long, default_value = "echobot")]
    nick: String,
    #[arg(long, default_value = "#hearth-test")]
    channel: String,
    #[arg(long)]
    tls: bool,
    /// Post a heartbeat to the channel every N minutes.
    #[arg(long)]
    heartbeat_mins: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = IrcConfig {
        server: args.server,
        port: args.port,
        nick: args.nick.clone(),
        username: args.nick,
        channel: args.channel,
        tls: args.tls,
        quit_message: "echo bot signing off".into(),
        ..IrcConfig::default()
    };

    let echo = MessageHandler::new(r"^!echo\s+(?P<text>.+)$", |writer, response| {
        if let Some(caps) = response.captures() {
            writer.send_message(&caps["text"], response.channel());
        }
        Ok(())
    })?;

    let started = Instant::now();
    let uptime = MessageHandler::new(r"^{%nick%}:?\s+uptime$", move |writer, response| {
        let secs = started.elapsed().as_secs();
        let text = format!("up {}h {}m", secs / 3600, secs % 3600 / 60);
        writer.send_message(&text, response.channel());
        Ok(())
    })?;

    let lifecycle = ConnectionHandler::new(|_, event| {
        if let ConnectionEvent::Reconnecting { attempt, delay } = event {
            tracing::warn!(attempt, delay_secs = delay.as_secs(), "Lost the server");
        }
        Ok(())
    });

    let bot = IrcBot::new(
        config,
        vec![Box::new(echo), Box::new(uptime), Box::new(lifecycle)],
    )?;

    if let Some(mins) = args.heartbeat_mins {
        bot.scheduler()
            .schedule_recurring_event(Duration::from_secs(mins * 60), |writer| {
                writer.send_command_to_channel("still here");
                Ok(())
            });
    }

    bot.run_until(tokio::signal::ctrl_c()).await?;
    Ok(())
}
