// src/cli.rs
use chrono::Utc;
use log::{info, warn};
use structopt::StructOpt;

use crate::application::service::{NotificationCard, NotificationCenter};
use crate::config::Settings;
use crate::core::platform::container::identity::{Identity, Role};
use crate::core::platform::container::notification::NotificationId;
use crate::error::PipelineError;

#[derive(StructOpt, Debug)]
#[structopt(name = "civic-notify", about = "Realtime notification client")]
pub struct Cli {
    /// Configuration file; layered config and APP__ variables are used when absent
    #[structopt(short, long)]
    pub config: Option<String>,

    /// User id of the signed-in identity
    #[structopt(short, long)]
    pub user: String,

    /// citizen, volunteer, ngo or admin
    #[structopt(short, long, default_value = "citizen")]
    pub role: Role,

    #[structopt(subcommand)]
    pub command: Command,
}

#[derive(StructOpt, Debug, PartialEq)]
pub enum Command {
    /// Stay connected and print notifications as they arrive
    Watch,
    /// Print the current notification list
    List,
    /// Mark one notification, or all of them, as read
    MarkRead {
        id: Option<String>,
        #[structopt(long, conflicts_with = "id")]
        all: bool,
    },
    /// Send an announcement to everyone (admin only)
    Broadcast {
        #[structopt(short, long)]
        title: String,
        #[structopt(short, long)]
        message: String,
    },
}

impl Cli {
    pub fn identity(&self) -> Identity {
        Identity::new(self.user.clone(), self.role)
    }

    pub fn settings(&self) -> Result<Settings, PipelineError> {
        match &self.config {
            Some(path) => Settings::load_from_file(path),
            None => Ok(Settings::new()?),
        }
    }
}

pub fn render_card(card: &NotificationCard) -> String {
    format!(
        "{} {:<14} {} - {} ({}) [{}]",
        if card.record.is_read { " " } else { "*" },
        card.presentation.icon.name(),
        card.record.title,
        card.record.message,
        card.relative_time,
        card.record.id,
    )
}

pub fn unread_summary(derived: usize, server: Option<u64>) -> String {
    match server {
        Some(server) if server as usize != derived => format!("{} unread (server reports {})", derived, server),
        _ => format!("{} unread", derived),
    }
}

fn print_cards(center: &NotificationCenter) {
    for card in center.cards(Utc::now()) {
        println!("{}", render_card(&card));
    }
    println!("{}", unread_summary(center.unread_count(), None));
}

async fn list(center: &NotificationCenter) {
    for card in center.cards(Utc::now()) {
        println!("{}", render_card(&card));
    }
    let server = match center.server_unread_count().await {
        Ok(count) => Some(count),
        Err(e) => {
            warn!("Server unread count unavailable: {}", e);
            None
        }
    };
    println!("{}", unread_summary(center.unread_count(), server));
}

pub async fn run(cli: Cli) -> Result<(), PipelineError> {
    let settings = cli.settings()?;
    let center = NotificationCenter::from_settings(&settings)?;
    let identity = cli.identity();

    let result = match cli.command {
        Command::Watch => watch(&center, identity).await,
        Command::List => {
            center.sign_in(identity).await?;
            list(&center).await;
            Ok(())
        }
        Command::MarkRead { id, all } => {
            center.sign_in(identity).await?;
            if all {
                let summary = center.mark_all_read().await?;
                println!("{} marked read, {} failed", summary.confirmed + summary.local_only, summary.failed);
                summary.into_result().map(|_| ()).map_err(PipelineError::from)
            } else if let Some(id) = id {
                let outcome = center.mark_read(&NotificationId::new(id)).await?;
                println!("{:?}", outcome);
                Ok(())
            } else {
                Err(PipelineError::Configuration("mark-read needs an id or --all".to_string()))
            }
        }
        Command::Broadcast { title, message } => {
            center.sign_in(identity).await?;
            center.send_broadcast(&title, &message).await
        }
    };

    center.sign_out().await;
    result
}

async fn watch(center: &NotificationCenter, identity: Identity) -> Result<(), PipelineError> {
    if let Err(e) = center.sign_in(identity).await {
        eprintln!("Initial fetch failed, waiting for live notifications: {}", e);
    }
    print_cards(center);

    let mut changes = center.store().subscribe();
    let mut connection = center.watch_connection();
    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                println!();
                print_cards(center);
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *connection.borrow_and_update();
                info!("Connection state: {:?}", state);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}
