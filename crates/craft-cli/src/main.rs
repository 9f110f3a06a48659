//! # craft
//!
//! Connects to a structure with its token, runs one operation and prints
//! the result. `watch` keeps the connection open and streams events until
//! interrupted.

#![deny(unsafe_code)]

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use craft_client::{Client, ClientEvent, MoveItem};
use craft_core::{Block, Location, Player, Token};

/// Command-line client for craft structures.
#[derive(Parser, Debug)]
#[command(name = "craft", about = "Control a craft structure from the command line")]
struct Cli {
    /// Structure token.
    #[arg(long, env = "CRAFT_TOKEN", hide_env_values = true)]
    token: String,

    #[command(subcommand)]
    command: Command,
}

/// Block coordinates relative to the structure.
#[derive(Args, Debug, Clone, Copy)]
struct Coords {
    #[arg(allow_negative_numbers = true)]
    x: i32,
    #[arg(allow_negative_numbers = true)]
    y: i32,
    #[arg(allow_negative_numbers = true)]
    z: i32,
}

impl From<Coords> for Location {
    fn from(c: Coords) -> Self {
        Location::new(c.x, c.y, c.z)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the structure size.
    Size,
    /// Print the structure origin.
    Location,
    /// Print the block at a location.
    Block(Coords),
    /// Replace the block at a location (air when omitted).
    SetBlock {
        #[command(flatten)]
        at: Coords,
        /// Block state, e.g. `minecraft:oak_stairs[facing=north]`.
        block: Option<String>,
    },
    /// List entities inside the structure.
    Entities,
    /// List the items of a container.
    Inventory(Coords),
    /// Move a stack between two containers.
    MoveItem {
        /// Source container as `x,y,z`.
        #[arg(value_parser = parse_location)]
        source: Location,
        /// Slot index in the source container.
        index: u32,
        /// Target container as `x,y,z`.
        #[arg(value_parser = parse_location)]
        target: Location,
        /// How many items to move.
        #[arg(long)]
        amount: Option<u32>,
    },
    /// Privately message a player.
    Tell {
        /// Player name or UUID.
        player: String,
        /// Message text.
        message: String,
    },
    /// Print fuel usage and API costs.
    Fuel,
    /// Watch locations and print events until interrupted.
    Watch {
        /// Locations as `x,y,z`.
        #[arg(value_parser = parse_location, required = true)]
        locations: Vec<Location>,
        /// Poll instead of watch.
        #[arg(long)]
        poll: bool,
    },
}

fn parse_location(s: &str) -> std::result::Result<Location, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [x, y, z] = parts.as_slice() else {
        return Err(format!("expected x,y,z, got '{s}'"));
    };
    let coord = |v: &str| v.parse::<i32>().map_err(|e| format!("'{v}': {e}"));
    Ok(Location::new(coord(x)?, coord(y)?, coord(z)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = craft_settings::get_settings();
    craft_core::logging::init_subscriber(&settings.log_level);

    let token = Token::parse(&cli.token).context("invalid structure token")?;
    info!(host = token.host(), location = %token.location(), "connecting");

    let client = Client::with_settings(settings.clone());
    client
        .connect(token)
        .await
        .context("failed to connect")?;

    let result = run(&client, cli.command).await;
    if client.is_connected() {
        if let Err(e) = client.disconnect().await {
            warn!(error = %e, "disconnect failed");
        }
    }
    result
}

async fn run(client: &Client, command: Command) -> Result<()> {
    match command {
        Command::Size => println!("{}", client.get_size().await?),
        Command::Location => println!("{}", client.get_location().await?),
        Command::Block(at) => println!("{}", client.get_block(at.into()).await?),
        Command::SetBlock { at, block } => {
            let block = block
                .map(|b| b.parse::<Block>())
                .transpose()
                .context("invalid block")?;
            client.set_block(at.into(), block.as_ref()).await?;
        }
        Command::Entities => {
            for entity in client.get_entities().await? {
                println!(
                    "{:<12} {:<20} {} ({:.1}/{:.1})",
                    entity.kind, entity.name, entity.position, entity.health, entity.max_health
                );
            }
        }
        Command::Inventory(at) => {
            for slot in client.get_inventory(at.into()).await? {
                let durability = slot
                    .item
                    .durability
                    .map(|d| format!(" [{}/{}]", d.current, d.max))
                    .unwrap_or_default();
                println!(
                    "{:>3}: {} x{}{durability}",
                    slot.index, slot.item.identifier, slot.item.amount
                );
            }
        }
        Command::MoveItem {
            source,
            index,
            target,
            amount,
        } => {
            client
                .move_item(MoveItem {
                    source,
                    index,
                    amount,
                    target,
                    target_index: None,
                })
                .await?;
        }
        Command::Tell { player, message } => {
            client.tell(&Player::named(player), &message).await?;
        }
        Command::Fuel => {
            let info = client.get_fuel_info().await?;
            for connection in &info.connections {
                println!("{} {}", connection.location, connection.structure);
                for (api, usage) in &connection.usage {
                    println!("  {api}: {:.2}/s {:.2}/min", usage.second, usage.minute);
                }
            }
            for strategy in &info.strategies {
                println!("strategy {}: {:.2} spare", strategy.strategy, strategy.spare_fuel);
            }
            for (api, cost) in &info.apis {
                println!("api {api}: {:.2} (base {:.2})", cost.current, cost.base);
            }
        }
        Command::Watch { locations, poll } => watch(client, &locations, poll).await?,
    }
    Ok(())
}

async fn watch(client: &Client, locations: &[Location], poll: bool) -> Result<()> {
    let mut events = client.events();
    for location in locations {
        if poll {
            client.poll(*location).await?;
        } else {
            client.watch(*location).await?;
        }
    }
    eprintln!("watching {} location(s), ctrl-c to stop", locations.len());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            event = events.recv() => match event {
                Some(ClientEvent::BlockUpdate(update)) => println!(
                    "{} {:?}: {} -> {}",
                    update.location, update.cause, update.old, update.block
                ),
                Some(ClientEvent::Transaction(tx)) => println!(
                    "transaction {} from {}: {} '{}'",
                    tx.nonce(), tx.player(), tx.amount(), tx.query()
                ),
                Some(ClientEvent::Error(e)) => warn!(error = %e, "connection error"),
                Some(ClientEvent::Close) | None => bail!("connection closed"),
                Some(ClientEvent::Open) => {}
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_location_accepts_negative() {
        assert_eq!(parse_location("1, -2,3"), Ok(Location::new(1, -2, 3)));
        assert!(parse_location("1,2").is_err());
        assert!(parse_location("a,b,c").is_err());
    }

    #[test]
    fn parses_set_block() {
        let cli = Cli::try_parse_from([
            "craft", "--token", "t", "set-block", "1", "-2", "3", "minecraft:stone",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::SetBlock { at: Coords { x: 1, y: -2, z: 3 }, block: Some(_) }
        ));
    }
}
