//! Command dispatch and output

use std::time::Duration;

use anyhow::Result;

use crate::client::{ApiReply, DockwatchClient};
use crate::{CheckTarget, Cli, Commands};

pub(crate) async fn run(cli: Cli) -> Result<i32> {
    let client = DockwatchClient::new(cli.server.as_str(), Duration::from_secs(cli.timeout));

    let reply = match &cli.command {
        Commands::Check(args) => match &args.target {
            CheckTarget::Image { image_name } => client.check_image(image_name).await,
            CheckTarget::Container { container_id } => client.check_container(container_id).await,
        },
        Commands::Monitor(args) => client.monitor(&args.container_id, args.action()).await,
        Commands::History(args) => client.history(&args.image_name, args.id.as_deref()).await,
    };

    match reply {
        Ok(reply) => {
            print_reply(&reply)?;
            Ok(reply.exit_code())
        }
        Err(e) => {
            eprintln!("Error: {e}");
            Ok(e.exit_code())
        }
    }
}

fn print_reply(reply: &ApiReply) -> Result<()> {
    let rendered = serde_json::to_string_pretty(&reply.body)?;
    if reply.status.is_success() {
        println!("{rendered}");
    } else {
        eprintln!("Server responded with {}", reply.status);
        println!("{rendered}");
    }
    Ok(())
}
