use clap::Parser;
use color_eyre::Result;
use serial_hub::client::HubClient;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, Level};

/// Connects to a hub, prints every line it sends,
/// and forwards each line typed on stdin.
#[derive(Parser, Debug)]
struct Args {
    /// Server address.
    #[arg(short, long, default_value = "localhost")]
    address: String,

    /// Server port.
    #[arg(short, long, default_value_t = serial_hub::server::DEFAULT_PORT)]
    port: u16,
}

async fn run(args: Args) -> Result<()> {
    let client = HubClient::new(&args.address, args.port).await?;
    let (mut reader, mut writer) = client.into_split();

    info!(address = %args.address, port = args.port, "Connected");

    let mut printer = tokio::spawn(async move {
        while let Some(line) = reader.next_line().await {
            match line {
                Ok(line) => println!("{line}"),
                Err(e) => {
                    error!(?e, "Read problem");
                    break;
                }
            }
        }

        info!("Hub closed the connection");
    });

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = stdin.next_line() => match line? {
                Some(line) => writer.write_line(line).await?,
                None => break,
            },
            _ = &mut printer => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    printer.abort();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    serial_hub::logging::init(Level::INFO, None).await;

    let args = Args::parse();

    run(args).await
}
