use ansi_term::Colour::{Green, Red, Yellow};
use clap::Parser;
use peer_protocol::prelude::*;
use peer_protocol::protocol::validate_id;
use serde::Serialize;
use std::time::Duration;

pub const MAKER_PORT: u16 = 9999;
pub const TAKER_PORT: u16 = 9998;

/// Runs a taker checking an offer against a simulated maker on the in-memory overlay.
#[derive(Parser)]
#[command(
    version = "1.0",
    author = "Felix Watts",
    about = "Check the availability of an offer on a simulated overlay."
)]
struct Cli {
    #[arg(long, default_value = "OFFER-1")]
    offer_id: String,
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
    #[arg(long, default_value_t = 100)]
    latency_ms: u64,
    /// The maker node is offline
    #[arg(long)]
    offline: bool,
    /// The maker never receives the request
    #[arg(long)]
    silent: bool,
    /// The maker's offer is already taken
    #[arg(long)]
    taken: bool,
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report {
    offer_id: String,
    outcome: ProtocolOutcome,
    offer_state: OfferState,
    error_message: Option<String>,
    elapsed_ms: u128,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        println!("{}", Red.paint(e.to_string()));
        std::process::exit(1);
    }
}

async fn run() -> ProtocolResult<()> {
    let cli = Cli::parse();

    validate_id(&cli.offer_id)?;
    let config = ProtocolConfig::with_timeout(Duration::from_secs(cli.timeout_secs));

    let maker_address = NodeAddress::new("maker", MAKER_PORT);
    let taker_address = NodeAddress::new("taker", TAKER_PORT);

    let network = MemoryNetwork::new();
    network.set_latency(Duration::from_millis(cli.latency_ms));
    let taker = network.join(taker_address);
    let maker = network.join(maker_address.clone());

    let responder = OfferAvailabilityResponder::new(maker);
    let maker_state = if cli.taken { OfferState::Removed } else { OfferState::Available };
    responder.add_offer(Offer::with_state(
        cli.offer_id.clone(),
        maker_address.clone(),
        maker_state,
    ));
    let stopper = responder.spawn();

    network.set_online(&maker_address, !cli.offline);
    network.set_dropping(&maker_address, cli.silent);

    let offer = Offer::new(cli.offer_id.clone(), maker_address);
    let model = OfferAvailabilityModel::new(offer.clone(), taker);

    let start = tokio::time::Instant::now();
    let (handle, join_handle) =
        ProtocolController::new(OfferAvailabilityProtocol, model, config).spawn()?;
    handle.start()?;
    let outcome = join_handle.await?;
    let elapsed_ms = start.elapsed().as_millis();

    stopper.stop().await?;

    let report = Report {
        offer_id: cli.offer_id,
        outcome,
        offer_state: offer.state(),
        error_message: offer.error_message(),
        elapsed_ms,
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &Report) {
    let error_message = report.error_message.clone().unwrap_or_default();
    match &report.outcome {
        ProtocolOutcome::Completed if report.offer_state == OfferState::Available => {
            println!("{} {} is available", Green.paint("AVAILABLE"), &report.offer_id)
        }
        ProtocolOutcome::Completed => println!(
            "{} {}: {}",
            Yellow.paint("NOT AVAILABLE"),
            &report.offer_id,
            error_message
        ),
        ProtocolOutcome::Failed(e) => {
            println!("{} {}: {}", Red.paint("FAILED"), &report.offer_id, e)
        }
        ProtocolOutcome::Cancelled => {
            println!("{} {}", Yellow.paint("CANCELLED"), &report.offer_id)
        }
    }
    println!("offer state {:?} after {} ms", report.offer_state, report.elapsed_ms);
}
