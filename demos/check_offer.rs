use peer_protocol::prelude::*;
use std::time::Duration;

#[tokio::main]
async fn main() -> ProtocolResult<()> {
    // An in-process overlay with two nodes
    let network = MemoryNetwork::new();
    network.set_latency(Duration::from_millis(50));
    let maker_address = NodeAddress::new("maker", 9999);
    let taker = network.join(NodeAddress::new("taker", 9998));
    let maker = network.join(maker_address.clone());

    // The maker answers availability requests for its open offers
    let responder = OfferAvailabilityResponder::new(maker);
    responder.add_offer(Offer::with_state(
        "OFFER-1",
        maker_address.clone(),
        OfferState::Available,
    ));
    let stopper = responder.spawn();

    // The taker checks the offer and is told about the result through the handlers
    let offer = Offer::new("OFFER-1", maker_address);
    let model = OfferAvailabilityModel::new(offer.clone(), taker.clone());
    let config = ProtocolConfig::default();
    let (handle, join_handle) = ProtocolController::new(OfferAvailabilityProtocol, model, config)
        .on_result(|| println!("offer checked"))
        .on_error(|e| println!("offer check failed: {}", e))
        .spawn()?;

    handle.start()?;
    let outcome = join_handle.await?;
    assert_eq!(outcome, ProtocolOutcome::Completed);
    assert_eq!(offer.state(), OfferState::Available);

    // Once the offer is taken, the same check reports it as not available
    responder.remove_offer("OFFER-1");
    let state = check_offer_availability(offer.clone(), taker, ProtocolConfig::default()).await?;
    assert_eq!(state, OfferState::NotAvailable);
    println!("{}", offer.error_message().unwrap_or_default());

    stopper.stop().await?;
    Ok(())
}
