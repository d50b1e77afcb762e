//! Handoff simulator.
//!
//! Runs one scenario against a real broker and a simulated runtime:
//! - `deliver`: the host is recreated while a request is in flight
//! - `recreate`: the launched screen is recreated before it loads
//! - `cancel`: the request is cancelled before it finishes

mod runtime;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use handoff_broker::{
	Broker, BrokerConfig, CancellationToken, Container, Continuation, CreationParams, LaunchRequest, LifecycleHub, Outcome, Owner, RequestOptions,
	SessionScope,
};
use serde_json::json;
use tracing::info;

use crate::runtime::{PickerScreen, SimRuntime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
	Deliver,
	Recreate,
	Cancel,
}

/// Simulator command line arguments.
#[derive(Parser, Debug)]
#[command(name = "handoff-sim")]
#[command(about = "Exercise the handoff broker against a simulated runtime")]
struct Args {
	/// Broker config file (TOML)
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Scenario to run
	#[arg(short, long, value_enum, default_value_t = Scenario::Deliver)]
	scenario: Scenario,

	/// How many times a container is recreated during the run
	#[arg(short, long, default_value_t = 3)]
	recreations: usize,

	/// Simulated operation latency in milliseconds
	#[arg(long, default_value_t = 50)]
	delay_ms: u64,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	let subscriber = tracing_subscriber::fmt()
		.with_max_level(if args.verbose {
			tracing::Level::DEBUG
		} else {
			tracing::Level::INFO
		})
		.finish();

	tracing::subscriber::set_global_default(subscriber)?;

	let config = match &args.config {
		Some(path) => BrokerConfig::load(path)?,
		None => BrokerConfig::default(),
	};
	info!(scenario = ?args.scenario, recreations = args.recreations, "Starting handoff-sim");

	let hub = LifecycleHub::new();
	let runtime = SimRuntime::new(Arc::clone(&hub), Duration::from_millis(args.delay_ms));
	let broker = Broker::new(config, runtime.clone(), hub);

	let host = Container::new(SessionScope::new(), CreationParams::new("host"));
	let owner = broker.owner_for(&host, "picker-host")?;

	let outcome = match args.scenario {
		Scenario::Deliver => deliver(&broker, host, &owner, args.recreations).await?,
		Scenario::Recreate => recreate(&runtime, &owner, args.recreations).await?,
		Scenario::Cancel => cancel(&owner).await?,
	};

	info!(status = %outcome.status, payload = %outcome.payload, "Outcome delivered");
	info!(observers_registered = broker.observers().is_registered(), snapshot = ?owner.snapshot(), "Finished");
	Ok(())
}

/// The host goes inactive and is recreated repeatedly while the request runs.
async fn deliver(broker: &Broker, mut host: Arc<Container>, owner: &Arc<Owner>, recreations: usize) -> handoff_broker::Result<Outcome> {
	let (id, continuation) = owner.register(LaunchRequest::new("pick", json!({ "kind": "photo" })), RequestOptions::new())?;
	owner.on_inactive();

	for _ in 0..recreations {
		host.destroy();
		host = host.recreate();
		let again = broker.owner_for(&host, "picker-host")?;
		info!(%id, container = %host.id(), same_owner = Arc::ptr_eq(owner, &again), "Host recreated");
	}

	Ok(settle(owner, continuation).await)
}

/// The launched screen is torn down before loading; only its last instance
/// loads, and the initializer sees that instance's component.
async fn recreate(runtime: &Arc<SimRuntime>, owner: &Arc<Owner>, recreations: usize) -> handoff_broker::Result<Outcome> {
	let options = RequestOptions::new().with_component(|screen: Arc<PickerScreen>| {
		*screen.preselected.lock() = Some("beach.jpg".into());
		info!("Initializer ran");
	});
	let (id, continuation) = owner.register(LaunchRequest::new("pick", json!({ "kind": "photo" })), options)?;

	for _ in 0..recreations {
		runtime.recreate_screen(id);
	}
	runtime.load_screen(id);

	Ok(settle(owner, continuation).await)
}

async fn cancel(owner: &Arc<Owner>) -> handoff_broker::Result<Outcome> {
	let token = CancellationToken::new();
	let (id, continuation) = owner.register(
		LaunchRequest::new("pick", json!({ "kind": "photo" })),
		RequestOptions::new().with_cancellation(token.clone()),
	)?;
	info!(%id, "Cancelling");
	token.cancel();

	Ok(settle(owner, continuation).await)
}

/// Plays the owner's home sequence: pump the inbox until something is
/// staged, then become active so it is delivered.
async fn settle(owner: &Owner, continuation: Continuation) -> Outcome {
	loop {
		owner.pump();
		if owner.snapshot().staged > 0 {
			break;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	let report = owner.on_active();
	info!(delivered = report.delivered.len(), still_staged = report.still_staged, "Owner active");
	continuation.await
}
