//! radioform-host - run a proxy device end to end.
//!
//! Creates the shared segment, publishes it in the control file, starts the
//! heartbeat, and plays the ring through the EQ into the default output
//! device. Stops on Enter.
//!
//! Usage: `radioform-host [DEVICE_NAME] [DEVICE_UID]`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use radioform_host::{Event, HostConfig, HostEngine};

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() {
    init_logging();

    let mut args = std::env::args().skip(1);
    let config = HostConfig {
        device_name: args.next().unwrap_or_else(|| "Radioform".to_string()),
        device_uid: args.next().unwrap_or_else(|| "radioform-main-out".to_string()),
        ..HostConfig::default()
    };

    info!(
        device = %config.device_name,
        uid = %config.device_uid,
        sample_rate = config.sample_rate,
        "starting radioform host"
    );

    let engine = match HostEngine::with_config(config) {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %e, "failed to create host engine");
            std::process::exit(1);
        }
    };
    if let Err(e) = engine.start() {
        error!(error = %e, "failed to start host engine");
        std::process::exit(1);
    }

    // Pump events until the user hits Enter.
    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit = Arc::clone(&quit);
        std::thread::spawn(move || {
            let mut line = String::new();
            let _ = std::io::stdin().read_line(&mut line);
            quit.store(true, Ordering::SeqCst);
        });
    }
    info!("press Enter to stop");

    while !quit.load(Ordering::SeqCst) {
        while let Some(event) = engine.poll_event() {
            match event {
                Event::LevelUpdate { left_db, right_db } => {
                    debug!(left_db, right_db, "meters");
                }
                Event::Error { message } => error!(%message, "engine error"),
                Event::Started => info!("audio running"),
                Event::Stopped => info!("audio stopped"),
                state @ Event::StateUpdate { .. } => debug!(?state, "state"),
            }
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    let _ = engine.stop();
    std::thread::sleep(Duration::from_millis(200));
    info!("goodbye");
}
