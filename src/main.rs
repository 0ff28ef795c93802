use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use log::{error, info};

use rusted_qdc::config::Config;
use rusted_qdc::receiver::Receiver;
use rusted_qdc::run_id::RunId;
use rusted_qdc::sink::Sink;

fn main() {
    //Load the config first so it can set the log level
    let config_result = match std::env::args().nth(1) {
        Some(path) => Config::read_config_file(&PathBuf::from(path)).map(Some),
        None => Ok(None)
    };
    let level = match &config_result {
        Ok(Some(config)) => config.get_log_level(),
        _ => simplelog::LevelFilter::Info
    };

    //Setup logging
    if let Err(e) = simplelog::TermLogger::init(level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto) {
        eprintln!("Could not start the logger: {}", e);
        return;
    }

    info!("Starting up rusted qdc...\n");

    let config = match config_result {
        Ok(Some(config)) => config,
        Ok(None) => {
            info!("No config file given, using defaults.\n");
            Config::default()
        }
        Err(e) => {
            error!("Config error at startup: {} Shutting down.\n", e);
            return;
        }
    };

    //Setup resources
    let run_id = RunId::random();
    let sink = match Sink::from_config(&config, run_id) {
        Ok(sink) => sink,
        Err(e) => {
            error!("An error was encountered initializing the {:?} sink: {} Shutting down.\n", config.backend, e);
            return;
        }
    };
    let mut receiver = match Receiver::bind(&config, sink) {
        Ok(r) => r,
        Err(e) => {
            error!("An error was encountered initializing the receiver: {} Shutting down.\n", e);
            return;
        }
    };

    //Typing q (or quit) on stdin stops the receiver
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) if line.trim() == "q" || line.trim() == "quit" => {
                    stop_flag.store(true, Ordering::Relaxed);
                    break;
                }
                Ok(_) => (),
                Err(_) => break
            }
        }
    });

    info!("Receiving with run {}. Type q to stop.\n", run_id);
    match receiver.run(&stop) {
        Ok(_) => info!("Receiver successfully completed.\n"),
        Err(e) => error!("Receiver ran into an error: {} Shutting down.\n", e)
    }

    return;

}
