use cabsignal::cab::{BeaconData, Key, SignalData, RED_ASPECT};
use cabsignal::devices::{ats_p, tasc, AtcConfig, AtsPConfig, EbConfig, TascConfig};
use cabsignal::sim::{Simulation, VehicleModel};
use cabsignal::{DeviceState, InitializationMode, Train, TrainConfig, TrainReport};
use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;
use std::error::Error;
use tracing::Level;

const DEFAULT_STEP: &str = "0.1";
const DEFAULT_INTERVAL: &str = "1.0";

/// Driver or track event fired once the scenario clock passes `at`.
#[derive(Debug, Clone, Copy)]
enum ScriptEvent {
    Beacon(BeaconData),
    KeyPress(Key),
}

struct Scenario {
    title: &'static str,
    simulation: Simulation,
    duration: f64,
    script: Vec<(f64, ScriptEvent)>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let matches = App::new("cabsim")
        .version("0.1.0")
        .author("Cab Signalling Engineering Team")
        .about("🚆 Cab signalling simulator - scripted runs of the onboard protection devices")
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["table", "json", "csv"])
                .default_value("table")
                .global(true),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("Train configuration replacing the scenario's default equipment")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("step")
                .long("step")
                .value_name("SECONDS")
                .help("Simulation tick")
                .takes_value(true)
                .default_value(DEFAULT_STEP)
                .global(true)
                .validator(|v| match v.parse::<f64>() {
                    Ok(step) if step > 0.0 && step < 1.0 => Ok(()),
                    _ => Err("Tick must be a number between 0 and 1".into()),
                }),
        )
        .arg(
            Arg::with_name("interval")
                .long("interval")
                .value_name("SECONDS")
                .help("Time between printed rows; state changes are always printed")
                .takes_value(true)
                .default_value(DEFAULT_INTERVAL)
                .global(true),
        )
        .arg(
            Arg::with_name("duration")
                .short("d")
                .long("duration")
                .value_name("SECONDS")
                .help("Override the scenario length")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Log every device transition")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("ats-p")
                .about("🛑 ATS-P brakes for a red signal 600 m ahead at 90 km/h"),
        )
        .subcommand(
            SubCommand::with_name("atc")
                .about("📶 ATC stops the train on a 200 m braking aspect from 108 km/h"),
        )
        .subcommand(
            SubCommand::with_name("tasc")
                .about("🚉 TASC brings the train to a stop point 50 m ahead"),
        )
        .subcommand(
            SubCommand::with_name("eb")
                .about("🔔 EB rings at 30 s and brakes at 60 s without driver input"),
        )
        .subcommand(
            SubCommand::with_name("config")
                .about("📄 Validate a train configuration file and print it")
                .arg(
                    Arg::with_name("file")
                        .help("Configuration file")
                        .required(true),
                ),
        )
        .get_matches();

    let verbose = matches.is_present("verbose");
    tracing_subscriber::fmt()
        .with_max_level(if verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    let format = matches.value_of("format").unwrap_or("table");

    let scenario = match matches.subcommand() {
        ("config", Some(sub)) => return handle_config(sub, format),
        ("ats-p", Some(sub)) => ats_p_scenario(&train_config(sub)?, step(sub)?),
        ("atc", Some(sub)) => atc_scenario(&train_config(sub)?, step(sub)?),
        ("tasc", Some(sub)) => tasc_scenario(&train_config(sub)?, step(sub)?),
        ("eb", Some(sub)) => eb_scenario(&train_config(sub)?, step(sub)?),
        _ => {
            println!("{}", "No scenario specified. Use --help for usage information.".yellow());
            println!("{}", "Scenarios:".bright_green());
            println!("  {} Red signal with ATS-P", "cabsim ats-p".bright_cyan());
            println!("  {} Braking aspect with ATC", "cabsim atc".bright_cyan());
            println!("  {} Station stop with TASC", "cabsim tasc".bright_cyan());
            println!("  {} Vigilance watchdog", "cabsim eb".bright_cyan());
            return Ok(());
        }
    };

    let sub = matches
        .subcommand()
        .1
        .ok_or("scenario arguments missing")?;
    let duration = match sub.value_of("duration") {
        Some(value) => value.parse::<f64>()?,
        None => scenario.duration,
    };
    let interval = sub.value_of("interval").unwrap_or(DEFAULT_INTERVAL).parse::<f64>()?;
    run(scenario, duration, interval, format)
}

fn step(matches: &ArgMatches<'_>) -> Result<f64, Box<dyn Error>> {
    Ok(matches.value_of("step").unwrap_or(DEFAULT_STEP).parse::<f64>()?)
}

/// The file given with `--config`, or nothing fitted when absent.
fn train_config(matches: &ArgMatches<'_>) -> Result<Option<TrainConfig>, Box<dyn Error>> {
    match matches.value_of("config") {
        Some(path) => Ok(Some(TrainConfig::load(path)?)),
        None => Ok(None),
    }
}

fn ats_p_scenario(config: &Option<TrainConfig>, dt: f64) -> Scenario {
    let config = config.clone().unwrap_or_else(|| TrainConfig {
        ats_p: Some(AtsPConfig::default()),
        ..TrainConfig::default()
    });
    let mut train = Train::new(&config);
    train.initialize(InitializationMode::OnService);
    let vehicle = VehicleModel::new(config.specs).at(0.0, 25.0);
    Scenario {
        title: "ATS-P: red signal at 600 m",
        simulation: Simulation::new(train, vehicle, dt),
        duration: 90.0,
        script: vec![(
            0.0,
            ScriptEvent::Beacon(BeaconData::new(ats_p::BEACON_RENEWAL, 0, RED_ASPECT, 600.0)),
        )],
    }
}

fn atc_scenario(config: &Option<TrainConfig>, dt: f64) -> Scenario {
    let config = config.clone().unwrap_or_else(|| TrainConfig {
        atc: Some(AtcConfig::default()),
        ..TrainConfig::default()
    });
    let mut train = Train::new(&config);
    // Aspect 8 of the default table: brake to 0 km/h within 200 m
    train.set_signal(&[SignalData {
        aspect: 8,
        distance: 200.0,
    }]);
    train.initialize(InitializationMode::OnService);
    let vehicle = VehicleModel::new(config.specs).at(0.0, 30.0);
    Scenario {
        title: "ATC: braking aspect over 200 m",
        simulation: Simulation::new(train, vehicle, dt),
        duration: 60.0,
        script: Vec::new(),
    }
}

fn tasc_scenario(config: &Option<TrainConfig>, dt: f64) -> Scenario {
    let config = config.clone().unwrap_or_else(|| TrainConfig {
        tasc: Some(TascConfig::default()),
        ..TrainConfig::default()
    });
    let mut train = Train::new(&config);
    train.initialize(InitializationMode::OnService);
    let vehicle = VehicleModel::new(config.specs).at(0.0, 8.0);
    Scenario {
        title: "TASC: stop point 50 m ahead",
        simulation: Simulation::new(train, vehicle, dt),
        duration: 30.0,
        script: vec![(
            0.0,
            ScriptEvent::Beacon(BeaconData::new(tasc::BEACON_STOP_POINT, 50, 0, 0.0)),
        )],
    }
}

fn eb_scenario(config: &Option<TrainConfig>, dt: f64) -> Scenario {
    let config = config.clone().unwrap_or_else(|| TrainConfig {
        eb: Some(EbConfig {
            bell_threshold: 30.0,
            brake_threshold: 60.0,
            ..EbConfig::default()
        }),
        ..TrainConfig::default()
    });
    let reset_key = config
        .eb
        .as_ref()
        .and_then(|eb| eb.reset_keys.first().copied())
        .unwrap_or(Key::A2);
    let mut train = Train::new(&config);
    train.initialize(InitializationMode::OnService);
    let vehicle = VehicleModel::new(config.specs).at(0.0, 20.0);
    Scenario {
        title: "EB: no driver input",
        simulation: Simulation::new(train, vehicle, dt),
        duration: 75.0,
        script: vec![(65.0, ScriptEvent::KeyPress(reset_key))],
    }
}

fn run(scenario: Scenario, duration: f64, interval: f64, format: &str) -> Result<(), Box<dyn Error>> {
    let Scenario {
        title,
        mut simulation,
        script,
        ..
    } = scenario;

    if format == "table" {
        println!("{}", format!("🚆 {}", title).bright_blue().bold());
        println!("{}", "═".repeat(title.chars().count() + 3).bright_blue());
    }

    let mut pending = script;
    let mut header_printed = false;
    let mut last_states: Option<Vec<DeviceState>> = None;
    let mut next_row = 0.0;

    while simulation.time() < duration {
        let now = simulation.time();
        pending.retain(|(at, event)| {
            if *at > now {
                return true;
            }
            match event {
                ScriptEvent::Beacon(beacon) => simulation.train.set_beacon(beacon),
                ScriptEvent::KeyPress(key) => {
                    simulation.train.key_down(*key);
                    simulation.train.key_up(*key);
                }
            }
            false
        });

        let output = simulation.step();
        let report = TrainReport::capture(&simulation.train, &output);
        let states: Vec<DeviceState> = report.devices.iter().map(|device| device.state).collect();
        let changed = last_states.as_ref() != Some(&states);
        last_states = Some(states);
        if !changed && report.time < next_row {
            continue;
        }
        next_row = report.time + interval;

        match format {
            "json" => println!("{}", report.to_json()?),
            "csv" => {
                if !header_printed {
                    println!("{}", report.csv_header());
                    header_printed = true;
                }
                let row = report.csv_row().map_err(|_| "CSV row too long")?;
                println!("{}", row);
            }
            _ => {
                if !header_printed {
                    print_table_header(&report);
                    header_printed = true;
                }
                print_table_row(&report, changed);
            }
        }
    }

    if format == "table" {
        print_summary(&simulation);
    }
    Ok(())
}

fn print_table_header(report: &TrainReport) {
    let mut header = format!("{:>7} {:>9} {:>8} {:>5} {:>5}", "t [s]", "x [m]", "v [km/h]", "brk", "pwr");
    for device in &report.devices {
        header.push_str(&format!(" {:>12}", device.device.name()));
    }
    println!("{}", header.bright_white().bold());
}

fn print_table_row(report: &TrainReport, changed: bool) {
    let brake = if report.output.brake > report.driver.brake {
        report.output.brake.to_string().bright_red()
    } else {
        report.output.brake.to_string().normal()
    };
    let mut row = format!(
        "{:>7.1} {:>9.1} {:>8.1} {:>5} {:>5}",
        report.time, report.location, report.speed_kmh, brake, report.output.power
    );
    for device in &report.devices {
        row.push_str(&format!(" {:>12}", device.state.to_string()));
    }
    if changed {
        println!("{}", row.bright_yellow());
    } else {
        println!("{}", row);
    }
}

fn print_summary(simulation: &Simulation) {
    let train = &simulation.train;
    println!("\n{}", "📋 Transitions".bright_white().bold());
    if train.journal().records().is_empty() {
        println!("  {}", "none".dimmed());
    }
    for record in train.journal().records() {
        println!(
            "  {:>7.1} s {:>9.1} m  {:<7} {} → {}",
            record.time,
            record.location,
            record.device.name().bright_cyan(),
            record.from,
            record.to.to_string().bright_green()
        );
    }
    let stats = train.stats();
    println!(
        "\n{} {} ticks, {} events, stopped at {:.1} m",
        "✅".green(),
        stats.ticks.to_string().bright_cyan(),
        stats.events,
        simulation.vehicle.location
    );
}

fn handle_config(matches: &ArgMatches<'_>, format: &str) -> Result<(), Box<dyn Error>> {
    let path = matches.value_of("file").ok_or("configuration file required")?;
    let config = match TrainConfig::load(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}: {}", "❌".red(), path.bright_white(), e.to_string().bright_red());
            std::process::exit(1);
        }
    };

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let train = Train::new(&config);
    println!("{} {}", "✅".green(), "Configuration valid".bright_green());
    println!(
        "{} {} brake / {} power notches, ATS notch {}",
        "Train:".bright_white(),
        config.specs.brake_notches,
        config.specs.power_notches,
        config.specs.ats_notch
    );
    if train.devices().is_empty() {
        println!("{} {}", "Devices:".bright_white(), "none fitted".yellow());
    } else {
        let names: Vec<&str> = train
            .devices()
            .iter()
            .map(|device| cabsignal::Device::kind(device).name())
            .collect();
        println!("{} {}", "Devices:".bright_white(), names.join(", ").bright_cyan());
    }
    if let Some(atc) = &config.atc {
        println!("{}", "ATC signals:".bright_white());
        for signal in &atc.signals {
            println!(
                "  {:>3}  {:?} {:?} → {:.0} km/h over {:?}",
                signal.aspect,
                signal.indicator,
                signal.initial,
                signal.final_speed * 3.6,
                signal.distance
            );
        }
    }
    Ok(())
}
