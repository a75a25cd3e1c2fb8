//! # Cab Signalling Simulator
//!
//! Onboard train-protection and driver-assistance devices for a simulated
//! railway cab, driven tick by tick by a host simulator.
//!
//! ## Features
//!
//! - **ATS-Sx**: intermittent warning, alarm and emergency stop on beacons
//! - **ATS-Ps / ATS-P**: continuous brake-pattern supervision
//! - **ATC**: cab-signal speed control with staged service braking
//! - **TASC**: automatic brake control for station stops
//! - **EB**: driver vigilance watchdog
//! - **Bounded memory**: fixed-capacity pattern lists, sound queues and journal
//!
//! ## Quick Start
//!
//! ```rust
//! use cabsignal::cab::{DoorState, Handles, TickInput, VehicleKinematics};
//! use cabsignal::{InitializationMode, Train, TrainConfig};
//!
//! let mut train = Train::new(&TrainConfig::fully_equipped());
//! train.initialize(InitializationMode::OnService);
//!
//! let output = train.elapse(&TickInput {
//!     elapsed: 0.1,
//!     vehicle: VehicleKinematics { location: 0.0, speed: 10.0, acceleration: 0.0 },
//!     handles: Handles { reverser: 1, power: 2, ..Handles::default() },
//!     doors: DoorState::Closed,
//!     preceding_distance: None,
//! });
//! assert_eq!(output.handles.brake, 0);
//! ```
//!
//! ## Architecture
//!
//! - [`train`] - Device chain, blocking flag and event fan-out
//! - [`devices`] - The six devices behind one [`devices::Device`] trait
//! - [`pattern`] - Brake-curve engine and compatibility limits
//! - [`approach`] - Notch controller for braking onto a target
//! - [`config`] - Configuration file and ATC aspect codes
//! - [`output`] - Panel indicators, sounds and debug text
//! - [`journal`] / [`report`] - State history and JSON snapshots
//! - [`sim`] - Simple vehicle model for scenarios

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod approach;
pub mod cab;
pub mod config;
pub mod devices;
pub mod journal;
pub mod output;
pub mod pattern;
pub mod report;
pub mod sim;
pub mod train;

// Re-export main public types for convenience
pub use config::{ConfigError, TrainConfig};
pub use devices::{Device, DeviceKind, DeviceState, InitializationMode};
pub use report::TrainReport;
pub use train::{TickOutput, Train};
