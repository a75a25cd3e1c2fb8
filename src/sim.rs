//! Minimal vehicle dynamics for scenarios.
//!
//! Acceleration is linear in the power notch, deceleration linear in the
//! brake notch, and the emergency notch gets its own rate.

use crate::cab::{DoorState, Handles, TickInput, VehicleKinematics, VehicleSpecs};
use crate::train::{TickOutput, Train};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VehicleModel {
    pub specs: VehicleSpecs,
    /// Acceleration at the highest power notch, m/s².
    pub max_acceleration: f64,
    pub emergency_deceleration: f64,
    pub location: f64,
    pub speed: f64,
    pub acceleration: f64,
}

impl VehicleModel {
    pub fn new(specs: VehicleSpecs) -> Self {
        Self {
            specs,
            max_acceleration: 3.0 / 3.6,
            emergency_deceleration: 4.5 / 3.6,
            location: 0.0,
            speed: 0.0,
            acceleration: 0.0,
        }
    }

    pub fn at(mut self, location: f64, speed: f64) -> Self {
        self.location = location;
        self.speed = speed;
        self
    }

    pub fn kinematics(&self) -> VehicleKinematics {
        VehicleKinematics {
            location: self.location,
            speed: self.speed,
            acceleration: self.acceleration,
        }
    }

    /// Acceleration the handles would produce, before the standstill clamp.
    pub fn handle_acceleration(&self, handles: &Handles) -> f64 {
        if handles.brake > 0 {
            let deceleration = if handles.brake > self.specs.brake_notches {
                self.emergency_deceleration
            } else {
                self.specs.max_deceleration * f64::from(handles.brake) / f64::from(self.specs.brake_notches.max(1))
            };
            return -deceleration * self.speed.signum();
        }
        if handles.power > 0 && handles.reverser != 0 {
            let direction = f64::from(handles.reverser.signum());
            return direction * self.max_acceleration * f64::from(handles.power)
                / f64::from(self.specs.power_notches.max(1));
        }
        0.0
    }

    pub fn step(&mut self, dt: f64, handles: &Handles) -> VehicleKinematics {
        let acceleration = self.handle_acceleration(handles);
        let previous = self.speed;
        let mut speed = previous + acceleration * dt;
        // Brakes stop the train, they never reverse it
        if handles.brake > 0 && previous * speed <= 0.0 {
            speed = 0.0;
        }
        self.location += (previous + speed) / 2.0 * dt;
        self.acceleration = (speed - previous) / dt;
        self.speed = speed;
        self.kinematics()
    }
}

/// Drives a [`Train`] with a [`VehicleModel`] at a fixed tick.
#[derive(Debug, Clone)]
pub struct Simulation {
    pub train: Train,
    pub vehicle: VehicleModel,
    pub driver: Handles,
    pub doors: DoorState,
    pub preceding_distance: Option<f64>,
    pub dt: f64,
}

impl Simulation {
    pub fn new(train: Train, vehicle: VehicleModel, dt: f64) -> Self {
        Self {
            train,
            vehicle,
            driver: Handles {
                reverser: 1,
                ..Handles::default()
            },
            doors: DoorState::Closed,
            preceding_distance: None,
            dt,
        }
    }

    pub fn input(&self) -> TickInput {
        TickInput {
            elapsed: self.dt,
            vehicle: self.vehicle.kinematics(),
            handles: self.driver,
            doors: self.doors,
            preceding_distance: self.preceding_distance,
        }
    }

    /// One tick: the train decides, then the vehicle moves on its output.
    pub fn step(&mut self) -> TickOutput {
        let output = self.train.elapse(&self.input());
        self.vehicle.step(self.dt, &output.handles);
        output
    }

    pub fn time(&self) -> f64 {
        self.train.cab().time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brake_stops_without_reversing() {
        let specs = VehicleSpecs::default();
        let mut vehicle = VehicleModel::new(specs).at(0.0, 1.0);
        let handles = Handles {
            reverser: 1,
            brake: specs.brake_notches,
            ..Handles::default()
        };
        for _ in 0..50 {
            vehicle.step(0.1, &handles);
        }
        assert_eq!(vehicle.speed, 0.0);
        assert!(vehicle.location > 0.0);
    }

    #[test]
    fn test_power_accelerates_in_reverser_direction() {
        let specs = VehicleSpecs::default();
        let mut vehicle = VehicleModel::new(specs);
        let handles = Handles {
            reverser: -1,
            power: specs.power_notches,
            ..Handles::default()
        };
        vehicle.step(1.0, &handles);
        assert!(vehicle.speed < 0.0);

        // Power without a reverser does nothing
        let mut idle = VehicleModel::new(specs);
        idle.step(1.0, &Handles { power: 3, ..Handles::default() });
        assert_eq!(idle.speed, 0.0);
    }
}
