//! pursuit.rs
//! Proportional pursuit of the current waypoint.
//!
//! Thrust falls off linearly with heading error (floor 20, ceiling 60); steering torque is
//! `20 · error` clamped to ±40. Above 8 units/s the thrust is halved.

use std::f64::consts::{PI, TAU};

use crate::component_b::engine::{BodyHandle, Engine, Frame, Pose, Vec3};
use crate::component_b::track::Point2;
use crate::utils::error::EngineError;

pub const MAX_FORWARD_FORCE: f64 = 60.0;
pub const MIN_FORWARD_FORCE: f64 = 20.0;
pub const STEERING_GAIN: f64 = 20.0;
pub const MAX_STEERING_TORQUE: f64 = 40.0;
pub const SPEED_LIMIT: f64 = 8.0;
pub const LATERAL_FRICTION: f64 = 0.8;
pub const SPINNING_FRICTION: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Control {
    pub forward_force: f64,
    pub steering_torque: f64,
}

/// Wraps an angle into (-π, π].
pub fn normalize_angle(mut angle: f64) -> f64 {
    while angle > PI {
        angle -= TAU;
    }
    while angle <= -PI {
        angle += TAU;
    }
    angle
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PursuitController {
    pub max_force: f64,
    pub min_force: f64,
    pub steering_gain: f64,
    pub max_torque: f64,
    pub speed_limit: f64,
}

impl Default for PursuitController {
    fn default() -> Self {
        Self {
            max_force: MAX_FORWARD_FORCE,
            min_force: MIN_FORWARD_FORCE,
            steering_gain: STEERING_GAIN,
            max_torque: MAX_STEERING_TORQUE,
            speed_limit: SPEED_LIMIT,
        }
    }
}

impl PursuitController {
    pub fn compute_control(&self, position: Point2, heading: f64, target: Point2) -> Control {
        let angle_to_target = (target.y - position.y).atan2(target.x - position.x);
        let angle_error = normalize_angle(angle_to_target - heading);

        let forward_force = (self.max_force * (1.0 - angle_error.abs() / PI)).max(self.min_force);
        let steering_torque =
            (angle_error * self.steering_gain).clamp(-self.max_torque, self.max_torque);

        Control { forward_force, steering_torque }
    }

    /// Soft speed cap: halves thrust while overspeeding so the excess bleeds off gradually.
    pub fn apply_governor(&self, current_speed: f64, forward_force: f64) -> f64 {
        if current_speed > self.speed_limit {
            forward_force * 0.5
        } else {
            forward_force
        }
    }

    /// Full tick of actuation: control law, governor, world-frame force at the body centre,
    /// yaw torque and friction coefficients. Returns what was applied.
    pub fn drive<E: Engine + ?Sized>(
        &self,
        engine: &mut E,
        body: BodyHandle,
        pose: &Pose,
        target: Point2,
    ) -> Result<Control, EngineError> {
        let position = Point2::new(pose.position.x, pose.position.y);
        let mut control = self.compute_control(position, pose.heading, target);

        let speed = engine.velocity(body)?.planar_norm();
        control.forward_force = self.apply_governor(speed, control.forward_force);

        let (sin_h, cos_h) = pose.heading.sin_cos();
        let force = Vec3::new(control.forward_force * cos_h, control.forward_force * sin_h, 0.0);
        engine.apply_force(body, force, pose.position, Frame::World)?;
        engine.apply_torque(body, Vec3::new(0.0, 0.0, control.steering_torque), Frame::World)?;
        engine.set_friction(body, LATERAL_FRICTION, SPINNING_FRICTION)?;

        Ok(control)
    }
}
