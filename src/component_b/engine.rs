//! engine.rs
//! Physics capability consumed by the simulation loop, plus a small deterministic planar
//! integrator used by the `coin_sim` binary.
//!
//! The controller never owns body state: it reads pose/velocity and writes forces/torques.

use crate::utils::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn planar_norm(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

/// Position plus heading (yaw about the vertical axis, radians).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub position: Vec3,
    pub heading: f64,
}

impl Pose {
    pub const fn new(x: f64, y: f64, z: f64, heading: f64) -> Self {
        Self { position: Vec3::new(x, y, z), heading }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    World,
    Local,
}

pub trait Engine: Send {
    fn create_body(&mut self, pose: Pose) -> Result<BodyHandle, EngineError>;
    fn pose(&self, body: BodyHandle) -> Result<Pose, EngineError>;
    fn velocity(&self, body: BodyHandle) -> Result<Vec3, EngineError>;
    fn apply_force(
        &mut self,
        body: BodyHandle,
        force: Vec3,
        at: Vec3,
        frame: Frame,
    ) -> Result<(), EngineError>;
    fn apply_torque(&mut self, body: BodyHandle, torque: Vec3, frame: Frame)
    -> Result<(), EngineError>;
    fn set_friction(
        &mut self,
        body: BodyHandle,
        lateral: f64,
        spinning: f64,
    ) -> Result<(), EngineError>;
    fn step(&mut self) -> Result<(), EngineError>;
    /// Releases the backend. Must tolerate repeated calls.
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
    /// Local quit input (e.g. a key in a viewer window).
    fn quit_requested(&mut self) -> bool {
        false
    }
}

/// Chassis parameters for `KinematicEngine`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChassisParams {
    pub mass: f64,
    pub yaw_inertia: f64,
    /// Fraction of forward speed lost per step.
    pub rolling_drag: f64,
    pub dt: f64,
}

impl Default for ChassisParams {
    fn default() -> Self {
        Self {
            mass: 8.0,
            yaw_inertia: 0.2,
            rolling_drag: 0.02,
            dt: 1.0 / 60.0,
        }
    }
}

#[derive(Debug, Clone)]
struct Body {
    pose: Pose,
    velocity: Vec3,
    yaw_rate: f64,
    force: Vec3,
    torque: f64,
    lateral_friction: f64,
    spinning_friction: f64,
}

/// Semi-implicit Euler integration of planar rigid bodies. Forces and torques accumulate
/// until the next `step()` and are then cleared.
#[derive(Debug, Clone)]
pub struct KinematicEngine {
    params: ChassisParams,
    bodies: Vec<Body>,
    connected: bool,
}

impl KinematicEngine {
    pub fn new(params: ChassisParams) -> Self {
        Self { params, bodies: Vec::new(), connected: true }
    }

    fn body(&self, handle: BodyHandle) -> Result<&Body, EngineError> {
        if !self.connected {
            return Err(EngineError::Disconnected);
        }
        self.bodies
            .get(handle.0 as usize)
            .ok_or(EngineError::UnknownBody(handle.0))
    }

    fn body_mut(&mut self, handle: BodyHandle) -> Result<&mut Body, EngineError> {
        if !self.connected {
            return Err(EngineError::Disconnected);
        }
        self.bodies
            .get_mut(handle.0 as usize)
            .ok_or(EngineError::UnknownBody(handle.0))
    }

    fn integrate(params: &ChassisParams, body: &mut Body) {
        let dt = params.dt;
        let (sin_h, cos_h) = body.pose.heading.sin_cos();

        body.velocity.x += body.force.x / params.mass * dt;
        body.velocity.y += body.force.y / params.mass * dt;

        // Split into forward/lateral, then apply grip and rolling drag.
        let forward = body.velocity.x * cos_h + body.velocity.y * sin_h;
        let lateral = -body.velocity.x * sin_h + body.velocity.y * cos_h;
        let forward = forward * (1.0 - params.rolling_drag);
        let lateral = lateral * (1.0 - body.lateral_friction).clamp(0.0, 1.0);
        body.velocity.x = forward * cos_h - lateral * sin_h;
        body.velocity.y = forward * sin_h + lateral * cos_h;

        body.yaw_rate += body.torque / params.yaw_inertia * dt;
        body.yaw_rate *= (1.0 - body.spinning_friction).clamp(0.0, 1.0);

        body.pose.position.x += body.velocity.x * dt;
        body.pose.position.y += body.velocity.y * dt;
        body.pose.heading += body.yaw_rate * dt;

        body.force = Vec3::default();
        body.torque = 0.0;
    }
}

impl Default for KinematicEngine {
    fn default() -> Self {
        Self::new(ChassisParams::default())
    }
}

impl Engine for KinematicEngine {
    fn create_body(&mut self, pose: Pose) -> Result<BodyHandle, EngineError> {
        if !self.connected {
            return Err(EngineError::Disconnected);
        }
        self.bodies.push(Body {
            pose,
            velocity: Vec3::default(),
            yaw_rate: 0.0,
            force: Vec3::default(),
            torque: 0.0,
            lateral_friction: 0.0,
            spinning_friction: 0.0,
        });
        Ok(BodyHandle(self.bodies.len() as u32 - 1))
    }

    fn pose(&self, body: BodyHandle) -> Result<Pose, EngineError> {
        self.body(body).map(|b| b.pose)
    }

    fn velocity(&self, body: BodyHandle) -> Result<Vec3, EngineError> {
        self.body(body).map(|b| b.velocity)
    }

    fn apply_force(
        &mut self,
        body: BodyHandle,
        force: Vec3,
        _at: Vec3,
        frame: Frame,
    ) -> Result<(), EngineError> {
        let b = self.body_mut(body)?;
        let world = match frame {
            Frame::World => force,
            Frame::Local => {
                let (sin_h, cos_h) = b.pose.heading.sin_cos();
                Vec3::new(
                    force.x * cos_h - force.y * sin_h,
                    force.x * sin_h + force.y * cos_h,
                    force.z,
                )
            }
        };
        b.force.x += world.x;
        b.force.y += world.y;
        b.force.z += world.z;
        Ok(())
    }

    fn apply_torque(
        &mut self,
        body: BodyHandle,
        torque: Vec3,
        _frame: Frame,
    ) -> Result<(), EngineError> {
        // Planar bodies only react to the vertical component.
        self.body_mut(body)?.torque += torque.z;
        Ok(())
    }

    fn set_friction(
        &mut self,
        body: BodyHandle,
        lateral: f64,
        spinning: f64,
    ) -> Result<(), EngineError> {
        let b = self.body_mut(body)?;
        b.lateral_friction = lateral;
        b.spinning_friction = spinning;
        Ok(())
    }

    fn step(&mut self) -> Result<(), EngineError> {
        if !self.connected {
            return Err(EngineError::Disconnected);
        }
        let params = self.params;
        for body in &mut self.bodies {
            Self::integrate(&params, body);
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
        self.bodies.clear();
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_force_moves_along_heading() {
        let mut engine = KinematicEngine::default();
        let body = engine.create_body(Pose::new(0.0, 0.0, 0.5, 0.0)).unwrap();
        engine.set_friction(body, 0.8, 0.3).unwrap();

        for _ in 0..30 {
            engine
                .apply_force(body, Vec3::new(60.0, 0.0, 0.0), Vec3::default(), Frame::World)
                .unwrap();
            engine.step().unwrap();
        }

        let pose = engine.pose(body).unwrap();
        assert!(pose.position.x > 0.5);
        assert!(pose.position.y.abs() < 1e-9);
        assert!(engine.velocity(body).unwrap().planar_norm() > 0.0);
    }

    #[test]
    fn torque_turns_left() {
        let mut engine = KinematicEngine::default();
        let body = engine.create_body(Pose::default()).unwrap();
        engine
            .apply_torque(body, Vec3::new(0.0, 0.0, 10.0), Frame::World)
            .unwrap();
        engine.step().unwrap();
        engine.step().unwrap();
        assert!(engine.pose(body).unwrap().heading > 0.0);
    }

    #[test]
    fn disconnected_engine_refuses_queries() {
        let mut engine = KinematicEngine::default();
        let body = engine.create_body(Pose::default()).unwrap();
        engine.disconnect();
        engine.disconnect();
        assert!(!engine.is_connected());
        assert_eq!(engine.pose(body), Err(EngineError::Disconnected));
        assert_eq!(engine.step(), Err(EngineError::Disconnected));
    }
}
