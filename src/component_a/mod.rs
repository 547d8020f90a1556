// Component A: coin device
// samples the chute beams, counts coins, decides when a chute
// has earned a track run and sends the command to the simulation server.
// Also emits periodic telemetry snapshots.

pub mod sensor;
pub mod edge;
pub mod counter;
pub mod watermark;
pub mod dispatch;
pub mod channel;
pub mod telemetry;
pub mod device;
