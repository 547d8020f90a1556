//component B: simulation server
//accepts track commands over TCP and drives a vehicle around the chosen
//track on a fixed-rate physics loop until it completes, times out or is stopped.
pub mod protocol;
pub mod track;
pub mod engine;
pub mod tracker;
pub mod pursuit;
pub mod recovery;
pub mod lap;
pub mod simulation;
pub mod supervisor;
pub mod server;
