pub mod config;
pub mod dynamics;
pub mod grid;
pub mod integrator;
pub mod orbit;
pub mod output;
pub mod plotting;
pub mod state;
pub mod sweep;
pub mod system;
pub mod table;
