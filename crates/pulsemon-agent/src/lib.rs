pub mod config;
pub mod net;
pub mod run;
pub mod supervisor;
pub mod workers;
