pub mod auth;
pub mod deploy;
pub mod destroy;
pub mod invoke;
pub mod run;
pub mod synth;
