pub mod check;
pub mod daemon;
pub mod run;
pub mod status;
