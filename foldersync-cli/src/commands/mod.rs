pub mod control;
pub mod once;
pub mod options;
pub mod plan;
pub mod run;
