pub mod run;
pub mod sources;
pub mod tail;
