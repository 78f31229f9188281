pub mod approve;
pub mod delete;
pub mod load;
pub mod rearm;
pub mod run;
pub mod status;
