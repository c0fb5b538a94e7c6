pub mod archive;
pub mod axis;
pub mod config;
pub mod jobs;
pub mod object_store;
pub mod quantiles;
pub mod resample;
pub mod sample_data;
pub mod trigger;
pub mod windowing;
pub mod workflow;
