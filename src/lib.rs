pub mod aggregator;
pub mod cache;
pub mod chart;
pub mod config;
pub mod decimate;
pub mod highlight;
pub mod logging;
pub mod options;
pub mod pivot;
pub mod retry;
pub mod scale;
pub mod series;
pub mod sets;
pub mod source;
