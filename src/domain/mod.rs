// Domain layer - digitisation core, free of I/O
pub mod aggregator;
pub mod calibration;
pub mod collector;
pub mod data_point;
pub mod gate;
pub mod plot;
pub mod query_guard;
pub mod transformer;
