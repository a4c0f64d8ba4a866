pub mod bounded_queue;
pub mod chunker;
pub mod sample_convert;
