pub mod event_queue;
pub mod sample_format;
