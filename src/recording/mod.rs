pub mod channel_recorder;
pub mod clock;
pub mod paced_stream;
pub mod segment_namer;
pub mod supervisor;
