pub mod message;
pub mod names;
pub mod storage;
