pub mod buffer;
pub mod crc;
pub mod limits;
