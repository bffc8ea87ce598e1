pub mod trongrid;

pub use trongrid::{FeedError, TransferFeed, TronGridFeed};
