pub mod notification;

pub use notification::{Channel, DispatchReceipt};
