pub mod handler;
pub mod msg_content_handler;
pub mod msg_indicator_handler;
pub mod msg_join_handler;
pub mod msg_ping_handler;
pub mod msg_task_handler;

pub use handler::websocket_handler;
