pub mod protocol;
pub mod rest;
pub mod state;
pub mod timer_task;
pub mod ws_handler;

// Re-export the main WebSocket handler to make it easily accessible
// to the binary that will build the web server router.
pub use rest::get_exam_handler;
pub use ws_handler::ws_handler;
