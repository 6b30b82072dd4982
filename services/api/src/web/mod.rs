pub mod rest;
pub mod state;

// Re-export the handlers to make them easily accessible
// to the binary that will build the web server router.
pub use rest::{
    delivery_status_webhook_handler, health_handler, repair_handler, run_dispatcher_handler,
    run_scheduler_handler,
};
