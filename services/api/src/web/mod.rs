pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

// Re-export the handlers the binary wires into the router.
pub use middleware::require_auth;
pub use rest::{create_category_handler, delete_category_handler, list_categories_handler};
pub use ws_handler::ws_handler;
